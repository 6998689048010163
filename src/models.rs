use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::interval::MAX_PROFICIENCY;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Word {
    pub id: i64,
    pub word: String,
    pub meaning: String,
    pub example: Option<String>,
    pub proficiency: i32,
    pub review_count: i64,
    pub correct_count: i64,
    pub wrong_count: i64,
    pub last_review_time: Option<DateTime<Utc>>,
    pub next_review_time: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub is_favorite: bool,
}

impl Word {
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_review_time <= now
    }

    pub fn is_mastered(&self) -> bool {
        self.proficiency >= MAX_PROFICIENCY
    }

    pub fn accuracy(&self) -> f64 {
        if self.review_count == 0 {
            0.0
        } else {
            (self.correct_count as f64 / self.review_count as f64) * 100.0
        }
    }

    pub fn proficiency_stars(&self) -> String {
        let filled = self.proficiency.clamp(0, MAX_PROFICIENCY) as usize;
        let empty = MAX_PROFICIENCY as usize - filled;
        format!("{}{}", "★".repeat(filled), "☆".repeat(empty))
    }
}

// New vocabulary entry, also the JSON import format
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewWord {
    pub word: String,
    pub meaning: String,
    #[serde(default)]
    pub example: Option<String>,
}

// Direct edit of a word's text; None leaves the field untouched
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WordEdit {
    pub word: Option<String>,
    pub meaning: Option<String>,
    pub example: Option<String>,
}

impl WordEdit {
    pub fn is_empty(&self) -> bool {
        self.word.is_none() && self.meaning.is_none() && self.example.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReviewOutcome {
    Correct,
    Wrong,
}

impl ReviewOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewOutcome::Correct => "correct",
            ReviewOutcome::Wrong => "wrong",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "correct" | "c" | "yes" | "y" | "1" => Some(ReviewOutcome::Correct),
            "wrong" | "w" | "no" | "n" | "0" => Some(ReviewOutcome::Wrong),
            _ => None,
        }
    }

    pub fn is_correct(&self) -> bool {
        matches!(self, ReviewOutcome::Correct)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewLogEntry {
    pub id: i64,
    pub word_id: i64,
    pub is_correct: bool,
    pub reviewed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Stats {
    pub total_words: i64,
    pub mastered_words: i64,
    pub total_reviews: i64,
    pub total_correct: i64,
    pub total_wrong: i64,
    pub due_now: i64,
}

impl Stats {
    /// Percentage of correct reviews, rounded to a whole number.
    pub fn accuracy(&self) -> i64 {
        if self.total_reviews == 0 {
            0
        } else {
            ((self.total_correct as f64 / self.total_reviews as f64) * 100.0).round() as i64
        }
    }
}

// JSON output wrapper for CLI
#[derive(Debug, Serialize)]
pub struct JsonOutput<T: Serialize> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T: Serialize> JsonOutput<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}

#[cfg(test)]
pub(crate) fn sample_word(id: i64, proficiency: i32, next_review_time: DateTime<Utc>) -> Word {
    Word {
        id,
        word: format!("word{}", id),
        meaning: format!("meaning of word{}", id),
        example: None,
        proficiency,
        review_count: 0,
        correct_count: 0,
        wrong_count: 0,
        last_review_time: None,
        next_review_time,
        created_at: next_review_time,
        updated_at: next_review_time,
        is_favorite: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    mod word_tests {
        use super::*;

        #[test]
        fn is_due_at_exact_time() {
            let now = Utc::now();
            let w = sample_word(1, 0, now);
            assert!(w.is_due(now));
        }

        #[test]
        fn is_not_due_in_future() {
            let now = Utc::now();
            let w = sample_word(1, 0, now + Duration::minutes(1));
            assert!(!w.is_due(now));
        }

        #[test]
        fn accuracy_zero_reviews() {
            let w = sample_word(1, 0, Utc::now());
            assert_eq!(w.accuracy(), 0.0);
        }

        #[test]
        fn accuracy_with_reviews() {
            let mut w = sample_word(1, 0, Utc::now());
            w.review_count = 4;
            w.correct_count = 3;
            assert_eq!(w.accuracy(), 75.0);
        }

        #[test]
        fn stars_reflect_proficiency() {
            let w = sample_word(1, 2, Utc::now());
            assert_eq!(w.proficiency_stars(), "★★☆☆☆");
            let w = sample_word(1, 5, Utc::now());
            assert_eq!(w.proficiency_stars(), "★★★★★");
            assert!(w.is_mastered());
        }
    }

    mod review_outcome_tests {
        use super::*;

        #[test]
        fn from_str_correct_variants() {
            for s in ["correct", "CORRECT", "c", "y", "yes", "1", " y "] {
                assert_eq!(ReviewOutcome::from_str(s), Some(ReviewOutcome::Correct));
            }
        }

        #[test]
        fn from_str_wrong_variants() {
            for s in ["wrong", "w", "n", "No", "0"] {
                assert_eq!(ReviewOutcome::from_str(s), Some(ReviewOutcome::Wrong));
            }
        }

        #[test]
        fn from_str_invalid() {
            assert_eq!(ReviewOutcome::from_str("maybe"), None);
            assert_eq!(ReviewOutcome::from_str(""), None);
        }

        #[test]
        fn as_str_round_trips() {
            for o in [ReviewOutcome::Correct, ReviewOutcome::Wrong] {
                assert_eq!(ReviewOutcome::from_str(o.as_str()), Some(o));
            }
        }

        #[test]
        fn is_correct() {
            assert!(ReviewOutcome::Correct.is_correct());
            assert!(!ReviewOutcome::Wrong.is_correct());
        }
    }

    mod stats_tests {
        use super::*;

        #[test]
        fn accuracy_without_reviews_is_zero() {
            assert_eq!(Stats::default().accuracy(), 0);
        }

        #[test]
        fn accuracy_is_rounded() {
            let stats = Stats {
                total_reviews: 3,
                total_correct: 2,
                total_wrong: 1,
                ..Stats::default()
            };
            assert_eq!(stats.accuracy(), 67);
        }
    }

    mod new_word_tests {
        use super::*;

        #[test]
        fn deserializes_without_example() {
            let w: NewWord =
                serde_json::from_str(r#"{"word": "abandon", "meaning": "to leave"}"#).unwrap();
            assert_eq!(w.word, "abandon");
            assert!(w.example.is_none());
        }

        #[test]
        fn word_edit_is_empty() {
            assert!(WordEdit::default().is_empty());
            let edit = WordEdit {
                meaning: Some("x".to_string()),
                ..WordEdit::default()
            };
            assert!(!edit.is_empty());
        }
    }

    mod json_output_tests {
        use super::*;

        #[test]
        fn ok_with_number() {
            let output = JsonOutput::ok(42);
            assert!(output.success);
            assert_eq!(output.data, Some(42));
            assert!(output.error.is_none());
        }

        #[test]
        fn err_with_string() {
            let output = JsonOutput::<()>::err("something went wrong");
            assert!(!output.success);
            assert!(output.data.is_none());
            assert_eq!(output.error, Some("something went wrong".to_string()));
        }

        #[test]
        fn serializes_to_json() {
            let output = JsonOutput::ok("x");
            let json = serde_json::to_string(&output).unwrap();
            assert!(json.contains(r#""success":true"#));
            assert!(json.contains(r#""data":"x""#));
        }
    }
}
