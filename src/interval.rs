//! Spaced repetition interval policy.
//!
//! Each review moves a word's proficiency one step up (correct) or down
//! (wrong) within `0..=5`, and the new level decides how long the word rests
//! before it is due again. Level 5 always rests for the fixed mastery
//! interval.

use chrono::{DateTime, Duration, Utc};

pub const MIN_PROFICIENCY: i32 = 0;
pub const MAX_PROFICIENCY: i32 = 5;

/// Two weeks, applied to every review that lands on level 5.
pub const MASTERY_INTERVAL_MINUTES: i64 = 20_160;

/// Outcome of applying one answer to a proficiency level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NextReview {
    pub proficiency: i32,
    pub delay_minutes: i64,
}

impl NextReview {
    pub fn due_at(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now + Duration::minutes(self.delay_minutes)
    }
}

pub fn next_delay(proficiency: i32, was_correct: bool) -> NextReview {
    let current = proficiency.clamp(MIN_PROFICIENCY, MAX_PROFICIENCY);
    let new_level = if was_correct {
        (current + 1).min(MAX_PROFICIENCY)
    } else {
        (current - 1).max(MIN_PROFICIENCY)
    };

    NextReview {
        proficiency: new_level,
        delay_minutes: interval_minutes(new_level),
    }
}

// Rest period in minutes for a level
fn interval_minutes(level: i32) -> i64 {
    match level {
        0 => 30,
        1 => 60,
        2 => 240,
        3 => 1440,
        4 => 4320,
        _ => MASTERY_INTERVAL_MINUTES,
    }
}
