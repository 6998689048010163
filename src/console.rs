//! Terminal front end for `wordloop run`.
//!
//! The scheduler task prints cards through [`TerminalPresenter`]; a plain
//! reader thread owns stdin and turns lines into answers or commands.

use std::io::{self, BufRead, Write};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;

use tokio::runtime::Handle;

use crate::error::PresentError;
use crate::models::{ReviewOutcome, Stats, Word};
use crate::scheduler::{Presenter, SchedulerHandle, SchedulerStatus, SessionId, SessionSignals};
use crate::settings::{Settings, SettingsPatch};

const BELL: &str = "\x07";

const HELP: &str = "\
Commands:
  status           show study mode state
  start            enter study mode
  stop             leave study mode
  now              review a due word right away
  interval <secs>  change the wait between reviews
  stats            show review statistics
  help             show this help
  quit             stop and exit
While a word is shown answer with y (knew it), n (didn't) or s (skip).";

#[derive(Debug, Clone)]
struct OpenReview {
    session: SessionId,
    word: Word,
}

#[derive(Debug, Default)]
pub struct ConsoleState {
    open: Option<OpenReview>,
    input_closed: bool,
}

pub type SharedConsole = Arc<Mutex<ConsoleState>>;

pub fn shared_console() -> SharedConsole {
    Arc::new(Mutex::new(ConsoleState::default()))
}

pub struct TerminalPresenter {
    state: SharedConsole,
}

impl TerminalPresenter {
    pub fn new(state: SharedConsole) -> Self {
        Self { state }
    }
}

impl Presenter for TerminalPresenter {
    fn present(
        &mut self,
        session: SessionId,
        word: &Word,
        settings: &Settings,
    ) -> Result<(), PresentError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| PresentError::Unavailable("console state poisoned".to_string()))?;

        if state.input_closed {
            return Err(PresentError::Unavailable("input closed".to_string()));
        }

        let mut out = io::stdout().lock();
        writeln!(out, "{}", render_prompt(word, settings.sound_enabled))
            .and_then(|_| out.flush())
            .map_err(|e| PresentError::Unavailable(e.to_string()))?;

        state.open = Some(OpenReview {
            session,
            word: word.clone(),
        });
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Status,
    Start,
    Stop,
    Now,
    Interval(i64),
    Stats,
    Help,
    Quit,
}

impl ConsoleCommand {
    pub fn parse(line: &str) -> Result<Self, String> {
        let mut parts = line.split_whitespace();
        let Some(name) = parts.next() else {
            return Err("Empty command".to_string());
        };

        let cmd = match name.to_lowercase().as_str() {
            "status" => ConsoleCommand::Status,
            "start" => ConsoleCommand::Start,
            "stop" => ConsoleCommand::Stop,
            "now" => ConsoleCommand::Now,
            "stats" => ConsoleCommand::Stats,
            "help" | "?" => ConsoleCommand::Help,
            "quit" | "exit" | "q" => ConsoleCommand::Quit,
            "interval" => {
                let raw = parts
                    .next()
                    .ok_or_else(|| "Usage: interval <seconds>".to_string())?;
                let secs = raw
                    .parse::<i64>()
                    .map_err(|_| format!("Not a number: {}", raw))?;
                ConsoleCommand::Interval(secs)
            }
            other => return Err(format!("Unknown command '{}'. Type 'help'.", other)),
        };

        if parts.next().is_some() {
            return Err(format!("Too many arguments for '{}'", name));
        }
        Ok(cmd)
    }
}

/// What a line means while a word is on screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewReply {
    Answer(ReviewOutcome),
    Skip,
}

impl ReviewReply {
    pub fn parse(line: &str) -> Option<Self> {
        match line.trim().to_lowercase().as_str() {
            "s" | "skip" => Some(ReviewReply::Skip),
            other => ReviewOutcome::from_str(other).map(ReviewReply::Answer),
        }
    }
}

/// One line of input, read in the context of whether a card is showing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleInput {
    Reply(ReviewReply),
    Command(ConsoleCommand),
    Invalid(String),
}

/// While a card is open, answers take precedence but commands still work.
pub fn interpret(line: &str, reviewing: bool) -> ConsoleInput {
    if reviewing {
        if let Some(reply) = ReviewReply::parse(line) {
            return ConsoleInput::Reply(reply);
        }
    }
    match ConsoleCommand::parse(line) {
        Ok(cmd) => ConsoleInput::Command(cmd),
        Err(_) if reviewing => ConsoleInput::Invalid("Answer with y, n or s.".to_string()),
        Err(msg) => ConsoleInput::Invalid(msg),
    }
}

pub fn render_prompt(word: &Word, bell: bool) -> String {
    let mut out = String::new();
    if bell {
        out.push_str(BELL);
    }
    out.push_str(&format!("\n=== {} ===\n", word.word));
    out.push_str(&format!(
        "{}  reviewed {} times\n",
        word.proficiency_stars(),
        word.review_count
    ));
    out.push_str("Do you know it? [y]es / [n]o / [s]kip");
    out
}

pub fn render_answer(word: &Word, outcome: ReviewOutcome) -> String {
    let verdict = if outcome.is_correct() {
        "Correct!"
    } else {
        "Keep practicing."
    };
    let mut out = format!("{} {}: {}", verdict, word.word, word.meaning);
    if let Some(example) = &word.example {
        out.push_str(&format!("\n  e.g. {}", example));
    }
    out
}

pub fn render_status(status: &SchedulerStatus) -> String {
    let mut out = format!(
        "Study mode: {} ({})\nInterval: {}s",
        if status.is_running { "on" } else { "off" },
        status.state.label(),
        status.settings.study_interval_seconds
    );
    if let Some(id) = status.current_word_id {
        out.push_str(&format!("\nShowing word {}", id));
    }
    out
}

pub fn render_stats(stats: &Stats) -> String {
    format!(
        "Words: {} ({} mastered, {} due)\nReviews: {} ({} correct, {} wrong, {}% accuracy)",
        stats.total_words,
        stats.mastered_words,
        stats.due_now,
        stats.total_reviews,
        stats.total_correct,
        stats.total_wrong,
        stats.accuracy()
    )
}

/// Read stdin on a dedicated thread until `quit` or EOF, then close any open
/// review and ask the scheduler to shut down.
pub fn spawn_reader(
    state: SharedConsole,
    handle: SchedulerHandle,
    signals: SessionSignals,
    runtime: Handle,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    log::warn!("Failed to read input: {}", e);
                    break;
                }
            };
            if line.trim().is_empty() {
                continue;
            }

            let open = take_open(&state);
            match interpret(&line, open.is_some()) {
                ConsoleInput::Reply(reply) => {
                    let Some(open) = open else { continue };
                    match reply {
                        ReviewReply::Answer(outcome) => {
                            println!("{}", render_answer(&open.word, outcome));
                            signals.blocking_answered(open.session, outcome);
                        }
                        ReviewReply::Skip => {
                            println!("Skipped {}.", open.word.word);
                            signals.blocking_closed(open.session);
                        }
                    }
                }
                ConsoleInput::Command(cmd) => {
                    // The card stays open; quit closes it below
                    if let Some(open) = open {
                        restore_open(&state, open);
                    }
                    if cmd == ConsoleCommand::Quit {
                        break;
                    }
                    println!("{}", runtime.block_on(run_command(&handle, cmd)));
                }
                ConsoleInput::Invalid(msg) => {
                    if let Some(open) = open {
                        restore_open(&state, open);
                    }
                    println!("{}", msg);
                }
            }
        }

        let open = {
            let mut guard = state.lock().unwrap_or_else(PoisonError::into_inner);
            guard.input_closed = true;
            guard.open.take()
        };
        if let Some(open) = open {
            signals.blocking_closed(open.session);
        }
        runtime.block_on(handle.shutdown());
    })
}

fn take_open(state: &SharedConsole) -> Option<OpenReview> {
    state
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .open
        .take()
}

fn restore_open(state: &SharedConsole, open: OpenReview) {
    let mut guard = state.lock().unwrap_or_else(PoisonError::into_inner);
    // A newer card may have been shown meanwhile
    if guard.open.is_none() {
        guard.open = Some(open);
    }
}

async fn run_command(handle: &SchedulerHandle, cmd: ConsoleCommand) -> String {
    match cmd {
        ConsoleCommand::Status => match handle.status().await {
            Some(status) => render_status(&status),
            None => "Scheduler is not running".to_string(),
        },
        ConsoleCommand::Start => handle.start().await.message,
        ConsoleCommand::Stop => handle.stop().await.message,
        ConsoleCommand::Now => {
            let report = handle.trigger_now().await;
            // A presented card prints itself
            if report.word.is_some() {
                String::new()
            } else {
                report.message
            }
        }
        ConsoleCommand::Interval(secs) => {
            handle
                .update_settings(SettingsPatch::interval(secs))
                .await
                .message
        }
        ConsoleCommand::Stats => match handle.stats().await {
            Ok(stats) => render_stats(&stats),
            Err(e) => format!("Failed to load stats: {}", e),
        },
        ConsoleCommand::Help => HELP.to_string(),
        ConsoleCommand::Quit => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::sample_word;
    use crate::scheduler::CycleState;
    use chrono::Utc;

    mod command_tests {
        use super::*;

        #[test]
        fn parse_simple_commands() {
            assert_eq!(ConsoleCommand::parse("status"), Ok(ConsoleCommand::Status));
            assert_eq!(ConsoleCommand::parse("  START "), Ok(ConsoleCommand::Start));
            assert_eq!(ConsoleCommand::parse("stop"), Ok(ConsoleCommand::Stop));
            assert_eq!(ConsoleCommand::parse("now"), Ok(ConsoleCommand::Now));
            assert_eq!(ConsoleCommand::parse("stats"), Ok(ConsoleCommand::Stats));
            assert_eq!(ConsoleCommand::parse("?"), Ok(ConsoleCommand::Help));
            assert_eq!(ConsoleCommand::parse("q"), Ok(ConsoleCommand::Quit));
        }

        #[test]
        fn parse_interval() {
            assert_eq!(
                ConsoleCommand::parse("interval 45"),
                Ok(ConsoleCommand::Interval(45))
            );
            // Range is checked by the controller
            assert_eq!(
                ConsoleCommand::parse("interval -5"),
                Ok(ConsoleCommand::Interval(-5))
            );
        }

        #[test]
        fn parse_interval_errors() {
            assert!(ConsoleCommand::parse("interval").is_err());
            assert!(ConsoleCommand::parse("interval soon").is_err());
            assert!(ConsoleCommand::parse("interval 5 6").is_err());
        }

        #[test]
        fn parse_unknown_command() {
            let err = ConsoleCommand::parse("dance").unwrap_err();
            assert!(err.contains("dance"));
            assert!(ConsoleCommand::parse("   ").is_err());
        }
    }

    mod reply_tests {
        use super::*;

        #[test]
        fn parse_answers() {
            assert_eq!(
                ReviewReply::parse("y"),
                Some(ReviewReply::Answer(ReviewOutcome::Correct))
            );
            assert_eq!(
                ReviewReply::parse(" N "),
                Some(ReviewReply::Answer(ReviewOutcome::Wrong))
            );
            assert_eq!(ReviewReply::parse("s"), Some(ReviewReply::Skip));
            assert_eq!(ReviewReply::parse("skip"), Some(ReviewReply::Skip));
            assert_eq!(ReviewReply::parse("maybe"), None);
        }
    }

    mod interpret_tests {
        use super::*;

        #[test]
        fn answers_win_while_reviewing() {
            assert_eq!(
                interpret("y", true),
                ConsoleInput::Reply(ReviewReply::Answer(ReviewOutcome::Correct))
            );
            assert_eq!(interpret("s", true), ConsoleInput::Reply(ReviewReply::Skip));
        }

        #[test]
        fn commands_work_while_reviewing() {
            assert_eq!(
                interpret("quit", true),
                ConsoleInput::Command(ConsoleCommand::Quit)
            );
            assert_eq!(
                interpret("stop", true),
                ConsoleInput::Command(ConsoleCommand::Stop)
            );
            assert_eq!(
                interpret("status", true),
                ConsoleInput::Command(ConsoleCommand::Status)
            );
        }

        #[test]
        fn gibberish_while_reviewing_asks_for_answer() {
            assert_eq!(
                interpret("maybe", true),
                ConsoleInput::Invalid("Answer with y, n or s.".to_string())
            );
        }

        #[test]
        fn answers_without_card_are_unknown_commands() {
            match interpret("y", false) {
                ConsoleInput::Invalid(msg) => assert!(msg.contains("Unknown command")),
                other => panic!("Expected Invalid, got {:?}", other),
            }
        }
    }

    mod render_tests {
        use super::*;

        #[test]
        fn prompt_hides_meaning() {
            let word = sample_word(1, 2, Utc::now());
            let prompt = render_prompt(&word, false);
            assert!(prompt.contains(&word.word));
            assert!(!prompt.contains(&word.meaning));
            assert!(!prompt.starts_with(BELL));
        }

        #[test]
        fn prompt_rings_when_sound_enabled() {
            let word = sample_word(1, 0, Utc::now());
            assert!(render_prompt(&word, true).starts_with(BELL));
        }

        #[test]
        fn answer_reveals_meaning_and_example() {
            let mut word = sample_word(1, 0, Utc::now());
            word.example = Some("used in a sentence".to_string());

            let right = render_answer(&word, ReviewOutcome::Correct);
            assert!(right.starts_with("Correct!"));
            assert!(right.contains(&word.meaning));
            assert!(right.contains("used in a sentence"));

            let wrong = render_answer(&word, ReviewOutcome::Wrong);
            assert!(!wrong.starts_with("Correct!"));
        }

        #[test]
        fn status_shows_state_and_word() {
            let status = SchedulerStatus {
                is_running: true,
                state: CycleState::Presenting,
                settings: Settings::default(),
                has_pending_timer: false,
                current_word_id: Some(9),
            };
            let text = render_status(&status);
            assert!(text.contains("on (presenting)"));
            assert!(text.contains("30s"));
            assert!(text.contains("word 9"));
        }

        #[test]
        fn stats_includes_accuracy() {
            let stats = Stats {
                total_words: 4,
                mastered_words: 1,
                total_reviews: 4,
                total_correct: 3,
                total_wrong: 1,
                due_now: 2,
            };
            assert!(render_stats(&stats).contains("75% accuracy"));
        }
    }

    mod presenter_tests {
        use super::*;

        #[test]
        fn present_records_open_session() {
            let state = shared_console();
            let mut presenter = TerminalPresenter::new(state.clone());
            let word = sample_word(3, 1, Utc::now());

            presenter
                .present(11, &word, &Settings::default())
                .expect("present should succeed");

            let open = take_open(&state).expect("session should be open");
            assert_eq!(open.session, 11);
            assert_eq!(open.word.id, 3);
        }

        #[test]
        fn present_fails_after_input_closed() {
            let state = shared_console();
            state.lock().unwrap().input_closed = true;
            let mut presenter = TerminalPresenter::new(state.clone());

            let result = presenter.present(1, &sample_word(1, 0, Utc::now()), &Settings::default());

            assert!(matches!(result, Err(PresentError::Unavailable(_))));
            assert!(take_open(&state).is_none());
        }

        #[test]
        fn restore_keeps_newer_card() {
            let state = shared_console();
            let mut presenter = TerminalPresenter::new(state.clone());
            let old = OpenReview {
                session: 1,
                word: sample_word(1, 0, Utc::now()),
            };
            presenter
                .present(2, &sample_word(2, 0, Utc::now()), &Settings::default())
                .unwrap();

            restore_open(&state, old);

            assert_eq!(take_open(&state).map(|o| o.session), Some(2));
        }
    }
}
