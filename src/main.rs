mod console;
mod db;
mod error;
mod interval;
mod models;
mod scheduler;
mod settings;

use chrono::Utc;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use console::TerminalPresenter;
use db::Database;
use models::{JsonOutput, NewWord, ReviewOutcome, Word, WordEdit};
use scheduler::runtime::SpawnedScheduler;
use settings::SettingsPatch;

const DEFAULT_DB_NAME: &str = "wordloop.db";

#[derive(Parser)]
#[command(name = "wordloop")]
#[command(about = "Spaced-repetition vocabulary trainer that quizzes you on a timer")]
#[command(version)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database
    Init,

    /// Manage words
    #[command(subcommand)]
    Word(WordCommands),

    /// List words due for review now
    Due,

    /// Record a review answer for a word
    Review {
        /// Word ID
        id: i64,

        /// Review outcome: correct/wrong
        #[arg(long, short)]
        outcome: String,
    },

    /// Show review statistics
    Stats,

    /// View or change settings
    #[command(subcommand)]
    Settings(SettingsCommands),

    /// Show persisted study mode state
    Status,

    /// Enter study mode and quiz due words in the foreground
    Run {
        /// Present a due word immediately
        #[arg(long)]
        now: bool,
    },
}

#[derive(Subcommand)]
enum WordCommands {
    /// List all words
    List {
        /// Only favorites
        #[arg(long, short)]
        favorites: bool,
    },

    /// Add a new word
    Add {
        /// The word itself
        word: String,

        /// Its meaning
        #[arg(long, short)]
        meaning: String,

        /// An example sentence
        #[arg(long, short)]
        example: Option<String>,
    },

    /// Show word details and review history
    Show {
        /// Word ID
        id: i64,
    },

    /// Edit a word's text
    Edit {
        /// Word ID
        id: i64,

        #[arg(long, short)]
        word: Option<String>,

        #[arg(long, short)]
        meaning: Option<String>,

        #[arg(long, short)]
        example: Option<String>,
    },

    /// Delete a word
    Delete {
        /// Word ID
        id: i64,
    },

    /// Search words, meanings and examples
    Search {
        keyword: String,
    },

    /// Toggle a word's favorite flag
    Favorite {
        /// Word ID
        id: i64,
    },

    /// Import words from a JSON array of {word, meaning, example}
    Import {
        path: PathBuf,
    },

    /// Make every word due now
    ResetSchedule,

    /// Delete all words, review history and settings
    Clear {
        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Subcommand)]
enum SettingsCommands {
    /// Show current settings
    Show,

    /// Change one setting, e.g. `studyInterval 60` or `sound off`
    Set { key: String, value: String },
}

fn get_db_path() -> PathBuf {
    if let Ok(path) = std::env::var("WORDLOOP_DB") {
        return PathBuf::from(path);
    }

    let config_dir = dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("wordloop");

    std::fs::create_dir_all(&config_dir).ok();
    config_dir.join(DEFAULT_DB_NAME)
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn print_json<T: serde::Serialize>(value: T) -> Result<(), serde_json::Error> {
    println!("{}", serde_json::to_string(&JsonOutput::ok(value))?);
    Ok(())
}

fn print_json_err(msg: &str) -> Result<(), serde_json::Error> {
    println!("{}", serde_json::to_string(&JsonOutput::<()>::err(msg))?);
    Ok(())
}

fn word_state(word: &Word, now: chrono::DateTime<Utc>) -> &'static str {
    match (word.is_due(now), word.is_mastered()) {
        (true, _) => "due",
        (false, true) => "mastered",
        (false, false) => "-",
    }
}

fn print_word_table(words: &[Word]) {
    let now = Utc::now();
    println!(
        "{:<5} {:<20} {:<30} {:<7} {:<9} NEXT REVIEW",
        "ID", "WORD", "MEANING", "LEVEL", "STATE"
    );
    println!("{}", "-".repeat(95));
    for w in words {
        println!(
            "{:<5} {:<20} {:<30} {:<7} {:<9} {}",
            w.id,
            truncate(&w.word, 18),
            truncate(&w.meaning, 28),
            w.proficiency_stars(),
            word_state(w, now),
            w.next_review_time.format("%Y-%m-%d %H:%M")
        );
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let db_path = get_db_path();
    let db = Database::open(&db_path)?;
    db.init()?;

    match cli.command {
        Commands::Init => {
            if cli.json {
                print_json(())?;
            } else {
                println!("Database initialized at: {}", db_path.display());
            }
        }

        Commands::Word(word_cmd) => match word_cmd {
            WordCommands::List { favorites } => {
                let words = db.list_words(favorites)?;
                if cli.json {
                    print_json(&words)?;
                } else if words.is_empty() {
                    println!("No words found.");
                } else {
                    print_word_table(&words);
                }
            }

            WordCommands::Add {
                word,
                meaning,
                example,
            } => {
                let new = NewWord {
                    word,
                    meaning,
                    example,
                };
                let id = db.add_word(&new, Utc::now())?;

                if cli.json {
                    print_json(serde_json::json!({ "id": id, "word": new.word }))?;
                } else {
                    println!("Added word '{}' with ID: {}", new.word, id);
                }
            }

            WordCommands::Show { id } => {
                if let Some(word) = db.get_word(id)? {
                    let history = db.review_history(id)?;

                    if cli.json {
                        print_json(serde_json::json!({ "word": word, "history": history }))?;
                    } else {
                        println!("Word: {}", word.word);
                        println!("ID: {}", word.id);
                        println!("Meaning: {}", word.meaning);
                        if let Some(example) = &word.example {
                            println!("Example: {}", example);
                        }
                        println!("Favorite: {}", if word.is_favorite { "yes" } else { "no" });
                        println!("Created: {}", word.created_at);

                        println!();
                        println!("--- Progress ---");
                        println!(
                            "Proficiency: {} (level {})",
                            word.proficiency_stars(),
                            word.proficiency
                        );
                        println!(
                            "Reviews: {} ({:.0}% correct)",
                            word.review_count,
                            word.accuracy()
                        );
                        if let Some(last) = &word.last_review_time {
                            println!("Last reviewed: {}", last);
                        }
                        println!(
                            "Next review: {} ({})",
                            word.next_review_time,
                            word_state(&word, Utc::now())
                        );

                        if !history.is_empty() {
                            println!();
                            println!("--- Recent answers ---");
                            for entry in history.iter().take(10) {
                                println!(
                                    "{}  {}",
                                    entry.reviewed_at.format("%Y-%m-%d %H:%M"),
                                    if entry.is_correct { "correct" } else { "wrong" }
                                );
                            }
                        }
                    }
                } else if cli.json {
                    print_json_err("Word not found")?;
                } else {
                    println!("Word not found.");
                }
            }

            WordCommands::Edit {
                id,
                word,
                meaning,
                example,
            } => {
                let edit = WordEdit {
                    word,
                    meaning,
                    example,
                };
                if edit.is_empty() {
                    return Err("Nothing to change. Pass --word, --meaning or --example".into());
                }

                if db.update_word(id, &edit, Utc::now())? {
                    if cli.json {
                        print_json(())?;
                    } else {
                        println!("Word {} updated.", id);
                    }
                } else if cli.json {
                    print_json_err("Word not found")?;
                } else {
                    println!("Word not found.");
                }
            }

            WordCommands::Delete { id } => {
                if db.delete_word(id)? {
                    if cli.json {
                        print_json(())?;
                    } else {
                        println!("Word {} deleted.", id);
                    }
                } else if cli.json {
                    print_json_err("Word not found")?;
                } else {
                    println!("Word not found.");
                }
            }

            WordCommands::Search { keyword } => {
                let words = db.search_words(&keyword)?;
                if cli.json {
                    print_json(&words)?;
                } else if words.is_empty() {
                    println!("No words match '{}'.", keyword);
                } else {
                    print_word_table(&words);
                }
            }

            WordCommands::Favorite { id } => match db.toggle_favorite(id, Utc::now())? {
                Some(is_favorite) => {
                    if cli.json {
                        print_json(serde_json::json!({ "id": id, "isFavorite": is_favorite }))?;
                    } else if is_favorite {
                        println!("Word {} added to favorites.", id);
                    } else {
                        println!("Word {} removed from favorites.", id);
                    }
                }
                None if cli.json => print_json_err("Word not found")?,
                None => println!("Word not found."),
            },

            WordCommands::Import { path } => {
                let raw = std::fs::read_to_string(&path)?;
                let words: Vec<NewWord> = serde_json::from_str(&raw)?;
                let inserted = db.import_words(&words, Utc::now())?;

                if cli.json {
                    print_json(serde_json::json!({
                        "imported": inserted,
                        "skipped": words.len() - inserted
                    }))?;
                } else {
                    println!(
                        "Imported {} words ({} already present).",
                        inserted,
                        words.len() - inserted
                    );
                }
            }

            WordCommands::ResetSchedule => {
                let count = db.reset_review_schedule(Utc::now())?;
                if cli.json {
                    print_json(serde_json::json!({ "reset": count }))?;
                } else {
                    println!("{} words are now due for review.", count);
                }
            }

            WordCommands::Clear { yes } => {
                if !yes {
                    return Err("This deletes every word and setting. Re-run with --yes".into());
                }
                db.clear_all_data()?;
                if cli.json {
                    print_json(())?;
                } else {
                    println!("All words, review history and settings deleted.");
                }
            }
        },

        Commands::Due => {
            let words = db.due_words(Utc::now())?;
            if cli.json {
                print_json(&words)?;
            } else if words.is_empty() {
                println!("Nothing due. Come back later!");
            } else {
                print_word_table(&words);
            }
        }

        Commands::Review { id, outcome } => {
            let review_outcome = ReviewOutcome::from_str(&outcome).ok_or_else(|| {
                format!("Invalid outcome '{}'. Use: correct or wrong", outcome)
            })?;

            match db.record_review(id, review_outcome.is_correct(), Utc::now())? {
                Some(word) => {
                    if cli.json {
                        print_json(&word)?;
                    } else {
                        println!("Review recorded for '{}'.", word.word);
                        println!(
                            "New proficiency: {} (level {})",
                            word.proficiency_stars(),
                            word.proficiency
                        );
                        println!("Next review scheduled: {}", word.next_review_time);
                    }
                }
                None if cli.json => print_json_err("Word not found")?,
                None => println!("Word not found."),
            }
        }

        Commands::Stats => {
            let stats = db.study_stats(Utc::now())?;
            if cli.json {
                print_json(serde_json::json!({
                    "total_words": stats.total_words,
                    "mastered_words": stats.mastered_words,
                    "total_reviews": stats.total_reviews,
                    "total_correct": stats.total_correct,
                    "total_wrong": stats.total_wrong,
                    "due_now": stats.due_now,
                    "accuracy": stats.accuracy()
                }))?;
            } else {
                println!("=== Review Statistics ===");
                println!("Total words: {}", stats.total_words);
                println!("Mastered (level 5): {}", stats.mastered_words);
                println!("Due for review: {}", stats.due_now);
                println!("Total reviews: {}", stats.total_reviews);
                println!(
                    "Correct / wrong: {} / {}",
                    stats.total_correct, stats.total_wrong
                );
                println!("Accuracy: {}%", stats.accuracy());
            }
        }

        Commands::Settings(settings_cmd) => match settings_cmd {
            SettingsCommands::Show => {
                let current = settings::load(&db)?;
                if cli.json {
                    print_json(&current)?;
                } else {
                    print_settings(&current);
                }
            }

            SettingsCommands::Set { key, value } => {
                let patch = SettingsPatch::from_key_value(&key, &value)?;
                let updated = settings::load(&db)?.merged(&patch);
                settings::save(&db, &updated)?;

                if cli.json {
                    print_json(&updated)?;
                } else {
                    println!("Settings updated.");
                    print_settings(&updated);
                }
            }
        },

        Commands::Status => {
            let current = settings::load(&db)?;
            let running = settings::load_running_flag(&db)?;
            if cli.json {
                print_json(serde_json::json!({
                    "isRunning": running,
                    "settings": current
                }))?;
            } else {
                println!("Study mode: {}", if running { "on" } else { "off" });
                print_settings(&current);
            }
        }

        Commands::Run { now } => run_study_mode(db, now)?,
    }

    Ok(())
}

fn print_settings(s: &settings::Settings) {
    println!("Study interval: {}s", s.study_interval_seconds);
    println!("Sound: {}", if s.sound_enabled { "on" } else { "off" });
    println!("Tray: {}", if s.tray_enabled { "on" } else { "off" });
    println!("Auto start: {}", if s.auto_start { "on" } else { "off" });
}

fn run_study_mode(db: Database, present_now: bool) -> Result<(), Box<dyn std::error::Error>> {
    let runtime = tokio::runtime::Runtime::new()?;

    runtime.block_on(async move {
        let console_state = console::shared_console();
        let SpawnedScheduler {
            handle,
            signals,
            mut task,
        } = scheduler::runtime::spawn(db, TerminalPresenter::new(console_state.clone()));

        let started = handle.start().await;
        println!("{}", started.message);
        if !started.success {
            handle.shutdown().await;
            let _ = task.await;
            return;
        }
        println!("Type 'help' for commands, 'quit' to exit.");

        if present_now {
            let report = handle.trigger_now().await;
            if report.word.is_none() {
                println!("{}", report.message);
            }
        }

        // Blocks on stdin, so it is left detached on exit
        let _reader = console::spawn_reader(
            console_state,
            handle.clone(),
            signals,
            tokio::runtime::Handle::current(),
        );

        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    log::error!("Failed to listen for Ctrl-C: {}", e);
                }
                handle.shutdown().await;
                if let Err(e) = (&mut task).await {
                    log::error!("Scheduler task failed: {}", e);
                }
            }
            result = &mut task => {
                if let Err(e) = result {
                    log::error!("Scheduler task failed: {}", e);
                }
            }
        }
    });

    Ok(())
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    mod truncate_tests {
        use super::*;

        #[test]
        fn truncate_short_string() {
            assert_eq!(truncate("hello", 10), "hello");
        }

        #[test]
        fn truncate_exact_length() {
            assert_eq!(truncate("hello", 5), "hello");
        }

        #[test]
        fn truncate_long_string() {
            assert_eq!(truncate("hello world", 8), "hello...");
        }

        #[test]
        fn truncate_multibyte() {
            assert_eq!(truncate("café au lait", 7), "café...");
        }
    }

    mod word_state_tests {
        use super::*;
        use chrono::Duration;

        fn word(proficiency: i32, next: chrono::DateTime<Utc>) -> Word {
            Word {
                id: 1,
                word: "w".to_string(),
                meaning: "m".to_string(),
                example: None,
                proficiency,
                review_count: 0,
                correct_count: 0,
                wrong_count: 0,
                last_review_time: None,
                next_review_time: next,
                created_at: next,
                updated_at: next,
                is_favorite: false,
            }
        }

        #[test]
        fn due_wins_over_mastered() {
            let now = Utc::now();
            assert_eq!(word_state(&word(5, now - Duration::minutes(1)), now), "due");
            assert_eq!(word_state(&word(5, now + Duration::days(3)), now), "mastered");
            assert_eq!(word_state(&word(2, now + Duration::hours(1)), now), "-");
        }
    }

    mod cli_parsing_tests {
        use super::*;

        #[test]
        fn parse_init_with_json() {
            let cli = Cli::try_parse_from(["wordloop", "--json", "init"]).unwrap();
            assert!(cli.json);
            assert!(matches!(cli.command, Commands::Init));
        }

        #[test]
        fn parse_word_add_full() {
            let cli = Cli::try_parse_from([
                "wordloop",
                "word",
                "add",
                "ephemeral",
                "-m",
                "lasting a short time",
                "-e",
                "ephemeral fame",
            ])
            .unwrap();
            match cli.command {
                Commands::Word(WordCommands::Add {
                    word,
                    meaning,
                    example,
                }) => {
                    assert_eq!(word, "ephemeral");
                    assert_eq!(meaning, "lasting a short time");
                    assert_eq!(example, Some("ephemeral fame".to_string()));
                }
                _ => panic!("Expected Word Add command"),
            }
        }

        #[test]
        fn parse_word_add_requires_meaning() {
            assert!(Cli::try_parse_from(["wordloop", "word", "add", "ephemeral"]).is_err());
        }

        #[test]
        fn parse_word_list_favorites() {
            let cli = Cli::try_parse_from(["wordloop", "word", "list", "--favorites"]).unwrap();
            match cli.command {
                Commands::Word(WordCommands::List { favorites }) => assert!(favorites),
                _ => panic!("Expected Word List command"),
            }
        }

        #[test]
        fn parse_word_edit_partial() {
            let cli =
                Cli::try_parse_from(["wordloop", "word", "edit", "4", "--meaning", "new"]).unwrap();
            match cli.command {
                Commands::Word(WordCommands::Edit {
                    id,
                    word,
                    meaning,
                    example,
                }) => {
                    assert_eq!(id, 4);
                    assert!(word.is_none());
                    assert_eq!(meaning, Some("new".to_string()));
                    assert!(example.is_none());
                }
                _ => panic!("Expected Word Edit command"),
            }
        }

        #[test]
        fn parse_word_reset_schedule() {
            let cli = Cli::try_parse_from(["wordloop", "word", "reset-schedule"]).unwrap();
            assert!(matches!(
                cli.command,
                Commands::Word(WordCommands::ResetSchedule)
            ));
        }

        #[test]
        fn parse_review_command() {
            let cli = Cli::try_parse_from(["wordloop", "review", "7", "-o", "correct"]).unwrap();
            match cli.command {
                Commands::Review { id, outcome } => {
                    assert_eq!(id, 7);
                    assert_eq!(outcome, "correct");
                }
                _ => panic!("Expected Review command"),
            }
        }

        #[test]
        fn parse_settings_set() {
            let args = ["wordloop", "settings", "set", "studyInterval", "60"];
            let cli = Cli::try_parse_from(args).unwrap();
            match cli.command {
                Commands::Settings(SettingsCommands::Set { key, value }) => {
                    assert_eq!(key, "studyInterval");
                    assert_eq!(value, "60");
                }
                _ => panic!("Expected Settings Set command"),
            }
        }

        #[test]
        fn parse_run_now() {
            let cli = Cli::try_parse_from(["wordloop", "run", "--now"]).unwrap();
            assert!(matches!(cli.command, Commands::Run { now: true }));

            let cli = Cli::try_parse_from(["wordloop", "run"]).unwrap();
            assert!(matches!(cli.command, Commands::Run { now: false }));
        }

        #[test]
        fn parse_word_clear() {
            let cli = Cli::try_parse_from(["wordloop", "word", "clear", "--yes"]).unwrap();
            assert!(matches!(
                cli.command,
                Commands::Word(WordCommands::Clear { yes: true })
            ));

            let cli = Cli::try_parse_from(["wordloop", "word", "clear"]).unwrap();
            assert!(matches!(
                cli.command,
                Commands::Word(WordCommands::Clear { yes: false })
            ));
        }

        #[test]
        fn parse_json_flag_global() {
            let cli = Cli::try_parse_from(["wordloop", "due", "--json"]).unwrap();
            assert!(cli.json);
            assert!(matches!(cli.command, Commands::Due));
        }

        #[test]
        fn parse_missing_required_arg_fails() {
            assert!(Cli::try_parse_from(["wordloop", "review", "1"]).is_err());
            assert!(Cli::try_parse_from(["wordloop", "settings", "set", "sound"]).is_err());
            assert!(Cli::try_parse_from(["wordloop", "invalid"]).is_err());
        }
    }

    mod db_path_tests {
        use super::*;
        use std::env;

        // One test touches the env var so parallel runs cannot race
        #[test]
        fn get_db_path_env_and_default() {
            let test_path = "/tmp/test_wordloop.db";
            env::set_var("WORDLOOP_DB", test_path);
            assert_eq!(get_db_path().to_str().unwrap(), test_path);

            env::remove_var("WORDLOOP_DB");
            let path = get_db_path();
            let path_str = path.to_str().unwrap();
            assert!(path_str.ends_with("wordloop.db"));
            assert!(path_str.contains("wordloop"));
        }
    }
}
