use std::fmt;

use chrono::{DateTime, Utc};
use quiz_core::model::{Quiz, QuizId, QuizKind, UserId};
use storage::repository::Storage;

#[derive(Debug, Clone)]
struct Args {
    db_url: String,
    user_id: UserId,
    legacy_level: Option<String>,
    now: Option<DateTime<Utc>>,
}

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidUserId { raw: String },
    InvalidDbUrl { raw: String },
    InvalidNow { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidUserId { raw } => write!(f, "invalid --user-id value: {raw}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            ArgsError::InvalidNow { raw } => {
                write!(f, "invalid --now value (expected RFC3339): {raw}")
            }
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

fn parse_now(value: &str) -> Result<DateTime<Utc>, ArgsError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| ArgsError::InvalidNow {
            raw: value.to_string(),
        })
}

impl Args {
    fn parse() -> Result<Self, ArgsError> {
        let mut db_url =
            std::env::var("QUIZ_DB_URL").unwrap_or_else(|_| "sqlite:quiz.sqlite3?mode=rwc".into());
        let mut user_id = std::env::var("QUIZ_USER_ID")
            .ok()
            .and_then(|value| value.parse::<UserId>().ok())
            .unwrap_or_else(|| UserId::new(1));
        let mut legacy_level = std::env::var("QUIZ_LEGACY_LEVEL")
            .ok()
            .filter(|value| !value.trim().is_empty());
        let mut now = match std::env::var("QUIZ_NOW") {
            Ok(value) => Some(parse_now(&value)?),
            Err(_) => None,
        };

        let mut args = std::env::args().skip(1);
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(&mut args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = value;
                }
                "--user-id" => {
                    let value = require_value(&mut args, "--user-id")?;
                    user_id = value
                        .parse()
                        .map_err(|_| ArgsError::InvalidUserId { raw: value.clone() })?;
                }
                "--legacy-level" => {
                    legacy_level = Some(require_value(&mut args, "--legacy-level")?);
                }
                "--now" => {
                    let value = require_value(&mut args, "--now")?;
                    now = Some(parse_now(&value)?);
                }
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(Self {
            db_url,
            user_id,
            legacy_level,
            now,
        })
    }
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p storage --bin seed -- [options]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --db <sqlite_url>         SQLite URL (default: sqlite:quiz.sqlite3?mode=rwc)");
    eprintln!("  --user-id <id>            Profile to attach a legacy level to (default: 1)");
    eprintln!("  --legacy-level <label>    Store an old-style level label (e.g. B+) for the profile");
    eprintln!("  --now <rfc3339>           Fixed current time, logged with the seed run");
    eprintln!("  -h, --help                Show this help");
    eprintln!();
    eprintln!("Environment (same as flags):");
    eprintln!("  QUIZ_DB_URL, QUIZ_USER_ID, QUIZ_LEGACY_LEVEL, QUIZ_NOW");
}

fn q(text: &str, options: &[&str], correct: usize, explanation: &str) -> (String, Vec<String>, usize, String) {
    (
        text.to_string(),
        options.iter().map(|o| (*o).to_string()).collect(),
        correct,
        explanation.to_string(),
    )
}

fn sample_quizzes() -> Result<Vec<Quiz>, quiz_core::model::QuizError> {
    let greetings = Quiz::from_parts(
        QuizId::new(1),
        "German greetings",
        QuizKind::Practice,
        vec![
            q(
                "What does \"Hallo\" mean?",
                &["Hello", "Goodbye", "Thanks", "Please"],
                0,
                "\"Hallo\" is the everyday greeting.",
            ),
            q(
                "How do you say \"Thank you\"?",
                &["Bitte", "Danke", "Tschuss", "Morgen"],
                1,
                "\"Danke\" thanks someone; \"Bitte\" answers it.",
            ),
            q(
                "Which phrase is used in the morning?",
                &["Gute Nacht", "Guten Abend", "Guten Morgen", "Gute Reise"],
                2,
                "\"Guten Morgen\" is the morning greeting.",
            ),
            q(
                "What does \"Tschuss\" mean?",
                &["Hello", "Sorry", "Please", "Bye"],
                3,
                "\"Tschuss\" is an informal goodbye.",
            ),
        ],
    )?;

    let placement = Quiz::from_parts(
        QuizId::new(2),
        "Placement test",
        QuizKind::LevelTest,
        vec![
            q(
                "Choose the article: ___ Haus",
                &["der", "die", "das"],
                2,
                "\"Haus\" is neuter.",
            ),
            q(
                "Ich ___ gestern ins Kino gegangen.",
                &["habe", "bin", "war"],
                1,
                "Verbs of motion form the perfect with \"sein\".",
            ),
            q(
                "Pick the correct dative: mit ___ Freund",
                &["mein", "meinen", "meinem"],
                2,
                "\"mit\" always takes the dative.",
            ),
            q(
                "Wenn ich Zeit ___, wurde ich reisen.",
                &["habe", "hatte", "hätte"],
                2,
                "Unreal conditions use Konjunktiv II.",
            ),
        ],
    )?;

    Ok(vec![greetings, placement])
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse().map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    let storage = Storage::sqlite(&args.db_url).await?;
    let now = args.now.unwrap_or_else(Utc::now);

    let quizzes = sample_quizzes()?;
    for quiz in &quizzes {
        storage.quizzes.upsert_quiz(quiz).await?;
    }

    if let Some(label) = &args.legacy_level {
        storage
            .levels
            .save_legacy_label(args.user_id, label.trim())
            .await?;
    }

    println!(
        "Seeded {} quizzes{} into {} at {}",
        quizzes.len(),
        args.legacy_level
            .as_deref()
            .map(|label| format!(" and legacy level {label} for user {}", args.user_id))
            .unwrap_or_default(),
        args.db_url,
        now.to_rfc3339()
    );

    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}
