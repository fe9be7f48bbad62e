use std::fmt;
use std::io::{BufRead, Write};

use quiz_core::model::{Level, QuizId, SessionError, Step, UserId};
use services::{AppServices, Clock, QuizLoopError, QuizRun, settings_from_env};
use tracing_subscriber::EnvFilter;

mod render;

use render::Input;

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidQuizId { raw: String },
    InvalidUserId { raw: String },
    InvalidLimit { raw: String },
    InvalidDbUrl { raw: String },
    QuizRequired,
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidQuizId { raw } => write!(f, "invalid --quiz value: {raw}"),
            ArgsError::InvalidUserId { raw } => write!(f, "invalid --user value: {raw}"),
            ArgsError::InvalidLimit { raw } => write!(f, "invalid --limit value: {raw}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            ArgsError::QuizRequired => write!(f, "play requires --quiz <id>"),
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

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p app -- quizzes [--db <sqlite_url>]");
    eprintln!("  cargo run -p app -- play --quiz <id> [--user <id>] [--db <sqlite_url>]");
    eprintln!("  cargo run -p app -- level   [--user <id>] [--db <sqlite_url>]");
    eprintln!("  cargo run -p app -- history [--user <id>] [--limit <n>] [--db <sqlite_url>]");
    eprintln!();
    eprintln!("Defaults:");
    eprintln!("  --db sqlite://quiz.sqlite3");
    eprintln!("  --user 1");
    eprintln!("  --limit 10");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  QUIZ_DB_URL, QUIZ_USER_ID, QUIZ_API_URL, QUIZ_MIRROR_TIMEOUT_SECS, QUIZ_SHUFFLE");
    eprintln!("  RUST_LOG (default: info)");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Quizzes,
    Play,
    Level,
    History,
}

impl Command {
    fn from_arg(arg: &str) -> Option<Self> {
        match arg {
            "quizzes" => Some(Self::Quizzes),
            "play" => Some(Self::Play),
            "level" | "levels" => Some(Self::Level),
            "history" => Some(Self::History),
            _ => None,
        }
    }
}

struct Args {
    db_url: String,
    user_id: UserId,
    quiz_id: Option<QuizId>,
    limit: u32,
}

impl Args {
    fn parse(args: &mut impl Iterator<Item = String>) -> Result<Self, ArgsError> {
        let mut db_url = std::env::var("QUIZ_DB_URL")
            .ok()
            .map_or_else(|| "sqlite://quiz.sqlite3".into(), normalize_sqlite_url);
        let mut user_id = std::env::var("QUIZ_USER_ID")
            .ok()
            .and_then(|value| value.parse::<UserId>().ok())
            .unwrap_or_else(|| UserId::new(1));
        let mut quiz_id = None;
        let mut limit = 10;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = normalize_sqlite_url(value);
                }
                "--user" => {
                    let value = require_value(args, "--user")?;
                    user_id = value
                        .parse()
                        .map_err(|_| ArgsError::InvalidUserId { raw: value.clone() })?;
                }
                "--quiz" => {
                    let value = require_value(args, "--quiz")?;
                    let parsed: QuizId = value
                        .parse()
                        .map_err(|_| ArgsError::InvalidQuizId { raw: value.clone() })?;
                    quiz_id = Some(parsed);
                }
                "--limit" => {
                    let value = require_value(args, "--limit")?;
                    limit = value
                        .parse::<u32>()
                        .map_err(|_| ArgsError::InvalidLimit { raw: value.clone() })?;
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
            quiz_id,
            limit,
        })
    }
}

fn normalize_sqlite_url(raw: String) -> String {
    if raw == "sqlite::memory:" || raw.starts_with("sqlite://") {
        return raw;
    }

    let trimmed = raw.trim().to_string();
    let path_str = trimmed
        .strip_prefix("sqlite:")
        .unwrap_or(trimmed.as_str())
        .to_string();
    let path = std::path::Path::new(&path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| std::path::PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

fn prepare_sqlite_file(db_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    if db_url == "sqlite::memory:" {
        return Ok(());
    }

    let path = db_url
        .strip_prefix("sqlite://")
        .ok_or_else(|| ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        })?;
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        return Err(ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        }
        .into());
    }

    let path = std::path::Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    if !path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;
    }

    Ok(())
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut argv: Vec<String> = std::env::args().skip(1).collect();

    let cmd = match argv.first().map(String::as_str) {
        None => Command::Quizzes,
        Some("--help" | "-h") => {
            print_usage();
            return Ok(());
        }
        Some(first) if first.starts_with("--") => Command::Quizzes,
        Some(first) => Command::from_arg(first).ok_or_else(|| {
            eprintln!("unknown subcommand: {first}");
            print_usage();
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "unknown subcommand")
        })?,
    };

    if !argv.is_empty() && !argv[0].starts_with("--") {
        argv.remove(0);
    }

    let mut iter = argv.into_iter();
    let parsed = Args::parse(&mut iter).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    // Storage is opened here so core and services never touch the filesystem.
    prepare_sqlite_file(&parsed.db_url)?;
    let settings = settings_from_env()?;
    let services = AppServices::new_sqlite(&parsed.db_url, Clock::default_clock(), settings).await?;

    let outcome = match cmd {
        Command::Quizzes => list_quizzes(&services).await,
        Command::Play => {
            let quiz_id = parsed.quiz_id.ok_or(ArgsError::QuizRequired)?;
            play(&services, quiz_id, parsed.user_id).await
        }
        Command::Level => {
            let standing = services.progress().highest_level(parsed.user_id).await?;
            println!("{}", render::standing(&standing));
            Ok(())
        }
        Command::History => {
            let items = services
                .history()
                .list_recent(parsed.user_id, parsed.limit)
                .await?;
            if items.is_empty() {
                println!("No results yet for user {}.", parsed.user_id);
            }
            for item in &items {
                println!("{}", render::history_line(item));
            }
            Ok(())
        }
    };

    if !services.shutdown().await {
        eprintln!("Some results could not be sent to the remote API before exit.");
    }
    outcome
}

async fn list_quizzes(services: &AppServices) -> Result<(), Box<dyn std::error::Error>> {
    let quizzes = services.quiz_loop().list_quizzes(128).await?;
    if quizzes.is_empty() {
        println!("No quizzes stored. Run `cargo run -p storage --bin seed` first.");
    }
    for quiz in &quizzes {
        println!(
            "{:>3}  {:<11} {:>2} questions  {}",
            quiz.id(),
            quiz.kind().as_str(),
            quiz.len(),
            quiz.title()
        );
    }
    Ok(())
}

async fn play(
    services: &AppServices,
    quiz_id: QuizId,
    user_id: UserId,
) -> Result<(), Box<dyn std::error::Error>> {
    let quiz_loop = services.quiz_loop();
    let mut run = match quiz_loop.start_quiz(quiz_id).await {
        Ok(run) => run,
        Err(QuizLoopError::Session(SessionError::InvalidQuizData)) => {
            println!("Quiz {quiz_id} is missing or has no questions. Pick one from `quizzes`.");
            return Ok(());
        }
        Err(err) => return Err(err.into()),
    };
    let level_test = run.session().quiz().kind().is_level_test();

    let stdin = std::io::stdin();
    let mut lines = stdin.lock().lines();

    loop {
        println!();
        println!("{}", render::question(run.session()));
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next() else {
            return Ok(());
        };

        match render::parse_input(&line?) {
            Input::Select(idx) => {
                if let Err(err) = run.select_answer(idx) {
                    println!("{err}");
                }
            }
            Input::Previous => {
                if let Err(err) = run.retreat() {
                    println!("{err}");
                }
            }
            Input::Quit => return Ok(()),
            Input::Invalid => println!("Unrecognised input."),
            Input::Next => {
                let advanced = if level_test {
                    quiz_loop
                        .advance_level_test(&mut run, user_id, |result| {
                            Level::for_score(result.percentage())
                        })
                        .await
                } else {
                    quiz_loop.advance(&mut run, user_id).await
                };

                match advanced {
                    Ok(advanced) => {
                        if let Step::Finished(result) = advanced.step {
                            println!();
                            println!("{}", render::result(&result, run.level_achieved()));
                            return Ok(());
                        }
                    }
                    Err(QuizLoopError::Session(err)) => println!("{err}"),
                    Err(err) if run.is_complete() => {
                        return finish_after_failure(services, &mut run, user_id, &err).await;
                    }
                    Err(err) => return Err(err.into()),
                }
            }
        }
    }
}

/// The run completed but storing it failed: retry once, show the result either way.
async fn finish_after_failure(
    services: &AppServices,
    run: &mut QuizRun,
    user_id: UserId,
    first_error: &QuizLoopError,
) -> Result<(), Box<dyn std::error::Error>> {
    tracing::warn!(error = %first_error, "storing result failed, retrying");
    if let Err(err) = services.quiz_loop().finalize_result(run, user_id).await {
        eprintln!("Result could not be saved: {err}");
    }
    let result = run.session().score()?;
    println!();
    println!("{}", render::result(&result, run.level_achieved()));
    Ok(())
}

#[tokio::main]
async fn main() {
    init_logging();
    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}
