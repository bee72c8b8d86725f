use std::fmt;

use course_core::model::{CompletionState, Course, CourseId};
use services::{AppContext, Clock};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const DEFAULT_DB_URL: &str = "sqlite://dev.sqlite3";
const DEFAULT_LOG_FILTER: &str = "app=info,services=info,storage=warn";

#[derive(Debug, PartialEq, Eq)]
enum ArgsError {
    MissingCommand,
    UnknownCommand(String),
    MissingValue { flag: &'static str },
    MissingCourse { command: &'static str },
    MissingCredentials,
    UnknownArg(String),
    InvalidCourseId { raw: String },
    InvalidDbUrl { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingCommand => write!(f, "missing command"),
            ArgsError::UnknownCommand(cmd) => write!(f, "unknown command: {cmd}"),
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::MissingCourse { command } => write!(f, "{command} requires a course id"),
            ArgsError::MissingCredentials => {
                write!(f, "--email and --password (or COURSE_EMAIL/COURSE_PASSWORD) are required")
            }
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidCourseId { raw } => write!(f, "invalid course id: {raw}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
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

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Courses,
    Course { key: String },
    Signup,
    Status { course: CourseId },
    Toggle { course: CourseId },
    Completed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Credentials {
    email: String,
    password: String,
}

#[derive(Debug)]
struct Args {
    db_url: String,
    credentials: Option<Credentials>,
    command: Command,
}

impl Args {
    fn parse(
        args: impl IntoIterator<Item = String>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ArgsError> {
        let mut db_url =
            env("COURSE_DB_URL").map_or_else(|| DEFAULT_DB_URL.into(), normalize_sqlite_url);
        let mut email = env("COURSE_EMAIL");
        let mut password = env("COURSE_PASSWORD");
        let mut course: Option<String> = None;
        let mut positional: Vec<String> = Vec::new();

        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(&mut args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = normalize_sqlite_url(value);
                }
                "--email" => email = Some(require_value(&mut args, "--email")?),
                "--password" => password = Some(require_value(&mut args, "--password")?),
                "--course" => course = Some(require_value(&mut args, "--course")?),
                _ if arg.starts_with('-') => return Err(ArgsError::UnknownArg(arg)),
                _ => positional.push(arg),
            }
        }

        let mut positional = positional.into_iter();
        let name = positional.next().ok_or(ArgsError::MissingCommand)?;
        let command = match name.as_str() {
            "courses" => Command::Courses,
            "course" => {
                let key = positional
                    .next()
                    .or(course.take())
                    .ok_or(ArgsError::MissingCourse { command: "course" })?;
                Command::Course { key }
            }
            "signup" => Command::Signup,
            "status" => Command::Status {
                course: parse_course_id(course.take(), "status")?,
            },
            "toggle" => Command::Toggle {
                course: parse_course_id(course.take(), "toggle")?,
            },
            "completed" => Command::Completed,
            _ => return Err(ArgsError::UnknownCommand(name)),
        };
        if let Some(extra) = positional.next() {
            return Err(ArgsError::UnknownArg(extra));
        }

        let credentials = match (email, password) {
            (Some(email), Some(password)) => Some(Credentials { email, password }),
            _ => None,
        };
        if command == Command::Signup && credentials.is_none() {
            return Err(ArgsError::MissingCredentials);
        }

        Ok(Self {
            db_url,
            credentials,
            command,
        })
    }
}

fn parse_course_id(raw: Option<String>, command: &'static str) -> Result<CourseId, ArgsError> {
    let raw = raw.ok_or(ArgsError::MissingCourse { command })?;
    raw.parse()
        .map_err(|_| ArgsError::InvalidCourseId { raw: raw.clone() })
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  course [options] courses");
    eprintln!("  course [options] course <id>");
    eprintln!("  course [options] signup");
    eprintln!("  course [options] status --course <id>");
    eprintln!("  course [options] toggle --course <id>");
    eprintln!("  course [options] completed");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --db <sqlite_url>         SQLite URL (default: {DEFAULT_DB_URL})");
    eprintln!("  --email <email>           Account to sign in as");
    eprintln!("  --password <password>     Password for --email");
    eprintln!("  -h, --help                Show this help");
    eprintln!();
    eprintln!("Environment (same as flags):");
    eprintln!("  COURSE_DB_URL, COURSE_EMAIL, COURSE_PASSWORD, RUST_LOG");
}

fn normalize_sqlite_url(raw: String) -> String {
    let trimmed = raw.trim();
    if trimmed == "sqlite::memory:" || trimmed.starts_with("sqlite://") {
        return trimmed.to_string();
    }

    let path_str = trimmed.strip_prefix("sqlite:").unwrap_or(trimmed);
    let path = std::path::Path::new(path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| std::path::PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

fn prepare_sqlite_dir(db_url: &str) -> Result<(), Box<dyn std::error::Error>> {
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

    if let Some(parent) = std::path::Path::new(path).parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn describe(state: CompletionState) -> &'static str {
    match state {
        CompletionState::NotStarted => "not started",
        CompletionState::InProgress => "in progress",
        CompletionState::Completed => "completed",
    }
}

fn print_course_line(course: &Course, completed: bool) {
    let badge = if completed { "[x]" } else { "[ ]" };
    println!(
        "{badge} {}  {}  ({} min)",
        course.id(),
        course.title(),
        course.duration_minutes()
    );
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let argv: Vec<String> = std::env::args().skip(1).collect();
    if argv.is_empty() || argv.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return Ok(());
    }

    let args = Args::parse(argv, |key| std::env::var(key).ok()).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    prepare_sqlite_dir(&args.db_url)?;
    let ctx = AppContext::sqlite(&args.db_url, Clock::system(), None).await?;
    debug!(db = %args.db_url, "storage ready");

    let auth = ctx.auth();
    if let Some(credentials) = &args.credentials {
        if args.command == Command::Signup {
            let principal = auth.sign_up(&credentials.email, &credentials.password).await?;
            println!("signed up {} ({})", principal.email(), principal.id());
            return Ok(());
        }
        auth.sign_in(&credentials.email, &credentials.password).await?;
    }

    let session = ctx.session();
    let catalog = ctx.catalog();
    match args.command {
        Command::Courses => {
            let completed = session.completed_courses().await?;
            let courses = catalog.list_courses().await?;
            if courses.is_empty() {
                println!("no courses yet");
            }
            for course in &courses {
                print_course_line(course, completed.contains(&course.id()));
            }
        }
        Command::Course { key } => {
            let course = catalog.get_course_by_key(&key).await?;
            let state = ctx.tracker().state(course.id()).await?;
            println!("{}", course.title());
            if !course.description().is_empty() {
                println!("{}", course.description());
            }
            if let Some(thumbnail) = course.thumbnail() {
                println!("thumbnail: {thumbnail}");
            }
            println!("duration: {} min", course.duration_minutes());
            println!("status: {}", describe(state));
        }
        Command::Status { course } => {
            let course = catalog.get_course(course).await?;
            let state = ctx.tracker().state(course.id()).await?;
            println!("{}: {}", course.title(), describe(state));
        }
        Command::Toggle { course } => {
            let outcome = session.toggle(course).await?;
            info!(course = %course, state = ?outcome.state, "toggled");
            match outcome.record.completed_at() {
                Some(at) => println!("{}: completed at {}", course, at.to_rfc3339()),
                None => println!("{}: {}", course, describe(outcome.state)),
            }
        }
        Command::Completed => {
            let completed = session.completed_courses().await?;
            if completed.is_empty() {
                println!("no completed courses");
            }
            for id in completed {
                let course = catalog.get_course(id).await?;
                print_course_line(&course, true);
            }
        }
        Command::Signup => return Err(ArgsError::MissingCredentials.into()),
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    init_tracing();

    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}
