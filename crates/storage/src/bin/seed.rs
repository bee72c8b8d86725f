use std::fmt;

use chrono::{DateTime, Duration, Utc};
use course_core::model::{Course, CourseId, Thumbnail};
use storage::sqlite::SqliteRepository;
use uuid::Uuid;

#[derive(Debug, Clone)]
struct Args {
    db_url: String,
    now: Option<DateTime<Utc>>,
}

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidDbUrl { raw: String },
    InvalidNow { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
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

impl Args {
    fn parse() -> Result<Self, ArgsError> {
        let mut db_url =
            std::env::var("COURSE_DB_URL").unwrap_or_else(|_| "sqlite://dev.sqlite3".into());
        let mut now: Option<DateTime<Utc>> = None;

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
                "--now" => {
                    let value = require_value(&mut args, "--now")?;
                    let parsed = DateTime::parse_from_rfc3339(&value)
                        .map_err(|_| ArgsError::InvalidNow { raw: value.clone() })?
                        .with_timezone(&Utc);
                    now = Some(parsed);
                }
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(Self { db_url, now })
    }
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p storage --bin seed -- [options]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --db <sqlite_url>         SQLite URL (default: sqlite://dev.sqlite3)");
    eprintln!("  --now <rfc3339>           Fixed current time for deterministic seeding");
    eprintln!("  -h, --help                Show this help");
    eprintln!();
    eprintln!("Environment (same as flags):");
    eprintln!("  COURSE_DB_URL");
}

// Stable ids so re-running the seed refreshes rows instead of duplicating them.
const SAMPLES: [(u128, &str, &str, &str, u32); 4] = [
    (
        0x0001,
        "Rust Fundamentals",
        "Ownership, borrowing and the type system.",
        "https://cdn.example.com/covers/rust.png",
        180,
    ),
    (
        0x0002,
        "Async Rust",
        "Futures, executors and structured concurrency.",
        "https://cdn.example.com/covers/async.png",
        240,
    ),
    (
        0x0003,
        "SQL for Application Developers",
        "Schemas, constraints and transactions.",
        "covers/sql.png",
        120,
    ),
    (
        0x0004,
        "Web Security Basics",
        "Sessions, password storage and row-level access control.",
        "covers/security.png",
        90,
    ),
];

fn sample_courses(now: DateTime<Utc>) -> Result<Vec<Course>, course_core::Error> {
    let count = SAMPLES.len();
    SAMPLES
        .iter()
        .enumerate()
        .map(|(offset, (id, title, description, thumbnail, minutes))| -> Result<Course, course_core::Error> {
            // Space creation times out so newest-first ordering is visible.
            let days_back = i64::try_from(count - offset).unwrap_or(i64::MAX);
            Ok(Course::new(
                CourseId::new(Uuid::from_u128(*id)),
                *title,
                *description,
                Some(Thumbnail::parse(thumbnail)?),
                *minutes,
                now - Duration::days(days_back),
            )?)
        })
        .collect()
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse().map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    let repo = SqliteRepository::connect(&args.db_url).await?;
    repo.migrate().await?;
    let now = args.now.unwrap_or_else(Utc::now);

    for course in sample_courses(now)? {
        repo.upsert_course(&course).await?;
    }

    println!("Seeded {} courses into {}", SAMPLES.len(), args.db_url);

    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use course_core::time::fixed_now;

    #[test]
    fn samples_are_valid_and_staggered() {
        let courses = sample_courses(fixed_now()).unwrap();
        assert_eq!(courses.len(), SAMPLES.len());
        assert!(courses.windows(2).all(|w| w[0].created_at() < w[1].created_at()));
        assert!(courses.iter().all(|c| c.created_at() < fixed_now()));
    }
}
