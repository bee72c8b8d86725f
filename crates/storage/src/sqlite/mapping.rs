use chrono::{DateTime, Utc};
use course_core::model::{
    Course, CourseId, Email, Principal, PrincipalId, ProgressId, ProgressRecord, Thumbnail,
};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use crate::identity::AccountRecord;
use crate::repository::StorageError;

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

/// Classifies driver errors into the store's error vocabulary.
pub(crate) fn map_sqlx(e: sqlx::Error) -> StorageError {
    match &e {
        sqlx::Error::RowNotFound => StorageError::NotFound,
        sqlx::Error::Database(db) if db.is_unique_violation() => StorageError::Conflict,
        sqlx::Error::Database(db) if db.is_foreign_key_violation() => StorageError::NotFound,
        sqlx::Error::Database(db) if db.is_check_violation() => {
            StorageError::Serialization(db.message().to_owned())
        }
        _ => StorageError::Unavailable(e.to_string()),
    }
}

fn parse_id<T: std::str::FromStr>(row: &SqliteRow, column: &str) -> Result<T, StorageError>
where
    T::Err: core::fmt::Display,
{
    row.try_get::<String, _>(column)
        .map_err(ser)?
        .parse::<T>()
        .map_err(ser)
}

pub(crate) fn map_course_row(row: &SqliteRow) -> Result<Course, StorageError> {
    let thumbnail = row
        .try_get::<Option<String>, _>("thumbnail_url")
        .map_err(ser)?
        .map(Thumbnail::parse)
        .transpose()
        .map_err(ser)?;
    let duration = u32::try_from(row.try_get::<i64, _>("duration_minutes").map_err(ser)?)
        .map_err(|_| StorageError::Serialization("duration_minutes overflow".into()))?;

    Course::new(
        parse_id::<CourseId>(row, "id")?,
        row.try_get::<String, _>("title").map_err(ser)?,
        row.try_get::<String, _>("description").map_err(ser)?,
        thumbnail,
        duration,
        row.try_get::<DateTime<Utc>, _>("created_at").map_err(ser)?,
    )
    .map_err(ser)
}

pub(crate) fn map_progress_row(row: &SqliteRow) -> Result<ProgressRecord, StorageError> {
    ProgressRecord::from_persisted(
        parse_id::<ProgressId>(row, "id")?,
        parse_id::<PrincipalId>(row, "user_id")?,
        parse_id::<CourseId>(row, "course_id")?,
        row.try_get::<bool, _>("completed").map_err(ser)?,
        row.try_get::<Option<DateTime<Utc>>, _>("completed_at")
            .map_err(ser)?,
        row.try_get::<DateTime<Utc>, _>("created_at").map_err(ser)?,
    )
    .map_err(ser)
}

pub(crate) fn map_account_row(row: &SqliteRow) -> Result<AccountRecord, StorageError> {
    let email = Email::parse(row.try_get::<String, _>("email").map_err(ser)?).map_err(ser)?;
    Ok(AccountRecord {
        principal: Principal::new(parse_id::<PrincipalId>(row, "id")?, email),
        password_hash: row.try_get("password_hash").map_err(ser)?,
        created_at: row.try_get("created_at").map_err(ser)?,
    })
}
