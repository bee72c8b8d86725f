use course_core::model::{Completion, CourseId, NewProgressRecord, PrincipalId, ProgressId, ProgressRecord};
use tracing::{debug, warn};

use super::SqliteRepository;
use super::mapping::{map_progress_row, map_sqlx};
use crate::repository::{ProgressRepository, StorageError};

// Every statement filters on `user_id`, which is how the ownership predicate
// is expressed against a plain SQLite file.
#[async_trait::async_trait]
impl ProgressRepository for SqliteRepository {
    async fn get_record(
        &self,
        actor: PrincipalId,
        course_id: CourseId,
    ) -> Result<Option<ProgressRecord>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT id, user_id, course_id, completed, completed_at, created_at
            FROM user_courses
            WHERE user_id = ?1 AND course_id = ?2
            ",
        )
        .bind(actor.to_string())
        .bind(course_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?;

        row.as_ref().map(map_progress_row).transpose()
    }

    async fn list_records(&self, actor: PrincipalId) -> Result<Vec<ProgressRecord>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT id, user_id, course_id, completed, completed_at, created_at
            FROM user_courses
            WHERE user_id = ?1
            ORDER BY created_at ASC, id ASC
            ",
        )
        .bind(actor.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            records.push(map_progress_row(&row)?);
        }
        Ok(records)
    }

    async fn create_record(
        &self,
        actor: PrincipalId,
        record: NewProgressRecord,
    ) -> Result<ProgressRecord, StorageError> {
        if record.owner != actor {
            warn!(%actor, owner = %record.owner, "rejected progress insert for another principal");
            return Err(StorageError::Forbidden);
        }

        let id = ProgressId::generate();
        let row = sqlx::query(
            r"
            INSERT INTO user_courses (id, user_id, course_id, completed, completed_at, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            RETURNING id, user_id, course_id, completed, completed_at, created_at
            ",
        )
        .bind(id.to_string())
        .bind(record.owner.to_string())
        .bind(record.course_id.to_string())
        .bind(record.completion.is_completed())
        .bind(record.completion.completed_at())
        .bind(record.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx)?;

        debug!(record = %id, course = %record.course_id, "created progress record");
        map_progress_row(&row)
    }

    async fn update_record(
        &self,
        actor: PrincipalId,
        id: ProgressId,
        completion: Completion,
    ) -> Result<ProgressRecord, StorageError> {
        let updated = sqlx::query(
            r"
            UPDATE user_courses
            SET completed = ?1, completed_at = ?2
            WHERE id = ?3 AND user_id = ?4
            RETURNING id, user_id, course_id, completed, completed_at, created_at
            ",
        )
        .bind(completion.is_completed())
        .bind(completion.completed_at())
        .bind(id.to_string())
        .bind(actor.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?;

        if let Some(row) = updated {
            debug!(record = %id, completed = completion.is_completed(), "updated progress record");
            return map_progress_row(&row);
        }

        // Nothing matched: either the row is gone or it belongs to someone else.
        let exists = sqlx::query("SELECT 1 FROM user_courses WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)?;
        if exists.is_some() {
            warn!(%actor, record = %id, "rejected progress update for another principal");
            Err(StorageError::Forbidden)
        } else {
            Err(StorageError::NotFound)
        }
    }
}
