use course_core::model::{Course, CourseId};
use tracing::debug;

use super::SqliteRepository;
use super::mapping::{map_course_row, map_sqlx};
use crate::repository::{CourseCatalog, CourseOrder, StorageError};

impl SqliteRepository {
    /// Insert or refresh a catalog course. Used by seeding, not by clients.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the write fails.
    pub async fn upsert_course(&self, course: &Course) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO courses (id, title, description, thumbnail_url, duration_minutes, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                description = excluded.description,
                thumbnail_url = excluded.thumbnail_url,
                duration_minutes = excluded.duration_minutes
            ",
        )
        .bind(course.id().to_string())
        .bind(course.title())
        .bind(course.description())
        .bind(course.thumbnail().map(ToString::to_string))
        .bind(i64::from(course.duration_minutes()))
        .bind(course.created_at())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;

        debug!(course = %course.id(), "upserted course");
        Ok(())
    }
}

#[async_trait::async_trait]
impl CourseCatalog for SqliteRepository {
    async fn list_courses(&self, order: CourseOrder) -> Result<Vec<Course>, StorageError> {
        let sql = match order {
            CourseOrder::CreatedDesc => {
                r"
                SELECT id, title, description, thumbnail_url, duration_minutes, created_at
                FROM courses
                ORDER BY created_at DESC, id DESC
                "
            }
            CourseOrder::CreatedAsc => {
                r"
                SELECT id, title, description, thumbnail_url, duration_minutes, created_at
                FROM courses
                ORDER BY created_at ASC, id ASC
                "
            }
        };

        let rows = sqlx::query(sql)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx)?;

        let mut courses = Vec::with_capacity(rows.len());
        for row in rows {
            courses.push(map_course_row(&row)?);
        }
        Ok(courses)
    }

    async fn get_course(&self, id: CourseId) -> Result<Course, StorageError> {
        let row = sqlx::query(
            r"
            SELECT id, title, description, thumbnail_url, duration_minutes, created_at
            FROM courses WHERE id = ?1
            ",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?;

        match row {
            Some(row) => map_course_row(&row),
            None => Err(StorageError::NotFound),
        }
    }
}
