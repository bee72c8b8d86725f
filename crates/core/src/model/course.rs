use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::model::ids::CourseId;
use crate::model::thumbnail::Thumbnail;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CourseError {
    #[error("course title cannot be empty")]
    EmptyTitle,

    #[error("course duration must be > 0 minutes")]
    InvalidDuration,
}

//
// ─── COURSE ────────────────────────────────────────────────────────────────────
//

/// A catalog course.
///
/// Courses are owned by the catalog and never mutated by clients, so the type
/// only offers a validating constructor and read accessors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Course {
    id: CourseId,
    title: String,
    description: String,
    thumbnail: Option<Thumbnail>,
    duration_minutes: u32,
    created_at: DateTime<Utc>,
}

impl Course {
    /// Builds a course, validating title and duration.
    ///
    /// # Errors
    ///
    /// Returns `CourseError::EmptyTitle` for a blank title and
    /// `CourseError::InvalidDuration` for a zero duration.
    pub fn new(
        id: CourseId,
        title: impl Into<String>,
        description: impl Into<String>,
        thumbnail: Option<Thumbnail>,
        duration_minutes: u32,
        created_at: DateTime<Utc>,
    ) -> Result<Self, CourseError> {
        let title = title.into();
        if title.trim().is_empty() {
            return Err(CourseError::EmptyTitle);
        }
        if duration_minutes == 0 {
            return Err(CourseError::InvalidDuration);
        }

        Ok(Self {
            id,
            title,
            description: description.into(),
            thumbnail,
            duration_minutes,
            created_at,
        })
    }

    #[must_use]
    pub fn id(&self) -> CourseId {
        self.id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    #[must_use]
    pub fn thumbnail(&self) -> Option<&Thumbnail> {
        self.thumbnail.as_ref()
    }

    #[must_use]
    pub fn duration_minutes(&self) -> u32 {
        self.duration_minutes
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}
