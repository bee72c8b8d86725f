use std::sync::Arc;

use course_core::model::{Course, CourseId};
use storage::repository::{CourseCatalog, CourseOrder};

use crate::error::CatalogError;

/// Read-only access to the course catalog.
#[derive(Clone)]
pub struct CatalogService {
    courses: Arc<dyn CourseCatalog>,
}

impl CatalogService {
    #[must_use]
    pub fn new(courses: Arc<dyn CourseCatalog>) -> Self {
        Self { courses }
    }

    /// All courses, newest first.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::StoreUnavailable` if the catalog cannot be reached.
    pub async fn list_courses(&self) -> Result<Vec<Course>, CatalogError> {
        Ok(self.courses.list_courses(CourseOrder::CreatedDesc).await?)
    }

    /// # Errors
    ///
    /// Returns `CatalogError::NotFound` if no course has this id.
    pub async fn get_course(&self, id: CourseId) -> Result<Course, CatalogError> {
        Ok(self.courses.get_course(id).await?)
    }

    /// Looks a course up by its external key (as found in a URL).
    /// Keys that are not valid ids cannot name a course and report `NotFound`.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::NotFound` for malformed or unknown keys.
    pub async fn get_course_by_key(&self, key: &str) -> Result<Course, CatalogError> {
        let id: CourseId = key.parse().map_err(|_| CatalogError::NotFound)?;
        self.get_course(id).await
    }
}
