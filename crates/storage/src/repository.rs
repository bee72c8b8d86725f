use async_trait::async_trait;
use course_core::model::{
    Completion, Course, CourseId, Email, NewProgressRecord, PrincipalId, ProgressId,
    ProgressRecord,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

use crate::identity::{AccountDirectory, AccountRecord};

/// Errors surfaced by storage adapters.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    /// A uniqueness constraint rejected the write.
    #[error("conflict")]
    Conflict,

    /// The ownership predicate rejected the write.
    #[error("forbidden")]
    Forbidden,

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Sort order for catalog listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CourseOrder {
    /// Newest first.
    #[default]
    CreatedDesc,
    CreatedAsc,
}

/// Read-only view of the `courses` collection.
#[async_trait]
pub trait CourseCatalog: Send + Sync {
    /// List every course in the given order.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Unavailable` if the store cannot be reached.
    async fn list_courses(&self, order: CourseOrder) -> Result<Vec<Course>, StorageError>;

    /// Fetch a course by ID.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if missing, or other storage errors.
    async fn get_course(&self, id: CourseId) -> Result<Course, StorageError>;
}

/// Ownership-scoped access to the `user_courses` collection.
///
/// `actor` is the authenticated principal the call is made on behalf of. The
/// store applies its ownership predicate to it; callers never get to see or
/// touch rows owned by anyone else.
#[async_trait]
pub trait ProgressRepository: Send + Sync {
    /// Fetch the actor's record for a course. `Ok(None)` means not started.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the store cannot be read.
    async fn get_record(
        &self,
        actor: PrincipalId,
        course_id: CourseId,
    ) -> Result<Option<ProgressRecord>, StorageError>;

    /// All records owned by the actor, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the store cannot be read.
    async fn list_records(&self, actor: PrincipalId) -> Result<Vec<ProgressRecord>, StorageError>;

    /// Insert a record for the (owner, course) pair.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the pair already has a record,
    /// `StorageError::NotFound` if the course does not exist, and
    /// `StorageError::Forbidden` if `record.owner` is not the actor.
    async fn create_record(
        &self,
        actor: PrincipalId,
        record: NewProgressRecord,
    ) -> Result<ProgressRecord, StorageError>;

    /// Replace the completion of an existing record.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the record is gone and
    /// `StorageError::Forbidden` if the actor does not own it.
    async fn update_record(
        &self,
        actor: PrincipalId,
        id: ProgressId,
        completion: Completion,
    ) -> Result<ProgressRecord, StorageError>;
}

#[derive(Default)]
struct MemoryState {
    offline: bool,
    courses: HashMap<CourseId, Course>,
    records: HashMap<ProgressId, ProgressRecord>,
    by_pair: HashMap<(PrincipalId, CourseId), ProgressId>,
    accounts: HashMap<Email, AccountRecord>,
}

/// In-memory store for tests and local runs.
///
/// Enforces the same uniqueness and ownership rules as the SQLite schema.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, StorageError> {
        let guard = self
            .state
            .lock()
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;
        if guard.offline {
            return Err(StorageError::Unavailable("in-memory store is offline".into()));
        }
        Ok(guard)
    }

    /// Simulates losing (or regaining) the connection to the store.
    pub fn set_offline(&self, offline: bool) {
        let mut guard = self
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        guard.offline = offline;
    }

    /// Adds a course to the catalog. Catalog writes are an operator concern
    /// and deliberately absent from `CourseCatalog`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the id is already taken.
    pub fn insert_course(&self, course: Course) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        if guard.courses.contains_key(&course.id()) {
            return Err(StorageError::Conflict);
        }
        guard.courses.insert(course.id(), course);
        Ok(())
    }

    /// Total number of progress rows across all owners.
    #[must_use]
    pub fn record_count(&self) -> usize {
        self.state
            .lock()
            .map(|guard| guard.records.len())
            .unwrap_or_default()
    }
}

#[async_trait]
impl CourseCatalog for InMemoryRepository {
    async fn list_courses(&self, order: CourseOrder) -> Result<Vec<Course>, StorageError> {
        let guard = self.lock()?;
        let mut courses: Vec<Course> = guard.courses.values().cloned().collect();
        courses.sort_by_key(|c| (c.created_at(), c.id()));
        if order == CourseOrder::CreatedDesc {
            courses.reverse();
        }
        Ok(courses)
    }

    async fn get_course(&self, id: CourseId) -> Result<Course, StorageError> {
        let guard = self.lock()?;
        guard.courses.get(&id).cloned().ok_or(StorageError::NotFound)
    }
}

#[async_trait]
impl ProgressRepository for InMemoryRepository {
    async fn get_record(
        &self,
        actor: PrincipalId,
        course_id: CourseId,
    ) -> Result<Option<ProgressRecord>, StorageError> {
        let guard = self.lock()?;
        Ok(guard
            .by_pair
            .get(&(actor, course_id))
            .and_then(|id| guard.records.get(id))
            .cloned())
    }

    async fn list_records(&self, actor: PrincipalId) -> Result<Vec<ProgressRecord>, StorageError> {
        let guard = self.lock()?;
        let mut records: Vec<ProgressRecord> = guard
            .records
            .values()
            .filter(|r| r.owner() == actor)
            .cloned()
            .collect();
        records.sort_by_key(|r| (r.created_at(), r.id()));
        Ok(records)
    }

    async fn create_record(
        &self,
        actor: PrincipalId,
        record: NewProgressRecord,
    ) -> Result<ProgressRecord, StorageError> {
        let mut guard = self.lock()?;
        if record.owner != actor {
            return Err(StorageError::Forbidden);
        }
        if !guard.courses.contains_key(&record.course_id) {
            return Err(StorageError::NotFound);
        }
        let pair = (record.owner, record.course_id);
        if guard.by_pair.contains_key(&pair) {
            return Err(StorageError::Conflict);
        }

        let stored = record.assign_id(ProgressId::generate());
        guard.by_pair.insert(pair, stored.id());
        guard.records.insert(stored.id(), stored.clone());
        Ok(stored)
    }

    async fn update_record(
        &self,
        actor: PrincipalId,
        id: ProgressId,
        completion: Completion,
    ) -> Result<ProgressRecord, StorageError> {
        let mut guard = self.lock()?;
        let existing = guard.records.get_mut(&id).ok_or(StorageError::NotFound)?;
        if existing.owner() != actor {
            return Err(StorageError::Forbidden);
        }
        *existing = existing.clone().with_completion(completion);
        Ok(existing.clone())
    }
}

#[async_trait]
impl AccountDirectory for InMemoryRepository {
    async fn insert_account(&self, account: AccountRecord) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        let email = account.principal.email().clone();
        if guard.accounts.contains_key(&email) {
            return Err(StorageError::Conflict);
        }
        guard.accounts.insert(email, account);
        Ok(())
    }

    async fn find_account(&self, email: &Email) -> Result<Option<AccountRecord>, StorageError> {
        let guard = self.lock()?;
        Ok(guard.accounts.get(email).cloned())
    }
}

/// Aggregates the backend collections behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub courses: Arc<dyn CourseCatalog>,
    pub progress: Arc<dyn ProgressRepository>,
    pub accounts: Arc<dyn AccountDirectory>,
}

impl Storage {
    /// Wraps an existing in-memory repository so callers can keep a handle
    /// for seeding courses.
    #[must_use]
    pub fn from_memory(repo: &InMemoryRepository) -> Self {
        let courses: Arc<dyn CourseCatalog> = Arc::new(repo.clone());
        let progress: Arc<dyn ProgressRepository> = Arc::new(repo.clone());
        let accounts: Arc<dyn AccountDirectory> = Arc::new(repo.clone());
        Self {
            courses,
            progress,
            accounts,
        }
    }

    #[must_use]
    pub fn in_memory() -> Self {
        Self::from_memory(&InMemoryRepository::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use course_core::time::fixed_now;

    fn course(title: &str, minutes_after: i64) -> Course {
        Course::new(
            CourseId::generate(),
            title,
            "",
            None,
            30,
            fixed_now() + Duration::minutes(minutes_after),
        )
        .unwrap()
    }

    fn completed_for(owner: PrincipalId, course_id: CourseId) -> NewProgressRecord {
        NewProgressRecord::new(
            owner,
            course_id,
            Completion::Completed { at: fixed_now() },
            fixed_now(),
        )
    }

    #[tokio::test]
    async fn lists_courses_newest_first() {
        let repo = InMemoryRepository::new();
        let old = course("Old", 0);
        let new = course("New", 10);
        repo.insert_course(old.clone()).unwrap();
        repo.insert_course(new.clone()).unwrap();

        let desc = repo.list_courses(CourseOrder::CreatedDesc).await.unwrap();
        assert_eq!(desc, vec![new.clone(), old.clone()]);
        let asc = repo.list_courses(CourseOrder::CreatedAsc).await.unwrap();
        assert_eq!(asc, vec![old, new]);
    }

    #[tokio::test]
    async fn empty_catalog_lists_nothing() {
        let repo = InMemoryRepository::new();
        assert!(repo.list_courses(CourseOrder::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn offline_store_is_unavailable() {
        let repo = InMemoryRepository::new();
        repo.set_offline(true);
        let err = repo.list_courses(CourseOrder::default()).await.unwrap_err();
        assert!(matches!(err, StorageError::Unavailable(_)));

        repo.set_offline(false);
        assert!(repo.list_courses(CourseOrder::default()).await.is_ok());
    }

    #[tokio::test]
    async fn second_create_for_pair_conflicts() {
        let repo = InMemoryRepository::new();
        let c = course("Rust", 0);
        repo.insert_course(c.clone()).unwrap();
        let owner = PrincipalId::generate();

        let first = repo.create_record(owner, completed_for(owner, c.id())).await.unwrap();
        let err = repo
            .create_record(owner, completed_for(owner, c.id()))
            .await
            .unwrap_err();
        assert_eq!(err, StorageError::Conflict);
        assert_eq!(repo.record_count(), 1);
        assert_eq!(repo.get_record(owner, c.id()).await.unwrap(), Some(first));
    }

    #[tokio::test]
    async fn create_for_missing_course_is_not_found() {
        let repo = InMemoryRepository::new();
        let owner = PrincipalId::generate();
        let err = repo
            .create_record(owner, completed_for(owner, CourseId::generate()))
            .await
            .unwrap_err();
        assert_eq!(err, StorageError::NotFound);
    }

    #[tokio::test]
    async fn ownership_predicate_guards_writes_and_reads() {
        let repo = InMemoryRepository::new();
        let c = course("Rust", 0);
        repo.insert_course(c.clone()).unwrap();
        let owner = PrincipalId::generate();
        let intruder = PrincipalId::generate();

        let err = repo
            .create_record(intruder, completed_for(owner, c.id()))
            .await
            .unwrap_err();
        assert_eq!(err, StorageError::Forbidden);

        let record = repo.create_record(owner, completed_for(owner, c.id())).await.unwrap();
        let err = repo
            .update_record(intruder, record.id(), Completion::Incomplete)
            .await
            .unwrap_err();
        assert_eq!(err, StorageError::Forbidden);

        assert_eq!(repo.get_record(intruder, c.id()).await.unwrap(), None);
        assert!(repo.list_records(intruder).await.unwrap().is_empty());
        assert_eq!(repo.list_records(owner).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn update_of_unknown_record_is_not_found() {
        let repo = InMemoryRepository::new();
        let err = repo
            .update_record(PrincipalId::generate(), ProgressId::generate(), Completion::Incomplete)
            .await
            .unwrap_err();
        assert_eq!(err, StorageError::NotFound);
    }

    #[tokio::test]
    async fn repeated_reads_are_equal() {
        let repo = InMemoryRepository::new();
        let c = course("Rust", 0);
        repo.insert_course(c.clone()).unwrap();
        let owner = PrincipalId::generate();
        repo.create_record(owner, completed_for(owner, c.id())).await.unwrap();

        let first = repo.get_record(owner, c.id()).await.unwrap();
        let second = repo.get_record(owner, c.id()).await.unwrap();
        assert_eq!(first, second);
    }
}
