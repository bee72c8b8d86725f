use std::collections::BTreeSet;
use std::sync::Arc;

use course_core::model::{
    Completion, CompletionState, CourseId, NewProgressRecord, PrincipalId, ProgressRecord,
};
use storage::identity::IdentityProvider;
use storage::repository::{ProgressRepository, StorageError};
use tracing::{debug, error, warn};

use crate::Clock;
use crate::error::ProgressError;

/// Authoritative result of a toggle: the record exactly as the store returned it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToggleOutcome {
    pub state: CompletionState,
    pub record: ProgressRecord,
}

impl ToggleOutcome {
    fn from_record(record: ProgressRecord) -> Self {
        Self {
            state: record.state(),
            record,
        }
    }

    #[must_use]
    pub fn course_id(&self) -> CourseId {
        self.record.course_id()
    }
}

/// Answers "is this course complete for the signed-in principal?" and flips it.
///
/// Holds no completion state of its own. Every `toggle` re-reads the store,
/// and the store's (principal, course) uniqueness constraint is the only
/// thing that arbitrates between sessions of the same principal.
#[derive(Clone)]
pub struct ProgressTracker {
    clock: Clock,
    identity: Arc<dyn IdentityProvider>,
    progress: Arc<dyn ProgressRepository>,
}

impl ProgressTracker {
    #[must_use]
    pub fn new(
        clock: Clock,
        identity: Arc<dyn IdentityProvider>,
        progress: Arc<dyn ProgressRepository>,
    ) -> Self {
        Self {
            clock,
            identity,
            progress,
        }
    }

    /// Current completion state of a course. Anonymous callers see `NotStarted`.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError` if the store cannot be read.
    pub async fn state(&self, course_id: CourseId) -> Result<CompletionState, ProgressError> {
        let Some(principal) = self.identity.current_principal().await else {
            return Ok(CompletionState::NotStarted);
        };
        let record = self
            .progress
            .get_record(principal.id(), course_id)
            .await
            .map_err(storage_failure)?;
        Ok(CompletionState::of(record.as_ref()))
    }

    /// The signed-in principal's record for a course, if one exists.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::Unauthenticated` for anonymous callers.
    pub async fn record(&self, course_id: CourseId) -> Result<Option<ProgressRecord>, ProgressError> {
        let principal = self
            .identity
            .current_principal()
            .await
            .ok_or(ProgressError::Unauthenticated)?;
        self.progress
            .get_record(principal.id(), course_id)
            .await
            .map_err(storage_failure)
    }

    /// Courses the signed-in principal has completed, for badge rendering.
    /// Empty for anonymous callers.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError` if the store cannot be read.
    pub async fn completed_courses(&self) -> Result<BTreeSet<CourseId>, ProgressError> {
        let Some(principal) = self.identity.current_principal().await else {
            return Ok(BTreeSet::new());
        };
        self.completed_courses_of(principal.id()).await
    }

    /// Completed courses of an already resolved principal.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError` if the store cannot be read.
    pub async fn completed_courses_of(
        &self,
        actor: PrincipalId,
    ) -> Result<BTreeSet<CourseId>, ProgressError> {
        let records = self
            .progress
            .list_records(actor)
            .await
            .map_err(storage_failure)?;
        Ok(records
            .into_iter()
            .filter(ProgressRecord::completed)
            .map(|r| r.course_id())
            .collect())
    }

    /// Flip the course's completion for the signed-in principal.
    ///
    /// `NotStarted` and `InProgress` become `Completed`; `Completed` becomes
    /// `InProgress`. Exactly one store mutation is committed on success.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::Unauthenticated` without touching the store
    /// when nobody is signed in, `ProgressError::Conflict` if a lost creation
    /// race could not be resolved with one retry, and the mapped storage
    /// error otherwise.
    pub async fn toggle(&self, course_id: CourseId) -> Result<ToggleOutcome, ProgressError> {
        let principal = self
            .identity
            .current_principal()
            .await
            .ok_or(ProgressError::Unauthenticated)?;
        self.toggle_for(principal.id(), course_id).await
    }

    async fn toggle_for(
        &self,
        actor: PrincipalId,
        course_id: CourseId,
    ) -> Result<ToggleOutcome, ProgressError> {
        let current = self
            .progress
            .get_record(actor, course_id)
            .await
            .map_err(storage_failure)?;
        let from = CompletionState::of(current.as_ref());
        let now = self.clock.now();
        let target = from.toggled(now);

        let record = match current {
            Some(existing) => self
                .progress
                .update_record(actor, existing.id(), target)
                .await
                .map_err(storage_failure)?,
            None => {
                let new = NewProgressRecord::new(actor, course_id, target, now);
                match self.progress.create_record(actor, new).await {
                    Ok(created) => created,
                    Err(StorageError::Conflict) => {
                        self.converge_after_conflict(actor, course_id, target).await?
                    }
                    Err(err) => return Err(storage_failure(err)),
                }
            }
        };

        let outcome = ToggleOutcome::from_record(record);
        debug!(
            principal = %actor,
            course = %course_id,
            ?from,
            to = ?outcome.state,
            "toggled course completion"
        );
        Ok(outcome)
    }

    // Another session of the same principal created the row between our read
    // and our insert. Re-read once and push our intended completion through
    // the update path instead of dropping it.
    async fn converge_after_conflict(
        &self,
        actor: PrincipalId,
        course_id: CourseId,
        target: Completion,
    ) -> Result<ProgressRecord, ProgressError> {
        warn!(principal = %actor, course = %course_id, "lost progress creation race, retrying as update");

        let existing = self
            .progress
            .get_record(actor, course_id)
            .await
            .map_err(retry_failure)?
            .ok_or(ProgressError::Conflict)?;

        // Keep the winner's timestamp when it already recorded the completion.
        let completion = match (existing.completion(), target) {
            (winner @ Completion::Completed { .. }, Completion::Completed { .. }) => winner,
            _ => target,
        };

        self.progress
            .update_record(actor, existing.id(), completion)
            .await
            .map_err(retry_failure)
    }
}

fn storage_failure(err: StorageError) -> ProgressError {
    if err == StorageError::Forbidden {
        error!("progress store rejected a write by ownership");
    }
    ProgressError::from(err)
}

fn retry_failure(err: StorageError) -> ProgressError {
    match err {
        StorageError::Forbidden | StorageError::Unavailable(_) => storage_failure(err),
        _ => ProgressError::Conflict,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use course_core::model::{Course, Email, Principal};
    use course_core::time::fixed_now;
    use storage::identity::FixedIdentity;
    use storage::repository::InMemoryRepository;

    struct Fixture {
        repo: InMemoryRepository,
        course: CourseId,
        principal: Principal,
    }

    fn fixture() -> Fixture {
        let repo = InMemoryRepository::new();
        let course = Course::new(CourseId::generate(), "Rust", "", None, 60, fixed_now()).unwrap();
        let course_id = course.id();
        repo.insert_course(course).unwrap();
        let principal = Principal::new(
            PrincipalId::generate(),
            Email::parse("u1@example.com").unwrap(),
        );
        Fixture {
            repo,
            course: course_id,
            principal,
        }
    }

    fn tracker(fx: &Fixture, identity: FixedIdentity) -> ProgressTracker {
        ProgressTracker::new(
            Clock::fixed(fixed_now()),
            Arc::new(identity),
            Arc::new(fx.repo.clone()),
        )
    }

    #[tokio::test]
    async fn toggle_twice_completes_then_reopens() {
        let fx = fixture();
        let tracker = tracker(&fx, FixedIdentity::signed_in(fx.principal.clone()));
        assert_eq!(tracker.state(fx.course).await.unwrap(), CompletionState::NotStarted);

        let first = tracker.toggle(fx.course).await.unwrap();
        assert_eq!(first.state, CompletionState::Completed);
        assert!(first.record.completed());
        assert_eq!(first.record.completed_at(), Some(fixed_now()));
        assert_eq!(first.record.owner(), fx.principal.id());

        let second = tracker.toggle(fx.course).await.unwrap();
        assert_eq!(second.state, CompletionState::InProgress);
        assert!(!second.record.completed());
        assert_eq!(second.record.completed_at(), None);
        assert_eq!(second.record.id(), first.record.id());
        assert_eq!(fx.repo.record_count(), 1);
    }

    #[tokio::test]
    async fn toggle_parity_decides_completion() {
        let fx = fixture();
        let tracker = tracker(&fx, FixedIdentity::signed_in(fx.principal.clone()));

        for n in 1..=7 {
            let outcome = tracker.toggle(fx.course).await.unwrap();
            assert_eq!(outcome.record.completed(), n % 2 == 1, "after {n} toggles");
            assert_eq!(
                outcome.record.completed(),
                outcome.record.completed_at().is_some()
            );
        }
        assert_eq!(fx.repo.record_count(), 1);
    }

    #[tokio::test]
    async fn anonymous_toggle_is_unauthenticated() {
        let fx = fixture();
        let tracker = tracker(&fx, FixedIdentity::anonymous());

        let err = tracker.toggle(fx.course).await.unwrap_err();
        assert_eq!(err, ProgressError::Unauthenticated);
        assert_eq!(fx.repo.record_count(), 0);
        assert_eq!(tracker.state(fx.course).await.unwrap(), CompletionState::NotStarted);
        assert!(tracker.completed_courses().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn toggle_unknown_course_is_not_found() {
        let fx = fixture();
        let tracker = tracker(&fx, FixedIdentity::signed_in(fx.principal.clone()));
        let err = tracker.toggle(CourseId::generate()).await.unwrap_err();
        assert_eq!(err, ProgressError::NotFound);
        assert_eq!(fx.repo.record_count(), 0);
    }

    #[tokio::test]
    async fn offline_store_is_transient_and_writes_nothing() {
        let fx = fixture();
        let tracker = tracker(&fx, FixedIdentity::signed_in(fx.principal.clone()));
        fx.repo.set_offline(true);

        let err = tracker.toggle(fx.course).await.unwrap_err();
        assert!(matches!(err, ProgressError::StoreUnavailable(_)));
        assert!(err.is_transient());

        fx.repo.set_offline(false);
        assert_eq!(fx.repo.record_count(), 0);
    }

    #[tokio::test]
    async fn toggle_rereads_store_truth() {
        let fx = fixture();
        let mut clock = Clock::fixed(fixed_now());
        let session_a = tracker(&fx, FixedIdentity::signed_in(fx.principal.clone()));
        clock.advance(Duration::minutes(1));
        let session_b = ProgressTracker::new(
            clock,
            Arc::new(FixedIdentity::signed_in(fx.principal.clone())),
            Arc::new(fx.repo.clone()),
        );

        session_a.toggle(fx.course).await.unwrap();
        // Session B never saw A's write but must act on it.
        let outcome = session_b.toggle(fx.course).await.unwrap();
        assert_eq!(outcome.state, CompletionState::InProgress);
    }

    #[tokio::test]
    async fn completed_courses_lists_only_completed() {
        let fx = fixture();
        let other = Course::new(CourseId::generate(), "Async", "", None, 30, fixed_now()).unwrap();
        let other_id = other.id();
        fx.repo.insert_course(other).unwrap();
        let tracker = tracker(&fx, FixedIdentity::signed_in(fx.principal.clone()));

        tracker.toggle(fx.course).await.unwrap();
        tracker.toggle(other_id).await.unwrap();
        tracker.toggle(other_id).await.unwrap();

        let completed = tracker.completed_courses().await.unwrap();
        assert_eq!(completed, BTreeSet::from([fx.course]));
        assert_eq!(
            tracker.record(other_id).await.unwrap().map(|r| r.completed()),
            Some(false)
        );
    }
}
