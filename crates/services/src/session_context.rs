use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use course_core::model::{CourseId, Principal, PrincipalId};
use storage::identity::{IdentityProvider, Subscription};
use tracing::debug;

use crate::error::{AuthError, ProgressError};
use crate::progress_tracker::{ProgressTracker, ToggleOutcome};

/// Which principal the session was initialised for.
#[derive(Debug, Clone, Copy)]
struct ActiveSession {
    principal: PrincipalId,
}

// `generation` moves on every identity transition so a load that straddled
// one is never recorded under the wrong principal.
#[derive(Debug, Default)]
struct SessionSlot {
    generation: u64,
    active: Option<ActiveSession>,
}

/// Explicit client session: who is signed in and which courses carry a badge.
///
/// Created by the embedding application and passed to whatever needs it.
/// The session is initialised the first time an authenticated caller asks
/// for badges and torn down whenever the identity provider reports a
/// different principal (sign-out, expiry, or a switch of account). Badges are
/// read from the store on every call, so writes from other sessions and
/// devices show up on the next read.
pub struct SessionContext {
    identity: Arc<dyn IdentityProvider>,
    tracker: ProgressTracker,
    slot: Arc<Mutex<SessionSlot>>,
    subscription: Subscription,
}

impl SessionContext {
    #[must_use]
    pub fn new(identity: Arc<dyn IdentityProvider>, tracker: ProgressTracker) -> Self {
        let slot: Arc<Mutex<SessionSlot>> = Arc::new(Mutex::new(SessionSlot::default()));
        let listener_slot = Arc::clone(&slot);
        let subscription = identity.subscribe(Box::new(move |principal: Option<&Principal>| {
            let mut guard = listener_slot.lock().unwrap_or_else(PoisonError::into_inner);
            guard.generation += 1;
            let keep = matches!(
                (guard.active, principal),
                (Some(session), Some(p)) if session.principal == p.id()
            );
            if !keep && guard.active.take().is_some() {
                debug!("session torn down after identity change");
            }
        }));

        Self {
            identity,
            tracker,
            slot,
            subscription,
        }
    }

    pub async fn principal(&self) -> Option<Principal> {
        self.identity.current_principal().await
    }

    /// Whether per-principal state has been initialised.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.lock().active.is_some()
    }

    /// Whether the session still follows identity changes.
    #[must_use]
    pub fn is_listening(&self) -> bool {
        self.subscription.is_active()
    }

    /// Completed courses for badge rendering, read from the store.
    ///
    /// Empty for anonymous callers.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError` if the store cannot be read.
    pub async fn completed_courses(&self) -> Result<BTreeSet<CourseId>, ProgressError> {
        let generation = self.lock().generation;
        let Some(principal) = self.identity.current_principal().await else {
            return Ok(BTreeSet::new());
        };
        let completed = self.tracker.completed_courses_of(principal.id()).await?;

        let mut slot = self.lock();
        if slot.generation == generation && slot.active.is_none() {
            slot.active = Some(ActiveSession {
                principal: principal.id(),
            });
            debug!(principal = %principal.id(), courses = completed.len(), "session initialised");
        }
        Ok(completed)
    }

    /// Toggles a course for the signed-in principal.
    ///
    /// The tracker decides from store truth.
    ///
    /// # Errors
    ///
    /// Propagates `ProgressError` from the tracker.
    pub async fn toggle(&self, course_id: CourseId) -> Result<ToggleOutcome, ProgressError> {
        self.tracker.toggle(course_id).await
    }

    /// Ends the session. Safe to call when already signed out.
    ///
    /// # Errors
    ///
    /// Returns `AuthError` if the provider cannot end the session.
    pub async fn sign_out(&self) -> Result<(), AuthError> {
        self.identity.sign_out().await?;
        self.lock().active.take();
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, SessionSlot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use course_core::Clock;
    use course_core::model::{Course, Credentials};
    use course_core::time::fixed_now;
    use storage::identity::LocalIdentityProvider;
    use async_trait::async_trait;
    use course_core::model::{Completion, NewProgressRecord, ProgressId, ProgressRecord};
    use storage::repository::{InMemoryRepository, ProgressRepository, StorageError};

    struct Fixture {
        identity: Arc<LocalIdentityProvider>,
        session: SessionContext,
        course: CourseId,
    }

    fn fixture() -> Fixture {
        let repo = InMemoryRepository::new();
        let course = Course::new(CourseId::generate(), "Rust", "", None, 60, fixed_now()).unwrap();
        let course_id = course.id();
        repo.insert_course(course).unwrap();

        let clock = Clock::fixed(fixed_now());
        let identity = Arc::new(LocalIdentityProvider::new(clock, Arc::new(repo.clone())));
        let progress: Arc<dyn ProgressRepository> = Arc::new(repo);
        let shared: Arc<dyn IdentityProvider> = identity.clone();
        let tracker = ProgressTracker::new(clock, Arc::clone(&shared), progress);
        Fixture {
            identity,
            session: SessionContext::new(shared, tracker),
            course: course_id,
        }
    }

    fn creds(email: &str) -> Credentials {
        Credentials::parse(email, "secret1").unwrap()
    }

    #[tokio::test]
    async fn initialises_lazily_and_tracks_toggles() {
        let fx = fixture();
        assert!(fx.session.completed_courses().await.unwrap().is_empty());
        assert!(!fx.session.is_active());

        fx.identity.sign_up(&creds("u1@example.com")).await.unwrap();
        assert!(!fx.session.is_active());
        assert!(fx.session.completed_courses().await.unwrap().is_empty());
        assert!(fx.session.is_active());

        fx.session.toggle(fx.course).await.unwrap();
        assert_eq!(
            fx.session.completed_courses().await.unwrap(),
            BTreeSet::from([fx.course])
        );

        fx.session.toggle(fx.course).await.unwrap();
        assert!(fx.session.completed_courses().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn tears_down_on_sign_out_and_expiry() {
        let fx = fixture();
        fx.identity.sign_up(&creds("u1@example.com")).await.unwrap();
        fx.session.completed_courses().await.unwrap();
        assert!(fx.session.is_active());

        fx.session.sign_out().await.unwrap();
        assert!(!fx.session.is_active());

        fx.identity.sign_in(&creds("u1@example.com")).await.unwrap();
        fx.session.completed_courses().await.unwrap();
        fx.identity.expire_session();
        assert!(!fx.session.is_active());
        assert!(fx.session.is_listening());
    }

    #[tokio::test]
    async fn switching_principal_resets_badges() {
        let fx = fixture();
        fx.identity.sign_up(&creds("u1@example.com")).await.unwrap();
        fx.session.toggle(fx.course).await.unwrap();
        fx.session.completed_courses().await.unwrap();

        fx.identity.sign_up(&creds("u2@example.com")).await.unwrap();
        assert!(!fx.session.is_active());
        assert!(fx.session.completed_courses().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn badges_include_writes_made_outside_the_session() {
        let fx = fixture();
        fx.identity.sign_up(&creds("u1@example.com")).await.unwrap();
        assert!(fx.session.completed_courses().await.unwrap().is_empty());

        fx.session.tracker.toggle(fx.course).await.unwrap();
        assert_eq!(
            fx.session.completed_courses().await.unwrap(),
            BTreeSet::from([fx.course])
        );
    }

    /// Expires the session while the badge query is in flight.
    struct ExpiresDuringLoad {
        inner: InMemoryRepository,
        identity: Arc<LocalIdentityProvider>,
    }

    #[async_trait]
    impl ProgressRepository for ExpiresDuringLoad {
        async fn get_record(
            &self,
            actor: PrincipalId,
            course_id: CourseId,
        ) -> Result<Option<ProgressRecord>, StorageError> {
            self.inner.get_record(actor, course_id).await
        }

        async fn list_records(
            &self,
            actor: PrincipalId,
        ) -> Result<Vec<ProgressRecord>, StorageError> {
            self.identity.expire_session();
            self.inner.list_records(actor).await
        }

        async fn create_record(
            &self,
            actor: PrincipalId,
            record: NewProgressRecord,
        ) -> Result<ProgressRecord, StorageError> {
            self.inner.create_record(actor, record).await
        }

        async fn update_record(
            &self,
            actor: PrincipalId,
            id: ProgressId,
            completion: Completion,
        ) -> Result<ProgressRecord, StorageError> {
            self.inner.update_record(actor, id, completion).await
        }
    }

    #[tokio::test]
    async fn identity_change_during_load_is_not_recorded() {
        let repo = InMemoryRepository::new();
        let clock = Clock::fixed(fixed_now());
        let identity = Arc::new(LocalIdentityProvider::new(clock, Arc::new(repo.clone())));
        let progress = Arc::new(ExpiresDuringLoad {
            inner: repo,
            identity: Arc::clone(&identity),
        });
        let shared: Arc<dyn IdentityProvider> = identity.clone();
        let session = SessionContext::new(
            Arc::clone(&shared),
            ProgressTracker::new(clock, shared, progress),
        );

        identity.sign_up(&creds("u1@example.com")).await.unwrap();
        assert!(session.completed_courses().await.unwrap().is_empty());
        assert!(!session.is_active());
        assert_eq!(identity.current_principal().await, None);
    }
}
