use course_core::model::{CompletionState, CourseId};
use tokio::sync::watch;
use tracing::trace;

use crate::error::ProgressError;
use crate::progress_tracker::{ProgressTracker, ToggleOutcome};

/// Locally observed completion of one course.
///
/// The view never guesses: it only changes when handed an authoritative
/// `ToggleOutcome` or when reloaded from the store. Observers hold a
/// `watch::Receiver`; once they are all gone, applying an outcome is a no-op
/// for them.
#[derive(Debug)]
pub struct ProgressView {
    course_id: CourseId,
    tx: watch::Sender<CompletionState>,
}

impl ProgressView {
    #[must_use]
    pub fn new(course_id: CourseId, initial: CompletionState) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { course_id, tx }
    }

    /// Builds a view seeded from the store.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError` if the store cannot be read.
    pub async fn load(tracker: &ProgressTracker, course_id: CourseId) -> Result<Self, ProgressError> {
        let state = tracker.state(course_id).await?;
        Ok(Self::new(course_id, state))
    }

    #[must_use]
    pub fn course_id(&self) -> CourseId {
        self.course_id
    }

    #[must_use]
    pub fn current(&self) -> CompletionState {
        *self.tx.borrow()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<CompletionState> {
        self.tx.subscribe()
    }

    /// Applies a toggle result. Returns whether anyone was observing.
    ///
    /// Outcomes for other courses are ignored.
    pub fn apply(&self, outcome: &ToggleOutcome) -> bool {
        if outcome.course_id() != self.course_id {
            return false;
        }
        self.tx.send_replace(outcome.state);
        let observed = self.tx.receiver_count() > 0;
        trace!(course = %self.course_id, state = ?outcome.state, observed, "applied toggle outcome");
        observed
    }

    /// Re-reads the store and publishes the result.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError` if the store cannot be read; the view is left unchanged.
    pub async fn refresh(&self, tracker: &ProgressTracker) -> Result<CompletionState, ProgressError> {
        let state = tracker.state(self.course_id).await?;
        self.tx.send_replace(state);
        Ok(state)
    }

    /// Toggles through the tracker and applies exactly what the store returned.
    ///
    /// # Errors
    ///
    /// Propagates `ProgressError` from the tracker; the view is left unchanged.
    pub async fn toggle(&self, tracker: &ProgressTracker) -> Result<ToggleOutcome, ProgressError> {
        let outcome = tracker.toggle(self.course_id).await?;
        self.apply(&outcome);
        Ok(outcome)
    }
}
