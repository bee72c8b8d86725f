use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::{CourseId, PrincipalId, ProgressId};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ProgressRecordError {
    #[error("completed record is missing completed_at")]
    MissingCompletedAt,

    #[error("incomplete record carries completed_at")]
    UnexpectedCompletedAt,
}

//
// ─── COMPLETION ────────────────────────────────────────────────────────────────
//

/// The `completed` / `completed_at` pair of a progress record.
///
/// Stores persist the two columns separately; this type only admits the two
/// legal combinations so they always move together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Completion {
    #[default]
    Incomplete,
    Completed { at: DateTime<Utc> },
}

impl Completion {
    /// Rebuilds a completion from its persisted columns.
    ///
    /// # Errors
    ///
    /// Returns `ProgressRecordError` if the flag and timestamp disagree.
    pub fn from_parts(
        completed: bool,
        completed_at: Option<DateTime<Utc>>,
    ) -> Result<Self, ProgressRecordError> {
        match (completed, completed_at) {
            (true, Some(at)) => Ok(Self::Completed { at }),
            (false, None) => Ok(Self::Incomplete),
            (true, None) => Err(ProgressRecordError::MissingCompletedAt),
            (false, Some(_)) => Err(ProgressRecordError::UnexpectedCompletedAt),
        }
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }

    #[must_use]
    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Completed { at } => Some(*at),
            Self::Incomplete => None,
        }
    }
}

//
// ─── STATE MACHINE ─────────────────────────────────────────────────────────────
//

/// Observable completion state of one (principal, course) pair.
///
/// `NotStarted` and `InProgress` behave the same today: a record is only
/// created on first completion. They stay distinct so partial progress can be
/// added later without changing callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionState {
    NotStarted,
    InProgress,
    Completed,
}

impl CompletionState {
    /// Derives the state from the record (if any) stored for the pair.
    #[must_use]
    pub fn of(record: Option<&ProgressRecord>) -> Self {
        match record {
            None => Self::NotStarted,
            Some(r) if r.completion().is_completed() => Self::Completed,
            Some(_) => Self::InProgress,
        }
    }

    /// The completion a toggle from this state writes.
    #[must_use]
    pub fn toggled(self, now: DateTime<Utc>) -> Completion {
        match self {
            Self::NotStarted | Self::InProgress => Completion::Completed { at: now },
            Self::Completed => Completion::Incomplete,
        }
    }

    #[must_use]
    pub fn is_completed(self) -> bool {
        matches!(self, Self::Completed)
    }
}

//
// ─── RECORDS ───────────────────────────────────────────────────────────────────
//

/// One ownership-scoped progress row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressRecord {
    id: ProgressId,
    owner: PrincipalId,
    course_id: CourseId,
    completion: Completion,
    created_at: DateTime<Utc>,
}

impl ProgressRecord {
    #[must_use]
    pub fn new(
        id: ProgressId,
        owner: PrincipalId,
        course_id: CourseId,
        completion: Completion,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            owner,
            course_id,
            completion,
            created_at,
        }
    }

    /// Rehydrates a record from its stored columns.
    ///
    /// # Errors
    ///
    /// Returns `ProgressRecordError` if `completed` and `completed_at` disagree.
    pub fn from_persisted(
        id: ProgressId,
        owner: PrincipalId,
        course_id: CourseId,
        completed: bool,
        completed_at: Option<DateTime<Utc>>,
        created_at: DateTime<Utc>,
    ) -> Result<Self, ProgressRecordError> {
        let completion = Completion::from_parts(completed, completed_at)?;
        Ok(Self::new(id, owner, course_id, completion, created_at))
    }

    /// Returns a copy carrying a new completion; identity fields are untouched.
    #[must_use]
    pub fn with_completion(mut self, completion: Completion) -> Self {
        self.completion = completion;
        self
    }

    #[must_use]
    pub fn id(&self) -> ProgressId {
        self.id
    }

    #[must_use]
    pub fn owner(&self) -> PrincipalId {
        self.owner
    }

    #[must_use]
    pub fn course_id(&self) -> CourseId {
        self.course_id
    }

    #[must_use]
    pub fn completion(&self) -> Completion {
        self.completion
    }

    #[must_use]
    pub fn completed(&self) -> bool {
        self.completion.is_completed()
    }

    #[must_use]
    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completion.completed_at()
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    #[must_use]
    pub fn state(&self) -> CompletionState {
        CompletionState::of(Some(self))
    }
}

/// Insert shape for a progress record; the store assigns the id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewProgressRecord {
    pub owner: PrincipalId,
    pub course_id: CourseId,
    pub completion: Completion,
    pub created_at: DateTime<Utc>,
}

impl NewProgressRecord {
    #[must_use]
    pub fn new(
        owner: PrincipalId,
        course_id: CourseId,
        completion: Completion,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            owner,
            course_id,
            completion,
            created_at,
        }
    }

    #[must_use]
    pub fn assign_id(self, id: ProgressId) -> ProgressRecord {
        ProgressRecord::new(id, self.owner, self.course_id, self.completion, self.created_at)
    }
}
