//! Shared error types for the services crate.

use thiserror::Error;

use course_core::model::CredentialsError;
use storage::identity::IdentityError;
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

/// Errors emitted by `ProgressTracker`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ProgressError {
    /// The operation needs a signed-in principal.
    #[error("sign in to track progress")]
    Unauthenticated,
    #[error("course or progress record not found")]
    NotFound,
    /// The store's ownership predicate rejected a write. Indicates a client bug.
    #[error("progress record belongs to another principal")]
    Forbidden,
    /// A concurrent write won and the single retry did not converge.
    #[error("progress changed concurrently, try again")]
    Conflict,
    #[error("progress store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("stored progress record is invalid: {0}")]
    InvalidRecord(String),
}

impl From<StorageError> for ProgressError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound => Self::NotFound,
            StorageError::Conflict => Self::Conflict,
            StorageError::Forbidden => Self::Forbidden,
            StorageError::Unavailable(msg) => Self::StoreUnavailable(msg),
            StorageError::Serialization(msg) => Self::InvalidRecord(msg),
            other => Self::StoreUnavailable(other.to_string()),
        }
    }
}

impl ProgressError {
    /// Whether retrying the same call later may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Conflict | Self::StoreUnavailable(_))
    }
}

/// Errors emitted by `CatalogService`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CatalogError {
    #[error("course not found")]
    NotFound,
    #[error("catalog unavailable: {0}")]
    StoreUnavailable(String),
    #[error("stored course is invalid: {0}")]
    InvalidRecord(String),
}

impl From<StorageError> for CatalogError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound => Self::NotFound,
            StorageError::Serialization(msg) => Self::InvalidRecord(msg),
            StorageError::Unavailable(msg) => Self::StoreUnavailable(msg),
            other => Self::StoreUnavailable(other.to_string()),
        }
    }
}

/// Errors emitted by `AuthService`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AuthError {
    #[error(transparent)]
    InvalidCredentials(#[from] CredentialsError),
    #[error("an account with this email already exists")]
    EmailTaken,
    #[error("invalid email or password")]
    InvalidLogin,
    #[error("identity provider does not support this operation")]
    Unsupported,
    #[error("identity provider unavailable: {0}")]
    Unavailable(String),
}

impl From<IdentityError> for AuthError {
    fn from(err: IdentityError) -> Self {
        match err {
            IdentityError::EmailTaken => Self::EmailTaken,
            IdentityError::InvalidLogin => Self::InvalidLogin,
            IdentityError::Unsupported => Self::Unsupported,
            IdentityError::Unavailable(msg) => Self::Unavailable(msg),
            other => Self::Unavailable(other.to_string()),
        }
    }
}

/// Errors emitted while bootstrapping an `AppContext`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppContextError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
}
