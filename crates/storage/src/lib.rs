#![forbid(unsafe_code)]

pub mod identity;
pub mod repository;
pub mod sqlite;

pub use identity::{
    AccountDirectory, AccountRecord, FixedIdentity, IdentityError, IdentityProvider,
    LocalIdentityProvider, PrincipalListener, Subscription, SubscriptionState,
};
pub use repository::{
    CourseCatalog, CourseOrder, InMemoryRepository, ProgressRepository, Storage, StorageError,
};
