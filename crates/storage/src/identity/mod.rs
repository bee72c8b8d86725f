//! Principal resolution: who is signed in, and who gets told when that changes.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError, Weak};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use course_core::model::{Credentials, Email, Principal};
use thiserror::Error;

use crate::repository::StorageError;

mod fixed;
mod local;
mod password;

pub use fixed::FixedIdentity;
pub use local::LocalIdentityProvider;

/// Errors surfaced by identity providers.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum IdentityError {
    #[error("an account with this email already exists")]
    EmailTaken,

    #[error("invalid email or password")]
    InvalidLogin,

    #[error("operation not supported by this identity provider")]
    Unsupported,

    #[error("identity provider unavailable: {0}")]
    Unavailable(String),
}

impl From<StorageError> for IdentityError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Conflict => Self::EmailTaken,
            other => Self::Unavailable(other.to_string()),
        }
    }
}

/// Callback invoked with the new principal (or `None`) on every identity transition.
pub type PrincipalListener = Box<dyn Fn(Option<&Principal>) + Send + Sync>;

/// Identity/session capability.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Register an account and sign it in.
    ///
    /// # Errors
    ///
    /// Returns `IdentityError::EmailTaken` if the email is already registered.
    async fn sign_up(&self, credentials: &Credentials) -> Result<Principal, IdentityError>;

    /// # Errors
    ///
    /// Returns `IdentityError::InvalidLogin` for unknown emails or wrong passwords.
    async fn sign_in(&self, credentials: &Credentials) -> Result<Principal, IdentityError>;

    /// End the current session. Signing out while anonymous is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `IdentityError` if the provider cannot end the session.
    async fn sign_out(&self) -> Result<(), IdentityError>;

    /// The presently authenticated principal, or `None` for anonymous access.
    async fn current_principal(&self) -> Option<Principal>;

    /// Register a listener for identity transitions.
    ///
    /// Each listener sees transitions in the order they happened. Listeners
    /// run on the thread that caused the transition and must not cancel
    /// subscriptions from inside the callback.
    fn subscribe(&self, listener: PrincipalListener) -> Subscription;
}

//
// ─── ACCOUNTS ──────────────────────────────────────────────────────────────────
//

/// Stored account: the principal plus its PHC password hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountRecord {
    pub principal: Principal,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

/// Account lookup used by `LocalIdentityProvider`.
#[async_trait]
pub trait AccountDirectory: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the email is already registered.
    async fn insert_account(&self, account: AccountRecord) -> Result<(), StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if the directory cannot be read.
    async fn find_account(&self, email: &Email) -> Result<Option<AccountRecord>, StorageError>;
}

//
// ─── SUBSCRIPTIONS ─────────────────────────────────────────────────────────────
//

/// Whether a `Subscription` can still receive notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    Subscribed,
    Cancelled,
}

#[derive(Default)]
struct Listeners {
    next_id: u64,
    entries: BTreeMap<u64, PrincipalListener>,
}

/// Listener list shared by a provider and the subscriptions it hands out.
///
/// Notification runs with the list locked, so `Subscription::cancel` waits
/// for an in-flight notification and nothing is delivered once it returns.
#[derive(Clone, Default)]
pub(crate) struct ListenerRegistry {
    inner: Arc<Mutex<Listeners>>,
}

impl ListenerRegistry {
    pub(crate) fn register(&self, listener: PrincipalListener) -> Subscription {
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let id = guard.next_id;
        guard.next_id += 1;
        guard.entries.insert(id, listener);
        Subscription {
            id,
            registry: Arc::downgrade(&self.inner),
            state: SubscriptionState::Subscribed,
        }
    }

    pub(crate) fn notify(&self, principal: Option<&Principal>) {
        let guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        for listener in guard.entries.values() {
            listener(principal);
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .len()
    }
}

/// Cancellation handle returned by `IdentityProvider::subscribe`.
///
/// Dropping the handle cancels the subscription.
#[must_use = "dropping a Subscription cancels it"]
pub struct Subscription {
    id: u64,
    registry: Weak<Mutex<Listeners>>,
    state: SubscriptionState,
}

impl Subscription {
    #[must_use]
    pub fn state(&self) -> SubscriptionState {
        self.state
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state == SubscriptionState::Subscribed
    }

    /// Stop receiving notifications. Idempotent.
    pub fn cancel(&mut self) {
        if self.state == SubscriptionState::Cancelled {
            return;
        }
        if let Some(registry) = self.registry.upgrade() {
            let mut guard = registry.lock().unwrap_or_else(PoisonError::into_inner);
            guard.entries.remove(&self.id);
        }
        self.state = SubscriptionState::Cancelled;
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("state", &self.state)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use course_core::model::PrincipalId;

    fn principal() -> Principal {
        Principal::new(PrincipalId::generate(), Email::parse("u1@example.com").unwrap())
    }

    fn recorder() -> (Arc<Mutex<Vec<Option<PrincipalId>>>>, PrincipalListener) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let listener: PrincipalListener = Box::new(move |p: Option<&Principal>| {
            sink.lock().unwrap().push(p.map(Principal::id));
        });
        (seen, listener)
    }

    #[test]
    fn delivers_in_order_until_cancelled() {
        let registry = ListenerRegistry::default();
        let (seen, listener) = recorder();
        let mut sub = registry.register(listener);
        let p = principal();

        registry.notify(Some(&p));
        registry.notify(None);
        sub.cancel();
        registry.notify(Some(&p));

        assert_eq!(*seen.lock().unwrap(), vec![Some(p.id()), None]);
        assert_eq!(sub.state(), SubscriptionState::Cancelled);
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn supports_multiple_subscribers() {
        let registry = ListenerRegistry::default();
        let (first, l1) = recorder();
        let (second, l2) = recorder();
        let _s1 = registry.register(l1);
        let _s2 = registry.register(l2);

        registry.notify(None);
        assert_eq!(first.lock().unwrap().len(), 1);
        assert_eq!(second.lock().unwrap().len(), 1);
    }

    #[test]
    fn dropping_handle_cancels() {
        let registry = ListenerRegistry::default();
        let (seen, listener) = recorder();
        drop(registry.register(listener));
        registry.notify(None);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn cancel_is_idempotent_after_registry_is_gone() {
        let registry = ListenerRegistry::default();
        let (_seen, listener) = recorder();
        let mut sub = registry.register(listener);
        drop(registry);
        sub.cancel();
        sub.cancel();
        assert!(!sub.is_active());
    }
}
