use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use course_core::Clock;
use course_core::model::{Credentials, Principal, PrincipalId};
use tracing::{debug, info};

use super::password::{hash_password_off_runtime, verify_password_off_runtime};
use super::{
    AccountDirectory, AccountRecord, IdentityError, IdentityProvider, ListenerRegistry,
    PrincipalListener, Subscription,
};

/// Identity provider backed by an `AccountDirectory`, holding one session in process.
pub struct LocalIdentityProvider {
    clock: Clock,
    accounts: Arc<dyn AccountDirectory>,
    session: Mutex<Option<Principal>>,
    listeners: ListenerRegistry,
}

impl LocalIdentityProvider {
    #[must_use]
    pub fn new(clock: Clock, accounts: Arc<dyn AccountDirectory>) -> Self {
        Self {
            clock,
            accounts,
            session: Mutex::new(None),
            listeners: ListenerRegistry::default(),
        }
    }

    /// Drops the current session as if it had timed out.
    pub fn expire_session(&self) {
        self.transition(None);
    }

    // The session lock is held while listeners run so every subscriber sees
    // transitions in the order they were applied.
    fn transition(&self, next: Option<Principal>) {
        let mut session = self.session.lock().unwrap_or_else(PoisonError::into_inner);
        if *session == next {
            return;
        }
        debug!(
            from = ?session.as_ref().map(Principal::id),
            to = ?next.as_ref().map(Principal::id),
            "identity transition"
        );
        *session = next;
        self.listeners.notify(session.as_ref());
    }
}

#[async_trait]
impl IdentityProvider for LocalIdentityProvider {
    async fn sign_up(&self, credentials: &Credentials) -> Result<Principal, IdentityError> {
        let principal = Principal::new(PrincipalId::generate(), credentials.email.clone());
        let password_hash =
            hash_password_off_runtime(credentials.password.expose().to_owned()).await?;
        let account = AccountRecord {
            principal: principal.clone(),
            password_hash,
            created_at: self.clock.now(),
        };
        self.accounts.insert_account(account).await?;
        info!(principal = %principal.id(), "account created");

        self.transition(Some(principal.clone()));
        Ok(principal)
    }

    async fn sign_in(&self, credentials: &Credentials) -> Result<Principal, IdentityError> {
        let account = self
            .accounts
            .find_account(&credentials.email)
            .await?
            .ok_or(IdentityError::InvalidLogin)?;
        let matches = verify_password_off_runtime(
            credentials.password.expose().to_owned(),
            account.password_hash.clone(),
        )
        .await?;
        if !matches {
            return Err(IdentityError::InvalidLogin);
        }

        self.transition(Some(account.principal.clone()));
        Ok(account.principal)
    }

    async fn sign_out(&self) -> Result<(), IdentityError> {
        self.transition(None);
        Ok(())
    }

    async fn current_principal(&self) -> Option<Principal> {
        self.session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn subscribe(&self, listener: PrincipalListener) -> Subscription {
        self.listeners.register(listener)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::InMemoryRepository;
    use course_core::time::fixed_now;

    fn provider() -> LocalIdentityProvider {
        LocalIdentityProvider::new(
            Clock::fixed(fixed_now()),
            Arc::new(InMemoryRepository::new()),
        )
    }

    fn creds(password: &str) -> Credentials {
        Credentials::parse("u1@example.com", password).unwrap()
    }

    fn transitions(provider: &LocalIdentityProvider) -> (Arc<Mutex<Vec<bool>>>, Subscription) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let sub = provider.subscribe(Box::new(move |p: Option<&Principal>| {
            sink.lock().unwrap().push(p.is_some());
        }));
        (seen, sub)
    }

    #[tokio::test]
    async fn sign_up_signs_in() {
        let provider = provider();
        let principal = provider.sign_up(&creds("secret1")).await.unwrap();
        assert_eq!(provider.current_principal().await, Some(principal));
    }

    #[tokio::test]
    async fn duplicate_sign_up_is_rejected() {
        let provider = provider();
        provider.sign_up(&creds("secret1")).await.unwrap();
        let err = provider.sign_up(&creds("secret2")).await.unwrap_err();
        assert_eq!(err, IdentityError::EmailTaken);
    }

    #[tokio::test]
    async fn sign_in_checks_password() {
        let provider = provider();
        let principal = provider.sign_up(&creds("secret1")).await.unwrap();
        provider.sign_out().await.unwrap();
        assert_eq!(provider.current_principal().await, None);

        let err = provider.sign_in(&creds("wrong-pass")).await.unwrap_err();
        assert_eq!(err, IdentityError::InvalidLogin);
        assert_eq!(provider.current_principal().await, None);

        let signed_in = provider.sign_in(&creds("secret1")).await.unwrap();
        assert_eq!(signed_in, principal);
    }

    #[tokio::test]
    async fn unknown_email_is_invalid_login() {
        let err = provider().sign_in(&creds("secret1")).await.unwrap_err();
        assert_eq!(err, IdentityError::InvalidLogin);
    }

    #[tokio::test]
    async fn listeners_see_each_transition_once() {
        let provider = provider();
        let (seen, _sub) = transitions(&provider);

        provider.sign_up(&creds("secret1")).await.unwrap();
        provider.sign_in(&creds("secret1")).await.unwrap();
        provider.expire_session();
        provider.sign_out().await.unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![true, false]);
    }

    #[tokio::test]
    async fn cancelled_listener_is_silent() {
        let provider = provider();
        let (seen, mut sub) = transitions(&provider);
        sub.cancel();

        provider.sign_up(&creds("secret1")).await.unwrap();
        assert!(seen.lock().unwrap().is_empty());
    }
}
