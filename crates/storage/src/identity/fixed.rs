use async_trait::async_trait;
use course_core::model::{Credentials, Principal};

use super::{IdentityError, IdentityProvider, ListenerRegistry, PrincipalListener, Subscription};

/// A provider whose principal is decided up front.
///
/// Used when the session was established by an outer auth layer, and in
/// tests. It never transitions, so subscribers are registered but never
/// called.
#[derive(Clone, Default)]
pub struct FixedIdentity {
    principal: Option<Principal>,
    listeners: ListenerRegistry,
}

impl FixedIdentity {
    #[must_use]
    pub fn anonymous() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn signed_in(principal: Principal) -> Self {
        Self {
            principal: Some(principal),
            listeners: ListenerRegistry::default(),
        }
    }
}

#[async_trait]
impl IdentityProvider for FixedIdentity {
    async fn sign_up(&self, _credentials: &Credentials) -> Result<Principal, IdentityError> {
        Err(IdentityError::Unsupported)
    }

    async fn sign_in(&self, _credentials: &Credentials) -> Result<Principal, IdentityError> {
        Err(IdentityError::Unsupported)
    }

    // Session lifetime belongs to the outer auth layer.
    async fn sign_out(&self) -> Result<(), IdentityError> {
        Ok(())
    }

    async fn current_principal(&self) -> Option<Principal> {
        self.principal.clone()
    }

    fn subscribe(&self, listener: PrincipalListener) -> Subscription {
        self.listeners.register(listener)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use course_core::model::{Email, PrincipalId};

    #[tokio::test]
    async fn reports_the_fixed_principal_and_signs_out_cleanly() {
        let principal = Principal::new(
            PrincipalId::generate(),
            Email::parse("u1@example.com").unwrap(),
        );
        let identity = FixedIdentity::signed_in(principal.clone());
        let creds = Credentials::parse("u2@example.com", "secret1").unwrap();

        assert_eq!(identity.current_principal().await, Some(principal));
        assert_eq!(identity.sign_in(&creds).await, Err(IdentityError::Unsupported));
        assert_eq!(identity.sign_out().await, Ok(()));
        assert_eq!(FixedIdentity::anonymous().sign_out().await, Ok(()));
        assert!(FixedIdentity::anonymous().current_principal().await.is_none());

        let sub = identity.subscribe(Box::new(|_| {}));
        assert!(sub.is_active());
    }
}
