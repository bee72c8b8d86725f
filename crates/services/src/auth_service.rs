use std::sync::Arc;

use course_core::model::{Credentials, Principal};
use storage::identity::{IdentityProvider, PrincipalListener, Subscription};
use tracing::info;

use crate::error::AuthError;

/// Client-side front of the identity provider.
///
/// Credentials are validated locally before anything is sent; the provider
/// still has the final say.
#[derive(Clone)]
pub struct AuthService {
    identity: Arc<dyn IdentityProvider>,
}

impl AuthService {
    #[must_use]
    pub fn new(identity: Arc<dyn IdentityProvider>) -> Self {
        Self { identity }
    }

    /// Register and sign in.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidCredentials` for a malformed email or short
    /// password, `AuthError::EmailTaken` if the email is registered.
    pub async fn sign_up(&self, email: &str, password: &str) -> Result<Principal, AuthError> {
        let credentials = Credentials::parse(email, password)?;
        let principal = self.identity.sign_up(&credentials).await?;
        info!(principal = %principal.id(), "signed up");
        Ok(principal)
    }

    /// # Errors
    ///
    /// Returns `AuthError::InvalidCredentials` before contacting the provider
    /// if the input is malformed, `AuthError::InvalidLogin` if it is rejected.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Principal, AuthError> {
        let credentials = Credentials::parse(email, password)?;
        let principal = self.identity.sign_in(&credentials).await?;
        info!(principal = %principal.id(), "signed in");
        Ok(principal)
    }

    /// # Errors
    ///
    /// Returns `AuthError` if the provider cannot end the session.
    pub async fn sign_out(&self) -> Result<(), AuthError> {
        self.identity.sign_out().await?;
        info!("signed out");
        Ok(())
    }

    pub async fn current_principal(&self) -> Option<Principal> {
        self.identity.current_principal().await
    }

    pub fn subscribe(&self, listener: PrincipalListener) -> Subscription {
        self.identity.subscribe(listener)
    }
}
