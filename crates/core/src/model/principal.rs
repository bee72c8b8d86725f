use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::PrincipalId;

/// Minimum password length accepted before submitting to the identity provider.
pub const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CredentialsError {
    #[error("email address is not valid")]
    InvalidEmail,

    #[error("password must be at least {MIN_PASSWORD_LEN} characters")]
    PasswordTooShort,
}

//
// ─── EMAIL ─────────────────────────────────────────────────────────────────────
//

/// A syntactically valid email address, stored lowercased.
///
/// This is the client-side check only; the identity provider re-validates.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Email(String);

impl Email {
    /// # Errors
    ///
    /// Returns `CredentialsError::InvalidEmail` if the address is malformed.
    pub fn parse(raw: impl AsRef<str>) -> Result<Self, CredentialsError> {
        let s = raw.as_ref().trim();
        let (local, domain) = s.split_once('@').ok_or(CredentialsError::InvalidEmail)?;

        let local_ok = !local.is_empty() && !local.starts_with('.') && !local.ends_with('.');
        let domain_ok = domain.contains('.')
            && domain
                .split('.')
                .all(|label| !label.is_empty() && !label.starts_with('-') && !label.ends_with('-'));
        let chars_ok = !s.chars().any(|c| c.is_whitespace() || c.is_control())
            && !domain.contains('@');

        if local_ok && domain_ok && chars_ok {
            Ok(Self(s.to_lowercase()))
        } else {
            Err(CredentialsError::InvalidEmail)
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Email {
    type Error = CredentialsError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<Email> for String {
    fn from(value: Email) -> Self {
        value.0
    }
}

impl fmt::Display for Email {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

//
// ─── PASSWORD ──────────────────────────────────────────────────────────────────
//

/// Password that passed the length check. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct Password(String);

impl Password {
    /// # Errors
    ///
    /// Returns `CredentialsError::PasswordTooShort` below `MIN_PASSWORD_LEN` characters.
    pub fn parse(raw: impl Into<String>) -> Result<Self, CredentialsError> {
        let s = raw.into();
        if s.chars().count() < MIN_PASSWORD_LEN {
            return Err(CredentialsError::PasswordTooShort);
        }
        Ok(Self(s))
    }

    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Password(***)")
    }
}

/// Email and password pair, both validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub email: Email,
    pub password: Password,
}

impl Credentials {
    /// # Errors
    ///
    /// Returns the first `CredentialsError` found, checking the email first.
    pub fn parse(email: impl AsRef<str>, password: impl Into<String>) -> Result<Self, CredentialsError> {
        Ok(Self {
            email: Email::parse(email)?,
            password: Password::parse(password)?,
        })
    }
}

//
// ─── PRINCIPAL ─────────────────────────────────────────────────────────────────
//

/// An authenticated identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Principal {
    id: PrincipalId,
    email: Email,
}

impl Principal {
    #[must_use]
    pub fn new(id: PrincipalId, email: Email) -> Self {
        Self { id, email }
    }

    #[must_use]
    pub fn id(&self) -> PrincipalId {
        self.id
    }

    #[must_use]
    pub fn email(&self) -> &Email {
        &self.email
    }
}
