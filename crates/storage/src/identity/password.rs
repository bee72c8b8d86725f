//! Argon2id password hashing for locally stored accounts.

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};

use super::IdentityError;

/// Hashes a password into a PHC string (salt and parameters included).
pub(crate) fn hash_password(password: &str) -> Result<String, IdentityError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| IdentityError::Unavailable(format!("failed to hash password: {e}")))
}

/// Checks a password against a stored PHC string.
pub(crate) fn verify_password(password: &str, hash: &str) -> Result<bool, IdentityError> {
    let parsed = PasswordHash::new(hash)
        .map_err(|e| IdentityError::Unavailable(format!("invalid password hash: {e}")))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

/// Runs `hash_password` on the blocking pool.
pub(crate) async fn hash_password_off_runtime(password: String) -> Result<String, IdentityError> {
    off_runtime(move || hash_password(&password)).await?
}

/// Runs `verify_password` on the blocking pool.
pub(crate) async fn verify_password_off_runtime(
    password: String,
    hash: String,
) -> Result<bool, IdentityError> {
    off_runtime(move || verify_password(&password, &hash)).await?
}

// Argon2 is CPU-bound and stays off executor threads.
async fn off_runtime<T, F>(work: F) -> Result<T, IdentityError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| IdentityError::Unavailable(format!("password task failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hashing_runs_off_the_runtime_thread() {
        let caller = std::thread::current().id();
        let worker = off_runtime(|| std::thread::current().id()).await.unwrap();
        assert_ne!(worker, caller);

        let hash = hash_password_off_runtime("correct-horse".into()).await.unwrap();
        assert!(
            verify_password_off_runtime("correct-horse".into(), hash.clone())
                .await
                .unwrap()
        );
        assert!(
            !verify_password_off_runtime("wrong-horse".into(), hash)
                .await
                .unwrap()
        );
    }

    #[test]
    fn hash_then_verify() {
        let hash = hash_password("correct-horse").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("correct-horse", &hash).unwrap());
        assert!(!verify_password("wrong-horse", &hash).unwrap());
    }

    #[test]
    fn malformed_hash_is_an_error() {
        assert!(verify_password("anything", "plaintext").is_err());
    }
}
