//! Password hashing service using Argon2id

use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{
        PasswordHash as Argon2Hash, PasswordHasher as Argon2Hasher, PasswordVerifier, SaltString,
        rand_core::OsRng,
    },
};

use crate::domain::auth::{
    errors::AuthError,
    value_objects::{Password, PasswordHash},
};

/// Argon2id hasher.
///
/// Hashing and verification run on the blocking pool so a burst of logins
/// cannot starve the async runtime.
#[derive(Clone)]
pub struct PasswordHasher {
    params: Params,
}

impl PasswordHasher {
    /// OWASP baseline: 19 MiB, 2 iterations, 1 lane
    pub fn new() -> Self {
        Self {
            params: Params::DEFAULT,
        }
    }

    /// Custom cost parameters, mostly to keep tests fast
    pub fn with_params(
        memory_cost: u32,
        time_cost: u32,
        parallelism: u32,
    ) -> Result<Self, AuthError> {
        let params = Params::new(memory_cost, time_cost, parallelism, None).map_err(|e| {
            tracing::error!(error = %e, "Invalid Argon2 parameters");
            AuthError::HashingFailed
        })?;
        Ok(Self { params })
    }

    pub async fn hash(&self, password: &Password) -> Result<PasswordHash, AuthError> {
        let params = self.params.clone();
        let password = password.as_str().to_string();
        tokio::task::spawn_blocking(move || {
            let salt = SaltString::generate(&mut OsRng);
            let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
            argon2
                .hash_password(password.as_bytes(), &salt)
                .map(|h| h.to_string())
        })
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Password hash task panicked");
            AuthError::HashingFailed
        })?
        .map(PasswordHash::from)
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to hash password");
            AuthError::HashingFailed
        })
    }

    /// Parameters are read back from the PHC string, so hashes made with
    /// older settings keep verifying.
    pub async fn verify(&self, password: String, hash: PasswordHash) -> Result<bool, AuthError> {
        tokio::task::spawn_blocking(move || {
            let parsed_hash = Argon2Hash::new(hash.as_str()).map_err(|e| {
                tracing::error!(error = %e, "Stored password hash is not valid PHC");
                AuthError::HashingFailed
            })?;

            Ok(Argon2::default()
                .verify_password(password.as_bytes(), &parsed_hash)
                .is_ok())
        })
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Password verify task panicked");
            AuthError::HashingFailed
        })?
    }

    /// Runs one hash at the configured cost and discards it, so a login
    /// without a stored hash takes as long as a real verify.
    pub async fn verify_dummy(&self, password: String) -> Result<bool, AuthError> {
        let params = self.params.clone();
        tokio::task::spawn_blocking(move || {
            let salt = SaltString::generate(&mut OsRng);
            Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
                .hash_password(password.as_bytes(), &salt)
                .is_ok()
        })
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Password verify task panicked");
            AuthError::HashingFailed
        })?;
        Ok(false)
    }
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_hasher() -> PasswordHasher {
        PasswordHasher::with_params(4096, 1, 1).unwrap()
    }

    #[tokio::test]
    async fn test_hash_and_verify() {
        let hasher = fast_hasher();
        let password = Password::new("correct-horse-42".to_string()).unwrap();

        let hash = hasher.hash(&password).await.unwrap();
        assert!(hash.as_str().starts_with("$argon2id$"));
        assert!(
            hasher
                .verify("correct-horse-42".to_string(), hash.clone())
                .await
                .unwrap()
        );
        assert!(!hasher.verify("wrong-horse-42".to_string(), hash).await.unwrap());
    }

    #[tokio::test]
    async fn test_salts_differ() {
        let hasher = fast_hasher();
        let password = Password::new("same-password-1".to_string()).unwrap();

        let first = hasher.hash(&password).await.unwrap();
        let second = hasher.hash(&password).await.unwrap();
        assert_ne!(first.as_str(), second.as_str());
    }

    #[tokio::test]
    async fn test_dummy_verify_never_matches() {
        let hasher = fast_hasher();
        assert!(!hasher.verify_dummy("correct-horse-42".to_string()).await.unwrap());
        assert!(!hasher.verify_dummy(String::new()).await.unwrap());
    }

    #[tokio::test]
    async fn test_garbage_hash_is_an_error() {
        let hasher = fast_hasher();
        let result = hasher
            .verify("anything1".to_string(), PasswordHash::new("not-a-phc".to_string()))
            .await;
        assert_eq!(result, Err(AuthError::HashingFailed));
    }
}
