//! Login audit trail recording

use chrono::Utc;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::auth::{
    entities::{LoginContext, LoginHistoryEntry},
    repositories::ILoginHistoryRepository,
    value_objects::{LoginMethod, UserId},
};

/// One login attempt to be written to history
#[derive(Debug, Clone)]
pub struct LoginAttempt<'a> {
    pub user_id: Option<UserId>,
    /// Normalized identifier that was presented (email, provider subject, ...)
    pub identifier: &'a str,
    pub method: LoginMethod,
    pub success: bool,
    pub failure_reason: Option<&'a str>,
}

/// Writes login history without ever failing the login it describes
pub struct LoginHistoryRecorder {
    repository: Arc<dyn ILoginHistoryRepository>,
}

impl LoginHistoryRecorder {
    pub fn new(repository: Arc<dyn ILoginHistoryRepository>) -> Self {
        Self { repository }
    }

    pub fn identifier_hash(identifier: &str) -> String {
        hex::encode(Sha256::digest(identifier.as_bytes()))
    }

    pub fn entry(attempt: LoginAttempt<'_>, context: &LoginContext) -> LoginHistoryEntry {
        let user_agent = context.user_agent.as_deref().map(|ua| {
            ua.chars()
                .take(LoginHistoryEntry::MAX_USER_AGENT_LEN)
                .collect::<String>()
        });
        LoginHistoryEntry {
            id: Uuid::new_v4(),
            user_id: attempt.user_id,
            identifier_hash: Self::identifier_hash(attempt.identifier),
            method: attempt.method,
            success: attempt.success,
            failure_reason: attempt.failure_reason.map(str::to_string),
            ip: context.ip.clone(),
            user_agent,
            client_id: context.client_id.clone(),
            occurred_at: Utc::now(),
        }
    }

    pub async fn record(&self, attempt: LoginAttempt<'_>, context: &LoginContext) {
        let entry = Self::entry(attempt, context);
        if let Err(e) = self.repository.append(&entry).await {
            tracing::error!(error = %e, method = %entry.method, "Failed to record login history");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::auth::errors::AuthError;
    use async_trait::async_trait;

    struct BrokenRepository;

    #[async_trait]
    impl ILoginHistoryRepository for BrokenRepository {
        async fn append(&self, _entry: &LoginHistoryEntry) -> Result<(), AuthError> {
            Err(AuthError::DatabaseError {
                message: "down".to_string(),
            })
        }

        async fn list_for_user(
            &self,
            _user_id: &UserId,
            _limit: u32,
            _offset: u32,
        ) -> Result<Vec<LoginHistoryEntry>, AuthError> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_user_agent_is_truncated() {
        let context = LoginContext {
            ip: Some("203.0.113.7".to_string()),
            user_agent: Some("x".repeat(2000)),
            client_id: None,
        };
        let entry = LoginHistoryRecorder::entry(
            LoginAttempt {
                user_id: None,
                identifier: "ghost@example.com",
                method: LoginMethod::Password,
                success: false,
                failure_reason: Some("unknown_account"),
            },
            &context,
        );
        assert_eq!(entry.user_agent.unwrap().len(), 512);
        assert_eq!(
            entry.identifier_hash,
            LoginHistoryRecorder::identifier_hash("ghost@example.com")
        );
        assert_ne!(entry.identifier_hash, "ghost@example.com");
    }

    #[tokio::test]
    async fn test_repository_failure_is_swallowed() {
        let recorder = LoginHistoryRecorder::new(Arc::new(BrokenRepository));
        recorder
            .record(
                LoginAttempt {
                    user_id: Some(UserId::generate()),
                    identifier: "a@example.com",
                    method: LoginMethod::Password,
                    success: true,
                    failure_reason: None,
                },
                &LoginContext::default(),
            )
            .await;
    }
}
