use async_trait::async_trait;
use std::time::Duration;

use crate::application::errors::ApplicationError;
use crate::domain::connect::entities::{AuthorizationCode, AuthorizationRequest};
use crate::domain::sso::entities::SsoState;

/// Short-lived, single-use state of the authorization flow.
///
/// Every `take_*` is an atomic read-and-delete: of two concurrent callers at
/// most one gets the value.
#[async_trait]
pub trait AuthorizationSessionStore: Send + Sync {
    async fn save_request(
        &self,
        request: &AuthorizationRequest,
        ttl: Duration,
    ) -> Result<(), ApplicationError>;

    async fn find_request(
        &self,
        request_id: &str,
    ) -> Result<Option<AuthorizationRequest>, ApplicationError>;

    async fn take_request(
        &self,
        request_id: &str,
    ) -> Result<Option<AuthorizationRequest>, ApplicationError>;

    async fn save_code(
        &self,
        code: &str,
        grant: &AuthorizationCode,
        ttl: Duration,
    ) -> Result<(), ApplicationError>;

    async fn take_code(&self, code: &str) -> Result<Option<AuthorizationCode>, ApplicationError>;

    async fn save_sso_state(
        &self,
        state: &str,
        sso_state: &SsoState,
        ttl: Duration,
    ) -> Result<(), ApplicationError>;

    async fn take_sso_state(&self, state: &str) -> Result<Option<SsoState>, ApplicationError>;
}
