//! Portal API controllers

pub mod account;
pub mod community;
pub mod connect;
pub mod health;
pub mod sso;

use axum::http::{HeaderMap, header};
use std::sync::Arc;

use audithub_core::application::auth::{
    GetAvatarUseCase, GetProfileUseCase, ListLoginHistoryUseCase, RegisterUseCase,
};
use audithub_core::application::community::{CommentService, RatingService, ReputationService};
use audithub_core::application::connect::ConnectService;
use audithub_core::application::sso::SsoService;
use audithub_core::domain::auth::entities::LoginContext;
use audithub_core::infrastructure::rate_limiter::RateLimiterService;

use crate::presentation::auth::AuthState;
use crate::presentation::middleware::extract_ip;

/// Application state shared by every handler
#[derive(Clone)]
pub struct PortalState {
    // Connect and SSO
    pub connect: Arc<ConnectService>,
    pub sso: Arc<SsoService>,

    // Accounts
    pub register_use_case: Arc<RegisterUseCase>,
    pub get_profile_use_case: Arc<GetProfileUseCase>,
    pub get_avatar_use_case: Arc<GetAvatarUseCase>,
    pub list_login_history_use_case: Arc<ListLoginHistoryUseCase>,

    // Community
    pub comments: Arc<CommentService>,
    pub ratings: Arc<RatingService>,
    pub reputation: Arc<ReputationService>,

    pub rate_limiter: Arc<RateLimiterService>,
}

impl PortalState {
    pub fn auth_state(&self) -> AuthState {
        AuthState {
            connect: Arc::clone(&self.connect),
        }
    }
}

/// Login history context from request headers
pub(crate) fn login_context(headers: &HeaderMap) -> LoginContext {
    let ip = extract_ip(headers);
    LoginContext {
        ip: (ip != "unknown-ip").then_some(ip),
        user_agent: headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        client_id: None,
    }
}
