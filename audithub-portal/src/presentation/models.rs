//! API request and response models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use audithub_core::application::community::ReputationSummary;
use audithub_core::domain::auth::entities::{LoginHistoryEntry, Login};
use audithub_core::domain::auth::value_objects::UserRole;
use audithub_core::domain::community::entities::{Comment, Rating, RatingSummary, ReputationEvent};
use audithub_core::domain::community::value_objects::{
    ContentStatus, Privilege, ReputationEventKind, ReputationLevel,
};
use audithub_core::domain::connect::entities::{IssuedTokens, UserInfo};

/// Error response model
#[derive(Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// Machine-readable error code
    #[schema(example = "INVALID_CREDENTIALS")]
    pub code: String,

    /// Human-readable error message
    #[schema(example = "Invalid credentials provided")]
    pub message: String,

    /// Additional error context
    #[schema(example = r#"{"retry_after": 30}"#)]
    pub details: Option<serde_json::Value>,

    /// Unique request identifier for tracking and support
    pub request_id: Uuid,

    /// Error occurrence timestamp
    #[schema(example = "2026-01-15T10:30:00Z")]
    pub timestamp: DateTime<Utc>,
}

/// OAuth 2.0 error response (RFC 6749 §5.2)
#[derive(Serialize, Deserialize, ToSchema)]
pub struct OAuthErrorResponse {
    #[schema(example = "invalid_grant")]
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(example = "authorization code is invalid or already used")]
    pub error_description: Option<String>,
}

/// Health check response
#[derive(Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    #[schema(example = "healthy")]
    pub status: String,
    #[schema(example = "0.3.0")]
    pub version: String,
    pub timestamp: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Connect
// ---------------------------------------------------------------------------

/// Query string of GET /connect/authorize
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AuthorizeQuery {
    /// Must be `code`
    pub response_type: Option<String>,
    pub client_id: Option<String>,
    pub redirect_uri: Option<String>,
    /// Space separated, must include `openid`
    pub scope: Option<String>,
    pub state: Option<String>,
    pub nonce: Option<String>,
    /// BASE64URL(SHA256(verifier)), 43 characters
    pub code_challenge: Option<String>,
    /// Must be `S256`
    pub code_challenge_method: Option<String>,
}

/// What the login page shows about a pending authorization
#[derive(Serialize, Deserialize, ToSchema)]
pub struct AuthorizationRequestResponse {
    #[schema(example = "AuditHub Portal")]
    pub client_name: String,
    #[schema(example = json!(["openid", "email"]))]
    pub scopes: Vec<String>,
}

/// Password step of a pending authorization
#[derive(Deserialize, ToSchema)]
pub struct PasswordLoginRequest {
    pub request_id: String,
    #[schema(example = "auditor@example.com")]
    pub email: String,
    pub password: String,
}

/// Where the browser goes next
#[derive(Serialize, Deserialize, ToSchema)]
pub struct LoginRedirectResponse {
    #[schema(example = "https://portal.example.com/cb?code=Splx...&state=af0ifjsldkj")]
    pub redirect_to: String,
}

/// Form body of POST /connect/token
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct TokenForm {
    #[schema(example = "authorization_code")]
    pub grant_type: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub code: Option<String>,
    pub redirect_uri: Option<String>,
    pub code_verifier: Option<String>,
    pub refresh_token: Option<String>,
    pub scope: Option<String>,
}

/// Successful token response (RFC 6749 §5.1)
#[derive(Serialize, Deserialize, ToSchema)]
pub struct TokenResponse {
    pub access_token: String,
    #[schema(example = "Bearer")]
    pub token_type: String,
    #[schema(example = 900)]
    pub expires_in: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[schema(example = "openid email offline_access")]
    pub scope: String,
}

impl From<IssuedTokens> for TokenResponse {
    fn from(tokens: IssuedTokens) -> Self {
        Self {
            access_token: tokens.access_token,
            token_type: tokens.token_type.to_string(),
            expires_in: tokens.expires_in,
            id_token: tokens.id_token,
            refresh_token: tokens.refresh_token,
            scope: tokens.scope.to_string(),
        }
    }
}

/// Form body of POST /connect/revoke (RFC 7009)
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct RevokeForm {
    pub token: Option<String>,
    #[schema(example = "refresh_token")]
    pub token_type_hint: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

/// Claims returned by /connect/userinfo
#[derive(Serialize, Deserialize, ToSchema)]
pub struct UserInfoResponse {
    pub sub: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_verified: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preferred_username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
}

impl From<UserInfo> for UserInfoResponse {
    fn from(info: UserInfo) -> Self {
        Self {
            sub: info.sub,
            email: info.email,
            email_verified: info.email_verified,
            name: info.name,
            preferred_username: info.preferred_username,
            picture: info.picture,
        }
    }
}

// ---------------------------------------------------------------------------
// SSO
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SsoBeginQuery {
    /// Pending authorization request from /connect/authorize
    pub request_id: Option<String>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SsoCallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

// ---------------------------------------------------------------------------
// Accounts
// ---------------------------------------------------------------------------

#[derive(Deserialize, ToSchema)]
pub struct RegisterRequest {
    #[schema(example = "auditor@example.com")]
    pub email: String,
    #[schema(example = "auditor")]
    pub username: String,
    #[schema(example = "correct-horse-9")]
    pub password: String,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct ProfileResponse {
    pub user_id: Uuid,
    pub email: String,
    pub username: String,
    pub roles: Vec<UserRole>,
    pub email_verified: bool,
    /// Whether a password is set; SSO-only accounts have none
    pub has_password: bool,
    pub avatar_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ProfileResponse {
    pub fn from_login(login: &Login, avatar_url: Option<String>) -> Self {
        Self {
            user_id: login.user_id.as_uuid(),
            email: login.email.as_str().to_string(),
            username: login.username.as_str().to_string(),
            roles: login.roles.clone(),
            email_verified: login.email_verified,
            has_password: login.password_hash.is_some(),
            avatar_url,
            created_at: login.created_at,
        }
    }
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PaginationQuery {
    /// Page size, 1 to 100 (default 20)
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct LoginHistoryEntryDto {
    pub id: Uuid,
    /// `password`, `sso:{provider}` or `refresh_token`
    #[schema(example = "sso:google")]
    pub method: String,
    pub success: bool,
    pub failure_reason: Option<String>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub client_id: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

impl From<LoginHistoryEntry> for LoginHistoryEntryDto {
    fn from(entry: LoginHistoryEntry) -> Self {
        Self {
            id: entry.id,
            method: entry.method.as_string(),
            success: entry.success,
            failure_reason: entry.failure_reason,
            ip: entry.ip,
            user_agent: entry.user_agent,
            client_id: entry.client_id,
            occurred_at: entry.occurred_at,
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct LoginHistoryResponse {
    pub entries: Vec<LoginHistoryEntryDto>,
    pub limit: u32,
    pub offset: u32,
}

// ---------------------------------------------------------------------------
// Community
// ---------------------------------------------------------------------------

#[derive(Serialize, Deserialize, ToSchema)]
pub struct ReputationEventDto {
    pub kind: ReputationEventKind,
    pub points: i32,
    pub source_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl From<ReputationEvent> for ReputationEventDto {
    fn from(event: ReputationEvent) -> Self {
        Self {
            kind: event.kind,
            points: event.points,
            source_id: event.source_id,
            created_at: event.created_at,
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct ReputationResponse {
    pub user_id: Uuid,
    pub score: i64,
    pub level: ReputationLevel,
    pub next_level: Option<ReputationLevel>,
    pub points_to_next: Option<i64>,
    pub privileges: Vec<Privilege>,
    pub recent_events: Vec<ReputationEventDto>,
}

impl From<ReputationSummary> for ReputationResponse {
    fn from(summary: ReputationSummary) -> Self {
        Self {
            user_id: summary.user_id.as_uuid(),
            score: summary.score,
            level: summary.level,
            next_level: summary.next_level,
            points_to_next: summary.points_to_next,
            privileges: summary.privileges,
            recent_events: summary.recent_events.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct CreateCommentRequest {
    #[schema(example = "The nonce is reused across sessions, see finding 4.")]
    pub body: String,
    /// Comment being replied to, on the same report
    pub parent_id: Option<Uuid>,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct CommentDto {
    pub id: Uuid,
    pub report_id: Uuid,
    pub author_id: Uuid,
    pub parent_id: Option<Uuid>,
    pub body: String,
    pub status: ContentStatus,
    pub score: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Comment> for CommentDto {
    fn from(comment: Comment) -> Self {
        Self {
            id: comment.id.as_uuid(),
            report_id: comment.report_id.as_uuid(),
            author_id: comment.author_id.as_uuid(),
            parent_id: comment.parent_id.map(|p| p.as_uuid()),
            body: comment.body,
            status: comment.status,
            score: comment.score,
            created_at: comment.created_at,
            updated_at: comment.updated_at,
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct CommentListResponse {
    pub comments: Vec<CommentDto>,
    pub total: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ModerationAction {
    Approve,
    Remove,
}

#[derive(Deserialize, ToSchema)]
pub struct ModerationRequest {
    pub action: ModerationAction,
}

#[derive(Deserialize, ToSchema)]
pub struct VoteRequest {
    /// 1 for an upvote, -1 for a downvote
    #[schema(example = 1)]
    pub value: i16,
}

#[derive(Deserialize, ToSchema)]
pub struct RatingRequest {
    /// 1 to 5 stars
    #[schema(example = 4)]
    pub score: i64,
    pub review: Option<String>,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct RatingDto {
    pub id: Uuid,
    pub report_id: Uuid,
    pub user_id: Uuid,
    pub score: u8,
    pub review: Option<String>,
    pub status: ContentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Rating> for RatingDto {
    fn from(rating: Rating) -> Self {
        Self {
            id: rating.id.as_uuid(),
            report_id: rating.report_id.as_uuid(),
            user_id: rating.user_id.as_uuid(),
            score: rating.score.value(),
            review: rating.review,
            status: rating.status,
            created_at: rating.created_at,
            updated_at: rating.updated_at,
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct RatingSummaryResponse {
    pub report_id: Uuid,
    pub count: u64,
    #[schema(example = 4.5)]
    pub average: f64,
    /// Counts for 1 to 5 stars
    #[schema(example = json!([0, 0, 1, 3, 2]))]
    pub distribution: Vec<u64>,
}

impl RatingSummaryResponse {
    pub fn new(report_id: Uuid, summary: RatingSummary) -> Self {
        Self {
            report_id,
            count: summary.count,
            average: summary.average,
            distribution: summary.distribution.to_vec(),
        }
    }
}
