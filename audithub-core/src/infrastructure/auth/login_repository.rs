//! SQLx implementations of the account and identity-link repositories

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::auth::{
    entities::{Avatar, ExternalLogin, Login},
    errors::AuthError,
    repositories::{IExternalLoginRepository, ILoginRepository},
    value_objects::{Email, PasswordHash, UserId, UserRole, Username},
};

#[derive(sqlx::FromRow)]
struct LoginRow {
    id: Uuid,
    email: String,
    username: String,
    password_hash: Option<String>,
    roles: serde_json::Value,
    email_verified: bool,
    avatar_content_type: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<LoginRow> for Login {
    type Error = AuthError;

    fn try_from(row: LoginRow) -> Result<Self, Self::Error> {
        let email = Email::new(row.email.clone())
            .map_err(|_| AuthError::InvalidEmail { email: row.email })?;
        let username =
            Username::new(row.username).map_err(|reason| AuthError::InvalidUsername { reason })?;

        let roles: Vec<String> = serde_json::from_value(row.roles).unwrap_or_default();
        let roles = roles
            .iter()
            .filter_map(|r| UserRole::from_str(r).ok())
            .collect();

        Ok(Login {
            user_id: UserId::from(row.id),
            email,
            username,
            password_hash: row.password_hash.map(PasswordHash::from),
            roles,
            email_verified: row.email_verified,
            avatar_content_type: row.avatar_content_type,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const LOGIN_COLUMNS: &str = "id, email, username, password_hash, roles, email_verified, \
     avatar_content_type, created_at, updated_at";

fn roles_json(login: &Login) -> serde_json::Value {
    serde_json::Value::Array(
        login
            .roles
            .iter()
            .map(|r| serde_json::Value::String(r.to_string()))
            .collect(),
    )
}

/// Translate unique-constraint violations into the matching domain error
fn map_write_error(e: sqlx::Error, login: &Login) -> AuthError {
    if let Some(db_err) = e.as_database_error() {
        match db_err.constraint() {
            Some("logins_email_key") => {
                return AuthError::EmailAlreadyExists {
                    email: login.email.as_str().to_string(),
                };
            }
            Some("logins_username_key") => {
                return AuthError::UsernameTaken {
                    username: login.username.as_str().to_string(),
                };
            }
            _ => {}
        }
    }
    tracing::error!("Database error writing login: {}", e);
    AuthError::from(e)
}

pub struct SqlxLoginRepository {
    pool: Arc<PgPool>,
}

impl SqlxLoginRepository {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ILoginRepository for SqlxLoginRepository {
    #[tracing::instrument(skip(self), fields(email = %email.as_str()))]
    async fn find_by_email(&self, email: &Email) -> Result<Option<Login>, AuthError> {
        let row = sqlx::query_as::<_, LoginRow>(&format!(
            "SELECT {LOGIN_COLUMNS} FROM logins WHERE email = $1"
        ))
        .bind(email.as_str())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Database error finding login by email: {}", e);
            AuthError::from(e)
        })?;

        row.map(Login::try_from).transpose()
    }

    #[tracing::instrument(skip(self), fields(user_id = %user_id))]
    async fn find_by_id(&self, user_id: &UserId) -> Result<Option<Login>, AuthError> {
        let row = sqlx::query_as::<_, LoginRow>(&format!(
            "SELECT {LOGIN_COLUMNS} FROM logins WHERE id = $1"
        ))
        .bind(user_id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Database error finding login by id: {}", e);
            AuthError::from(e)
        })?;

        row.map(Login::try_from).transpose()
    }

    async fn username_exists(&self, username: &Username) -> Result<bool, AuthError> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM logins WHERE username = $1)")
                .bind(username.as_str())
                .fetch_one(&*self.pool)
                .await?;
        Ok(exists)
    }

    #[tracing::instrument(skip(self, login), fields(user_id = %login.user_id))]
    async fn create(&self, login: &Login) -> Result<(), AuthError> {
        sqlx::query(
            r#"
            INSERT INTO logins (id, email, username, password_hash, roles, email_verified,
                                avatar_content_type, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(login.user_id.as_uuid())
        .bind(login.email.as_str())
        .bind(login.username.as_str())
        .bind(login.password_hash.as_ref().map(|h| h.as_str()))
        .bind(roles_json(login))
        .bind(login.email_verified)
        .bind(login.avatar_content_type.as_deref())
        .bind(login.created_at)
        .bind(login.updated_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_write_error(e, login))?;

        tracing::info!(user_id = %login.user_id, "Login created");
        Ok(())
    }

    #[tracing::instrument(skip(self, login), fields(user_id = %login.user_id))]
    async fn update(&self, login: &Login) -> Result<(), AuthError> {
        let result = sqlx::query(
            r#"
            UPDATE logins
            SET email = $2, username = $3, password_hash = $4, roles = $5,
                email_verified = $6, updated_at = $7
            WHERE id = $1
            "#,
        )
        .bind(login.user_id.as_uuid())
        .bind(login.email.as_str())
        .bind(login.username.as_str())
        .bind(login.password_hash.as_ref().map(|h| h.as_str()))
        .bind(roles_json(login))
        .bind(login.email_verified)
        .bind(login.updated_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_write_error(e, login))?;

        if result.rows_affected() == 0 {
            return Err(AuthError::UserIdNotFound {
                user_id: login.user_id.to_string(),
            });
        }
        Ok(())
    }

    #[tracing::instrument(skip(self, avatar), fields(user_id = %user_id, bytes = avatar.bytes.len()))]
    async fn save_avatar(&self, user_id: &UserId, avatar: &Avatar) -> Result<(), AuthError> {
        let result = sqlx::query(
            "UPDATE logins SET avatar_content_type = $2, avatar_bytes = $3, updated_at = NOW() WHERE id = $1",
        )
        .bind(user_id.as_uuid())
        .bind(&avatar.content_type)
        .bind(&avatar.bytes)
        .execute(&*self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AuthError::UserIdNotFound {
                user_id: user_id.to_string(),
            });
        }
        Ok(())
    }

    async fn find_avatar(&self, user_id: &UserId) -> Result<Option<Avatar>, AuthError> {
        let row: Option<(Option<String>, Option<Vec<u8>>)> = sqlx::query_as(
            "SELECT avatar_content_type, avatar_bytes FROM logins WHERE id = $1",
        )
        .bind(user_id.as_uuid())
        .fetch_optional(&*self.pool)
        .await?;

        Ok(match row {
            Some((Some(content_type), Some(bytes))) => Some(Avatar {
                content_type,
                bytes,
            }),
            _ => None,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ExternalLoginRow {
    provider: String,
    subject: String,
    user_id: Uuid,
    linked_at: DateTime<Utc>,
}

impl From<ExternalLoginRow> for ExternalLogin {
    fn from(row: ExternalLoginRow) -> Self {
        ExternalLogin {
            provider: row.provider,
            subject: row.subject,
            user_id: UserId::from(row.user_id),
            linked_at: row.linked_at,
        }
    }
}

pub struct SqlxExternalLoginRepository {
    pool: Arc<PgPool>,
}

impl SqlxExternalLoginRepository {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IExternalLoginRepository for SqlxExternalLoginRepository {
    #[tracing::instrument(skip(self, subject), fields(provider = %provider))]
    async fn find(&self, provider: &str, subject: &str) -> Result<Option<ExternalLogin>, AuthError> {
        let row = sqlx::query_as::<_, ExternalLoginRow>(
            "SELECT provider, subject, user_id, linked_at FROM external_logins WHERE provider = $1 AND subject = $2",
        )
        .bind(provider)
        .bind(subject)
        .fetch_optional(&*self.pool)
        .await?;
        Ok(row.map(ExternalLogin::from))
    }

    #[tracing::instrument(skip(self, link), fields(provider = %link.provider, user_id = %link.user_id))]
    async fn create(&self, link: &ExternalLogin) -> Result<(), AuthError> {
        sqlx::query(
            "INSERT INTO external_logins (provider, subject, user_id, linked_at) VALUES ($1, $2, $3, $4)",
        )
        .bind(&link.provider)
        .bind(&link.subject)
        .bind(link.user_id.as_uuid())
        .bind(link.linked_at)
        .execute(&*self.pool)
        .await?;
        Ok(())
    }

    async fn list_for_user(&self, user_id: &UserId) -> Result<Vec<ExternalLogin>, AuthError> {
        let rows = sqlx::query_as::<_, ExternalLoginRow>(
            "SELECT provider, subject, user_id, linked_at FROM external_logins WHERE user_id = $1 ORDER BY linked_at",
        )
        .bind(user_id.as_uuid())
        .fetch_all(&*self.pool)
        .await?;
        Ok(rows.into_iter().map(ExternalLogin::from).collect())
    }
}
