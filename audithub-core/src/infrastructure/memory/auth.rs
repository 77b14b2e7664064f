use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::domain::auth::{
    entities::{Avatar, ExternalLogin, Login, LoginHistoryEntry},
    errors::AuthError,
    repositories::{IExternalLoginRepository, ILoginHistoryRepository, ILoginRepository},
    value_objects::{Email, UserId, Username},
};

#[derive(Default)]
struct LoginStore {
    logins: HashMap<UserId, Login>,
    avatars: HashMap<UserId, Avatar>,
}

#[derive(Default)]
pub struct InMemoryLoginRepository {
    store: RwLock<LoginStore>,
}

impl InMemoryLoginRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn check_unique(store: &LoginStore, login: &Login) -> Result<(), AuthError> {
        for other in store.logins.values().filter(|l| l.user_id != login.user_id) {
            if other.email == login.email {
                return Err(AuthError::EmailAlreadyExists {
                    email: login.email.as_str().to_string(),
                });
            }
            if other.username == login.username {
                return Err(AuthError::UsernameTaken {
                    username: login.username.as_str().to_string(),
                });
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ILoginRepository for InMemoryLoginRepository {
    async fn find_by_email(&self, email: &Email) -> Result<Option<Login>, AuthError> {
        let store = self.store.read().await;
        Ok(store.logins.values().find(|l| &l.email == email).cloned())
    }

    async fn find_by_id(&self, user_id: &UserId) -> Result<Option<Login>, AuthError> {
        Ok(self.store.read().await.logins.get(user_id).cloned())
    }

    async fn username_exists(&self, username: &Username) -> Result<bool, AuthError> {
        let store = self.store.read().await;
        Ok(store.logins.values().any(|l| &l.username == username))
    }

    async fn create(&self, login: &Login) -> Result<(), AuthError> {
        let mut store = self.store.write().await;
        Self::check_unique(&store, login)?;
        store.logins.insert(login.user_id, login.clone());
        Ok(())
    }

    async fn update(&self, login: &Login) -> Result<(), AuthError> {
        let mut store = self.store.write().await;
        Self::check_unique(&store, login)?;
        let existing = store
            .logins
            .get_mut(&login.user_id)
            .ok_or_else(|| AuthError::UserIdNotFound {
                user_id: login.user_id.to_string(),
            })?;
        // The avatar column is owned by save_avatar
        let avatar_content_type = existing.avatar_content_type.take();
        *existing = Login {
            avatar_content_type,
            ..login.clone()
        };
        Ok(())
    }

    async fn save_avatar(&self, user_id: &UserId, avatar: &Avatar) -> Result<(), AuthError> {
        let mut store = self.store.write().await;
        let login = store
            .logins
            .get_mut(user_id)
            .ok_or_else(|| AuthError::UserIdNotFound {
                user_id: user_id.to_string(),
            })?;
        login.avatar_content_type = Some(avatar.content_type.clone());
        login.updated_at = Utc::now();
        store.avatars.insert(*user_id, avatar.clone());
        Ok(())
    }

    async fn find_avatar(&self, user_id: &UserId) -> Result<Option<Avatar>, AuthError> {
        Ok(self.store.read().await.avatars.get(user_id).cloned())
    }
}

#[derive(Default)]
pub struct InMemoryExternalLoginRepository {
    links: RwLock<HashMap<(String, String), ExternalLogin>>,
}

impl InMemoryExternalLoginRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IExternalLoginRepository for InMemoryExternalLoginRepository {
    async fn find(&self, provider: &str, subject: &str) -> Result<Option<ExternalLogin>, AuthError> {
        let links = self.links.read().await;
        Ok(links
            .get(&(provider.to_string(), subject.to_string()))
            .cloned())
    }

    async fn create(&self, link: &ExternalLogin) -> Result<(), AuthError> {
        let mut links = self.links.write().await;
        let key = (link.provider.clone(), link.subject.clone());
        if links.contains_key(&key) {
            return Err(AuthError::DatabaseError {
                message: format!("external login {}:{} already linked", key.0, key.1),
            });
        }
        links.insert(key, link.clone());
        Ok(())
    }

    async fn list_for_user(&self, user_id: &UserId) -> Result<Vec<ExternalLogin>, AuthError> {
        let links = self.links.read().await;
        let mut found: Vec<_> = links
            .values()
            .filter(|l| &l.user_id == user_id)
            .cloned()
            .collect();
        found.sort_by_key(|l| l.linked_at);
        Ok(found)
    }
}

#[derive(Default)]
pub struct InMemoryLoginHistoryRepository {
    entries: RwLock<Vec<LoginHistoryEntry>>,
}

impl InMemoryLoginHistoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every recorded entry, including anonymous ones, oldest first
    pub async fn all(&self) -> Vec<LoginHistoryEntry> {
        self.entries.read().await.clone()
    }
}

#[async_trait]
impl ILoginHistoryRepository for InMemoryLoginHistoryRepository {
    async fn append(&self, entry: &LoginHistoryEntry) -> Result<(), AuthError> {
        self.entries.write().await.push(entry.clone());
        Ok(())
    }

    async fn list_for_user(
        &self,
        user_id: &UserId,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<LoginHistoryEntry>, AuthError> {
        let entries = self.entries.read().await;
        let mut mine: Vec<_> = entries
            .iter()
            .filter(|e| e.user_id.as_ref() == Some(user_id))
            .cloned()
            .collect();
        // Newest first; insertion order breaks timestamp ties
        mine.sort_by_key(|e| e.occurred_at);
        mine.reverse();
        Ok(mine
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::auth::value_objects::PasswordHash;

    fn login(email: &str, username: &str) -> Login {
        Login::new_with_password(
            Email::new(email.to_string()).unwrap(),
            Username::new(username.to_string()).unwrap(),
            PasswordHash::new("$argon2id$stub".to_string()),
        )
    }

    #[tokio::test]
    async fn test_unique_email_and_username() {
        let repo = InMemoryLoginRepository::new();
        repo.create(&login("a@example.com", "alice")).await.unwrap();

        assert!(matches!(
            repo.create(&login("a@example.com", "other")).await,
            Err(AuthError::EmailAlreadyExists { .. })
        ));
        assert!(matches!(
            repo.create(&login("b@example.com", "alice")).await,
            Err(AuthError::UsernameTaken { .. })
        ));
    }

    #[tokio::test]
    async fn test_avatar_survives_profile_update() {
        let repo = InMemoryLoginRepository::new();
        let mut login = login("a@example.com", "alice");
        repo.create(&login).await.unwrap();
        repo.save_avatar(
            &login.user_id,
            &Avatar {
                content_type: "image/png".to_string(),
                bytes: vec![1, 2, 3],
            },
        )
        .await
        .unwrap();

        login.mark_email_verified();
        repo.update(&login).await.unwrap();

        let stored = repo.find_by_id(&login.user_id).await.unwrap().unwrap();
        assert!(stored.email_verified);
        assert_eq!(stored.avatar_content_type.as_deref(), Some("image/png"));
    }
}
