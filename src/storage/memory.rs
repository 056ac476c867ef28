//! In-memory storage for testing: `Arc<RwLock<HashMap>>` per table, one
//! independently lockable table per record kind.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::traits::{IdentityStore, StorageError, StorageResult, VaultStore};
use crate::identity::totp::BackupCode;
use crate::identity::{RateLimitEntry, Session, User};
use crate::vault::EncryptedSeed;

#[derive(Clone, Default)]
pub struct MemoryStore {
    users: Arc<RwLock<HashMap<String, User>>>,
    usernames: Arc<RwLock<HashMap<String, String>>>,
    sessions: Arc<RwLock<HashMap<String, Session>>>,
    rate_limits: Arc<RwLock<HashMap<String, RateLimitEntry>>>,
    backup_codes: Arc<RwLock<HashMap<String, Vec<BackupCode>>>>,
    encrypted_seeds: Arc<RwLock<HashMap<String, EncryptedSeed>>>,
    settings: Arc<RwLock<HashMap<(String, String), String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IdentityStore for MemoryStore {
    async fn insert_user(&self, user: &User) -> StorageResult<()> {
        let mut users = self.users.write().await;
        let mut usernames = self.usernames.write().await;

        if usernames.contains_key(&user.username_canonical) {
            return Err(StorageError::Duplicate(user.username_canonical.clone()));
        }

        usernames.insert(user.username_canonical.clone(), user.id.clone());
        users.insert(user.id.clone(), user.clone());
        Ok(())
    }

    async fn update_user(&self, user: &User) -> StorageResult<()> {
        let mut users = self.users.write().await;
        if !users.contains_key(&user.id) {
            return Err(StorageError::NotFound(user.id.clone()));
        }
        users.insert(user.id.clone(), user.clone());
        Ok(())
    }

    async fn get_user_by_id(&self, id: &str) -> StorageResult<Option<User>> {
        Ok(self.users.read().await.get(id).cloned())
    }

    async fn get_user_by_username(&self, username_canonical: &str) -> StorageResult<Option<User>> {
        let usernames = self.usernames.read().await;
        let Some(id) = usernames.get(username_canonical) else {
            return Ok(None);
        };
        Ok(self.users.read().await.get(id).cloned())
    }

    async fn insert_session(&self, session: &Session) -> StorageResult<()> {
        self.sessions
            .write()
            .await
            .insert(session.session_id.clone(), session.clone());
        Ok(())
    }

    async fn update_session(&self, session: &Session) -> StorageResult<()> {
        let mut sessions = self.sessions.write().await;
        if !sessions.contains_key(&session.session_id) {
            return Err(StorageError::NotFound(session.session_id.clone()));
        }
        sessions.insert(session.session_id.clone(), session.clone());
        Ok(())
    }

    async fn get_session(&self, session_id: &str) -> StorageResult<Option<Session>> {
        Ok(self.sessions.read().await.get(session_id).cloned())
    }

    async fn get_rate_limit(&self, identifier: &str) -> StorageResult<Option<RateLimitEntry>> {
        Ok(self.rate_limits.read().await.get(identifier).cloned())
    }

    async fn put_rate_limit(&self, entry: &RateLimitEntry) -> StorageResult<()> {
        self.rate_limits
            .write()
            .await
            .insert(entry.identifier.clone(), entry.clone());
        Ok(())
    }

    async fn get_backup_codes(&self, user_id: &str) -> StorageResult<Vec<BackupCode>> {
        Ok(self
            .backup_codes
            .read()
            .await
            .get(user_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn replace_backup_codes(&self, user_id: &str, codes: &[BackupCode]) -> StorageResult<()> {
        self.backup_codes
            .write()
            .await
            .insert(user_id.to_string(), codes.to_vec());
        Ok(())
    }

    async fn mark_backup_code_used(&self, user_id: &str, index: usize) -> StorageResult<()> {
        let mut backup_codes = self.backup_codes.write().await;
        let codes = backup_codes
            .get_mut(user_id)
            .ok_or_else(|| StorageError::NotFound(user_id.to_string()))?;
        let entry = codes
            .get_mut(index)
            .ok_or_else(|| StorageError::NotFound(format!("{user_id}/{index}")))?;
        entry.used = true;
        Ok(())
    }
}

#[async_trait]
impl VaultStore for MemoryStore {
    async fn put_encrypted_seed(&self, user_id: &str, seed: &EncryptedSeed) -> StorageResult<()> {
        self.encrypted_seeds
            .write()
            .await
            .insert(user_id.to_string(), seed.clone());
        Ok(())
    }

    async fn get_encrypted_seed(&self, user_id: &str) -> StorageResult<Option<EncryptedSeed>> {
        Ok(self.encrypted_seeds.read().await.get(user_id).cloned())
    }

    async fn get_setting(&self, user_id: &str, key: &str) -> StorageResult<Option<String>> {
        Ok(self
            .settings
            .read()
            .await
            .get(&(user_id.to_string(), key.to_string()))
            .cloned())
    }

    async fn put_setting(&self, user_id: &str, key: &str, value: &str) -> StorageResult<()> {
        self.settings
            .write()
            .await
            .insert((user_id.to_string(), key.to_string()), value.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_user(id: &str, username: &str) -> User {
        User {
            id: id.to_string(),
            username_canonical: username.to_string(),
            email: None,
            password_verifier: "pbkdf2-sha512$100$salt$dk".to_string(),
            created_at: 0,
            last_login_at: None,
            totp_secret: None,
            totp_enabled: false,
            is_active: true,
            backup_confirmed: false,
        }
    }

    #[tokio::test]
    async fn test_duplicate_username_rejected() {
        let store = MemoryStore::new();
        store.insert_user(&test_user("u1", "alice")).await.unwrap();
        let result = store.insert_user(&test_user("u2", "alice")).await;
        assert!(matches!(result, Err(StorageError::Duplicate(_))));
    }

    #[tokio::test]
    async fn test_settings_roundtrip() {
        let store = MemoryStore::new();
        store.put_setting("u1", "backup_confirmed", "true").await.unwrap();
        let value = store.get_setting("u1", "backup_confirmed").await.unwrap();
        assert_eq!(value, Some("true".to_string()));
        assert_eq!(store.get_setting("u1", "missing").await.unwrap(), None);
    }
}
