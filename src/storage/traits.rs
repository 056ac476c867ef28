//! Storage trait definitions for the six tables backing Identity & Session
//! and the Seed Vault. Implementations: `SqliteStore` (production),
//! `MemoryStore` (testing).

use async_trait::async_trait;
use thiserror::Error;

use crate::identity::totp::BackupCode;
use crate::identity::{RateLimitEntry, Session, User};
use crate::vault::EncryptedSeed;

/// Storage errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("record not found: {0}")]
    NotFound(String),

    #[error("duplicate record: {0}")]
    Duplicate(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("connection error: {0}")]
    Connection(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Persistence for `users`, `sessions`, `rate_limits`, and `backup_codes`.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn insert_user(&self, user: &User) -> StorageResult<()>;
    async fn update_user(&self, user: &User) -> StorageResult<()>;
    async fn get_user_by_id(&self, id: &str) -> StorageResult<Option<User>>;
    async fn get_user_by_username(&self, username_canonical: &str) -> StorageResult<Option<User>>;

    async fn insert_session(&self, session: &Session) -> StorageResult<()>;
    async fn update_session(&self, session: &Session) -> StorageResult<()>;
    async fn get_session(&self, session_id: &str) -> StorageResult<Option<Session>>;

    async fn get_rate_limit(&self, identifier: &str) -> StorageResult<Option<RateLimitEntry>>;
    async fn put_rate_limit(&self, entry: &RateLimitEntry) -> StorageResult<()>;

    async fn get_backup_codes(&self, user_id: &str) -> StorageResult<Vec<BackupCode>>;
    async fn replace_backup_codes(&self, user_id: &str, codes: &[BackupCode]) -> StorageResult<()>;
    async fn mark_backup_code_used(&self, user_id: &str, index: usize) -> StorageResult<()>;
}

/// Persistence for `encrypted_seeds` and the additive `settings` table.
#[async_trait]
pub trait VaultStore: Send + Sync {
    async fn put_encrypted_seed(&self, user_id: &str, seed: &EncryptedSeed) -> StorageResult<()>;
    async fn get_encrypted_seed(&self, user_id: &str) -> StorageResult<Option<EncryptedSeed>>;

    async fn get_setting(&self, user_id: &str, key: &str) -> StorageResult<Option<String>>;
    async fn put_setting(&self, user_id: &str, key: &str, value: &str) -> StorageResult<()>;
}
