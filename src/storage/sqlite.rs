//! SQLite-backed persistence for the six SCC tables, pooled via `r2d2` the
//! same way the teacher's deposit store is pooled.

use async_trait::async_trait;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension};
use std::path::Path;
use std::str::FromStr;

use super::traits::{IdentityStore, StorageError, StorageResult, VaultStore};
use crate::identity::session::SessionState;
use crate::identity::totp::BackupCode;
use crate::identity::{RateLimitEntry, Session, User};
use crate::vault::EncryptedSeed;

pub struct SqliteStore {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self, StorageError> {
        if let Some(parent) = db_path.as_ref().parent() {
            std::fs::create_dir_all(parent).ok();
        }

        let manager = SqliteConnectionManager::file(db_path);
        let pool = Pool::builder()
            .max_size(10)
            .build(manager)
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let store = Self { pool };
        store.run_migrations()?;
        Ok(store)
    }

    pub fn in_memory() -> Result<Self, StorageError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let store = Self { pool };
        store.run_migrations()?;
        Ok(store)
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, StorageError> {
        self.pool
            .get()
            .map_err(|e| StorageError::Connection(e.to_string()))
    }

    fn run_migrations(&self) -> Result<(), StorageError> {
        let conn = self.conn()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                username_canonical TEXT NOT NULL UNIQUE,
                email TEXT,
                password_verifier TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                last_login_at INTEGER,
                totp_secret TEXT,
                totp_enabled INTEGER NOT NULL DEFAULT 0,
                is_active INTEGER NOT NULL DEFAULT 1,
                backup_confirmed INTEGER NOT NULL DEFAULT 0
            );
            CREATE INDEX IF NOT EXISTS idx_users_username ON users(username_canonical);

            CREATE TABLE IF NOT EXISTS sessions (
                session_id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                last_activity_at INTEGER NOT NULL,
                expires_at INTEGER NOT NULL,
                totp_satisfied INTEGER NOT NULL,
                state TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions(user_id);

            CREATE TABLE IF NOT EXISTS rate_limits (
                identifier TEXT PRIMARY KEY,
                failed_attempts INTEGER NOT NULL,
                window_start INTEGER NOT NULL,
                locked_until INTEGER
            );

            CREATE TABLE IF NOT EXISTS backup_codes (
                user_id TEXT NOT NULL,
                idx INTEGER NOT NULL,
                verifier TEXT NOT NULL,
                used INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (user_id, idx)
            );

            CREATE TABLE IF NOT EXISTS encrypted_seeds (
                user_id TEXT PRIMARY KEY,
                version INTEGER NOT NULL,
                kdf_iterations INTEGER NOT NULL,
                salt BLOB NOT NULL,
                nonce BLOB NOT NULL,
                ciphertext BLOB NOT NULL
            );

            CREATE TABLE IF NOT EXISTS settings (
                user_id TEXT NOT NULL,
                key TEXT NOT NULL,
                value TEXT NOT NULL,
                PRIMARY KEY (user_id, key)
            );
            "#,
        )
        .map_err(|e| StorageError::Database(e.to_string()))?;

        Ok(())
    }

    fn row_to_user(row: &rusqlite::Row) -> rusqlite::Result<User> {
        Ok(User {
            id: row.get("id")?,
            username_canonical: row.get("username_canonical")?,
            email: row.get("email")?,
            password_verifier: row.get("password_verifier")?,
            created_at: row.get("created_at")?,
            last_login_at: row.get("last_login_at")?,
            totp_secret: row.get("totp_secret")?,
            totp_enabled: row.get::<_, i64>("totp_enabled")? != 0,
            is_active: row.get::<_, i64>("is_active")? != 0,
            backup_confirmed: row.get::<_, i64>("backup_confirmed")? != 0,
        })
    }

    fn row_to_session(row: &rusqlite::Row) -> rusqlite::Result<Session> {
        let state_str: String = row.get("state")?;
        let state = SessionState::from_str(&state_str).unwrap_or(SessionState::Invalidated);

        Ok(Session {
            session_id: row.get("session_id")?,
            user_id: row.get("user_id")?,
            created_at: row.get("created_at")?,
            last_activity_at: row.get("last_activity_at")?,
            expires_at: row.get("expires_at")?,
            totp_satisfied: row.get::<_, i64>("totp_satisfied")? != 0,
            state,
        })
    }

    fn row_to_rate_limit(row: &rusqlite::Row) -> rusqlite::Result<RateLimitEntry> {
        Ok(RateLimitEntry {
            identifier: row.get("identifier")?,
            failed_attempts: row.get::<_, i64>("failed_attempts")? as u32,
            window_start: row.get("window_start")?,
            locked_until: row.get("locked_until")?,
        })
    }

    fn row_to_encrypted_seed(row: &rusqlite::Row) -> rusqlite::Result<EncryptedSeed> {
        let salt: Vec<u8> = row.get("salt")?;
        let nonce: Vec<u8> = row.get("nonce")?;
        Ok(EncryptedSeed {
            version: row.get::<_, i64>("version")? as u8,
            kdf_iterations: row.get::<_, i64>("kdf_iterations")? as u32,
            salt: salt.try_into().unwrap_or([0u8; 32]),
            nonce: nonce.try_into().unwrap_or([0u8; 12]),
            ciphertext: row.get("ciphertext")?,
        })
    }
}

#[async_trait]
impl IdentityStore for SqliteStore {
    async fn insert_user(&self, user: &User) -> StorageResult<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO users (
                id, username_canonical, email, password_verifier, created_at,
                last_login_at, totp_secret, totp_enabled, is_active, backup_confirmed
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
            params![
                user.id,
                user.username_canonical,
                user.email,
                user.password_verifier,
                user.created_at,
                user.last_login_at,
                user.totp_secret,
                user.totp_enabled as i64,
                user.is_active as i64,
                user.backup_confirmed as i64,
            ],
        )
        .map_err(|e| {
            if let rusqlite::Error::SqliteFailure(ref err, _) = e {
                if err.extended_code == 2067 || err.extended_code == 1555 {
                    return StorageError::Duplicate(user.username_canonical.clone());
                }
            }
            StorageError::Database(e.to_string())
        })?;
        Ok(())
    }

    async fn update_user(&self, user: &User) -> StorageResult<()> {
        let conn = self.conn()?;
        let rows = conn
            .execute(
                r#"
            UPDATE users SET
                email = ?2, password_verifier = ?3, last_login_at = ?4,
                totp_secret = ?5, totp_enabled = ?6, is_active = ?7, backup_confirmed = ?8
            WHERE id = ?1
            "#,
                params![
                    user.id,
                    user.email,
                    user.password_verifier,
                    user.last_login_at,
                    user.totp_secret,
                    user.totp_enabled as i64,
                    user.is_active as i64,
                    user.backup_confirmed as i64,
                ],
            )
            .map_err(|e| StorageError::Database(e.to_string()))?;

        if rows == 0 {
            return Err(StorageError::NotFound(user.id.clone()));
        }
        Ok(())
    }

    async fn get_user_by_id(&self, id: &str) -> StorageResult<Option<User>> {
        let conn = self.conn()?;
        conn.query_row("SELECT * FROM users WHERE id = ?1", params![id], Self::row_to_user)
            .optional()
            .map_err(|e| StorageError::Database(e.to_string()))
    }

    async fn get_user_by_username(&self, username_canonical: &str) -> StorageResult<Option<User>> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT * FROM users WHERE username_canonical = ?1",
            params![username_canonical],
            Self::row_to_user,
        )
        .optional()
        .map_err(|e| StorageError::Database(e.to_string()))
    }

    async fn insert_session(&self, session: &Session) -> StorageResult<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO sessions (
                session_id, user_id, created_at, last_activity_at, expires_at,
                totp_satisfied, state
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                session.session_id,
                session.user_id,
                session.created_at,
                session.last_activity_at,
                session.expires_at,
                session.totp_satisfied as i64,
                session.state.to_string(),
            ],
        )
        .map_err(|e| StorageError::Database(e.to_string()))?;
        Ok(())
    }

    async fn update_session(&self, session: &Session) -> StorageResult<()> {
        let conn = self.conn()?;
        let rows = conn
            .execute(
                r#"
            UPDATE sessions SET
                last_activity_at = ?2, expires_at = ?3, totp_satisfied = ?4, state = ?5
            WHERE session_id = ?1
            "#,
                params![
                    session.session_id,
                    session.last_activity_at,
                    session.expires_at,
                    session.totp_satisfied as i64,
                    session.state.to_string(),
                ],
            )
            .map_err(|e| StorageError::Database(e.to_string()))?;

        if rows == 0 {
            return Err(StorageError::NotFound(session.session_id.clone()));
        }
        Ok(())
    }

    async fn get_session(&self, session_id: &str) -> StorageResult<Option<Session>> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT * FROM sessions WHERE session_id = ?1",
            params![session_id],
            Self::row_to_session,
        )
        .optional()
        .map_err(|e| StorageError::Database(e.to_string()))
    }

    async fn get_rate_limit(&self, identifier: &str) -> StorageResult<Option<RateLimitEntry>> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT * FROM rate_limits WHERE identifier = ?1",
            params![identifier],
            Self::row_to_rate_limit,
        )
        .optional()
        .map_err(|e| StorageError::Database(e.to_string()))
    }

    async fn put_rate_limit(&self, entry: &RateLimitEntry) -> StorageResult<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO rate_limits (identifier, failed_attempts, window_start, locked_until)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(identifier) DO UPDATE SET
                failed_attempts = excluded.failed_attempts,
                window_start = excluded.window_start,
                locked_until = excluded.locked_until
            "#,
            params![
                entry.identifier,
                entry.failed_attempts as i64,
                entry.window_start,
                entry.locked_until,
            ],
        )
        .map_err(|e| StorageError::Database(e.to_string()))?;
        Ok(())
    }

    async fn get_backup_codes(&self, user_id: &str) -> StorageResult<Vec<BackupCode>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT verifier, used FROM backup_codes WHERE user_id = ?1 ORDER BY idx ASC")
            .map_err(|e| StorageError::Database(e.to_string()))?;

        let codes = stmt
            .query_map(params![user_id], |row| {
                Ok(BackupCode {
                    verifier: row.get(0)?,
                    used: row.get::<_, i64>(1)? != 0,
                })
            })
            .map_err(|e| StorageError::Database(e.to_string()))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| StorageError::Database(e.to_string()))?;

        Ok(codes)
    }

    async fn replace_backup_codes(&self, user_id: &str, codes: &[BackupCode]) -> StorageResult<()> {
        let mut conn = self.conn()?;
        let tx = conn
            .transaction()
            .map_err(|e| StorageError::Database(e.to_string()))?;

        tx.execute("DELETE FROM backup_codes WHERE user_id = ?1", params![user_id])
            .map_err(|e| StorageError::Database(e.to_string()))?;

        for (idx, code) in codes.iter().enumerate() {
            tx.execute(
                "INSERT INTO backup_codes (user_id, idx, verifier, used) VALUES (?1, ?2, ?3, ?4)",
                params![user_id, idx as i64, code.verifier, code.used as i64],
            )
            .map_err(|e| StorageError::Database(e.to_string()))?;
        }

        tx.commit().map_err(|e| StorageError::Database(e.to_string()))?;
        Ok(())
    }

    async fn mark_backup_code_used(&self, user_id: &str, index: usize) -> StorageResult<()> {
        let conn = self.conn()?;
        let rows = conn
            .execute(
                "UPDATE backup_codes SET used = 1 WHERE user_id = ?1 AND idx = ?2",
                params![user_id, index as i64],
            )
            .map_err(|e| StorageError::Database(e.to_string()))?;

        if rows == 0 {
            return Err(StorageError::NotFound(format!("{user_id}/{index}")));
        }
        Ok(())
    }
}

#[async_trait]
impl VaultStore for SqliteStore {
    async fn put_encrypted_seed(&self, user_id: &str, seed: &EncryptedSeed) -> StorageResult<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO encrypted_seeds (user_id, version, kdf_iterations, salt, nonce, ciphertext)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(user_id) DO UPDATE SET
                version = excluded.version,
                kdf_iterations = excluded.kdf_iterations,
                salt = excluded.salt,
                nonce = excluded.nonce,
                ciphertext = excluded.ciphertext
            "#,
            params![
                user_id,
                seed.version as i64,
                seed.kdf_iterations as i64,
                seed.salt.to_vec(),
                seed.nonce.to_vec(),
                seed.ciphertext,
            ],
        )
        .map_err(|e| StorageError::Database(e.to_string()))?;
        Ok(())
    }

    async fn get_encrypted_seed(&self, user_id: &str) -> StorageResult<Option<EncryptedSeed>> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT * FROM encrypted_seeds WHERE user_id = ?1",
            params![user_id],
            Self::row_to_encrypted_seed,
        )
        .optional()
        .map_err(|e| StorageError::Database(e.to_string()))
    }

    async fn get_setting(&self, user_id: &str, key: &str) -> StorageResult<Option<String>> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT value FROM settings WHERE user_id = ?1 AND key = ?2",
            params![user_id, key],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| StorageError::Database(e.to_string()))
    }

    async fn put_setting(&self, user_id: &str, key: &str, value: &str) -> StorageResult<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO settings (user_id, key, value) VALUES (?1, ?2, ?3)
            ON CONFLICT(user_id, key) DO UPDATE SET value = excluded.value
            "#,
            params![user_id, key, value],
        )
        .map_err(|e| StorageError::Database(e.to_string()))?;
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
            created_at: 1000,
            last_login_at: None,
            totp_secret: None,
            totp_enabled: false,
            is_active: true,
            backup_confirmed: false,
        }
    }

    #[tokio::test]
    async fn test_insert_and_get_user_by_username() {
        let store = SqliteStore::in_memory().unwrap();
        let user = test_user("u1", "alice");
        store.insert_user(&user).await.unwrap();

        let fetched = store.get_user_by_username("alice").await.unwrap().unwrap();
        assert_eq!(fetched.id, "u1");
    }

    #[tokio::test]
    async fn test_duplicate_username_rejected() {
        let store = SqliteStore::in_memory().unwrap();
        store.insert_user(&test_user("u1", "alice")).await.unwrap();
        let result = store.insert_user(&test_user("u2", "alice")).await;
        assert!(matches!(result, Err(StorageError::Duplicate(_))));
    }

    #[tokio::test]
    async fn test_session_roundtrip_and_update() {
        let store = SqliteStore::in_memory().unwrap();
        let mut session =
            Session::issue("u1", false, 1000, crate::identity::session::SESSION_TTL_SECS).unwrap();
        store.insert_session(&session).await.unwrap();

        session.last_activity_at = 1200;
        session.expires_at = 1200 + 900;
        store.update_session(&session).await.unwrap();

        let fetched = store.get_session(&session.session_id).await.unwrap().unwrap();
        assert_eq!(fetched.expires_at, 2100);
    }

    #[tokio::test]
    async fn test_encrypted_seed_upsert() {
        let store = SqliteStore::in_memory().unwrap();
        let seed = crate::vault::encrypt_seed(&[7u8; 64], "pw", b"mf", 100).unwrap();
        store.put_encrypted_seed("u1", &seed).await.unwrap();

        let fetched = store.get_encrypted_seed("u1").await.unwrap().unwrap();
        assert_eq!(fetched.ciphertext, seed.ciphertext);

        let seed2 = crate::vault::encrypt_seed(&[8u8; 64], "pw2", b"mf", 100).unwrap();
        store.put_encrypted_seed("u1", &seed2).await.unwrap();
        let fetched2 = store.get_encrypted_seed("u1").await.unwrap().unwrap();
        assert_eq!(fetched2.ciphertext, seed2.ciphertext);
    }

    #[tokio::test]
    async fn test_backup_codes_replace_and_mark_used() {
        let store = SqliteStore::in_memory().unwrap();
        let (_plain, codes) = crate::identity::totp::generate_backup_codes(100).unwrap();
        store.replace_backup_codes("u1", &codes).await.unwrap();

        let fetched = store.get_backup_codes("u1").await.unwrap();
        assert_eq!(fetched.len(), codes.len());

        store.mark_backup_code_used("u1", 2).await.unwrap();
        let fetched = store.get_backup_codes("u1").await.unwrap();
        assert!(fetched[2].used);
        assert!(!fetched[0].used);
    }

    #[tokio::test]
    async fn test_rate_limit_upsert() {
        let store = SqliteStore::in_memory().unwrap();
        let mut entry = RateLimitEntry::fresh("alice", 0);
        store.put_rate_limit(&entry).await.unwrap();

        entry.record_failure(
            10,
            crate::identity::ratelimit::WINDOW_SECS,
            crate::identity::ratelimit::FAILURE_THRESHOLD,
            crate::identity::ratelimit::LOCKOUT_SECS,
        );
        store.put_rate_limit(&entry).await.unwrap();

        let fetched = store.get_rate_limit("alice").await.unwrap().unwrap();
        assert_eq!(fetched.failed_attempts, 1);
    }
}
