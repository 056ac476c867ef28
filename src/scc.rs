//! Secret Custody Core facade (C5 orchestration): wires primitives, the
//! BIP39 codec, the HD key engine, and the seed vault behind the identity
//! and session state machine, under the single coarse lock of the
//! concurrency model.
//!
//! Grounded on the shape of the teacher's `deposit_tracker/service.rs`: one
//! service struct owning its config and storage handles, `async fn`
//! operations that return the crate's own error type, and a structured
//! security-event log line at every authentication outcome.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::bip39;
use crate::common::error::{Result, SccError};
use crate::config::SccConfig;
use crate::hdkey::address::{bitcoin_p2pkh_address, bitcoin_p2wpkh_address, ethereum_address};
use crate::hdkey::{Coin, ExtendedKey};
use crate::identity::ratelimit::RateLimitEntry;
use crate::identity::session::{Session, SessionState};
use crate::identity::totp;
use crate::identity::user::{self, User};
use crate::logging::{generate_correlation_id, log_security_event};
use crate::primitives::secure_wipe;
use crate::signing::bitcoin_tx::{self, BitcoinOutput, BitcoinUtxoInput, InputSigningKey};
use crate::signing::ethereum_tx::{self, EthereumTxRequest};
use crate::storage::traits::{IdentityStore, StorageError, VaultStore};
use crate::vault::{self, EncryptedSeed, VaultPayload};

/// Supplies the installation-stable opaque byte string mixed into the
/// vault's key derivation. Stable across reboots on the same installation;
/// opaque to the core, which never interprets the bytes beyond using them
/// as AEAD key material input.
pub trait MachineFactorProvider: Send + Sync {
    fn get_machine_factor(&self) -> Result<Vec<u8>>;
}

/// A fixed machine factor. Useful for tests and for a single-install demo
/// where there is no platform keystore to read from.
pub struct StaticMachineFactor(pub Vec<u8>);

impl MachineFactorProvider for StaticMachineFactor {
    fn get_machine_factor(&self) -> Result<Vec<u8>> {
        Ok(self.0.clone())
    }
}

/// The narrow capability interface a caller implements to broadcast signed
/// transactions and learn current fee rates. The core never parses a
/// response from this trait; it only ever hands up signed bytes.
pub trait BroadcastClient: Send + Sync {
    fn broadcast_tx(&self, chain: Chain, raw_bytes: &[u8]) -> Result<String>;
    fn fee_rate(&self, chain: Chain) -> Result<u64>;
}

/// A chain this core knows BIP44 coin types and address formats for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Chain {
    Bitcoin,
    BitcoinTestnet,
    Ethereum,
}

impl Chain {
    fn coin(self) -> Coin {
        match self {
            Chain::Bitcoin => Coin::Bitcoin,
            Chain::BitcoinTestnet => Coin::BitcoinTestnet,
            Chain::Ethereum => Coin::Ethereum,
        }
    }

    fn is_testnet(self) -> bool {
        matches!(self, Chain::BitcoinTestnet)
    }
}

pub struct RegisterResult {
    pub user_id: String,
    pub mnemonic: Vec<String>,
}

pub struct LoginResult {
    pub session_id: String,
    pub needs_totp: bool,
}

pub struct RevealSeedResult {
    pub mnemonic_words: Vec<String>,
    pub seed_hex: String,
}

pub struct DerivedAddress {
    pub address: String,
    pub pubkey_compressed: [u8; 33],
}

pub struct TotpEnrollment {
    pub secret_base32: String,
    pub otpauth_uri: String,
}

const MAX_RETRIES: u32 = 3;

/// Retry `op` up to `MAX_RETRIES` times, but only for the error kinds the
/// §4.5.6 retry policy names (`RngFailure`, storage-level transients).
/// Every other error, including every authentication failure, surfaces on
/// the first attempt.
fn retry<T>(mut op: impl FnMut() -> Result<T>) -> Result<T> {
    let mut attempt = 1;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt < MAX_RETRIES => {
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

fn map_storage<T>(result: std::result::Result<T, StorageError>) -> Result<T> {
    result.map_err(|e| SccError::storage(e.to_string()))
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Account-level public keys cached per `(session, chain, account)` so that
/// `derive_address` calls after the first one for a given session/account
/// don't need the password again — the operation's own signature in §6
/// carries no password field, yet the underlying BIP32 key can only be
/// reached by decrypting the vault. The first call for a session/account
/// pair must supply a password to warm the cache by deriving down to the
/// account level and discarding the private scalar (`ExtendedKey::neuter`);
/// every subsequent call for that pair derives the public `change`/`index`
/// child from the cached public key alone. The cache lives only in process
/// memory and is gone on restart or `logout`, same as any other
/// session-scoped state.
type AccountKeyCache = HashMap<(String, Chain, u32), ExtendedKey>;

/// The Secret Custody Core. One instance per running process; holds no
/// secret material itself beyond what is transiently decrypted inside a
/// single call.
pub struct SecretCustodyCore {
    config: SccConfig,
    identity_store: Arc<dyn IdentityStore>,
    vault_store: Arc<dyn VaultStore>,
    machine_factor: Arc<dyn MachineFactorProvider>,
    /// The coarse lock of §5: every state-mutating operation takes the
    /// write side for the duration of its storage round-trip; operations
    /// that only consult the account-key cache take the read side.
    state: RwLock<AccountKeyCache>,
}

impl SecretCustodyCore {
    pub fn new(
        config: SccConfig,
        identity_store: Arc<dyn IdentityStore>,
        vault_store: Arc<dyn VaultStore>,
        machine_factor: Arc<dyn MachineFactorProvider>,
    ) -> Self {
        Self {
            config,
            identity_store,
            vault_store,
            machine_factor,
            state: RwLock::new(HashMap::new()),
        }
    }

    /// §4.5.1 step 1-5, with no caller-supplied mnemonic: one is generated
    /// at 128-bit strength and handed back for one-time display.
    pub async fn register(&self, username: &str, password: &str) -> Result<RegisterResult> {
        self.register_inner(username, password, None, "").await
    }

    /// §4.5.1 with a caller-supplied mnemonic (restore/import flow); the
    /// mnemonic is validated rather than generated.
    pub async fn register_from_mnemonic(
        &self,
        username: &str,
        password: &str,
        mnemonic_words: &[String],
        passphrase: &str,
    ) -> Result<RegisterResult> {
        self.register_inner(username, password, Some(mnemonic_words.to_vec()), passphrase)
            .await
    }

    async fn register_inner(
        &self,
        username: &str,
        password: &str,
        mnemonic: Option<Vec<String>>,
        passphrase: &str,
    ) -> Result<RegisterResult> {
        let correlation_id = generate_correlation_id();
        let canonical = user::validate_username(username)?;
        user::validate_password_strength(password)?;

        let _guard = self.state.write().await;

        if map_storage(self.identity_store.get_user_by_username(&canonical).await)?.is_some() {
            log_security_event(
                "register",
                false,
                Some(SccError::UserExists.error_code()),
                Some(&correlation_id),
            );
            return Err(SccError::UserExists);
        }

        let words = match mnemonic {
            Some(words) => {
                bip39::validate_mnemonic(&words)?;
                words
            }
            None => bip39::generate_mnemonic(128)?,
        };

        let mut seed = bip39::mnemonic_to_seed(&words, passphrase)?;
        let machine_factor = self.machine_factor.get_machine_factor()?;
        let payload = VaultPayload {
            seed,
            mnemonic_words: words.clone(),
            passphrase: passphrase.to_string(),
        };
        let encrypted = retry(|| {
            vault::encrypt_payload(&payload, password, &machine_factor, self.config.vault_kdf_iterations)
        });
        secure_wipe(&mut seed);
        let encrypted = encrypted?;

        let verifier = user::make_password_verifier(password, self.config.verifier_kdf_iterations)?;
        let user_id = uuid::Uuid::new_v4().to_string();
        let user = User {
            id: user_id.clone(),
            username_canonical: canonical,
            email: None,
            password_verifier: verifier,
            created_at: now(),
            last_login_at: None,
            totp_secret: None,
            totp_enabled: false,
            is_active: true,
            backup_confirmed: false,
        };

        map_storage(self.identity_store.insert_user(&user).await)?;
        map_storage(self.vault_store.put_encrypted_seed(&user_id, &encrypted).await)?;

        log_security_event("register", true, None, Some(&correlation_id));
        Ok(RegisterResult {
            user_id,
            mnemonic: words,
        })
    }

    /// §4.5.2: rate-limit check, verifier comparison, session issuance.
    pub async fn login(&self, username: &str, password: &str) -> Result<LoginResult> {
        let correlation_id = generate_correlation_id();
        let canonical = user::validate_username(username).unwrap_or_else(|_| username.to_lowercase());
        let current_time = now();

        let _guard = self.state.write().await;

        let mut rate_limit = map_storage(self.identity_store.get_rate_limit(&canonical).await)?
            .unwrap_or_else(|| RateLimitEntry::fresh(canonical.clone(), current_time));

        if rate_limit.is_locked(current_time) {
            let retry_after_secs = rate_limit.retry_after_secs(current_time).unwrap_or(0);
            log_security_event("login", false, Some("RATE_LIMITED"), Some(&correlation_id));
            return Err(SccError::RateLimited { retry_after_secs });
        }

        let user = map_storage(self.identity_store.get_user_by_username(&canonical).await)?;
        let password_ok = user
            .as_ref()
            .map(|u| user::verify_password(password, &u.password_verifier))
            .unwrap_or(false);

        let Some(mut user) = user.filter(|_| password_ok) else {
            rate_limit.record_failure(
                current_time,
                self.config.lockout_window_secs as i64,
                self.config.lockout_threshold,
                self.config.lockout_duration_secs as i64,
            );
            map_storage(self.identity_store.put_rate_limit(&rate_limit).await)?;
            log_security_event(
                "login",
                false,
                Some(SccError::InvalidCredentials.error_code()),
                Some(&correlation_id),
            );
            return Err(SccError::InvalidCredentials);
        };

        rate_limit.reset(current_time);
        map_storage(self.identity_store.put_rate_limit(&rate_limit).await)?;

        user.last_login_at = Some(current_time);
        map_storage(self.identity_store.update_user(&user).await)?;

        let needs_totp = user.totp_enabled;
        let session = Session::issue(
            user.id.clone(),
            needs_totp,
            current_time,
            self.config.session_ttl_secs as i64,
        )?;
        map_storage(self.identity_store.insert_session(&session).await)?;

        log_security_event("login", true, None, Some(&correlation_id));
        Ok(LoginResult {
            session_id: session.session_id,
            needs_totp,
        })
    }

    /// `PendingTotp → Active` on a correct code.
    pub async fn submit_totp(&self, session_id: &str, code: &str) -> Result<()> {
        let correlation_id = generate_correlation_id();
        let _guard = self.state.write().await;

        let mut session = self.fetch_session_any_state(session_id).await?;
        let current_time = now();
        if current_time >= session.expires_at {
            session.state = SessionState::Expired;
            map_storage(self.identity_store.update_session(&session).await)?;
            log_security_event(
                "submit_totp",
                false,
                Some(SccError::SessionExpired.error_code()),
                Some(&correlation_id),
            );
            return Err(SccError::SessionExpired);
        }

        let user = self.fetch_user(&session.user_id).await?;

        let secret = user
            .totp_secret
            .as_ref()
            .ok_or(SccError::InvalidCredentials)?;
        let secret_bytes = totp::decode_base32_secret(secret)?;

        if !totp::verify_totp_code(&secret_bytes, code, current_time)? {
            log_security_event(
                "submit_totp",
                false,
                Some(SccError::InvalidCredentials.error_code()),
                Some(&correlation_id),
            );
            return Err(SccError::InvalidCredentials);
        }

        session.mark_totp_satisfied();
        map_storage(self.identity_store.update_session(&session).await)?;

        log_security_event("submit_totp", true, None, Some(&correlation_id));
        Ok(())
    }

    /// §6 `reveal_seed`: authorise the session, decrypt the vault, and hand
    /// back the original mnemonic words alongside the raw seed hex.
    pub async fn reveal_seed(&self, session_id: &str, password: &str) -> Result<RevealSeedResult> {
        let correlation_id = generate_correlation_id();
        let _guard = self.state.write().await;

        let session = self.authorize_session(session_id).await?;
        let payload = self.decrypt_vault(&session.user_id, password).await;

        let payload = match payload {
            Ok(payload) => payload,
            Err(err) => {
                log_security_event(
                    "reveal_seed",
                    false,
                    Some(err.error_code()),
                    Some(&correlation_id),
                );
                return Err(err);
            }
        };

        let seed_hex = hex::encode(payload.seed);
        let mnemonic_words = payload.mnemonic_words.clone();

        log_security_event("reveal_seed", true, None, Some(&correlation_id));
        Ok(RevealSeedResult {
            mnemonic_words,
            seed_hex,
        })
    }

    /// §6 `derive_address`: no password field in the operation's own
    /// signature, so the first call for a `(session, chain, account)` must
    /// supply one to warm the public-key cache described on
    /// [`AccountKeyCache`]; later calls for the same triple may pass `None`.
    pub async fn derive_address(
        &self,
        session_id: &str,
        chain: Chain,
        account: u32,
        change: u32,
        address_index: u32,
        password: Option<&str>,
    ) -> Result<DerivedAddress> {
        let session = self.authorize_session(session_id).await?;
        let cache_key = (session.user_id.clone(), chain, account);

        {
            let cache = self.state.read().await;
            if let Some(account_key) = cache.get(&cache_key) {
                return self.address_from_account_key(account_key, chain, change, address_index);
            }
        }

        let password = password.ok_or(SccError::InvalidCredentials)?;
        let payload = self.decrypt_vault(&session.user_id, password).await?;
        let master = ExtendedKey::master_from_seed(&payload.seed)?;
        let account_key = master.derive_account(chain.coin(), account)?;
        let public_account_key = account_key.neuter();

        let result = self.address_from_account_key(&public_account_key, chain, change, address_index)?;

        let mut cache = self.state.write().await;
        cache.insert(cache_key, public_account_key);
        Ok(result)
    }

    fn address_from_account_key(
        &self,
        account_key: &ExtendedKey,
        chain: Chain,
        change: u32,
        address_index: u32,
    ) -> Result<DerivedAddress> {
        let child = account_key.derive_child(change)?.derive_child(address_index)?;
        let pubkey_compressed = child.public_key_compressed();

        let address = match chain {
            Chain::Bitcoin | Chain::BitcoinTestnet => {
                bitcoin_p2pkh_address(&pubkey_compressed, chain.is_testnet())
            }
            Chain::Ethereum => ethereum_address(&child.public_key_uncompressed()),
        };

        Ok(DerivedAddress {
            address,
            pubkey_compressed,
        })
    }

    /// A segwit v0 address at the same path, for callers that want it
    /// explicitly rather than legacy P2PKH.
    pub async fn derive_segwit_address(
        &self,
        session_id: &str,
        account: u32,
        change: u32,
        address_index: u32,
        testnet: bool,
        password: Option<&str>,
    ) -> Result<DerivedAddress> {
        let chain = if testnet { Chain::BitcoinTestnet } else { Chain::Bitcoin };
        let derived = self
            .derive_address(session_id, chain, account, change, address_index, password)
            .await?;
        let address = bitcoin_p2wpkh_address(&derived.pubkey_compressed, testnet)?;
        Ok(DerivedAddress {
            address,
            pubkey_compressed: derived.pubkey_compressed,
        })
    }

    /// §4.5.5: authorise, decrypt, derive one key per UTXO input, sign, and
    /// wipe every private scalar and the seed before returning.
    pub async fn sign_bitcoin_tx(
        &self,
        session_id: &str,
        password: &str,
        inputs: &[BitcoinUtxoInput],
        outputs: &[BitcoinOutput],
        fee_sats: u64,
        testnet: bool,
    ) -> Result<Vec<u8>> {
        let correlation_id = generate_correlation_id();
        let session = self.authorize_session(session_id).await?;
        let coin = if testnet { Coin::BitcoinTestnet } else { Coin::Bitcoin };

        let payload = match self.decrypt_vault(&session.user_id, password).await {
            Ok(payload) => payload,
            Err(err) => {
                log_security_event("sign_bitcoin_tx", false, Some(err.error_code()), Some(&correlation_id));
                return Err(err);
            }
        };

        let master = ExtendedKey::master_from_seed(&payload.seed)?;
        let mut signing_keys = Vec::with_capacity(inputs.len());
        for input in inputs {
            let child = master.derive_bip44(coin, input.account, input.change, input.address_index)?;
            let mut priv_key = child.key_bytes;
            let pubkey_compressed = child.public_key_compressed();
            signing_keys.push(InputSigningKey {
                priv_key,
                pubkey_compressed,
            });
            secure_wipe(&mut priv_key);
        }

        let raw_tx = bitcoin_tx::sign_bitcoin_tx(inputs, &signing_keys, outputs, fee_sats);

        log_security_event(
            "sign_bitcoin_tx",
            raw_tx.is_ok(),
            raw_tx.as_ref().err().map(|e| e.error_code()),
            Some(&correlation_id),
        );
        raw_tx
    }

    /// §4.5.5: EIP-155 legacy transaction signing at the Ethereum BIP44
    /// path `m/44'/60'/account'/change/index`.
    pub async fn sign_ethereum_tx(
        &self,
        session_id: &str,
        password: &str,
        account: u32,
        change: u32,
        address_index: u32,
        tx: EthereumTxRequest,
    ) -> Result<Vec<u8>> {
        let correlation_id = generate_correlation_id();
        let session = self.authorize_session(session_id).await?;

        let payload = match self.decrypt_vault(&session.user_id, password).await {
            Ok(payload) => payload,
            Err(err) => {
                log_security_event("sign_ethereum_tx", false, Some(err.error_code()), Some(&correlation_id));
                return Err(err);
            }
        };

        let master = ExtendedKey::master_from_seed(&payload.seed)?;
        let child = master.derive_bip44(Coin::Ethereum, account, change, address_index)?;
        let mut priv_key = child.key_bytes;

        let signed = ethereum_tx::sign_ethereum_tx(&priv_key, &tx);
        secure_wipe(&mut priv_key);

        log_security_event(
            "sign_ethereum_tx",
            signed.is_ok(),
            signed.as_ref().err().map(|e| e.error_code()),
            Some(&correlation_id),
        );
        signed
    }

    /// §4.5.3: re-verify the password, generate a fresh secret, and return
    /// it unpersisted until `confirm_totp` succeeds.
    pub async fn enable_totp(&self, session_id: &str, password: &str, issuer: &str) -> Result<TotpEnrollment> {
        let session = self.authorize_session(session_id).await?;
        let user = self.fetch_user(&session.user_id).await?;

        if !user::verify_password(password, &user.password_verifier) {
            return Err(SccError::InvalidCredentials);
        }

        let (_secret, secret_base32) = totp::generate_totp_secret()?;
        let otpauth_uri = totp::otpauth_uri(&user.username_canonical, issuer, &secret_base32);

        // Not persisted: `confirm_totp` must be called with a code derived
        // from this same secret before it becomes the user's secret of
        // record. The caller is responsible for holding it between the two
        // calls (typically displayed as a QR code for the duration).
        Ok(TotpEnrollment {
            secret_base32,
            otpauth_uri,
        })
    }

    /// §4.5.3: verify `code` against `pending_secret_base32` and, on
    /// success, persist the secret and mint ten backup codes.
    pub async fn confirm_totp(
        &self,
        session_id: &str,
        pending_secret_base32: &str,
        code: &str,
    ) -> Result<Vec<String>> {
        let correlation_id = generate_correlation_id();
        let _guard = self.state.write().await;

        let session = self.authorize_session(session_id).await?;
        let mut user = self.fetch_user(&session.user_id).await?;

        let secret_bytes = totp::decode_base32_secret(pending_secret_base32)?;
        if !totp::verify_totp_code(&secret_bytes, code, now())? {
            log_security_event(
                "confirm_totp",
                false,
                Some(SccError::InvalidCredentials.error_code()),
                Some(&correlation_id),
            );
            return Err(SccError::InvalidCredentials);
        }

        user.totp_secret = Some(pending_secret_base32.to_string());
        user.totp_enabled = true;
        map_storage(self.identity_store.update_user(&user).await)?;

        let (plaintext_codes, records) = totp::generate_backup_codes(self.config.verifier_kdf_iterations)?;
        map_storage(self.identity_store.replace_backup_codes(&user.id, &records).await)?;

        log_security_event("confirm_totp", true, None, Some(&correlation_id));
        Ok(plaintext_codes)
    }

    /// §4.5.3: requires both the password and a current code.
    pub async fn disable_totp(&self, session_id: &str, password: &str, code: &str) -> Result<()> {
        let correlation_id = generate_correlation_id();
        let _guard = self.state.write().await;

        let session = self.authorize_session(session_id).await?;
        let mut user = self.fetch_user(&session.user_id).await?;

        if !user::verify_password(password, &user.password_verifier) {
            log_security_event(
                "disable_totp",
                false,
                Some(SccError::InvalidCredentials.error_code()),
                Some(&correlation_id),
            );
            return Err(SccError::InvalidCredentials);
        }

        let secret = user.totp_secret.as_ref().ok_or(SccError::InvalidCredentials)?;
        let secret_bytes = totp::decode_base32_secret(secret)?;
        if !totp::verify_totp_code(&secret_bytes, code, now())? {
            log_security_event(
                "disable_totp",
                false,
                Some(SccError::InvalidCredentials.error_code()),
                Some(&correlation_id),
            );
            return Err(SccError::InvalidCredentials);
        }

        user.totp_secret = None;
        user.totp_enabled = false;
        map_storage(self.identity_store.update_user(&user).await)?;

        log_security_event("disable_totp", true, None, Some(&correlation_id));
        Ok(())
    }

    /// §4.5.3: match against any unused backup-code verifier in constant
    /// time with respect to which index matched; success consumes that code
    /// and disables TOTP entirely, the same as the source's backup-code
    /// recovery path.
    pub async fn use_backup_code(&self, session_id: &str, code: &str) -> Result<()> {
        let correlation_id = generate_correlation_id();
        let _guard = self.state.write().await;

        let session = self.authorize_session(session_id).await?;
        let mut user = self.fetch_user(&session.user_id).await?;
        let codes = map_storage(self.identity_store.get_backup_codes(&user.id).await)?;

        let Some(index) = totp::match_backup_code(&codes, code) else {
            log_security_event(
                "use_backup_code",
                false,
                Some(SccError::InvalidCredentials.error_code()),
                Some(&correlation_id),
            );
            return Err(SccError::InvalidCredentials);
        };

        map_storage(self.identity_store.mark_backup_code_used(&user.id, index).await)?;
        user.totp_secret = None;
        user.totp_enabled = false;
        map_storage(self.identity_store.update_user(&user).await)?;

        log_security_event("use_backup_code", true, None, Some(&correlation_id));
        Ok(())
    }

    /// `Active|PendingTotp → Invalidated`; drops any cached account keys for
    /// this session so no derived public-key material survives the logout.
    pub async fn logout(&self, session_id: &str) -> Result<()> {
        let mut session = self.fetch_session_any_state(session_id).await?;
        session.invalidate();

        let mut cache = self.state.write().await;
        let user_id = &session.user_id;
        cache.retain(|(cached_user, _, _), _| cached_user != user_id);
        map_storage(self.identity_store.update_session(&session).await)?;
        Ok(())
    }

    async fn fetch_user(&self, user_id: &str) -> Result<User> {
        map_storage(self.identity_store.get_user_by_id(user_id).await)?.ok_or(SccError::InvalidCredentials)
    }

    async fn fetch_session_any_state(&self, session_id: &str) -> Result<Session> {
        map_storage(self.identity_store.get_session(session_id).await)?.ok_or(SccError::SessionUnknown)
    }

    /// Fetch a session and authorise it per §4.5.4: re-check expiry, slide
    /// `expires_at` forward on success, persist either transition.
    async fn authorize_session(&self, session_id: &str) -> Result<Session> {
        let mut session = self.fetch_session_any_state(session_id).await?;
        let result = session.authorize(now(), self.config.session_ttl_secs as i64);
        map_storage(self.identity_store.update_session(&session).await)?;
        result?;
        Ok(session)
    }

    async fn decrypt_vault(&self, user_id: &str, password: &str) -> Result<VaultPayload> {
        let encrypted: EncryptedSeed = map_storage(self.vault_store.get_encrypted_seed(user_id).await)?
            .ok_or(SccError::InvalidCredentials)?;
        let machine_factor = self.machine_factor.get_machine_factor()?;
        retry(|| vault::decrypt_payload(&encrypted, password, &machine_factor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryStore;

    fn test_core() -> SecretCustodyCore {
        SecretCustodyCore::new(
            SccConfig::for_tests(),
            Arc::new(MemoryStore::new()),
            Arc::new(MemoryStore::new()),
            Arc::new(StaticMachineFactor(b"test-machine".to_vec())),
        )
    }

    /// A single `MemoryStore` implements both traits; tests need the same
    /// instance behind both handles so a registered user's vault record is
    /// visible to login/derive calls.
    fn shared_core() -> SecretCustodyCore {
        let store = Arc::new(MemoryStore::new());
        SecretCustodyCore::new(
            SccConfig::for_tests(),
            store.clone(),
            store,
            Arc::new(StaticMachineFactor(b"test-machine".to_vec())),
        )
    }

    #[tokio::test]
    async fn test_register_then_login_succeeds() {
        let core = shared_core();
        let registered = core.register("alice", "Str0ng!Pass12").await.unwrap();
        assert_eq!(registered.mnemonic.len(), 12);

        let login = core.login("alice", "Str0ng!Pass12").await.unwrap();
        assert!(!login.needs_totp);

        let wrong = core.login("alice", "Str0ng!Pass13").await;
        assert!(matches!(wrong, Err(SccError::InvalidCredentials)));
    }

    #[tokio::test]
    async fn test_register_is_not_idempotent() {
        let core = shared_core();
        core.register("alice", "Str0ng!Pass12").await.unwrap();
        let second = core.register("alice", "Str0ng!Pass12").await;
        assert!(matches!(second, Err(SccError::UserExists)));
    }

    #[tokio::test]
    async fn test_reveal_seed_returns_original_mnemonic() {
        let core = shared_core();
        let registered = core.register("alice", "Str0ng!Pass12").await.unwrap();
        let login = core.login("alice", "Str0ng!Pass12").await.unwrap();

        let revealed = core
            .reveal_seed(&login.session_id, "Str0ng!Pass12")
            .await
            .unwrap();
        assert_eq!(revealed.mnemonic_words, registered.mnemonic);
    }

    #[tokio::test]
    async fn test_restore_from_mnemonic_derives_same_address() {
        let core_a = shared_core();
        let registered = core_a.register("alice", "Str0ng!Pass12").await.unwrap();
        let login_a = core_a.login("alice", "Str0ng!Pass12").await.unwrap();
        let address_a = core_a
            .derive_address(
                &login_a.session_id,
                Chain::Bitcoin,
                0,
                0,
                0,
                Some("Str0ng!Pass12"),
            )
            .await
            .unwrap();

        let core_b = shared_core();
        core_b
            .register_from_mnemonic("bob", "Str0ng!Pass12", &registered.mnemonic, "")
            .await
            .unwrap();
        let login_b = core_b.login("bob", "Str0ng!Pass12").await.unwrap();
        let address_b = core_b
            .derive_address(
                &login_b.session_id,
                Chain::Bitcoin,
                0,
                0,
                0,
                Some("Str0ng!Pass12"),
            )
            .await
            .unwrap();

        assert_eq!(address_a.address, address_b.address);
    }

    #[tokio::test]
    async fn test_derive_address_cache_avoids_second_password() {
        let core = shared_core();
        core.register("alice", "Str0ng!Pass12").await.unwrap();
        let login = core.login("alice", "Str0ng!Pass12").await.unwrap();

        let first = core
            .derive_address(&login.session_id, Chain::Bitcoin, 0, 0, 0, Some("Str0ng!Pass12"))
            .await
            .unwrap();
        let second = core
            .derive_address(&login.session_id, Chain::Bitcoin, 0, 0, 1, None)
            .await
            .unwrap();

        assert_ne!(first.address, second.address);
    }

    #[tokio::test]
    async fn test_derive_address_without_password_and_uncached_fails() {
        let core = shared_core();
        core.register("alice", "Str0ng!Pass12").await.unwrap();
        let login = core.login("alice", "Str0ng!Pass12").await.unwrap();

        let result = core
            .derive_address(&login.session_id, Chain::Bitcoin, 0, 0, 0, None)
            .await;
        assert!(matches!(result, Err(SccError::InvalidCredentials)));
    }

    #[tokio::test]
    async fn test_lockout_after_five_failures() {
        let core = shared_core();
        core.register("alice", "Str0ng!Pass12").await.unwrap();

        for _ in 0..5 {
            let _ = core.login("alice", "wrong-password").await;
        }

        let result = core.login("alice", "Str0ng!Pass12").await;
        assert!(matches!(result, Err(SccError::RateLimited { .. })));
    }

    #[tokio::test]
    async fn test_totp_enroll_confirm_verify_flow() {
        let core = shared_core();
        core.register("alice", "Str0ng!Pass12").await.unwrap();
        let login = core.login("alice", "Str0ng!Pass12").await.unwrap();

        let enrollment = core
            .enable_totp(&login.session_id, "Str0ng!Pass12", "SCC")
            .await
            .unwrap();
        let secret_bytes = totp::decode_base32_secret(&enrollment.secret_base32).unwrap();
        let current_time = now();
        let code = format!(
            "{:06}",
            totp_code_for_test(&secret_bytes, current_time)
        );

        let backup_codes = core
            .confirm_totp(&login.session_id, &enrollment.secret_base32, &code)
            .await
            .unwrap();
        assert_eq!(backup_codes.len(), 10);

        // A fresh login now requires submit_totp before the session is
        // usable for anything else.
        let second_login = core.login("alice", "Str0ng!Pass12").await.unwrap();
        assert!(second_login.needs_totp);

        let denied = core.reveal_seed(&second_login.session_id, "Str0ng!Pass12").await;
        assert!(matches!(denied, Err(SccError::SessionUnknown)));

        core.submit_totp(&second_login.session_id, &code).await.unwrap();
        core.reveal_seed(&second_login.session_id, "Str0ng!Pass12")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_logout_invalidates_session() {
        let core = shared_core();
        core.register("alice", "Str0ng!Pass12").await.unwrap();
        let login = core.login("alice", "Str0ng!Pass12").await.unwrap();

        core.logout(&login.session_id).await.unwrap();
        let result = core.reveal_seed(&login.session_id, "Str0ng!Pass12").await;
        assert!(matches!(result, Err(SccError::SessionUnknown)));
    }

    fn totp_code_for_test(secret: &[u8], unix_time: i64) -> u32 {
        // Mirrors identity::totp's private step computation for the one
        // test here that needs to produce a code rather than just check one.
        use hmac::{Hmac, Mac};
        use sha1::Sha1;
        type HmacSha1 = Hmac<Sha1>;

        let step = (unix_time / 30) as u64;
        let mut mac = HmacSha1::new_from_slice(secret).unwrap();
        mac.update(&step.to_be_bytes());
        let digest = mac.finalize().into_bytes();
        let offset = (digest[digest.len() - 1] & 0x0f) as usize;
        let truncated = ((digest[offset] as u32 & 0x7f) << 24)
            | ((digest[offset + 1] as u32) << 16)
            | ((digest[offset + 2] as u32) << 8)
            | (digest[offset + 3] as u32);
        truncated % 1_000_000
    }

    #[tokio::test]
    async fn test_default_core_constructs() {
        let _core = test_core();
    }
}
