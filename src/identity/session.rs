//! Short-lived session handles gating every signing/derivation/reveal
//! operation. States: `PendingTotp → Active → Expired/Invalidated`.

use crate::common::error::{Result, SccError};
use crate::primitives::random_bytes;

pub const SESSION_TTL_SECS: i64 = 15 * 60;
const SESSION_ID_LEN: usize = 32;
const SESSION_ID_ALPHABET: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    PendingTotp,
    Active,
    Expired,
    Invalidated,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SessionState::PendingTotp => "pending_totp",
            SessionState::Active => "active",
            SessionState::Expired => "expired",
            SessionState::Invalidated => "invalidated",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for SessionState {
    type Err = SccError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending_totp" => Ok(SessionState::PendingTotp),
            "active" => Ok(SessionState::Active),
            "expired" => Ok(SessionState::Expired),
            "invalidated" => Ok(SessionState::Invalidated),
            other => Err(SccError::BadInput(format!("unknown session state: {other}"))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Session {
    pub session_id: String,
    pub user_id: String,
    pub created_at: i64,
    pub last_activity_at: i64,
    pub expires_at: i64,
    pub totp_satisfied: bool,
    pub state: SessionState,
}

impl Session {
    /// Issue a fresh session. `totp_required` selects the initial state:
    /// `PendingTotp` until `submit_totp` succeeds, or `Active` immediately
    /// when the user has no second factor enrolled. `ttl_secs` is the
    /// configured sliding expiry (`SccConfig::session_ttl_secs`); callers
    /// without a config handy may pass `SESSION_TTL_SECS`.
    pub fn issue(user_id: impl Into<String>, totp_required: bool, now: i64, ttl_secs: i64) -> Result<Self> {
        let session_id = generate_session_id()?;
        Ok(Self {
            session_id,
            user_id: user_id.into(),
            created_at: now,
            last_activity_at: now,
            expires_at: now + ttl_secs,
            totp_satisfied: !totp_required,
            state: if totp_required {
                SessionState::PendingTotp
            } else {
                SessionState::Active
            },
        })
    }

    /// `PendingTotp → Active` on a correct code; the caller is responsible
    /// for verifying the code itself before calling this. No state change
    /// on failure.
    pub fn mark_totp_satisfied(&mut self) {
        self.totp_satisfied = true;
        self.state = SessionState::Active;
    }

    /// Authorise a call: re-checks expiry, transitioning to `Expired` if
    /// the deadline has passed, then slides `expires_at` forward by
    /// `ttl_secs` on success. A session's `expires_at` never regresses.
    pub fn authorize(&mut self, now: i64, ttl_secs: i64) -> Result<()> {
        if self.state == SessionState::Invalidated {
            return Err(SccError::SessionUnknown);
        }
        if self.state != SessionState::Active || !self.totp_satisfied {
            return Err(SccError::SessionUnknown);
        }
        if now >= self.expires_at {
            self.state = SessionState::Expired;
            return Err(SccError::SessionExpired);
        }
        self.last_activity_at = now;
        self.expires_at = now + ttl_secs;
        Ok(())
    }

    pub fn invalidate(&mut self) {
        self.state = SessionState::Invalidated;
    }
}

fn generate_session_id() -> Result<String> {
    let raw = random_bytes(SESSION_ID_LEN)?;
    Ok(raw
        .iter()
        .map(|b| SESSION_ID_ALPHABET[(*b as usize) % SESSION_ID_ALPHABET.len()] as char)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_without_totp_is_immediately_active() {
        let session = Session::issue("user-1", false, 1000, SESSION_TTL_SECS).unwrap();
        assert_eq!(session.state, SessionState::Active);
        assert!(session.totp_satisfied);
    }

    #[test]
    fn test_issue_with_totp_is_pending() {
        let session = Session::issue("user-1", true, 1000, SESSION_TTL_SECS).unwrap();
        assert_eq!(session.state, SessionState::PendingTotp);
        assert!(!session.totp_satisfied);
    }

    #[test]
    fn test_authorize_slides_expiry_forward_never_backward() {
        let mut session = Session::issue("user-1", false, 1000, SESSION_TTL_SECS).unwrap();
        let first_expiry = session.expires_at;
        session.authorize(1100, SESSION_TTL_SECS).unwrap();
        assert!(session.expires_at > first_expiry);
    }

    #[test]
    fn test_authorize_fails_once_expired() {
        let mut session = Session::issue("user-1", false, 1000, SESSION_TTL_SECS).unwrap();
        let result = session.authorize(1000 + SESSION_TTL_SECS + 1, SESSION_TTL_SECS);
        assert!(matches!(result, Err(SccError::SessionExpired)));
        assert_eq!(session.state, SessionState::Expired);
    }

    #[test]
    fn test_pending_totp_session_cannot_authorize() {
        let mut session = Session::issue("user-1", true, 1000, SESSION_TTL_SECS).unwrap();
        assert!(session.authorize(1001, SESSION_TTL_SECS).is_err());
    }

    #[test]
    fn test_invalidate_blocks_further_authorize() {
        let mut session = Session::issue("user-1", false, 1000, SESSION_TTL_SECS).unwrap();
        session.invalidate();
        assert!(session.authorize(1001, SESSION_TTL_SECS).is_err());
    }

    #[test]
    fn test_session_id_is_correct_length() {
        let session = Session::issue("user-1", false, 0, SESSION_TTL_SECS).unwrap();
        assert_eq!(session.session_id.len(), SESSION_ID_LEN);
    }
}
