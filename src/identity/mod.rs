//! Identity & Session (C5): registration/login, the PBKDF2 password
//! verifier, TOTP enrolment and verification, rate-limit state, and the
//! short-lived session handles that authorise C3/C4 operations.

pub mod ratelimit;
pub mod session;
pub mod totp;
pub mod user;

pub use ratelimit::RateLimitEntry;
pub use session::{Session, SessionState};
pub use totp::BackupCode;
pub use user::User;
