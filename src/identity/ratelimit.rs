//! Per-username rate-limit state: 5 failures within a 15-minute window
//! triggers a 15-minute lockout.

pub const WINDOW_SECS: i64 = 15 * 60;
pub const FAILURE_THRESHOLD: u32 = 5;
pub const LOCKOUT_SECS: i64 = 15 * 60;

/// Scoped per `identifier` (the canonical username).
#[derive(Debug, Clone)]
pub struct RateLimitEntry {
    pub identifier: String,
    pub failed_attempts: u32,
    pub window_start: i64,
    pub locked_until: Option<i64>,
}

impl RateLimitEntry {
    pub fn fresh(identifier: impl Into<String>, now: i64) -> Self {
        Self {
            identifier: identifier.into(),
            failed_attempts: 0,
            window_start: now,
            locked_until: None,
        }
    }

    /// Whether a login attempt at `now` must be refused with `RateLimited`.
    pub fn is_locked(&self, now: i64) -> bool {
        matches!(self.locked_until, Some(until) if now < until)
    }

    /// Remaining lockout in seconds, if currently locked.
    pub fn retry_after_secs(&self, now: i64) -> Option<u64> {
        self.locked_until
            .filter(|&until| now < until)
            .map(|until| (until - now) as u64)
    }

    /// Record a failed login attempt, sliding or resetting the window as
    /// needed, and applying the lockout once `threshold` is reached. Callers
    /// without a config handy may pass `WINDOW_SECS`/`FAILURE_THRESHOLD`/
    /// `LOCKOUT_SECS`.
    pub fn record_failure(&mut self, now: i64, window_secs: i64, threshold: u32, lockout_secs: i64) {
        if now - self.window_start > window_secs {
            self.window_start = now;
            self.failed_attempts = 0;
        }
        self.failed_attempts += 1;
        if self.failed_attempts >= threshold {
            self.locked_until = Some(now + lockout_secs);
        }
    }

    /// Clear all failure state after a successful login.
    pub fn reset(&mut self, now: i64) {
        self.failed_attempts = 0;
        self.window_start = now;
        self.locked_until = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record_failure(entry: &mut RateLimitEntry, now: i64) {
        entry.record_failure(now, WINDOW_SECS, FAILURE_THRESHOLD, LOCKOUT_SECS);
    }

    #[test]
    fn test_five_failures_trigger_lockout() {
        let mut entry = RateLimitEntry::fresh("alice", 0);
        for _ in 0..4 {
            record_failure(&mut entry, 1);
            assert!(!entry.is_locked(1));
        }
        record_failure(&mut entry, 1);
        assert!(entry.is_locked(1));
        assert!(entry.retry_after_secs(1).unwrap() >= LOCKOUT_SECS as u64 - 1);
    }

    #[test]
    fn test_lockout_persists_across_correct_password_attempts() {
        let mut entry = RateLimitEntry::fresh("alice", 0);
        for _ in 0..5 {
            record_failure(&mut entry, 0);
        }
        assert!(entry.is_locked(60));
        assert!(entry.is_locked(LOCKOUT_SECS - 1));
        assert!(!entry.is_locked(LOCKOUT_SECS + 1));
    }

    #[test]
    fn test_window_resets_failure_count_after_expiry() {
        let mut entry = RateLimitEntry::fresh("alice", 0);
        record_failure(&mut entry, 0);
        record_failure(&mut entry, 0);
        record_failure(&mut entry, WINDOW_SECS + 1);
        assert_eq!(entry.failed_attempts, 1);
    }

    #[test]
    fn test_reset_clears_lockout() {
        let mut entry = RateLimitEntry::fresh("alice", 0);
        for _ in 0..5 {
            record_failure(&mut entry, 0);
        }
        entry.reset(10);
        assert!(!entry.is_locked(10));
        assert_eq!(entry.failed_attempts, 0);
    }
}
