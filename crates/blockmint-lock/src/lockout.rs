//! Failed-attempt lockout policy
//!
//! Wrong PINs are counted; once the count reaches the threshold the app is
//! locked out for a fixed period. Failures past the threshold index further
//! into the duration table, capped at its last entry. The stock policy has a
//! single 30 minute entry, so every lockout lasts 30 minutes.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Lockout policy for wrong PIN submissions
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockoutPolicy {
    /// Consecutive failures that trigger a lockout
    pub threshold: u32,
    /// Lockout durations for each level past the threshold (in seconds)
    pub lockout_durations: Vec<u64>,
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self {
            threshold: 5,
            lockout_durations: vec![
                1800, // 5+ failures: 30 minutes
            ],
        }
    }
}

impl LockoutPolicy {
    /// Escalating policy: each failure past the threshold locks for longer
    pub fn progressive() -> Self {
        Self {
            threshold: 5,
            lockout_durations: vec![
                1800,  // 5 failures: 30 minutes
                3600,  // 6 failures: 1 hour
                86400, // 7+ failures: 24 hours
            ],
        }
    }

    /// Get the lockout duration for the given number of failed attempts
    /// Returns None if not yet locked out
    pub fn lockout_duration(&self, failed_attempts: u32) -> Option<Duration> {
        if failed_attempts < self.threshold {
            return None;
        }

        let lockout_level = (failed_attempts - self.threshold) as usize;
        let last = self.lockout_durations.len().checked_sub(1)?;
        let secs = self.lockout_durations[lockout_level.min(last)];

        Some(Duration::from_secs(secs))
    }

    /// Attempts left before the next lockout
    pub fn attempts_remaining(&self, failed_attempts: u32) -> u32 {
        self.threshold.saturating_sub(failed_attempts)
    }

    /// Check if the failure count triggers a lockout
    pub fn is_locked(&self, failed_attempts: u32) -> bool {
        self.lockout_duration(failed_attempts).is_some()
    }

    /// Get a human-readable description of the current lockout state
    pub fn describe_lockout(&self, failed_attempts: u32) -> String {
        if let Some(duration) = self.lockout_duration(failed_attempts) {
            format!("Try again in {}", describe_duration(duration))
        } else {
            format!(
                "{} attempts remaining",
                self.attempts_remaining(failed_attempts)
            )
        }
    }
}

/// Render a duration the way lockout notices phrase it
pub fn describe_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{} seconds", secs)
    } else if secs < 3600 {
        format!("{} minutes", secs / 60)
    } else if secs < 86400 {
        format!("{} hours", secs / 3600)
    } else {
        format!("{} days", secs / 86400)
    }
}
