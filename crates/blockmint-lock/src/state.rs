//! Lock state and the read-only snapshot handed to the view

use std::time::Duration;

use tokio::task::AbortHandle;
use tokio::time::Instant;

use crate::api::UserId;
use crate::biometric::BiometryType;
use crate::lifecycle::ActivityTracker;
use crate::lockout::{describe_duration, LockoutPolicy};
use crate::settings::SecuritySettings;
use crate::setup::{PinSetupSession, SetupStage};

/// Lock phase
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LockPhase {
    /// App content visible
    #[default]
    Unlocked,
    /// PIN pad shown
    Locked,
    /// PIN setup pad shown
    SettingUpPin,
    /// Too many wrong PINs; no PIN pad until the lockout expires
    LockedOut,
}

/// Callback run once a new PIN has been stored and settings refreshed
pub type SetupCallback = Box<dyn FnOnce() + Send + 'static>;

/// Active PIN setup
pub(crate) struct SetupContext {
    pub(crate) session: PinSetupSession,
    /// Phase to return to on completion or cancel
    pub(crate) return_to: LockPhase,
    pub(crate) on_complete: Option<SetupCallback>,
}

/// Pending automatic biometric prompt
pub(crate) struct AutoAuthTimer {
    pub(crate) id: u64,
    pub(crate) handle: AbortHandle,
}

/// What a wrong PIN did to the state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FailureOutcome {
    Remaining(u32),
    LockedOut(Duration),
}

/// Mutable controller state
pub(crate) struct LockState {
    pub(crate) phase: LockPhase,
    pub(crate) failed_attempts: u32,
    pub(crate) lockout_until: Option<Instant>,
    pub(crate) has_tried_auto_auth: bool,
    pub(crate) activity: ActivityTracker,
    pub(crate) setup: Option<SetupContext>,
    pub(crate) auto_auth_timer: Option<AutoAuthTimer>,
    pub(crate) next_timer_id: u64,
    pub(crate) user: Option<UserId>,
    pub(crate) settings: Option<SecuritySettings>,
    /// Bumped whenever the mounted user changes; pending responses for an
    /// older epoch are discarded
    pub(crate) epoch: u64,
}

impl LockState {
    pub(crate) fn new() -> Self {
        Self {
            phase: LockPhase::Unlocked,
            failed_attempts: 0,
            lockout_until: None,
            has_tried_auto_auth: false,
            activity: ActivityTracker::new(),
            setup: None,
            auto_auth_timer: None,
            next_timer_id: 0,
            user: None,
            settings: None,
            epoch: 0,
        }
    }

    pub(crate) fn settings(&self) -> SecuritySettings {
        self.settings.unwrap_or_default()
    }

    /// Leave `LockedOut` if its deadline has passed
    ///
    /// Returns true if the phase changed.
    pub(crate) fn expire_lockout(&mut self, now: Instant) -> bool {
        match self.lockout_until {
            Some(until) if now >= until => {
                self.lockout_until = None;
                if self.phase == LockPhase::LockedOut {
                    self.phase = LockPhase::Locked;
                    self.has_tried_auto_auth = false;
                    return true;
                }
                false
            }
            _ => false,
        }
    }

    /// Count a wrong PIN
    pub(crate) fn record_failure(&mut self, policy: &LockoutPolicy, now: Instant) -> FailureOutcome {
        self.failed_attempts = self.failed_attempts.saturating_add(1);

        match policy.lockout_duration(self.failed_attempts) {
            Some(duration) => {
                self.lockout_until = Some(now + duration);
                self.phase = LockPhase::LockedOut;
                self.has_tried_auto_auth = false;
                FailureOutcome::LockedOut(duration)
            }
            None => FailureOutcome::Remaining(policy.attempts_remaining(self.failed_attempts)),
        }
    }

    /// Apply a successful PIN or biometric unlock
    pub(crate) fn record_success(&mut self) {
        self.phase = LockPhase::Unlocked;
        self.failed_attempts = 0;
        self.lockout_until = None;
        self.has_tried_auto_auth = false;
        self.activity.touch();
    }

    /// Remaining lockout time, if locked out
    pub(crate) fn lockout_remaining(&self, now: Instant) -> Option<Duration> {
        self.lockout_until
            .filter(|&until| now < until)
            .map(|until| until - now)
    }

    /// Abort the pending automatic biometric prompt, if any
    pub(crate) fn cancel_auto_auth(&mut self) {
        if let Some(timer) = self.auto_auth_timer.take() {
            timer.handle.abort();
        }
    }

    /// Drop state that belongs to the previous user
    pub(crate) fn reset_for_user(&mut self, user: UserId) {
        self.cancel_auto_auth();
        let epoch = self.epoch.wrapping_add(1);
        let next_timer_id = self.next_timer_id;
        *self = Self::new();
        self.user = Some(user);
        self.epoch = epoch;
        self.next_timer_id = next_timer_id;
    }

    pub(crate) fn snapshot(
        &self,
        policy: &LockoutPolicy,
        biometry_type: BiometryType,
        authenticating: bool,
        now: Instant,
    ) -> LockSnapshot {
        let settings = self.settings();
        let lockout_remaining = self.lockout_remaining(now);

        // After a lockout expires the counter is kept, so the next wrong PIN
        // locks out again
        let relocks_on_next_failure = self.phase == LockPhase::Locked
            && self.failed_attempts >= policy.threshold
            && policy.is_locked(self.failed_attempts.saturating_add(1));

        let status_message = match self.phase {
            LockPhase::LockedOut => lockout_remaining.map(|remaining| {
                format!(
                    "Too many failed attempts. Try again in {}",
                    describe_duration(remaining)
                )
            }),
            LockPhase::Locked if relocks_on_next_failure => {
                Some("1 more wrong PIN locks the app again".to_string())
            }
            LockPhase::Locked if self.failed_attempts > 0 => {
                Some(policy.describe_lockout(self.failed_attempts))
            }
            _ => None,
        };

        LockSnapshot {
            phase: self.phase,
            pin_enabled: settings.pin_enabled,
            failed_attempts: self.failed_attempts,
            attempts_remaining: if relocks_on_next_failure {
                1
            } else {
                policy.attempts_remaining(self.failed_attempts)
            },
            lockout_remaining,
            biometric_type: if settings.offers_biometric() {
                biometry_type
            } else {
                BiometryType::None
            },
            authenticating,
            setup_stage: self.setup.as_ref().map(|s| s.session.stage()),
            setup_entered: self.setup.as_ref().map_or(0, |s| s.session.entered_len()),
            status_message,
        }
    }
}

/// Read-only view of the lock for rendering
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockSnapshot {
    pub phase: LockPhase,
    pub pin_enabled: bool,
    pub failed_attempts: u32,
    pub attempts_remaining: u32,
    /// Countdown for the lockout screen
    pub lockout_remaining: Option<Duration>,
    /// Biometric button to offer on the PIN pad
    pub biometric_type: BiometryType,
    /// An authentication attempt is pending; the pad should be disabled
    pub authenticating: bool,
    pub setup_stage: Option<SetupStage>,
    /// Digits typed into the current setup entry
    pub setup_entered: usize,
    pub status_message: Option<String>,
}

impl LockSnapshot {
    /// The PIN pad accepts input only while plainly locked
    pub fn pin_pad_available(&self) -> bool {
        self.phase == LockPhase::Locked
    }
}
