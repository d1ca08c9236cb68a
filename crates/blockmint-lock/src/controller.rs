//! App lock controller
//!
//! Owns the lock phase and every transition between phases. The view only
//! reads [`LockSnapshot`]s and [`LockEvent`]s and feeds input back in.
//!
//! # Concurrency
//!
//! State lives behind a mutex that is never held across an `.await`. Remote
//! calls and biometric prompts run outside the lock and re-validate the phase
//! (and the user epoch) when they resolve; a result that no longer applies is
//! dropped. At most one authentication attempt is in flight per controller,
//! enforced by [`AuthGuard`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, OnceCell};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::api::{SecurityApi, UserId};
use crate::biometric::{BiometricProvider, BiometryType};
use crate::config::{BackgroundLockMode, LockConfig};
use crate::error::{LockError, Result};
use crate::events::{EventSender, LockEvent, Toast};
use crate::lifecycle::LifecycleSignal;
use crate::lockout::describe_duration;
use crate::session::SessionStore;
use crate::settings::SecuritySettings;
use crate::setup::{validate_pin, PinKey, PinSetupSession, SetupProgress};
use crate::state::{
    AutoAuthTimer, FailureOutcome, LockPhase, LockSnapshot, LockState, SetupCallback,
    SetupContext,
};

/// Result of a PIN submission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinOutcome {
    /// PIN accepted
    Unlocked,
    /// PIN wrong (or could not be checked)
    Rejected { attempts_remaining: u32 },
    /// PIN wrong and the threshold was reached
    LockedOut { duration: Duration },
    /// The lock changed while the check was pending; result discarded
    Ignored,
}

/// Result of feeding input to a PIN setup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupStep {
    /// Still collecting digits
    Incomplete,
    /// First entry complete
    AwaitingConfirm,
    /// Confirmation differed from the first entry
    Mismatch,
    /// New PIN stored
    Completed,
    /// Server refused or could not be reached; setup restarted
    Failed,
}

/// Releases the in-flight slot on drop
struct AuthGuard<'a> {
    slot: &'a AtomicBool,
}

impl<'a> AuthGuard<'a> {
    fn try_acquire(slot: &'a AtomicBool) -> Option<Self> {
        slot.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { slot })
    }
}

impl Drop for AuthGuard<'_> {
    fn drop(&mut self) {
        self.slot.store(false, Ordering::Release);
    }
}

struct Inner {
    config: LockConfig,
    api: Arc<dyn SecurityApi>,
    biometrics: Arc<dyn BiometricProvider>,
    sessions: Arc<dyn SessionStore>,
    events: EventSender,
    state: Mutex<LockState>,
    auth_in_flight: AtomicBool,
    biometry: OnceCell<BiometryType>,
}

/// PIN + biometric app lock
///
/// Cloning yields another handle to the same lock.
#[derive(Clone)]
pub struct AppLock {
    inner: Arc<Inner>,
}

impl AppLock {
    /// Create a controller and the receiver for its events
    pub fn new(
        config: LockConfig,
        api: Arc<dyn SecurityApi>,
        biometrics: Arc<dyn BiometricProvider>,
        sessions: Arc<dyn SessionStore>,
    ) -> (Self, mpsc::UnboundedReceiver<LockEvent>) {
        let (events, receiver) = EventSender::channel();
        let lock = Self {
            inner: Arc::new(Inner {
                config,
                api,
                biometrics,
                sessions,
                events,
                state: Mutex::new(LockState::new()),
                auth_in_flight: AtomicBool::new(false),
                biometry: OnceCell::new(),
            }),
        };
        (lock, receiver)
    }

    fn state(&self) -> MutexGuard<'_, LockState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn is_authenticating(&self) -> bool {
        self.inner.auth_in_flight.load(Ordering::Acquire)
    }

    fn try_begin_auth(&self) -> Option<AuthGuard<'_>> {
        AuthGuard::try_acquire(&self.inner.auth_in_flight)
    }

    // ------------------------------------------------------------------
    // Mount and settings
    // ------------------------------------------------------------------

    /// Attach the controller to a user and load their settings
    ///
    /// Mounting a different user discards all lock state of the previous
    /// one, session marker included. If the settings cannot be fetched the
    /// app stays unlocked and the error is returned.
    pub async fn mount(&self, user: UserId) -> Result<LockSnapshot> {
        {
            let mut state = self.state();
            if state.user.as_ref() != Some(&user) {
                info!("Mounting app lock for user {}", user);
                if state.user.is_some() {
                    // The marker is not keyed by user
                    self.clear_session_marker();
                }
                let from = state.phase;
                state.reset_for_user(user);
                self.emit_phase_change(from, state.phase);
            }
        }

        self.detect_biometric_type().await;
        self.refresh_settings().await?;
        Ok(self.snapshot())
    }

    /// Detect the biometric sensor type; detection runs once per controller
    pub async fn detect_biometric_type(&self) -> BiometryType {
        let biometrics = Arc::clone(&self.inner.biometrics);
        *self
            .inner
            .biometry
            .get_or_init(|| async move {
                let availability = biometrics.check_availability().await;
                debug!("Biometric availability: {:?}", availability);
                availability.biometry_type
            })
            .await
    }

    /// Re-read settings from the server and apply them
    pub async fn refresh_settings(&self) -> Result<SecuritySettings> {
        let (user, epoch) = self.current_user()?;

        let settings = match self.inner.api.fetch_settings(&user).await {
            Ok(remote) => SecuritySettings::from(remote),
            Err(e) => {
                warn!("Failed to fetch security settings: {}", e);
                return Err(e.into());
            }
        };

        let mut state = self.state();
        if state.epoch != epoch {
            debug!("Discarding settings fetched for a previous user");
            return Ok(settings);
        }
        self.apply_settings(&mut state, settings);
        Ok(settings)
    }

    /// Cached settings, if loaded
    pub fn settings(&self) -> Option<SecuritySettings> {
        self.state().settings
    }

    fn current_user(&self) -> Result<(UserId, u64)> {
        let state = self.state();
        let user = state.user.clone().ok_or(LockError::NoUser)?;
        Ok((user, state.epoch))
    }

    fn apply_settings(&self, state: &mut LockState, settings: SecuritySettings) {
        debug!("Applying security settings: {:?}", settings);
        state.settings = Some(settings);

        if !settings.pin_enabled {
            if matches!(state.phase, LockPhase::Locked | LockPhase::LockedOut) {
                info!("PIN lock disabled, unlocking");
                state.cancel_auto_auth();
                let from = state.phase;
                state.phase = LockPhase::Unlocked;
                state.failed_attempts = 0;
                state.lockout_until = None;
                state.has_tried_auto_auth = false;
                self.emit_phase_change(from, LockPhase::Unlocked);
            }
            return;
        }

        match state.phase {
            LockPhase::Unlocked if !self.has_session_marker() => {
                info!("PIN enabled with no unlock this session, locking");
                self.enter_locked(state, false);
            }
            // Biometrics may have just been switched on
            LockPhase::Locked => self.schedule_auto_biometric(state),
            _ => {}
        }
    }

    // ------------------------------------------------------------------
    // Observation
    // ------------------------------------------------------------------

    /// Current view of the lock
    pub fn snapshot(&self) -> LockSnapshot {
        let mut state = self.state();
        self.evaluate(&mut state);
        let biometry = self.inner.biometry.get().copied().unwrap_or_default();
        state.snapshot(
            &self.inner.config.lockout,
            biometry,
            self.is_authenticating(),
            Instant::now(),
        )
    }

    /// Current phase, after re-evaluating the lockout deadline
    pub fn phase(&self) -> LockPhase {
        let mut state = self.state();
        self.evaluate(&mut state);
        state.phase
    }

    /// Re-evaluate time-based transitions
    pub fn tick(&self) -> LockPhase {
        self.phase()
    }

    /// App content must be hidden
    pub fn is_locked(&self) -> bool {
        matches!(self.phase(), LockPhase::Locked | LockPhase::LockedOut)
    }

    fn evaluate(&self, state: &mut LockState) {
        if state.expire_lockout(Instant::now()) {
            info!("Lockout expired");
            self.emit_phase_change(LockPhase::LockedOut, LockPhase::Locked);
            self.schedule_auto_biometric(state);
        }
    }

    // ------------------------------------------------------------------
    // Transitions
    // ------------------------------------------------------------------

    fn emit_phase_change(&self, from: LockPhase, to: LockPhase) {
        if from != to {
            debug!("Lock phase {:?} -> {:?}", from, to);
            self.inner.events.emit(LockEvent::PhaseChanged { from, to });
        }
    }

    fn has_session_marker(&self) -> bool {
        let key = self.inner.config.session_key();
        match self.inner.sessions.marked_at(&key) {
            Ok(Some(unlocked_at)) => {
                let age = Utc::now().signed_duration_since(unlocked_at);
                debug!("Session unlocked {}s ago", age.num_seconds());
                true
            }
            Ok(None) => false,
            Err(e) => {
                warn!("Failed to read session marker: {}", e);
                false
            }
        }
    }

    fn set_session_marker(&self) {
        if let Err(e) = self.inner.sessions.mark(&self.inner.config.session_key()) {
            warn!("Failed to set session marker: {}", e);
        }
    }

    fn clear_session_marker(&self) {
        if let Err(e) = self.inner.sessions.clear(&self.inner.config.session_key()) {
            warn!("Failed to clear session marker: {}", e);
        }
    }

    /// Move into `Locked`, discarding any setup in progress
    fn enter_locked(&self, state: &mut LockState, clear_marker: bool) {
        let from = state.phase;
        state.phase = LockPhase::Locked;
        state.has_tried_auto_auth = false;
        state.setup = None;
        state.cancel_auto_auth();

        if clear_marker {
            self.clear_session_marker();
        }

        self.emit_phase_change(from, LockPhase::Locked);
        self.schedule_auto_biometric(state);
    }

    fn unlock(&self, state: &mut LockState) {
        let from = state.phase;
        state.cancel_auto_auth();
        state.record_success();
        self.set_session_marker();
        self.emit_phase_change(from, LockPhase::Unlocked);
    }

    /// Lock the app now
    pub fn lock(&self) -> Result<()> {
        let mut state = self.state();
        self.evaluate(&mut state);

        if !state.settings().pin_enabled {
            return Err(LockError::PinNotEnabled);
        }

        match state.phase {
            LockPhase::Unlocked | LockPhase::SettingUpPin => {
                info!("Locking app on request");
                self.enter_locked(&mut state, true);
            }
            LockPhase::Locked | LockPhase::LockedOut => {}
        }
        Ok(())
    }

    /// Feed a host lifecycle notification
    pub fn handle_lifecycle(&self, signal: impl Into<LifecycleSignal>) {
        let signal = signal.into();
        let mut state = self.state();
        self.evaluate(&mut state);

        let settings = state.settings();
        if !settings.pin_enabled {
            return;
        }

        match (self.inner.config.background_lock_mode, signal) {
            (BackgroundLockMode::Immediate, LifecycleSignal::Background) => {
                if !settings.lock_on_background {
                    return;
                }
                match state.phase {
                    LockPhase::Unlocked | LockPhase::SettingUpPin => {
                        info!("App backgrounded, locking");
                        self.enter_locked(&mut state, true);
                    }
                    LockPhase::Locked => self.clear_session_marker(),
                    LockPhase::LockedOut => {}
                }
            }
            (BackgroundLockMode::Timeout, LifecycleSignal::Foreground) => {
                let idle = state.activity.idle_time();
                debug!("App returned after {}s idle", idle.as_secs());

                if !state.activity.is_idle_for(self.inner.config.idle_timeout()) {
                    return;
                }
                match state.phase {
                    LockPhase::Unlocked | LockPhase::SettingUpPin => {
                        info!("Idle for {}, locking", describe_duration(idle));
                        self.enter_locked(&mut state, true);
                    }
                    LockPhase::Locked => {
                        info!(
                            "Idle for {} while locked, offering biometrics again",
                            describe_duration(idle)
                        );
                        // Restart the idle clock so the prompt's own app-state
                        // churn cannot re-arm it
                        state.activity.touch();
                        state.has_tried_auto_auth = false;
                        self.clear_session_marker();
                        self.schedule_auto_biometric(&mut state);
                    }
                    LockPhase::LockedOut => {}
                }
            }
            (BackgroundLockMode::Timeout, LifecycleSignal::Background) => {
                debug!("App went to background");
            }
            (BackgroundLockMode::Immediate, LifecycleSignal::Foreground) => {}
        }
    }

    /// Record a user interaction (touch, click, keypress, scroll)
    pub fn record_activity(&self) {
        self.state().activity.touch();
    }

    // ------------------------------------------------------------------
    // PIN verification
    // ------------------------------------------------------------------

    /// Check a PIN against the server and unlock on success
    ///
    /// A transport or server failure counts as a wrong PIN.
    pub async fn submit_pin(&self, pin: &str) -> Result<PinOutcome> {
        validate_pin(pin)?;

        let (user, epoch) = {
            let mut state = self.state();
            self.evaluate(&mut state);
            match state.phase {
                LockPhase::Locked => {}
                LockPhase::LockedOut => {
                    let remaining = state
                        .lockout_remaining(Instant::now())
                        .unwrap_or_default();
                    return Err(LockError::LockedOut(remaining.as_secs()));
                }
                _ => return Err(LockError::NotLocked),
            }
            let user = state.user.clone().ok_or(LockError::NoUser)?;
            (user, state.epoch)
        };

        let Some(_guard) = self.try_begin_auth() else {
            debug!("PIN submitted while another attempt is pending");
            return Err(LockError::AuthInProgress);
        };

        let verified = match self.inner.api.verify_pin(&user, pin).await {
            Ok(verified) => verified,
            Err(e) => {
                warn!("PIN verification request failed: {}", e);
                false
            }
        };

        let mut state = self.state();
        if state.epoch != epoch || state.phase != LockPhase::Locked {
            debug!("Ignoring stale PIN verification result");
            return Ok(PinOutcome::Ignored);
        }

        if verified {
            info!("Unlocked with PIN");
            self.unlock(&mut state);
            return Ok(PinOutcome::Unlocked);
        }

        match state.record_failure(&self.inner.config.lockout, Instant::now()) {
            FailureOutcome::Remaining(attempts_remaining) => {
                warn!(
                    "Incorrect PIN, {} attempts remaining",
                    attempts_remaining
                );
                self.inner.events.toast(Toast::destructive(
                    "Incorrect PIN",
                    format!("{} attempts remaining", attempts_remaining),
                ));
                Ok(PinOutcome::Rejected { attempts_remaining })
            }
            FailureOutcome::LockedOut(duration) => {
                warn!(
                    "Too many failed PIN attempts, locked out for {}",
                    describe_duration(duration)
                );
                state.cancel_auto_auth();
                self.emit_phase_change(LockPhase::Locked, LockPhase::LockedOut);
                self.inner.events.toast(Toast::destructive(
                    "Too many attempts",
                    format!("Try again in {}", describe_duration(duration)),
                ));
                Ok(PinOutcome::LockedOut { duration })
            }
        }
    }

    /// "Forgot PIN" only points the user at support
    pub fn forgot_pin(&self) {
        self.inner.events.toast(Toast::info(
            "Forgot PIN?",
            "Please contact support to reset your PIN",
        ));
    }

    // ------------------------------------------------------------------
    // Biometrics
    // ------------------------------------------------------------------

    /// Ask for the automatic biometric prompt
    ///
    /// Safe to call any number of times: at most one prompt is scheduled per
    /// lock, and none while an authentication is pending.
    pub fn request_auto_biometric(&self) {
        let mut state = self.state();
        self.evaluate(&mut state);
        self.schedule_auto_biometric(&mut state);
    }

    fn schedule_auto_biometric(&self, state: &mut LockState) {
        if state.phase != LockPhase::Locked
            || !state.settings().offers_biometric()
            || state.setup.is_some()
            || state.has_tried_auto_auth
            || state.auto_auth_timer.is_some()
            || self.is_authenticating()
        {
            return;
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("No async runtime, automatic biometric prompt skipped");
            return;
        };

        let id = state.next_timer_id;
        state.next_timer_id = state.next_timer_id.wrapping_add(1);

        let delay = self.inner.config.auto_biometric_delay();
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let task = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = weak.upgrade() {
                let lock = AppLock { inner };
                lock.fire_auto_biometric(id).await;
            }
        });

        debug!("Automatic biometric prompt scheduled in {}ms", delay.as_millis());
        state.auto_auth_timer = Some(AutoAuthTimer {
            id,
            handle: task.abort_handle(),
        });
    }

    async fn fire_auto_biometric(&self, id: u64) {
        {
            let mut state = self.state();
            if state.auto_auth_timer.as_ref().map(|t| t.id) != Some(id) {
                return;
            }
            state.auto_auth_timer = None;

            if state.phase != LockPhase::Locked
                || !state.settings().offers_biometric()
                || state.setup.is_some()
                || state.has_tried_auto_auth
                || self.is_authenticating()
            {
                return;
            }

            // Mark before the prompt starts so nothing schedules a second one
            state.has_tried_auto_auth = true;
        }

        debug!("Triggering automatic biometric prompt");
        self.run_biometric().await;
    }

    /// User pressed the biometric button
    ///
    /// Returns whether the app was unlocked.
    pub async fn trigger_biometric(&self) -> Result<bool> {
        {
            let mut state = self.state();
            self.evaluate(&mut state);
            match state.phase {
                LockPhase::Locked => {}
                LockPhase::LockedOut => {
                    let remaining = state
                        .lockout_remaining(Instant::now())
                        .unwrap_or_default();
                    return Err(LockError::LockedOut(remaining.as_secs()));
                }
                _ => return Err(LockError::NotLocked),
            }
            if self.is_authenticating() {
                return Err(LockError::AuthInProgress);
            }
            state.cancel_auto_auth();
        }

        Ok(self.run_biometric().await)
    }

    async fn run_biometric(&self) -> bool {
        let Some(_guard) = self.try_begin_auth() else {
            debug!("Authentication already in progress, skipping biometric prompt");
            return false;
        };

        let (epoch, offered) = {
            let mut state = self.state();
            if state.phase != LockPhase::Locked {
                return false;
            }
            state.has_tried_auto_auth = true;
            (state.epoch, state.settings().offers_biometric())
        };

        if !offered {
            debug!("Biometrics not enabled in settings");
            return false;
        }

        let availability = self.inner.biometrics.check_availability().await;
        if !availability.is_available {
            info!(
                "Biometrics unavailable: {}",
                availability.error_message.as_deref().unwrap_or("unknown")
            );
            self.inner.events.toast(Toast::info(
                "Biometrics Unavailable",
                availability
                    .error_message
                    .unwrap_or_else(|| "Please use your PIN instead".to_string()),
            ));
            return false;
        }

        self.inner.events.emit(LockEvent::BiometricPrompt);
        let outcome = self
            .inner
            .biometrics
            .authenticate(&self.inner.config.biometric_prompt)
            .await;

        if outcome.success {
            let mut state = self.state();
            if state.epoch != epoch || state.phase != LockPhase::Locked {
                debug!("Ignoring late biometric success");
                return false;
            }
            info!("Unlocked with biometrics");
            self.unlock(&mut state);
            return true;
        }

        if outcome.is_cancelled() {
            debug!("Biometric prompt cancelled");
        } else {
            warn!(
                "Biometric authentication failed: {}",
                outcome.error.as_deref().unwrap_or("unknown")
            );
            self.inner.events.toast(Toast::destructive(
                "Authentication Failed",
                outcome
                    .error
                    .unwrap_or_else(|| "Please try again or use your PIN".to_string()),
            ));
        }
        false
    }

    // ------------------------------------------------------------------
    // PIN setup
    // ------------------------------------------------------------------

    /// Open the PIN setup pad
    ///
    /// `on_complete` runs after the new PIN is stored and settings refetched.
    ///
    /// Setup may start from `Locked`, in which case it returns to `Locked`
    /// without unlocking. Replacing the PIN from there is only as strong as
    /// the server's authorisation of the `set-pin` call; nothing on the
    /// client checks the old PIN.
    pub fn begin_pin_setup(&self, on_complete: Option<SetupCallback>) -> Result<()> {
        let mut state = self.state();
        self.evaluate(&mut state);
        if state.user.is_none() {
            return Err(LockError::NoUser);
        }

        match state.phase {
            LockPhase::Unlocked | LockPhase::Locked => {
                let from = state.phase;
                state.cancel_auto_auth();
                state.has_tried_auto_auth = false;
                state.setup = Some(SetupContext {
                    session: PinSetupSession::new(),
                    return_to: from,
                    on_complete,
                });
                state.phase = LockPhase::SettingUpPin;
                self.emit_phase_change(from, LockPhase::SettingUpPin);
                Ok(())
            }
            LockPhase::SettingUpPin => {
                if let Some(setup) = state.setup.as_mut() {
                    setup.session.reset();
                    setup.on_complete = on_complete;
                }
                Ok(())
            }
            LockPhase::LockedOut => {
                let remaining = state
                    .lockout_remaining(Instant::now())
                    .unwrap_or_default();
                Err(LockError::LockedOut(remaining.as_secs()))
            }
        }
    }

    /// Leave PIN setup without storing anything
    pub fn cancel_pin_setup(&self) -> Result<()> {
        let mut state = self.state();
        let setup = state.setup.take().ok_or(LockError::NotSettingUp)?;

        debug!("PIN setup cancelled");
        match setup.return_to {
            LockPhase::Locked => self.enter_locked(&mut state, false),
            _ => {
                state.phase = LockPhase::Unlocked;
                self.emit_phase_change(LockPhase::SettingUpPin, LockPhase::Unlocked);
            }
        }
        Ok(())
    }

    /// Feed one PIN pad key to the setup
    pub async fn setup_key(&self, key: PinKey) -> Result<SetupStep> {
        self.feed_setup(false, std::iter::once(key)).await
    }

    /// Feed a whole entry (first or confirmation) to the setup
    pub async fn submit_setup_entry(&self, entry: &str) -> Result<SetupStep> {
        validate_pin(entry)?;
        let keys = entry.bytes().map(|b| PinKey::Digit(b - b'0'));
        self.feed_setup(true, keys).await
    }

    /// Run a complete setup with both entries
    pub async fn setup_pin(&self, pin: &str, confirm_pin: &str) -> Result<SetupStep> {
        validate_pin(pin)?;
        validate_pin(confirm_pin)?;

        {
            let mut state = self.state();
            let setup = state.setup.as_mut().ok_or(LockError::NotSettingUp)?;
            setup.session.reset();
        }

        match self.submit_setup_entry(pin).await? {
            SetupStep::AwaitingConfirm => self.submit_setup_entry(confirm_pin).await,
            other => Ok(other),
        }
    }

    async fn feed_setup(
        &self,
        replace_entry: bool,
        keys: impl IntoIterator<Item = PinKey>,
    ) -> Result<SetupStep> {
        if self.is_authenticating() {
            return Err(LockError::AuthInProgress);
        }

        let progress = {
            let mut state = self.state();
            let setup = state.setup.as_mut().ok_or(LockError::NotSettingUp)?;
            if replace_entry {
                setup.session.clear_current();
            }
            let mut progress = SetupProgress::Incomplete;
            for key in keys {
                progress = setup.session.press(key);
            }
            progress
        };

        match progress {
            SetupProgress::Incomplete => Ok(SetupStep::Incomplete),
            SetupProgress::AwaitingConfirm => Ok(SetupStep::AwaitingConfirm),
            SetupProgress::Mismatch => {
                debug!("PIN confirmation mismatch");
                self.inner
                    .events
                    .toast(Toast::destructive("PINs don't match", "Try again."));
                Ok(SetupStep::Mismatch)
            }
            SetupProgress::Confirmed(pin) => self.persist_new_pin(pin).await,
        }
    }

    async fn persist_new_pin(&self, pin: Zeroizing<String>) -> Result<SetupStep> {
        let Some(guard) = self.try_begin_auth() else {
            return Err(LockError::AuthInProgress);
        };
        let (user, epoch) = self.current_user()?;

        let stored = self.inner.api.set_pin(&user, &pin).await;
        drop(pin);
        drop(guard);

        if let Err(e) = stored {
            warn!("Failed to store new PIN: {}", e);
            {
                let mut state = self.state();
                if state.epoch == epoch {
                    if let Some(setup) = state.setup.as_mut() {
                        setup.session.reset();
                    }
                }
            }
            self.inner.events.toast(Toast::destructive(
                "Error",
                "Failed to create PIN. Please try again.",
            ));
            return Ok(SetupStep::Failed);
        }

        let on_complete = {
            let mut state = self.state();
            if state.epoch != epoch {
                debug!("PIN stored for a previous user");
                return Ok(SetupStep::Completed);
            }

            match state.setup.take() {
                Some(setup) => {
                    match setup.return_to {
                        LockPhase::Locked => self.enter_locked(&mut state, false),
                        _ => {
                            state.phase = LockPhase::Unlocked;
                            state.activity.touch();
                            self.set_session_marker();
                            self.emit_phase_change(
                                LockPhase::SettingUpPin,
                                LockPhase::Unlocked,
                            );
                        }
                    }
                    setup.on_complete
                }
                None => {
                    debug!("PIN stored after setup was abandoned");
                    None
                }
            }
        };

        info!("New PIN stored");
        self.inner.events.toast(Toast::info(
            "PIN Created",
            "Your app is now protected with a PIN code",
        ));

        if let Err(e) = self.refresh_settings().await {
            warn!("Settings refresh after PIN setup failed: {}", e);
        }

        if let Some(callback) = on_complete {
            callback();
        }
        self.inner.events.emit(LockEvent::PinSetupCompleted);
        Ok(SetupStep::Completed)
    }

    // ------------------------------------------------------------------
    // Settings mutations
    // ------------------------------------------------------------------

    /// Turn the PIN gate off; only allowed while unlocked
    pub async fn disable_pin(&self) -> Result<()> {
        self.require_unlocked()?;
        let (user, _) = self.current_user()?;

        if let Err(e) = self.inner.api.disable_pin(&user).await {
            warn!("Failed to disable PIN: {}", e);
            self.inner.events.toast(Toast::destructive(
                "Error",
                "Failed to disable PIN. Please try again.",
            ));
            return Err(e.into());
        }

        info!("PIN lock disabled");
        self.refresh_settings().await?;
        Ok(())
    }

    /// Turn biometric unlock on or off; only allowed while unlocked
    pub async fn set_biometric_enabled(&self, enabled: bool) -> Result<()> {
        self.require_unlocked()?;
        let (user, _) = self.current_user()?;

        if let Err(e) = self.inner.api.set_biometric(&user, enabled).await {
            warn!("Failed to update biometric setting: {}", e);
            self.inner.events.toast(Toast::destructive(
                "Error",
                "Failed to update biometric setting. Please try again.",
            ));
            return Err(e.into());
        }

        info!("Biometric unlock {}", if enabled { "enabled" } else { "disabled" });
        self.refresh_settings().await?;
        Ok(())
    }

    fn require_unlocked(&self) -> Result<()> {
        let mut state = self.state();
        self.evaluate(&mut state);
        match state.phase {
            LockPhase::Unlocked => Ok(()),
            _ => Err(LockError::NotUnlocked),
        }
    }
}
