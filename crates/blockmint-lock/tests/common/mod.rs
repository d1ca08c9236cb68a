//! Shared test doubles for the controller tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use blockmint_lock::{
    ApiError, AppLock, BiometricAvailability, BiometricOutcome, BiometricProvider, BiometryType,
    LockConfig, LockEvent, MemorySessionStore, RemoteSecuritySettings, SecurityApi, SessionStore,
    Toast, UserId,
};
use tokio::sync::{mpsc, Notify};

pub const CORRECT_PIN: &str = "123456";
pub const WRONG_PIN: &str = "111111";

/// In-memory security API
#[derive(Default)]
pub struct MockApi {
    pub settings: Mutex<RemoteSecuritySettings>,
    pub pin: Mutex<Option<String>>,
    pub fail_fetch: AtomicBool,
    pub fail_verify: AtomicBool,
    pub fail_set_pin: AtomicBool,
    /// When set, verify_pin waits for a notification before answering
    pub verify_gate: Mutex<Option<Arc<Notify>>>,
    pub fetch_calls: AtomicUsize,
    pub verify_calls: AtomicUsize,
    pub stored_pins: Mutex<Vec<String>>,
}

impl MockApi {
    pub fn with_pin(biometric: bool) -> Arc<Self> {
        let api = Self::default();
        *api.settings.lock().unwrap() = RemoteSecuritySettings {
            pin_lock_enabled: Some(true),
            biometric_enabled: Some(biometric),
            lock_on_background: Some(true),
        };
        *api.pin.lock().unwrap() = Some(CORRECT_PIN.to_string());
        Arc::new(api)
    }

    pub fn without_pin() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn gate_verify(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.verify_gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }

    pub fn stored_pins(&self) -> Vec<String> {
        self.stored_pins.lock().unwrap().clone()
    }
}

#[async_trait]
impl SecurityApi for MockApi {
    async fn fetch_settings(&self, _user: &UserId) -> Result<RemoteSecuritySettings, ApiError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(ApiError::Status {
                url: "mock/settings".to_string(),
                status: 500,
            });
        }
        Ok(self.settings.lock().unwrap().clone())
    }

    async fn verify_pin(&self, _user: &UserId, pin: &str) -> Result<bool, ApiError> {
        self.verify_calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.verify_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if self.fail_verify.load(Ordering::SeqCst) {
            return Err(ApiError::Transport {
                url: "mock/verify-pin".to_string(),
                error: "connection reset".to_string(),
            });
        }
        Ok(self.pin.lock().unwrap().as_deref() == Some(pin))
    }

    async fn set_pin(&self, _user: &UserId, pin: &str) -> Result<(), ApiError> {
        self.stored_pins.lock().unwrap().push(pin.to_string());
        if self.fail_set_pin.load(Ordering::SeqCst) {
            return Err(ApiError::Rejected("storage unavailable".to_string()));
        }
        *self.pin.lock().unwrap() = Some(pin.to_string());
        self.settings.lock().unwrap().pin_lock_enabled = Some(true);
        Ok(())
    }

    async fn disable_pin(&self, _user: &UserId) -> Result<(), ApiError> {
        *self.pin.lock().unwrap() = None;
        self.settings.lock().unwrap().pin_lock_enabled = Some(false);
        Ok(())
    }

    async fn set_biometric(&self, _user: &UserId, enabled: bool) -> Result<(), ApiError> {
        self.settings.lock().unwrap().biometric_enabled = Some(enabled);
        Ok(())
    }
}

/// Scriptable biometric authenticator
pub struct MockBiometrics {
    pub availability: Mutex<BiometricAvailability>,
    pub outcome: Mutex<BiometricOutcome>,
    /// When set, authenticate waits for a notification before answering
    pub gate: Mutex<Option<Arc<Notify>>>,
    pub checks: AtomicUsize,
    pub prompts: AtomicUsize,
}

impl MockBiometrics {
    pub fn face(outcome: BiometricOutcome) -> Arc<Self> {
        Arc::new(Self {
            availability: Mutex::new(BiometricAvailability {
                is_available: true,
                biometry_type: BiometryType::Face,
                error_message: None,
            }),
            outcome: Mutex::new(outcome),
            gate: Mutex::new(None),
            checks: AtomicUsize::new(0),
            prompts: AtomicUsize::new(0),
        })
    }

    pub fn gate_prompt(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }

    pub fn prompts(&self) -> usize {
        self.prompts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BiometricProvider for MockBiometrics {
    async fn check_availability(&self) -> BiometricAvailability {
        self.checks.fetch_add(1, Ordering::SeqCst);
        self.availability.lock().unwrap().clone()
    }

    async fn authenticate(&self, _prompt: &str) -> BiometricOutcome {
        self.prompts.fetch_add(1, Ordering::SeqCst);
        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        self.outcome.lock().unwrap().clone()
    }
}

pub struct Harness {
    pub lock: AppLock,
    pub events: mpsc::UnboundedReceiver<LockEvent>,
    pub api: Arc<MockApi>,
    pub biometrics: Arc<MockBiometrics>,
    pub sessions: Arc<MemorySessionStore>,
}

impl Harness {
    pub fn new(config: LockConfig, api: Arc<MockApi>, biometrics: Arc<MockBiometrics>) -> Self {
        Self::with_sessions(config, api, biometrics, Arc::new(MemorySessionStore::new()))
    }

    pub fn with_sessions(
        config: LockConfig,
        api: Arc<MockApi>,
        biometrics: Arc<MockBiometrics>,
        sessions: Arc<MemorySessionStore>,
    ) -> Self {
        let (lock, events) = AppLock::new(
            config,
            Arc::clone(&api) as Arc<dyn SecurityApi>,
            Arc::clone(&biometrics) as Arc<dyn BiometricProvider>,
            Arc::clone(&sessions) as Arc<dyn SessionStore>,
        );
        Self {
            lock,
            events,
            api,
            biometrics,
            sessions,
        }
    }

    /// Drain pending events
    pub fn events(&mut self) -> Vec<LockEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }

    /// Drain pending events, keeping only toasts
    pub fn toasts(&mut self) -> Vec<Toast> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                LockEvent::Toast(toast) => Some(toast),
                _ => None,
            })
            .collect()
    }
}

/// Let spawned tasks and pending timers run for `duration` of paused time
pub async fn settle(duration: Duration) {
    tokio::time::sleep(duration).await;
    tokio::task::yield_now().await;
}
