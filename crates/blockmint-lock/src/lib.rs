//! BlockMint App Lock - PIN and biometric gate for the mobile client
//!
//! This crate provides:
//! - The lock state machine (unlocked, locked, PIN setup, locked out)
//! - Lockout policy after repeated wrong PINs
//! - Background and idle-timeout locking from host lifecycle signals
//! - Automatic biometric prompt with single-shot and in-flight guards
//! - Two-stage PIN setup
//! - Remote security settings client and session unlock markers

pub mod api;
pub mod biometric;
pub mod config;
pub mod controller;
pub mod error;
pub mod events;
pub mod lifecycle;
pub mod lockout;
pub mod session;
pub mod settings;
pub mod setup;
pub mod state;

pub use api::{ApiConfig, HttpSecurityApi, SecurityApi, UserId};
pub use biometric::{
    BiometricAvailability, BiometricOutcome, BiometricProvider, BiometryType, NoBiometrics,
};
pub use config::{BackgroundLockMode, LockConfig};
pub use controller::{AppLock, PinOutcome, SetupStep};
pub use error::{ApiError, LockError, Result, SessionStoreError};
pub use events::{LockEvent, Toast, ToastSeverity};
pub use lifecycle::{ActivityTracker, HostEvent, LifecycleSignal};
pub use lockout::LockoutPolicy;
pub use session::{FileSessionStore, MemorySessionStore, SessionStore};
pub use settings::{RemoteSecuritySettings, SecuritySettings};
pub use setup::{PinKey, PinSetupSession, SetupProgress, SetupStage, PIN_LENGTH};
pub use state::{LockPhase, LockSnapshot, SetupCallback};
