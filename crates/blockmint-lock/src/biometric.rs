//! Platform biometric authentication
//!
//! The controller checks capability once at mount and then only calls
//! [`BiometricProvider::authenticate`] while locked.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Kind of biometric sensor the device offers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BiometryType {
    Face,
    Fingerprint,
    #[default]
    None,
}

/// Result of a capability check
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BiometricAvailability {
    pub is_available: bool,
    pub biometry_type: BiometryType,
    pub error_message: Option<String>,
}

/// Result of an authentication prompt
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BiometricOutcome {
    pub success: bool,
    pub error: Option<String>,
}

impl BiometricOutcome {
    pub fn succeeded() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
        }
    }

    /// The user dismissed the prompt
    ///
    /// Platforms report this only through the error text, so any error
    /// mentioning "cancel" in any case counts.
    pub fn is_cancelled(&self) -> bool {
        self.error
            .as_deref()
            .is_some_and(|e| e.to_ascii_lowercase().contains("cancel"))
    }
}

/// Native biometric authenticator
#[async_trait]
pub trait BiometricProvider: Send + Sync {
    /// Check whether biometrics can be used right now
    async fn check_availability(&self) -> BiometricAvailability;

    /// Show the platform prompt
    async fn authenticate(&self, prompt: &str) -> BiometricOutcome;
}

/// Provider for platforms without a native authenticator
#[derive(Debug, Clone, Copy, Default)]
pub struct NoBiometrics;

#[async_trait]
impl BiometricProvider for NoBiometrics {
    async fn check_availability(&self) -> BiometricAvailability {
        BiometricAvailability {
            is_available: false,
            biometry_type: BiometryType::None,
            error_message: Some("Biometrics not available on this platform".to_string()),
        }
    }

    async fn authenticate(&self, _prompt: &str) -> BiometricOutcome {
        BiometricOutcome::failed("Biometrics not available")
    }
}
