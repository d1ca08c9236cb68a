//! Security settings as stored remotely and as used by the controller

use serde::{Deserialize, Serialize};

/// Settings record as returned by the security API
///
/// Every field is optional on the wire; a missing field means "off".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteSecuritySettings {
    #[serde(default)]
    pub pin_lock_enabled: Option<bool>,
    #[serde(default)]
    pub biometric_enabled: Option<bool>,
    #[serde(default)]
    pub lock_on_background: Option<bool>,
}

/// Normalized security settings
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SecuritySettings {
    /// PIN gate is active
    pub pin_enabled: bool,
    /// Biometric unlock is offered on the lock screen
    pub biometric_enabled: bool,
    /// Backgrounding re-locks (immediate policy only)
    pub lock_on_background: bool,
}

impl From<RemoteSecuritySettings> for SecuritySettings {
    fn from(remote: RemoteSecuritySettings) -> Self {
        Self {
            pin_enabled: remote.pin_lock_enabled.unwrap_or(false),
            biometric_enabled: remote.biometric_enabled.unwrap_or(false),
            lock_on_background: remote.lock_on_background.unwrap_or(false),
        }
    }
}

impl SecuritySettings {
    /// Biometric unlock is only meaningful behind an enabled PIN gate
    pub fn offers_biometric(&self) -> bool {
        self.pin_enabled && self.biometric_enabled
    }
}
