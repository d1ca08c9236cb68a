//! Lock configuration
//!
//! One controller type serves both the primary app lock and the compliance
//! ("safe mode") lock; the differences live here.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{LockError, Result};
use crate::lockout::LockoutPolicy;

/// Default idle threshold for the timeout policy (30 minutes)
const DEFAULT_IDLE_TIMEOUT_MS: u64 = 30 * 60 * 1000;

/// Delay before the automatic biometric prompt fires
const DEFAULT_AUTO_BIOMETRIC_DELAY_MS: u64 = 600;

/// What backgrounding the app does to the lock
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackgroundLockMode {
    /// Lock as soon as the app leaves the foreground
    #[default]
    Immediate,
    /// Lock on return only if the user was idle for at least `idle_timeout`
    Timeout,
}

/// App lock configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    /// Background re-lock policy
    pub background_lock_mode: BackgroundLockMode,

    /// Idle threshold used by [`BackgroundLockMode::Timeout`]
    pub idle_timeout_ms: u64,

    /// Prefix of the session-unlock marker key
    pub session_key_prefix: String,

    /// Debounce before the automatic biometric prompt
    pub auto_biometric_delay_ms: u64,

    /// Reason string shown by the platform biometric prompt
    pub biometric_prompt: String,

    /// Wrong-PIN lockout policy
    pub lockout: LockoutPolicy,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self::primary()
    }
}

impl LockConfig {
    /// Primary app lock: locks immediately when backgrounded
    pub fn primary() -> Self {
        Self {
            background_lock_mode: BackgroundLockMode::Immediate,
            idle_timeout_ms: DEFAULT_IDLE_TIMEOUT_MS,
            session_key_prefix: "app".to_string(),
            auto_biometric_delay_ms: DEFAULT_AUTO_BIOMETRIC_DELAY_MS,
            biometric_prompt: "Unlock BlockMint".to_string(),
            lockout: LockoutPolicy::default(),
        }
    }

    /// Compliance mode lock: 30 minute idle timeout, independent session key
    pub fn compliance() -> Self {
        Self {
            background_lock_mode: BackgroundLockMode::Timeout,
            session_key_prefix: "safe_app".to_string(),
            ..Self::primary()
        }
    }

    /// Idle threshold as a duration
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    /// Auto-biometric debounce as a duration
    pub fn auto_biometric_delay(&self) -> Duration {
        Duration::from_millis(self.auto_biometric_delay_ms)
    }

    /// Key of the "unlocked this session" marker
    pub fn session_key(&self) -> String {
        format!("{}_unlocked", self.session_key_prefix)
    }

    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .map_err(|e| LockError::Config(format!("Failed to read {:?}: {}", path, e)))?;
        serde_json::from_str(&contents)
            .map_err(|e| LockError::Config(format!("Failed to parse {:?}: {}", path, e)))
    }

    /// Save configuration as pretty JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| LockError::Config(e.to_string()))?;
        }

        let contents =
            serde_json::to_string_pretty(self).map_err(|e| LockError::Config(e.to_string()))?;
        fs::write(path, contents).map_err(|e| LockError::Config(e.to_string()))?;

        tracing::debug!("Saved lock config to {:?}", path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_differ_only_in_policy_and_key() {
        let primary = LockConfig::primary();
        let compliance = LockConfig::compliance();

        assert_eq!(primary.background_lock_mode, BackgroundLockMode::Immediate);
        assert_eq!(compliance.background_lock_mode, BackgroundLockMode::Timeout);
        assert_eq!(primary.session_key(), "app_unlocked");
        assert_eq!(compliance.session_key(), "safe_app_unlocked");
        assert_eq!(compliance.idle_timeout(), Duration::from_secs(30 * 60));
        assert_eq!(primary.lockout, compliance.lockout);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: LockConfig =
            serde_json::from_str(r#"{"background_lock_mode":"timeout","idle_timeout_ms":1000}"#)
                .unwrap();

        assert_eq!(config.background_lock_mode, BackgroundLockMode::Timeout);
        assert_eq!(config.idle_timeout(), Duration::from_secs(1));
        assert_eq!(config.session_key_prefix, "app");
        assert_eq!(config.auto_biometric_delay(), Duration::from_millis(600));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("lock.json");

        let config = LockConfig::compliance();
        config.save(&path).unwrap();

        assert_eq!(LockConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_load_missing_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = LockConfig::load(&dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, LockError::Config(_)));
    }
}
