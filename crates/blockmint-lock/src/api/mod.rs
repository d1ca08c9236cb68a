//! Remote security API consumed by the lock controller
//!
//! The server owns the PIN hash and the settings record. The controller
//! never writes local state before the server has confirmed a mutation.

mod http;

pub use http::{ApiConfig, HttpSecurityApi};

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::settings::RemoteSecuritySettings;

/// Identity the security settings are keyed by
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Security settings service
#[async_trait]
pub trait SecurityApi: Send + Sync {
    /// Fetch the settings record for a user
    async fn fetch_settings(&self, user: &UserId) -> Result<RemoteSecuritySettings, ApiError>;

    /// Check a PIN against the stored hash
    ///
    /// `Ok(false)` means the server answered and the PIN is wrong.
    async fn verify_pin(&self, user: &UserId, pin: &str) -> Result<bool, ApiError>;

    /// Store a new PIN, enabling the PIN gate
    async fn set_pin(&self, user: &UserId, pin: &str) -> Result<(), ApiError>;

    /// Remove the PIN, disabling the PIN gate
    async fn disable_pin(&self, user: &UserId) -> Result<(), ApiError>;

    /// Toggle biometric unlock
    async fn set_biometric(&self, user: &UserId, enabled: bool) -> Result<(), ApiError>;
}
