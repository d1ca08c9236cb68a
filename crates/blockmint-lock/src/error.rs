//! Error types for the app lock

use thiserror::Error;

/// Result type alias for app lock operations
pub type Result<T> = std::result::Result<T, LockError>;

/// Errors surfaced at the controller boundary
///
/// Remote failures during PIN verification never show up here: they are
/// folded into the failed-attempt path and reported through
/// [`crate::PinOutcome`].
#[derive(Debug, Error)]
pub enum LockError {
    /// No user identity has been mounted yet
    #[error("No user mounted - call mount() first")]
    NoUser,

    /// PIN has the wrong length or contains non-digits
    #[error("PIN must be exactly {0} digits")]
    InvalidPinFormat(usize),

    /// Another authentication attempt is still pending
    #[error("Authentication already in progress")]
    AuthInProgress,

    /// PIN entry refused until the lockout expires
    #[error("Too many failed attempts - locked for {0} more seconds")]
    LockedOut(u64),

    /// The operation needs the app to be locked
    #[error("App is not locked")]
    NotLocked,

    /// The operation needs the app to be unlocked
    #[error("App is locked")]
    NotUnlocked,

    /// The operation needs a PIN setup session
    #[error("No PIN setup in progress")]
    NotSettingUp,

    /// The PIN gate is disabled for this user
    #[error("PIN lock is not enabled")]
    PinNotEnabled,

    /// Remote security API failure
    #[error("Security API error: {0}")]
    Api(#[from] ApiError),

    /// Session flag storage failure
    #[error("Session store error: {0}")]
    SessionStore(#[from] SessionStoreError),

    /// Configuration could not be loaded or saved
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Errors returned by a [`crate::SecurityApi`] implementation
#[derive(Debug, Error)]
pub enum ApiError {
    /// Request never produced a response
    #[error("Request to {url} failed: {error}")]
    Transport { url: String, error: String },

    /// Server answered with a non-success status
    #[error("Request to {url} returned status {status}")]
    Status { url: String, status: u16 },

    /// Response body did not match the expected shape
    #[error("Invalid response from {url}: {error}")]
    Decode { url: String, error: String },

    /// Server accepted the request but reported failure
    #[error("Server rejected request: {0}")]
    Rejected(String),
}

/// Errors from a [`crate::SessionStore`]
#[derive(Debug, Error)]
pub enum SessionStoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
