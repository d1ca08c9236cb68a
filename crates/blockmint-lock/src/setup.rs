//! PIN format and the two-stage setup session
//!
//! The setup pad collects the new PIN twice. Nothing leaves the device
//! until both entries match.

use zeroize::Zeroizing;

use crate::error::{LockError, Result};

/// Canonical PIN length
pub const PIN_LENGTH: usize = 6;

/// Check that `pin` is exactly [`PIN_LENGTH`] ASCII digits
pub fn validate_pin(pin: &str) -> Result<()> {
    if pin.len() != PIN_LENGTH || !pin.bytes().all(|b| b.is_ascii_digit()) {
        return Err(LockError::InvalidPinFormat(PIN_LENGTH));
    }
    Ok(())
}

/// Which entry the pad is collecting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupStage {
    Enter,
    Confirm,
}

/// A key on the PIN pad
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinKey {
    Digit(u8),
    Delete,
}

/// Result of feeding a key to the session
#[derive(Debug, PartialEq, Eq)]
pub enum SetupProgress {
    /// Still collecting digits
    Incomplete,
    /// First entry complete, now collecting the confirmation
    AwaitingConfirm,
    /// Confirmation differed; the confirm buffer was cleared
    Mismatch,
    /// Both entries match
    Confirmed(Zeroizing<String>),
}

/// Transient state of a PIN setup
pub struct PinSetupSession {
    stage: SetupStage,
    first_entry: Zeroizing<String>,
    confirm_entry: Zeroizing<String>,
}

impl PinSetupSession {
    pub fn new() -> Self {
        Self {
            stage: SetupStage::Enter,
            first_entry: Zeroizing::new(String::with_capacity(PIN_LENGTH)),
            confirm_entry: Zeroizing::new(String::with_capacity(PIN_LENGTH)),
        }
    }

    pub fn stage(&self) -> SetupStage {
        self.stage
    }

    /// Digits in the buffer currently being typed
    pub fn entered_len(&self) -> usize {
        match self.stage {
            SetupStage::Enter => self.first_entry.len(),
            SetupStage::Confirm => self.confirm_entry.len(),
        }
    }

    /// Start over from the first entry
    pub fn reset(&mut self) {
        self.stage = SetupStage::Enter;
        self.first_entry.clear();
        self.confirm_entry.clear();
    }

    /// Discard the digits of the entry currently being typed
    pub fn clear_current(&mut self) {
        self.current_buffer().clear();
    }

    /// Feed one key press
    pub fn press(&mut self, key: PinKey) -> SetupProgress {
        let digit = match key {
            PinKey::Delete => {
                self.current_buffer().pop();
                return SetupProgress::Incomplete;
            }
            PinKey::Digit(d) if d <= 9 => char::from(b'0' + d),
            PinKey::Digit(_) => return SetupProgress::Incomplete,
        };

        let buffer = self.current_buffer();
        if buffer.len() >= PIN_LENGTH {
            return SetupProgress::Incomplete;
        }
        buffer.push(digit);
        if buffer.len() < PIN_LENGTH {
            return SetupProgress::Incomplete;
        }

        match self.stage {
            SetupStage::Enter => {
                self.stage = SetupStage::Confirm;
                SetupProgress::AwaitingConfirm
            }
            SetupStage::Confirm if *self.confirm_entry == *self.first_entry => {
                SetupProgress::Confirmed(self.first_entry.clone())
            }
            SetupStage::Confirm => {
                self.confirm_entry.clear();
                SetupProgress::Mismatch
            }
        }
    }

    fn current_buffer(&mut self) -> &mut String {
        match self.stage {
            SetupStage::Enter => &mut self.first_entry,
            SetupStage::Confirm => &mut self.confirm_entry,
        }
    }
}

impl Default for PinSetupSession {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PinSetupSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PinSetupSession")
            .field("stage", &self.stage)
            .field("entered", &self.entered_len())
            .finish()
    }
}
