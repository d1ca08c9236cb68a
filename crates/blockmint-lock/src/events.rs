//! Events emitted by the lock controller
//!
//! The PIN-pad view consumes these to render phase changes and toasts.

use tokio::sync::mpsc;

use crate::state::LockPhase;

/// Toast styling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToastSeverity {
    Info,
    Destructive,
}

/// User-facing notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toast {
    pub title: String,
    pub description: String,
    pub severity: ToastSeverity,
}

impl Toast {
    pub fn info(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            severity: ToastSeverity::Info,
        }
    }

    pub fn destructive(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            severity: ToastSeverity::Destructive,
        }
    }
}

/// Controller events
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockEvent {
    /// Phase transition
    PhaseChanged { from: LockPhase, to: LockPhase },
    /// Notification to show
    Toast(Toast),
    /// Biometric prompt is about to be shown
    BiometricPrompt,
    /// PIN setup persisted and settings refreshed
    PinSetupCompleted,
}

/// Sending half of the event channel
///
/// A dropped receiver just means nobody is rendering; sends are best-effort.
#[derive(Debug, Clone)]
pub(crate) struct EventSender {
    sender: mpsc::UnboundedSender<LockEvent>,
}

impl EventSender {
    pub(crate) fn channel() -> (Self, mpsc::UnboundedReceiver<LockEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    pub(crate) fn emit(&self, event: LockEvent) {
        if self.sender.send(event).is_err() {
            tracing::trace!("Lock event dropped, no receiver");
        }
    }

    pub(crate) fn toast(&self, toast: Toast) {
        self.emit(LockEvent::Toast(toast));
    }
}
