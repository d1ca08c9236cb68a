//! Host lifecycle signals and user activity tracking

use std::time::Duration;

use tokio::time::Instant;

/// Raw lifecycle notification from the host environment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostEvent {
    /// Document visibility changed (web view)
    VisibilityChanged { hidden: bool },
    /// Native app state changed
    AppStateChanged { is_active: bool },
}

/// Controller input derived from any [`HostEvent`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleSignal {
    Background,
    Foreground,
}

impl From<HostEvent> for LifecycleSignal {
    fn from(event: HostEvent) -> Self {
        let backgrounded = match event {
            HostEvent::VisibilityChanged { hidden } => hidden,
            HostEvent::AppStateChanged { is_active } => !is_active,
        };

        if backgrounded {
            LifecycleSignal::Background
        } else {
            LifecycleSignal::Foreground
        }
    }
}

/// Tracks the last user interaction
#[derive(Clone, Debug)]
pub struct ActivityTracker {
    /// Last activity timestamp
    last_activity: Instant,
}

impl ActivityTracker {
    pub fn new() -> Self {
        Self {
            last_activity: Instant::now(),
        }
    }

    /// Record activity (touch, click, keypress, scroll)
    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    /// Time since last activity
    pub fn idle_time(&self) -> Duration {
        self.last_activity.elapsed()
    }

    /// Whether the idle time has reached `timeout`
    pub fn is_idle_for(&self, timeout: Duration) -> bool {
        self.idle_time() >= timeout
    }
}

impl Default for ActivityTracker {
    fn default() -> Self {
        Self::new()
    }
}
