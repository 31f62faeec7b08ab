use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;

/// Suppresses click handling that follows a processed click too closely.
///
/// One guard is shared by every click path of a recorder. The check and the
/// update happen under one lock, so concurrent callers cannot both pass.
#[derive(Debug)]
pub struct DebounceGuard {
    window: Duration,
    last_click: Mutex<Option<Instant>>,
}

impl DebounceGuard {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_click: Mutex::new(None),
        }
    }

    /// Returns `false` without touching state when `now` falls inside the
    /// window of the last processed click; otherwise records `now`.
    pub fn should_process(&self, now: Instant) -> bool {
        let mut last = self.last_click.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(prev) = *last {
            if now.saturating_duration_since(prev) < self.window {
                return false;
            }
        }
        *last = Some(now);
        true
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}
