//! Guard tuning knobs.

use std::time::Duration;

use action_tempo::DelayRange;
use serde::{Deserialize, Serialize};

/// Fallback latitude written into coordinate fields when the map cannot be
/// confirmed interactively (central Recife).
pub const FALLBACK_COORDINATE: &str = "-8.047562";

/// Title fragments that mark a challenge page as still active.
pub fn default_challenge_phrases() -> Vec<String> {
    vec![
        "just a moment".to_string(),
        "checking your browser".to_string(),
    ]
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GuardConfig {
    /// Randomized pause between title polls.
    pub poll: DelayRange,
    /// Pause after a title read fails mid-challenge.
    pub error_backoff_ms: u64,
    /// Challenge phrases, matched case-insensitively against the title.
    #[serde(default = "default_challenge_phrases")]
    pub challenge_phrases: Vec<String>,
    /// Short pauses inside the humanizer.
    pub micro_pause: DelayRange,
    /// Longer settle pause at the end of each humanizer cycle.
    pub settle_pause: DelayRange,
    /// Wait after a dialog dismissal before the workflow continues.
    pub dismiss_settle_ms: u64,
    /// Budget for the tier-three full reload.
    pub reload_timeout_ms: u64,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            poll: DelayRange::new(3000, 5000),
            error_backoff_ms: 2000,
            challenge_phrases: default_challenge_phrases(),
            micro_pause: DelayRange::new(100, 300),
            settle_pause: DelayRange::new(500, 1500),
            dismiss_settle_ms: 2000,
            reload_timeout_ms: 30_000,
        }
    }
}

impl GuardConfig {
    /// Zero-wait profile for scripted surfaces in tests.
    pub fn instant() -> Self {
        let zero = DelayRange::new(0, 0);
        Self {
            poll: DelayRange::new(1, 2),
            error_backoff_ms: 1,
            micro_pause: zero,
            settle_pause: zero,
            dismiss_settle_ms: 0,
            reload_timeout_ms: 100,
            ..Self::default()
        }
    }

    pub fn reload_timeout(&self) -> Duration {
        Duration::from_millis(self.reload_timeout_ms)
    }
}
