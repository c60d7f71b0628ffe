//! Humanized timing model.
//!
//! Produces randomized delay values for keystrokes and between actions so the
//! driven session resembles manual interaction rhythm. All ranges are data;
//! sampling is the only behavior here.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Inclusive millisecond range a delay is sampled from.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct DelayRange {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl DelayRange {
    pub const fn new(min_ms: u64, max_ms: u64) -> Self {
        Self { min_ms, max_ms }
    }

    /// Sample a uniformly distributed delay from the range.
    pub fn sample(&self) -> Duration {
        let (lo, hi) = if self.min_ms <= self.max_ms {
            (self.min_ms, self.max_ms)
        } else {
            (self.max_ms, self.min_ms)
        };
        let ms = rand::thread_rng().gen_range(lo..=hi);
        Duration::from_millis(ms)
    }
}

/// Named keystroke cadence profiles.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypingSpeed {
    Fast,
    Normal,
    Slow,
}

/// The full tempo plan for a workflow run: per-action pauses, typing
/// cadences, and the special long waits around page loads and submissions.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TempoPlan {
    pub action_delay: DelayRange,
    pub typing_fast: DelayRange,
    pub typing_normal: DelayRange,
    pub typing_slow: DelayRange,
    pub page_load: DelayRange,
    pub important_click: DelayRange,
    pub final_submit: DelayRange,
}

impl Default for TempoPlan {
    fn default() -> Self {
        Self {
            action_delay: DelayRange::new(100, 300),
            typing_fast: DelayRange::new(10, 25),
            typing_normal: DelayRange::new(15, 40),
            typing_slow: DelayRange::new(30, 150),
            page_load: DelayRange::new(2000, 3000),
            important_click: DelayRange::new(300, 800),
            final_submit: DelayRange::new(15000, 20000),
        }
    }
}

impl TempoPlan {
    /// A zero-delay plan. Used by tests that drive scripted surfaces where
    /// human pacing would only slow the suite down.
    pub fn instant() -> Self {
        let zero = DelayRange::new(0, 0);
        Self {
            action_delay: zero,
            typing_fast: zero,
            typing_normal: zero,
            typing_slow: zero,
            page_load: zero,
            important_click: zero,
            final_submit: zero,
        }
    }

    pub fn typing(&self, speed: TypingSpeed) -> DelayRange {
        match speed {
            TypingSpeed::Fast => self.typing_fast,
            TypingSpeed::Normal => self.typing_normal,
            TypingSpeed::Slow => self.typing_slow,
        }
    }

    /// Sampled pause between two ordinary actions.
    pub fn action_pause(&self) -> Duration {
        self.action_delay.sample()
    }

    /// Sampled per-character delay for the given cadence.
    pub fn keystroke(&self, speed: TypingSpeed) -> Duration {
        self.typing(speed).sample()
    }
}
