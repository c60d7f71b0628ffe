//! Anti-bot interstitial handling.
//!
//! Challenge pages are expected, not exceptional. The guard polls the
//! surface title while performing human-like micro-interactions, and when a
//! challenge refuses to clear it degrades explicitly instead of failing:
//! dismiss the dialog, fall back to fixed coordinates, or reload and let the
//! outer retry logic take over.

mod config;
mod recovery;

use std::time::Duration;

use rand::Rng;
use surface_adapter::Surface;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

pub use config::{default_challenge_phrases, GuardConfig, FALLBACK_COORDINATE};
pub use recovery::RecoveryOutcome;

/// Detects and waits out challenge interstitials.
pub struct InterstitialGuard {
    config: GuardConfig,
}

impl Default for InterstitialGuard {
    fn default() -> Self {
        Self::new(GuardConfig::default())
    }
}

impl InterstitialGuard {
    pub fn new(config: GuardConfig) -> Self {
        Self { config }
    }

    fn is_challenge_title(&self, title: &str) -> bool {
        let lower = title.to_lowercase();
        self.config
            .challenge_phrases
            .iter()
            .any(|phrase| lower.contains(phrase.as_str()))
    }

    /// Poll the title until the challenge clears or `timeout` elapses.
    ///
    /// The interstitial counts as active while the title is empty, unchanged
    /// since the last observation, or matches a challenge phrase; it counts
    /// as cleared the first time all three stop holding.
    pub async fn resolve_interstitial(&self, surface: &dyn Surface, timeout: Duration) -> bool {
        info!(timeout_s = timeout.as_secs(), "waiting out interstitial");
        let started = Instant::now();
        let mut last_title = String::new();

        while started.elapsed() < timeout {
            match surface.title().await {
                Ok(current) => {
                    if !current.is_empty()
                        && current != last_title
                        && !self.is_challenge_title(&current)
                    {
                        info!(title = %current, "interstitial cleared");
                        return true;
                    }
                    debug!(title = %current, "challenge still active");
                    last_title = current;

                    self.humanize(surface).await;
                    sleep(self.config.poll.sample()).await;
                }
                Err(err) => {
                    warn!(error = %err, "title read failed during challenge wait");
                    sleep(Duration::from_millis(self.config.error_backoff_ms)).await;
                }
            }
        }

        info!("interstitial did not clear before the timeout");
        false
    }

    /// Tiered fallback once the challenge refused to clear.
    pub async fn recover(&self, surface: &dyn Surface) -> RecoveryOutcome {
        recovery::run_recovery(&self.config, surface).await
    }

    /// Cosmetic activity while the challenge runs its checks: two short
    /// mouse movements inside the viewport, a smooth scroll, randomized
    /// pauses. Context-loss here is swallowed, never escalated; the page
    /// may navigate out from under us at any moment and that is fine.
    async fn humanize(&self, surface: &dyn Surface) {
        let result: Result<(), surface_adapter::SurfaceError> = async {
            let (width, height) = surface.viewport();
            let (x, y) = {
                let mut rng = rand::thread_rng();
                (
                    100.0 + rng.gen::<f64>() * (width.saturating_sub(200)) as f64,
                    100.0 + rng.gen::<f64>() * (height.saturating_sub(200)) as f64,
                )
            };

            surface.move_mouse(x, y).await?;
            sleep(self.config.micro_pause.sample()).await;
            surface.move_mouse(x + 50.0, y + 30.0).await?;
            sleep(self.config.micro_pause.sample()).await;

            let offset = 100.0 + rand::thread_rng().gen::<f64>() * 200.0;
            surface.scroll_by(offset).await?;
            sleep(self.config.settle_pause.sample()).await;
            Ok(())
        }
        .await;

        if let Err(err) = result {
            debug!(error = %err, "humanizer interrupted, context changed");
        }
    }
}
