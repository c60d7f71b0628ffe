//! Round-robin resolution loop over the strategy chain.

use std::time::Duration;

use surface_adapter::Surface;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info, warn};

use crate::diagnostics::Diagnostics;
use crate::strategies::ResolutionStrategy;

/// Multi-strategy element resolver.
///
/// The remote UI offers no stable identifiers for many controls, so a single
/// selector scheme cannot be trusted: each strategy gets a bounded shot, the
/// whole chain repeats in rounds, and only the global deadline ends the
/// search. A failed strategy never half-triggers navigation: activation only
/// happens on a positive match.
pub struct ElementResolver {
    strategy_timeout: Duration,
    inter_strategy_pause: Duration,
    round_pause: Duration,
    diagnostics: Diagnostics,
}

impl Default for ElementResolver {
    fn default() -> Self {
        Self {
            strategy_timeout: Duration::from_secs(3),
            inter_strategy_pause: Duration::from_millis(500),
            round_pause: Duration::from_secs(1),
            diagnostics: Diagnostics::disabled(),
        }
    }
}

impl ElementResolver {
    pub fn new(diagnostics: Diagnostics) -> Self {
        Self {
            diagnostics,
            ..Self::default()
        }
    }

    /// Tight pacing for tests and for surfaces known to respond instantly.
    pub fn with_pacing(
        mut self,
        strategy_timeout: Duration,
        inter_strategy_pause: Duration,
        round_pause: Duration,
    ) -> Self {
        self.strategy_timeout = strategy_timeout;
        self.inter_strategy_pause = inter_strategy_pause;
        self.round_pause = round_pause;
        self
    }

    /// Locate an element carrying `target` and activate it.
    ///
    /// Returns true on activation; false only once `max_wait` has fully
    /// elapsed with no strategy succeeding. Strategy errors (including
    /// per-strategy timeouts) are logged and fall through to the next
    /// strategy. A dying surface shows up later, through the health checks
    /// around the step that needed this element.
    pub async fn locate_and_activate(
        &self,
        surface: &dyn Surface,
        target: &str,
        max_wait: Duration,
    ) -> bool {
        let started = Instant::now();
        debug!(target, max_wait_ms = max_wait.as_millis() as u64, "resolving element");

        while started.elapsed() < max_wait {
            for strategy in ResolutionStrategy::fallback_chain() {
                match timeout(self.strategy_timeout, strategy.attempt(surface, target)).await {
                    Ok(Ok(true)) => {
                        info!(target, strategy = strategy.name(), "element activated");
                        return true;
                    }
                    Ok(Ok(false)) => {
                        debug!(target, strategy = strategy.name(), "no match");
                    }
                    Ok(Err(err)) => {
                        warn!(target, strategy = strategy.name(), error = %err, "strategy failed");
                    }
                    Err(_) => {
                        debug!(target, strategy = strategy.name(), "strategy timed out");
                    }
                }
                sleep(self.inter_strategy_pause).await;
            }
            debug!(
                target,
                elapsed_s = started.elapsed().as_secs(),
                "round exhausted, retrying"
            );
            sleep(self.round_pause).await;
        }

        warn!(
            target,
            waited_s = started.elapsed().as_secs(),
            "no strategy located the target"
        );
        self.diagnostics.capture(surface, target).await;
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use surface_adapter::mock::MockSurface;

    fn fast_resolver() -> ElementResolver {
        ElementResolver::default().with_pacing(
            Duration::from_millis(50),
            Duration::from_millis(5),
            Duration::from_millis(10),
        )
    }

    #[tokio::test]
    async fn exact_text_resolves_first_round() {
        let surface = MockSurface::new().with_texts(["Entrar"]);
        let resolver = fast_resolver();
        assert!(
            resolver
                .locate_and_activate(&surface, "Entrar", Duration::from_millis(500))
                .await
        );
        assert_eq!(surface.recorded_clicks(), vec!["Entrar".to_string()]);
    }

    #[tokio::test]
    async fn substring_presence_falls_through_to_partial_match() {
        // Target appears only inside a longer node text: the native and
        // exact strategies miss, containment hits.
        let surface =
            MockSurface::new().with_texts(["Clique em Buscar Imóvel para validar"]);
        let resolver = fast_resolver();
        assert!(
            resolver
                .locate_and_activate(&surface, "Buscar Imóvel", Duration::from_millis(500))
                .await
        );
    }

    #[tokio::test]
    async fn absent_target_fails_only_after_full_deadline() {
        let surface = MockSurface::new();
        let resolver = fast_resolver();
        let max_wait = Duration::from_millis(300);
        let started = Instant::now();
        let found = resolver
            .locate_and_activate(&surface, "Inexistente", max_wait)
            .await;
        let elapsed = started.elapsed();
        assert!(!found);
        assert!(
            elapsed >= max_wait,
            "returned after {elapsed:?}, before the {max_wait:?} deadline"
        );
        assert!(elapsed < max_wait + Duration::from_millis(250));
    }

    #[tokio::test]
    async fn erroring_surface_keeps_cycling_until_deadline() {
        let surface = MockSurface::new();
        surface.poison("Execution context was destroyed");
        let resolver = fast_resolver();
        let found = resolver
            .locate_and_activate(&surface, "Avançar", Duration::from_millis(120))
            .await;
        assert!(!found);
    }
}
