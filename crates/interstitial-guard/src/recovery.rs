//! Three-tier recovery for a challenge that never cleared.

use std::time::Duration;

use surface_adapter::{Key, Surface};
use tracing::{info, warn};

use crate::config::{GuardConfig, FALLBACK_COORDINATE};

/// Common close controls on blocking dialogs, in the order they are tried.
const CLOSE_SELECTORS: [&str; 6] = [
    r#"button[aria-label="Close"]"#,
    ".close",
    r#"[data-dismiss="modal"]"#,
    ".modal-close",
    ".btn-close",
    ".modal-header button",
];

/// Dismissal texts tried after the selector list.
const CLOSE_TEXTS: [&str; 4] = ["Cancelar", "Fechar", "Voltar", "Close"];

/// Fields a map page exposes for manual coordinate entry.
const COORDINATE_SELECTORS: [&str; 6] = [
    r#"input[name="latitude"]"#,
    r#"input[name="longitude"]"#,
    r#"input[placeholder*="coord"]"#,
    r#"input[id*="coord"]"#,
    "#latitude",
    "#longitude",
];

/// Outcome of the recovery ladder, first success wins.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RecoveryOutcome {
    /// A blocking dialog was dismissed; the caller may continue with the
    /// step considered intentionally skipped.
    DialogDismissed,
    /// Known coordinate inputs were populated with the fallback location;
    /// degraded but continuable.
    DefaultCoordinates,
    /// Only a full reload was left; outright failure, recovery is up to the
    /// caller's retry logic.
    ReloadFailed,
}

pub(crate) async fn run_recovery(config: &GuardConfig, surface: &dyn Surface) -> RecoveryOutcome {
    if try_dismiss_dialog(config, surface).await {
        info!("blocking dialog dismissed, continuing without this step");
        return RecoveryOutcome::DialogDismissed;
    }

    if try_default_coordinates(surface).await {
        info!("fallback coordinates applied");
        return RecoveryOutcome::DefaultCoordinates;
    }

    info!("reloading the surface as a last resort");
    if let Err(err) = surface.reload(config.reload_timeout()).await {
        warn!(error = %err, "reload during recovery failed");
    }
    RecoveryOutcome::ReloadFailed
}

async fn try_dismiss_dialog(config: &GuardConfig, surface: &dyn Surface) -> bool {
    for selector in CLOSE_SELECTORS {
        match surface.element_exists(selector).await {
            Ok(true) => {
                if surface.click_css(selector).await.is_ok() {
                    tokio::time::sleep(Duration::from_millis(config.dismiss_settle_ms)).await;
                    return true;
                }
            }
            Ok(false) => {}
            Err(err) => {
                warn!(selector, error = %err, "close-control probe failed");
            }
        }
    }
    for text in CLOSE_TEXTS {
        if matches!(surface.click_text(text).await, Ok(true)) {
            tokio::time::sleep(Duration::from_millis(config.dismiss_settle_ms)).await;
            return true;
        }
    }
    // Best effort only: an Escape with no visible close control is not
    // treated as a confirmed dismissal.
    let _ = surface.press_key(Key::Escape).await;
    false
}

async fn try_default_coordinates(surface: &dyn Surface) -> bool {
    let mut filled_any = false;
    for selector in COORDINATE_SELECTORS {
        match surface.set_field_value(selector, FALLBACK_COORDINATE).await {
            Ok(true) => filled_any = true,
            Ok(false) => {}
            Err(err) => warn!(selector, error = %err, "coordinate fill failed"),
        }
    }
    filled_any
}

#[cfg(test)]
mod tests {
    use super::*;
    use surface_adapter::mock::MockSurface;

    #[tokio::test]
    async fn dismissal_wins_over_coordinates() {
        let surface = MockSurface::new().with_selectors([".close", "#latitude"]);
        let outcome = run_recovery(&GuardConfig::instant(), &surface).await;
        assert_eq!(outcome, RecoveryOutcome::DialogDismissed);
        assert_eq!(surface.recorded_clicks(), vec![".close".to_string()]);
        assert!(surface.field_value("#latitude").is_none());
    }

    #[tokio::test]
    async fn coordinates_win_over_reload() {
        let surface = MockSurface::new().with_selectors(["#latitude", "#longitude"]);
        let outcome = run_recovery(&GuardConfig::instant(), &surface).await;
        assert_eq!(outcome, RecoveryOutcome::DefaultCoordinates);
        assert_eq!(
            surface.field_value("#latitude").as_deref(),
            Some(FALLBACK_COORDINATE)
        );
        assert_eq!(surface.reload_count(), 0);
    }

    #[tokio::test]
    async fn bare_surface_falls_through_to_reload() {
        let surface = MockSurface::new();
        let outcome = run_recovery(&GuardConfig::instant(), &surface).await;
        assert_eq!(outcome, RecoveryOutcome::ReloadFailed);
        assert_eq!(surface.reload_count(), 1);
        // Escape was attempted on the way down.
        assert_eq!(surface.pressed_keys(), vec![Key::Escape]);
    }

    #[tokio::test]
    async fn text_labelled_close_counts_as_dismissal() {
        let surface = MockSurface::new().with_texts(["Fechar"]);
        let outcome = run_recovery(&GuardConfig::instant(), &surface).await;
        assert_eq!(outcome, RecoveryOutcome::DialogDismissed);
    }
}
