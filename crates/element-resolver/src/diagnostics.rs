//! Post-mortem capture for unresolvable targets.

use std::path::PathBuf;

use surface_adapter::Surface;
use tracing::{info, warn};

/// Where and whether to persist debug snapshots.
#[derive(Clone, Debug, Default)]
pub struct Diagnostics {
    dir: Option<PathBuf>,
}

impl Diagnostics {
    pub fn disabled() -> Self {
        Self { dir: None }
    }

    pub fn into_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: Some(dir.into()),
        }
    }

    /// Capture a rendered snapshot and a dump of every clickable element.
    /// Best-effort: capture failures are logged, never surfaced.
    pub async fn capture(&self, surface: &dyn Surface, target: &str) {
        match surface.clickable_inventory().await {
            Ok(inventory) => {
                let dump = serde_json::to_string(&inventory).unwrap_or_default();
                info!(target, clickables = %dump, "clickable elements at resolution failure");
            }
            Err(err) => warn!(target, error = %err, "clickable dump failed"),
        }

        let Some(dir) = &self.dir else { return };
        let image = match surface.screenshot().await {
            Ok(image) => image,
            Err(err) => {
                warn!(target, error = %err, "debug screenshot failed");
                return;
            }
        };
        let slug: String = target
            .chars()
            .map(|c| if c.is_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
            .collect();
        let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%S%.3f");
        let path = dir.join(format!("{stamp}-{slug}.png"));
        if let Err(err) = tokio::fs::create_dir_all(dir).await {
            warn!(error = %err, "could not create diagnostics dir");
            return;
        }
        match tokio::fs::write(&path, image).await {
            Ok(()) => info!(target, path = %path.display(), "debug snapshot saved"),
            Err(err) => warn!(error = %err, "could not write debug snapshot"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use surface_adapter::mock::MockSurface;

    #[tokio::test]
    async fn capture_writes_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let diagnostics = Diagnostics::into_dir(dir.path());
        let surface = MockSurface::lenient();
        diagnostics.capture(&surface, "Confirma Endereço").await;

        let mut entries = tokio::fs::read_dir(dir.path()).await.unwrap();
        let entry = entries.next_entry().await.unwrap().expect("one snapshot");
        let name = entry.file_name().into_string().unwrap();
        assert!(name.ends_with("-confirma-endere-o.png") || name.ends_with(".png"));
    }

    #[tokio::test]
    async fn disabled_capture_is_silent() {
        let diagnostics = Diagnostics::disabled();
        let surface = MockSurface::lenient();
        // Nothing to assert beyond "does not panic / does not error".
        diagnostics.capture(&surface, "Enviar").await;
    }
}
