//! The browsing-surface seam.
//!
//! `Surface` is the one abstraction the workflow core acts through: a single
//! browser context/tab with the operations the step sequencer, resolver and
//! interstitial guard need. The CDP-backed implementation lives in
//! [`crate::chromium`]; scripted doubles live behind the `mock` feature.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use viabot_core_types::SurfaceId;

use crate::errors::SurfaceError;

/// How long to wait after a navigation commits.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Readiness {
    /// DOM parsed; scripts may still be loading.
    DomReady,
    /// Navigation settled and the network mostly quiet.
    NetworkMostlyIdle,
}

/// Keyboard keys the workflow dispatches.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Key {
    Enter,
    Tab,
    Escape,
    ArrowDown,
}

impl Key {
    /// (key, code, windows virtual key code, produced text)
    pub fn descriptor(&self) -> (&'static str, &'static str, i64, Option<&'static str>) {
        match self {
            Key::Enter => ("Enter", "Enter", 13, Some("\r")),
            Key::Tab => ("Tab", "Tab", 9, None),
            Key::Escape => ("Escape", "Escape", 27, None),
            Key::ArrowDown => ("ArrowDown", "ArrowDown", 40, None),
        }
    }
}

/// One clickable element as reported by the surface: enough to run the
/// similarity strategy and to produce a post-mortem dump.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ClickableElement {
    pub tag: String,
    pub text: String,
    pub value: String,
    pub id: String,
    pub class: String,
}

impl ClickableElement {
    /// Visible caption: text content, falling back to the value attribute.
    pub fn caption(&self) -> &str {
        if self.text.trim().is_empty() {
            &self.value
        } else {
            &self.text
        }
    }
}

/// A single browsing context/tab.
///
/// Every method that touches the remote surface is fallible; callers decide
/// which failures to swallow. Implementations must never leave the surface
/// half-interacted: a failed lookup must not have clicked anything.
#[async_trait]
pub trait Surface: Send + Sync {
    fn id(&self) -> SurfaceId;

    /// Whether this surface is known to be closed. Cheap, non-blocking.
    fn is_closed(&self) -> bool;

    /// Viewport size in CSS pixels.
    fn viewport(&self) -> (u32, u32);

    /// Navigate and wait for the requested readiness.
    async fn navigate(
        &self,
        url: &str,
        readiness: Readiness,
        timeout: Duration,
    ) -> Result<(), SurfaceError>;

    async fn title(&self) -> Result<String, SurfaceError>;

    async fn url(&self) -> Result<String, SurfaceError>;

    /// Evaluate a trivial readiness probe. Fails when the execution context
    /// is gone even though the surface object still exists.
    async fn probe(&self) -> Result<(), SurfaceError>;

    /// Wait until a CSS selector matches, polling up to `timeout`.
    async fn wait_for_selector(&self, css: &str, timeout: Duration) -> Result<(), SurfaceError>;

    /// Click the first element matching a CSS selector (real mouse events at
    /// the element center).
    async fn click_css(&self, css: &str) -> Result<(), SurfaceError>;

    /// Focus the first element matching a CSS selector.
    async fn focus_css(&self, css: &str) -> Result<(), SurfaceError>;

    /// Strategy 1: the browser's native text search. Clicks the first hit.
    async fn click_text(&self, text: &str) -> Result<bool, SurfaceError>;

    /// Strategy 2: structural query for a node whose text equals `text`.
    async fn click_exact_text(&self, text: &str) -> Result<bool, SurfaceError>;

    /// Strategy 3: structural query relaxed to substring containment.
    async fn click_partial_text(&self, text: &str) -> Result<bool, SurfaceError>;

    /// Every currently clickable element (buttons, submit inputs, anchors,
    /// onclick carriers), in DOM order.
    async fn clickable_inventory(&self) -> Result<Vec<ClickableElement>, SurfaceError>;

    /// Click the n-th element of the clickable inventory.
    async fn click_clickable(&self, index: usize) -> Result<bool, SurfaceError>;

    /// Full text of the first node containing `needle`, if any.
    async fn text_containing(&self, needle: &str) -> Result<Option<String>, SurfaceError>;

    /// The rendered body text.
    async fn body_text(&self) -> Result<String, SurfaceError>;

    /// The full document markup.
    async fn content(&self) -> Result<String, SurfaceError>;

    async fn element_exists(&self, css: &str) -> Result<bool, SurfaceError>;

    /// Insert text at the current focus (one keystroke payload).
    async fn insert_text(&self, text: &str) -> Result<(), SurfaceError>;

    async fn press_key(&self, key: Key) -> Result<(), SurfaceError>;

    /// Select the option whose label contains `label` and dispatch a change
    /// notification. Returns false when no option matches.
    async fn select_option_containing(&self, css: &str, label: &str)
        -> Result<bool, SurfaceError>;

    /// Set a field's value directly, dispatching input/change events.
    async fn set_field_value(&self, css: &str, value: &str) -> Result<bool, SurfaceError>;

    /// Fill the n-th plain text input on the surface.
    async fn fill_text_input_at(&self, index: usize, value: &str) -> Result<bool, SurfaceError>;

    async fn move_mouse(&self, x: f64, y: f64) -> Result<(), SurfaceError>;

    /// Smooth-scroll the surface by a vertical offset.
    async fn scroll_by(&self, dy: f64) -> Result<(), SurfaceError>;

    async fn reload(&self, timeout: Duration) -> Result<(), SurfaceError>;

    /// Full-page PNG capture.
    async fn screenshot(&self) -> Result<Vec<u8>, SurfaceError>;

    /// A4 PDF render of the surface.
    async fn print_pdf(&self) -> Result<Vec<u8>, SurfaceError>;

    async fn close(&self) -> Result<(), SurfaceError>;
}

/// One live browser instance and the surfaces it owns.
#[async_trait]
pub trait BrowserSession: Send + Sync {
    /// Open the entry surface, configure it (agent, headers, filters) and
    /// navigate it.
    async fn open_surface(
        &self,
        url: &str,
        readiness: Readiness,
        timeout: Duration,
    ) -> Result<Arc<dyn Surface>, SurfaceError>;

    /// All currently open surfaces, in creation order.
    async fn surfaces(&self) -> Result<Vec<Arc<dyn Surface>>, SurfaceError>;

    async fn surface_count(&self) -> Result<usize, SurfaceError> {
        Ok(self.surfaces().await?.len())
    }

    /// The most recently opened surface.
    async fn newest_surface(&self) -> Result<Arc<dyn Surface>, SurfaceError> {
        self.surfaces()
            .await?
            .pop()
            .ok_or_else(|| SurfaceError::Protocol("no open surfaces".into()))
    }

    /// Wait for a surface created after `baseline` was snapshotted, adopting
    /// the newest one. Falls back to the most recently opened surface when
    /// no new one shows up before the timeout. The caller snapshots the
    /// count immediately before the click that should spawn the surface, so
    /// the fallback is only reached when the spawn was reused in place.
    async fn await_surface_beyond(
        &self,
        baseline: usize,
        timeout: Duration,
    ) -> Result<Arc<dyn Surface>, SurfaceError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let count = self.surface_count().await?;
            if count > baseline {
                return self.newest_surface().await;
            }
            if tokio::time::Instant::now() >= deadline {
                return self.newest_surface().await;
            }
            tokio::time::sleep(Duration::from_millis(250)).await;
        }
    }

    /// Tear the browser down. Must be safe to call more than once.
    async fn close(&self) -> Result<(), SurfaceError>;
}

/// Launches one fresh browser instance per workflow attempt.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self, options: &LaunchOptions)
        -> Result<Arc<dyn BrowserSession>, SurfaceError>;
}

/// Browser launch configuration with the hardening profile the hostile
/// remote environment requires.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LaunchOptions {
    pub headless: bool,
    pub window_width: u32,
    pub window_height: u32,
    pub user_agent: String,
    pub accept_language: String,
    /// Abort image/stylesheet/font subresource loads.
    pub block_heavy_resources: bool,
    pub extra_args: Vec<String>,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            headless: true,
            window_width: 1920,
            window_height: 1080,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
                .to_string(),
            accept_language: "pt-BR,pt;q=0.9,en;q=0.8".to_string(),
            block_heavy_resources: true,
            extra_args: Vec::new(),
        }
    }
}

impl LaunchOptions {
    /// The fixed flag set for containerized execution: sandboxing off, GPU
    /// and extension machinery off, background throttling off, automation
    /// fingerprint reduced.
    pub fn hardened_args(&self) -> Vec<String> {
        let mut args: Vec<String> = [
            "--disable-dev-shm-usage",
            "--disable-gpu",
            "--disable-extensions",
            "--disable-background-timer-throttling",
            "--disable-backgrounding-occluded-windows",
            "--disable-renderer-backgrounding",
            "--disable-blink-features=AutomationControlled",
            "--no-first-run",
            "--no-default-browser-check",
            "--disable-popup-blocking",
            "--disable-translate",
        ]
        .into_iter()
        .map(str::to_string)
        .collect();
        args.push(format!(
            "--window-size={},{}",
            self.window_width, self.window_height
        ));
        args.extend(self.extra_args.iter().cloned());
        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hardened_args_include_window_size() {
        let opts = LaunchOptions {
            window_width: 1280,
            window_height: 720,
            ..LaunchOptions::default()
        };
        let args = opts.hardened_args();
        assert!(args.contains(&"--window-size=1280,720".to_string()));
        assert!(args.iter().any(|a| a.contains("AutomationControlled")));
    }

    #[test]
    fn caption_falls_back_to_value() {
        let el = ClickableElement {
            tag: "INPUT".into(),
            text: "  ".into(),
            value: "Avançar".into(),
            ..ClickableElement::default()
        };
        assert_eq!(el.caption(), "Avançar");
    }

    #[test]
    fn key_descriptors() {
        assert_eq!(Key::Tab.descriptor().2, 9);
        assert_eq!(Key::Enter.descriptor().3, Some("\r"));
    }
}
