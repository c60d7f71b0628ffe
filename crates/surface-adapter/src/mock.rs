//! Scripted in-memory doubles for [`Surface`], [`BrowserSession`] and
//! [`BrowserLauncher`].
//!
//! A `MockSurface` either carries an explicit script (texts present,
//! selectors present, title sequence) or runs lenient, where every lookup
//! succeeds; lenient surfaces drive the whole sequencer without enumerating
//! every portal control. Poisoning a surface makes every operation fail with
//! a chosen message so classification paths can be exercised.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use viabot_core_types::SurfaceId;

use crate::errors::SurfaceError;
use crate::surface::{
    BrowserLauncher, BrowserSession, ClickableElement, Key, LaunchOptions, Readiness, Surface,
};

#[derive(Default)]
struct MockState {
    lenient: bool,
    closed: bool,
    poison: Option<String>,
    titles: Vec<String>,
    title_cursor: usize,
    texts: Vec<String>,
    selectors: HashSet<String>,
    clickables: Vec<ClickableElement>,
    select_options: HashMap<String, Vec<String>>,
    text_input_count: usize,
    body: String,
    content: String,
    pdf_fails: bool,
    clicks: Vec<String>,
    typed: String,
    keys: Vec<Key>,
    mouse_moves: usize,
    scrolls: usize,
    reloads: usize,
    navigations: Vec<String>,
    field_values: HashMap<String, String>,
}

/// A scripted surface.
pub struct MockSurface {
    id: SurfaceId,
    viewport: (u32, u32),
    state: StdMutex<MockState>,
}

impl MockSurface {
    /// Strict surface: only scripted texts/selectors resolve.
    pub fn new() -> Self {
        Self {
            id: SurfaceId::new(),
            viewport: (1920, 1080),
            state: StdMutex::new(MockState::default()),
        }
    }

    /// Surface where every lookup and activation succeeds.
    pub fn lenient() -> Self {
        let surface = Self::new();
        surface.state.lock().unwrap().lenient = true;
        surface
    }

    pub fn with_body(self, body: impl Into<String>) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state.body = body.into();
            state.content = state.body.clone();
        }
        self
    }

    pub fn with_titles<I, S>(self, titles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.state.lock().unwrap().titles = titles.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_texts<I, S>(self, texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.state.lock().unwrap().texts = texts.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_selectors<I, S>(self, selectors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.state.lock().unwrap().selectors =
            selectors.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_clickables(self, clickables: Vec<ClickableElement>) -> Self {
        self.state.lock().unwrap().clickables = clickables;
        self
    }

    pub fn with_select_options(
        self,
        css: impl Into<String>,
        labels: Vec<String>,
    ) -> Self {
        self.state
            .lock()
            .unwrap()
            .select_options
            .insert(css.into(), labels);
        self
    }

    pub fn with_text_inputs(self, count: usize) -> Self {
        self.state.lock().unwrap().text_input_count = count;
        self
    }

    pub fn failing_pdf(self) -> Self {
        self.state.lock().unwrap().pdf_fails = true;
        self
    }

    /// Make every subsequent operation fail with this message.
    pub fn poison(&self, message: impl Into<String>) {
        self.state.lock().unwrap().poison = Some(message.into());
    }

    pub fn mark_closed(&self) {
        self.state.lock().unwrap().closed = true;
    }

    pub fn recorded_clicks(&self) -> Vec<String> {
        self.state.lock().unwrap().clicks.clone()
    }

    pub fn typed_text(&self) -> String {
        self.state.lock().unwrap().typed.clone()
    }

    pub fn pressed_keys(&self) -> Vec<Key> {
        self.state.lock().unwrap().keys.clone()
    }

    pub fn mouse_move_count(&self) -> usize {
        self.state.lock().unwrap().mouse_moves
    }

    pub fn scroll_count(&self) -> usize {
        self.state.lock().unwrap().scrolls
    }

    pub fn reload_count(&self) -> usize {
        self.state.lock().unwrap().reloads
    }

    pub fn field_value(&self, css: &str) -> Option<String> {
        self.state.lock().unwrap().field_values.get(css).cloned()
    }

    fn guard(&self) -> Result<std::sync::MutexGuard<'_, MockState>, SurfaceError> {
        let state = self.state.lock().unwrap();
        if let Some(message) = &state.poison {
            return Err(SurfaceError::Protocol(message.clone()));
        }
        if state.closed {
            return Err(SurfaceError::Closed("mock surface".into()));
        }
        Ok(state)
    }
}

impl Default for MockSurface {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Surface for MockSurface {
    fn id(&self) -> SurfaceId {
        self.id.clone()
    }

    fn is_closed(&self) -> bool {
        self.state.lock().unwrap().closed
    }

    fn viewport(&self) -> (u32, u32) {
        self.viewport
    }

    async fn navigate(
        &self,
        url: &str,
        _readiness: Readiness,
        _timeout: Duration,
    ) -> Result<(), SurfaceError> {
        self.guard()?.navigations.push(url.to_string());
        Ok(())
    }

    async fn title(&self) -> Result<String, SurfaceError> {
        let mut state = self.guard()?;
        if state.titles.is_empty() {
            return Ok(String::new());
        }
        let index = state.title_cursor.min(state.titles.len() - 1);
        state.title_cursor += 1;
        Ok(state.titles[index].clone())
    }

    async fn url(&self) -> Result<String, SurfaceError> {
        self.guard()?;
        Ok("about:mock".to_string())
    }

    async fn probe(&self) -> Result<(), SurfaceError> {
        self.guard().map(|_| ())
    }

    async fn wait_for_selector(&self, css: &str, timeout: Duration) -> Result<(), SurfaceError> {
        let state = self.guard()?;
        if state.lenient || state.selectors.contains(css) {
            Ok(())
        } else {
            Err(SurfaceError::SelectorTimeout {
                selector: css.to_string(),
                waited_ms: timeout.as_millis() as u64,
            })
        }
    }

    async fn click_css(&self, css: &str) -> Result<(), SurfaceError> {
        let mut state = self.guard()?;
        if state.lenient || state.selectors.contains(css) {
            state.clicks.push(css.to_string());
            Ok(())
        } else {
            Err(SurfaceError::SelectorTimeout {
                selector: css.to_string(),
                waited_ms: 0,
            })
        }
    }

    async fn focus_css(&self, css: &str) -> Result<(), SurfaceError> {
        let state = self.guard()?;
        if state.lenient || state.selectors.contains(css) {
            Ok(())
        } else {
            Err(SurfaceError::SelectorTimeout {
                selector: css.to_string(),
                waited_ms: 0,
            })
        }
    }

    async fn click_text(&self, text: &str) -> Result<bool, SurfaceError> {
        let mut state = self.guard()?;
        if state.lenient || state.texts.iter().any(|t| t == text) {
            state.clicks.push(text.to_string());
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn click_exact_text(&self, text: &str) -> Result<bool, SurfaceError> {
        let mut state = self.guard()?;
        if state.lenient || state.texts.iter().any(|t| t == text) {
            state.clicks.push(text.to_string());
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn click_partial_text(&self, text: &str) -> Result<bool, SurfaceError> {
        let mut state = self.guard()?;
        if state.lenient || state.texts.iter().any(|t| t.contains(text)) {
            state.clicks.push(text.to_string());
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn clickable_inventory(&self) -> Result<Vec<ClickableElement>, SurfaceError> {
        Ok(self.guard()?.clickables.clone())
    }

    async fn click_clickable(&self, index: usize) -> Result<bool, SurfaceError> {
        let mut state = self.guard()?;
        if index < state.clickables.len() {
            let caption = state.clickables[index].caption().to_string();
            state.clicks.push(caption);
            Ok(true)
        } else {
            Ok(state.lenient)
        }
    }

    async fn text_containing(&self, needle: &str) -> Result<Option<String>, SurfaceError> {
        let state = self.guard()?;
        if let Some(text) = state.texts.iter().find(|t| t.contains(needle)) {
            return Ok(Some(text.clone()));
        }
        if state.body.contains(needle) {
            return Ok(Some(state.body.clone()));
        }
        if state.lenient {
            return Ok(Some(needle.to_string()));
        }
        Ok(None)
    }

    async fn body_text(&self) -> Result<String, SurfaceError> {
        Ok(self.guard()?.body.clone())
    }

    async fn content(&self) -> Result<String, SurfaceError> {
        let state = self.guard()?;
        if state.content.is_empty() {
            Ok(state.body.clone())
        } else {
            Ok(state.content.clone())
        }
    }

    async fn element_exists(&self, css: &str) -> Result<bool, SurfaceError> {
        let state = self.guard()?;
        Ok(state.lenient || state.selectors.contains(css))
    }

    async fn insert_text(&self, text: &str) -> Result<(), SurfaceError> {
        self.guard()?.typed.push_str(text);
        Ok(())
    }

    async fn press_key(&self, key: Key) -> Result<(), SurfaceError> {
        self.guard()?.keys.push(key);
        Ok(())
    }

    async fn select_option_containing(
        &self,
        css: &str,
        label: &str,
    ) -> Result<bool, SurfaceError> {
        let mut state = self.guard()?;
        let matched = state.lenient
            || state
                .select_options
                .get(css)
                .map(|labels| labels.iter().any(|l| l.contains(label)))
                .unwrap_or(false);
        if matched {
            state
                .field_values
                .insert(css.to_string(), label.to_string());
        }
        Ok(matched)
    }

    async fn set_field_value(&self, css: &str, value: &str) -> Result<bool, SurfaceError> {
        let mut state = self.guard()?;
        if state.lenient || state.selectors.contains(css) {
            state
                .field_values
                .insert(css.to_string(), value.to_string());
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn fill_text_input_at(&self, index: usize, value: &str) -> Result<bool, SurfaceError> {
        let mut state = self.guard()?;
        if state.lenient || index < state.text_input_count {
            state
                .field_values
                .insert(format!("input#{index}"), value.to_string());
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn move_mouse(&self, _x: f64, _y: f64) -> Result<(), SurfaceError> {
        self.guard()?.mouse_moves += 1;
        Ok(())
    }

    async fn scroll_by(&self, _dy: f64) -> Result<(), SurfaceError> {
        self.guard()?.scrolls += 1;
        Ok(())
    }

    async fn reload(&self, _timeout: Duration) -> Result<(), SurfaceError> {
        self.guard()?.reloads += 1;
        Ok(())
    }

    async fn screenshot(&self) -> Result<Vec<u8>, SurfaceError> {
        self.guard()?;
        Ok(b"mock-png".to_vec())
    }

    async fn print_pdf(&self) -> Result<Vec<u8>, SurfaceError> {
        let state = self.guard()?;
        if state.pdf_fails {
            Err(SurfaceError::Capture("pdf renderer unavailable".into()))
        } else {
            Ok(b"mock-pdf".to_vec())
        }
    }

    async fn close(&self) -> Result<(), SurfaceError> {
        self.state.lock().unwrap().closed = true;
        Ok(())
    }
}

struct MockSessionState {
    surfaces: Vec<Arc<MockSurface>>,
    pending: VecDeque<Arc<MockSurface>>,
    fail_open: Option<String>,
    default_body: String,
    default_title: String,
}

/// A scripted browser session. Surfaces handed out on demand are lenient
/// and share `default_body`; explicitly queued surfaces are used first.
pub struct MockSession {
    state: StdMutex<MockSessionState>,
    closes: AtomicUsize,
}

impl MockSession {
    pub fn lenient() -> Self {
        Self {
            state: StdMutex::new(MockSessionState {
                surfaces: Vec::new(),
                pending: VecDeque::new(),
                fail_open: None,
                default_body: String::new(),
                default_title: "Portal de Licenciamento".to_string(),
            }),
            closes: AtomicUsize::new(0),
        }
    }

    /// Fail the first surface open with this message; teardown still runs.
    pub fn failing_open(message: impl Into<String>) -> Self {
        let session = Self::lenient();
        session.state.lock().unwrap().fail_open = Some(message.into());
        session
    }

    pub fn with_default_body(self, body: impl Into<String>) -> Self {
        self.state.lock().unwrap().default_body = body.into();
        self
    }

    pub fn queue_surface(&self, surface: Arc<MockSurface>) {
        self.state.lock().unwrap().pending.push_back(surface);
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn spawned_surfaces(&self) -> Vec<Arc<MockSurface>> {
        self.state.lock().unwrap().surfaces.clone()
    }

    pub fn with_default_title(self, title: impl Into<String>) -> Self {
        self.state.lock().unwrap().default_title = title.into();
        self
    }

    fn next_surface(state: &mut MockSessionState) -> Arc<MockSurface> {
        let surface = state.pending.pop_front().unwrap_or_else(|| {
            Arc::new(
                MockSurface::lenient()
                    .with_body(state.default_body.clone())
                    .with_titles([state.default_title.clone()]),
            )
        });
        state.surfaces.push(surface.clone());
        surface
    }
}

#[async_trait]
impl BrowserSession for MockSession {
    async fn open_surface(
        &self,
        url: &str,
        readiness: Readiness,
        timeout: Duration,
    ) -> Result<Arc<dyn Surface>, SurfaceError> {
        let surface = {
            let mut state = self.state.lock().unwrap();
            if let Some(message) = state.fail_open.take() {
                return Err(SurfaceError::Other(message));
            }
            Self::next_surface(&mut state)
        };
        surface.navigate(url, readiness, timeout).await?;
        Ok(surface)
    }

    async fn surfaces(&self) -> Result<Vec<Arc<dyn Surface>>, SurfaceError> {
        // Closed surfaces drop out of the listing, as closed CDP targets do.
        Ok(self
            .state
            .lock()
            .unwrap()
            .surfaces
            .iter()
            .filter(|s| !s.is_closed())
            .cloned()
            .map(|s| s as Arc<dyn Surface>)
            .collect())
    }

    async fn await_surface_beyond(
        &self,
        _baseline: usize,
        _timeout: Duration,
    ) -> Result<Arc<dyn Surface>, SurfaceError> {
        let mut state = self.state.lock().unwrap();
        if state.pending.is_empty() {
            // Nothing new spawned: most-recent fallback.
            if let Some(open) = state.surfaces.iter().rev().find(|s| !s.is_closed()) {
                return Ok(open.clone() as Arc<dyn Surface>);
            }
        }
        Ok(Self::next_surface(&mut state) as Arc<dyn Surface>)
    }

    async fn close(&self) -> Result<(), SurfaceError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// What one `launch` call should yield.
pub enum LaunchScript {
    FailLaunch(String),
    Session(Arc<MockSession>),
}

/// A launcher with a fixed script of launch outcomes.
pub struct MockLauncher {
    scripts: StdMutex<VecDeque<LaunchScript>>,
    launches: AtomicUsize,
    sessions: StdMutex<Vec<Arc<MockSession>>>,
}

impl MockLauncher {
    pub fn scripted(scripts: Vec<LaunchScript>) -> Self {
        Self {
            scripts: StdMutex::new(scripts.into()),
            launches: AtomicUsize::new(0),
            sessions: StdMutex::new(Vec::new()),
        }
    }

    pub fn single(session: Arc<MockSession>) -> Self {
        Self::scripted(vec![LaunchScript::Session(session)])
    }

    pub fn launch_count(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    /// Every session handed out so far, in launch order.
    pub fn launched_sessions(&self) -> Vec<Arc<MockSession>> {
        self.sessions.lock().unwrap().clone()
    }

    /// Total teardown calls across all launched sessions.
    pub fn teardown_count(&self) -> usize {
        self.sessions
            .lock()
            .unwrap()
            .iter()
            .map(|s| s.close_count())
            .sum()
    }
}

#[async_trait]
impl BrowserLauncher for MockLauncher {
    async fn launch(
        &self,
        _options: &LaunchOptions,
    ) -> Result<Arc<dyn BrowserSession>, SurfaceError> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        let script = self.scripts.lock().unwrap().pop_front();
        match script {
            Some(LaunchScript::FailLaunch(message)) => Err(SurfaceError::Launch(message)),
            Some(LaunchScript::Session(session)) => {
                self.sessions.lock().unwrap().push(session.clone());
                Ok(session as Arc<dyn BrowserSession>)
            }
            None => Err(SurfaceError::Launch("launch script exhausted".into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn strict_surface_only_finds_scripted_text() {
        let surface = MockSurface::new().with_texts(["Avançar"]);
        assert!(surface.click_text("Avançar").await.unwrap());
        assert!(!surface.click_text("Enviar").await.unwrap());
        assert_eq!(surface.recorded_clicks(), vec!["Avançar".to_string()]);
    }

    #[tokio::test]
    async fn poisoned_surface_fails_everything() {
        let surface = MockSurface::lenient();
        surface.poison("Target closed");
        let err = surface.click_text("Avançar").await.unwrap_err();
        assert!(err.to_string().contains("Target closed"));
    }

    #[tokio::test]
    async fn session_hands_out_pending_then_fallback() {
        let session = MockSession::lenient();
        let scripted = Arc::new(MockSurface::lenient().with_body("scripted"));
        session.queue_surface(scripted.clone());

        let first = session
            .await_surface_beyond(0, Duration::from_millis(10))
            .await
            .unwrap();
        assert_eq!(first.body_text().await.unwrap(), "scripted");

        // Queue drained: most-recent fallback returns the same surface.
        let second = session
            .await_surface_beyond(1, Duration::from_millis(10))
            .await
            .unwrap();
        assert_eq!(second.id(), first.id());
    }

    #[tokio::test]
    async fn launcher_follows_script() {
        let good = Arc::new(MockSession::lenient());
        let launcher = MockLauncher::scripted(vec![
            LaunchScript::FailLaunch("no executable".into()),
            LaunchScript::Session(good),
        ]);
        let opts = LaunchOptions::default();
        assert!(launcher.launch(&opts).await.is_err());
        assert!(launcher.launch(&opts).await.is_ok());
        assert_eq!(launcher.launch_count(), 2);
    }
}
