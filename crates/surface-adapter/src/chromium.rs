//! CDP-backed implementation of the surface seam, built on `chromiumoxide`.
//!
//! One `ChromiumSession` wraps one launched browser process; surfaces are
//! thin wrappers over CDP pages. All element interaction goes through
//! `Runtime.evaluate` plus real input dispatch, so the remote site sees
//! trusted events at element coordinates rather than synthetic DOM calls
//! wherever a pointer is involved.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::dom::{
    GetDocumentParams, GetSearchResultsParams, PerformSearchParams, ResolveNodeParams,
};
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::fetch::{
    EnableParams as FetchEnableParams, EventRequestPaused, FailRequestParams, RequestPattern,
};
use chromiumoxide::cdp::browser_protocol::input::{
    DispatchKeyEventParams, DispatchKeyEventType, DispatchMouseEventParams,
    DispatchMouseEventType, InsertTextParams, MouseButton,
};
use chromiumoxide::cdp::browser_protocol::network::{
    ErrorReason, Headers, ResourceType, SetExtraHttpHeadersParams, SetUserAgentOverrideParams,
};
use chromiumoxide::cdp::browser_protocol::page::{CaptureScreenshotFormat, PrintToPdfParams};
use chromiumoxide::cdp::browser_protocol::target::TargetId;
use chromiumoxide::cdp::js_protocol::runtime::CallFunctionOnParams;
use chromiumoxide::page::{Page, ScreenshotParams};
use futures::StreamExt;
use serde_json::json;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};
use viabot_core_types::SurfaceId;

use crate::errors::SurfaceError;
use crate::surface::{
    BrowserLauncher, BrowserSession, ClickableElement, Key, LaunchOptions, Readiness, Surface,
};

const SELECTOR_POLL: Duration = Duration::from_millis(100);
const CLICK_TARGET_BUDGET: Duration = Duration::from_secs(5);

/// Query matching the elements a user could plausibly click.
const CLICKABLE_QUERY: &str =
    r#"button, input[type="button"], input[type="submit"], a, [onclick]"#;

/// Launches hardened Chromium instances.
#[derive(Clone, Debug, Default)]
pub struct ChromiumLauncher;

#[async_trait]
impl BrowserLauncher for ChromiumLauncher {
    async fn launch(
        &self,
        options: &LaunchOptions,
    ) -> Result<Arc<dyn BrowserSession>, SurfaceError> {
        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .window_size(options.window_width, options.window_height);
        if !options.headless {
            builder = builder.with_head();
        }
        for arg in options.hardened_args() {
            builder = builder.arg(arg);
        }
        let config = builder.build().map_err(SurfaceError::Launch)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|err| SurfaceError::Launch(err.to_string()))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    debug!("cdp handler loop ended");
                    break;
                }
            }
        });

        info!(
            headless = options.headless,
            width = options.window_width,
            height = options.window_height,
            "browser launched"
        );

        Ok(Arc::new(ChromiumSession {
            browser: Mutex::new(browser),
            handler_task: Mutex::new(Some(handler_task)),
            aux_tasks: Mutex::new(Vec::new()),
            known_targets: StdMutex::new(Vec::new()),
            options: options.clone(),
            closed: AtomicBool::new(false),
        }))
    }
}

/// One live browser instance.
pub struct ChromiumSession {
    browser: Mutex<Browser>,
    handler_task: Mutex<Option<JoinHandle<()>>>,
    aux_tasks: Mutex<Vec<JoinHandle<()>>>,
    /// Target ids in discovery order; `pages()` gives no creation ordering
    /// on its own.
    known_targets: StdMutex<Vec<TargetId>>,
    options: LaunchOptions,
    closed: AtomicBool,
}

impl ChromiumSession {
    fn wrap(&self, page: Page) -> Arc<dyn Surface> {
        let id = SurfaceId(page.target_id().inner().clone());
        Arc::new(ChromiumSurface {
            page,
            id,
            viewport: (self.options.window_width, self.options.window_height),
            closed: AtomicBool::new(false),
        })
    }

    fn order_pages(&self, pages: Vec<Page>) -> Vec<Page> {
        let mut known = self.known_targets.lock().expect("target registry poisoned");
        for page in &pages {
            if !known.iter().any(|t| t == page.target_id()) {
                known.push(page.target_id().clone());
            }
        }
        let mut ordered: Vec<(usize, Page)> = pages
            .into_iter()
            .map(|page| {
                let rank = known
                    .iter()
                    .position(|t| t == page.target_id())
                    .unwrap_or(usize::MAX);
                (rank, page)
            })
            .collect();
        ordered.sort_by_key(|(rank, _)| *rank);
        ordered.into_iter().map(|(_, page)| page).collect()
    }

    async fn configure_entry(&self, surface: &ChromiumSurface) -> Result<(), SurfaceError> {
        let page = &surface.page;

        let ua = SetUserAgentOverrideParams::builder()
            .user_agent(self.options.user_agent.clone())
            .accept_language(self.options.accept_language.clone())
            .platform("Win32")
            .build()
            .map_err(SurfaceError::Protocol)?;
        page.execute(ua).await.map_err(SurfaceError::protocol)?;

        let headers = SetExtraHttpHeadersParams::builder()
            .headers(Headers::new(json!({
                "Accept-Language": self.options.accept_language.clone(),
                "Upgrade-Insecure-Requests": "1",
                "Cache-Control": "no-cache",
                "Pragma": "no-cache",
            })))
            .build()
            .map_err(SurfaceError::Protocol)?;
        page.execute(headers)
            .await
            .map_err(SurfaceError::protocol)?;

        let metrics = SetDeviceMetricsOverrideParams::builder()
            .width(self.options.window_width as i64)
            .height(self.options.window_height as i64)
            .device_scale_factor(1.0)
            .mobile(false)
            .build()
            .map_err(SurfaceError::Protocol)?;
        page.execute(metrics)
            .await
            .map_err(SurfaceError::protocol)?;

        if self.options.block_heavy_resources {
            self.install_request_filter(page).await?;
        }
        Ok(())
    }

    /// Abort image/stylesheet/font loads: they add seconds per navigation on
    /// the remote host and contribute nothing to script/XHR behavior.
    async fn install_request_filter(&self, page: &Page) -> Result<(), SurfaceError> {
        let mut enable = FetchEnableParams::builder();
        for resource_type in [
            ResourceType::Image,
            ResourceType::Stylesheet,
            ResourceType::Font,
        ] {
            enable = enable.pattern(
                RequestPattern::builder()
                    .url_pattern("*")
                    .resource_type(resource_type)
                    .build(),
            );
        }
        page.execute(enable.build())
            .await
            .map_err(SurfaceError::protocol)?;

        let mut paused = page
            .event_listener::<EventRequestPaused>()
            .await
            .map_err(SurfaceError::protocol)?;
        let abort_page = page.clone();
        let task = tokio::spawn(async move {
            // Only the filtered resource types pause, so abort everything.
            while let Some(event) = paused.next().await {
                let fail = FailRequestParams::builder()
                    .request_id(event.request_id.clone())
                    .error_reason(ErrorReason::Aborted)
                    .build();
                let Ok(fail) = fail else { break };
                if abort_page.execute(fail).await.is_err() {
                    break;
                }
            }
        });
        self.aux_tasks.lock().await.push(task);
        Ok(())
    }
}

#[async_trait]
impl BrowserSession for ChromiumSession {
    async fn open_surface(
        &self,
        url: &str,
        readiness: Readiness,
        timeout: Duration,
    ) -> Result<Arc<dyn Surface>, SurfaceError> {
        let page = {
            let browser = self.browser.lock().await;
            browser
                .new_page("about:blank")
                .await
                .map_err(SurfaceError::protocol)?
        };
        let surface = ChromiumSurface {
            id: SurfaceId(page.target_id().inner().clone()),
            viewport: (self.options.window_width, self.options.window_height),
            page,
            closed: AtomicBool::new(false),
        };
        self.configure_entry(&surface).await?;
        surface.navigate(url, readiness, timeout).await?;
        // Register in discovery order before anything else spawns.
        let _ = self.surfaces().await?;
        Ok(Arc::new(surface))
    }

    async fn surfaces(&self) -> Result<Vec<Arc<dyn Surface>>, SurfaceError> {
        let pages = {
            let browser = self.browser.lock().await;
            browser.pages().await.map_err(SurfaceError::protocol)?
        };
        Ok(self
            .order_pages(pages)
            .into_iter()
            .map(|page| self.wrap(page))
            .collect())
    }

    async fn close(&self) -> Result<(), SurfaceError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        for task in self.aux_tasks.lock().await.drain(..) {
            task.abort();
        }
        {
            let mut browser = self.browser.lock().await;
            if let Err(err) = browser.close().await {
                warn!(error = %err, "browser close reported an error");
            }
            if let Err(err) = browser.wait().await {
                debug!(error = %err, "browser wait after close failed");
            }
        }
        if let Some(task) = self.handler_task.lock().await.take() {
            task.abort();
        }
        Ok(())
    }
}

/// One CDP page.
pub struct ChromiumSurface {
    page: Page,
    id: SurfaceId,
    viewport: (u32, u32),
    closed: AtomicBool,
}

impl ChromiumSurface {
    async fn eval(&self, script: String) -> Result<serde_json::Value, SurfaceError> {
        let result = self
            .page
            .evaluate(script)
            .await
            .map_err(SurfaceError::protocol)?;
        Ok(result.value().cloned().unwrap_or(serde_json::Value::Null))
    }

    async fn eval_bool(&self, script: String) -> Result<bool, SurfaceError> {
        Ok(self.eval(script).await?.as_bool().unwrap_or(false))
    }

    /// Center coordinates of the first element matching `css`, polled up to
    /// `budget`.
    async fn element_center(
        &self,
        css: &str,
        budget: Duration,
    ) -> Result<(f64, f64), SurfaceError> {
        let quoted = serde_json::to_string(css).map_err(SurfaceError::protocol)?;
        let script = format!(
            r#"(() => {{
    const el = document.querySelector({quoted});
    if (!el) {{ return null; }}
    const rect = el.getBoundingClientRect();
    return {{ x: rect.left + rect.width / 2, y: rect.top + rect.height / 2 }};
}})()"#
        );
        let deadline = Instant::now() + budget;
        loop {
            let value = self.eval(script.clone()).await?;
            if let Some(obj) = value.as_object() {
                let x = obj.get("x").and_then(|v| v.as_f64());
                let y = obj.get("y").and_then(|v| v.as_f64());
                if let (Some(x), Some(y)) = (x, y) {
                    return Ok((x, y));
                }
            }
            if Instant::now() >= deadline {
                return Err(SurfaceError::SelectorTimeout {
                    selector: css.to_string(),
                    waited_ms: budget.as_millis() as u64,
                });
            }
            sleep(SELECTOR_POLL).await;
        }
    }

    async fn dispatch_click(&self, x: f64, y: f64) -> Result<(), SurfaceError> {
        let down = DispatchMouseEventParams::builder()
            .r#type(DispatchMouseEventType::MousePressed)
            .x(x)
            .y(y)
            .button(MouseButton::Left)
            .click_count(1)
            .build()
            .map_err(SurfaceError::Protocol)?;
        self.page
            .execute(down)
            .await
            .map_err(SurfaceError::protocol)?;

        let up = DispatchMouseEventParams::builder()
            .r#type(DispatchMouseEventType::MouseReleased)
            .x(x)
            .y(y)
            .button(MouseButton::Left)
            .click_count(1)
            .build()
            .map_err(SurfaceError::Protocol)?;
        self.page
            .execute(up)
            .await
            .map_err(SurfaceError::protocol)?;
        Ok(())
    }

    async fn wait_ready_state(&self, budget: Duration) {
        let deadline = Instant::now() + budget;
        loop {
            let state = self
                .eval("document.readyState".to_string())
                .await
                .ok()
                .and_then(|v| v.as_str().map(str::to_string));
            if matches!(state.as_deref(), Some("interactive") | Some("complete")) {
                return;
            }
            if Instant::now() >= deadline {
                return;
            }
            sleep(SELECTOR_POLL).await;
        }
    }
}

#[async_trait]
impl Surface for ChromiumSurface {
    fn id(&self) -> SurfaceId {
        self.id.clone()
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn viewport(&self) -> (u32, u32) {
        self.viewport
    }

    async fn navigate(
        &self,
        url: &str,
        readiness: Readiness,
        timeout: Duration,
    ) -> Result<(), SurfaceError> {
        let timeout_ms = timeout.as_millis() as u64;
        match tokio::time::timeout(timeout, self.page.goto(url)).await {
            Err(_) => return Err(SurfaceError::NavigationTimeout(timeout_ms)),
            Ok(Err(err)) => {
                let message = err.to_string();
                if message.to_lowercase().contains("timeout") {
                    return Err(SurfaceError::NavigationTimeout(timeout_ms));
                }
                return Err(SurfaceError::Protocol(message));
            }
            Ok(Ok(_)) => {}
        }
        match readiness {
            Readiness::DomReady => self.wait_ready_state(Duration::from_secs(5)).await,
            Readiness::NetworkMostlyIdle => {
                let _ = tokio::time::timeout(
                    Duration::from_secs(10),
                    self.page.wait_for_navigation(),
                )
                .await;
                // Short quiet window instead of a strict zero-inflight gate.
                sleep(Duration::from_millis(500)).await;
                self.wait_ready_state(Duration::from_secs(3)).await;
            }
        }
        Ok(())
    }

    async fn title(&self) -> Result<String, SurfaceError> {
        let value = self.eval("document.title".to_string()).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn url(&self) -> Result<String, SurfaceError> {
        let value = self
            .eval("window.location.href".to_string())
            .await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn probe(&self) -> Result<(), SurfaceError> {
        self.eval("document.readyState".to_string()).await.map(|_| ())
    }

    async fn wait_for_selector(&self, css: &str, timeout: Duration) -> Result<(), SurfaceError> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.element_exists(css).await? {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(SurfaceError::SelectorTimeout {
                    selector: css.to_string(),
                    waited_ms: timeout.as_millis() as u64,
                });
            }
            sleep(SELECTOR_POLL).await;
        }
    }

    async fn click_css(&self, css: &str) -> Result<(), SurfaceError> {
        let (x, y) = self.element_center(css, CLICK_TARGET_BUDGET).await?;
        self.dispatch_click(x, y).await
    }

    async fn focus_css(&self, css: &str) -> Result<(), SurfaceError> {
        let quoted = serde_json::to_string(css).map_err(SurfaceError::protocol)?;
        let focused = self
            .eval_bool(format!(
                r#"(() => {{
    const el = document.querySelector({quoted});
    if (!el) {{ return false; }}
    if (typeof el.focus === 'function') {{ el.focus(); }}
    return true;
}})()"#
            ))
            .await?;
        if focused {
            Ok(())
        } else {
            Err(SurfaceError::SelectorTimeout {
                selector: css.to_string(),
                waited_ms: 0,
            })
        }
    }

    async fn click_text(&self, text: &str) -> Result<bool, SurfaceError> {
        // Native DOM search across the document, the closest CDP analog of a
        // text-engine selector.
        let _ = self.page.execute(GetDocumentParams::default()).await;
        let search = PerformSearchParams::builder()
            .query(text)
            .build()
            .map_err(SurfaceError::Protocol)?;
        let search = self
            .page
            .execute(search)
            .await
            .map_err(SurfaceError::protocol)?;
        let search_id = search.result.search_id.clone();
        let count = search.result.result_count;
        if count == 0 {
            return Ok(false);
        }

        let results = GetSearchResultsParams::builder()
            .search_id(search_id)
            .from_index(0)
            .to_index(count)
            .build()
            .map_err(SurfaceError::Protocol)?;
        let results = self
            .page
            .execute(results)
            .await
            .map_err(SurfaceError::protocol)?;

        for node_id in &results.result.node_ids {
            let resolved = self
                .page
                .execute(ResolveNodeParams::builder().node_id(node_id.clone()).build())
                .await;
            let resolved = match resolved {
                Ok(r) => r,
                Err(_) => continue,
            };
            let Some(object_id) = resolved.result.object.object_id.clone() else {
                continue;
            };
            let click = CallFunctionOnParams::builder()
                .object_id(object_id)
                .function_declaration(
                    "function() { \
                     const el = this.nodeType === 1 ? this : this.parentElement; \
                     if (el) { el.click(); return true; } return false; }",
                )
                .build()
                .map_err(SurfaceError::Protocol)?;
            if self.page.execute(click).await.is_ok() {
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn click_exact_text(&self, text: &str) -> Result<bool, SurfaceError> {
        let quoted = serde_json::to_string(text).map_err(SurfaceError::protocol)?;
        self.eval_bool(format!(
            r#"(() => {{
    const xpath = '//*[text()=' + JSON.stringify({quoted}) + ']';
    const node = document.evaluate(
        xpath, document, null, XPathResult.FIRST_ORDERED_NODE_TYPE, null
    ).singleNodeValue;
    if (node) {{ node.click(); return true; }}
    return false;
}})()"#
        ))
        .await
    }

    async fn click_partial_text(&self, text: &str) -> Result<bool, SurfaceError> {
        let quoted = serde_json::to_string(text).map_err(SurfaceError::protocol)?;
        self.eval_bool(format!(
            r#"(() => {{
    const xpath = '//*[contains(text(), ' + JSON.stringify({quoted}) + ')]';
    const node = document.evaluate(
        xpath, document, null, XPathResult.FIRST_ORDERED_NODE_TYPE, null
    ).singleNodeValue;
    if (node) {{ node.click(); return true; }}
    return false;
}})()"#
        ))
        .await
    }

    async fn clickable_inventory(&self) -> Result<Vec<ClickableElement>, SurfaceError> {
        let value = self
            .eval(format!(
                r#"(() => Array.from(document.querySelectorAll('{CLICKABLE_QUERY}'))
    .map(el => ({{
        tag: el.tagName,
        text: (el.textContent || '').trim(),
        value: el.value || '',
        id: el.id || '',
        class: el.getAttribute('class') || '',
    }})))()"#
            ))
            .await?;
        serde_json::from_value(value).map_err(SurfaceError::protocol)
    }

    async fn click_clickable(&self, index: usize) -> Result<bool, SurfaceError> {
        self.eval_bool(format!(
            r#"(() => {{
    const all = Array.from(document.querySelectorAll('{CLICKABLE_QUERY}'));
    const el = all[{index}];
    if (el) {{ el.click(); return true; }}
    return false;
}})()"#
        ))
        .await
    }

    async fn text_containing(&self, needle: &str) -> Result<Option<String>, SurfaceError> {
        let quoted = serde_json::to_string(needle).map_err(SurfaceError::protocol)?;
        let value = self
            .eval(format!(
                r#"(() => {{
    const xpath = '//*[contains(text(), ' + JSON.stringify({quoted}) + ')]';
    const node = document.evaluate(
        xpath, document, null, XPathResult.FIRST_ORDERED_NODE_TYPE, null
    ).singleNodeValue;
    return node ? (node.textContent || '') : null;
}})()"#
            ))
            .await?;
        Ok(value.as_str().map(str::to_string))
    }

    async fn body_text(&self) -> Result<String, SurfaceError> {
        let value = self
            .eval("document.body ? document.body.innerText : ''".to_string())
            .await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn content(&self) -> Result<String, SurfaceError> {
        let value = self
            .eval("document.documentElement.outerHTML".to_string())
            .await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn element_exists(&self, css: &str) -> Result<bool, SurfaceError> {
        let quoted = serde_json::to_string(css).map_err(SurfaceError::protocol)?;
        self.eval_bool(format!("!!document.querySelector({quoted})"))
            .await
    }

    async fn insert_text(&self, text: &str) -> Result<(), SurfaceError> {
        let params = InsertTextParams::builder()
            .text(text)
            .build()
            .map_err(SurfaceError::Protocol)?;
        self.page
            .execute(params)
            .await
            .map_err(SurfaceError::protocol)?;
        Ok(())
    }

    async fn press_key(&self, key: Key) -> Result<(), SurfaceError> {
        let (name, code, vk, text) = key.descriptor();

        let down = DispatchKeyEventParams::builder()
            .r#type(DispatchKeyEventType::KeyDown)
            .key(name)
            .code(code)
            .windows_virtual_key_code(vk)
            .native_virtual_key_code(vk)
            .build()
            .map_err(SurfaceError::Protocol)?;
        self.page
            .execute(down)
            .await
            .map_err(SurfaceError::protocol)?;

        if let Some(text) = text {
            let ch = DispatchKeyEventParams::builder()
                .r#type(DispatchKeyEventType::Char)
                .key(name)
                .code(code)
                .text(text)
                .build()
                .map_err(SurfaceError::Protocol)?;
            self.page
                .execute(ch)
                .await
                .map_err(SurfaceError::protocol)?;
        }

        let up = DispatchKeyEventParams::builder()
            .r#type(DispatchKeyEventType::KeyUp)
            .key(name)
            .code(code)
            .windows_virtual_key_code(vk)
            .native_virtual_key_code(vk)
            .build()
            .map_err(SurfaceError::Protocol)?;
        self.page
            .execute(up)
            .await
            .map_err(SurfaceError::protocol)?;
        Ok(())
    }

    async fn select_option_containing(
        &self,
        css: &str,
        label: &str,
    ) -> Result<bool, SurfaceError> {
        let css_quoted = serde_json::to_string(css).map_err(SurfaceError::protocol)?;
        let label_quoted = serde_json::to_string(label).map_err(SurfaceError::protocol)?;
        // Programmatic value set plus change dispatch: option labels on the
        // portal are too verbose for select-by-visible-text.
        self.eval_bool(format!(
            r#"(() => {{
    const select = document.querySelector({css_quoted});
    if (!select) {{ return false; }}
    const options = Array.from(select.querySelectorAll('option'));
    const target = options.find(opt => (opt.textContent || '').includes({label_quoted}));
    if (!target) {{ return false; }}
    select.value = target.value;
    select.dispatchEvent(new Event('change', {{ bubbles: true }}));
    return true;
}})()"#
        ))
        .await
    }

    async fn set_field_value(&self, css: &str, value: &str) -> Result<bool, SurfaceError> {
        let css_quoted = serde_json::to_string(css).map_err(SurfaceError::protocol)?;
        let value_quoted = serde_json::to_string(value).map_err(SurfaceError::protocol)?;
        self.eval_bool(format!(
            r#"(() => {{
    const el = document.querySelector({css_quoted});
    if (!el) {{ return false; }}
    el.value = {value_quoted};
    el.dispatchEvent(new Event('input', {{ bubbles: true }}));
    el.dispatchEvent(new Event('change', {{ bubbles: true }}));
    return true;
}})()"#
        ))
        .await
    }

    async fn fill_text_input_at(&self, index: usize, value: &str) -> Result<bool, SurfaceError> {
        let value_quoted = serde_json::to_string(value).map_err(SurfaceError::protocol)?;
        self.eval_bool(format!(
            r#"(() => {{
    const inputs = document.querySelectorAll('input[type="text"], input:not([type])');
    const el = inputs[{index}];
    if (!el) {{ return false; }}
    el.value = {value_quoted};
    el.dispatchEvent(new Event('input', {{ bubbles: true }}));
    el.dispatchEvent(new Event('change', {{ bubbles: true }}));
    return true;
}})()"#
        ))
        .await
    }

    async fn move_mouse(&self, x: f64, y: f64) -> Result<(), SurfaceError> {
        let params = DispatchMouseEventParams::builder()
            .r#type(DispatchMouseEventType::MouseMoved)
            .x(x)
            .y(y)
            .build()
            .map_err(SurfaceError::Protocol)?;
        self.page
            .execute(params)
            .await
            .map_err(SurfaceError::protocol)?;
        Ok(())
    }

    async fn scroll_by(&self, dy: f64) -> Result<(), SurfaceError> {
        self.eval(format!(
            "window.scrollBy({{ top: {dy}, behavior: 'smooth' }})"
        ))
        .await
        .map(|_| ())
    }

    async fn reload(&self, timeout: Duration) -> Result<(), SurfaceError> {
        match tokio::time::timeout(timeout, self.page.reload()).await {
            Err(_) => Err(SurfaceError::NavigationTimeout(timeout.as_millis() as u64)),
            Ok(Err(err)) => Err(SurfaceError::protocol(err)),
            Ok(Ok(_)) => {
                self.wait_ready_state(Duration::from_secs(5)).await;
                Ok(())
            }
        }
    }

    async fn screenshot(&self) -> Result<Vec<u8>, SurfaceError> {
        self.page
            .screenshot(
                ScreenshotParams::builder()
                    .format(CaptureScreenshotFormat::Png)
                    .full_page(true)
                    .build(),
            )
            .await
            .map_err(|err| SurfaceError::Capture(err.to_string()))
    }

    async fn print_pdf(&self) -> Result<Vec<u8>, SurfaceError> {
        let params = PrintToPdfParams {
            print_background: Some(true),
            paper_width: Some(8.27),
            paper_height: Some(11.69),
            margin_top: Some(0.2),
            margin_bottom: Some(0.2),
            margin_left: Some(0.2),
            margin_right: Some(0.2),
            ..Default::default()
        };
        self.page
            .pdf(params)
            .await
            .map_err(|err| SurfaceError::Capture(err.to_string()))
    }

    async fn close(&self) -> Result<(), SurfaceError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.page
            .clone()
            .close()
            .await
            .map_err(SurfaceError::protocol)
    }
}
