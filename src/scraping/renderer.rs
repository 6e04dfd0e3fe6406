use crate::scraping::antibot::UserAgentRotator;
use crate::scraping::browser::SharedBrowser;
use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::emulation::SetTimezoneOverrideParams;
use chromiumoxide::cdp::browser_protocol::network::{
    BlockPattern, EnableParams, SetBlockedUrLsParams, SetUserAgentOverrideParams,
};
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::Page;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const MAX_SCROLLS: usize = 10;
const SCROLL_DELAY: Duration = Duration::from_secs(1);
const MAX_LOAD_MORE_CLICKS: usize = 5;
const SELECTOR_WAIT: Duration = Duration::from_secs(5);
const SETTLE_WAIT: Duration = Duration::from_secs(5);
const RENDER_SCAN_LIMIT: usize = 10_000;

/// Page-body markers of anti-bot interstitials in rendered DOMs, checked
/// in addition to the static fetcher's indicator set.
const RENDER_BLOCK_PATTERNS: &[(&str, &str)] = &[
    ("recaptcha", "recaptcha_detected"),
    ("g-recaptcha", "recaptcha_detected"),
    ("captcha-container", "captcha_detected"),
    ("cf-challenge", "cloudflare_challenge"),
    ("challenge-platform", "challenge_detected"),
    ("access denied", "access_denied"),
    ("bot detected", "bot_detected"),
];

/// Resource patterns aborted during rendering to save bandwidth. Lifted
/// when screenshots are requested, since a screenshot without images is
/// useless.
const BLOCKED_RESOURCE_PATTERNS: &[&str] = &[
    "*.png", "*.jpg", "*.jpeg", "*.gif", "*.svg", "*.webp", "*.woff", "*.woff2", "*.ttf", "*.eot",
];

/// Disarm the obvious headless tells before any page script runs.
const STEALTH_INIT_SCRIPT: &str = r#"
Object.defineProperty(navigator, 'webdriver', { get: () => undefined });
Object.defineProperty(navigator, 'languages', { get: () => ['en-US', 'en'] });
Object.defineProperty(navigator, 'plugins', { get: () => [1, 2, 3, 4, 5] });
window.chrome = window.chrome || { runtime: {} };
"#;

const CLICK_LOAD_MORE_SCRIPT: &str = r#"
(() => {
    const texts = ['load more', 'show more', 'view more'];
    const attrSelectors = [
        "[class*='load-more']",
        "[class*='loadmore']",
        "[class*='show-more']",
        "[data-action='load-more']",
    ];
    const visible = (el) => {
        const rect = el.getBoundingClientRect();
        const style = getComputedStyle(el);
        return rect.width > 0 && rect.height > 0
            && style.visibility !== 'hidden' && style.display !== 'none';
    };
    const candidates = [];
    for (const el of document.querySelectorAll('button, a')) {
        const t = (el.textContent || '').trim().toLowerCase();
        if (texts.some((x) => t === x || t.startsWith(x))) candidates.push(el);
    }
    for (const sel of attrSelectors) {
        for (const el of document.querySelectorAll(sel)) candidates.push(el);
    }
    for (const el of candidates) {
        if (visible(el)) { el.click(); return true; }
    }
    return false;
})()
"#;

/// Result of rendering a page with JS execution.
#[derive(Debug, Clone, Default)]
pub struct RenderResult {
    pub url: String,
    pub final_url: String,
    pub status: u16,
    pub html: String,
    pub title: String,
    pub response_time: f64,
    pub success: bool,
    pub error: Option<String>,
    pub is_blocked: bool,
    pub blocked_reason: Option<String>,
    pub screenshot: Option<Vec<u8>>,
}

impl RenderResult {
    fn failure(url: &str, response_time: f64, error: String) -> Self {
        Self {
            url: url.to_string(),
            final_url: url.to_string(),
            response_time,
            error: Some(error),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct RenderRequest {
    pub url: String,
    pub wait_for: Option<String>,
    pub scroll_to_bottom: bool,
    pub click_load_more: bool,
    pub cookies: HashMap<String, String>,
}

impl RenderRequest {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            wait_for: None,
            scroll_to_bottom: true,
            click_load_more: true,
            cookies: HashMap::new(),
        }
    }
}

/// Renderer seam: the engine depends on this trait, so tests swap in a
/// stub without a browser.
#[async_trait]
pub trait PageRenderer: Send + Sync {
    async fn render(&self, request: RenderRequest) -> RenderResult;
    async fn close(&self);
}

/// Renders pages in a shared headless Chromium with scroll-to-bottom and
/// load-more handling for lazy-loaded content.
pub struct HeadlessRenderer {
    browser: SharedBrowser,
    rotator: UserAgentRotator,
    render_timeout: Duration,
    take_screenshots: bool,
}

impl HeadlessRenderer {
    pub fn new(
        render_timeout: Duration,
        viewport: (u32, u32),
        rotate_user_agents: bool,
        take_screenshots: bool,
    ) -> Self {
        Self {
            browser: SharedBrowser::new(viewport.0, viewport.1),
            rotator: UserAgentRotator::new(rotate_user_agents),
            render_timeout,
            take_screenshots,
        }
    }

    async fn render_inner(&self, request: &RenderRequest) -> anyhow::Result<RenderResult> {
        let start = Instant::now();
        let page = self.browser.new_page().await?;

        let result = self.drive_page(&page, request, start).await;

        // The page is per-render state; close it regardless of outcome.
        if let Err(e) = page.close().await {
            debug!("page close error (non-fatal): {}", e);
        }

        result
    }

    async fn drive_page(
        &self,
        page: &Page,
        request: &RenderRequest,
        start: Instant,
    ) -> anyhow::Result<RenderResult> {
        page.execute(AddScriptToEvaluateOnNewDocumentParams::new(
            STEALTH_INIT_SCRIPT,
        ))
        .await?;

        let profile = self.rotator.next();
        page.execute(SetUserAgentOverrideParams::new(profile.user_agent))
            .await?;
        page.execute(SetTimezoneOverrideParams::new("America/New_York"))
            .await?;

        if !self.take_screenshots {
            page.execute(EnableParams::default()).await?;
            page.execute(
                SetBlockedUrLsParams::builder()
                    .url_patterns(
                        BLOCKED_RESOURCE_PATTERNS
                            .iter()
                            .map(|p| BlockPattern::new(*p, true))
                            .collect::<Vec<_>>(),
                    )
                    .build(),
            )
            .await?;
        }

        if !request.cookies.is_empty() {
            let cookie_script = request
                .cookies
                .iter()
                .map(|(k, v)| format!("document.cookie = {};", serde_json::json!(format!("{k}={v}"))))
                .collect::<Vec<_>>()
                .join("\n");
            page.execute(AddScriptToEvaluateOnNewDocumentParams::new(cookie_script))
                .await?;
        }

        tokio::time::timeout(self.render_timeout, page.goto(request.url.as_str()))
            .await
            .map_err(|_| anyhow::anyhow!("navigation timed out after {:?}", self.render_timeout))?
            .map_err(|e| anyhow::anyhow!("navigation failed: {e}"))?;

        self.wait_until_settled(page, SETTLE_WAIT).await;

        if let Some(selector) = &request.wait_for {
            self.wait_for_selector(page, selector, SELECTOR_WAIT).await;
        }

        if request.scroll_to_bottom {
            self.scroll_to_bottom(page).await;
        }

        if request.click_load_more {
            self.click_load_more(page).await;
        }

        self.wait_until_settled(page, SETTLE_WAIT).await;

        let html = page
            .content()
            .await
            .map_err(|e| anyhow::anyhow!("content capture failed: {e}"))?;
        let title = self
            .eval_string(page, "document.title")
            .await
            .unwrap_or_default();
        let final_url = self
            .eval_string(page, "window.location.href")
            .await
            .unwrap_or_else(|| request.url.clone());

        let screenshot = if self.take_screenshots {
            match page
                .screenshot(ScreenshotParams::builder().full_page(true).build())
                .await
            {
                Ok(bytes) => Some(bytes),
                Err(e) => {
                    warn!("screenshot failed: {}", e);
                    None
                }
            }
        } else {
            None
        };

        // Successful navigation does not surface the document's HTTP status
        // through CDP without a network-event subscription; report 200 the
        // way the navigation succeeded.
        let status = 200u16;
        let (is_blocked, blocked_reason) = detect_render_blocking(status, &html);
        let elapsed = start.elapsed().as_secs_f64();

        info!(
            url = %request.url,
            time = format!("{elapsed:.2}s"),
            html_size = html.len(),
            blocked = is_blocked,
            "page rendered"
        );

        Ok(RenderResult {
            url: request.url.clone(),
            final_url,
            status,
            html,
            title,
            response_time: elapsed,
            success: true,
            error: None,
            is_blocked,
            blocked_reason,
            screenshot,
        })
    }

    async fn eval_string(&self, page: &Page, expr: &str) -> Option<String> {
        let result = page.evaluate(expr).await.ok()?;
        result.value().and_then(|v| v.as_str()).map(String::from)
    }

    async fn eval_u64(&self, page: &Page, expr: &str) -> Option<u64> {
        let result = page.evaluate(expr).await.ok()?;
        result.value().and_then(|v| v.as_u64())
    }

    /// Progressively scroll to the bottom to trigger lazy loading, then
    /// return to the top.
    async fn scroll_to_bottom(&self, page: &Page) {
        let mut previous_height = 0u64;
        for _ in 0..MAX_SCROLLS {
            let Some(height) = self.eval_u64(page, "document.body.scrollHeight").await else {
                break;
            };
            if height == previous_height {
                break;
            }
            if page
                .evaluate("window.scrollTo(0, document.body.scrollHeight)")
                .await
                .is_err()
            {
                break;
            }
            tokio::time::sleep(SCROLL_DELAY).await;
            previous_height = height;
        }
        let _ = page.evaluate("window.scrollTo(0, 0)").await;
    }

    /// Click "Load More"-style controls until none remain or the click
    /// budget is exhausted.
    async fn click_load_more(&self, page: &Page) {
        for _ in 0..MAX_LOAD_MORE_CLICKS {
            let clicked = page
                .evaluate(CLICK_LOAD_MORE_SCRIPT)
                .await
                .ok()
                .and_then(|r| r.value().and_then(|v| v.as_bool()))
                .unwrap_or(false);
            if !clicked {
                break;
            }
            tokio::time::sleep(Duration::from_secs(2)).await;
        }
    }

    async fn wait_for_selector(&self, page: &Page, selector: &str, timeout: Duration) {
        let deadline = Instant::now() + timeout;
        let expr = format!(
            "document.querySelector({}) !== null",
            serde_json::json!(selector)
        );
        while Instant::now() < deadline {
            let found = page
                .evaluate(expr.as_str())
                .await
                .ok()
                .and_then(|r| r.value().and_then(|v| v.as_bool()))
                .unwrap_or(false);
            if found {
                return;
            }
            tokio::time::sleep(Duration::from_millis(250)).await;
        }
        debug!(selector, "wait_for selector never appeared");
    }

    /// Wait for the DOM to stop growing, bounded by `max_wait`. A cheap
    /// stand-in for network-idle that needs no event subscription.
    async fn wait_until_settled(&self, page: &Page, max_wait: Duration) {
        let deadline = Instant::now() + max_wait;
        let mut previous = 0u64;
        let mut stable_polls = 0u32;
        while Instant::now() < deadline {
            let Some(size) = self
                .eval_u64(page, "document.documentElement.outerHTML.length")
                .await
            else {
                return;
            };
            if size == previous {
                stable_polls += 1;
                if stable_polls >= 2 {
                    return;
                }
            } else {
                stable_polls = 0;
            }
            previous = size;
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
    }
}

#[async_trait]
impl PageRenderer for HeadlessRenderer {
    async fn render(&self, request: RenderRequest) -> RenderResult {
        let start = Instant::now();
        let url = request.url.clone();
        match self.render_inner(&request).await {
            Ok(result) => result,
            Err(e) => {
                warn!(url = %url, error = %e, "render failed");
                RenderResult::failure(&url, start.elapsed().as_secs_f64(), e.to_string())
            }
        }
    }

    async fn close(&self) {
        self.browser.shutdown().await;
    }
}

/// Blocking detection for rendered pages: status-based checks plus DOM
/// markers over the first 10 000 chars.
pub fn detect_render_blocking(status: u16, html: &str) -> (bool, Option<String>) {
    if status == 403 {
        return (true, Some("403_forbidden".to_string()));
    }
    if status == 429 {
        return (true, Some("429_rate_limited".to_string()));
    }

    let scan: String = html
        .chars()
        .take(RENDER_SCAN_LIMIT)
        .collect::<String>()
        .to_lowercase();
    for (pattern, reason) in RENDER_BLOCK_PATTERNS {
        if scan.contains(pattern) {
            return (true, Some((*reason).to_string()));
        }
    }

    (false, None)
}
