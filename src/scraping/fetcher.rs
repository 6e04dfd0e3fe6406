use crate::scraping::antibot::{ProxyRotator, UserAgentRotator};
use aho_corasick::AhoCorasick;
use reqwest::{Client, StatusCode};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::OnceLock;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Body substrings that indicate an anti-bot interstitial rather than
/// real content. Only the first 5000 chars are scanned.
const BLOCKED_INDICATORS: &[&str] = &[
    "captcha",
    "recaptcha",
    "challenge",
    "access denied",
    "blocked",
    "bot detected",
    "please verify",
    "security check",
];

const BODY_SCAN_LIMIT: usize = 5000;

fn indicator_matcher() -> &'static AhoCorasick {
    static MATCHER: OnceLock<AhoCorasick> = OnceLock::new();
    MATCHER.get_or_init(|| {
        AhoCorasick::new(BLOCKED_INDICATORS).expect("static indicator patterns are valid")
    })
}

/// Outcome of a static HTTP fetch. Failures are values, never errors:
/// the fetcher boundary does not throw.
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub url: String,
    pub final_url: String,
    pub status: u16,
    pub content_type: String,
    pub body: String,
    pub headers: HashMap<String, String>,
    pub response_time: f64,
    pub encoding: String,
    pub success: bool,
    pub error: Option<String>,
    pub is_blocked: bool,
    pub blocked_reason: Option<String>,
}

impl FetchResult {
    fn failure(url: &str, response_time: f64, error: String) -> Self {
        Self {
            url: url.to_string(),
            final_url: url.to_string(),
            status: 0,
            content_type: String::new(),
            body: String::new(),
            headers: HashMap::new(),
            response_time,
            encoding: "utf-8".to_string(),
            success: false,
            error: Some(error),
            is_blocked: false,
            blocked_reason: None,
        }
    }
}

/// Static HTTP fetcher with browser-profile rotation and anti-bot
/// detection. When proxies are configured, each request round-robins
/// across one client per proxy.
pub struct StaticFetcher {
    clients: Vec<Client>,
    client_index: AtomicUsize,
    rotator: UserAgentRotator,
}

impl StaticFetcher {
    pub fn new(
        timeout: Duration,
        rotate_user_agents: bool,
        proxies: Option<ProxyRotator>,
    ) -> anyhow::Result<Self> {
        let build = |proxy: Option<&str>| -> anyhow::Result<Client> {
            let mut builder = Client::builder()
                .timeout(timeout)
                .connect_timeout(Duration::from_secs(10))
                .redirect(reqwest::redirect::Policy::limited(10))
                .cookie_store(true);
            if let Some(proxy) = proxy {
                builder = builder.proxy(reqwest::Proxy::all(proxy)?);
            }
            Ok(builder.build()?)
        };

        let clients = match &proxies {
            Some(rotator) => {
                let mut clients = Vec::with_capacity(rotator.count());
                for _ in 0..rotator.count() {
                    clients.push(build(Some(rotator.next_proxy()))?);
                }
                clients
            }
            None => vec![build(None)?],
        };

        Ok(Self {
            clients,
            client_index: AtomicUsize::new(0),
            rotator: UserAgentRotator::new(rotate_user_agents),
        })
    }

    fn client(&self) -> &Client {
        let idx = self.client_index.fetch_add(1, Ordering::Relaxed) % self.clients.len();
        &self.clients[idx]
    }

    /// Fetch a URL. Timeouts, connection failures and protocol errors all
    /// come back as a `FetchResult` with `success = false`.
    pub async fn fetch(
        &self,
        url: &str,
        extra_headers: Option<&HashMap<String, String>>,
        cookies: Option<&HashMap<String, String>>,
    ) -> FetchResult {
        let start = Instant::now();
        let profile = self.rotator.next();

        let mut request = self.client().get(url);
        for (name, value) in self.rotator.headers(profile) {
            request = request.header(name, value);
        }
        if let Some(extra) = extra_headers {
            for (name, value) in extra {
                request = request.header(name.as_str(), value.as_str());
            }
        }
        if let Some(cookies) = cookies {
            let cookie_header = cookies
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join("; ");
            if !cookie_header.is_empty() {
                request = request.header("Cookie", cookie_header);
            }
        }

        let response = match request.send().await {
            Ok(resp) => resp,
            Err(e) => {
                let elapsed = start.elapsed().as_secs_f64();
                let message = if e.is_timeout() {
                    format!("Timeout: {e}")
                } else if e.is_connect() {
                    format!("Connection error: {e}")
                } else {
                    e.to_string()
                };
                warn!(url, error = %message, "fetch failed");
                return FetchResult::failure(url, elapsed, message);
            }
        };

        let status = response.status();
        let final_url = response.url().to_string();
        let headers: HashMap<String, String> = response
            .headers()
            .iter()
            .map(|(k, v)| {
                (
                    k.as_str().to_string(),
                    v.to_str().unwrap_or_default().to_string(),
                )
            })
            .collect();
        let content_type = headers.get("content-type").cloned().unwrap_or_default();
        let encoding = parse_charset(&content_type);

        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                let elapsed = start.elapsed().as_secs_f64();
                warn!(url, error = %e, "body read failed");
                return FetchResult::failure(url, elapsed, format!("Body read error: {e}"));
            }
        };

        let elapsed = start.elapsed().as_secs_f64();
        let (is_blocked, blocked_reason) = detect_blocking(status, &headers, &body);

        info!(
            url,
            status = status.as_u16(),
            time = format!("{elapsed:.2}s"),
            size = body.len(),
            blocked = is_blocked,
            "page fetched"
        );

        FetchResult {
            url: url.to_string(),
            final_url,
            status: status.as_u16(),
            content_type,
            body,
            headers,
            response_time: elapsed,
            encoding,
            success: status.is_success() || status.is_redirection(),
            error: None,
            is_blocked,
            blocked_reason,
        }
    }
}

fn parse_charset(content_type: &str) -> String {
    content_type
        .split(';')
        .filter_map(|part| part.trim().strip_prefix("charset="))
        .next()
        .map(|c| c.trim_matches('"').to_lowercase())
        .unwrap_or_else(|| "utf-8".to_string())
}

/// Classify a response as blocked by anti-bot measures.
pub fn detect_blocking(
    status: StatusCode,
    headers: &HashMap<String, String>,
    body: &str,
) -> (bool, Option<String>) {
    match status.as_u16() {
        403 => return (true, Some("403_forbidden".to_string())),
        429 => return (true, Some("429_rate_limited".to_string())),
        503 => {
            let server = headers
                .get("server")
                .map(|s| s.to_lowercase())
                .unwrap_or_default();
            if server.contains("cloudflare") {
                return (true, Some("cloudflare_challenge".to_string()));
            }
        }
        _ => {}
    }

    let scan: String = body
        .chars()
        .take(BODY_SCAN_LIMIT)
        .collect::<String>()
        .to_lowercase();
    if let Some(m) = indicator_matcher().find(&scan) {
        let indicator = BLOCKED_INDICATORS[m.pattern().as_usize()];
        return (true, Some(format!("blocked_indicator: {indicator}")));
    }

    (false, None)
}
