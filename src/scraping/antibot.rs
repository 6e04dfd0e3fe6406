use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::info;

/// A realistic browser fingerprint: user agent plus the Accept headers a
/// real installation of that browser sends.
#[derive(Debug, Clone)]
pub struct BrowserProfile {
    pub user_agent: &'static str,
    pub accept: &'static str,
    pub accept_language: &'static str,
    pub accept_encoding: &'static str,
    pub platform: &'static str,
    pub viewport_width: u32,
    pub viewport_height: u32,
}

/// Six desktop profiles covering Chrome/Firefox/Safari/Edge across
/// Windows, macOS and Linux.
pub const PROFILES: &[BrowserProfile] = &[
    BrowserProfile {
        user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
        accept: "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8",
        accept_language: "en-US,en;q=0.9",
        accept_encoding: "gzip, deflate, br",
        platform: "Windows",
        viewport_width: 1920,
        viewport_height: 1080,
    },
    BrowserProfile {
        user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
        accept: "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8",
        accept_language: "en-US,en;q=0.9",
        accept_encoding: "gzip, deflate, br",
        platform: "macOS",
        viewport_width: 1440,
        viewport_height: 900,
    },
    BrowserProfile {
        user_agent: "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/130.0.0.0 Safari/537.36",
        accept: "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8",
        accept_language: "en-US,en;q=0.9",
        accept_encoding: "gzip, deflate, br",
        platform: "Linux",
        viewport_width: 1920,
        viewport_height: 1080,
    },
    BrowserProfile {
        user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:122.0) Gecko/20100101 Firefox/122.0",
        accept: "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8",
        accept_language: "en-US,en;q=0.5",
        accept_encoding: "gzip, deflate, br",
        platform: "Windows",
        viewport_width: 1920,
        viewport_height: 1080,
    },
    BrowserProfile {
        user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.2.1 Safari/605.1.15",
        accept: "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
        accept_language: "en-US,en;q=0.9",
        accept_encoding: "gzip, deflate, br",
        platform: "macOS",
        viewport_width: 1680,
        viewport_height: 1050,
    },
    BrowserProfile {
        user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36 Edg/131.0.0.0",
        accept: "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,image/apng,*/*;q=0.8",
        accept_language: "en-US,en;q=0.9",
        accept_encoding: "gzip, deflate, br",
        platform: "Windows",
        viewport_width: 1920,
        viewport_height: 1080,
    },
];

/// Pick a random browser profile.
pub fn random_profile() -> &'static BrowserProfile {
    use rand::prelude::*;
    let mut rng = rand::rng();
    let index = rng.random_range(0..PROFILES.len());
    &PROFILES[index]
}

/// Round-robin profile rotation; falls back to the first profile when
/// rotation is disabled so every request carries the same fingerprint.
pub struct UserAgentRotator {
    rotate: bool,
    index: AtomicUsize,
}

impl UserAgentRotator {
    pub fn new(rotate: bool) -> Self {
        Self {
            rotate,
            index: AtomicUsize::new(0),
        }
    }

    pub fn next(&self) -> &'static BrowserProfile {
        if !self.rotate {
            return &PROFILES[0];
        }
        let i = self.index.fetch_add(1, Ordering::Relaxed);
        &PROFILES[i % PROFILES.len()]
    }

    /// Full request header set for a profile, mirroring what the browser
    /// itself would send on a top-level navigation.
    pub fn headers(&self, profile: &BrowserProfile) -> Vec<(&'static str, String)> {
        vec![
            ("User-Agent", profile.user_agent.to_string()),
            ("Accept", profile.accept.to_string()),
            ("Accept-Language", profile.accept_language.to_string()),
            ("Accept-Encoding", profile.accept_encoding.to_string()),
            ("DNT", "1".to_string()),
            ("Connection", "keep-alive".to_string()),
            ("Upgrade-Insecure-Requests", "1".to_string()),
            ("Sec-Fetch-Dest", "document".to_string()),
            ("Sec-Fetch-Mode", "navigate".to_string()),
            ("Sec-Fetch-Site", "none".to_string()),
            ("Sec-Fetch-User", "?1".to_string()),
            ("Cache-Control", "max-age=0".to_string()),
        ]
    }
}

/// Round-robin proxy rotation over a configured list
/// (`http://host:port` or `socks5://host:port` entries).
#[derive(Debug, Clone)]
pub struct ProxyRotator {
    proxies: Vec<String>,
    current: Arc<AtomicUsize>,
}

impl ProxyRotator {
    pub fn new(proxies: Vec<String>) -> Option<Self> {
        let proxies: Vec<String> = proxies
            .into_iter()
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect();
        if proxies.is_empty() {
            return None;
        }
        info!("Loaded {} proxies for rotation", proxies.len());
        Some(Self {
            proxies,
            current: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn next_proxy(&self) -> &str {
        let idx = self.current.fetch_add(1, Ordering::Relaxed) % self.proxies.len();
        &self.proxies[idx]
    }

    pub fn count(&self) -> usize {
        self.proxies.len()
    }
}
