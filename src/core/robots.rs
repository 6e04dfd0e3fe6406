use chrono::{DateTime, Utc};
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use texting_robots::Robot;
use tracing::{debug, info, warn};
use url::Url;

pub const DEFAULT_ROBOTS_TTL_SECS: u64 = 3600;

/// Parsed robots.txt state for one host.
pub struct RobotsRecord {
    pub raw: String,
    pub crawl_delay: Option<f64>,
    pub sitemaps: Vec<String>,
    pub fetched_at: DateTime<Utc>,
    /// Whether a definitive robots.txt answer was obtained (200 or 404/410).
    /// Transport errors leave this false but still cache a permissive
    /// record so a flapping host is not hammered.
    pub loaded: bool,
    robot: Option<Robot>,
}

impl RobotsRecord {
    fn permissive(loaded: bool) -> Self {
        Self {
            raw: String::new(),
            crawl_delay: None,
            sitemaps: Vec::new(),
            fetched_at: Utc::now(),
            loaded,
            robot: None,
        }
    }

    fn from_body(user_agent: &str, body: String) -> Self {
        match Robot::new(user_agent, body.as_bytes()) {
            Ok(robot) => Self {
                crawl_delay: robot.delay.map(f64::from),
                sitemaps: robot.sitemaps.clone(),
                fetched_at: Utc::now(),
                loaded: true,
                robot: Some(robot),
                raw: body,
            },
            Err(e) => {
                warn!(error = %e, "robots.txt parse failed, treating as permissive");
                Self::permissive(true)
            }
        }
    }

    /// Longest-match-wins path check. Hosts without rules are allowed.
    pub fn allows(&self, url: &str) -> bool {
        match &self.robot {
            Some(robot) => robot.allowed(url),
            None => true,
        }
    }
}

/// Per-host robots.txt cache.
///
/// Records live for `ttl`; concurrent misses for the same host coalesce
/// into a single fetch, so a cold cache never triggers N simultaneous
/// robots.txt downloads from N workers.
pub struct RobotsCache {
    client: Client,
    user_agent: String,
    cache: moka::future::Cache<String, Arc<RobotsRecord>>,
}

impl RobotsCache {
    pub fn new(client: Client, user_agent: &str, ttl: Duration) -> Self {
        Self {
            client,
            user_agent: user_agent.to_string(),
            cache: moka::future::Cache::builder()
                .max_capacity(10_000)
                .time_to_live(ttl)
                .build(),
        }
    }

    fn robots_url(url: &str) -> Option<(String, String)> {
        let parsed = Url::parse(url).ok()?;
        let host = parsed.host_str()?;
        let origin = match parsed.port() {
            Some(port) => format!("{}://{}:{}", parsed.scheme(), host, port),
            None => format!("{}://{}", parsed.scheme(), host),
        };
        Some((origin.clone(), format!("{origin}/robots.txt")))
    }

    /// Fetch, parse and cache the robots.txt governing `url`. Returns the
    /// cached record while it is fresh.
    pub async fn fetch_and_parse(&self, url: &str) -> Arc<RobotsRecord> {
        let Some((origin, robots_url)) = Self::robots_url(url) else {
            return Arc::new(RobotsRecord::permissive(false));
        };

        self.cache
            .get_with(origin.clone(), async move {
                Arc::new(self.fetch_record(&origin, &robots_url).await)
            })
            .await
    }

    async fn fetch_record(&self, origin: &str, robots_url: &str) -> RobotsRecord {
        let response = self
            .client
            .get(robots_url)
            .header(
                "User-Agent",
                crate::scraping::antibot::random_profile().user_agent,
            )
            .timeout(Duration::from_secs(15))
            .send()
            .await;

        match response {
            Ok(resp) => {
                let status = resp.status().as_u16();
                match status {
                    200 => match resp.text().await {
                        Ok(body) => {
                            let record = RobotsRecord::from_body(&self.user_agent, body);
                            info!(
                                origin,
                                sitemaps = record.sitemaps.len(),
                                crawl_delay = ?record.crawl_delay,
                                "robots.txt loaded"
                            );
                            record
                        }
                        Err(e) => {
                            warn!(origin, error = %e, "robots.txt body read failed");
                            RobotsRecord::permissive(false)
                        }
                    },
                    404 | 410 => {
                        info!(origin, "no robots.txt, everything allowed");
                        RobotsRecord::permissive(true)
                    }
                    other => {
                        warn!(origin, status = other, "robots.txt fetch error, failing open");
                        RobotsRecord::permissive(false)
                    }
                }
            }
            Err(e) => {
                warn!(origin, error = %e, "robots.txt fetch exception, failing open");
                RobotsRecord::permissive(false)
            }
        }
    }

    /// Whether the crawler may fetch `url`, fetching robots.txt first if
    /// the host is cold.
    pub async fn can_fetch(&self, url: &str) -> bool {
        let record = self.fetch_and_parse(url).await;
        let allowed = record.allows(url);
        if !allowed {
            debug!(url, "blocked by robots.txt");
        }
        allowed
    }

    /// Crawl-delay advertised for our user agent, fetching robots.txt
    /// first if the host is cold.
    pub async fn crawl_delay(&self, url: &str) -> Option<f64> {
        self.fetch_and_parse(url).await.crawl_delay
    }

    /// Sitemap URLs listed by the host's robots.txt, if already cached.
    pub async fn sitemaps(&self, url: &str) -> Vec<String> {
        self.fetch_and_parse(url).await.sitemaps.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const UA: &str = "IAWIC";

    #[test]
    fn test_disallow_rules() {
        let record = RobotsRecord::from_body(
            UA,
            "User-agent: *\nDisallow: /private".to_string(),
        );
        assert!(!record.allows("https://h.test/private/x"));
        assert!(record.allows("https://h.test/public"));
    }

    #[test]
    fn test_longest_match_wins() {
        let record = RobotsRecord::from_body(
            UA,
            "User-agent: *\nDisallow: /shop\nAllow: /shop/public".to_string(),
        );
        assert!(!record.allows("https://h.test/shop/cart"));
        assert!(record.allows("https://h.test/shop/public/item"));
    }

    #[test]
    fn test_agent_specific_section() {
        let record = RobotsRecord::from_body(
            UA,
            "User-agent: IAWIC\nDisallow: /only-for-us\n\nUser-agent: *\nDisallow: /everyone"
                .to_string(),
        );
        assert!(!record.allows("https://h.test/only-for-us"));
        // The specific section replaces the wildcard for our agent.
        assert!(record.allows("https://h.test/everyone"));
    }

    #[test]
    fn test_crawl_delay_and_sitemaps() {
        let record = RobotsRecord::from_body(
            UA,
            "User-agent: *\nCrawl-delay: 2.5\nSitemap: https://h.test/sitemap.xml".to_string(),
        );
        assert_eq!(record.crawl_delay, Some(2.5));
        assert_eq!(record.sitemaps, vec!["https://h.test/sitemap.xml"]);
    }

    #[test]
    fn test_permissive_record_allows_everything() {
        let record = RobotsRecord::permissive(true);
        assert!(record.allows("https://h.test/anything/at/all"));
    }

    #[test]
    fn test_robots_url_construction() {
        let (origin, robots) =
            RobotsCache::robots_url("https://h.test/deep/page?q=1").unwrap();
        assert_eq!(origin, "https://h.test");
        assert_eq!(robots, "https://h.test/robots.txt");

        let (origin, robots) = RobotsCache::robots_url("http://h.test:8080/x").unwrap();
        assert_eq!(origin, "http://h.test:8080");
        assert_eq!(robots, "http://h.test:8080/robots.txt");
    }
}
