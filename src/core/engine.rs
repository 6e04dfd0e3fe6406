use crate::core::config::{IawicConfig, RenderMode};
use crate::core::frontier::{FrontierStats, UrlEntry, UrlFrontier, UrlPriority};
use crate::core::normalizer::UrlNormalizer;
use crate::core::page::{MetadataBundle, PageLinks, PageRecord};
use crate::core::rate_limiter::AdaptiveRateLimiter;
use crate::core::robots::{RobotsCache, DEFAULT_ROBOTS_TTL_SECS};
use crate::core::session::SessionManager;
use crate::extraction::links::{LinkData, LinkExtractor};
use crate::extraction::{entities, headings, media, metadata, structured};
use crate::intelligence::dedup::ContentDeduplicator;
use crate::intelligence::{classifier, content, language};
use crate::scraping::antibot::ProxyRotator;
use crate::scraping::fetcher::StaticFetcher;
use crate::scraping::renderer::{HeadlessRenderer, PageRenderer, RenderRequest};
use crate::storage::PageSink;
use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use url::Url;

/// Identifies this crawler to robots.txt.
pub const USER_AGENT: &str = "IAWIC";

const WORKER_POLL: Duration = Duration::from_secs(2);
const MAX_RETRIES: u32 = 3;
const MAX_EXTERNAL_LINKS: usize = 10;
/// Below this many bytes of static HTML, `auto` mode assumes the page is
/// client-rendered.
const AUTO_RENDER_MIN_BYTES: usize = 1000;

#[derive(Debug, Clone, Serialize)]
pub struct CrawlSummary {
    pub pages_crawled: u64,
    pub pages_failed: u64,
    pub robots_denied: u64,
    pub duplicates_skipped: u64,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_seconds: f64,
    pub pages_per_second: f64,
    pub frontier: FrontierStats,
}

#[derive(Default)]
struct EngineStats {
    pages_crawled: AtomicU64,
    pages_failed: AtomicU64,
    robots_denied: AtomicU64,
    duplicates_skipped: AtomicU64,
    start_time: std::sync::Mutex<Option<DateTime<Utc>>>,
    end_time: std::sync::Mutex<Option<DateTime<Utc>>>,
}

/// What happened to one URL. Every popped entry resolves to exactly one
/// of these, which the worker maps onto {crawled, dropped, failed}.
enum CrawlOutcome {
    Crawled {
        record: Box<PageRecord>,
        links: LinkData,
    },
    Dropped,
    Failed,
}

/// Orchestrates the crawl: a pool of workers pulls from the frontier,
/// consults robots and the rate limiter, fetches (static first, headless
/// on demand), extracts, and hands page records to the sinks.
pub struct CrawlEngine {
    config: IawicConfig,
    frontier: UrlFrontier,
    rate_limiter: AdaptiveRateLimiter,
    robots: RobotsCache,
    normalizer: UrlNormalizer,
    link_extractor: LinkExtractor,
    fetcher: StaticFetcher,
    session: SessionManager,
    renderer: Option<Arc<dyn PageRenderer>>,
    sinks: Vec<Arc<dyn PageSink>>,
    deduper: Option<Mutex<ContentDeduplicator>>,
    /// Hosts whose robots crawl-delay has already been applied.
    delay_applied: Mutex<HashSet<String>>,
    stats: EngineStats,
    running: AtomicBool,
    in_flight: AtomicUsize,
    closed: AtomicBool,
}

impl CrawlEngine {
    pub fn new(config: IawicConfig) -> anyhow::Result<Self> {
        config.validate()?;
        let crawl = &config.crawl;

        let robots_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .context("failed to build robots HTTP client")?;

        let proxies = if crawl.use_proxies {
            ProxyRotator::new(config.proxy.proxies.clone())
        } else {
            None
        };

        let fetcher = StaticFetcher::new(
            Duration::from_secs(crawl.page_timeout),
            crawl.rotate_user_agents,
            proxies,
        )
        .context("failed to build static fetcher")?;

        let renderer: Option<Arc<dyn PageRenderer>> = match crawl.render_mode {
            RenderMode::Static => None,
            RenderMode::Javascript | RenderMode::Auto => Some(Arc::new(HeadlessRenderer::new(
                Duration::from_secs(crawl.render_timeout),
                (1920, 1080),
                crawl.rotate_user_agents,
                false,
            ))),
        };

        let normalizer = UrlNormalizer::default();

        Ok(Self {
            frontier: UrlFrontier::new(crawl.crawl_depth, crawl.max_pages),
            rate_limiter: AdaptiveRateLimiter::new(
                crawl.requests_per_second,
                crawl.min_delay,
                crawl.max_delay,
                crawl.adaptive_delay,
            ),
            robots: RobotsCache::new(
                robots_client,
                USER_AGENT,
                Duration::from_secs(DEFAULT_ROBOTS_TTL_SECS),
            ),
            link_extractor: LinkExtractor::new(normalizer.clone(), crawl.include_subdomains),
            normalizer,
            fetcher,
            session: SessionManager::from_config(&config.session),
            renderer,
            sinks: Vec::new(),
            deduper: if crawl.enable_dedup {
                Some(Mutex::new(ContentDeduplicator::new(
                    crawl.similarity_threshold,
                )))
            } else {
                None
            },
            delay_applied: Mutex::new(HashSet::new()),
            stats: EngineStats::default(),
            running: AtomicBool::new(false),
            in_flight: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
            config,
        })
    }

    pub fn with_sink(mut self, sink: Arc<dyn PageSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Swap the renderer, primarily so tests can run without a browser.
    pub fn with_renderer(mut self, renderer: Arc<dyn PageRenderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    /// Crawl from `seed_url` until the frontier drains, the page budget is
    /// exhausted, or a stop is requested. Tears down resources before
    /// returning. Call as `Arc::clone(&engine).start(url)`.
    pub async fn start(self: Arc<Self>, seed_url: &str) -> anyhow::Result<CrawlSummary> {
        let seed = self
            .normalizer
            .normalize(seed_url, None)
            .with_context(|| format!("seed URL is not crawlable: {seed_url}"))?;

        info!(seed = %seed, workers = self.config.workers, "crawler starting");
        *self.stats.start_time.lock().expect("stats lock") = Some(Utc::now());
        self.running.store(true, Ordering::SeqCst);

        self.frontier
            .add(&seed, 0, UrlPriority::Critical, "", None)
            .await;

        let mut handles = Vec::with_capacity(self.config.workers);
        for worker_id in 0..self.config.workers {
            let engine = Arc::clone(&self);
            handles.push(tokio::spawn(async move {
                engine.worker(worker_id).await;
            }));
        }

        for handle in handles {
            if let Err(e) = handle.await {
                error!("worker task join error: {}", e);
            }
        }

        self.stop().await;
        let summary = self.summary().await;
        info!(
            pages_crawled = summary.pages_crawled,
            pages_failed = summary.pages_failed,
            duration = format!("{:.1}s", summary.duration_seconds),
            "crawler stopped"
        );
        Ok(summary)
    }

    /// Signal workers to exit. They finish the URL in hand and observe the
    /// stop before their next frontier pop.
    pub fn request_stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Close renderer and sinks. Idempotent; `start` calls it on the way
    /// out and signal handling may call it again.
    pub async fn stop(&self) {
        self.request_stop();
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        *self.stats.end_time.lock().expect("stats lock") = Some(Utc::now());

        if let Some(renderer) = &self.renderer {
            renderer.close().await;
        }
        for sink in &self.sinks {
            if let Err(e) = sink.close().await {
                error!(sink = sink.name(), error = %e, "sink close failed");
            }
        }
    }

    pub async fn summary(&self) -> CrawlSummary {
        let start_time = *self.stats.start_time.lock().expect("stats lock");
        let end_time = *self.stats.end_time.lock().expect("stats lock");
        let duration_seconds = match (start_time, end_time) {
            (Some(start), Some(end)) => (end - start).num_milliseconds() as f64 / 1000.0,
            _ => 0.0,
        };
        let pages_crawled = self.stats.pages_crawled.load(Ordering::Relaxed);

        CrawlSummary {
            pages_crawled,
            pages_failed: self.stats.pages_failed.load(Ordering::Relaxed),
            robots_denied: self.stats.robots_denied.load(Ordering::Relaxed),
            duplicates_skipped: self.stats.duplicates_skipped.load(Ordering::Relaxed),
            start_time,
            end_time,
            duration_seconds,
            pages_per_second: if duration_seconds > 0.0 {
                pages_crawled as f64 / duration_seconds
            } else {
                0.0
            },
            frontier: self.frontier.stats().await,
        }
    }

    async fn worker(self: Arc<Self>, worker_id: usize) {
        debug!(worker_id, "worker started");

        loop {
            if !self.running.load(Ordering::SeqCst) {
                break;
            }
            if self.stats.pages_crawled.load(Ordering::Relaxed)
                >= self.config.crawl.max_pages as u64
            {
                debug!(worker_id, "page budget reached");
                break;
            }

            let Some(entry) = self.frontier.get(WORKER_POLL).await else {
                // Exit only once nothing is queued and no sibling can
                // still discover links.
                if self.frontier.is_empty().await && self.in_flight.load(Ordering::SeqCst) == 0 {
                    break;
                }
                continue;
            };

            self.in_flight.fetch_add(1, Ordering::SeqCst);
            self.process_entry(&entry).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
        }

        debug!(worker_id, "worker stopped");
    }

    /// Resolve one popped entry to exactly one of crawled, dropped, or
    /// failed-with-optional-retry. Nothing here may take the worker down.
    async fn process_entry(&self, entry: &UrlEntry) {
        match self.crawl_page(entry).await {
            Ok(CrawlOutcome::Crawled { record, links }) => {
                self.frontier.mark_crawled(&entry.url).await;
                self.stats.pages_crawled.fetch_add(1, Ordering::Relaxed);

                let duplicate = match &self.deduper {
                    Some(deduper) => {
                        let result = deduper
                            .lock()
                            .await
                            .check(&record.url, &record.text_content);
                        if result.is_duplicate {
                            self.stats.duplicates_skipped.fetch_add(1, Ordering::Relaxed);
                            info!(
                                url = %record.url,
                                matching_url = result.matching_url.as_deref().unwrap_or_default(),
                                method = %result.method,
                                "duplicate content, not saved"
                            );
                        }
                        result.is_duplicate
                    }
                    None => false,
                };

                if !duplicate {
                    for sink in &self.sinks {
                        if let Err(e) = sink.save_page(&record).await {
                            error!(sink = sink.name(), url = %record.url, error = %e, "sink save failed");
                        }
                    }
                }

                self.enqueue_links(&links, entry).await;
            }
            Ok(CrawlOutcome::Dropped) => {}
            Ok(CrawlOutcome::Failed) => {
                self.handle_failure(entry).await;
            }
            Err(e) => {
                error!(url = %entry.url, error = %e, "crawl error");
                self.handle_failure(entry).await;
            }
        }
    }

    async fn handle_failure(&self, entry: &UrlEntry) {
        self.stats.pages_failed.fetch_add(1, Ordering::Relaxed);
        let should_retry = self.frontier.mark_failed(&entry.url, MAX_RETRIES).await;
        if should_retry {
            self.frontier.requeue(entry, UrlPriority::Low).await;
            debug!(url = %entry.url, retry = entry.retry_count + 1, "re-enqueued for retry");
        } else {
            debug!(url = %entry.url, "terminally failed");
        }
    }

    async fn crawl_page(&self, entry: &UrlEntry) -> anyhow::Result<CrawlOutcome> {
        let url = entry.url.as_str();
        let Some(domain) = Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.to_string()))
        else {
            debug!(url, "unparseable URL dropped");
            return Ok(CrawlOutcome::Dropped);
        };

        if self.config.crawl.respect_robots_txt {
            if !self.robots.can_fetch(url).await {
                self.stats.robots_denied.fetch_add(1, Ordering::Relaxed);
                debug!(url, "disallowed by robots.txt");
                return Ok(CrawlOutcome::Dropped);
            }
            self.apply_crawl_delay(url, &domain).await;
        }

        self.rate_limiter.acquire(&domain).await;

        let fetch = self
            .fetcher
            .fetch(url, self.session.headers(), self.session.cookies())
            .await;
        self.rate_limiter
            .record(&domain, fetch.response_time, fetch.success, fetch.status)
            .await;

        if !fetch.success {
            warn!(url, status = fetch.status, error = ?fetch.error, "fetch unsuccessful");
            return Ok(CrawlOutcome::Failed);
        }
        if fetch.is_blocked {
            warn!(url, reason = ?fetch.blocked_reason, "fetch blocked");
            return Ok(CrawlOutcome::Failed);
        }

        let mut html = fetch.body;
        let mut status = fetch.status;
        let mut final_url = fetch.final_url;

        if self.needs_js_render(&html) {
            if let Some(renderer) = &self.renderer {
                info!(url, "using JS rendering");
                let render = renderer.render(RenderRequest::new(url)).await;
                if render.success && !render.is_blocked {
                    html = render.html;
                    status = render.status;
                    final_url = render.final_url;
                } else {
                    warn!(
                        url,
                        error = ?render.error,
                        blocked = ?render.blocked_reason,
                        "JS render failed, keeping static HTML"
                    );
                }
            }
        }

        let (record, links) =
            self.build_page_record(url, &final_url, &domain, entry.depth, status, html);
        Ok(CrawlOutcome::Crawled {
            record: Box::new(record),
            links,
        })
    }

    /// Hand a robots crawl-delay to the rate limiter, once per host.
    async fn apply_crawl_delay(&self, url: &str, domain: &str) {
        {
            let mut applied = self.delay_applied.lock().await;
            if !applied.insert(domain.to_string()) {
                return;
            }
        }
        if let Some(delay) = self.robots.crawl_delay(url).await {
            self.rate_limiter.set_crawl_delay(domain, delay).await;
        }
    }

    fn needs_js_render(&self, html: &str) -> bool {
        match self.config.crawl.render_mode {
            RenderMode::Javascript => true,
            RenderMode::Auto => html.len() < AUTO_RENDER_MIN_BYTES || !html.contains("<a"),
            RenderMode::Static => false,
        }
    }

    /// Run the extractors over fetched HTML and assemble the page record.
    /// Deliberately synchronous: parsed DOM state never crosses an await.
    fn build_page_record(
        &self,
        url: &str,
        final_url: &str,
        domain: &str,
        depth: usize,
        status: u16,
        html: String,
    ) -> (PageRecord, LinkData) {
        let crawl = &self.config.crawl;

        let meta = metadata::extract(&html, url);
        let cleaned = content::clean(&html, url, crawl.enable_content_cleaning);
        let links = self.link_extractor.extract(&html, url);

        let entities = if crawl.extract_entities {
            entities::extract(&html, &cleaned.text)
        } else {
            Default::default()
        };

        let structured_data = if crawl.extract_structured_data {
            structured::extract(&html)
        } else {
            Default::default()
        };

        let media = if crawl.extract_images || crawl.extract_videos || crawl.extract_files {
            let mut media = media::extract(&html, url);
            if !crawl.extract_images {
                media.images.clear();
            }
            if !crawl.extract_videos {
                media.videos.clear();
            }
            if !crawl.extract_files {
                media.files.clear();
            }
            Some(media)
        } else {
            None
        };

        let language_detected = if crawl.enable_language_detection {
            Some(language::detect(&html, &cleaned.text))
        } else {
            None
        };

        let classification = if crawl.enable_classification {
            Some(classifier::classify(&html, url, &structured_data))
        } else {
            None
        };

        let record = PageRecord {
            url: url.to_string(),
            final_url: final_url.to_string(),
            domain: domain.to_string(),
            depth,
            status,
            title: meta.title,
            description: meta.description,
            text_content: if crawl.extract_text_content {
                cleaned.text
            } else {
                String::new()
            },
            html: if crawl.store_html { html.clone() } else { String::new() },
            metadata: MetadataBundle {
                canonical_url: meta.canonical_url,
                language: meta.language,
                author: meta.author,
                keywords: meta.keywords,
                og: meta.og,
                twitter: meta.twitter,
            },
            links: PageLinks {
                internal: links.internal.clone(),
                external: links.external.clone(),
            },
            entities,
            media,
            headings: headings::extract(&html),
            structured_data: structured_data.json_ld,
            language_detected,
            classification,
            crawled_at: Utc::now(),
        };

        (record, links)
    }

    async fn enqueue_links(&self, links: &LinkData, parent: &UrlEntry) {
        let next_depth = parent.depth + 1;

        self.frontier
            .add_many(&links.internal, next_depth, UrlPriority::Normal, &parent.url)
            .await;

        if self.config.crawl.follow_external_links {
            let external: Vec<String> = links
                .external
                .iter()
                .take(MAX_EXTERNAL_LINKS)
                .cloned()
                .collect();
            self.frontier
                .add_many(&external, next_depth, UrlPriority::Deferred, &parent.url)
                .await;
        }
    }

    pub fn frontier(&self) -> &UrlFrontier {
        &self.frontier
    }

    pub fn rate_limiter(&self) -> &AdaptiveRateLimiter {
        &self.rate_limiter
    }
}
