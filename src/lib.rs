pub mod core;
pub mod extraction;
pub mod intelligence;
pub mod scraping;
pub mod storage;

// --- Primary exports ---
pub use crate::core::config::{CrawlConfig, IawicConfig, RenderMode};
pub use crate::core::engine::{CrawlEngine, CrawlSummary, USER_AGENT};
pub use crate::core::frontier::{UrlFrontier, UrlPriority};
pub use crate::core::normalizer::UrlNormalizer;
pub use crate::core::page::PageRecord;
pub use crate::core::rate_limiter::AdaptiveRateLimiter;
pub use crate::core::robots::RobotsCache;
pub use crate::scraping::fetcher::StaticFetcher;
pub use crate::scraping::renderer::{PageRenderer, RenderRequest, RenderResult};
pub use crate::storage::{JsonBatchWriter, PageSink};
