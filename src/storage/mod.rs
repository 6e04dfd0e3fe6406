pub mod json_output;

use crate::core::page::PageRecord;
use async_trait::async_trait;

pub use self::json_output::JsonBatchWriter;

/// Append-only destination for crawled pages. Sinks must tolerate
/// concurrent `save_page` calls from multiple workers; a failing sink is
/// logged and skipped, never fatal to the crawl.
#[async_trait]
pub trait PageSink: Send + Sync {
    fn name(&self) -> &str;
    async fn save_page(&self, page: &PageRecord) -> anyhow::Result<()>;
    async fn close(&self) -> anyhow::Result<()>;
}
