use crate::core::page::PageRecord;
use crate::storage::PageSink;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info};

const DEFAULT_BATCH_SIZE: usize = 100;

struct WriterState {
    current_batch: Vec<serde_json::Value>,
    batch_count: u32,
    total_pages: u64,
}

/// Writes crawled pages as batched JSON files:
/// `batch_0001.json`, `batch_0002.json`, ... each shaped
/// `{batch, count, timestamp, pages}`, plus a final `summary.json`.
pub struct JsonBatchWriter {
    output_dir: PathBuf,
    batch_size: usize,
    pretty: bool,
    state: Mutex<WriterState>,
}

impl JsonBatchWriter {
    pub fn new(output_dir: impl AsRef<Path>) -> anyhow::Result<Self> {
        Self::with_options(output_dir, DEFAULT_BATCH_SIZE, true)
    }

    pub fn with_options(
        output_dir: impl AsRef<Path>,
        batch_size: usize,
        pretty: bool,
    ) -> anyhow::Result<Self> {
        let output_dir = output_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&output_dir)?;
        Ok(Self {
            output_dir,
            batch_size: batch_size.max(1),
            pretty,
            state: Mutex::new(WriterState {
                current_batch: Vec::new(),
                batch_count: 0,
                total_pages: 0,
            }),
        })
    }

    fn encode(&self, value: &serde_json::Value) -> anyhow::Result<String> {
        Ok(if self.pretty {
            serde_json::to_string_pretty(value)?
        } else {
            serde_json::to_string(value)?
        })
    }

    async fn flush_locked(&self, state: &mut WriterState) -> anyhow::Result<()> {
        if state.current_batch.is_empty() {
            return Ok(());
        }

        state.batch_count += 1;
        let filename = self
            .output_dir
            .join(format!("batch_{:04}.json", state.batch_count));
        let data = json!({
            "batch": state.batch_count,
            "count": state.current_batch.len(),
            "timestamp": Utc::now().to_rfc3339(),
            "pages": state.current_batch,
        });

        tokio::fs::write(&filename, self.encode(&data)?).await?;
        info!(
            batch = state.batch_count,
            count = state.current_batch.len(),
            file = %filename.display(),
            "batch written"
        );
        state.current_batch.clear();
        Ok(())
    }

    /// Force the current partial batch to disk.
    pub async fn flush(&self) -> anyhow::Result<()> {
        let mut state = self.state.lock().await;
        self.flush_locked(&mut state).await
    }

    /// Write the crawl summary next to the batches.
    pub async fn save_summary(&self, summary: &serde_json::Value) -> anyhow::Result<()> {
        let filename = self.output_dir.join("summary.json");
        tokio::fs::write(&filename, self.encode(summary)?).await?;
        info!(file = %filename.display(), "summary written");
        Ok(())
    }

    pub async fn total_pages(&self) -> u64 {
        self.state.lock().await.total_pages
    }
}

#[async_trait]
impl PageSink for JsonBatchWriter {
    fn name(&self) -> &str {
        "json_batch_writer"
    }

    async fn save_page(&self, page: &PageRecord) -> anyhow::Result<()> {
        let value = serde_json::to_value(page)?;
        let mut state = self.state.lock().await;
        state.current_batch.push(value);
        state.total_pages += 1;

        if state.current_batch.len() >= self.batch_size {
            self.flush_locked(&mut state).await?;
        }
        Ok(())
    }

    async fn close(&self) -> anyhow::Result<()> {
        self.flush().await?;
        debug!("json output closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::page::PageRecord;

    fn page(url: &str) -> PageRecord {
        PageRecord {
            url: url.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_batches_rotate_at_batch_size() {
        let dir = tempfile::tempdir().unwrap();
        let writer = JsonBatchWriter::with_options(dir.path(), 2, false).unwrap();

        for i in 0..5 {
            writer
                .save_page(&page(&format!("https://a.test/{i}")))
                .await
                .unwrap();
        }
        writer.close().await.unwrap();

        let batch1 = dir.path().join("batch_0001.json");
        let batch2 = dir.path().join("batch_0002.json");
        let batch3 = dir.path().join("batch_0003.json");
        assert!(batch1.exists() && batch2.exists() && batch3.exists());

        let parsed: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&batch1).unwrap()).unwrap();
        assert_eq!(parsed["batch"], 1);
        assert_eq!(parsed["count"], 2);
        assert_eq!(parsed["pages"].as_array().unwrap().len(), 2);
        assert!(parsed["timestamp"].is_string());

        // The last batch holds the remainder.
        let parsed: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&batch3).unwrap()).unwrap();
        assert_eq!(parsed["count"], 1);
    }

    #[tokio::test]
    async fn test_close_without_pages_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let writer = JsonBatchWriter::new(dir.path()).unwrap();
        writer.close().await.unwrap();
        assert!(std::fs::read_dir(dir.path()).unwrap().next().is_none());
    }

    #[tokio::test]
    async fn test_summary_written() {
        let dir = tempfile::tempdir().unwrap();
        let writer = JsonBatchWriter::new(dir.path()).unwrap();
        writer
            .save_summary(&serde_json::json!({"pages_crawled": 7}))
            .await
            .unwrap();

        let parsed: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(dir.path().join("summary.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(parsed["pages_crawled"], 7);
    }
}
