use crate::intelligence::fingerprint::url_hash;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;
use tracing::debug;

/// Crawl priority levels, lowest value popped first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum UrlPriority {
    /// Sitemaps, seed pages.
    Critical = 0,
    /// Main navigation pages.
    High = 1,
    /// Standard discovered links.
    Normal = 2,
    /// Deep pages, pagination, retries.
    Low = 3,
    /// External links, low-value pages.
    Deferred = 4,
}

/// Single URL entry in the frontier.
#[derive(Debug, Clone)]
pub struct UrlEntry {
    pub url: String,
    pub depth: usize,
    pub priority: UrlPriority,
    pub parent_url: String,
    pub discovered_at: DateTime<Utc>,
    pub retry_count: u32,
    pub metadata: HashMap<String, String>,
}

/// Heap key: `(priority, depth, insertion sequence)`, lexicographic,
/// lowest first. The sequence number both carries the discovery order and
/// breaks ties deterministically.
#[derive(Debug)]
struct HeapItem {
    entry: UrlEntry,
    seq: u64,
}

impl HeapItem {
    fn key(&self) -> (UrlPriority, usize, u64) {
        (self.entry.priority, self.entry.depth, self.seq)
    }
}

impl PartialEq for HeapItem {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for HeapItem {}

impl PartialOrd for HeapItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapItem {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct FrontierStats {
    pub queue_size: usize,
    pub total_added: u64,
    pub total_crawled: usize,
    pub total_seen: usize,
    pub total_failed: usize,
    pub duplicates_skipped: u64,
}

#[derive(Default)]
struct FrontierInner {
    queue: BinaryHeap<Reverse<HeapItem>>,
    seen: HashSet<[u8; 16]>,
    crawled: HashSet<[u8; 16]>,
    failed: HashMap<[u8; 16], u32>,
    next_seq: u64,
    total_added: u64,
    duplicates_skipped: u64,
}

/// Priority-based URL frontier shared by all workers.
///
/// One mutex guards the whole structure; every URL in the queue is also in
/// the seen set, and an entry is handed to exactly one consumer.
pub struct UrlFrontier {
    max_depth: usize,
    max_urls: usize,
    inner: Mutex<FrontierInner>,
    not_empty: Notify,
}

impl UrlFrontier {
    pub fn new(max_depth: usize, max_urls: usize) -> Self {
        Self {
            max_depth,
            max_urls,
            inner: Mutex::new(FrontierInner::default()),
            not_empty: Notify::new(),
        }
    }

    /// Add a URL if it has not been seen. Returns `true` only when the URL
    /// was newly admitted to the queue.
    pub async fn add(
        &self,
        url: &str,
        depth: usize,
        priority: UrlPriority,
        parent_url: &str,
        metadata: Option<HashMap<String, String>>,
    ) -> bool {
        let hash = url_hash(url);
        let mut inner = self.inner.lock().await;

        if inner.seen.contains(&hash) {
            inner.duplicates_skipped += 1;
            return false;
        }
        if depth > self.max_depth {
            return false;
        }
        if inner.queue.len() >= self.max_urls {
            debug!(url, "frontier at capacity, dropping");
            return false;
        }

        inner.seen.insert(hash);
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.queue.push(Reverse(HeapItem {
            entry: UrlEntry {
                url: url.to_string(),
                depth,
                priority,
                parent_url: parent_url.to_string(),
                discovered_at: Utc::now(),
                retry_count: 0,
                metadata: metadata.unwrap_or_default(),
            },
            seq,
        }));
        inner.total_added += 1;
        drop(inner);

        self.not_empty.notify_one();
        true
    }

    /// Add a batch of URLs at the same depth and priority. Returns the
    /// number actually admitted.
    pub async fn add_many(
        &self,
        urls: &[String],
        depth: usize,
        priority: UrlPriority,
        parent_url: &str,
    ) -> usize {
        let mut added = 0;
        for url in urls {
            if self.add(url, depth, priority, parent_url, None).await {
                added += 1;
            }
        }
        added
    }

    /// Pop the lowest-key entry, waiting up to `timeout` for one to appear.
    /// Safe for multiple concurrent consumers.
    pub async fn get(&self, timeout: Duration) -> Option<UrlEntry> {
        let deadline = Instant::now() + timeout;
        loop {
            // Register interest before checking the queue so an `add`
            // between the check and the await cannot be missed.
            let notified = self.not_empty.notified();
            {
                let mut inner = self.inner.lock().await;
                if let Some(Reverse(item)) = inner.queue.pop() {
                    if !inner.queue.is_empty() {
                        // Other consumers may be waiting on entries we did
                        // not take.
                        self.not_empty.notify_one();
                    }
                    return Some(item.entry);
                }
            }

            let remaining = deadline.checked_duration_since(Instant::now())?;
            if tokio::time::timeout(remaining, notified).await.is_err() {
                return None;
            }
        }
    }

    pub async fn mark_crawled(&self, url: &str) {
        let mut inner = self.inner.lock().await;
        inner.crawled.insert(url_hash(url));
    }

    /// Record a failure. Returns `true` while the URL is still eligible for
    /// a retry; the caller decides whether to re-enqueue.
    pub async fn mark_failed(&self, url: &str, max_retries: u32) -> bool {
        let mut inner = self.inner.lock().await;
        let count = inner.failed.entry(url_hash(url)).or_insert(0);
        *count += 1;
        *count < max_retries
    }

    /// Re-queue a previously seen URL for retry. Bypasses the seen check
    /// (the URL is seen by definition) but still honors capacity.
    pub async fn requeue(&self, entry: &UrlEntry, priority: UrlPriority) -> bool {
        let mut inner = self.inner.lock().await;
        if inner.queue.len() >= self.max_urls {
            return false;
        }
        let seq = inner.next_seq;
        inner.next_seq += 1;
        let mut retry = entry.clone();
        retry.priority = priority;
        retry.retry_count += 1;
        inner.queue.push(Reverse(HeapItem { entry: retry, seq }));
        drop(inner);
        self.not_empty.notify_one();
        true
    }

    pub async fn is_crawled(&self, url: &str) -> bool {
        self.inner.lock().await.crawled.contains(&url_hash(url))
    }

    pub async fn is_seen(&self, url: &str) -> bool {
        self.inner.lock().await.seen.contains(&url_hash(url))
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.queue.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.queue.is_empty()
    }

    pub async fn crawled_count(&self) -> usize {
        self.inner.lock().await.crawled.len()
    }

    pub async fn stats(&self) -> FrontierStats {
        let inner = self.inner.lock().await;
        FrontierStats {
            queue_size: inner.queue.len(),
            total_added: inner.total_added,
            total_crawled: inner.crawled.len(),
            total_seen: inner.seen.len(),
            total_failed: inner.failed.len(),
            duplicates_skipped: inner.duplicates_skipped,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_add_deduplicates() {
        let frontier = UrlFrontier::new(3, 100);
        assert!(
            frontier
                .add("https://a.test/x", 0, UrlPriority::Normal, "", None)
                .await
        );
        assert!(
            !frontier
                .add("https://a.test/x", 1, UrlPriority::High, "", None)
                .await
        );
        // Hashing is case-insensitive, so scheme/host case differences dedup too.
        assert!(
            !frontier
                .add("HTTPS://A.TEST/x", 0, UrlPriority::Normal, "", None)
                .await
        );
        assert_eq!(frontier.len().await, 1);
        assert_eq!(frontier.stats().await.duplicates_skipped, 2);
    }

    #[tokio::test]
    async fn test_depth_limit() {
        let frontier = UrlFrontier::new(1, 100);
        assert!(
            frontier
                .add("https://a.test/p1", 1, UrlPriority::Normal, "", None)
                .await
        );
        assert!(
            !frontier
                .add("https://a.test/p2", 2, UrlPriority::Normal, "", None)
                .await
        );
        assert!(!frontier.is_seen("https://a.test/p2").await);
    }

    #[tokio::test]
    async fn test_capacity_limit() {
        let frontier = UrlFrontier::new(3, 2);
        assert!(
            frontier
                .add("https://a.test/1", 0, UrlPriority::Normal, "", None)
                .await
        );
        assert!(
            frontier
                .add("https://a.test/2", 0, UrlPriority::Normal, "", None)
                .await
        );
        assert!(
            !frontier
                .add("https://a.test/3", 0, UrlPriority::Normal, "", None)
                .await
        );
        assert_eq!(frontier.len().await, 2);
    }

    #[tokio::test]
    async fn test_priority_ordering() {
        let frontier = UrlFrontier::new(5, 100);
        frontier
            .add("https://a.test/deep", 3, UrlPriority::Normal, "", None)
            .await;
        frontier
            .add("https://a.test/deferred", 0, UrlPriority::Deferred, "", None)
            .await;
        frontier
            .add("https://a.test/seed", 0, UrlPriority::Critical, "", None)
            .await;
        frontier
            .add("https://a.test/shallow", 1, UrlPriority::Normal, "", None)
            .await;

        let order: Vec<String> = [
            frontier.get(Duration::from_millis(100)).await.unwrap().url,
            frontier.get(Duration::from_millis(100)).await.unwrap().url,
            frontier.get(Duration::from_millis(100)).await.unwrap().url,
            frontier.get(Duration::from_millis(100)).await.unwrap().url,
        ]
        .into();
        assert_eq!(
            order,
            vec![
                "https://a.test/seed",
                "https://a.test/shallow",
                "https://a.test/deep",
                "https://a.test/deferred",
            ]
        );
    }

    #[tokio::test]
    async fn test_insertion_order_breaks_ties() {
        let frontier = UrlFrontier::new(3, 100);
        for i in 0..5 {
            frontier
                .add(
                    &format!("https://a.test/{i}"),
                    1,
                    UrlPriority::Normal,
                    "",
                    None,
                )
                .await;
        }
        for i in 0..5 {
            let entry = frontier.get(Duration::from_millis(100)).await.unwrap();
            assert_eq!(entry.url, format!("https://a.test/{i}"));
        }
    }

    #[tokio::test]
    async fn test_get_times_out_when_empty() {
        let frontier = UrlFrontier::new(3, 100);
        let start = std::time::Instant::now();
        assert!(frontier.get(Duration::from_millis(50)).await.is_none());
        assert!(start.elapsed() >= Duration::from_millis(45));
    }

    #[tokio::test]
    async fn test_get_wakes_on_add() {
        let frontier = std::sync::Arc::new(UrlFrontier::new(3, 100));
        let consumer = {
            let frontier = frontier.clone();
            tokio::spawn(async move { frontier.get(Duration::from_secs(5)).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        frontier
            .add("https://a.test/wake", 0, UrlPriority::Normal, "", None)
            .await;
        let entry = consumer.await.unwrap().unwrap();
        assert_eq!(entry.url, "https://a.test/wake");
    }

    #[tokio::test]
    async fn test_each_entry_delivered_once() {
        let frontier = std::sync::Arc::new(UrlFrontier::new(3, 1000));
        for i in 0..100 {
            frontier
                .add(
                    &format!("https://a.test/{i}"),
                    0,
                    UrlPriority::Normal,
                    "",
                    None,
                )
                .await;
        }

        let mut handles = Vec::new();
        for _ in 0..4 {
            let frontier = frontier.clone();
            handles.push(tokio::spawn(async move {
                let mut got = Vec::new();
                while let Some(entry) = frontier.get(Duration::from_millis(50)).await {
                    got.push(entry.url);
                }
                got
            }));
        }

        let mut all = Vec::new();
        for handle in handles {
            all.extend(handle.await.unwrap());
        }
        all.sort();
        all.dedup();
        assert_eq!(all.len(), 100);
    }

    #[tokio::test]
    async fn test_mark_failed_retry_budget() {
        let frontier = UrlFrontier::new(3, 100);
        assert!(frontier.mark_failed("https://a.test/f", 3).await);
        assert!(frontier.mark_failed("https://a.test/f", 3).await);
        assert!(!frontier.mark_failed("https://a.test/f", 3).await);
        assert!(!frontier.mark_failed("https://a.test/f", 3).await);
    }

    #[tokio::test]
    async fn test_accounting_invariant() {
        let frontier = UrlFrontier::new(3, 100);
        frontier
            .add("https://a.test/1", 0, UrlPriority::Normal, "", None)
            .await;
        frontier
            .add("https://a.test/2", 0, UrlPriority::Normal, "", None)
            .await;
        frontier
            .add("https://a.test/3", 0, UrlPriority::Normal, "", None)
            .await;

        let e = frontier.get(Duration::from_millis(50)).await.unwrap();
        frontier.mark_crawled(&e.url).await;
        let e = frontier.get(Duration::from_millis(50)).await.unwrap();
        for _ in 0..3 {
            frontier.mark_failed(&e.url, 3).await;
        }

        let stats = frontier.stats().await;
        assert_eq!(
            stats.queue_size + stats.total_crawled + stats.total_failed,
            stats.total_seen
        );
    }
}
