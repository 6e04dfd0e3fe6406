use crate::intelligence::fingerprint::{content_hash, similarity, simhash};
use serde::Serialize;
use std::collections::HashMap;
use tracing::info;

const MIN_CONTENT_LEN: usize = 50;

#[derive(Debug, Clone, Serialize)]
pub struct DeduplicationResult {
    pub is_duplicate: bool,
    pub similarity: f64,
    pub matching_url: Option<String>,
    pub method: String,
}

impl DeduplicationResult {
    fn unique(method: &str) -> Self {
        Self {
            is_duplicate: false,
            similarity: 0.0,
            matching_url: None,
            method: method.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DedupStats {
    pub total_unique: usize,
    pub total_duplicates: u64,
    pub similarity_threshold: f64,
}

/// Two-strategy content deduplication: exact SHA-256 lookup first, then a
/// linear simhash scan for near-duplicates. The linear scan is the
/// documented cost; the store stays bounded by `max_pages` in practice.
pub struct ContentDeduplicator {
    threshold: f64,
    exact_hashes: HashMap<[u8; 32], String>,
    simhashes: Vec<(String, u64)>,
    duplicate_count: u64,
}

impl ContentDeduplicator {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            exact_hashes: HashMap::new(),
            simhashes: Vec::new(),
            duplicate_count: 0,
        }
    }

    /// Check `text` against everything seen so far; store its fingerprints
    /// when it is new.
    pub fn check(&mut self, url: &str, text: &str) -> DeduplicationResult {
        if text.trim().len() < MIN_CONTENT_LEN {
            return DeduplicationResult::unique("skipped_short_content");
        }

        let exact = content_hash(text);
        if let Some(matching_url) = self.exact_hashes.get(&exact) {
            self.duplicate_count += 1;
            info!(url, matching_url, "exact duplicate found");
            return DeduplicationResult {
                is_duplicate: true,
                similarity: 1.0,
                matching_url: Some(matching_url.clone()),
                method: "exact_hash".to_string(),
            };
        }

        let current = simhash(text);
        let mut best_similarity = 0.0;
        let mut best_url: Option<String> = None;
        for (stored_url, stored_hash) in &self.simhashes {
            let score = similarity(current, *stored_hash);
            if score > best_similarity {
                best_similarity = score;
                best_url = Some(stored_url.clone());
            }
        }

        if best_similarity >= self.threshold {
            self.duplicate_count += 1;
            let matching_url = best_url.clone();
            info!(
                url,
                matching_url = matching_url.as_deref().unwrap_or_default(),
                similarity = format!("{best_similarity:.3}"),
                "near duplicate found"
            );
            return DeduplicationResult {
                is_duplicate: true,
                similarity: best_similarity,
                matching_url,
                method: "simhash".to_string(),
            };
        }

        self.exact_hashes.insert(exact, url.to_string());
        self.simhashes.push((url.to_string(), current));

        DeduplicationResult {
            is_duplicate: false,
            similarity: best_similarity,
            matching_url: best_url,
            method: "unique".to_string(),
        }
    }

    pub fn duplicate_count(&self) -> u64 {
        self.duplicate_count
    }

    pub fn stats(&self) -> DedupStats {
        DedupStats {
            total_unique: self.exact_hashes.len(),
            total_duplicates: self.duplicate_count,
            similarity_threshold: self.threshold,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn long_text(seed: &str) -> String {
        (0..40)
            .map(|i| format!("{seed} sentence number {i} with shared filler words"))
            .collect::<Vec<_>>()
            .join(". ")
    }

    #[test]
    fn test_short_content_skipped() {
        let mut dedup = ContentDeduplicator::new(0.85);
        let result = dedup.check("https://a.test/1", "tiny");
        assert!(!result.is_duplicate);
        assert_eq!(result.method, "skipped_short_content");
        // Short content is not stored either.
        let result = dedup.check("https://a.test/2", "tiny");
        assert!(!result.is_duplicate);
    }

    #[test]
    fn test_exact_duplicate() {
        let mut dedup = ContentDeduplicator::new(0.85);
        let text = long_text("alpha");
        assert!(!dedup.check("https://a.test/1", &text).is_duplicate);

        let result = dedup.check("https://a.test/2", &text);
        assert!(result.is_duplicate);
        assert_eq!(result.method, "exact_hash");
        assert_eq!(result.similarity, 1.0);
        assert_eq!(result.matching_url.as_deref(), Some("https://a.test/1"));
    }

    #[test]
    fn test_exact_duplicate_ignores_whitespace_and_case() {
        let mut dedup = ContentDeduplicator::new(0.85);
        let text = long_text("beta");
        dedup.check("https://a.test/1", &text);
        let shuffled = text.to_uppercase().replace(' ', "  \n");
        let result = dedup.check("https://a.test/2", &shuffled);
        assert!(result.is_duplicate);
        assert_eq!(result.method, "exact_hash");
    }

    #[test]
    fn test_near_duplicate_via_simhash() {
        let mut dedup = ContentDeduplicator::new(0.85);
        let base = long_text("gamma");
        dedup.check("https://a.test/1", &base);

        let variant = format!("{base} plus a small trailing clause");
        let result = dedup.check("https://a.test/2", &variant);
        assert!(result.is_duplicate, "similarity was {}", result.similarity);
        assert_eq!(result.method, "simhash");
        assert!(result.similarity >= 0.85);
        assert_eq!(result.matching_url.as_deref(), Some("https://a.test/1"));
    }

    #[test]
    fn test_distinct_content_unique() {
        let mut dedup = ContentDeduplicator::new(0.85);
        dedup.check("https://a.test/1", &long_text("delta"));
        let result = dedup.check(
            "https://a.test/2",
            "A completely different body of prose, discussing topics wholly unlike the first: \
             weather patterns, maritime navigation, and the history of typography in print.",
        );
        assert!(!result.is_duplicate);
        assert_eq!(result.method, "unique");
        assert_eq!(dedup.stats().total_unique, 2);
    }
}
