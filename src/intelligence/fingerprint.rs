use regex::Regex;
use sha2::{Digest, Sha256};
use std::sync::OnceLock;

/// 16-byte digest of the lowercased, trimmed URL. The frontier's seen set
/// stores these instead of full URLs to bound memory.
pub fn url_hash(url: &str) -> [u8; 16] {
    md5::compute(url.trim().to_lowercase().as_bytes()).0
}

/// Exact content fingerprint: SHA-256 over whitespace-collapsed,
/// lowercased text, so cosmetic formatting differences hash identically.
pub fn content_hash(text: &str) -> [u8; 32] {
    let collapsed = whitespace_re()
        .replace_all(text.trim(), " ")
        .to_lowercase();
    let mut hasher = Sha256::new();
    hasher.update(collapsed.as_bytes());
    hasher.finalize().into()
}

fn whitespace_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").unwrap())
}

fn word_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\w+").unwrap())
}

pub const SIMHASH_BITS: u32 = 64;
const SHINGLE_SIZE: usize = 3;

/// 64-bit simhash over 3-word shingles. Similar texts produce hashes
/// with a small Hamming distance.
pub fn simhash(text: &str) -> u64 {
    let lower = text.to_lowercase();
    let words: Vec<&str> = word_re().find_iter(&lower).map(|m| m.as_str()).collect();
    if words.is_empty() {
        return 0;
    }

    let mut v = [0i32; SIMHASH_BITS as usize];
    let last = words.len().saturating_sub(SHINGLE_SIZE - 1).max(1);
    for i in 0..last {
        let end = (i + SHINGLE_SIZE).min(words.len());
        let shingle = words[i..end].join(" ");
        let token_hash = token_hash(&shingle);
        for (bit, slot) in v.iter_mut().enumerate() {
            if (token_hash >> bit) & 1 == 1 {
                *slot += 1;
            } else {
                *slot -= 1;
            }
        }
    }

    let mut fingerprint = 0u64;
    for (bit, weight) in v.iter().enumerate() {
        if *weight > 0 {
            fingerprint |= 1 << bit;
        }
    }
    fingerprint
}

/// MD5 of the token reduced mod 2^64, i.e. the low 8 bytes of the digest.
fn token_hash(token: &str) -> u64 {
    let digest = md5::compute(token.as_bytes());
    u64::from_be_bytes(digest.0[8..16].try_into().unwrap())
}

pub fn hamming_distance(a: u64, b: u64) -> u32 {
    (a ^ b).count_ones()
}

/// Similarity in `[0, 1]`: the fraction of simhash bits two fingerprints
/// agree on.
pub fn similarity(a: u64, b: u64) -> f64 {
    1.0 - f64::from(hamming_distance(a, b)) / f64::from(SIMHASH_BITS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_hash_case_and_whitespace_insensitive() {
        assert_eq!(
            url_hash("https://Example.com/Page"),
            url_hash("  https://example.com/page  ")
        );
        assert_ne!(
            url_hash("https://example.com/a"),
            url_hash("https://example.com/b")
        );
    }

    #[test]
    fn test_content_hash_normalizes_whitespace() {
        assert_eq!(
            content_hash("Hello   World"),
            content_hash("  hello\n\nworld ")
        );
        assert_ne!(content_hash("hello world"), content_hash("hello there"));
    }

    #[test]
    fn test_simhash_empty_is_zero() {
        assert_eq!(simhash(""), 0);
        assert_eq!(simhash("   \n\t "), 0);
    }

    #[test]
    fn test_simhash_deterministic() {
        let text = "the quick brown fox jumps over the lazy dog";
        assert_eq!(simhash(text), simhash(text));
    }

    #[test]
    fn test_similarity_properties() {
        let h1 = simhash("a reasonably long sentence about web crawling engines");
        let h2 = simhash("an entirely different text concerning cooking recipes");
        assert_eq!(similarity(h1, h1), 1.0);
        assert_eq!(similarity(h1, h2), similarity(h2, h1));
        assert!(similarity(h1, h2) >= 0.0);
    }

    #[test]
    fn test_near_duplicates_have_small_distance() {
        let base: String = (0..60)
            .map(|i| format!("token{} common phrase segment", i))
            .collect::<Vec<_>>()
            .join(" ");
        let variant = format!("{base} with one trailing clause appended");

        let d = hamming_distance(simhash(&base), simhash(&variant));
        assert!(d <= 9, "expected near-duplicate distance, got {d}");
        assert!(similarity(simhash(&base), simhash(&variant)) >= 0.85);
    }
}
