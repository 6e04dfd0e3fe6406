use crate::core::normalizer::UrlNormalizer;
use scraper::{Html, Selector};
use serde::Serialize;
use std::collections::HashSet;
use tracing::debug;

/// File extensions that are never worth enqueueing as pages.
const BINARY_EXTENSIONS: &[&str] = &[
    ".pdf", ".zip", ".exe", ".dmg", ".tar", ".gz", ".rar", ".7z", ".mp4", ".mp3", ".wav", ".avi",
    ".mov", ".jpg", ".jpeg", ".png", ".gif", ".svg", ".webp", ".ico", ".woff", ".woff2", ".ttf",
];

/// One anchor with its crawl-relevant attributes.
#[derive(Debug, Clone, Serialize)]
pub struct LinkInfo {
    pub url: String,
    pub text: String,
    pub title: String,
    pub is_nofollow: bool,
    pub is_internal: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct LinkData {
    pub internal: Vec<String>,
    pub external: Vec<String>,
    pub all_links: Vec<LinkInfo>,
}

/// Extract and classify every `<a href>` on a page. URLs are normalized so
/// the frontier sees canonical forms, deduplicated within the page, and
/// split into internal/external relative to `base_url`.
pub struct LinkExtractor {
    normalizer: UrlNormalizer,
    include_subdomains: bool,
}

impl LinkExtractor {
    pub fn new(normalizer: UrlNormalizer, include_subdomains: bool) -> Self {
        Self {
            normalizer,
            include_subdomains,
        }
    }

    pub fn extract(&self, html: &str, base_url: &str) -> LinkData {
        let document = Html::parse_document(html);
        let mut data = LinkData::default();
        let mut seen: HashSet<String> = HashSet::new();

        let Ok(selector) = Selector::parse("a[href]") else {
            return data;
        };

        for a in document.select(&selector) {
            let Some(href) = a.value().attr("href") else {
                continue;
            };
            let href = href.trim();
            if href.is_empty() || href.starts_with('#') {
                continue;
            }

            let Some(normalized) = self.normalizer.normalize(href, Some(base_url)) else {
                continue;
            };

            if is_binary_url(&normalized) {
                continue;
            }

            if !seen.insert(normalized.clone()) {
                continue;
            }

            let rel = a.value().attr("rel").unwrap_or_default();
            let is_internal =
                self.normalizer
                    .is_internal(&normalized, base_url, self.include_subdomains);

            let text: String = a.text().collect::<String>().trim().chars().take(200).collect();
            data.all_links.push(LinkInfo {
                url: normalized.clone(),
                text,
                title: a.value().attr("title").unwrap_or_default().to_string(),
                is_nofollow: rel.split_whitespace().any(|r| r == "nofollow"),
                is_internal,
            });

            if is_internal {
                data.internal.push(normalized);
            } else {
                data.external.push(normalized);
            }
        }

        debug!(
            base_url,
            internal = data.internal.len(),
            external = data.external.len(),
            "links extracted"
        );

        data
    }
}

fn is_binary_url(url: &str) -> bool {
    let path = url.split(['?', '#']).next().unwrap_or(url).to_lowercase();
    BINARY_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor() -> LinkExtractor {
        LinkExtractor::new(UrlNormalizer::default(), true)
    }

    #[test]
    fn test_internal_external_split() {
        let html = r#"
            <a href="/about">About</a>
            <a href="https://docs.example.com/api">API</a>
            <a href="https://other.org/page">Other</a>
        "#;
        let data = extractor().extract(html, "https://example.com/");
        assert_eq!(
            data.internal,
            vec![
                "https://example.com/about",
                "https://docs.example.com/api"
            ]
        );
        assert_eq!(data.external, vec!["https://other.org/page"]);
    }

    #[test]
    fn test_subdomain_is_external_when_disabled() {
        let html = r#"<a href="https://docs.example.com/api">API</a>"#;
        let data = LinkExtractor::new(UrlNormalizer::default(), false)
            .extract(html, "https://example.com/");
        assert!(data.internal.is_empty());
        assert_eq!(data.external.len(), 1);
    }

    #[test]
    fn test_duplicates_collapse_after_normalization() {
        let html = r#"
            <a href="/x">One</a>
            <a href="/x?utm_campaign=k">Two</a>
            <a href="/x#h">Three</a>
        "#;
        let data = extractor().extract(html, "https://a.test/");
        assert_eq!(data.internal, vec!["https://a.test/x"]);
    }

    #[test]
    fn test_skips_fragments_and_schemes() {
        let html = r##"
            <a href="#top">Top</a>
            <a href="javascript:void(0)">JS</a>
            <a href="mailto:x@example.com">Mail</a>
            <a href="tel:+15551234567">Call</a>
            <a href="/real">Real</a>
        "##;
        let data = extractor().extract(html, "https://a.test/");
        assert_eq!(data.internal, vec!["https://a.test/real"]);
        assert!(data.external.is_empty());
    }

    #[test]
    fn test_skips_binary_links() {
        let html = r#"
            <a href="/report.pdf">Report</a>
            <a href="/archive.zip">Archive</a>
            <a href="/photo.jpg?size=large">Photo</a>
            <a href="/page">Page</a>
        "#;
        let data = extractor().extract(html, "https://a.test/");
        assert_eq!(data.internal, vec!["https://a.test/page"]);
    }

    #[test]
    fn test_nofollow_flag() {
        let html = r#"<a href="/x" rel="nofollow noopener">X</a>"#;
        let data = extractor().extract(html, "https://a.test/");
        assert!(data.all_links[0].is_nofollow);
    }
}
