use scraper::{Html, Selector};
use serde::Serialize;
use std::collections::HashMap;
use url::Url;

/// Everything the `<head>` knows about a page.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PageMetadata {
    pub title: String,
    pub description: String,
    pub canonical_url: String,
    pub language: String,
    pub charset: String,
    pub author: String,
    pub keywords: Vec<String>,
    pub robots: String,
    pub favicon: String,
    pub og: HashMap<String, String>,
    pub twitter: HashMap<String, String>,
}

/// Extract title, meta tags, OpenGraph and Twitter Card data.
pub fn extract(html: &str, base_url: &str) -> PageMetadata {
    let document = Html::parse_document(html);
    let base = Url::parse(base_url).ok();

    let mut meta = PageMetadata {
        title: extract_title(&document),
        description: meta_content(&document, "description"),
        author: meta_content(&document, "author"),
        robots: meta_content(&document, "robots"),
        charset: extract_charset(&document),
        language: extract_language(&document),
        ..Default::default()
    };

    let keywords = meta_content(&document, "keywords");
    if !keywords.is_empty() {
        meta.keywords = keywords
            .split(',')
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect();
    }

    if let Ok(selector) = Selector::parse("link[rel=\"canonical\"]") {
        if let Some(el) = document.select(&selector).next() {
            if let Some(href) = el.value().attr("href") {
                meta.canonical_url = resolve(base.as_ref(), href);
            }
        }
    }

    if let Ok(selector) = Selector::parse("link[rel~=\"icon\"]") {
        if let Some(el) = document.select(&selector).next() {
            if let Some(href) = el.value().attr("href") {
                meta.favicon = resolve(base.as_ref(), href);
            }
        }
    }

    meta.og = prefixed_properties(&document, "og:");
    meta.twitter = prefixed_names(&document, "twitter:");

    meta
}

fn resolve(base: Option<&Url>, href: &str) -> String {
    match base.and_then(|b| b.join(href).ok()) {
        Some(url) => url.to_string(),
        None => href.to_string(),
    }
}

/// Page title with an h1 fallback.
fn extract_title(document: &Html) -> String {
    if let Ok(selector) = Selector::parse("title") {
        if let Some(el) = document.select(&selector).next() {
            let title = el.text().collect::<String>().trim().to_string();
            if !title.is_empty() {
                return title;
            }
        }
    }
    if let Ok(selector) = Selector::parse("h1") {
        if let Some(el) = document.select(&selector).next() {
            let h1 = el.text().collect::<String>().trim().to_string();
            if !h1.is_empty() {
                return h1;
            }
        }
    }
    String::new()
}

fn meta_content(document: &Html, name: &str) -> String {
    if let Ok(selector) = Selector::parse(&format!("meta[name=\"{name}\"]")) {
        if let Some(el) = document.select(&selector).next() {
            if let Some(content) = el.value().attr("content") {
                return content.trim().to_string();
            }
        }
    }
    String::new()
}

fn extract_charset(document: &Html) -> String {
    if let Ok(selector) = Selector::parse("meta[charset]") {
        if let Some(el) = document.select(&selector).next() {
            if let Some(charset) = el.value().attr("charset") {
                return charset.trim().to_lowercase();
            }
        }
    }
    String::new()
}

fn extract_language(document: &Html) -> String {
    if let Ok(selector) = Selector::parse("html[lang]") {
        if let Some(el) = document.select(&selector).next() {
            if let Some(lang) = el.value().attr("lang") {
                return lang
                    .split('-')
                    .next()
                    .unwrap_or_default()
                    .trim()
                    .to_lowercase();
            }
        }
    }
    if let Ok(selector) = Selector::parse("meta[http-equiv=\"content-language\"]") {
        if let Some(el) = document.select(&selector).next() {
            if let Some(lang) = el.value().attr("content") {
                return lang
                    .split('-')
                    .next()
                    .unwrap_or_default()
                    .trim()
                    .to_lowercase();
            }
        }
    }
    String::new()
}

fn prefixed_properties(document: &Html, prefix: &str) -> HashMap<String, String> {
    let mut out = HashMap::new();
    if let Ok(selector) = Selector::parse("meta[property]") {
        for el in document.select(&selector) {
            let (Some(property), Some(content)) =
                (el.value().attr("property"), el.value().attr("content"))
            else {
                continue;
            };
            if let Some(key) = property.strip_prefix(prefix) {
                out.entry(key.to_string())
                    .or_insert_with(|| content.trim().to_string());
            }
        }
    }
    out
}

fn prefixed_names(document: &Html, prefix: &str) -> HashMap<String, String> {
    let mut out = HashMap::new();
    if let Ok(selector) = Selector::parse("meta[name]") {
        for el in document.select(&selector) {
            let (Some(name), Some(content)) =
                (el.value().attr("name"), el.value().attr("content"))
            else {
                continue;
            };
            if let Some(key) = name.strip_prefix(prefix) {
                out.entry(key.to_string())
                    .or_insert_with(|| content.trim().to_string());
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const HTML: &str = r#"<!DOCTYPE html>
<html lang="en-US">
<head>
    <meta charset="UTF-8">
    <title>  Example Page  </title>
    <meta name="description" content="A test page.">
    <meta name="author" content="Jane Doe">
    <meta name="keywords" content="rust, crawler, , testing">
    <link rel="canonical" href="/canonical-path">
    <link rel="icon" href="/favicon.ico">
    <meta property="og:title" content="OG Title">
    <meta property="og:type" content="article">
    <meta name="twitter:card" content="summary">
    <meta name="twitter:site" content="@example">
</head>
<body><h1>Ignored</h1></body>
</html>"#;

    #[test]
    fn test_full_metadata() {
        let meta = extract(HTML, "https://example.com/page");
        assert_eq!(meta.title, "Example Page");
        assert_eq!(meta.description, "A test page.");
        assert_eq!(meta.author, "Jane Doe");
        assert_eq!(meta.keywords, vec!["rust", "crawler", "testing"]);
        assert_eq!(meta.canonical_url, "https://example.com/canonical-path");
        assert_eq!(meta.favicon, "https://example.com/favicon.ico");
        assert_eq!(meta.language, "en");
        assert_eq!(meta.charset, "utf-8");
        assert_eq!(meta.og.get("title").map(String::as_str), Some("OG Title"));
        assert_eq!(meta.og.get("type").map(String::as_str), Some("article"));
        assert_eq!(
            meta.twitter.get("card").map(String::as_str),
            Some("summary")
        );
    }

    #[test]
    fn test_title_falls_back_to_h1() {
        let meta = extract(
            "<html><head></head><body><h1>Heading Title</h1></body></html>",
            "https://example.com/",
        );
        assert_eq!(meta.title, "Heading Title");
    }

    #[test]
    fn test_empty_document() {
        let meta = extract("", "https://example.com/");
        assert!(meta.title.is_empty());
        assert!(meta.og.is_empty());
    }
}
