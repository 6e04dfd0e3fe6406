use crate::extraction::structured::StructuredData;
use scraper::{Html, Selector};
use serde::Serialize;
use std::collections::HashMap;

/// Weighted signals for one page type.
struct Signals {
    label: &'static str,
    tags: &'static [&'static str],
    names: &'static [&'static str],
    meta_types: &'static [&'static str],
    schemas: &'static [&'static str],
}

const SIGNAL_TABLE: &[Signals] = &[
    Signals {
        label: "article",
        tags: &["article", "time"],
        names: &["article", "post", "blog", "story", "entry", "news", "editorial"],
        meta_types: &["article", "newsarticle", "blogposting"],
        schemas: &["Article", "NewsArticle", "BlogPosting"],
    },
    Signals {
        label: "product",
        tags: &[],
        names: &["product", "price", "add-to-cart", "buy", "shopping", "cart", "sku"],
        meta_types: &["product"],
        schemas: &["Product", "Offer"],
    },
    Signals {
        label: "listing",
        tags: &[],
        names: &["listing", "results", "catalog", "gallery", "directory"],
        meta_types: &[],
        schemas: &["ItemList", "CollectionPage"],
    },
    Signals {
        label: "forum",
        tags: &[],
        names: &["forum", "thread", "reply", "discussion", "topic"],
        meta_types: &[],
        schemas: &["DiscussionForumPosting"],
    },
    Signals {
        label: "homepage",
        tags: &[],
        names: &["homepage", "landing", "hero", "welcome"],
        meta_types: &["website"],
        schemas: &["WebSite"],
    },
    Signals {
        label: "contact",
        tags: &["address"],
        names: &["contact", "address", "location"],
        meta_types: &["contactpage"],
        schemas: &["ContactPage"],
    },
    Signals {
        label: "about",
        tags: &[],
        names: &["about", "bio", "team", "mission", "history"],
        meta_types: &["aboutpage"],
        schemas: &["AboutPage"],
    },
    Signals {
        label: "faq",
        tags: &["details", "summary"],
        names: &["faq", "question", "answer", "accordion"],
        meta_types: &["faqpage"],
        schemas: &["FAQPage"],
    },
];

const MIN_SCORE: f64 = 1.0;
const MAX_EXPECTED_SCORE: f64 = 10.0;

#[derive(Debug, Clone, Serialize)]
pub struct Classification {
    pub label: String,
    pub confidence: f64,
    pub scores: HashMap<String, f64>,
}

/// Heuristic page-type classification from tag, class/id, OpenGraph and
/// schema.org signals.
pub fn classify(html: &str, url: &str, structured: &StructuredData) -> Classification {
    let document = Html::parse_document(html);
    let html_lower = html.to_lowercase();
    let url_lower = url.to_lowercase();
    let og_type = og_type(&document);
    let schema_types = structured.schema_types();

    let mut scores: HashMap<String, f64> = HashMap::new();
    for signals in SIGNAL_TABLE {
        let mut score = 0.0;

        for tag in signals.tags {
            if let Ok(selector) = Selector::parse(tag) {
                if document.select(&selector).next().is_some() {
                    score += 1.0;
                }
            }
        }

        for name in signals.names {
            if html_lower.contains(&format!("class=\"{name}\""))
                || html_lower.contains(&format!("class='{name}'"))
            {
                score += 0.5;
            }
            if html_lower.contains(&format!("id=\"{name}\""))
                || html_lower.contains(&format!("id='{name}'"))
            {
                score += 0.5;
            }
            if url_lower.contains(name) {
                score += 0.3;
            }
        }

        if let Some(og) = &og_type {
            if signals.meta_types.contains(&og.as_str()) {
                score += 2.0;
            }
        }

        for schema in &schema_types {
            if signals.schemas.contains(&schema.as_str()) {
                score += 2.0;
            }
        }

        scores.insert(signals.label.to_string(), score);
    }

    let (best_label, best_score) = scores
        .iter()
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map(|(label, score)| (label.clone(), *score))
        .unwrap_or_else(|| ("unknown".to_string(), 0.0));

    let confidence = (best_score / MAX_EXPECTED_SCORE).min(1.0);
    let label = if best_score < MIN_SCORE {
        "unknown".to_string()
    } else {
        best_label
    };

    Classification {
        label,
        confidence,
        scores,
    }
}

fn og_type(document: &Html) -> Option<String> {
    let selector = Selector::parse("meta[property=\"og:type\"]").ok()?;
    document
        .select(&selector)
        .next()
        .and_then(|el| el.value().attr("content"))
        .map(|c| c.trim().to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::structured;

    #[test]
    fn test_article_classification() {
        let html = r#"<html><head>
            <meta property="og:type" content="article">
        </head><body>
            <article class="post"><time>2024-01-01</time>Body</article>
        </body></html>"#;
        let data = structured::extract(html);
        let result = classify(html, "https://example.com/blog/post-1", &data);
        assert_eq!(result.label, "article");
        assert!(result.confidence > 0.0);
    }

    #[test]
    fn test_product_via_schema() {
        let html = r#"<html><body>
            <script type="application/ld+json">{"@type": "Product", "name": "Widget"}</script>
            <div class="price">$9.99</div>
        </body></html>"#;
        let data = structured::extract(html);
        let result = classify(html, "https://shop.example.com/product/widget", &data);
        assert_eq!(result.label, "product");
    }

    #[test]
    fn test_weak_signals_give_unknown() {
        let html = "<html><body><p>Plain text with nothing notable.</p></body></html>";
        let data = structured::extract(html);
        let result = classify(html, "https://example.com/x", &data);
        assert_eq!(result.label, "unknown");
    }
}
