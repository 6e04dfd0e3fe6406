use scraper::{Html, Selector};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

#[derive(Debug, Clone, Default, Serialize)]
pub struct StructuredData {
    /// Parsed JSON-LD blocks; `@graph` containers are flattened.
    pub json_ld: Vec<Value>,
    /// Microdata `itemtype` values present on the page.
    pub microdata_types: Vec<String>,
}

impl StructuredData {
    /// `@type` values across all JSON-LD items, for classification signals.
    pub fn schema_types(&self) -> Vec<String> {
        let mut types = Vec::new();
        for item in &self.json_ld {
            match item.get("@type") {
                Some(Value::String(t)) => types.push(t.clone()),
                Some(Value::Array(list)) => {
                    types.extend(list.iter().filter_map(|v| v.as_str().map(String::from)));
                }
                _ => {}
            }
        }
        types
    }
}

/// Extract schema.org structured data: JSON-LD script blocks and
/// microdata type annotations.
pub fn extract(html: &str) -> StructuredData {
    let document = Html::parse_document(html);
    let mut data = StructuredData::default();

    if let Ok(selector) = Selector::parse("script[type=\"application/ld+json\"]") {
        for script in document.select(&selector) {
            let raw = script.text().collect::<String>();
            match serde_json::from_str::<Value>(raw.trim()) {
                Ok(Value::Array(items)) => data.json_ld.extend(items),
                Ok(value) => {
                    if let Some(Value::Array(graph)) = value.get("@graph") {
                        data.json_ld.extend(graph.clone());
                    } else {
                        data.json_ld.push(value);
                    }
                }
                Err(e) => debug!(error = %e, "unparseable JSON-LD block skipped"),
            }
        }
    }

    if let Ok(selector) = Selector::parse("[itemtype]") {
        for el in document.select(&selector) {
            if let Some(itemtype) = el.value().attr("itemtype") {
                let itemtype = itemtype.trim().to_string();
                if !itemtype.is_empty() && !data.microdata_types.contains(&itemtype) {
                    data.microdata_types.push(itemtype);
                }
            }
        }
    }

    data
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_ld_single_object() {
        let html = r#"<script type="application/ld+json">
            {"@type": "Article", "headline": "Hello"}
        </script>"#;
        let data = extract(html);
        assert_eq!(data.json_ld.len(), 1);
        assert_eq!(data.schema_types(), vec!["Article"]);
    }

    #[test]
    fn test_json_ld_graph_flattened() {
        let html = r#"<script type="application/ld+json">
            {"@context": "https://schema.org", "@graph": [
                {"@type": "WebSite"}, {"@type": "Organization"}
            ]}
        </script>"#;
        let data = extract(html);
        assert_eq!(data.json_ld.len(), 2);
        assert_eq!(data.schema_types(), vec!["WebSite", "Organization"]);
    }

    #[test]
    fn test_invalid_json_ld_skipped() {
        let html = r#"<script type="application/ld+json">{not json}</script>"#;
        let data = extract(html);
        assert!(data.json_ld.is_empty());
    }

    #[test]
    fn test_microdata_types() {
        let html = r#"
            <div itemscope itemtype="https://schema.org/Product"></div>
            <div itemscope itemtype="https://schema.org/Product"></div>
            <div itemscope itemtype="https://schema.org/Offer"></div>
        "#;
        let data = extract(html);
        assert_eq!(
            data.microdata_types,
            vec!["https://schema.org/Product", "https://schema.org/Offer"]
        );
    }
}
