use crate::extraction::entities::EntityData;
use crate::extraction::headings::Heading;
use crate::extraction::media::MediaData;
use crate::intelligence::classifier::Classification;
use crate::intelligence::language::LanguageDetection;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;

/// Head metadata carried on the page record, a stable subset of what the
/// metadata extractor returns.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MetadataBundle {
    pub canonical_url: String,
    pub language: String,
    pub author: String,
    pub keywords: Vec<String>,
    pub og: HashMap<String, String>,
    pub twitter: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PageLinks {
    pub internal: Vec<String>,
    pub external: Vec<String>,
}

/// One crawled page, as handed to sinks.
#[derive(Debug, Clone, Serialize)]
pub struct PageRecord {
    pub url: String,
    pub final_url: String,
    pub domain: String,
    pub depth: usize,
    pub status: u16,
    pub title: String,
    pub description: String,
    pub text_content: String,
    /// Raw HTML, kept only when `store_html` is enabled.
    pub html: String,
    pub metadata: MetadataBundle,
    pub links: PageLinks,
    pub entities: EntityData,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media: Option<MediaData>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub headings: Vec<Heading>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub structured_data: Vec<serde_json::Value>,
    pub language_detected: Option<LanguageDetection>,
    pub classification: Option<Classification>,
    pub crawled_at: DateTime<Utc>,
}

impl Default for PageRecord {
    fn default() -> Self {
        Self {
            url: String::new(),
            final_url: String::new(),
            domain: String::new(),
            depth: 0,
            status: 0,
            title: String::new(),
            description: String::new(),
            text_content: String::new(),
            html: String::new(),
            metadata: MetadataBundle::default(),
            links: PageLinks::default(),
            entities: EntityData::default(),
            media: None,
            headings: Vec::new(),
            structured_data: Vec::new(),
            language_detected: None,
            classification: None,
            crawled_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_serializes_to_schema_shape() {
        let record = PageRecord {
            url: "https://example.com/a".to_string(),
            domain: "example.com".to_string(),
            depth: 1,
            status: 200,
            title: "A".to_string(),
            ..Default::default()
        };
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["url"], "https://example.com/a");
        assert_eq!(value["depth"], 1);
        assert!(value["metadata"]["og"].is_object());
        assert!(value["links"]["internal"].is_array());
        assert!(value["entities"]["emails"].is_array());
        // Empty optional sections stay out of the payload.
        assert!(value.get("media").is_none());
        assert!(value.get("headings").is_none());
    }
}
