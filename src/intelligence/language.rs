use scraper::{Html, Selector};
use serde::Serialize;
use whatlang::{Detector, Lang};

const MIN_TEXT_LEN: usize = 20;
const MAX_ALTERNATIVES: usize = 2;

#[derive(Debug, Clone, Serialize)]
pub struct LanguageCandidate {
    pub language: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct LanguageDetection {
    pub language: String,
    pub confidence: f64,
    /// Runner-up candidates, strongest first. Empty when the language came
    /// from a declared attribute or no text was available.
    pub alternatives: Vec<LanguageCandidate>,
    /// `html_attribute`, `statistical`, or `insufficient_content`.
    pub source: String,
}

impl LanguageDetection {
    fn unknown(source: &str) -> Self {
        Self {
            language: "unknown".to_string(),
            confidence: 0.0,
            alternatives: Vec::new(),
            source: source.to_string(),
        }
    }
}

/// Detect page language: the declared `lang` attribute wins, falling back
/// to statistical detection over the cleaned text.
pub fn detect(html: &str, text: &str) -> LanguageDetection {
    if let Some(lang) = declared_language(html) {
        return LanguageDetection {
            language: lang,
            confidence: 1.0,
            alternatives: Vec::new(),
            source: "html_attribute".to_string(),
        };
    }

    let content = text.trim();
    if content.len() < MIN_TEXT_LEN {
        return LanguageDetection::unknown("insufficient_content");
    }

    match whatlang::detect(content) {
        Some(info) => LanguageDetection {
            language: info.lang().code().to_string(),
            confidence: info.confidence(),
            alternatives: detect_alternatives(content, info.lang()),
            source: "statistical".to_string(),
        },
        None => LanguageDetection::unknown("statistical"),
    }
}

/// Runner-up candidates: re-detect with the already-chosen languages
/// excluded from the allowlist, so each pass surfaces the next-best match
/// with its own confidence.
fn detect_alternatives(content: &str, primary: Lang) -> Vec<LanguageCandidate> {
    let mut alternatives = Vec::new();
    let mut excluded = vec![primary];

    for _ in 0..MAX_ALTERNATIVES {
        let allowlist: Vec<Lang> = Lang::all()
            .iter()
            .copied()
            .filter(|lang| !excluded.contains(lang))
            .collect();
        if allowlist.is_empty() {
            break;
        }

        let Some(info) = Detector::with_allowlist(allowlist).detect(content) else {
            break;
        };
        if info.confidence() <= 0.0 {
            break;
        }
        excluded.push(info.lang());
        alternatives.push(LanguageCandidate {
            language: info.lang().code().to_string(),
            confidence: info.confidence(),
        });
    }

    alternatives
}

fn declared_language(html: &str) -> Option<String> {
    let document = Html::parse_document(html);

    if let Ok(selector) = Selector::parse("html[lang]") {
        if let Some(el) = document.select(&selector).next() {
            if let Some(lang) = el.value().attr("lang") {
                let lang = lang.split('-').next().unwrap_or_default().trim();
                if !lang.is_empty() {
                    return Some(lang.to_lowercase());
                }
            }
        }
    }

    if let Ok(selector) = Selector::parse("meta[http-equiv=\"content-language\"]") {
        if let Some(el) = document.select(&selector).next() {
            if let Some(content) = el.value().attr("content") {
                let lang = content.split('-').next().unwrap_or_default().trim();
                if !lang.is_empty() {
                    return Some(lang.to_lowercase());
                }
            }
        }
    }

    None
}
