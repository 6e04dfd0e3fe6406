use regex::Regex;
use scraper::node::Node;
use scraper::Html;
use std::sync::OnceLock;
use tracing::debug;
use url::Url;

/// Subtrees that never contribute readable text.
const REMOVE_TAGS: &[&str] = &[
    "script", "style", "noscript", "iframe", "embed", "object", "applet", "canvas", "svg", "head",
];

/// Chrome around the content: navigation, ads, footers.
const BOILERPLATE_TAGS: &[&str] = &["nav", "header", "footer", "aside"];

const BOILERPLATE_NAMES: &[&str] = &[
    "nav",
    "navigation",
    "menu",
    "sidebar",
    "header",
    "footer",
    "advertisement",
    "social",
    "share",
    "related",
    "comments",
];

#[derive(Debug, Clone, Default)]
pub struct CleanedContent {
    /// Readability-extracted main content HTML, when enabled.
    pub main_content: String,
    /// Whitespace-normalized visible text with boilerplate removed.
    pub text: String,
}

fn whitespace_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").unwrap())
}

/// Strip scripts, boilerplate and control characters; produce clean text
/// and, when `extract_main` is set, the readability main-content HTML.
pub fn clean(html: &str, base_url: &str, extract_main: bool) -> CleanedContent {
    if html.is_empty() {
        return CleanedContent::default();
    }

    let sanitized = sanitize(html);
    let document = Html::parse_document(&sanitized);

    // Pre-order walk that skips noise subtrees entirely, so a <script>
    // inside an <article> still contributes nothing.
    let mut raw_text = String::new();
    let mut stack = vec![*document.root_element()];
    while let Some(node) = stack.pop() {
        match node.value() {
            Node::Text(text) => {
                raw_text.push(' ');
                raw_text.push_str(text);
                continue;
            }
            Node::Element(el) => {
                if skip_element(el) {
                    continue;
                }
            }
            _ => {}
        }
        let children: Vec<_> = node.children().collect();
        for child in children.into_iter().rev() {
            stack.push(child);
        }
    }
    let text = whitespace_re()
        .replace_all(raw_text.trim(), " ")
        .to_string();

    let main_content = if extract_main {
        extract_main_content(&sanitized, base_url).unwrap_or_default()
    } else {
        String::new()
    };

    CleanedContent { main_content, text }
}

/// Remove NUL bytes and control characters that break downstream parsers,
/// keeping tabs, newlines and carriage returns.
fn sanitize(html: &str) -> String {
    html.chars()
        .filter(|c| !c.is_control() || matches!(c, '\t' | '\n' | '\r'))
        .collect()
}

fn is_boilerplate_attr(value: &str) -> bool {
    let lower = value.to_lowercase();
    BOILERPLATE_NAMES
        .iter()
        .any(|name| lower.split([' ', '-', '_']).any(|part| part == *name))
}

fn skip_element(el: &scraper::node::Element) -> bool {
    let name = el.name();
    if REMOVE_TAGS.contains(&name) || BOILERPLATE_TAGS.contains(&name) {
        return true;
    }
    el.attr("class").map(is_boilerplate_attr).unwrap_or(false)
        || el.attr("id").map(is_boilerplate_attr).unwrap_or(false)
        || matches!(
            el.attr("role"),
            Some("navigation") | Some("banner") | Some("contentinfo")
        )
}

fn extract_main_content(html: &str, base_url: &str) -> Option<String> {
    let url = Url::parse(base_url).ok()?;
    match readability::extractor::extract(&mut html.as_bytes(), &url) {
        Ok(product) => Some(product.content),
        Err(e) => {
            debug!(error = %e, "readability extraction failed");
            None
        }
    }
}

/// Paragraph texts longer than a trivial fragment.
pub fn extract_paragraphs(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let Ok(selector) = scraper::Selector::parse("p") else {
        return Vec::new();
    };
    document
        .select(&selector)
        .map(|p| p.text().collect::<String>().trim().to_string())
        .filter(|t| t.len() > 20)
        .collect()
}
