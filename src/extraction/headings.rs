use scraper::{Html, Selector};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct Heading {
    pub level: u8,
    pub text: String,
}

/// Extract the h1–h6 outline in document order.
pub fn extract(html: &str) -> Vec<Heading> {
    let document = Html::parse_document(html);
    let mut headings = Vec::new();

    let Ok(selector) = Selector::parse("h1, h2, h3, h4, h5, h6") else {
        return headings;
    };

    for el in document.select(&selector) {
        let text = el.text().collect::<String>().trim().to_string();
        if text.is_empty() {
            continue;
        }
        let level = match el.value().name() {
            "h1" => 1,
            "h2" => 2,
            "h3" => 3,
            "h4" => 4,
            "h5" => 5,
            _ => 6,
        };
        headings.push(Heading { level, text });
    }

    headings
}
