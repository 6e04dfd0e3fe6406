use regex::Regex;
use scraper::{Html, Selector};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::OnceLock;

#[derive(Debug, Clone, Serialize)]
pub struct SocialLink {
    pub platform: String,
    pub url: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct EntityData {
    pub emails: Vec<String>,
    pub phones: Vec<String>,
    pub social_links: Vec<SocialLink>,
}

const SOCIAL_PLATFORMS: &[(&str, &[&str])] = &[
    ("twitter", &["twitter.com/", "x.com/"]),
    ("facebook", &["facebook.com/", "fb.com/"]),
    ("instagram", &["instagram.com/"]),
    ("linkedin", &["linkedin.com/"]),
    ("youtube", &["youtube.com/", "youtu.be/"]),
    ("github", &["github.com/"]),
    ("tiktok", &["tiktok.com/"]),
    ("pinterest", &["pinterest.com/"]),
    ("reddit", &["reddit.com/"]),
];

/// Domains that show up in example snippets, not real contact data.
const SKIP_EMAIL_DOMAINS: &[&str] = &[
    "example.com",
    "test.com",
    "email.com",
    "domain.com",
    "sample.com",
];

const EMAIL_OBFUSCATIONS: &[(&str, &str)] = &[
    ("[at]", "@"),
    ("(at)", "@"),
    (" at ", "@"),
    ("[dot]", "."),
    ("(dot)", "."),
    (" dot ", "."),
];

fn email_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").unwrap()
    })
}

fn phone_res() -> &'static Vec<Regex> {
    static RES: OnceLock<Vec<Regex>> = OnceLock::new();
    RES.get_or_init(|| {
        vec![
            // North American formats
            Regex::new(r"\+?1?[-.\s]?\(?\d{3}\)?[-.\s]?\d{3}[-.\s]?\d{4}").unwrap(),
            // UK
            Regex::new(r"\+44\s?\d{4}\s?\d{6}").unwrap(),
            // General international
            Regex::new(r"\+\d{1,3}[-.\s]?\d{1,4}[-.\s]?\d{3,4}[-.\s]?\d{3,4}").unwrap(),
        ]
    })
}

/// Extract emails (including `mailto:` links and common obfuscations),
/// phone numbers, and social profile links.
pub fn extract(html: &str, text: &str) -> EntityData {
    let document = Html::parse_document(html);

    EntityData {
        emails: extract_emails(&document, text),
        phones: extract_phones(text),
        social_links: extract_social_links(&document),
    }
}

fn extract_emails(document: &Html, text: &str) -> Vec<String> {
    let mut emails: BTreeSet<String> = BTreeSet::new();

    if let Ok(selector) = Selector::parse("a[href^=\"mailto:\"]") {
        for a in document.select(&selector) {
            if let Some(href) = a.value().attr("href") {
                let email = href
                    .trim_start_matches("mailto:")
                    .split('?')
                    .next()
                    .unwrap_or_default()
                    .trim()
                    .to_lowercase();
                if is_valid_email(&email) {
                    emails.insert(email);
                }
            }
        }
    }

    for m in email_re().find_iter(text) {
        let email = m.as_str().to_lowercase();
        if is_valid_email(&email) {
            emails.insert(email);
        }
    }

    // A pass over deobfuscated text catches "name [at] host [dot] com".
    let mut deobfuscated = text.to_lowercase();
    for (pattern, replacement) in EMAIL_OBFUSCATIONS {
        deobfuscated = deobfuscated.replace(pattern, replacement);
    }
    for m in email_re().find_iter(&deobfuscated) {
        let email = m.as_str().to_string();
        if is_valid_email(&email) {
            emails.insert(email);
        }
    }

    emails.into_iter().collect()
}

fn extract_phones(text: &str) -> Vec<String> {
    let mut phones: BTreeSet<String> = BTreeSet::new();
    for re in phone_res() {
        for m in re.find_iter(text) {
            let phone: String = m
                .as_str()
                .trim()
                .chars()
                .filter(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | '(' | ')' | ' '))
                .collect();
            let digit_count = phone.chars().filter(char::is_ascii_digit).count();
            if digit_count >= 7 {
                phones.insert(phone);
            }
        }
    }
    phones.into_iter().collect()
}

fn extract_social_links(document: &Html) -> Vec<SocialLink> {
    let mut social = Vec::new();
    let mut seen: BTreeSet<String> = BTreeSet::new();

    let Ok(selector) = Selector::parse("a[href]") else {
        return social;
    };

    for a in document.select(&selector) {
        let Some(href) = a.value().attr("href") else {
            continue;
        };
        let href = href.trim();
        if !href.starts_with("http://") && !href.starts_with("https://") {
            continue;
        }
        let href_lower = href.to_lowercase();

        for (platform, patterns) in SOCIAL_PLATFORMS {
            if patterns.iter().any(|p| href_lower.contains(p)) {
                if seen.insert(href.to_string()) {
                    social.push(SocialLink {
                        platform: (*platform).to_string(),
                        url: href.to_string(),
                    });
                }
                break;
            }
        }
    }

    social
}

fn is_valid_email(email: &str) -> bool {
    if email.is_empty() || !email.contains('@') {
        return false;
    }
    let domain = email.rsplit('@').next().unwrap_or_default();
    if SKIP_EMAIL_DOMAINS.contains(&domain) {
        return false;
    }
    if [".png", ".jpg", ".gif", ".svg"]
        .iter()
        .any(|ext| email.ends_with(ext))
    {
        return false;
    }
    email_re().is_match(email)
}
