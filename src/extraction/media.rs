use regex::Regex;
use scraper::{Html, Selector};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::OnceLock;
use url::Url;

#[derive(Debug, Clone, Default, Serialize)]
pub struct ImageInfo {
    pub url: String,
    pub alt: String,
    pub title: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub format: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct VideoInfo {
    pub url: String,
    /// `html5`, `iframe` or `embed`.
    pub kind: String,
    /// `youtube`, `vimeo`, ... or `self-hosted`.
    pub source: String,
    pub poster: String,
    pub title: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct FileInfo {
    pub url: String,
    pub file_type: String,
    pub filename: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MediaData {
    pub images: Vec<ImageInfo>,
    pub videos: Vec<VideoInfo>,
    pub files: Vec<FileInfo>,
}

const VIDEO_PLATFORMS: &[(&str, &[&str])] = &[
    (
        "youtube",
        &[
            "youtube.com/embed/",
            "youtube.com/watch",
            "youtu.be/",
            "youtube-nocookie.com/embed/",
        ],
    ),
    ("vimeo", &["vimeo.com/", "player.vimeo.com/"]),
    ("dailymotion", &["dailymotion.com/"]),
    ("wistia", &["wistia.com/", "wistia.net/"]),
];

const VIDEO_EXTENSIONS: &[&str] = &[".mp4", ".webm", ".ogv", ".mov", ".avi", ".mkv"];

const DOWNLOADABLE_EXTENSIONS: &[(&str, &str)] = &[
    (".pdf", "document"),
    (".doc", "document"),
    (".docx", "document"),
    (".xls", "spreadsheet"),
    (".xlsx", "spreadsheet"),
    (".ppt", "presentation"),
    (".pptx", "presentation"),
    (".csv", "data"),
    (".json", "data"),
    (".xml", "data"),
    (".zip", "archive"),
    (".tar", "archive"),
    (".gz", "archive"),
    (".rar", "archive"),
    (".7z", "archive"),
];

fn background_url_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"url\(['"]?([^'")]+)['"]?\)"#).unwrap())
}

/// Extract images (including lazy-load attributes, `<picture>` sources and
/// CSS background images), videos and downloadable file links.
pub fn extract(html: &str, base_url: &str) -> MediaData {
    let document = Html::parse_document(html);
    let base = Url::parse(base_url).ok();

    MediaData {
        images: extract_images(&document, base.as_ref()),
        videos: extract_videos(&document, base.as_ref()),
        files: extract_files(&document, base.as_ref()),
    }
}

fn absolutize(base: Option<&Url>, src: &str) -> Option<String> {
    if src.is_empty() || src.starts_with("data:") {
        return None;
    }
    match base {
        Some(base) => base.join(src).ok().map(|u| u.to_string()),
        None => Some(src.to_string()),
    }
}

fn extension_of(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    match path.rsplit_once('.') {
        Some((_, ext)) if !ext.contains('/') => format!(".{}", ext.to_lowercase()),
        _ => String::new(),
    }
}

fn extract_images(document: &Html, base: Option<&Url>) -> Vec<ImageInfo> {
    let mut images = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    if let Ok(selector) = Selector::parse("img") {
        for img in document.select(&selector) {
            let value = img.value();
            let src = value
                .attr("src")
                .or_else(|| value.attr("data-src"))
                .or_else(|| value.attr("data-lazy-src"))
                .or_else(|| value.attr("data-original"))
                .unwrap_or_default();
            let Some(url) = absolutize(base, src.trim()) else {
                continue;
            };
            if !seen.insert(url.clone()) {
                continue;
            }

            let format = extension_of(&url).trim_start_matches('.').to_uppercase();
            images.push(ImageInfo {
                url,
                alt: value.attr("alt").unwrap_or_default().trim().to_string(),
                title: value.attr("title").unwrap_or_default().trim().to_string(),
                width: value.attr("width").and_then(|w| w.parse().ok()),
                height: value.attr("height").and_then(|h| h.parse().ok()),
                format,
            });
        }
    }

    if let Ok(selector) = Selector::parse("picture source[srcset]") {
        for source in document.select(&selector) {
            let srcset = source.value().attr("srcset").unwrap_or_default();
            let first = srcset
                .split(',')
                .next()
                .unwrap_or_default()
                .split_whitespace()
                .next()
                .unwrap_or_default();
            if let Some(url) = absolutize(base, first) {
                if seen.insert(url.clone()) {
                    let format = extension_of(&url).trim_start_matches('.').to_uppercase();
                    images.push(ImageInfo {
                        url,
                        format,
                        ..Default::default()
                    });
                }
            }
        }
    }

    if let Ok(selector) = Selector::parse("[style*=\"background-image\"]") {
        for el in document.select(&selector) {
            let style = el.value().attr("style").unwrap_or_default();
            for cap in background_url_re().captures_iter(style) {
                if let Some(url) = absolutize(base, cap[1].trim()) {
                    if seen.insert(url.clone()) {
                        let format = extension_of(&url).trim_start_matches('.').to_uppercase();
                        images.push(ImageInfo {
                            url,
                            format,
                            ..Default::default()
                        });
                    }
                }
            }
        }
    }

    images
}

fn extract_videos(document: &Html, base: Option<&Url>) -> Vec<VideoInfo> {
    let mut videos = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    if let Ok(selector) = Selector::parse("video") {
        for video in document.select(&selector) {
            let poster = video.value().attr("poster").unwrap_or_default().to_string();
            let mut sources: Vec<&str> = Vec::new();
            if let Some(src) = video.value().attr("src") {
                sources.push(src);
            }
            if let Ok(source_sel) = Selector::parse("source[src]") {
                for source in video.select(&source_sel) {
                    if let Some(src) = source.value().attr("src") {
                        sources.push(src);
                    }
                }
            }
            for src in sources {
                if let Some(url) = absolutize(base, src.trim()) {
                    if seen.insert(url.clone()) {
                        videos.push(VideoInfo {
                            url,
                            kind: "html5".to_string(),
                            source: "self-hosted".to_string(),
                            poster: poster.clone(),
                            title: String::new(),
                        });
                    }
                }
            }
        }
    }

    if let Ok(selector) = Selector::parse("iframe") {
        for iframe in document.select(&selector) {
            let src = iframe
                .value()
                .attr("src")
                .or_else(|| iframe.value().attr("data-src"))
                .unwrap_or_default();
            let Some(url) = absolutize(base, src.trim()) else {
                continue;
            };
            if let Some(platform) = identify_platform(&url) {
                if seen.insert(url.clone()) {
                    videos.push(VideoInfo {
                        url,
                        kind: "iframe".to_string(),
                        source: platform.to_string(),
                        poster: String::new(),
                        title: iframe.value().attr("title").unwrap_or_default().to_string(),
                    });
                }
            }
        }
    }

    if let Ok(selector) = Selector::parse("embed, object") {
        for embed in document.select(&selector) {
            let src = embed
                .value()
                .attr("src")
                .or_else(|| embed.value().attr("data"))
                .unwrap_or_default();
            let Some(url) = absolutize(base, src.trim()) else {
                continue;
            };
            if VIDEO_EXTENSIONS.contains(&extension_of(&url).as_str()) && seen.insert(url.clone()) {
                videos.push(VideoInfo {
                    url,
                    kind: "embed".to_string(),
                    source: "self-hosted".to_string(),
                    poster: String::new(),
                    title: String::new(),
                });
            }
        }
    }

    videos
}

fn extract_files(document: &Html, base: Option<&Url>) -> Vec<FileInfo> {
    let mut files = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    let Ok(selector) = Selector::parse("a[href]") else {
        return files;
    };

    for a in document.select(&selector) {
        let href = a.value().attr("href").unwrap_or_default();
        let Some(url) = absolutize(base, href.trim()) else {
            continue;
        };
        let ext = extension_of(&url);
        let Some((_, file_type)) = DOWNLOADABLE_EXTENSIONS.iter().find(|(e, _)| *e == ext) else {
            continue;
        };
        if !seen.insert(url.clone()) {
            continue;
        }

        let filename = url
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .to_string();
        files.push(FileInfo {
            url,
            file_type: (*file_type).to_string(),
            filename,
        });
    }

    files
}

fn identify_platform(url: &str) -> Option<&'static str> {
    let lower = url.to_lowercase();
    for (platform, patterns) in VIDEO_PLATFORMS {
        if patterns.iter().any(|p| lower.contains(p)) {
            return Some(platform);
        }
    }
    None
}
