use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use tracing::debug;
use url::Url;

/// Characters left as-is when re-encoding a path segment. Everything else
/// outside the alphanumeric range is percent-encoded.
const PATH_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'/')
    .remove(b':')
    .remove(b'@')
    .remove(b'!')
    .remove(b'$')
    .remove(b'&')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')')
    .remove(b'*')
    .remove(b'+')
    .remove(b',')
    .remove(b';')
    .remove(b'=')
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Query parameters that identify marketing campaigns, not content.
pub const TRACKING_PARAMS: &[&str] = &[
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_term",
    "utm_content",
    "utm_id",
    "fbclid",
    "gclid",
    "gclsrc",
    "dclid",
    "msclkid",
    "twclid",
    "ref",
    "ref_src",
    "source",
    "mc_cid",
    "mc_eid",
    "si",
    "spm",
    "_ga",
    "_gl",
    "_hsenc",
    "_hsmi",
    "hsa_cam",
    "hsa_grp",
    "hsa_mt",
    "hsa_src",
    "hsa_ad",
    "hsa_acc",
    "hsa_net",
    "hsa_ver",
    "hsa_kw",
    "hsa_tgt",
    "hsa_la",
    "hsa_ol",
];

/// URL prefixes that never point at crawlable web resources.
const SKIP_PREFIXES: &[&str] = &[
    "javascript:",
    "mailto:",
    "tel:",
    "data:",
    "ftp:",
    "file:",
    "blob:",
];

/// Normalizes URLs into a single canonical form so the frontier's
/// deduplication sees `/x`, `/x?utm_campaign=k` and `/x#h` as one URL.
#[derive(Debug, Clone)]
pub struct UrlNormalizer {
    remove_tracking_params: bool,
    remove_fragments: bool,
    sort_query_params: bool,
}

impl Default for UrlNormalizer {
    fn default() -> Self {
        Self {
            remove_tracking_params: true,
            remove_fragments: true,
            sort_query_params: true,
        }
    }
}

impl UrlNormalizer {
    pub fn new(
        remove_tracking_params: bool,
        remove_fragments: bool,
        sort_query_params: bool,
    ) -> Self {
        Self {
            remove_tracking_params,
            remove_fragments,
            sort_query_params,
        }
    }

    /// Fully normalize a URL, resolving it against `base` when relative.
    /// Returns `None` for invalid or uncrawlable URLs.
    pub fn normalize(&self, url: &str, base: Option<&str>) -> Option<String> {
        let raw = url.trim();
        if raw.is_empty() {
            return None;
        }

        let lower = raw.to_ascii_lowercase();
        if SKIP_PREFIXES.iter().any(|p| lower.starts_with(p)) {
            return None;
        }

        let parsed = if lower.starts_with("http://") || lower.starts_with("https://") {
            Url::parse(raw).ok()?
        } else if let Some(base) = base {
            Url::parse(base).ok()?.join(raw).ok()?
        } else {
            Url::parse(raw).ok()?
        };

        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return None;
        }

        let host = parsed.host_str()?;
        let host = host.to_ascii_lowercase();
        let host = host.trim_matches('.');
        if host.is_empty() {
            return None;
        }

        let mut out = parsed.clone();
        if out.set_host(Some(host)).is_err() {
            debug!(url = raw, "host rewrite failed during normalization");
            return None;
        }

        // The url crate already drops default ports and resolves dot
        // segments at parse time; what remains is slash collapsing,
        // trailing-slash removal, and the decode/re-encode round trip.
        out.set_path(&self.normalize_path(parsed.path()));
        match self.normalize_query(parsed.query()) {
            Some(q) if !q.is_empty() => out.set_query(Some(&q)),
            _ => out.set_query(None),
        }
        if self.remove_fragments {
            out.set_fragment(None);
        }

        Some(out.to_string())
    }

    fn normalize_path(&self, path: &str) -> String {
        let decoded = percent_decode_str(path).decode_utf8_lossy();

        let mut resolved: Vec<&str> = Vec::new();
        for seg in decoded.split('/') {
            match seg {
                "" | "." => continue,
                ".." => {
                    resolved.pop();
                }
                other => resolved.push(other),
            }
        }

        let joined = format!("/{}", resolved.join("/"));
        utf8_percent_encode(&joined, PATH_ENCODE_SET).to_string()
    }

    fn normalize_query(&self, query: Option<&str>) -> Option<String> {
        let query = query?;
        if query.is_empty() {
            return None;
        }

        let mut pairs: Vec<(String, String)> = url::form_urlencoded::parse(query.as_bytes())
            .into_owned()
            .filter(|(k, _)| {
                !self.remove_tracking_params
                    || !TRACKING_PARAMS.contains(&k.to_ascii_lowercase().as_str())
            })
            .collect();

        if pairs.is_empty() {
            return None;
        }

        if self.sort_query_params {
            pairs.sort();
        }

        let mut serializer = url::form_urlencoded::Serializer::new(String::new());
        for (k, v) in &pairs {
            serializer.append_pair(k, v);
        }
        Some(serializer.finish())
    }

    /// Registered domain (`domain.suffix`, e.g. `example.co.uk`) of a URL.
    /// IP hosts and single-label names (`localhost`) fall back to the full
    /// host so same-host comparison still works.
    pub fn registered_domain(&self, url: &str) -> Option<String> {
        let parsed = Url::parse(url).ok()?;
        match parsed.host()? {
            url::Host::Domain(domain) => {
                let domain = domain.to_ascii_lowercase();
                Some(
                    psl::domain_str(&domain)
                        .map(|d| d.to_string())
                        .unwrap_or(domain),
                )
            }
            url::Host::Ipv4(ip) => Some(ip.to_string()),
            url::Host::Ipv6(ip) => Some(ip.to_string()),
        }
    }

    /// Full host (`subdomain.domain.suffix`) of a URL.
    pub fn fqdn(&self, url: &str) -> Option<String> {
        let parsed = Url::parse(url).ok()?;
        parsed.host_str().map(|h| h.to_ascii_lowercase())
    }

    pub fn is_same_domain(&self, a: &str, b: &str) -> bool {
        match (self.registered_domain(a), self.registered_domain(b)) {
            (Some(da), Some(db)) => da == db,
            _ => false,
        }
    }

    pub fn is_same_subdomain(&self, a: &str, b: &str) -> bool {
        match (self.fqdn(a), self.fqdn(b)) {
            (Some(ha), Some(hb)) => ha == hb,
            _ => false,
        }
    }

    /// Whether `url` counts as internal relative to `base_url`.
    pub fn is_internal(&self, url: &str, base_url: &str, include_subdomains: bool) -> bool {
        if include_subdomains {
            self.is_same_domain(url, base_url)
        } else {
            self.is_same_subdomain(url, base_url)
        }
    }
}
