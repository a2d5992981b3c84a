//! # Canonical keys
//!
//! Stable story identity derived from an item's URL and title.
//!
//! - URL: host (lowercased, leading `www.` dropped) + path, tracking parameters
//!   removed, trailing slash removed, remaining query parameters sorted. Scheme,
//!   fragment, userinfo and port are ignored.
//! - Title: lowercased, punctuation replaced by spaces, whitespace collapsed,
//!   then SHA-256.
//! - Items whose URL is unusable fall back to a hash of `source_id` + raw title,
//!   so `canonicalize` never fails.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use url::Url;

use crate::ingest::types::RawItem;

/// Query parameters dropped from URLs. `utm_*` is matched by prefix.
const TRACKING_PARAMS: &[&str] = &[
    "utm", "fbclid", "gclid", "dclid", "msclkid", "mc_cid", "mc_eid", "_hsenc", "_hsmi", "igshid",
    "ref_src",
];

/// Prefix marking a key whose URL could not be used.
pub const NO_URL_PREFIX: &str = "nourl:";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalKey {
    pub canonical_url: String,
    pub title_hash: String,
}

impl fmt::Display for CanonicalKey {
    /// Short form for logs and prompts: `<url>#<first 12 hash chars>`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let short = self.title_hash.get(..12).unwrap_or(&self.title_hash);
        write!(f, "{}#{}", self.canonical_url, short)
    }
}

pub fn canonicalize(item: &RawItem) -> CanonicalKey {
    let canonical_url = canonical_url(&item.url)
        .unwrap_or_else(|| format!("{NO_URL_PREFIX}{}", fallback_hash(&item.source_id, &item.title)));
    CanonicalKey {
        canonical_url,
        title_hash: title_hash(&item.title),
    }
}

/// `None` when the URL does not parse or has no host.
pub fn canonical_url(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let parsed = Url::parse(raw).ok()?;
    let host = parsed.host_str()?.trim_end_matches('.').to_ascii_lowercase();
    if host.is_empty() {
        return None;
    }
    let host = host.strip_prefix("www.").map(str::to_string).unwrap_or(host);

    let path = parsed.path().trim_end_matches('/');

    let mut query: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(k, _)| !is_tracking_param(k))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    query.sort();

    let mut out = format!("{host}{path}");
    if !query.is_empty() {
        let qs = query
            .iter()
            .map(|(k, v)| if v.is_empty() { k.clone() } else { format!("{k}={v}") })
            .collect::<Vec<_>>()
            .join("&");
        out.push('?');
        out.push_str(&qs);
    }
    Some(out)
}

fn is_tracking_param(name: &str) -> bool {
    let n = name.to_ascii_lowercase();
    n.starts_with("utm_") || TRACKING_PARAMS.contains(&n.as_str())
}

/// Lowercase, punctuation → space, collapse whitespace.
pub fn normalize_title(title: &str) -> String {
    let lowered: String = title
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    lowered.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn title_hash(title: &str) -> String {
    hex_sha256(normalize_title(title).as_bytes())
}

fn fallback_hash(source_id: &str, raw_title: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source_id.as_bytes());
    hasher.update([0u8]);
    hasher.update(raw_title.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn hex_sha256(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(url: &str, title: &str) -> RawItem {
        RawItem {
            url: url.into(),
            title: title.into(),
            published_at: None,
            source_id: "feed".into(),
            raw_body_excerpt: String::new(),
        }
    }

    #[test]
    fn strips_tracking_and_trailing_slash() {
        assert_eq!(canonical_url("https://a.com/x?utm=1").as_deref(), Some("a.com/x"));
        assert_eq!(canonical_url("https://a.com/x/").as_deref(), Some("a.com/x"));
        assert_eq!(
            canonical_url("HTTP://News.Example.COM/Path/?utm_source=rss&id=7&fbclid=z#frag").as_deref(),
            Some("news.example.com/Path?id=7")
        );
    }

    #[test]
    fn keeps_and_sorts_meaningful_query() {
        assert_eq!(
            canonical_url("https://a.com/p?b=2&a=1").as_deref(),
            Some("a.com/p?a=1&b=2")
        );
    }

    #[test]
    fn www_and_scheme_do_not_matter() {
        assert_eq!(canonical_url("http://www.a.com/x"), canonical_url("https://a.com/x"));
    }

    #[test]
    fn title_normalization() {
        assert_eq!(normalize_title("  Zero-Day in  FooBar!!  "), "zero day in foobar");
        assert_eq!(title_hash("Zero-Day in FooBar"), title_hash("zero day, in foobar."));
        assert_ne!(title_hash("Zero-Day in FooBar"), title_hash("Zero-Day in BarFoo"));
    }

    #[test]
    fn malformed_url_falls_back_to_source_and_title() {
        let a = canonicalize(&item("not a url", "Some Title"));
        let b = canonicalize(&item("", "Some Title"));
        assert!(a.canonical_url.starts_with(NO_URL_PREFIX));
        assert_eq!(a, b);

        let mut other_source = item("", "Some Title");
        other_source.source_id = "elsewhere".into();
        assert_ne!(canonicalize(&other_source), b);
    }

    #[test]
    fn host_only_url_has_empty_path() {
        assert_eq!(canonical_url("https://a.com/").as_deref(), Some("a.com"));
        assert_eq!(canonical_url("mailto:someone@example.com"), None);
    }
}
