// src/ingest/mod.rs
pub mod providers;
pub mod types;

use crate::ingest::types::{RawItem, SourceProvider};
use crate::telemetry;
use chrono::{DateTime, Utc};
use metrics::counter;

/// Max characters kept from a feed body.
pub const EXCERPT_MAX_CHARS: usize = 1500;

/// Normalize text: decode entities, strip tags, collapse whitespace, cap length.
pub fn normalize_text(s: &str) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags
    static RE_TAGS: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, " ").to_string();

    // 3) Normalize “ ” ‘ ’ « » to ASCII quotes
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 4) Collapse whitespace
    static RE_WS: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").trim().to_string();

    // 5) Length cap
    if out.chars().count() > EXCERPT_MAX_CHARS {
        out = out.chars().take(EXCERPT_MAX_CHARS).collect();
    }

    out
}

/// Parse a feed timestamp. Accepts RFC 3339 (Atom) and RFC 2822 (RSS).
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    DateTime::parse_from_rfc3339(s)
        .or_else(|_| DateTime::parse_from_rfc2822(s))
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Pull from every provider in order and concatenate.
/// A failing or empty provider is logged and skipped; the run goes on with the rest.
pub async fn collect(providers: &[Box<dyn SourceProvider>]) -> Vec<RawItem> {
    telemetry::ensure_described();

    let mut raw = Vec::new();
    for p in providers {
        match p.fetch_latest().await {
            Ok(v) if v.is_empty() => {
                tracing::warn!(target: "threat_digest::ingest", provider = p.name(), "provider yielded no items");
            }
            Ok(mut v) => {
                tracing::debug!(target: "threat_digest::ingest", provider = p.name(), items = v.len(), "provider ok");
                raw.append(&mut v);
            }
            Err(e) => {
                tracing::warn!(target: "threat_digest::ingest", error = ?e, provider = p.name(), "provider error");
                counter!("digest_provider_errors_total").increment(1);
            }
        }
    }

    counter!("digest_items_fetched_total").increment(raw.len() as u64);
    raw
}
