use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

use crate::ingest::types::{RawItem, SourceProvider};
use crate::ingest::{normalize_text, parse_timestamp};

/// Loose on-disk shape; dates stay strings so one bad date doesn't reject the file.
#[derive(Debug, Deserialize)]
struct JsonItem {
    #[serde(default)]
    url: String,
    #[serde(default)]
    title: String,
    #[serde(default, alias = "published")]
    published_at: Option<String>,
    #[serde(default, alias = "summary")]
    excerpt: String,
}

/// Reads a JSON array of items, e.g. exported by another collector.
pub struct JsonFileProvider {
    source_id: String,
    path: PathBuf,
}

impl JsonFileProvider {
    pub fn new(source_id: &str, path: impl Into<PathBuf>) -> Self {
        Self {
            source_id: source_id.to_ascii_lowercase(),
            path: path.into(),
        }
    }

    pub fn parse_items_from_str(&self, s: &str) -> Result<Vec<RawItem>> {
        let rows: Vec<JsonItem> = serde_json::from_str(s)
            .with_context(|| format!("parsing json items from {}", self.path.display()))?;
        Ok(rows
            .into_iter()
            .filter(|r| !(r.title.trim().is_empty() && r.url.trim().is_empty()))
            .map(|r| RawItem {
                url: r.url.trim().to_string(),
                title: normalize_text(&r.title),
                published_at: r.published_at.as_deref().and_then(parse_timestamp),
                source_id: self.source_id.clone(),
                raw_body_excerpt: normalize_text(&r.excerpt),
            })
            .collect())
    }
}

#[async_trait]
impl SourceProvider for JsonFileProvider {
    async fn fetch_latest(&self) -> Result<Vec<RawItem>> {
        let s = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("reading {}", self.path.display()))?;
        self.parse_items_from_str(&s)
    }

    fn name(&self) -> &str {
        &self.source_id
    }
}
