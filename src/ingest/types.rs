// src/ingest/types.rs
use anyhow::Result;
use chrono::{DateTime, Utc};

/// One story as handed over by a feed adapter. Immutable and run-scoped.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct RawItem {
    pub url: String,
    pub title: String,
    /// `None` when the feed carried no date or it could not be parsed.
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
    pub source_id: String, // e.g. "cisa", "bleepingcomputer"
    #[serde(default)]
    pub raw_body_excerpt: String, // normalized text, capped
}

#[async_trait::async_trait]
pub trait SourceProvider: Send + Sync {
    async fn fetch_latest(&self) -> Result<Vec<RawItem>>;
    fn name(&self) -> &str;
}
