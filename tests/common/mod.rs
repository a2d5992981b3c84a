// tests/common/mod.rs
// Scripted model client + item builders shared by the integration tests.
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::json;
use threat_digest::canonical::canonicalize;
use threat_digest::ingest::types::RawItem;
use threat_digest::rank::RankedItem;
use threat_digest::summarize::{ItemContext, ModelClient, ModelRequest};

pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
}

pub fn raw(title: &str, url: &str, source: &str, hours_old: i64) -> RawItem {
    RawItem {
        url: url.into(),
        title: title.into(),
        published_at: Some(now() - chrono::Duration::hours(hours_old)),
        source_id: source.into(),
        raw_body_excerpt: String::new(),
    }
}

pub fn ranked(title: &str, rank: usize) -> RankedItem {
    let item = raw(
        title,
        &format!("https://news.test/{}", title.replace(' ', "-").to_lowercase()),
        "blog",
        1,
    );
    RankedItem {
        key: canonicalize(&item),
        published: item.published_at.unwrap(),
        item,
        score: 10.0 - rank as f64,
        signals: Vec::new(),
        rank,
    }
}

/// A reply that passes validation for the item in `ctx`.
pub fn valid_reply(ctx: &ItemContext) -> String {
    json!({
        "canonical_key": ctx.canonical_key,
        "title": ctx.title,
        "summary_text": format!("Summary of {}.", ctx.title),
        "risk_level": "HIGH",
        "confidence": "MEDIUM",
        "glossary": { "KEV": "Known Exploited Vulnerabilities catalog" },
        "source_url": ctx.url,
    })
    .to_string()
}

#[derive(Debug, Clone)]
pub enum Reply {
    Valid,
    Raw(String),
    /// Valid reply after a delay.
    Slow(Duration),
    /// Never answers within any sane deadline.
    Hang,
    Fail(&'static str),
}

/// Per-title reply scripts; unscripted calls get a valid reply.
#[derive(Default)]
pub struct ScriptedClient {
    scripts: Mutex<HashMap<String, VecDeque<Reply>>>,
    pub calls: Mutex<Vec<ModelRequest>>,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(self, title: &str, replies: Vec<Reply>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(title.to_string(), replies.into());
        self
    }

    /// Every call for `title` gets `reply`, forever.
    pub fn always(self, title: &str, reply: Reply) -> Self {
        self.script(title, vec![reply; 16])
    }

    pub fn calls_for(&self, title: &str) -> Vec<ModelRequest> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.context.title == title)
            .cloned()
            .collect()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl ModelClient for ScriptedClient {
    async fn complete(&self, req: &ModelRequest) -> anyhow::Result<String> {
        self.calls.lock().unwrap().push(req.clone());
        let next = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&req.context.title)
            .and_then(|q| q.pop_front())
            .unwrap_or(Reply::Valid);

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        let out = match next {
            Reply::Valid => Ok(valid_reply(&req.context)),
            Reply::Raw(s) => Ok(s),
            Reply::Slow(d) => {
                tokio::time::sleep(d).await;
                Ok(valid_reply(&req.context))
            }
            Reply::Hang => {
                tokio::time::sleep(Duration::from_secs(24 * 3600)).await;
                Ok(valid_reply(&req.context))
            }
            Reply::Fail(msg) => Err(anyhow::anyhow!(msg)),
        };
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        out
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
