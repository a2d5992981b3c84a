//! Additive, deterministic risk ranking.
//!
//! score = W1·[CVE id] + W2·[zero-day] + W3·[ransomware / exploitation]
//!       + W4·[authoritative source] + W5·recency_decay
//!
//! Ordering: score desc, then `published` desc, then canonical key asc.
//! The key is unique after dedup, so the order is total.

use std::cmp::Ordering;
use std::collections::HashSet;

use chrono::{DateTime, Utc};
use regex::{Regex, RegexBuilder};
use serde::Serialize;

use crate::canonical::CanonicalKey;
use crate::config::{DigestConfig, ScoreWeights};
use crate::dedup::Keyed;
use crate::errors::DigestError;
use crate::ingest::types::RawItem;
use crate::recency;

/// An item that passed the recency filter, with its key and effective date.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub item: RawItem,
    pub key: CanonicalKey,
    pub published: DateTime<Utc>,
}

impl Keyed for Candidate {
    fn key(&self) -> &CanonicalKey {
        &self.key
    }
}

/// Which scoring rules fired; kept for log explainability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
    Cve,
    ZeroDay,
    Exploitation,
    AuthoritativeSource,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RankedItem {
    pub item: RawItem,
    pub key: CanonicalKey,
    pub published: DateTime<Utc>,
    pub score: f64,
    pub signals: Vec<Signal>,
    /// 0-based position after sorting.
    pub rank: usize,
}

#[derive(Debug, Clone)]
pub struct Ranker {
    weights: ScoreWeights,
    window_hours: u32,
    cve: Regex,
    zero_day: Vec<String>,
    exploit: Vec<String>,
    authoritative: HashSet<String>,
}

impl Ranker {
    pub fn from_config(cfg: &DigestConfig) -> Result<Self, DigestError> {
        let cve = RegexBuilder::new(&cfg.keywords.cve_pattern)
            .case_insensitive(true)
            .build()
            .map_err(|e| DigestError::config(format!("keywords.cve_pattern: {e}")))?;
        Ok(Self {
            weights: cfg.weights,
            window_hours: cfg.recent_hours,
            cve,
            zero_day: lower(&cfg.keywords.zero_day),
            exploit: lower(&cfg.keywords.exploit),
            authoritative: lower(&cfg.authoritative_sources).into_iter().collect(),
        })
    }

    /// 1.0 for brand-new items, falling linearly to 0.0 at the window edge.
    pub fn recency_decay(&self, published: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
        let window = f64::from(self.window_hours) * 3600.0;
        if window <= 0.0 {
            return 0.0;
        }
        let age = recency::age(published, now).num_seconds() as f64;
        (1.0 - age / window).clamp(0.0, 1.0)
    }

    pub fn signals(&self, item: &RawItem) -> Vec<Signal> {
        let text = format!("{} {}", item.title, item.raw_body_excerpt);
        let lower = text.to_lowercase();
        let mut out = Vec::new();
        if self.cve.is_match(&text) {
            out.push(Signal::Cve);
        }
        if self.zero_day.iter().any(|k| lower.contains(k.as_str())) {
            out.push(Signal::ZeroDay);
        }
        if self.exploit.iter().any(|k| lower.contains(k.as_str())) {
            out.push(Signal::Exploitation);
        }
        if self
            .authoritative
            .contains(&item.source_id.trim().to_lowercase())
        {
            out.push(Signal::AuthoritativeSource);
        }
        out
    }

    pub fn score(&self, c: &Candidate, now: DateTime<Utc>) -> (f64, Vec<Signal>) {
        let signals = self.signals(&c.item);
        let w = &self.weights;
        let mut score = 0.0;
        for s in &signals {
            score += match s {
                Signal::Cve => w.cve,
                Signal::ZeroDay => w.zero_day,
                Signal::Exploitation => w.exploit_keyword,
                Signal::AuthoritativeSource => w.authoritative_source,
            };
        }
        score += w.recency_decay * self.recency_decay(c.published, now);
        (score, signals)
    }

    /// Score and sort, most relevant first.
    pub fn rank(&self, candidates: Vec<Candidate>, now: DateTime<Utc>) -> Vec<RankedItem> {
        let mut ranked: Vec<RankedItem> = candidates
            .into_iter()
            .map(|c| {
                let (score, signals) = self.score(&c, now);
                RankedItem {
                    item: c.item,
                    key: c.key,
                    published: c.published,
                    score,
                    signals,
                    rank: 0,
                }
            })
            .collect();
        ranked.sort_by(compare);
        for (i, r) in ranked.iter_mut().enumerate() {
            r.rank = i;
        }
        ranked
    }

    /// Rank, then cap. The cap comes last so feed order never beats score.
    pub fn rank_top(
        &self,
        candidates: Vec<Candidate>,
        now: DateTime<Utc>,
        max_items: usize,
    ) -> Vec<RankedItem> {
        let mut ranked = self.rank(candidates, now);
        ranked.truncate(max_items);
        ranked
    }
}

fn lower(v: &[String]) -> Vec<String> {
    v.iter()
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Total order used for the digest.
pub fn compare(a: &RankedItem, b: &RankedItem) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| b.published.cmp(&a.published))
        .then_with(|| a.key.cmp(&b.key))
}
