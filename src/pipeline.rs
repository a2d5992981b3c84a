// src/pipeline.rs
//! One digest run, end to end:
//! load ledger → recency filter → canonicalize → dedup → rank + cap →
//! summarize → record emitted keys → commit.
//!
//! The ledger is committed once, at the end, and only when the run produced
//! output or had nothing to do. A run where every selected item failed
//! summarization leaves the ledger untouched so those items stay eligible.

use chrono::{DateTime, Utc};
use metrics::{counter, gauge};
use serde::Serialize;

use crate::canonical::canonicalize;
use crate::config::DigestConfig;
use crate::dedup::{dedup, DedupStats};
use crate::errors::DigestError;
use crate::ingest::{self, types::RawItem, types::SourceProvider};
use crate::rank::{Candidate, Ranker};
use crate::recency;
use crate::state::{FileStateStore, StateStore};
use crate::summarize::{
    DynModelClient, GatewaySettings, SummarizationFailure, SummarizerGateway, SummaryRecord,
};
use crate::telemetry;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    pub fetched: usize,
    /// Outside the window or without a usable date.
    pub stale: usize,
    pub recent: usize,
    pub dedup_seen_before: usize,
    pub dedup_same_run: usize,
    pub ranked: usize,
    pub summarized: usize,
    pub failed: usize,
    /// Ledger keys evicted by TTL at load time.
    pub expired: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    /// In rank order.
    pub records: Vec<SummaryRecord>,
    pub failures: Vec<SummarizationFailure>,
    pub stats: RunStats,
    /// Set when the ledger could not be written. The records are still valid.
    pub commit_error: Option<String>,
}

pub struct Pipeline {
    cfg: DigestConfig,
    ranker: Ranker,
    gateway: SummarizerGateway,
    store: Box<dyn StateStore>,
}

impl Pipeline {
    pub fn new(
        cfg: DigestConfig,
        client: DynModelClient,
        store: Box<dyn StateStore>,
    ) -> Result<Self, DigestError> {
        let ranker = Ranker::from_config(&cfg)?;
        let gateway = SummarizerGateway::new(client, GatewaySettings::from_config(&cfg));
        Ok(Self {
            cfg,
            ranker,
            gateway,
            store,
        })
    }

    /// File-backed ledger at `cfg.state_path`.
    pub fn from_config(cfg: DigestConfig, client: DynModelClient) -> Result<Self, DigestError> {
        let store = FileStateStore::new(cfg.state_path.clone());
        Self::new(cfg, client, Box::new(store))
    }

    pub fn config(&self) -> &DigestConfig {
        &self.cfg
    }

    /// Collect from `providers`, then [`Pipeline::run`].
    pub async fn run_providers(
        &self,
        providers: &[Box<dyn SourceProvider>],
        now: DateTime<Utc>,
    ) -> Result<RunReport, DigestError> {
        let raw = ingest::collect(providers).await;
        self.run(raw, now).await
    }

    pub async fn run(&self, raw: Vec<RawItem>, now: DateTime<Utc>) -> Result<RunReport, DigestError> {
        telemetry::ensure_described();
        let cfg = &self.cfg;
        let mut stats = RunStats {
            fetched: raw.len(),
            ..RunStats::default()
        };

        let mut state = self.store.load();
        stats.expired = state.expire(now, cfg.state_ttl_days);
        if stats.expired > 0 {
            tracing::info!(target: "threat_digest::pipeline", expired = stats.expired, "evicted old ledger keys");
        }

        let candidates: Vec<Candidate> = raw
            .into_iter()
            .filter_map(|item| {
                if !recency::is_recent(&item, now, cfg.recent_hours, cfg.on_missing_timestamp) {
                    return None;
                }
                let published = recency::resolve_published(&item, now, cfg.on_missing_timestamp)?;
                Some(Candidate {
                    key: canonicalize(&item),
                    published,
                    item,
                })
            })
            .collect();
        stats.recent = candidates.len();
        stats.stale = stats.fetched - stats.recent;
        counter!("digest_items_recent_total").increment(stats.recent as u64);

        let (fresh, DedupStats { seen_before, same_run }) = dedup(candidates, &state);
        stats.dedup_seen_before = seen_before;
        stats.dedup_same_run = same_run;
        counter!("digest_dedup_dropped_total").increment((seen_before + same_run) as u64);

        let ranked = self.ranker.rank_top(fresh, now, cfg.max_items_per_run);
        stats.ranked = ranked.len();
        counter!("digest_items_ranked_total").increment(ranked.len() as u64);
        for r in &ranked {
            tracing::debug!(
                target: "threat_digest::pipeline",
                rank = r.rank,
                score = r.score,
                signals = ?r.signals,
                key = %r.key,
                "selected"
            );
        }

        let batch = self.gateway.summarize_all(&ranked, cfg.tone_mode).await;
        stats.summarized = batch.records.len();
        stats.failed = batch.failures.len();

        if stats.ranked > 0 && stats.summarized == 0 {
            tracing::error!(target: "threat_digest::pipeline", attempted = stats.ranked, "every selected item failed; ledger left unchanged");
            return Err(DigestError::AllItemsFailed {
                attempted: stats.ranked,
            });
        }

        for rec in &batch.records {
            state.record(rec.canonical_key.clone(), now);
        }
        state.mark_run(now);

        let commit_error = match self.store.commit(&state) {
            Ok(()) => {
                gauge!("digest_state_keys").set(state.len() as f64);
                gauge!("digest_last_run_ts").set(now.timestamp() as f64);
                None
            }
            Err(e) => {
                tracing::warn!(target: "threat_digest::pipeline", error = ?e, "state commit failed; summaries still returned");
                Some(format!("{e:#}"))
            }
        };

        tracing::info!(
            target: "threat_digest::pipeline",
            fetched = stats.fetched,
            recent = stats.recent,
            dedup_dropped = stats.dedup_seen_before + stats.dedup_same_run,
            ranked = stats.ranked,
            summarized = stats.summarized,
            failed = stats.failed,
            model = self.gateway.client_name(),
            "run complete"
        );

        Ok(RunReport {
            records: batch.records,
            failures: batch.failures,
            stats,
            commit_error,
        })
    }
}
