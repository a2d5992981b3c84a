// src/summarize/mod.rs
//! Summarizer gateway.
//!
//! Every ranked item gets up to `1 + retry_limit` model calls, each under a
//! hard deadline. A reply only becomes a [`SummaryRecord`] after it passes
//! [`schema::validate`]. Items that never validate are dropped with a
//! warning; the rest of the batch is unaffected (fail-open per item).

pub mod client;
pub mod prompt;
pub mod schema;

use std::time::Duration;

use futures::stream::{self, StreamExt};
use metrics::counter;
use thiserror::Error;

use crate::canonical::CanonicalKey;
use crate::config::{DigestConfig, ToneMode};
use crate::rank::RankedItem;

pub use client::{build_client, DynModelClient, ModelClient, OfflineClient, OpenAiClient};
pub use prompt::{ItemContext, ModelRequest};
pub use schema::{Confidence, RiskLevel, SchemaViolation, SummaryPayload, SummaryRecord};

/// Why a single attempt did not produce a record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AttemptError {
    #[error("schema violation: {0}")]
    Schema(#[from] SchemaViolation),
    #[error("model call timed out after {0:?}")]
    Timeout(Duration),
    #[error("transport error: {0}")]
    Transport(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{key}: gave up after {attempts} attempt(s): {last_error}")]
pub struct SummarizationFailure {
    pub key: CanonicalKey,
    pub title: String,
    pub attempts: u32,
    pub last_error: AttemptError,
}

/// Gateway knobs, lifted from [`DigestConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GatewaySettings {
    pub retry_limit: u32,
    pub call_timeout: Duration,
    pub concurrency: usize,
}

impl GatewaySettings {
    pub fn from_config(cfg: &DigestConfig) -> Self {
        Self {
            retry_limit: cfg.retry_limit,
            call_timeout: Duration::from_secs(cfg.call_timeout_secs),
            concurrency: cfg.concurrency.max(1),
        }
    }
}

/// Output of a batch: records in rank order, plus what was dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SummaryBatch {
    pub records: Vec<SummaryRecord>,
    pub failures: Vec<SummarizationFailure>,
}

pub struct SummarizerGateway {
    client: DynModelClient,
    settings: GatewaySettings,
}

impl SummarizerGateway {
    pub fn new(client: DynModelClient, settings: GatewaySettings) -> Self {
        Self { client, settings }
    }

    pub fn settings(&self) -> &GatewaySettings {
        &self.settings
    }

    pub fn client_name(&self) -> &str {
        self.client.name()
    }

    /// Summarize one item, retrying on any attempt error.
    pub async fn summarize(
        &self,
        item: &RankedItem,
        tone: ToneMode,
    ) -> Result<SummaryRecord, SummarizationFailure> {
        let max_attempts = self.settings.retry_limit.saturating_add(1);
        let base = prompt::build_request(item, tone);
        let mut req = base.clone();
        let mut last_error = None;

        for attempt in 1..=max_attempts {
            counter!("digest_model_attempts_total").increment(1);
            let outcome = self.attempt(&req, &item.key).await;
            match outcome {
                Ok(payload) => {
                    tracing::debug!(target: "threat_digest::summarize", key = %item.key, attempt, "summary validated");
                    counter!("digest_summaries_total").increment(1);
                    return Ok(payload.into_record(item.key.clone()));
                }
                Err(e) => {
                    tracing::debug!(target: "threat_digest::summarize", key = %item.key, attempt, error = %e, "attempt rejected");
                    req = match &e {
                        AttemptError::Schema(v) => prompt::corrective(&base, v, attempt + 1),
                        AttemptError::Timeout(_) | AttemptError::Transport(_) => {
                            prompt::resend(&base, attempt + 1)
                        }
                    };
                    last_error = Some(e);
                }
            }
        }

        counter!("digest_summary_failures_total").increment(1);
        Err(SummarizationFailure {
            key: item.key.clone(),
            title: item.item.title.clone(),
            attempts: max_attempts,
            last_error: last_error.unwrap_or(AttemptError::Transport("no attempt made".into())),
        })
    }

    async fn attempt(&self, req: &ModelRequest, key: &CanonicalKey) -> Result<SummaryPayload, AttemptError> {
        let deadline = self.settings.call_timeout;
        let raw = match tokio::time::timeout(deadline, self.client.complete(req)).await {
            Err(_) => return Err(AttemptError::Timeout(deadline)),
            Ok(Err(e)) => return Err(AttemptError::Transport(format!("{e:#}"))),
            Ok(Ok(raw)) => raw,
        };
        Ok(schema::validate(&raw, key)?)
    }

    /// Summarize a ranked batch with at most `concurrency` calls in flight.
    /// Records come back in rank order whatever order the calls finish in.
    pub async fn summarize_all(&self, items: &[RankedItem], tone: ToneMode) -> SummaryBatch {
        let mut results: Vec<(usize, Result<SummaryRecord, SummarizationFailure>)> =
            stream::iter(items.iter().map(|it| async move { (it.rank, self.summarize(it, tone).await) }))
                .buffer_unordered(self.settings.concurrency.max(1))
                .collect()
                .await;
        results.sort_by_key(|(rank, _)| *rank);

        let mut batch = SummaryBatch::default();
        for (_, res) in results {
            match res {
                Ok(rec) => batch.records.push(rec),
                Err(f) => {
                    tracing::warn!(
                        target: "threat_digest::summarize",
                        key = %f.key,
                        title = %f.title,
                        attempts = f.attempts,
                        error = %f.last_error,
                        "item dropped: no valid summary"
                    );
                    batch.failures.push(f);
                }
            }
        }
        batch
    }
}
