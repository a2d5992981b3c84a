// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod canonical;
pub mod config;
pub mod dedup;
pub mod errors;
pub mod ingest;
pub mod pipeline;
pub mod rank;
pub mod recency;
pub mod state;
pub mod summarize;
pub mod telemetry;

// ---- Re-exports for stable public API ----
pub use crate::canonical::{canonicalize, CanonicalKey};
pub use crate::config::{DigestConfig, ModelSettings, ToneMode};
pub use crate::errors::DigestError;
pub use crate::ingest::types::{RawItem, SourceProvider};
pub use crate::pipeline::{Pipeline, RunReport, RunStats};
pub use crate::rank::{RankedItem, Ranker};
pub use crate::state::{FileStateStore, RunState, StateStore};
pub use crate::summarize::{ModelClient, SummarizerGateway, SummaryRecord};
