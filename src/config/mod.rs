// src/config/mod.rs
pub mod ai;
pub mod digest;

pub use ai::{AiMode, ModelSettings};
pub use digest::{
    DigestConfig, FeedConfig, FeedFormat, KeywordConfig, MissingTimestampPolicy, ScoreWeights,
    ToneMode,
};
