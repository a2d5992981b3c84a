//! Run-level error taxonomy.
//!
//! Only these escape `Pipeline::run`. Feed, item and store failures below the
//! run level are absorbed and logged where they happen.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DigestError {
    /// Unreadable or invalid configuration. Raised before any item is touched.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("missing credential: environment variable {0} is not set")]
    MissingCredential(&'static str),

    /// Items reached the model but not a single summary validated.
    #[error("all {attempted} selected items failed summarization")]
    AllItemsFailed { attempted: usize },
}

impl DigestError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// True for errors raised before the run started (nothing fetched, nothing sent).
    pub fn is_fatal_startup(&self) -> bool {
        matches!(self, Self::Config(_) | Self::MissingCredential(_))
    }
}
