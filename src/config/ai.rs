// src/config/ai.rs
//! Model access settings, read from the environment only.

use crate::errors::DigestError;

pub const ENV_API_KEY: &str = "OPENAI_API_KEY";
pub const ENV_MODEL: &str = "OPENAI_MODEL";
pub const ENV_BASE_URL: &str = "OPENAI_BASE_URL";
/// `openai` (default) or `offline`.
pub const ENV_AI_MODE: &str = "DIGEST_AI_MODE";

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AiMode {
    OpenAi,
    /// No network; summaries are synthesized locally with LOW confidence.
    Offline,
}

#[derive(Clone)]
pub struct ModelSettings {
    pub mode: AiMode,
    pub api_key: String,
    pub model: String,
    pub base_url: String,
}

impl std::fmt::Debug for ModelSettings {
    // Never print the key; its length is enough for diagnostics.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelSettings")
            .field("mode", &self.mode)
            .field("key_len", &self.api_key.len())
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl ModelSettings {
    pub fn from_env() -> Result<Self, DigestError> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// A missing credential is fatal unless the run is offline.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, DigestError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |k: &str| lookup(k).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let mode = match non_empty(ENV_AI_MODE).map(|m| m.to_ascii_lowercase()).as_deref() {
            None | Some("openai") => AiMode::OpenAi,
            Some("offline") => AiMode::Offline,
            Some(other) => {
                return Err(DigestError::config(format!(
                    "{ENV_AI_MODE} must be `openai` or `offline`, got `{other}`"
                )))
            }
        };

        let api_key = match (mode, non_empty(ENV_API_KEY)) {
            (_, Some(k)) => k,
            (AiMode::Offline, None) => String::new(),
            (AiMode::OpenAi, None) => return Err(DigestError::MissingCredential(ENV_API_KEY)),
        };

        Ok(Self {
            mode,
            api_key,
            model: non_empty(ENV_MODEL).unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            base_url: non_empty(ENV_BASE_URL)
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
        })
    }
}
