// src/config/digest.rs
//! Digest run configuration.
//!
//! Sources, in order of precedence:
//! 1) environment overrides (`DIGEST_*`)
//! 2) TOML file at `$DIGEST_CONFIG_PATH`, else `config/digest.toml`
//! 3) built-in defaults
//!
//! A missing default file is fine (defaults apply). A missing file named by
//! `DIGEST_CONFIG_PATH`, a TOML syntax error, an unknown key or an unparseable
//! override is a fatal config error.

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::DigestError;

pub const ENV_CONFIG_PATH: &str = "DIGEST_CONFIG_PATH";
pub const DEFAULT_CONFIG_PATH: &str = "config/digest.toml";

pub const ENV_MAX_ITEMS: &str = "DIGEST_MAX_ITEMS";
pub const ENV_RECENT_HOURS: &str = "DIGEST_RECENT_HOURS";
pub const ENV_TONE_MODE: &str = "DIGEST_TONE_MODE";
pub const ENV_RETRY_LIMIT: &str = "DIGEST_RETRY_LIMIT";
pub const ENV_CONCURRENCY: &str = "DIGEST_CONCURRENCY";
pub const ENV_STATE_PATH: &str = "DIGEST_STATE_PATH";
pub const ENV_STATE_TTL_DAYS: &str = "DIGEST_STATE_TTL_DAYS";

/// Presentation tone for the generated prose. Never changes the schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToneMode {
    #[default]
    Spicy,
    Clean,
}

impl FromStr for ToneMode {
    type Err = DigestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "spicy" => Ok(Self::Spicy),
            "clean" => Ok(Self::Clean),
            other => Err(DigestError::config(format!(
                "tone mode must be `spicy` or `clean`, got `{other}`"
            ))),
        }
    }
}

/// What the recency filter does with items that carry no usable date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingTimestampPolicy {
    #[default]
    Drop,
    #[serde(alias = "assumeNow")]
    AssumeNow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedFormat {
    #[default]
    Rss,
    Json,
}

/// One feed source. Either `url` (RSS over HTTP) or `path` (local file).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FeedConfig {
    pub id: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default)]
    pub format: FeedFormat,
}

/// Additive ranking weights (W1..W5).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScoreWeights {
    pub cve: f64,
    pub zero_day: f64,
    pub exploit_keyword: f64,
    pub authoritative_source: f64,
    pub recency_decay: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            cve: 3.0,
            zero_day: 3.0,
            exploit_keyword: 2.0,
            authoritative_source: 3.0,
            recency_decay: 2.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct KeywordConfig {
    /// Regex; matched case-insensitively against title + excerpt.
    pub cve_pattern: String,
    /// Substrings, matched case-insensitively.
    pub zero_day: Vec<String>,
    pub exploit: Vec<String>,
}

impl Default for KeywordConfig {
    fn default() -> Self {
        Self {
            cve_pattern: r"\bCVE-\d{4}-\d{4,}\b".to_string(),
            zero_day: ["zero-day", "zero day", "0-day", "0day"]
                .map(String::from)
                .to_vec(),
            exploit: [
                "ransomware",
                "actively exploited",
                "exploited in the wild",
                "under active exploitation",
                "exploited",
            ]
            .map(String::from)
            .to_vec(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DigestConfig {
    pub feeds: Vec<FeedConfig>,
    pub max_items_per_run: usize,
    pub recent_hours: u32,
    pub tone_mode: ToneMode,
    pub on_missing_timestamp: MissingTimestampPolicy,
    pub weights: ScoreWeights,
    pub keywords: KeywordConfig,
    pub authoritative_sources: Vec<String>,
    /// Extra attempts after the first one.
    pub retry_limit: u32,
    pub concurrency: usize,
    pub call_timeout_secs: u64,
    pub state_path: PathBuf,
    /// Seen keys older than this are evicted. `None` keeps them forever.
    pub state_ttl_days: Option<u32>,
}

impl Default for DigestConfig {
    fn default() -> Self {
        Self {
            feeds: Vec::new(),
            max_items_per_run: 15,
            recent_hours: 48,
            tone_mode: ToneMode::Spicy,
            on_missing_timestamp: MissingTimestampPolicy::Drop,
            weights: ScoreWeights::default(),
            keywords: KeywordConfig::default(),
            authoritative_sources: ["cisa", "ncsc", "cert-eu", "us-cert", "jpcert", "bsi"]
                .map(String::from)
                .to_vec(),
            retry_limit: 2,
            concurrency: 4,
            call_timeout_secs: 45,
            state_path: PathBuf::from("state/seen.json"),
            state_ttl_days: None,
        }
    }
}

impl DigestConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, DigestError> {
        toml::from_str(s).map_err(|e| DigestError::config(format!("invalid digest config: {e}")))
    }

    pub fn load_from(path: &Path) -> Result<Self, DigestError> {
        let content = fs::read_to_string(path).map_err(|e| {
            DigestError::config(format!("reading digest config from {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    /// Load using env var + fallbacks, then apply env overrides and validate.
    pub fn load_default() -> Result<Self, DigestError> {
        let lookup = |k: &str| std::env::var(k).ok();
        let mut cfg = match lookup(ENV_CONFIG_PATH) {
            Some(p) => {
                let pb = PathBuf::from(p);
                if !pb.exists() {
                    return Err(DigestError::config(format!(
                        "{ENV_CONFIG_PATH} points to non-existent path {}",
                        pb.display()
                    )));
                }
                Self::load_from(&pb)?
            }
            None => {
                let p = PathBuf::from(DEFAULT_CONFIG_PATH);
                if p.exists() {
                    Self::load_from(&p)?
                } else {
                    tracing::info!(target: "threat_digest::config", "no {DEFAULT_CONFIG_PATH}; using defaults");
                    Self::default()
                }
            }
        };
        cfg.apply_overrides(lookup)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Apply `DIGEST_*` overrides from `lookup`. Unparseable values are fatal.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), DigestError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup(ENV_MAX_ITEMS) {
            self.max_items_per_run = parse_num(ENV_MAX_ITEMS, &v)?;
        }
        if let Some(v) = lookup(ENV_RECENT_HOURS) {
            self.recent_hours = parse_num(ENV_RECENT_HOURS, &v)?;
        }
        if let Some(v) = lookup(ENV_TONE_MODE) {
            self.tone_mode = v.parse()?;
        }
        if let Some(v) = lookup(ENV_RETRY_LIMIT) {
            self.retry_limit = parse_num(ENV_RETRY_LIMIT, &v)?;
        }
        if let Some(v) = lookup(ENV_CONCURRENCY) {
            self.concurrency = parse_num(ENV_CONCURRENCY, &v)?;
        }
        if let Some(v) = lookup(ENV_STATE_PATH) {
            if !v.trim().is_empty() {
                self.state_path = PathBuf::from(v.trim());
            }
        }
        if let Some(v) = lookup(ENV_STATE_TTL_DAYS) {
            let days: u32 = parse_num(ENV_STATE_TTL_DAYS, &v)?;
            // 0 means "never expire"
            self.state_ttl_days = (days > 0).then_some(days);
        }
        Ok(())
    }

    /// Reject values the pipeline can't run with; tidy the harmless ones.
    pub fn validate(&mut self) -> Result<(), DigestError> {
        if self.recent_hours == 0 {
            return Err(DigestError::config("recent_hours must be > 0"));
        }
        if self.concurrency == 0 {
            tracing::warn!(target: "threat_digest::config", "concurrency=0 makes no sense; using 1");
            self.concurrency = 1;
        }
        if self.call_timeout_secs == 0 {
            return Err(DigestError::config("call_timeout_secs must be > 0"));
        }
        regex::RegexBuilder::new(&self.keywords.cve_pattern)
            .case_insensitive(true)
            .build()
            .map_err(|e| DigestError::config(format!("keywords.cve_pattern: {e}")))?;
        for f in &self.feeds {
            if f.id.trim().is_empty() {
                return Err(DigestError::config("feed with empty id"));
            }
            if f.url.is_none() && f.path.is_none() {
                return Err(DigestError::config(format!(
                    "feed `{}` needs either `url` or `path`",
                    f.id
                )));
            }
        }
        self.authoritative_sources = clean_list(std::mem::take(&mut self.authoritative_sources));
        Ok(())
    }
}

fn parse_num<T: FromStr>(name: &str, raw: &str) -> Result<T, DigestError> {
    raw.trim()
        .parse::<T>()
        .map_err(|_| DigestError::config(format!("{name}: cannot parse `{raw}` as a number")))
}

fn clean_list(items: Vec<String>) -> Vec<String> {
    use std::collections::BTreeSet;
    let mut set = BTreeSet::new();
    for it in items {
        let t = it.trim().to_ascii_lowercase();
        if !t.is_empty() {
            set.insert(t);
        }
    }
    set.into_iter().collect()
}
