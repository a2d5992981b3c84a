//! Summary schema and its validator.
//!
//! The model must return exactly these seven fields:
//!
//! | field           | type                         |
//! |-----------------|------------------------------|
//! | `canonical_key` | string, echoed verbatim      |
//! | `title`         | non-empty string             |
//! | `summary_text`  | non-empty string             |
//! | `risk_level`    | `LOW` `MEDIUM` `HIGH` `CRITICAL` |
//! | `confidence`    | `LOW` `MEDIUM` `HIGH`        |
//! | `glossary`      | object of string → string    |
//! | `source_url`    | absolute http(s) URL         |
//!
//! Nothing is coerced: lowercase enums, extra keys and blank strings are
//! violations and go back to the model as a corrective hint.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::canonical::CanonicalKey;

pub const FIELD_NAMES: [&str; 7] = [
    "canonical_key",
    "title",
    "summary_text",
    "risk_level",
    "confidence",
    "glossary",
    "source_url",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub const ALLOWED: &'static str = "LOW, MEDIUM, HIGH, CRITICAL";

    fn parse_exact(s: &str) -> Option<Self> {
        match s {
            "LOW" => Some(Self::Low),
            "MEDIUM" => Some(Self::Medium),
            "HIGH" => Some(Self::High),
            "CRITICAL" => Some(Self::Critical),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl Confidence {
    pub const ALLOWED: &'static str = "LOW, MEDIUM, HIGH";

    fn parse_exact(s: &str) -> Option<Self> {
        match s {
            "LOW" => Some(Self::Low),
            "MEDIUM" => Some(Self::Medium),
            "HIGH" => Some(Self::High),
            _ => None,
        }
    }
}

/// A validated summary, ready for the renderer. Only built by the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryRecord {
    pub canonical_key: CanonicalKey,
    pub title: String,
    pub summary_text: String,
    pub risk_level: RiskLevel,
    pub confidence: Confidence,
    pub glossary: BTreeMap<String, String>,
    pub source_url: String,
}

/// Model-provided content that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryPayload {
    pub title: String,
    pub summary_text: String,
    pub risk_level: RiskLevel,
    pub confidence: Confidence,
    pub glossary: BTreeMap<String, String>,
    pub source_url: String,
}

impl SummaryPayload {
    pub fn into_record(self, key: CanonicalKey) -> SummaryRecord {
        SummaryRecord {
            canonical_key: key,
            title: self.title,
            summary_text: self.summary_text,
            risk_level: self.risk_level,
            confidence: self.confidence,
            glossary: self.glossary,
            source_url: self.source_url,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaViolation {
    #[error("output is not valid JSON: {0}")]
    NotJson(String),
    #[error("output must be a single JSON object")]
    NotAnObject,
    #[error("missing field `{0}`")]
    MissingField(&'static str),
    #[error("unexpected field `{0}`; return only the listed fields")]
    UnexpectedField(String),
    #[error("field `{field}` must be {expected}")]
    WrongType {
        field: &'static str,
        expected: &'static str,
    },
    #[error("field `{0}` must not be empty")]
    EmptyField(&'static str),
    #[error("field `{field}` has value `{value}`; allowed: {allowed}")]
    InvalidEnum {
        field: &'static str,
        value: String,
        allowed: &'static str,
    },
    #[error("field `source_url` must be an absolute http(s) URL, got `{0}`")]
    InvalidUrl(String),
    #[error("glossary entry `{0}` must map a non-empty term to a non-empty string")]
    InvalidGlossaryEntry(String),
    #[error("field `canonical_key` must be `{expected}`, got `{got}`")]
    KeyMismatch { expected: String, got: String },
}

/// Parse + validate raw model output against the schema for `expected_key`.
pub fn validate(raw: &str, expected_key: &CanonicalKey) -> Result<SummaryPayload, SchemaViolation> {
    let value: Value =
        serde_json::from_str(raw.trim()).map_err(|e| SchemaViolation::NotJson(e.to_string()))?;
    validate_value(&value, expected_key)
}

pub fn validate_value(
    value: &Value,
    expected_key: &CanonicalKey,
) -> Result<SummaryPayload, SchemaViolation> {
    let obj = value.as_object().ok_or(SchemaViolation::NotAnObject)?;

    for field in FIELD_NAMES {
        if !obj.contains_key(field) {
            return Err(SchemaViolation::MissingField(field));
        }
    }
    if let Some(extra) = obj.keys().find(|k| !FIELD_NAMES.contains(&k.as_str())) {
        return Err(SchemaViolation::UnexpectedField(extra.clone()));
    }

    let echoed = string_field(obj, "canonical_key")?;
    let expected = expected_key.to_string();
    if echoed != expected {
        return Err(SchemaViolation::KeyMismatch {
            expected,
            got: echoed.to_string(),
        });
    }

    let title = non_empty(obj, "title")?;
    let summary_text = non_empty(obj, "summary_text")?;

    let risk_raw = string_field(obj, "risk_level")?;
    let risk_level = RiskLevel::parse_exact(risk_raw).ok_or_else(|| SchemaViolation::InvalidEnum {
        field: "risk_level",
        value: risk_raw.to_string(),
        allowed: RiskLevel::ALLOWED,
    })?;

    let conf_raw = string_field(obj, "confidence")?;
    let confidence =
        Confidence::parse_exact(conf_raw).ok_or_else(|| SchemaViolation::InvalidEnum {
            field: "confidence",
            value: conf_raw.to_string(),
            allowed: Confidence::ALLOWED,
        })?;

    let glossary = glossary(obj)?;

    let source_url = non_empty(obj, "source_url")?;
    match url::Url::parse(&source_url) {
        Ok(u) if matches!(u.scheme(), "http" | "https") && u.host_str().is_some() => {}
        _ => return Err(SchemaViolation::InvalidUrl(source_url)),
    }

    Ok(SummaryPayload {
        title,
        summary_text,
        risk_level,
        confidence,
        glossary,
        source_url,
    })
}

fn string_field<'a>(
    obj: &'a Map<String, Value>,
    field: &'static str,
) -> Result<&'a str, SchemaViolation> {
    match obj.get(field) {
        Some(Value::String(s)) => Ok(s.as_str()),
        Some(_) => Err(SchemaViolation::WrongType {
            field,
            expected: "a string",
        }),
        None => Err(SchemaViolation::MissingField(field)),
    }
}

fn non_empty(obj: &Map<String, Value>, field: &'static str) -> Result<String, SchemaViolation> {
    let s = string_field(obj, field)?.trim();
    if s.is_empty() {
        return Err(SchemaViolation::EmptyField(field));
    }
    Ok(s.to_string())
}

fn glossary(obj: &Map<String, Value>) -> Result<BTreeMap<String, String>, SchemaViolation> {
    let map = match obj.get("glossary") {
        Some(Value::Object(m)) => m,
        Some(_) => {
            return Err(SchemaViolation::WrongType {
                field: "glossary",
                expected: "an object mapping term to definition",
            })
        }
        None => return Err(SchemaViolation::MissingField("glossary")),
    };
    let mut out = BTreeMap::new();
    for (term, def) in map {
        let def = match def {
            Value::String(s) if !s.trim().is_empty() => s.trim(),
            _ => return Err(SchemaViolation::InvalidGlossaryEntry(term.clone())),
        };
        if term.trim().is_empty() {
            return Err(SchemaViolation::InvalidGlossaryEntry(term.clone()));
        }
        out.insert(term.trim().to_string(), def.to_string());
    }
    Ok(out)
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Critical => "CRITICAL",
        };
        f.write_str(s)
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
        };
        f.write_str(s)
    }
}
