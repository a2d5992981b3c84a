//! Prompt assembly. Tone changes one instruction line and the sampling
//! temperature; the schema block is the same text in every mode.

use serde::Serialize;

use crate::config::ToneMode;
use crate::rank::RankedItem;

use super::schema::SchemaViolation;

/// Longest excerpt sent to the model.
const EXCERPT_PROMPT_CHARS: usize = 1200;

const SYSTEM: &str = "You summarise security news for a non-specialist audience. \
Reply with one JSON object and nothing else: no markdown, no code fences, no commentary.";

const SCHEMA_BLOCK: &str = r#"Return exactly these fields and no others:
{
  "canonical_key": "<copy the canonical_key given below, unchanged>",
  "title": "<short headline, plain language>",
  "summary_text": "<2-4 sentences: what happened, who is affected, what to do>",
  "risk_level": "LOW | MEDIUM | HIGH | CRITICAL",
  "confidence": "LOW | MEDIUM | HIGH",
  "glossary": { "<technical term used above>": "<one-line plain explanation>" },
  "source_url": "<the item's URL, absolute http(s)>"
}
Enum values are uppercase and must match one of the listed options exactly.
Use an empty object for glossary when no term needs explaining.
If the excerpt is too thin to judge impact, say so in summary_text and set confidence to LOW."#;

const TONE_SPICY: &str =
    "Tone: punchy and a little irreverent, but never at the expense of accuracy.";
const TONE_CLEAN: &str = "Tone: neutral, professional and restrained.";

/// What the model sees about one item. Mock clients read it to build replies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemContext {
    pub canonical_key: String,
    pub title: String,
    pub source_id: String,
    pub url: String,
    pub published_at: String,
    pub excerpt: String,
}

impl ItemContext {
    pub fn from_ranked(item: &RankedItem) -> Self {
        let excerpt: String = item
            .item
            .raw_body_excerpt
            .chars()
            .take(EXCERPT_PROMPT_CHARS)
            .collect();
        Self {
            canonical_key: item.key.to_string(),
            title: item.item.title.clone(),
            source_id: item.item.source_id.clone(),
            url: item.item.url.clone(),
            published_at: item.published.to_rfc3339(),
            excerpt,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelRequest {
    pub system: String,
    pub user: String,
    pub temperature: f32,
    pub context: ItemContext,
    /// 1-based attempt number.
    pub attempt: u32,
}

pub fn schema_block() -> &'static str {
    SCHEMA_BLOCK
}

pub fn tone_instruction(tone: ToneMode) -> &'static str {
    match tone {
        ToneMode::Spicy => TONE_SPICY,
        ToneMode::Clean => TONE_CLEAN,
    }
}

pub fn temperature(tone: ToneMode) -> f32 {
    match tone {
        ToneMode::Spicy => 0.3,
        ToneMode::Clean => 0.2,
    }
}

/// First-attempt request for `item`.
pub fn build_request(item: &RankedItem, tone: ToneMode) -> ModelRequest {
    let ctx = ItemContext::from_ranked(item);
    let user = format!(
        "{tone}\n\n{schema}\n\ncanonical_key: {key}\ntitle: {title}\nsource: {source}\nurl: {url}\npublished: {published}\nexcerpt:\n{excerpt}",
        tone = tone_instruction(tone),
        schema = SCHEMA_BLOCK,
        key = ctx.canonical_key,
        title = ctx.title,
        source = ctx.source_id,
        url = ctx.url,
        published = ctx.published_at,
        excerpt = ctx.excerpt,
    );
    ModelRequest {
        system: SYSTEM.to_string(),
        user,
        temperature: temperature(tone),
        context: ctx,
        attempt: 1,
    }
}

/// Retry after a rejected reply: same request plus the exact reason.
pub fn corrective(base: &ModelRequest, violation: &SchemaViolation, attempt: u32) -> ModelRequest {
    let mut next = base.clone();
    next.user = format!(
        "{}\n\nYour previous reply was rejected: {violation}.\nReturn the corrected JSON object only.",
        base.user
    );
    next.attempt = attempt;
    next
}

/// Retry after a timeout or transport error: the request is resent as is.
pub fn resend(base: &ModelRequest, attempt: u32) -> ModelRequest {
    let mut next = base.clone();
    next.attempt = attempt;
    next
}
