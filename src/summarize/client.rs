//! Model clients: the OpenAI chat-completions transport and an offline stand-in.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::config::{AiMode, ModelSettings};

use super::prompt::ModelRequest;

/// One model call. Returns the raw reply text; validation happens upstream.
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn complete(&self, req: &ModelRequest) -> Result<String>;
    fn name(&self) -> &str;
}

pub type DynModelClient = Arc<dyn ModelClient>;

/// Factory: offline mode never touches the network.
pub fn build_client(settings: &ModelSettings) -> Result<DynModelClient> {
    match settings.mode {
        AiMode::Offline => Ok(Arc::new(OfflineClient)),
        AiMode::OpenAi => Ok(Arc::new(OpenAiClient::new(settings)?)),
    }
}

/// OpenAI Chat Completions with `response_format = json_object`.
/// The per-call deadline is enforced by the gateway, not here.
pub struct OpenAiClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
}

impl OpenAiClient {
    pub fn new(settings: &ModelSettings) -> Result<Self> {
        if settings.api_key.is_empty() {
            bail!("openai client needs an API key");
        }
        let http = reqwest::Client::builder()
            .user_agent(concat!("threat-digest/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .context("building reqwest client")?;
        Ok(Self {
            http,
            api_key: settings.api_key.clone(),
            model: settings.model.clone(),
            endpoint: format!("{}/chat/completions", settings.base_url),
        })
    }
}

#[derive(Serialize)]
struct Msg<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Serialize)]
struct ChatReq<'a> {
    model: &'a str,
    messages: Vec<Msg<'a>>,
    temperature: f32,
    max_tokens: u32,
    response_format: ResponseFormat,
}

#[derive(Deserialize)]
struct ChatResp {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMsg,
}

#[derive(Deserialize)]
struct ChoiceMsg {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl ModelClient for OpenAiClient {
    async fn complete(&self, req: &ModelRequest) -> Result<String> {
        let body = ChatReq {
            model: &self.model,
            messages: vec![
                Msg {
                    role: "system",
                    content: &req.system,
                },
                Msg {
                    role: "user",
                    content: &req.user,
                },
            ],
            temperature: req.temperature,
            max_tokens: 700,
            response_format: ResponseFormat { kind: "json_object" },
        };

        let resp = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .context("openai request")?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            let snippet: String = text.chars().take(200).collect();
            bail!("openai returned {status}: {snippet}");
        }

        let parsed: ChatResp = resp.json().await.context("decoding openai response")?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| anyhow!("openai response had no message content"))
    }

    fn name(&self) -> &str {
        "openai"
    }
}

/// Deterministic local replies for dry runs. Always LOW confidence.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineClient;

#[async_trait]
impl ModelClient for OfflineClient {
    async fn complete(&self, req: &ModelRequest) -> Result<String> {
        let ctx = &req.context;
        let basis = if ctx.excerpt.trim().is_empty() {
            ctx.title.as_str()
        } else {
            ctx.excerpt.as_str()
        };
        let gist: String = basis.chars().take(280).collect();
        let reply = json!({
            "canonical_key": ctx.canonical_key,
            "title": ctx.title,
            "summary_text": format!("Offline digest, not reviewed by a model. {gist}"),
            "risk_level": "MEDIUM",
            "confidence": "LOW",
            "glossary": {},
            "source_url": ctx.url,
        });
        Ok(reply.to_string())
    }

    fn name(&self) -> &str {
        "offline"
    }
}
