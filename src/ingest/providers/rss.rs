use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use quick_xml::de::from_str;
use serde::Deserialize;

use crate::ingest::types::{RawItem, SourceProvider};
use crate::ingest::{normalize_text, parse_timestamp};

const USER_AGENT: &str = "threat-digest/0.1 (+rss)";

// ---- RSS 2.0 ----

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}
#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}
#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    guid: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
}

// ---- Atom ----

#[derive(Debug, Deserialize)]
struct AtomFeed {
    #[serde(rename = "entry", default)]
    entry: Vec<AtomEntry>,
}
#[derive(Debug, Deserialize)]
struct AtomEntry {
    title: Option<AtomText>,
    #[serde(default)]
    link: Vec<AtomLink>,
    published: Option<String>,
    updated: Option<String>,
    summary: Option<AtomText>,
    content: Option<AtomText>,
}
#[derive(Debug, Deserialize)]
struct AtomText {
    #[serde(rename = "$text", default)]
    value: String,
}
#[derive(Debug, Deserialize)]
struct AtomLink {
    #[serde(rename = "@href")]
    href: Option<String>,
    #[serde(rename = "@rel")]
    rel: Option<String>,
}

/// RSS 2.0 / Atom provider for one configured feed.
pub struct RssProvider {
    source_id: String,
    mode: Mode,
}

enum Mode {
    Fixture(String),
    File(PathBuf),
    Http { url: String, client: reqwest::Client },
}

impl RssProvider {
    pub fn from_fixture(source_id: &str, xml: &str) -> Self {
        Self {
            source_id: source_id.to_ascii_lowercase(),
            mode: Mode::Fixture(xml.to_string()),
        }
    }

    pub fn from_file(source_id: &str, path: impl Into<PathBuf>) -> Self {
        Self {
            source_id: source_id.to_ascii_lowercase(),
            mode: Mode::File(path.into()),
        }
    }

    pub fn from_url(source_id: &str, url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(20))
            .build()
            .context("building feed http client")?;
        Ok(Self {
            source_id: source_id.to_ascii_lowercase(),
            mode: Mode::Http {
                url: url.to_string(),
                client,
            },
        })
    }

    /// Parse RSS first, then Atom.
    pub fn parse_items_from_str(&self, s: &str) -> Result<Vec<RawItem>> {
        let xml_clean = scrub_html_entities_for_xml(s);
        if let Ok(rss) = from_str::<Rss>(&xml_clean) {
            return Ok(self.map_rss(rss));
        }
        let atom: AtomFeed = from_str(&xml_clean)
            .with_context(|| format!("parsing feed xml for {}", self.source_id))?;
        Ok(self.map_atom(atom))
    }

    fn map_rss(&self, rss: Rss) -> Vec<RawItem> {
        let mut out = Vec::with_capacity(rss.channel.item.len());
        for it in rss.channel.item {
            let title = normalize_text(it.title.as_deref().unwrap_or_default());
            let url = it.link.or(it.guid).unwrap_or_default().trim().to_string();
            if title.is_empty() && url.is_empty() {
                continue;
            }
            out.push(RawItem {
                url,
                title,
                published_at: it.pub_date.as_deref().and_then(parse_timestamp),
                source_id: self.source_id.clone(),
                raw_body_excerpt: normalize_text(it.description.as_deref().unwrap_or_default()),
            });
        }
        out
    }

    fn map_atom(&self, feed: AtomFeed) -> Vec<RawItem> {
        let mut out = Vec::with_capacity(feed.entry.len());
        for e in feed.entry {
            let title = normalize_text(e.title.as_ref().map(|t| t.value.as_str()).unwrap_or_default());
            let url = e
                .link
                .iter()
                .find(|l| matches!(l.rel.as_deref(), None | Some("alternate")))
                .or_else(|| e.link.first())
                .and_then(|l| l.href.clone())
                .unwrap_or_default();
            if title.is_empty() && url.is_empty() {
                continue;
            }
            let body = e.summary.or(e.content).map(|t| t.value).unwrap_or_default();
            out.push(RawItem {
                url: url.trim().to_string(),
                title,
                published_at: e
                    .published
                    .as_deref()
                    .or(e.updated.as_deref())
                    .and_then(parse_timestamp),
                source_id: self.source_id.clone(),
                raw_body_excerpt: normalize_text(&body),
            });
        }
        out
    }
}

#[async_trait]
impl SourceProvider for RssProvider {
    async fn fetch_latest(&self) -> Result<Vec<RawItem>> {
        match &self.mode {
            Mode::Fixture(s) => self.parse_items_from_str(s),
            Mode::File(path) => {
                let s = tokio::fs::read_to_string(path)
                    .await
                    .with_context(|| format!("reading feed file {}", path.display()))?;
                self.parse_items_from_str(&s)
            }
            Mode::Http { url, client } => {
                let resp = client
                    .get(url.as_str())
                    .send()
                    .await
                    .with_context(|| format!("GET {url}"))?;
                if !resp.status().is_success() {
                    return Err(anyhow!("GET {url} returned {}", resp.status()));
                }
                let body = resp.text().await.context("feed http .text()")?;
                self.parse_items_from_str(&body)
            }
        }
    }

    fn name(&self) -> &str {
        &self.source_id
    }
}

fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
        .replace("&hellip;", "...")
}
