//! threat-digest binary.
//! Loads config + credentials, pulls feeds, runs the selection pipeline and
//! prints the digest as JSON (stdout, or `--out <path>` / `DIGEST_OUTPUT_PATH`).
//!
//! Exit codes: 0 ok, 1 run failed, 2 bad configuration or missing credential.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;

use threat_digest::config::{DigestConfig, ModelSettings, ToneMode};
use threat_digest::ingest::providers;
use threat_digest::pipeline::{Pipeline, RunReport, RunStats};
use threat_digest::summarize::{build_client, SummaryRecord};
use threat_digest::{telemetry, DigestError};

const ENV_OUTPUT_PATH: &str = "DIGEST_OUTPUT_PATH";

#[derive(Serialize)]
struct DigestOutput<'a> {
    generated_at: DateTime<Utc>,
    tone_mode: ToneMode,
    items: &'a [SummaryRecord],
    dropped: Vec<DroppedItem<'a>>,
    stats: RunStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    state_commit_error: Option<&'a str>,
}

#[derive(Serialize)]
struct DroppedItem<'a> {
    key: String,
    title: &'a str,
    attempts: u32,
    reason: String,
}

fn output_path() -> Option<PathBuf> {
    let mut args = std::env::args().skip(1);
    while let Some(a) = args.next() {
        if a == "--out" {
            return args.next().map(PathBuf::from);
        }
        if let Some(p) = a.strip_prefix("--out=") {
            return Some(PathBuf::from(p));
        }
    }
    std::env::var(ENV_OUTPUT_PATH)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(PathBuf::from)
}

fn render(report: &RunReport, tone: ToneMode, now: DateTime<Utc>) -> Result<String> {
    let out = DigestOutput {
        generated_at: now,
        tone_mode: tone,
        items: &report.records,
        dropped: report
            .failures
            .iter()
            .map(|f| DroppedItem {
                key: f.key.to_string(),
                title: &f.title,
                attempts: f.attempts,
                reason: f.last_error.to_string(),
            })
            .collect(),
        stats: report.stats,
        state_commit_error: report.commit_error.as_deref(),
    };
    serde_json::to_string_pretty(&out).context("serializing digest")
}

async fn run() -> Result<()> {
    // Both checks happen before any network traffic.
    let cfg = DigestConfig::load_default()?;
    let settings = ModelSettings::from_env()?;
    tracing::info!(
        target: "threat_digest",
        feeds = cfg.feeds.len(),
        tone = ?cfg.tone_mode,
        model = %settings.model,
        mode = ?settings.mode,
        "starting run"
    );

    let metrics = telemetry::install_recorder()?;

    let feeds = providers::from_config(&cfg.feeds).map_err(|e| DigestError::config(format!("{e:#}")))?;
    let client = build_client(&settings).map_err(|e| DigestError::config(format!("{e:#}")))?;
    let tone = cfg.tone_mode;
    let pipeline = Pipeline::from_config(cfg, client)?;

    let now = Utc::now();
    let report = pipeline.run_providers(&feeds, now).await?;
    let json = render(&report, tone, now)?;

    match output_path() {
        Some(path) => {
            if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
                std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
            }
            std::fs::write(&path, json).with_context(|| format!("writing {}", path.display()))?;
            tracing::info!(target: "threat_digest", path = %path.display(), items = report.records.len(), "digest written");
        }
        None => println!("{json}"),
    }

    if let Ok(p) = std::env::var(telemetry::ENV_METRICS_PATH) {
        if let Err(e) = telemetry::write_snapshot(&metrics, &PathBuf::from(p)) {
            tracing::warn!(target: "threat_digest", error = ?e, "metrics snapshot not written");
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    telemetry::init_tracing();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let fatal_startup = e
                .downcast_ref::<DigestError>()
                .is_some_and(DigestError::is_fatal_startup);
            tracing::error!(target: "threat_digest", error = %format!("{e:#}"), "run failed");
            eprintln!("threat-digest: {e:#}");
            if fatal_startup {
                ExitCode::from(2)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}
