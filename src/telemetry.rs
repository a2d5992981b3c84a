// src/telemetry.rs
//! Tracing setup and the metric catalogue.

use std::path::Path;

use anyhow::{Context, Result};
use metrics::{describe_counter, describe_gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub const ENV_LOG_FORMAT: &str = "DIGEST_LOG_FORMAT";
pub const ENV_METRICS_PATH: &str = "DIGEST_METRICS_PATH";
pub const DEFAULT_FILTER: &str = "threat_digest=info,warn";

/// One-time metrics registration (so series carry HELP text in the dump).
pub fn ensure_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("digest_items_fetched_total", "Raw items returned by all providers.");
        describe_counter!("digest_items_recent_total", "Items inside the recency window.");
        describe_counter!(
            "digest_dedup_dropped_total",
            "Items dropped as duplicates (same run or earlier runs)."
        );
        describe_counter!("digest_items_ranked_total", "Items selected after ranking and cap.");
        describe_counter!("digest_summaries_total", "Summaries that passed validation.");
        describe_counter!(
            "digest_summary_failures_total",
            "Items dropped after exhausting summarization attempts."
        );
        describe_counter!("digest_model_attempts_total", "Model calls, including retries.");
        describe_counter!("digest_provider_errors_total", "Provider fetch/parse errors.");
        describe_gauge!("digest_state_keys", "Keys in the run ledger after commit.");
        describe_gauge!("digest_last_run_ts", "Unix ts of the last completed run.");
    });
}

/// Install the global subscriber. `DIGEST_LOG_FORMAT=json` switches to JSON lines.
/// Logs go to stderr so stdout stays clean for the digest itself.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let json = std::env::var(ENV_LOG_FORMAT)
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    let res = if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
    } else {
        registry
            .with(fmt::layer().compact().with_writer(std::io::stderr))
            .try_init()
    };
    // already installed (tests, embedding): keep the existing one
    let _ = res;
}

/// Install the Prometheus recorder for this process.
pub fn install_recorder() -> Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .context("prometheus: install recorder")?;
    ensure_described();
    Ok(handle)
}

/// Dump the current exposition text to `path` (tmp file + rename).
pub fn write_snapshot(handle: &PrometheusHandle, path: &Path) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }
    let tmp = path.with_extension("prom.tmp");
    std::fs::write(&tmp, handle.render()).with_context(|| format!("writing {}", tmp.display()))?;
    std::fs::rename(&tmp, path).with_context(|| format!("renaming into {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics::counter;

    #[test]
    fn snapshot_contains_recorded_series() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        metrics::with_local_recorder(&recorder, || {
            ensure_described();
            counter!("digest_summaries_total").increment(3);
        });

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out/digest.prom");
        write_snapshot(&handle, &path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("digest_summaries_total 3"));
    }
}
