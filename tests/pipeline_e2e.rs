// tests/pipeline_e2e.rs
mod common;

use std::sync::Arc;

use common::{now, raw, Reply, ScriptedClient};
use threat_digest::config::DigestConfig;
use threat_digest::ingest::providers::{JsonFileProvider, RssProvider};
use threat_digest::ingest::types::SourceProvider;
use threat_digest::state::{FileStateStore, StateStore};
use threat_digest::{canonicalize, DigestError, Pipeline};

fn cfg_with_state(dir: &tempfile::TempDir) -> DigestConfig {
    DigestConfig {
        state_path: dir.path().join("state/seen.json"),
        ..DigestConfig::default()
    }
}

#[tokio::test]
async fn second_run_over_same_input_emits_nothing_new() {
    let dir = tempfile::tempdir().unwrap();
    let client = Arc::new(ScriptedClient::new());
    let pipeline = Pipeline::from_config(cfg_with_state(&dir), client.clone()).unwrap();

    let input = vec![
        raw("Ransomware hits port", "https://a.test/port", "blog", 2),
        raw("Zero-day in FooVPN", "https://b.test/foo?utm_source=x", "blog", 3),
        raw("Zero-day in FooVPN", "https://www.b.test/foo/", "mirror", 1),
    ];

    let first = pipeline.run(input.clone(), now()).await.unwrap();
    assert_eq!(first.records.len(), 2);
    assert_eq!(first.stats.dedup_same_run, 1);
    assert!(first.commit_error.is_none());

    let second = pipeline.run(input, now()).await.unwrap();
    assert!(second.records.is_empty());
    assert_eq!(second.stats.dedup_seen_before, 3);
    assert_eq!(client.total_calls(), 2);
}

#[tokio::test]
async fn cap_applies_after_ranking() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = cfg_with_state(&dir);
    cfg.max_items_per_run = 2;
    let pipeline = Pipeline::from_config(cfg, Arc::new(ScriptedClient::new())).unwrap();

    // feed order puts the strongest items last
    let input = vec![
        raw("Conference recap", "https://a.test/1", "blog", 1),
        raw("Office party photos", "https://a.test/2", "blog", 1),
        raw("CISA warns of CVE-2024-3400 exploited", "https://a.test/3", "cisa", 5),
        raw("Zero-day ransomware campaign", "https://a.test/4", "blog", 4),
    ];
    let report = pipeline.run(input, now()).await.unwrap();
    let titles: Vec<_> = report.records.iter().map(|r| r.title.as_str()).collect();
    assert_eq!(
        titles,
        vec!["CISA warns of CVE-2024-3400 exploited", "Zero-day ransomware campaign"]
    );
    assert_eq!(report.stats.ranked, 2);
}

#[tokio::test]
async fn failed_items_stay_eligible_for_next_run() {
    let dir = tempfile::tempdir().unwrap();
    let client = Arc::new(ScriptedClient::new().script("Flaky story", vec![Reply::Raw("nope".into()); 3]));
    let pipeline = Pipeline::from_config(cfg_with_state(&dir), client).unwrap();

    let input = vec![
        raw("Good story", "https://a.test/good", "blog", 1),
        raw("Flaky story", "https://a.test/flaky", "blog", 2),
    ];
    let first = pipeline.run(input.clone(), now()).await.unwrap();
    assert_eq!(first.records.len(), 1);
    assert_eq!(first.failures.len(), 1);

    let store = FileStateStore::new(dir.path().join("state/seen.json"));
    let state = store.load();
    assert!(state.contains(&canonicalize(&input[0])));
    assert!(!state.contains(&canonicalize(&input[1])));

    // script exhausted: the flaky item now validates
    let second = pipeline.run(input, now()).await.unwrap();
    let titles: Vec<_> = second.records.iter().map(|r| r.title.as_str()).collect();
    assert_eq!(titles, vec!["Flaky story"]);
}

#[tokio::test]
async fn all_items_failing_is_an_error_and_ledger_is_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let client = Arc::new(ScriptedClient::new().always("Only story", Reply::Fail("500")));
    let pipeline = Pipeline::from_config(cfg_with_state(&dir), client).unwrap();

    let err = pipeline
        .run(vec![raw("Only story", "https://a.test/only", "blog", 1)], now())
        .await
        .unwrap_err();
    assert!(matches!(err, DigestError::AllItemsFailed { attempted: 1 }));
    assert!(!dir.path().join("state/seen.json").exists());
}

#[tokio::test]
async fn empty_input_is_a_quiet_success() {
    let dir = tempfile::tempdir().unwrap();
    let client = Arc::new(ScriptedClient::new());
    let pipeline = Pipeline::from_config(cfg_with_state(&dir), client.clone()).unwrap();

    let report = pipeline
        .run(vec![raw("Ancient", "https://a.test/old", "blog", 500)], now())
        .await
        .unwrap();
    assert!(report.records.is_empty());
    assert_eq!(report.stats.stale, 1);
    assert_eq!(client.total_calls(), 0);

    let state = FileStateStore::new(dir.path().join("state/seen.json")).load();
    assert_eq!(state.last_run_at(), Some(now()));
}

#[tokio::test]
async fn commit_failure_is_reported_not_fatal() {
    let dir = tempfile::tempdir().unwrap();
    // a directory where the ledger file should be cannot be read, so it is not replaced
    let state_path = dir.path().join("seen.json");
    std::fs::create_dir_all(state_path.join("occupied")).unwrap();
    let cfg = DigestConfig {
        state_path,
        ..DigestConfig::default()
    };
    let pipeline = Pipeline::from_config(cfg, Arc::new(ScriptedClient::new())).unwrap();

    let report = pipeline
        .run(vec![raw("Story", "https://a.test/s", "blog", 1)], now())
        .await
        .unwrap();
    assert_eq!(report.records.len(), 1);
    assert!(report.commit_error.as_deref().is_some_and(|e| e.contains("refusing to overwrite")));
    assert!(dir.path().join("seen.json/occupied").is_dir());
}

#[tokio::test]
async fn fixtures_flow_through_providers_and_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    let providers: Vec<Box<dyn SourceProvider>> = vec![
        Box::new(RssProvider::from_file("cisa", "tests/fixtures/cisa_rss.xml")),
        Box::new(RssProvider::from_file("vendor", "tests/fixtures/vendor_atom.xml")),
        Box::new(JsonFileProvider::new("aggregator", "tests/fixtures/aggregator.json")),
        Box::new(RssProvider::from_file("missing", "tests/fixtures/does_not_exist.xml")),
    ];
    let client = Arc::new(ScriptedClient::new());
    let pipeline = Pipeline::from_config(cfg_with_state(&dir), client).unwrap();

    let report = pipeline.run_providers(&providers, now()).await.unwrap();

    // 3 rss + 2 atom + 3 json (the blank row is skipped at parse time)
    assert_eq!(report.stats.fetched, 8);
    // the May 20 advisory and the undated roundup fall out
    assert_eq!(report.stats.stale, 2);
    // the aggregator copy of the KEV alert
    assert_eq!(report.stats.dedup_same_run, 1);

    let first = &report.records[0];
    assert!(first.title.contains("CVE-2024-3400"));
    assert_eq!(
        first.canonical_key.canonical_url,
        "cisa.gov/news-events/alerts/2024/05/31/kev-cve-2024-3400"
    );
}
