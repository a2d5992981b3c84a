// tests/providers.rs
use threat_digest::config::{FeedConfig, FeedFormat};
use threat_digest::ingest::providers::{self, JsonFileProvider, RssProvider};
use threat_digest::ingest::types::SourceProvider;

#[tokio::test]
async fn rss_fixture_maps_items() {
    let p = RssProvider::from_file("CISA", "tests/fixtures/cisa_rss.xml");
    let items = p.fetch_latest().await.unwrap();
    assert_eq!(items.len(), 3);
    assert_eq!(items[0].source_id, "cisa");
    assert!(items[0].url.contains("utm_source=rss&utm_medium=feed"));
    assert!(items[0].raw_body_excerpt.starts_with("CISA has added CVE-2024-3400"));
    assert!(!items[1].raw_body_excerpt.contains("&nbsp;"));
    assert!(items.iter().all(|i| i.published_at.is_some()));
}

#[tokio::test]
async fn atom_fixture_prefers_alternate_link() {
    let p = RssProvider::from_file("vendor", "tests/fixtures/vendor_atom.xml");
    let items = p.fetch_latest().await.unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].url, "https://blog.vendor.test/2024/06/foovpn-zero-day/");
    assert_eq!(items[0].title, "Zero-day in FooVPN exploited in the wild");
    // falls back to <updated>
    assert!(items[1].published_at.is_some());
    assert_eq!(items[1].raw_body_excerpt, "What to expect next week.");
}

#[tokio::test]
async fn json_fixture_accepts_aliases_and_skips_blank_rows() {
    let p = JsonFileProvider::new("aggregator", "tests/fixtures/aggregator.json");
    let items = p.fetch_latest().await.unwrap();
    assert_eq!(items.len(), 3);
    assert_eq!(items[1].raw_body_excerpt, "LockBit affiliate claims the attack.");
    assert!(items[1].published_at.is_some());
    assert!(items[2].published_at.is_none());
}

#[tokio::test]
async fn missing_file_is_an_error_not_a_panic() {
    let p = RssProvider::from_file("gone", "tests/fixtures/nope.xml");
    assert!(p.fetch_latest().await.is_err());
}

#[test]
fn from_config_builds_in_order_and_rejects_unusable_feeds() {
    let feeds = vec![
        FeedConfig {
            id: "local".into(),
            url: None,
            path: Some("tests/fixtures/aggregator.json".into()),
            format: FeedFormat::Json,
        },
        FeedConfig {
            id: "cisa".into(),
            url: Some("https://www.cisa.gov/cybersecurity-advisories/all.xml".into()),
            path: None,
            format: FeedFormat::Rss,
        },
    ];
    let built = providers::from_config(&feeds).unwrap();
    let names: Vec<_> = built.iter().map(|p| p.name().to_string()).collect();
    assert_eq!(names, vec!["local", "cisa"]);

    let bad = vec![FeedConfig {
        id: "api".into(),
        url: Some("https://x.test/items.json".into()),
        path: None,
        format: FeedFormat::Json,
    }];
    assert!(providers::from_config(&bad).is_err());
}
