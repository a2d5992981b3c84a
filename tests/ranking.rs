// tests/ranking.rs
mod common;

use common::{now, raw};
use threat_digest::canonical::canonicalize;
use threat_digest::config::DigestConfig;
use threat_digest::rank::{Candidate, Ranker, Signal};

fn cand(title: &str, url: &str, source: &str, hours_old: i64) -> Candidate {
    let item = raw(title, url, source, hours_old);
    Candidate {
        key: canonicalize(&item),
        published: item.published_at.unwrap(),
        item,
    }
}

fn ranker() -> Ranker {
    Ranker::from_config(&DigestConfig::default()).unwrap()
}

#[test]
fn cve_item_outranks_plain_news_of_same_age() {
    let r = ranker();
    let out = r.rank(
        vec![
            cand("Vendor updates privacy policy", "https://a.test/p", "blog", 6),
            cand("Critical flaw CVE-2024-21762 in FortiOS", "https://a.test/f", "blog", 6),
        ],
        now(),
    );
    assert_eq!(out[0].item.title, "Critical flaw CVE-2024-21762 in FortiOS");
    assert_eq!(out[0].signals, vec![Signal::Cve]);
    assert!(out[0].score > out[1].score);
}

#[test]
fn ranking_is_independent_of_input_order() {
    let r = ranker();
    let items = vec![
        cand("Zero-day in router firmware", "https://a.test/1", "blog", 10),
        cand("Ransomware gang leaks data", "https://a.test/2", "blog", 3),
        cand("NCSC advisory on phishing", "https://a.test/3", "ncsc", 20),
        cand("Weekly roundup", "https://a.test/4", "blog", 1),
        cand("Weekly roundup", "https://a.test/5", "blog", 1),
    ];
    let forward: Vec<_> = r.rank(items.clone(), now()).into_iter().map(|x| x.key).collect();
    let mut reversed = items;
    reversed.reverse();
    let backward: Vec<_> = r.rank(reversed, now()).into_iter().map(|x| x.key).collect();
    assert_eq!(forward, backward);
}

#[test]
fn rank_top_truncates_after_sorting() {
    let r = ranker();
    let items: Vec<_> = (0..10)
        .map(|i| cand(&format!("Story {i}"), &format!("https://a.test/{i}"), "blog", 40 - i))
        .collect();
    let top = r.rank_top(items, now(), 3);
    assert_eq!(top.len(), 3);
    let titles: Vec<_> = top.iter().map(|t| t.item.title.as_str()).collect();
    assert_eq!(titles, vec!["Story 9", "Story 8", "Story 7"]);
    assert_eq!(top.iter().map(|t| t.rank).collect::<Vec<_>>(), vec![0, 1, 2]);
}

#[test]
fn custom_weights_and_sources_are_honoured() {
    let mut cfg = DigestConfig::default();
    cfg.weights.cve = 0.0;
    cfg.weights.authoritative_source = 10.0;
    cfg.authoritative_sources = vec!["jpcert".into()];
    let r = Ranker::from_config(&cfg).unwrap();

    let out = r.rank(
        vec![
            cand("CVE-2024-0001 everywhere", "https://a.test/c", "blog", 1),
            cand("Notice", "https://a.test/j", "JPCERT", 1),
        ],
        now(),
    );
    assert_eq!(out[0].item.source_id, "JPCERT");
}
