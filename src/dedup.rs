//! Same-run and cross-run duplicate removal.
//!
//! Runs before ranking, so "first" means feed input order. One pass, one
//! `HashSet` of keys already taken in this run.

use std::collections::HashSet;

use crate::canonical::CanonicalKey;
use crate::state::RunState;

/// Anything that carries a canonical key.
pub trait Keyed {
    fn key(&self) -> &CanonicalKey;
}

impl Keyed for CanonicalKey {
    fn key(&self) -> &CanonicalKey {
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DedupStats {
    /// Already surfaced by an earlier run.
    pub seen_before: usize,
    /// Repeats of an earlier item in this run.
    pub same_run: usize,
}

impl DedupStats {
    pub fn total(&self) -> usize {
        self.seen_before + self.same_run
    }
}

/// Keep items whose key is neither in `state` nor taken by an earlier item.
/// Does not touch `state`; the pipeline records survivors after a successful run.
pub fn dedup<T: Keyed>(items: Vec<T>, state: &RunState) -> (Vec<T>, DedupStats) {
    let mut taken: HashSet<CanonicalKey> = HashSet::with_capacity(items.len());
    let mut keep = Vec::with_capacity(items.len());
    let mut stats = DedupStats::default();

    for it in items {
        if state.contains(it.key()) {
            stats.seen_before += 1;
            continue;
        }
        if !taken.insert(it.key().clone()) {
            stats.same_run += 1;
            continue;
        }
        keep.push(it);
    }

    (keep, stats)
}
