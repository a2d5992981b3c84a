//! # Run state
//!
//! Ledger of canonical keys surfaced by earlier runs. It is read once at the
//! start of a run and replaced as a whole at the end of a successful one.
//!
//! On-disk shape (pretty JSON, keys sorted):
//!
//! ```json
//! {
//!   "seenKeys": [
//!     { "canonicalKey": { "canonicalUrl": "a.com/x", "titleHash": "…" },
//!       "firstSeenAt": "2024-06-01T12:00:00Z" }
//!   ],
//!   "lastRunAt": "2024-06-01T12:00:00Z"
//! }
//! ```
//!
//! Commit writes `<file>.tmp` in the same directory, fsyncs it and renames it
//! over the target, so a crash leaves either the old or the new ledger.

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::canonical::CanonicalKey;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunState {
    seen: BTreeMap<CanonicalKey, DateTime<Utc>>,
    last_run_at: Option<DateTime<Utc>>,
}

impl RunState {
    pub fn contains(&self, key: &CanonicalKey) -> bool {
        self.seen.contains_key(key)
    }

    /// Insert with `first_seen`; an existing entry keeps its original timestamp.
    pub fn record(&mut self, key: CanonicalKey, first_seen: DateTime<Utc>) -> bool {
        match self.seen.entry(key) {
            std::collections::btree_map::Entry::Occupied(_) => false,
            std::collections::btree_map::Entry::Vacant(v) => {
                v.insert(first_seen);
                true
            }
        }
    }

    pub fn first_seen(&self, key: &CanonicalKey) -> Option<DateTime<Utc>> {
        self.seen.get(key).copied()
    }

    /// Drop keys first seen more than `ttl_days` before `now`. `None` keeps all.
    /// Returns how many were evicted.
    pub fn expire(&mut self, now: DateTime<Utc>, ttl_days: Option<u32>) -> usize {
        let Some(days) = ttl_days else {
            return 0;
        };
        // A horizon before chrono's minimum date cannot evict anything.
        let Some(horizon) = Duration::try_days(i64::from(days)).and_then(|d| now.checked_sub_signed(d))
        else {
            return 0;
        };
        let before = self.seen.len();
        self.seen.retain(|_, first_seen| *first_seen >= horizon);
        before - self.seen.len()
    }

    pub fn mark_run(&mut self, at: DateTime<Utc>) {
        self.last_run_at = Some(at);
    }

    pub fn last_run_at(&self) -> Option<DateTime<Utc>> {
        self.last_run_at
    }

    pub fn keys(&self) -> impl Iterator<Item = &CanonicalKey> {
        self.seen.keys()
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

// ---- persisted form ----

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StateFile {
    #[serde(default)]
    seen_keys: Vec<SeenEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_run_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SeenEntry {
    canonical_key: CanonicalKey,
    first_seen_at: DateTime<Utc>,
}

impl From<&RunState> for StateFile {
    fn from(s: &RunState) -> Self {
        Self {
            seen_keys: s
                .seen
                .iter()
                .map(|(k, ts)| SeenEntry {
                    canonical_key: k.clone(),
                    first_seen_at: *ts,
                })
                .collect(),
            last_run_at: s.last_run_at,
        }
    }
}

impl From<StateFile> for RunState {
    fn from(f: StateFile) -> Self {
        let mut s = RunState {
            seen: BTreeMap::new(),
            last_run_at: f.last_run_at,
        };
        for e in f.seen_keys {
            // duplicates in a hand-edited file: keep the earliest sighting
            let slot = s.seen.entry(e.canonical_key).or_insert(e.first_seen_at);
            if e.first_seen_at < *slot {
                *slot = e.first_seen_at;
            }
        }
        s
    }
}

/// Persistence seam for the ledger.
pub trait StateStore: Send + Sync {
    /// Never fails: unreadable state degrades to empty with a warning.
    fn load(&self) -> RunState;
    /// All-or-nothing replace of the stored ledger.
    fn commit(&self, state: &RunState) -> Result<()>;
}

/// JSON file ledger.
///
/// If the last `load` could not read the file (and could not set a copy of it
/// aside), `commit` refuses to replace it so an unreadable ledger is never
/// swapped for a smaller one.
#[derive(Debug)]
pub struct FileStateStore {
    path: PathBuf,
    unreadable: AtomicBool,
}

impl FileStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            unreadable: AtomicBool::new(false),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "state.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn corrupt_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "state.json".into());
        name.push(".corrupt");
        self.path.with_file_name(name)
    }

    fn try_load(&self) -> io::Result<RunState> {
        let s = match fs::read_to_string(&self.path) {
            Ok(s) => s,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(RunState::default()),
            Err(e) => return Err(e),
        };
        if s.trim().is_empty() {
            return Ok(RunState::default());
        }
        let file: StateFile =
            serde_json::from_str(&s).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        Ok(file.into())
    }

    fn write_atomic(&self, bytes: &[u8]) -> io::Result<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        let tmp = self.tmp_path();
        let res = (|| -> io::Result<()> {
            let mut f = fs::File::create(&tmp)?;
            f.write_all(bytes)?;
            f.sync_all()?;
            fs::rename(&tmp, &self.path)
        })();
        if res.is_err() {
            let _ = fs::remove_file(&tmp); // best-effort
        }
        res
    }
}

impl StateStore for FileStateStore {
    fn load(&self) -> RunState {
        match self.try_load() {
            Ok(s) => {
                self.unreadable.store(false, Ordering::SeqCst);
                tracing::debug!(target: "threat_digest::state", path = %self.path.display(), keys = s.len(), "state loaded");
                s
            }
            Err(e) => {
                tracing::warn!(
                    target: "threat_digest::state",
                    error = %e,
                    path = %self.path.display(),
                    "state unreadable; starting from empty ledger"
                );
                // keep the bad file around; the next commit would overwrite it
                let preserved = e.kind() == io::ErrorKind::InvalidData
                    && match fs::copy(&self.path, self.corrupt_path()) {
                        Ok(_) => true,
                        Err(copy_err) => {
                            tracing::warn!(target: "threat_digest::state", error = %copy_err, "could not preserve corrupt state file");
                            false
                        }
                    };
                self.unreadable.store(!preserved, Ordering::SeqCst);
                RunState::default()
            }
        }
    }

    fn commit(&self, state: &RunState) -> Result<()> {
        if self.unreadable.load(Ordering::SeqCst) {
            bail!(
                "state at {} could not be read at load; refusing to overwrite it",
                self.path.display()
            );
        }
        let json = serde_json::to_vec_pretty(&StateFile::from(state)).context("serializing run state")?;
        self.write_atomic(&json)
            .with_context(|| format!("writing run state to {}", self.path.display()))?;
        tracing::debug!(target: "threat_digest::state", path = %self.path.display(), keys = state.len(), "state committed");
        Ok(())
    }
}
