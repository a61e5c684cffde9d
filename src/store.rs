//! Persisted roster and message log.
//!
//! Both live in one JSON document `{ "members": [...], "log": [...] }`,
//! rewritten atomically (temp file then rename) after every change.
//!
//! Roster changes are written before they become visible; a failed write
//! leaves the roster exactly as it was. Log appends become visible at once
//! and are written on a blocking thread from a snapshot, outside the store
//! lock. Every change bumps a version number, and a snapshot older than the
//! one already on disk is skipped, so writes finishing out of order never
//! lose entries.

use crate::error::{RelayError, RelayResult};
use crate::message_log::{LogEntry, MessageLog};
use crate::roster::{Member, Roster};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Document {
    #[serde(default)]
    members: Roster,
    #[serde(default)]
    log: MessageLog,
}

struct State {
    doc: Document,
    version: u64,
}

pub struct Store {
    path: PathBuf,
    state: Mutex<State>,
    /// Version of the document on disk; held for the duration of a write
    written: Arc<Mutex<u64>>,
}

impl Store {
    /// Load the document at `path`. A missing file is an empty roster.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let doc = match std::fs::read(&path) {
            Ok(bytes) => serde_json::from_slice::<Document>(&bytes)
                .context(format!("Failed to parse store at {}", path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No store at {}, starting empty", path.display());
                Document::default()
            }
            Err(e) => {
                return Err(e).context(format!("Failed to read store at {}", path.display()))
            }
        };

        info!(
            "Loaded {} members and {} log entries from {}",
            doc.members.len(),
            doc.log.len(),
            path.display()
        );

        Ok(Self {
            path,
            state: Mutex::new(State { doc, version: 0 }),
            written: Arc::new(Mutex::new(0)),
        })
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add the bootstrap super-admin if the roster is empty.
    ///
    /// Returns whether a member was added.
    pub fn seed(&self, member: Member) -> RelayResult<bool> {
        self.commit(|doc| {
            if !doc.members.is_empty() {
                return Ok(false);
            }
            doc.members.add(member)?;
            Ok(true)
        })
    }

    pub fn add_member(&self, member: Member) -> RelayResult<()> {
        self.commit(|doc| doc.members.add(member))
    }

    /// Remove the member matching `key` on behalf of `actor`.
    pub fn remove_member(&self, actor: &Member, key: &str) -> RelayResult<Member> {
        self.commit(|doc| doc.members.remove(actor, key))
    }

    pub fn find(&self, key: &str) -> Option<Member> {
        self.lock().doc.members.find(key).cloned()
    }

    /// Look up a member by exact (normalized) identity.
    pub fn get(&self, identity: &str) -> Option<Member> {
        self.lock().doc.members.get(identity).cloned()
    }

    /// Snapshot of the roster in insertion order.
    pub fn members(&self) -> Vec<Member> {
        self.lock().doc.members.iter().cloned().collect()
    }

    pub fn member_count(&self) -> usize {
        self.lock().doc.members.len()
    }

    /// Record `entry` and write the document in the background.
    ///
    /// The entry is visible to queries immediately. If the write fails the
    /// entry stays in memory and goes to disk with the next successful write.
    /// Must be called from within a tokio runtime.
    pub fn append_log(&self, entry: LogEntry) -> JoinHandle<RelayResult<()>> {
        let (snapshot, version) = {
            let mut state = self.lock();
            state.doc.log.append(entry);
            state.version += 1;
            (state.doc.clone(), state.version)
        };

        let path = self.path.clone();
        let written = self.written.clone();
        tokio::task::spawn_blocking(move || persist(&path, &written, &snapshot, version))
    }

    pub fn count_since(&self, sender: Option<&str>, since: DateTime<Utc>) -> usize {
        self.lock().doc.log.count_since(sender, since)
    }

    pub fn last_post(&self, sender: Option<&str>) -> Option<DateTime<Utc>> {
        self.lock().doc.log.last_post(sender)
    }

    /// Apply `change` to a copy of the document, persist the copy, and only
    /// then make it current.
    fn commit<T>(&self, change: impl FnOnce(&mut Document) -> RelayResult<T>) -> RelayResult<T> {
        let mut state = self.lock();
        let mut draft = state.doc.clone();
        let out = change(&mut draft)?;

        let version = state.version + 1;
        persist(&self.path, &self.written, &draft, version)?;

        state.doc = draft;
        state.version = version;
        Ok(out)
    }

    /// Block writers so a test can observe what happens while a write is slow.
    #[cfg(test)]
    pub(crate) fn hold_writes(&self) -> MutexGuard<'_, u64> {
        self.written.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Write `doc` as `version` unless a newer version is already on disk.
fn persist(path: &Path, written: &Mutex<u64>, doc: &Document, version: u64) -> RelayResult<()> {
    let mut on_disk = written.lock().unwrap_or_else(PoisonError::into_inner);
    if *on_disk >= version {
        debug!("Skipping store version {}, {} already written", version, *on_disk);
        return Ok(());
    }

    write_document(path, doc).map_err(|e| {
        warn!("Failed to persist store to {}: {:#}", path.display(), e);
        RelayError::Persistence(format!("{:#}", e))
    })?;

    *on_disk = version;
    Ok(())
}

fn write_document(path: &Path, doc: &Document) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).context(format!("Failed to create {}", parent.display()))?;
    }

    let bytes = serde_json::to_vec_pretty(doc).context("Failed to serialize store")?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, bytes).context(format!("Failed to write {}", tmp.display()))?;
    std::fs::rename(&tmp, path).context(format!("Failed to replace {}", path.display()))?;
    Ok(())
}
