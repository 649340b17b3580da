//! Persistent hash -> name table
//!
//! The backing file is a JSON object whose keys are image hashes and whose
//! values are `null` (unresolved) or the learned name. Every operation does
//! a full load -> (mutate -> store) cycle against the file; nothing is cached
//! between calls.
//!
//! All cycles run under one async mutex. The observer and the resolver both
//! mutate the table from interleaved tasks, and a suspension between the
//! load and the store of one cycle would otherwise lose the other's update.

use crate::error::{Error, Result};
use crate::types::{HashTable, ImageHash, NameEntry};
use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Result of teaching a name
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TeachOutcome {
    /// Entry went from unresolved to resolved
    Learned,
    /// Entry was already resolved; the existing name is kept
    AlreadyResolved(String),
}

/// Entry counts for reporting
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub total: usize,
    pub resolved: usize,
    pub unresolved: usize,
}

/// Single-file hash table with first-write-wins names
///
/// Cycles are serialized per `HashStore`, not per file. Share one store
/// (behind an `Arc`) per data file; two stores on the same path only
/// guarantee that every write lands whole, not that both updates survive.
#[derive(Debug)]
pub struct HashStore {
    path: PathBuf,
    cycle: Mutex<()>,
}

impl HashStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cycle: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the hash has ever been recorded
    pub async fn has(&self, hash: &ImageHash) -> bool {
        let _cycle = self.cycle.lock().await;
        self.load().await.contains_key(hash)
    }

    /// Entry for a hash; `HashNotFound` if it was never recorded
    pub async fn lookup(&self, hash: &ImageHash) -> Result<NameEntry> {
        let _cycle = self.cycle.lock().await;
        self.load()
            .await
            .get(hash)
            .cloned()
            .ok_or_else(|| Error::HashNotFound(hash.clone()))
    }

    /// Insert as unresolved if absent
    ///
    /// Returns `true` when a new entry was written. Never touches an existing
    /// entry, resolved or not.
    pub async fn record_seen(&self, hash: &ImageHash) -> Result<bool> {
        let _cycle = self.cycle.lock().await;
        let mut table = self.load().await;

        if table.contains_key(hash) {
            debug!(hash = %hash, "Hash already known");
            return Ok(false);
        }

        table.insert(hash.clone(), NameEntry::Unresolved);
        self.store(&table).await?;

        debug!(hash = %hash, total = table.len(), "Recorded new hash");
        Ok(true)
    }

    /// Resolve an unresolved entry to `name`
    ///
    /// An unknown hash is an error and leaves the table untouched. A resolved
    /// entry is never overwritten.
    pub async fn record_name(&self, hash: &ImageHash, name: &str) -> Result<TeachOutcome> {
        let _cycle = self.cycle.lock().await;
        let mut table = self.load().await;

        match table.get(hash) {
            None => return Err(Error::UnknownHashOnTeach(hash.clone())),
            Some(NameEntry::Resolved(existing)) => {
                debug!(hash = %hash, existing = %existing, "Name already learned");
                return Ok(TeachOutcome::AlreadyResolved(existing.clone()));
            }
            Some(NameEntry::Unresolved) => {}
        }

        table.insert(hash.clone(), NameEntry::Resolved(name.to_string()));
        self.store(&table).await?;

        info!(hash = %hash, name = %name, "Learned name");
        Ok(TeachOutcome::Learned)
    }

    /// Current table contents
    pub async fn snapshot(&self) -> HashTable {
        let _cycle = self.cycle.lock().await;
        self.load().await
    }

    pub async fn stats(&self) -> StoreStats {
        let table = self.snapshot().await;
        let resolved = table.values().filter(|e| e.is_resolved()).count();

        StoreStats {
            total: table.len(),
            resolved,
            unresolved: table.len() - resolved,
        }
    }

    /// Read the table; a missing file is a first run, an unreadable one is
    /// reported and treated as empty so one bad run never blocks the next
    async fn load(&self) -> HashTable {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return HashTable::new(),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Hash table unreadable, starting empty");
                return HashTable::new();
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(table) => table,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Hash table corrupt, starting empty");
                HashTable::new()
            }
        }
    }

    /// Write through a sibling temp file so readers never see a torn table
    async fn store(&self, table: &HashTable) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let json = serde_json::to_vec(table)?;

        let mut staging = OsString::from(self.path.as_os_str());
        staging.push(format!(".{}.tmp", Uuid::new_v4().simple()));
        let staging = PathBuf::from(staging);

        let written = match tokio::fs::write(&staging, json).await {
            Ok(()) => tokio::fs::rename(&staging, &self.path).await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            if let Err(cleanup) = tokio::fs::remove_file(&staging).await {
                debug!(staging = %staging.display(), error = %cleanup, "Staging file not removed");
            }
            return Err(e.into());
        }
        Ok(())
    }
}
