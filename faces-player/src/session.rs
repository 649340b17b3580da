//! Play session state: photos seen so far, keyed by question index
//!
//! A [`PlaySession`] lives for one play-through and is shared as
//! `Arc<PlaySession>` between the observer (writer) and the question loop
//! (reader). Arrivals wake waiters through a [`Notify`], and every wait is
//! bounded by `tokio::time::timeout`, so a question whose photo never
//! arrives fails with `CorrelationTimeout` instead of hanging.

use crate::error::{Error, Result};
use crate::types::ImageHash;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::{Notify, RwLock};
use tracing::{debug, warn};
use uuid::Uuid;

/// One play-through worth of index -> hash bindings
pub struct PlaySession {
    id: Uuid,
    started_at: DateTime<Utc>,
    seen: RwLock<HashMap<u32, ImageHash>>,
    arrived: Notify,
}

impl PlaySession {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            seen: RwLock::new(HashMap::new()),
            arrived: Notify::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Bind a question index to its photo's hash and wake waiters
    ///
    /// Drivers deliver each index once; a repeated delivery overwrites.
    pub async fn record(&self, index: u32, hash: ImageHash) {
        let previous = self.seen.write().await.insert(index, hash.clone());

        match previous {
            Some(prev) if prev != hash => {
                warn!(index, previous = %prev, hash = %hash, "Question index delivered twice with different photos");
            }
            _ => debug!(index, hash = %hash, "Photo bound to question"),
        }

        self.arrived.notify_waiters();
    }

    /// Hash for an index if it has already arrived
    pub async fn try_get(&self, index: u32) -> Option<ImageHash> {
        self.seen.read().await.get(&index).cloned()
    }

    /// Number of indices bound so far
    pub async fn len(&self) -> usize {
        self.seen.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Wait until `index` has a hash, for at most `timeout`
    pub async fn await_index(&self, index: u32, timeout: Duration) -> Result<ImageHash> {
        let wait = async {
            loop {
                // Register before checking so an arrival in between is not missed
                let notified = self.arrived.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();

                if let Some(hash) = self.try_get(index).await {
                    return hash;
                }

                notified.await;
            }
        };

        tokio::time::timeout(timeout, wait)
            .await
            .map_err(|_| Error::CorrelationTimeout { index, timeout })
    }
}

impl Default for PlaySession {
    fn default() -> Self {
        Self::new()
    }
}
