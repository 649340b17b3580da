//! Image observation pipeline
//!
//! Consumes the driver's stream of captured photos. Each event is filtered
//! by content type, hashed on the blocking pool, recorded in the hash table
//! and finally bound to its question index in the session. The store insert
//! happens before the session binding, so once a question can see a hash,
//! the table already knows it.
//!
//! Any failure drops the event: no table or session mutation happens.

use crate::error::{Error, Result};
use crate::identifier::{compute_hash, Identifier, ImageKind};
use crate::session::PlaySession;
use crate::store::HashStore;
use crate::types::{ImageHash, ImageObserved};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, warn};

/// Counters reported when the event stream closes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ObserverStats {
    /// Events hashed and bound to a question
    pub accepted: usize,
    /// Events skipped because they were not images
    pub filtered: usize,
    /// Events that failed hashing or persistence
    pub dropped: usize,
}

impl ObserverStats {
    fn tally(&mut self, done: std::result::Result<(u32, Result<ImageHash>), JoinError>) {
        match done {
            Ok((_, Ok(_))) => self.accepted += 1,
            Ok((index, Err(Error::UnsupportedContentType(content_type)))) => {
                debug!(index, content_type = %content_type, "Ignoring non-image response");
                self.filtered += 1;
            }
            Ok((index, Err(e))) => {
                warn!(index, error = %e, "Dropping image event");
                self.dropped += 1;
            }
            Err(e) => {
                warn!(error = %e, "Image observation task failed");
                self.dropped += 1;
            }
        }
    }
}

/// Feeds captured photos into the hash table and the session
pub struct ImageObserver {
    identifier: Arc<dyn Identifier>,
    store: Arc<HashStore>,
    session: Arc<PlaySession>,
}

impl ImageObserver {
    pub fn new(
        identifier: Arc<dyn Identifier>,
        store: Arc<HashStore>,
        session: Arc<PlaySession>,
    ) -> Self {
        Self {
            identifier,
            store,
            session,
        }
    }

    /// Process a single event
    pub async fn observe(&self, event: ImageObserved) -> Result<ImageHash> {
        let ImageObserved {
            index,
            bytes,
            content_type,
        } = event;

        let kind = ImageKind::classify(&content_type, &bytes)
            .ok_or(Error::UnsupportedContentType(content_type))?;

        let hash = compute_hash(Arc::clone(&self.identifier), bytes, kind).await?;
        self.store.record_seen(&hash).await?;
        self.session.record(index, hash.clone()).await;

        debug!(
            index,
            hash = %hash,
            algorithm = self.identifier.algorithm(),
            "Observed photo"
        );
        Ok(hash)
    }

    /// Drain the event stream until the driver closes it
    ///
    /// Events are processed concurrently; in-flight events are awaited
    /// before returning.
    pub async fn run(self: Arc<Self>, mut events: mpsc::Receiver<ImageObserved>) -> ObserverStats {
        let mut tasks = JoinSet::new();
        let mut stats = ObserverStats::default();

        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => {
                        let observer = Arc::clone(&self);
                        tasks.spawn(async move {
                            let index = event.index;
                            (index, observer.observe(event).await)
                        });
                    }
                    None => break,
                },
                Some(done) = tasks.join_next(), if !tasks.is_empty() => stats.tally(done),
            }
        }

        while let Some(done) = tasks.join_next().await {
            stats.tally(done);
        }

        debug!(?stats, "Image stream closed");
        stats
    }
}
