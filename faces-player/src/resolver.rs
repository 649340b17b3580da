//! Answer resolution on top of the hash table
//!
//! **Policy:**
//! 1. Wait (bounded) for the question's photo hash
//! 2. Look the hash up in the table
//! 3. A learned name that matches a candidate is a confirmed guess
//! 4. Anything else falls back to the first candidate, unconfirmed
//! 5. After the round, only unconfirmed guesses teach the true answer
//!
//! A confirmed name is never rewritten, even when the quiz disagrees with it.

use crate::error::{Error, Result};
use crate::session::PlaySession;
use crate::store::{HashStore, TeachOutcome};
use crate::types::ImageHash;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Candidate picked when the table has nothing usable
const FALLBACK_CHOICE: usize = 0;

/// Answer chosen for one question
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub index: u32,
    /// Position of the chosen candidate in presentation order
    pub choice: usize,
    pub label: String,
    /// Photo hash, `None` when the photo did not arrive in time
    pub hash: Option<ImageHash>,
    /// Whether the choice came from a learned name
    pub confirmed: bool,
}

/// What reporting a round's outcome did to the table
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TeachReport {
    /// Guess came from the table; nothing written
    Confirmed { correct: bool },
    /// True answer written for a previously unresolved photo
    Learned { hash: ImageHash, name: String },
    /// Photo already had a name; it was kept
    AlreadyResolved { hash: ImageHash, existing: String },
    /// Photo never arrived, nothing to attach the answer to
    NoPhoto,
    /// No decision was made for this index
    NoDecision,
}

/// Picks answers and teaches the table
pub struct AnswerResolver {
    store: Arc<HashStore>,
    session: Arc<PlaySession>,
    timeout: Duration,
    pending: Mutex<HashMap<u32, Decision>>,
}

impl AnswerResolver {
    pub fn new(store: Arc<HashStore>, session: Arc<PlaySession>, timeout: Duration) -> Self {
        Self {
            store,
            session,
            timeout,
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Choose a candidate for question `index`
    ///
    /// Fails with `HashNotFound` when the photo's hash is missing from the
    /// table (the round should be skipped) and with `NoCandidates` on an
    /// empty candidate list. A correlation timeout is not an error here: it
    /// yields an unconfirmed fallback.
    pub async fn decide_answer(&self, index: u32, candidates: &[String]) -> Result<Decision> {
        if candidates.is_empty() {
            return Err(Error::NoCandidates(index));
        }

        let hash = match self.session.await_index(index, self.timeout).await {
            Ok(hash) => Some(hash),
            Err(e @ Error::CorrelationTimeout { .. }) => {
                warn!(index, error = %e, "No guess available");
                None
            }
            Err(e) => return Err(e),
        };

        let known_name = match &hash {
            Some(hash) => match self.store.lookup(hash).await {
                Ok(entry) => entry.name().map(str::to_string),
                Err(e) => {
                    error!(index, hash = %hash, error = %e, "Photo hash missing from table, skipping round");
                    return Err(e);
                }
            },
            None => None,
        };

        let matched = known_name
            .as_deref()
            .and_then(|name| candidates.iter().position(|c| same_label(c, name)));

        let (choice, confirmed) = match (matched, &known_name) {
            (Some(choice), _) => (choice, true),
            (None, Some(name)) => {
                warn!(index, name = %name, "Learned name is not among the candidates");
                (FALLBACK_CHOICE, false)
            }
            (None, None) => (FALLBACK_CHOICE, false),
        };

        let decision = Decision {
            index,
            choice,
            label: candidates[choice].clone(),
            hash,
            confirmed,
        };

        debug!(
            index,
            choice,
            label = %decision.label,
            confirmed,
            "Decided answer"
        );

        self.pending.lock().await.insert(index, decision.clone());
        Ok(decision)
    }

    /// Teach-back once the quiz reveals the true answer
    pub async fn report_outcome(&self, index: u32, true_answer: &str) -> Result<TeachReport> {
        let Some(decision) = self.pending.lock().await.remove(&index) else {
            warn!(index, "Outcome reported for a question with no decision");
            return Ok(TeachReport::NoDecision);
        };

        if decision.confirmed {
            let correct = same_label(&decision.label, true_answer);
            if !correct {
                warn!(
                    index,
                    guessed = %decision.label,
                    true_answer = %true_answer,
                    "Quiz disagreed with a learned name, keeping it"
                );
            }
            return Ok(TeachReport::Confirmed { correct });
        }

        let hash = match decision.hash {
            Some(hash) => hash,
            None => match self.session.try_get(index).await {
                Some(hash) => {
                    debug!(index, hash = %hash, "Photo arrived after the guess");
                    hash
                }
                None => return Ok(TeachReport::NoPhoto),
            },
        };

        let name = true_answer.trim();
        match self.store.record_name(&hash, name).await {
            Ok(TeachOutcome::Learned) => {
                info!(index, hash = %hash, name = %name, "Taught new face");
                Ok(TeachReport::Learned {
                    hash,
                    name: name.to_string(),
                })
            }
            Ok(TeachOutcome::AlreadyResolved(existing)) => {
                Ok(TeachReport::AlreadyResolved { hash, existing })
            }
            Err(e) => {
                error!(index, hash = %hash, error = %e, "Teach skipped");
                Err(e)
            }
        }
    }
}

pub(crate) fn same_label(a: &str, b: &str) -> bool {
    a.trim().to_lowercase() == b.trim().to_lowercase()
}
