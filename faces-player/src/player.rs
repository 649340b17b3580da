//! Play loop
//!
//! Wires one play-through together: a fresh [`PlaySession`], the image
//! observer consuming the driver's photo stream in a background task, and
//! the question loop asking the [`AnswerResolver`] for each answer.

use crate::driver::QuizDriver;
use crate::error::{Error, Result};
use crate::identifier::Identifier;
use crate::observer::{ImageObserver, ObserverStats};
use crate::resolver::{same_label, AnswerResolver, TeachReport};
use crate::session::PlaySession;
use crate::store::HashStore;
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Failed games in a row after which learning mode gives up
const MAX_CONSECUTIVE_FAILURES: u32 = 3;

/// Summary of one play-through
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayReport {
    pub session_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub rounds: usize,
    /// Answers taken from learned names
    pub confirmed: usize,
    pub correct: usize,
    /// Names written to the table
    pub learned: usize,
    /// Rounds left unanswered
    pub skipped: usize,
    pub observer: ObserverStats,
}

impl PlayReport {
    fn new(session: &PlaySession) -> Self {
        Self {
            session_id: session.id(),
            started_at: session.started_at(),
            finished_at: session.started_at(),
            rounds: 0,
            confirmed: 0,
            correct: 0,
            learned: 0,
            skipped: 0,
            observer: ObserverStats::default(),
        }
    }
}

impl fmt::Display for PlayReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let seconds = (self.finished_at - self.started_at).num_milliseconds() as f64 / 1000.0;
        write!(
            f,
            "session {}: {}/{} correct ({} from memory), {} learned, {} skipped, {} photos ({} dropped) in {:.1}s",
            self.session_id,
            self.correct,
            self.rounds,
            self.confirmed,
            self.learned,
            self.skipped,
            self.observer.accepted,
            self.observer.dropped,
            seconds
        )
    }
}

/// Plays quiz games against a persistent hash table
pub struct Player {
    store: Arc<HashStore>,
    identifier: Arc<dyn Identifier>,
    correlation_timeout: Duration,
}

impl Player {
    pub fn new(
        store: Arc<HashStore>,
        identifier: Arc<dyn Identifier>,
        correlation_timeout: Duration,
    ) -> Self {
        Self {
            store,
            identifier,
            correlation_timeout,
        }
    }

    /// Play games until the driver runs out
    ///
    /// Outside learning mode a single game is played and its failure is
    /// returned. In learning mode a failed game is logged and the next one
    /// starts; only `MAX_CONSECUTIVE_FAILURES` failures in a row give up.
    /// Returns the number of completed games.
    pub async fn play_games<D: QuizDriver>(
        &self,
        driver: &mut D,
        learning: bool,
        mut on_report: impl FnMut(&PlayReport),
    ) -> Result<usize> {
        let mut completed = 0;
        let mut failures = 0;

        loop {
            match self.play(driver).await {
                Ok(Some(report)) => {
                    completed += 1;
                    failures = 0;
                    on_report(&report);
                }
                Ok(None) => {
                    info!(completed, "No more games");
                    break;
                }
                Err(e) if !learning => return Err(e),
                Err(e) => {
                    failures += 1;
                    if failures >= MAX_CONSECUTIVE_FAILURES {
                        return Err(e);
                    }
                    warn!(error = %e, failures, "Game failed, starting the next one");
                }
            }

            if !learning {
                break;
            }
        }

        Ok(completed)
    }

    /// Run one play-through from login to the last question
    ///
    /// `None` when the driver has no game to start.
    pub async fn play<D: QuizDriver>(&self, driver: &mut D) -> Result<Option<PlayReport>> {
        let session = Arc::new(PlaySession::new());
        let span = info_span!("play", session = %session.id());

        self.play_session(driver, session).instrument(span).await
    }

    async fn play_session<D: QuizDriver>(
        &self,
        driver: &mut D,
        session: Arc<PlaySession>,
    ) -> Result<Option<PlayReport>> {
        driver.login().await?;
        info!("Successful log in");

        if !driver.start_game().await? {
            return Ok(None);
        }
        let events = driver
            .take_image_events()
            .ok_or_else(|| Error::Driver("game started without an image stream".to_string()))?;
        info!("Started game");

        let observer = Arc::new(ImageObserver::new(
            Arc::clone(&self.identifier),
            Arc::clone(&self.store),
            Arc::clone(&session),
        ));
        let observing = tokio::spawn(observer.run(events).in_current_span());

        let resolver = AnswerResolver::new(
            Arc::clone(&self.store),
            Arc::clone(&session),
            self.correlation_timeout,
        );
        let mut report = PlayReport::new(&session);

        let played = self.play_rounds(driver, &resolver, &mut report).await;
        let finished = driver.finish().await;

        if let Err(e) = played {
            observing.abort();
            if let Err(finish_error) = finished {
                warn!(error = %finish_error, "Driver teardown failed after a failed game");
            }
            return Err(e);
        }
        if let Err(e) = finished {
            observing.abort();
            return Err(e);
        }

        report.observer = observing
            .await
            .map_err(|e| Error::Internal(format!("Image observer failed: {}", e)))?;
        report.finished_at = Utc::now();

        info!(
            rounds = report.rounds,
            correct = report.correct,
            learned = report.learned,
            skipped = report.skipped,
            "Game over"
        );
        Ok(Some(report))
    }

    async fn play_rounds<D: QuizDriver>(
        &self,
        driver: &mut D,
        resolver: &AnswerResolver,
        report: &mut PlayReport,
    ) -> Result<()> {
        while let Some(round) = driver.next_round().await? {
            report.rounds += 1;

            let decision = match resolver.decide_answer(round.index, &round.candidates).await {
                Ok(decision) => Some(decision),
                Err(e) => {
                    warn!(index = round.index, error = %e, "Skipping question");
                    None
                }
            };

            let outcome = driver.answer(decision.as_ref().map(|d| d.choice)).await?;

            let Some(decision) = decision else {
                report.skipped += 1;
                continue;
            };

            if decision.confirmed {
                report.confirmed += 1;
            }
            if same_label(&decision.label, &outcome.true_answer) {
                report.correct += 1;
            }

            match resolver
                .report_outcome(round.index, &outcome.true_answer)
                .await
            {
                Ok(TeachReport::Learned { .. }) => report.learned += 1,
                Ok(other) => debug!(index = round.index, ?other, "Nothing to teach"),
                // Already logged by the resolver; the game goes on
                Err(_) => {}
            }
        }

        Ok(())
    }
}
