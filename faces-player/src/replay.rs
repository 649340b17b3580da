//! File-backed quiz driver
//!
//! Replays a recorded quiz from a directory holding `manifest.json` and the
//! photo files it references:
//!
//! ```json
//! {
//!   "rounds": [
//!     { "image": "0.jpg", "content_type": "image/jpeg",
//!       "candidates": ["Ann", "Bea", "Cid"], "answer": "Bea" }
//!   ]
//! }
//! ```
//!
//! Photos are pushed on the image stream from a background task, the way a
//! browser's response interception would deliver them, optionally delayed
//! and in reverse order to exercise late arrivals.

use crate::driver::QuizDriver;
use crate::error::{Error, Result};
use crate::types::{ImageObserved, Round, RoundOutcome};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

pub const MANIFEST_FILE: &str = "manifest.json";

const IMAGE_CHANNEL_CAPACITY: usize = 16;

/// One recorded question
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayRound {
    /// Photo file, relative to the manifest
    pub image: PathBuf,
    pub content_type: String,
    pub candidates: Vec<String>,
    pub answer: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReplayManifest {
    pub rounds: Vec<ReplayRound>,
}

impl ReplayManifest {
    pub async fn load(dir: &Path) -> Result<Self> {
        let bytes = tokio::fs::read(dir.join(MANIFEST_FILE)).await?;
        let manifest: ReplayManifest = serde_json::from_slice(&bytes)?;
        Ok(manifest)
    }

    pub async fn save(&self, dir: &Path) -> Result<()> {
        tokio::fs::create_dir_all(dir).await?;
        tokio::fs::write(dir.join(MANIFEST_FILE), serde_json::to_vec_pretty(self)?).await?;
        Ok(())
    }
}

/// Delivery timing and length of a replay
#[derive(Debug, Clone, Copy)]
pub struct ReplayOptions {
    /// Pause before each photo is delivered
    pub image_delay: Duration,
    /// Deliver the last question's photo first
    pub reverse_delivery: bool,
    /// Games offered before the driver reports it is exhausted
    pub rounds_repeat: u32,
}

impl Default for ReplayOptions {
    fn default() -> Self {
        Self {
            image_delay: Duration::ZERO,
            reverse_delivery: false,
            rounds_repeat: 1,
        }
    }
}

pub struct ReplayDriver {
    dir: PathBuf,
    manifest: ReplayManifest,
    options: ReplayOptions,
    cursor: usize,
    games_started: u32,
    events: Option<mpsc::Receiver<ImageObserved>>,
    feeder: Option<JoinHandle<()>>,
    answers: Vec<Option<usize>>,
}

impl ReplayDriver {
    pub async fn open(dir: impl Into<PathBuf>, options: ReplayOptions) -> Result<Self> {
        let dir = dir.into();
        let manifest = ReplayManifest::load(&dir).await?;

        if manifest.rounds.is_empty() {
            return Err(Error::Driver(format!(
                "{} has no rounds",
                dir.join(MANIFEST_FILE).display()
            )));
        }

        Ok(Self {
            dir,
            manifest,
            options,
            cursor: 0,
            games_started: 0,
            events: None,
            feeder: None,
            answers: Vec::new(),
        })
    }

    pub fn round_count(&self) -> usize {
        self.manifest.rounds.len()
    }

    /// Choices submitted during the current game
    pub fn answers(&self) -> &[Option<usize>] {
        &self.answers
    }

    fn current(&self) -> Result<&ReplayRound> {
        self.cursor
            .checked_sub(1)
            .and_then(|i| self.manifest.rounds.get(i))
            .ok_or_else(|| Error::Driver("answer submitted before any question".to_string()))
    }

    fn stop_feeder(&mut self) {
        if let Some(feeder) = self.feeder.take() {
            feeder.abort();
        }
        self.events = None;
    }
}

#[async_trait]
impl QuizDriver for ReplayDriver {
    async fn login(&mut self) -> Result<()> {
        info!(dir = %self.dir.display(), rounds = self.round_count(), "Replaying recorded quiz");
        Ok(())
    }

    async fn start_game(&mut self) -> Result<bool> {
        self.stop_feeder();
        self.cursor = 0;
        self.answers.clear();

        if self.games_started >= self.options.rounds_repeat {
            info!(games = self.games_started, "Recorded quiz exhausted");
            self.cursor = self.manifest.rounds.len();
            return Ok(false);
        }
        self.games_started += 1;

        let mut photos = Vec::with_capacity(self.manifest.rounds.len());
        for (index, round) in self.manifest.rounds.iter().enumerate() {
            let bytes = tokio::fs::read(self.dir.join(&round.image)).await?;
            photos.push(ImageObserved {
                index: index as u32,
                bytes,
                content_type: round.content_type.clone(),
            });
        }
        if self.options.reverse_delivery {
            photos.reverse();
        }

        let (tx, rx) = mpsc::channel(IMAGE_CHANNEL_CAPACITY);
        let delay = self.options.image_delay;
        self.feeder = Some(tokio::spawn(async move {
            for photo in photos {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                debug!(index = photo.index, "Delivering photo");
                if tx.send(photo).await.is_err() {
                    break;
                }
            }
        }));
        self.events = Some(rx);

        Ok(true)
    }

    fn take_image_events(&mut self) -> Option<mpsc::Receiver<ImageObserved>> {
        self.events.take()
    }

    async fn next_round(&mut self) -> Result<Option<Round>> {
        let Some(round) = self.manifest.rounds.get(self.cursor) else {
            return Ok(None);
        };

        let next = Round {
            index: self.cursor as u32,
            candidates: round.candidates.clone(),
        };
        self.cursor += 1;
        Ok(Some(next))
    }

    async fn answer(&mut self, choice: Option<usize>) -> Result<RoundOutcome> {
        let true_answer = self.current()?.answer.clone();
        self.answers.push(choice);
        Ok(RoundOutcome { true_answer })
    }

    async fn finish(&mut self) -> Result<()> {
        self.stop_feeder();
        Ok(())
    }
}

impl Drop for ReplayDriver {
    fn drop(&mut self) {
        self.stop_feeder();
    }
}
