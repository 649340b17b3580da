//! Quiz driver interface
//!
//! The browser automation (navigation, login form, selectors, clicks and
//! response interception) lives behind this trait. The player only sees a
//! stream of captured photos, the questions and their outcomes.

use crate::error::Result;
use crate::types::{ImageObserved, Round, RoundOutcome};
use async_trait::async_trait;
use tokio::sync::mpsc;

#[async_trait]
pub trait QuizDriver: Send {
    /// Reach the quiz and authenticate
    async fn login(&mut self) -> Result<()>;

    /// Launch a new game; photos start flowing afterwards
    ///
    /// Returns `false` when the driver has no more games to offer.
    async fn start_game(&mut self) -> Result<bool>;

    /// Photo stream of the current game
    ///
    /// Yields `Some` once per game. The stream ends when the driver drops
    /// its sender, at the latest in [`QuizDriver::finish`].
    fn take_image_events(&mut self) -> Option<mpsc::Receiver<ImageObserved>>;

    /// Wait for the next question; `None` when the game is over
    async fn next_round(&mut self) -> Result<Option<Round>>;

    /// Submit the chosen candidate (`None` lets the question lapse) and
    /// return the revealed answer
    async fn answer(&mut self, choice: Option<usize>) -> Result<RoundOutcome>;

    /// Tear the game down and close the photo stream
    async fn finish(&mut self) -> Result<()>;
}
