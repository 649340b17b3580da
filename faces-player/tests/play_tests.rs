//! End-to-end play-throughs
//!
//! Tests cover:
//! - Learning on the first game, answering from memory on the next
//! - Photos arriving late and out of order
//! - Photos that never arrive (bounded wait, fallback answer)
//! - Persistence of the table across players
//! - Skipped questions, driver teardown and the learning loop

use async_trait::async_trait;
use faces_player::driver::QuizDriver;
use faces_player::identifier::Sha256Identifier;
use faces_player::replay::{ReplayDriver, ReplayManifest, ReplayOptions, ReplayRound};
use faces_player::store::HashStore;
use faces_player::{
    Error, ImageObserved, NameEntry, Player, Result, Round, RoundOutcome,
};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio::sync::mpsc;

/// Test helper: record a quiz where the right answer is always the second candidate
async fn record_quiz(dir: &Path, photos: &[(&str, &str)]) {
    let mut rounds = Vec::new();

    for (i, (bytes, person)) in photos.iter().enumerate() {
        let file = format!("{i}.jpg");
        tokio::fs::write(dir.join(&file), bytes.as_bytes()).await.unwrap();
        rounds.push(ReplayRound {
            image: file.into(),
            content_type: "image/jpeg".to_string(),
            candidates: vec![format!("Not {person}"), person.to_string(), "Someone".to_string()],
            answer: person.to_string(),
        });
    }

    ReplayManifest { rounds }.save(dir).await.unwrap();
}

fn player(store: &Arc<HashStore>, timeout: Duration) -> Player {
    Player::new(Arc::clone(store), Arc::new(Sha256Identifier), timeout)
}

#[tokio::test]
async fn test_learns_then_answers_from_memory() {
    let quiz = TempDir::new().unwrap();
    let data = TempDir::new().unwrap();
    record_quiz(
        quiz.path(),
        &[("jpeg of ann", "Ann"), ("jpeg of bea", "Bea"), ("jpeg of cid", "Cid")],
    )
    .await;

    let store = Arc::new(HashStore::new(data.path().join("data.json")));
    let player = player(&store, Duration::from_secs(2));
    let options = ReplayOptions {
        rounds_repeat: 2,
        ..ReplayOptions::default()
    };
    let mut driver = ReplayDriver::open(quiz.path(), options).await.unwrap();

    let first = player.play(&mut driver).await.unwrap().unwrap();
    assert_eq!(first.rounds, 3);
    assert_eq!(first.confirmed, 0);
    assert_eq!(first.correct, 0);
    assert_eq!(first.learned, 3);
    assert_eq!(first.observer.accepted, 3);
    assert_eq!(driver.answers(), &[Some(0), Some(0), Some(0)]);

    let second = player.play(&mut driver).await.unwrap().unwrap();
    assert_eq!(second.confirmed, 3);
    assert_eq!(second.correct, 3);
    assert_eq!(second.learned, 0);
    assert_ne!(first.session_id, second.session_id);
    assert_eq!(driver.answers(), &[Some(1), Some(1), Some(1)]);

    let stats = store.stats().await;
    assert_eq!(stats.total, 3);
    assert_eq!(stats.resolved, 3);
}

#[tokio::test]
async fn test_late_out_of_order_photos_are_correlated() {
    let quiz = TempDir::new().unwrap();
    let data = TempDir::new().unwrap();
    record_quiz(
        quiz.path(),
        &[("photo 0", "Ann"), ("photo 1", "Bea"), ("photo 2", "Cid")],
    )
    .await;

    let store = Arc::new(HashStore::new(data.path().join("data.json")));
    let options = ReplayOptions {
        image_delay: Duration::from_millis(30),
        reverse_delivery: true,
        ..ReplayOptions::default()
    };
    let mut driver = ReplayDriver::open(quiz.path(), options).await.unwrap();

    let report = player(&store, Duration::from_secs(2))
        .play(&mut driver)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(report.learned, 3);
    assert_eq!(report.skipped, 0);

    let table = store.snapshot().await;
    let mut names: Vec<_> = table.values().filter_map(|e| e.name()).collect();
    names.sort();
    assert_eq!(names, vec!["Ann", "Bea", "Cid"]);
}

#[tokio::test]
async fn test_repeated_photo_is_recognised_within_one_game() {
    let quiz = TempDir::new().unwrap();
    let data = TempDir::new().unwrap();
    record_quiz(
        quiz.path(),
        &[("same face", "Ann"), ("other face", "Bea"), ("same face", "Ann")],
    )
    .await;

    let store = Arc::new(HashStore::new(data.path().join("data.json")));
    let mut driver = ReplayDriver::open(quiz.path(), ReplayOptions::default())
        .await
        .unwrap();

    let report = player(&store, Duration::from_secs(2))
        .play(&mut driver)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(report.learned, 2);
    assert_eq!(report.confirmed, 1);
    assert_eq!(report.correct, 1);
    assert_eq!(store.stats().await.total, 2);
}

#[tokio::test]
async fn test_table_survives_a_new_player() {
    let quiz = TempDir::new().unwrap();
    let data = TempDir::new().unwrap();
    let data_file = data.path().join("data.json");
    record_quiz(quiz.path(), &[("face a", "Ann")]).await;

    {
        let store = Arc::new(HashStore::new(&data_file));
        let mut driver = ReplayDriver::open(quiz.path(), ReplayOptions::default())
            .await
            .unwrap();
        player(&store, Duration::from_secs(2))
            .play(&mut driver)
            .await
            .unwrap()
            .unwrap();
    }

    let content = std::fs::read_to_string(&data_file).unwrap();
    let table: faces_player::HashTable = serde_json::from_str(&content).unwrap();
    assert_eq!(table.len(), 1);
    assert_eq!(
        table.values().next(),
        Some(&NameEntry::Resolved("Ann".to_string()))
    );

    let store = Arc::new(HashStore::new(&data_file));
    let mut driver = ReplayDriver::open(quiz.path(), ReplayOptions::default())
        .await
        .unwrap();
    let report = player(&store, Duration::from_secs(2))
        .play(&mut driver)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(report.correct, 1);
    assert_eq!(report.confirmed, 1);
}

#[tokio::test]
async fn test_non_image_responses_are_ignored() {
    let quiz = TempDir::new().unwrap();
    let data = TempDir::new().unwrap();
    tokio::fs::write(quiz.path().join("page.html"), b"<html></html>")
        .await
        .unwrap();
    ReplayManifest {
        rounds: vec![ReplayRound {
            image: "page.html".into(),
            content_type: "text/html".to_string(),
            candidates: vec!["Ann".to_string(), "Bea".to_string()],
            answer: "Ann".to_string(),
        }],
    }
    .save(quiz.path())
    .await
    .unwrap();

    let store = Arc::new(HashStore::new(data.path().join("data.json")));
    let mut driver = ReplayDriver::open(quiz.path(), ReplayOptions::default())
        .await
        .unwrap();
    let report = player(&store, Duration::from_millis(100))
        .play(&mut driver)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(report.observer.filtered, 1);
    assert_eq!(report.learned, 0);
    // Fallback happens to be right; nothing is remembered
    assert_eq!(report.correct, 1);
    assert!(store.snapshot().await.is_empty());
}

/// Driver with a silent photo stream and scripted questions
///
/// Offers `games` games of the same questions. `next_round` fails during
/// every game listed in `failing_games` (1-based).
struct ScriptedDriver {
    rounds: Vec<Round>,
    games: u32,
    started: u32,
    failing_games: Vec<u32>,
    cursor: usize,
    sender: Option<mpsc::Sender<ImageObserved>>,
    events: Option<mpsc::Receiver<ImageObserved>>,
    answers: Vec<Option<usize>>,
    finish_calls: u32,
}

impl ScriptedDriver {
    fn new(rounds: Vec<Round>) -> Self {
        Self {
            rounds,
            games: 1,
            started: 0,
            failing_games: Vec::new(),
            cursor: 0,
            sender: None,
            events: None,
            answers: Vec::new(),
            finish_calls: 0,
        }
    }

    fn with_games(mut self, games: u32) -> Self {
        self.games = games;
        self
    }

    fn failing_on(mut self, game: u32) -> Self {
        self.failing_games.push(game);
        self
    }
}

fn rounds(count: u32) -> Vec<Round> {
    (0..count)
        .map(|index| Round {
            index,
            candidates: vec!["Ann".to_string(), "Bea".to_string()],
        })
        .collect()
}

#[async_trait]
impl QuizDriver for ScriptedDriver {
    async fn login(&mut self) -> Result<()> {
        Ok(())
    }

    async fn start_game(&mut self) -> Result<bool> {
        if self.started >= self.games {
            return Ok(false);
        }
        self.started += 1;
        self.cursor = 0;
        self.answers.clear();

        let (tx, rx) = mpsc::channel(1);
        self.sender = Some(tx);
        self.events = Some(rx);
        Ok(true)
    }

    fn take_image_events(&mut self) -> Option<mpsc::Receiver<ImageObserved>> {
        self.events.take()
    }

    async fn next_round(&mut self) -> Result<Option<Round>> {
        if self.failing_games.contains(&self.started) {
            return Err(Error::Driver("quiz page went away".to_string()));
        }
        let round = self.rounds.get(self.cursor).cloned();
        self.cursor += 1;
        Ok(round)
    }

    async fn answer(&mut self, choice: Option<usize>) -> Result<RoundOutcome> {
        self.answers.push(choice);
        Ok(RoundOutcome {
            true_answer: "Bea".to_string(),
        })
    }

    async fn finish(&mut self) -> Result<()> {
        self.finish_calls += 1;
        self.sender = None;
        Ok(())
    }
}

#[tokio::test]
async fn test_missing_photos_time_out_instead_of_hanging() {
    let data = TempDir::new().unwrap();
    let store = Arc::new(HashStore::new(data.path().join("data.json")));
    let mut driver = ScriptedDriver::new(rounds(3));

    let start = Instant::now();
    let report = tokio::time::timeout(
        Duration::from_secs(5),
        player(&store, Duration::from_millis(100)).play(&mut driver),
    )
    .await
    .expect("play-through must not hang")
    .unwrap()
    .unwrap();
    let elapsed = start.elapsed();

    assert_eq!(report.rounds, 3);
    assert_eq!(report.skipped, 0);
    assert_eq!(report.correct, 0);
    assert_eq!(report.learned, 0);
    assert!(elapsed >= Duration::from_millis(300));
    assert!(elapsed < Duration::from_secs(2), "took {:?}", elapsed);
    assert!(store.snapshot().await.is_empty());
}

#[tokio::test]
async fn test_question_without_candidates_is_skipped() {
    let data = TempDir::new().unwrap();
    let store = Arc::new(HashStore::new(data.path().join("data.json")));
    let mut driver = ScriptedDriver::new(vec![
        Round {
            index: 0,
            candidates: vec!["Ann".to_string(), "Bea".to_string()],
        },
        Round {
            index: 1,
            candidates: Vec::new(),
        },
    ]);

    let report = player(&store, Duration::from_millis(50))
        .play(&mut driver)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(driver.answers, vec![Some(0), None]);
    assert_eq!(report.rounds, 2);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.correct, 0);
    assert_eq!(driver.finish_calls, 1);
}

#[tokio::test]
async fn test_finish_runs_when_a_game_fails() {
    let data = TempDir::new().unwrap();
    let store = Arc::new(HashStore::new(data.path().join("data.json")));
    let mut driver = ScriptedDriver::new(rounds(1)).failing_on(1);

    let err = player(&store, Duration::from_millis(50))
        .play(&mut driver)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Driver(_)));
    assert_eq!(driver.finish_calls, 1);
}

#[tokio::test]
async fn test_exhausted_driver_yields_no_game() {
    let data = TempDir::new().unwrap();
    let store = Arc::new(HashStore::new(data.path().join("data.json")));
    let mut driver = ScriptedDriver::new(rounds(1)).with_games(0);

    let report = player(&store, Duration::from_millis(50))
        .play(&mut driver)
        .await
        .unwrap();

    assert!(report.is_none());
    assert_eq!(driver.finish_calls, 0);
}

#[tokio::test]
async fn test_learning_ends_when_replay_is_exhausted() {
    let quiz = TempDir::new().unwrap();
    let data = TempDir::new().unwrap();
    record_quiz(quiz.path(), &[("face a", "Ann"), ("face b", "Bea")]).await;

    let store = Arc::new(HashStore::new(data.path().join("data.json")));
    let options = ReplayOptions {
        rounds_repeat: 3,
        ..ReplayOptions::default()
    };
    let mut driver = ReplayDriver::open(quiz.path(), options).await.unwrap();

    let mut reports = Vec::new();
    let completed = tokio::time::timeout(
        Duration::from_secs(10),
        player(&store, Duration::from_secs(2)).play_games(&mut driver, true, |report| {
            reports.push((report.learned, report.correct))
        }),
    )
    .await
    .expect("learning must stop once the quiz is exhausted")
    .unwrap();

    assert_eq!(completed, 3);
    assert_eq!(reports, vec![(2, 0), (0, 2), (0, 2)]);
}

#[tokio::test]
async fn test_learning_continues_after_a_failed_game() {
    let data = TempDir::new().unwrap();
    let store = Arc::new(HashStore::new(data.path().join("data.json")));
    let mut driver = ScriptedDriver::new(rounds(1)).with_games(3).failing_on(1);

    let mut played = 0;
    let completed = player(&store, Duration::from_millis(50))
        .play_games(&mut driver, true, |_| played += 1)
        .await
        .unwrap();

    assert_eq!(completed, 2);
    assert_eq!(played, 2);
    assert_eq!(driver.finish_calls, 3);
}

#[tokio::test]
async fn test_single_game_failure_is_returned_outside_learning() {
    let data = TempDir::new().unwrap();
    let store = Arc::new(HashStore::new(data.path().join("data.json")));
    let mut driver = ScriptedDriver::new(rounds(1)).with_games(3).failing_on(1);

    let result = player(&store, Duration::from_millis(50))
        .play_games(&mut driver, false, |_| {})
        .await;

    assert!(matches!(result, Err(Error::Driver(_))));
    assert_eq!(driver.started, 1);
}

#[tokio::test]
async fn test_learning_gives_up_after_repeated_failures() {
    let data = TempDir::new().unwrap();
    let store = Arc::new(HashStore::new(data.path().join("data.json")));
    let mut driver = ScriptedDriver::new(rounds(1))
        .with_games(10)
        .failing_on(1)
        .failing_on(2)
        .failing_on(3);

    let result = player(&store, Duration::from_millis(50))
        .play_games(&mut driver, true, |_| {})
        .await;

    assert!(matches!(result, Err(Error::Driver(_))));
    assert_eq!(driver.started, 3);
    assert_eq!(driver.finish_calls, 3);
}
