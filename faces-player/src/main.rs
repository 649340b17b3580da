//! faces-player - Main entry point
//!
//! Plays recorded quiz games against the learned hash table and offers a few
//! maintenance commands for inspecting it.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use faces_common::config::{
    default_config_path, learning_from_env, load_toml_config, HashAlgorithm, QuizCredentials,
    RootFolderInitializer, RootFolderResolver, TomlConfig,
};
use faces_common::logging::init_tracing;
use faces_player::identifier::{identifier_for, ImageKind};
use faces_player::replay::{ReplayDriver, ReplayOptions};
use faces_player::store::HashStore;
use faces_player::{Error, ImageHash, Player};
use tokio::signal;
use tracing::{info, warn};

/// Command-line arguments for faces-player
#[derive(Parser, Debug)]
#[command(name = "faces-player")]
#[command(about = "Answers the guess-the-face quiz from a learned hash table")]
#[command(version)]
struct Args {
    /// Folder holding the hash table (overrides FACES_ROOT_FOLDER and config)
    #[arg(short, long, global = true)]
    root_folder: Option<PathBuf>,

    /// TOML config file (default: ~/.config/faces/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Play a recorded quiz
    Replay {
        /// Directory containing manifest.json and the photos
        dir: PathBuf,

        /// Delay before each photo is delivered
        #[arg(long, default_value_t = 0)]
        image_delay_ms: u64,

        /// Deliver photos last-question-first
        #[arg(long)]
        reverse: bool,

        /// Times the recorded quiz is played before it is exhausted
        #[arg(long, default_value_t = 1)]
        rounds_repeat: u32,

        /// Keep playing to grow the table
        #[arg(long)]
        learning: bool,
    },
    /// Print the identity hash of an image file
    Hash {
        file: PathBuf,

        #[arg(long)]
        algorithm: Option<HashAlgorithm>,
    },
    /// Count learned and unresolved faces
    Stats,
    /// Show what the table knows about a hash
    Lookup { hash: String },
    /// Check that quiz credentials are configured
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = args.config.clone().or_else(default_config_path);
    let loaded = config_path
        .as_deref()
        .filter(|path| path.exists())
        .map(load_toml_config);
    let toml = match &loaded {
        Some(Ok(config)) => config.clone(),
        _ => TomlConfig::default(),
    };

    init_tracing(&toml.logging.level)?;
    info!(
        "Starting faces-player v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );
    if let Some(Err(e)) = &loaded {
        warn!("{} - using defaults", e);
    }

    let root_folder = RootFolderResolver::new(args.root_folder.clone(), &toml).resolve();
    let initializer = RootFolderInitializer::new(root_folder);
    initializer
        .ensure_directory_exists()
        .context("Failed to initialize root folder")?;
    let data_path = initializer.data_file_path(&toml.player);
    let store = Arc::new(HashStore::new(data_path));

    match args.command {
        Command::Replay {
            dir,
            image_delay_ms,
            reverse,
            rounds_repeat,
            learning,
        } => {
            let learning = learning || toml.player.learning || learning_from_env();
            let options = ReplayOptions {
                image_delay: Duration::from_millis(image_delay_ms),
                reverse_delivery: reverse,
                rounds_repeat,
            };
            replay(store, &toml, dir, options, learning).await?;
        }
        Command::Hash { file, algorithm } => {
            let algorithm = algorithm.unwrap_or(toml.player.hash_algorithm);
            let bytes = tokio::fs::read(&file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let kind = ImageKind::sniff(&bytes)
                .ok_or_else(|| anyhow!("{} is not a supported image", file.display()))?;
            let hash = identifier_for(algorithm).hash(&bytes, kind)?;
            println!("{}", hash);
        }
        Command::Stats => {
            let stats = store.stats().await;
            println!("data file:  {}", store.path().display());
            println!("faces:      {}", stats.total);
            println!("learned:    {}", stats.resolved);
            println!("unresolved: {}", stats.unresolved);
        }
        Command::Lookup { hash } => match store.lookup(&ImageHash::new(hash)).await {
            Ok(entry) => println!("{}", entry),
            Err(Error::HashNotFound(hash)) => {
                println!("{} has never been seen", hash);
                std::process::exit(1);
            }
            Err(e) => return Err(e.into()),
        },
        Command::CheckConfig => {
            let credentials = QuizCredentials::from_env()?;
            info!("Quiz credentials found");
            println!("{:?}", credentials);
            println!("data file: {}", store.path().display());
        }
    }

    Ok(())
}

async fn replay(
    store: Arc<HashStore>,
    toml: &TomlConfig,
    dir: PathBuf,
    options: ReplayOptions,
    learning: bool,
) -> Result<()> {
    let identifier = identifier_for(toml.player.hash_algorithm);
    info!(
        data_file = %store.path().display(),
        algorithm = identifier.algorithm(),
        learning,
        "Replaying quiz"
    );

    let mut driver = ReplayDriver::open(&dir, options)
        .await
        .with_context(|| format!("Failed to open recorded quiz {}", dir.display()))?;
    let player = Player::new(store, identifier, toml.player.correlation_timeout());

    let games = player.play_games(&mut driver, learning, |report| println!("{}", report));
    tokio::select! {
        completed = games => {
            let completed = completed.context("Replay stopped")?;
            info!(completed, "Replay finished");
        }
        _ = signal::ctrl_c() => {
            info!("Interrupted, stopping");
        }
    }

    Ok(())
}
