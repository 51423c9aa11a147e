use anyhow::Context;
use clap::Parser;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing_subscriber::EnvFilter;

use sefs_lib::config::{default_root, EngineConfig, NamingBackend};
use sefs_lib::services::{get_all_files, DirectoryWatcher};
use sefs_lib::state::RootLock;
use sefs_lib::ReorganizationCoordinator;

/// Keep a directory organized into semantically named folders
#[derive(Parser, Debug)]
#[command(name = "sefs", version)]
struct Args {
    /// Directory to organize (defaults to ~/sefs_root)
    #[arg(env = "SEFS_ROOT")]
    root: Option<PathBuf>,

    /// Maximum cosine distance between neighbouring files
    #[arg(long)]
    epsilon: Option<f32>,

    /// Files needed to form a cluster
    #[arg(long)]
    min_samples: Option<usize>,

    /// Organize new files immediately instead of waiting for the next pass
    #[arg(long)]
    auto_include: bool,

    /// Milliseconds between ticks
    #[arg(long)]
    tick_ms: Option<u64>,

    /// How clusters are named
    #[arg(long, value_enum)]
    naming: Option<NamingBackend>,
}

impl Args {
    fn apply(&self, config: &mut EngineConfig) {
        if let Some(epsilon) = self.epsilon {
            config.epsilon = epsilon;
        }
        if let Some(min_samples) = self.min_samples {
            config.min_samples = min_samples;
        }
        if self.auto_include {
            config.auto_include = true;
        }
        if let Some(tick_ms) = self.tick_ms {
            config.tick_interval_ms = tick_ms;
        }
        if let Some(naming) = self.naming {
            config.naming = naming;
        }
    }
}

fn log_arrivals(arrivals: &[PathBuf]) {
    for path in arrivals {
        tracing::info!(path = %path.display(), "New file indexed, will be organized on the next pass");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let root = args.root.clone().unwrap_or_else(default_root);
    std::fs::create_dir_all(&root).with_context(|| format!("Failed to create {}", root.display()))?;

    let mut config = EngineConfig::load(&root)?;
    args.apply(&mut config);
    config.validate()?;

    let _lock = RootLock::acquire(&root)?;

    let extensions = config.normalized_extensions();
    let tick = config.tick_interval();
    let (sender, receiver) = mpsc::channel();
    let watcher = DirectoryWatcher::start(&root, extensions.clone(), config.debounce(), sender)?;

    // Model loading and the blocking HTTP client stay off the async threads
    let mut engine = tokio::task::spawn_blocking(move || -> anyhow::Result<ReorganizationCoordinator> {
        let files = get_all_files(&config.root, &extensions);
        let mut engine = ReorganizationCoordinator::open(config, receiver)?.with_arrival_hook(Box::new(log_arrivals));
        engine.bootstrap(&files);
        Ok(engine)
    })
    .await??;

    tracing::info!(root = %root.display(), "SEFS started");

    let mut interval = tokio::time::interval(tick);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let (returned, outcome) = tokio::task::spawn_blocking(move || {
                    let outcome = panic::catch_unwind(AssertUnwindSafe(|| engine.process_tick()));
                    (engine, outcome)
                })
                .await?;
                engine = returned;
                match outcome {
                    Ok(true) => tracing::debug!("Tick processed changes"),
                    Ok(false) => {}
                    Err(_) => tracing::error!("Tick panicked; continuing with the next tick"),
                }
            }
            result = &mut shutdown => {
                result.context("Failed to listen for Ctrl-C")?;
                tracing::info!("Shutting down");
                break;
            }
        }
    }

    drop(watcher);
    tokio::task::spawn_blocking(move || drop(engine)).await?;
    Ok(())
}
