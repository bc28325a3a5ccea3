//! scriptorium-server — HTTP front end for the job scheduler.
//!
//! # Usage
//!
//! ```bash
//! # Defaults: 0.0.0.0:8280, workspace under ./data
//! scriptorium-server
//!
//! # Custom bind and workspace
//! scriptorium-server --port 9000 --data-dir /srv/scriptorium
//!
//! # Via environment variables
//! SCRIPTORIUM_PORT=9000 SCRIPTORIUM_DATA_DIR=/srv/scriptorium scriptorium-server
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info, warn};

use scriptorium_scheduler::store::memory::{MemoryModels, MemoryWorkspace};
use scriptorium_scheduler::store::{ModelStore, SnapshotStore, WorkspaceDirectory};
use scriptorium_scheduler::{ProviderRegistry, Scheduler, SchedulerConfig};
use scriptorium_server::{build_router, builtin, AppState};

/// Job scheduling and execution server for document-processing workflows.
#[derive(Parser, Debug)]
#[command(name = "scriptorium-server", version, about)]
struct Cli {
    /// Host to bind the HTTP listener to.
    #[arg(long, env = "SCRIPTORIUM_HOST", default_value = "0.0.0.0")]
    host: String,

    /// Port for the HTTP listener.
    #[arg(long, env = "SCRIPTORIUM_PORT", default_value_t = 8280)]
    port: u16,

    /// Path to the scheduler config file.
    #[arg(long, env = "SCRIPTORIUM_CONFIG", default_value = "scriptorium.toml")]
    config: PathBuf,

    /// Workspace data root; overrides the config file.
    #[arg(long, env = "SCRIPTORIUM_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Seconds between retention sweeps.
    #[arg(long, env = "SCRIPTORIUM_SWEEP_INTERVAL", default_value_t = 30)]
    sweep_interval: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    scriptorium_core::config::load_dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = match SchedulerConfig::from_file(&cli.config) {
        Ok(cfg) => {
            info!(path = %cli.config.display(), "loaded scheduler config");
            cfg
        }
        Err(e) => {
            warn!(
                path = %cli.config.display(),
                "no usable config file, using defaults: {}", e
            );
            SchedulerConfig::default()
        }
    };
    if let Some(data_dir) = cli.data_dir {
        config.data_dir = data_dir;
    }

    let workspace = Arc::new(MemoryWorkspace::discover(&config.data_dir)?);
    let directory: Arc<dyn WorkspaceDirectory> = workspace.clone();
    let snapshots: Arc<dyn SnapshotStore> = workspace;
    let models: Arc<dyn ModelStore> = Arc::new(MemoryModels::new());

    let mut registry = ProviderRegistry::new();
    builtin::register(&mut registry);

    let scheduler = Arc::new(Scheduler::new(
        config,
        directory.clone(),
        snapshots.clone(),
        models.clone(),
    ));

    let state = Arc::new(AppState {
        scheduler: scheduler.clone(),
        registry: Arc::new(registry),
        directory,
        snapshots,
        models,
    });

    // Periodic sweep: raises deadline cancellations and evicts expired
    // terminal jobs even when no submissions arrive.
    let sweeper = scheduler.clone();
    let sweep_interval = cli.sweep_interval.max(1);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(sweep_interval));
        loop {
            ticker.tick().await;
            sweeper.sweep();
        }
    });

    let app = build_router(state);
    let addr = format!("{}:{}", cli.host, cli.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("shutting down, waiting for running jobs");
    scheduler.shutdown();
    if !scheduler.join(Duration::from_secs(20)) {
        warn!("jobs still running at shutdown deadline");
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("failed to listen for shutdown signal: {}", e);
    }
}
