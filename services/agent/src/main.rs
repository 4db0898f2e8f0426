//! netmon monitoring agent.
//!
//! One binary, one `--task` per process. The tasks share the store in the
//! persistent directory and nothing else; coordination happens through
//! the store's transactional consistency.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{info, warn};

use netmon_agent::accounting::AccountingLog;
use netmon_agent::api;
use netmon_agent::bootstrap;
use netmon_agent::calendar::CalendarWorker;
use netmon_agent::cleaner::CleanerWorker;
use netmon_agent::cli::{Cli, Task};
use netmon_agent::config::ConfigStore;
use netmon_agent::logging;
use netmon_agent::manager::{process, ManagerConfig, TestsManager};
use netmon_agent::responder;
use netmon_agent::state::AppState;
use netmon_agent::statistics::StatsWorker;
use netmon_agent::store::{Store, STORE_FILE};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // The probe child owns stdout for its result line; it gets neither
    // logging nor a store connection.
    if cli.task == Task::Probe {
        let probe_name = cli
            .probe_name
            .clone()
            .context("--probe-name is required for the probe task")?;
        let run_id = cli.run_id.context("--run-id is required for the probe task")?;
        return process::probe_child(&probe_name, run_id).await;
    }

    let config = Arc::new(ConfigStore::load(&cli.persistent.join(bootstrap::CONFIG_FILE))?);
    bootstrap::init_config_defaults(&config, &cli.persistent)?;
    let _log_guard = logging::init(&config)?;

    info!(
        task = format!("{:?}", cli.task),
        persistent = %cli.persistent.display(),
        version = env!("CARGO_PKG_VERSION"),
        "Starting agent task"
    );

    let store_path = cli.persistent.join(STORE_FILE);

    if cli.task == Task::InitDatabase {
        let store = Store::create(&store_path).await?;
        store.init_schema().await?;
        info!("Store initialized");
        return Ok(());
    }

    let store = Store::open(&store_path)
        .await
        .context("unable to open the store (run --task init_database first)")?;
    bootstrap::pre_run_check(&config, &store).await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut worker = tokio::spawn(run_task(
        cli.task,
        store,
        config,
        cli.persistent.clone(),
        shutdown_rx,
    ));

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
        result = &mut worker => {
            return result.context("worker task panicked")?;
        }
    }

    let _ = shutdown_tx.send(true);
    match tokio::time::timeout(Duration::from_secs(10), worker).await {
        Ok(result) => result.context("worker task panicked")??,
        Err(_) => warn!("Worker did not shut down in time"),
    }

    info!("Agent task stopped");
    Ok(())
}

async fn run_task(
    task: Task,
    store: Store,
    config: Arc<ConfigStore>,
    persistent: PathBuf,
    shutdown: watch::Receiver<bool>,
) -> Result<()> {
    match task {
        Task::Calendar => {
            CalendarWorker::new(store).run(shutdown).await;
            Ok(())
        }
        Task::Cleaner => {
            CleanerWorker::new(store, config).run(shutdown).await;
            Ok(())
        }
        Task::Stats => {
            StatsWorker::new(store).run(shutdown).await;
            Ok(())
        }
        Task::TestsManager => {
            let manager_config = ManagerConfig::from_config(&config)?;
            let mut manager = TestsManager::new(store, manager_config, persistent);
            manager.run(shutdown).await;
            Ok(())
        }
        Task::Responder => responder::run(config, shutdown).await,
        Task::Server => run_server(store, config, shutdown).await,
        // Handled before the worker is spawned.
        Task::InitDatabase | Task::Probe => Ok(()),
    }
}

async fn run_server(
    store: Store,
    config: Arc<ConfigStore>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let token_key = config.require("authentication", "token_key")?;
    let accounting = Arc::new(AccountingLog::open(&config));
    let state = AppState::new(store, config.clone(), accounting, token_key);
    let app = api::create_router(state);

    let addr = SocketAddr::new(config.ip("api", "server_ip")?, config.port("api", "server_port")?);
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("unable to bind the API listener on {addr}"))?;
    info!(addr = %addr, "Listening for connections");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        loop {
            if *shutdown.borrow() {
                break;
            }
            if shutdown.changed().await.is_err() {
                break;
            }
        }
        info!("HTTP server shutting down");
    })
    .await?;
    Ok(())
}
