//! drydockd - polls every catalog project and builds new branch tips.
//!
//! Configuration comes from flags or `DRYDOCK_*` environment variables.
//! The daemon ticks until SIGINT or SIGTERM, finishing the tick in flight.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use drydock_core::github::{DEFAULT_API_URL, DEFAULT_STATUS_CONTEXT};
use drydock_core::{init_tracing, run_forever, Controller, ControllerConfig, PollSchedule, METRICS};
use tracing::Level;

#[derive(Parser, Debug)]
#[command(name = "drydockd")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Poll-driven CI build controller", long_about = None)]
struct Args {
    /// Project catalog (TOML)
    #[arg(long, env = "DRYDOCK_CATALOG")]
    catalog: PathBuf,

    /// Build records and workspaces live here
    #[arg(long, env = "DRYDOCK_DATA_DIR", default_value = ".drydock")]
    data_dir: PathBuf,

    /// Token used for commit statuses and access checks
    #[arg(long, env = "DRYDOCK_GITHUB_TOKEN", default_value = "", hide_env_values = true)]
    github_token: String,

    #[arg(long, env = "DRYDOCK_GITHUB_API_URL", default_value = DEFAULT_API_URL)]
    github_api_url: String,

    /// Context name shown next to commit statuses
    #[arg(long, env = "DRYDOCK_STATUS_CONTEXT", default_value = DEFAULT_STATUS_CONTEXT)]
    status_context: String,

    /// Base URL that commit statuses link to
    #[arg(long, env = "DRYDOCK_DASHBOARD_URL")]
    dashboard_url: Option<String>,

    /// Idle seconds between ticks
    #[arg(long, env = "DRYDOCK_POLL_INTERVAL_SECS", default_value_t = 3)]
    poll_interval_secs: u64,

    /// Abandon a tick after this many seconds
    #[arg(long, env = "DRYDOCK_TICK_TIMEOUT_SECS")]
    tick_timeout_secs: Option<u64>,

    /// Push the build record repository after every commit
    #[arg(long, env = "DRYDOCK_PUSH_BUILD_RECORDS")]
    push_build_records: bool,

    /// User the poll session runs as
    #[arg(long, env = "DRYDOCK_USER", default_value = "drydock")]
    user: String,

    /// Emit JSON-formatted log lines
    #[arg(long)]
    json: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn controller_config(&self) -> ControllerConfig {
        ControllerConfig {
            catalog_path: self.catalog.clone(),
            data_dir: self.data_dir.clone(),
            github_api_url: self.github_api_url.clone(),
            github_token: self.github_token.clone(),
            status_context: self.status_context.clone(),
            dashboard_url: self.dashboard_url.clone(),
            push_build_records: self.push_build_records,
            user: self.user.clone(),
        }
    }

    fn schedule(&self) -> PollSchedule {
        PollSchedule {
            interval: Duration::from_secs(self.poll_interval_secs),
            tick_timeout: self.tick_timeout_secs.map(Duration::from_secs),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    init_tracing(args.json, level);

    let config = args.controller_config();
    let controller = Controller::open(&config).with_context(|| {
        format!(
            "failed to start with catalog {}",
            config.catalog_path.display()
        )
    })?;
    tracing::info!(
        projects = controller.catalog.len(),
        data_dir = %config.data_dir.display(),
        interval_secs = args.poll_interval_secs,
        "drydockd started"
    );

    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = stop_tx.send(());
    });

    let session = config.session();
    run_forever(&controller.poller, &session, args.schedule(), async {
        let _ = stop_rx.await;
    })
    .await;

    METRICS.flush();
    tracing::info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received SIGINT, stopping after the current tick"),
        _ = terminate => tracing::info!("received SIGTERM, stopping after the current tick"),
    }
}
