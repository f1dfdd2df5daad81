//! exptrackd - HTTP front end for the experiment/run registry
//!
//! Routes:
//! - `POST /experiments`
//! - `POST /runs`
//! - `GET /runs/{run_id}`
//! - `GET /health`

mod error;
mod routes;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use exptrack_core::ExperimentService;
use exptrack_state::{ExperimentRepository, SurrealExperimentRepository, SurrealHandle};
use tracing::info;

#[derive(Parser)]
#[command(name = "exptrackd")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Experiment/run registry daemon", long_about = None)]
struct Args {
    /// Address to listen on
    #[arg(long, env = "EXPTRACK_LISTEN", default_value = "127.0.0.1:8080")]
    listen: SocketAddr,

    /// Keep all data in memory; nothing survives a restart
    #[arg(long)]
    ephemeral: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    exptrack_core::init_tracing(args.json, exptrack_core::level_for(args.verbose));

    let handle = if args.ephemeral {
        SurrealHandle::setup_db().await
    } else {
        SurrealHandle::setup_from_env().await
    }
    .context("Failed to connect to exptrack database")?;

    let repo: Arc<dyn ExperimentRepository> = Arc::new(SurrealExperimentRepository::new(handle));
    let app = routes::build_router(routes::AppState {
        service: ExperimentService::new(repo),
    });

    let listener = tokio::net::TcpListener::bind(args.listen)
        .await
        .with_context(|| format!("Failed to bind {}", args.listen))?;
    info!("Listening on {}", args.listen);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("exptrackd stopped");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutdown requested");
    }
}
