//! clusterpoold — the cluster pool daemon.
//!
//! Assembles the pool subsystems into one process:
//! - Pool registry (fixed size, named by `[pool]`)
//! - Allocator + reclaimer
//! - Maintenance ticker
//! - REST API + Prometheus metrics
//!
//! Clusters are backed by a simulated provider whose bootstrap and reset
//! take the delays configured under `[backend]`.
//!
//! # Usage
//!
//! ```text
//! clusterpoold serve --config clusterpool.toml --port 8080
//! clusterpoold check-config --config clusterpool.toml
//! ```

mod backend;
mod config;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use clusterpool_scheduler::ClusterPool;
use clusterpool_state::PoolRegistry;

use crate::backend::SimulatedBackend;
use crate::config::PoolConfig;

const DEFAULT_FILTER: &str = "info,clusterpoold=debug,clusterpool_state=debug,clusterpool_scheduler=debug,clusterpool_health=debug,clusterpool_api=debug";

#[derive(Parser)]
#[command(name = "clusterpoold", about = "Cluster pool daemon")]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the pool and serve the API.
    Serve {
        /// Path to clusterpool.toml. Defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Port to listen on.
        #[arg(long, default_value = "8080")]
        port: u16,

        /// Override `pool.size`.
        #[arg(long)]
        size: Option<usize>,
    },
    /// Validate a config file and print the effective configuration.
    CheckConfig {
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match cli.command {
        Command::Serve { config, port, size } => {
            let mut config = PoolConfig::load(config.as_deref())?;
            if let Some(size) = size {
                config.pool.size = size;
            }
            run_serve(config, port).await
        }
        Command::CheckConfig { config } => {
            let config = PoolConfig::load(config.as_deref())?;
            config.settings()?;
            print!("{}", config.to_toml()?);
            Ok(())
        }
    }
}

fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn run_serve(config: PoolConfig, port: u16) -> anyhow::Result<()> {
    let settings = config.settings()?;
    info!(size = settings.size, prefix = %settings.namer.prefix, "clusterpoold starting");

    // ── Initialize subsystems ──────────────────────────────────

    let backend = settings.failing_resets.iter().fold(
        SimulatedBackend::new(settings.bootstrap_delay, settings.reset_delay),
        |backend, id| backend.with_failing_reset(id.clone()),
    );
    let backend = Arc::new(backend);

    let registry = PoolRegistry::initialize(settings.size, &settings.namer)?;
    let pool = Arc::new(ClusterPool::new(registry, backend.clone(), settings.reclaim)?);

    pool.start_maintenance(settings.staleness, settings.maintenance_interval);
    info!(interval = ?settings.maintenance_interval, "maintenance started");

    // Clusters come up in the background; the API is usable meanwhile and
    // reports them as creating.
    let bootstrap_pool = pool.clone();
    let bootstrap = tokio::spawn(async move {
        let report = bootstrap_pool.bootstrap(backend).await;
        if !report.failed.is_empty() {
            warn!(failed = ?report.failed, "some clusters did not come up");
        }
    });

    // ── Start API server ───────────────────────────────────────

    let router = clusterpool_api::build_router(pool.clone());
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "API server starting");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "failed to listen for ctrl-c");
            }
            info!("shutdown signal received");
        })
        .await?;

    // ── Shutdown ───────────────────────────────────────────────

    bootstrap.abort();
    let report = pool.shutdown().await;
    if !report.abandoned.is_empty() {
        warn!(abandoned = ?report.abandoned, "reclamations abandoned at shutdown");
    }

    info!("clusterpoold stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn crate_target<T>() -> &'static str {
        let path = std::any::type_name::<T>();
        path.split("::").next().unwrap_or(path)
    }

    #[test]
    fn default_filter_enables_debug_for_library_targets() {
        let targets = [
            crate_target::<clusterpool_state::PoolRegistry>(),
            crate_target::<clusterpool_scheduler::ClusterPool>(),
            crate_target::<clusterpool_health::StalenessPolicy>(),
            crate_target::<clusterpool_api::ApiState>(),
        ];
        let directives: Vec<&str> = DEFAULT_FILTER.split(',').collect();
        for target in targets {
            let directive = format!("{target}=debug");
            assert!(directives.contains(&directive.as_str()), "missing {directive}");
        }
        assert!(EnvFilter::try_new(DEFAULT_FILTER).is_ok());
    }
}
