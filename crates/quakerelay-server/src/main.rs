mod archive;
mod config;
mod fetch;
mod routes;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use quakerelay_pdl::PdlClient;
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::config::ServerConfig;
use crate::fetch::AttachmentFetcher;
use crate::routes::{build_router, AppState};

#[derive(Debug, Parser)]
#[command(
    name = "quakerelay-server",
    version,
    about = "Relays alert review console follow-ups to PDL"
)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, env = "QUAKERELAY_CONFIG", default_value = "quakerelay.toml")]
    config: PathBuf,
}

fn init_tracing() {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let config = ServerConfig::load(&cli.config)?;
    config.validate()?;

    let bind_addr = config
        .bind
        .parse::<SocketAddr>()
        .with_context(|| format!("invalid bind address '{}'", config.bind))?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        bind = %bind_addr,
        work_dir = %config.work_dir.display(),
        skip_send = config.skip_send,
        "quakerelay server starting"
    );

    let client = PdlClient::new(config.product_client())?;
    let fetcher = AttachmentFetcher::new(config.work_dir.clone())?;
    let state = Arc::new(AppState {
        config,
        client,
        fetcher,
    });

    let listener = TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    let app = build_router(state);
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("server exited unexpectedly")?;

    Ok(())
}
