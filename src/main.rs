use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use crossbot::api::KucoinClient;
use crossbot::config::{BotConfig, Credentials};
use crossbot::persistence::{ensure_dirs, LatencyStore, OhlcCache};
use crossbot::pipeline::{Supervisor, FAST_WINDOW, SLOW_WINDOW};
use crossbot::server;
use crossbot::status::StatusBoard;

const LOG_DIR: &str = "log";
const OHLC_DIR: &str = "ohlc_json";

#[derive(Parser, Debug)]
#[command(name = "crossbot", about = "EMA crossover paper-trading bot")]
struct Args {
    /// Path to the JSON config file
    #[arg(long, default_value = "config.json")]
    config: PathBuf,

    /// Path to the exchange credentials file
    #[arg(long, default_value = "key.json")]
    keyfile: PathBuf,

    /// Write the effective config back to disk and exit
    #[arg(long)]
    export_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    let args = Args::parse();
    let config = BotConfig::load(&args.config).context("Failed to load config")?;

    if args.export_config {
        config
            .export(&args.config)
            .context("Failed to export config")?;
        tracing::info!("wrote effective config to {}", args.config.display());
        return Ok(());
    }

    if config.exchange != "kucoin" {
        bail!("unsupported exchange '{}'", config.exchange);
    }

    let credentials = Credentials::load(&args.keyfile).context("Failed to load credentials")?;
    tracing::info!("🔐 using API key {}", credentials.masked_key());

    let session_id = chrono::Utc::now().timestamp_millis();
    ensure_dirs(LOG_DIR.as_ref(), OHLC_DIR.as_ref()).context("Failed to create data dirs")?;

    let status = StatusBoard::new(session_id);
    let gateway = Arc::new(KucoinClient::new(credentials)?);
    let supervisor = Supervisor::new(
        config.clone(),
        gateway,
        status.clone(),
        LatencyStore::new(LOG_DIR, session_id),
        OhlcCache::new(OHLC_DIR),
    );

    tracing::info!("🚀 starting crossbot (session {})", session_id);

    let pairs = supervisor
        .select_pairs()
        .await
        .context("Failed to load markets")?;
    if pairs.is_empty() {
        bail!("no USDT-quoted markets matched the configuration");
    }

    tracing::info!("\n📊 Configuration:");
    tracing::info!("  Exchange: {}", config.exchange);
    tracing::info!("  Ticker interval: {}s", config.ticker_interval);
    tracing::info!("  EMA windows: {}/{}", FAST_WINDOW, SLOW_WINDOW);
    tracing::info!("  Latency logging: {}", config.latency_logging);
    tracing::info!("  Pairs: {}", pairs.len());
    for pair in &pairs {
        tracing::info!("    - {}", pair);
    }

    let mut handles = supervisor.spawn(&pairs).await;

    if config.serve_api {
        tracing::info!("  Dashboard: http://0.0.0.0:{}", config.port);
        let server_status = status.clone();
        let server_shutdown = supervisor.subscribe();
        let port = config.port;
        handles.push(tokio::spawn(async move {
            if let Err(e) = server::serve(server_status, port, server_shutdown).await {
                tracing::error!("dashboard server failed: {}", e);
            }
        }));
    }

    tracing::info!("✅ {} tasks running", handles.len());
    tracing::info!("\nPress Ctrl+C to stop...\n");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;
    tracing::info!("\n⚠️  Received Ctrl+C, shutting down...");

    supervisor.shutdown();
    for handle in handles {
        let _ = handle.await;
    }

    tracing::info!(
        "💰 session profit: {:.4} across {} trades ({} snapshots, {} stale signals, {} rejected sells)",
        status.profit(),
        status.trades().len(),
        status.snapshots_processed(),
        status.stale_discards(),
        status.rejected_sells()
    );
    tracing::info!("👋 crossbot stopped");
    Ok(())
}

fn setup_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("crossbot=info")),
        )
        .init();
}
