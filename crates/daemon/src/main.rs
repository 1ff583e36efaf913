//! discussmail daemon entry point.
//!
//! Loads configuration and templates, fetches the permitted webhook origin
//! ranges, starts the web receiver and the range refresher, and handles
//! graceful shutdown.

mod refresher;
mod signals;

use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use discussmail_core::config::AppConfig;
use discussmail_core::notify::SmtpDispatcher;
use discussmail_core::origin::meta::meta_client;
use discussmail_core::recipient::FileRecipientSource;
use discussmail_core::{Composer, OriginRanges, Templates};
use discussmail_web::{AppState, WebServer};

use crate::refresher::RangeRefresher;

// ---------------------------------------------------------------------------
// CLI arguments
// ---------------------------------------------------------------------------

/// discussmail webhook-to-mail daemon.
#[derive(Parser, Debug)]
#[command(
    name = "discussmail-daemon",
    version,
    about = "Forwards discussion webhooks to per-repository mailing lists"
)]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long)]
    config: PathBuf,

    /// Override the log level from the config file (trace, debug, info, warn, error).
    #[arg(long)]
    log_level: Option<String>,
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load and resolve configuration
    let mut config =
        AppConfig::load_from_file(&args.config).context("failed to load configuration file")?;
    config
        .resolve_env_vars()
        .context("failed to resolve environment variables in config")?;
    config
        .validate()
        .context("configuration validation failed")?;

    // Initialize tracing
    let log_level = args
        .log_level
        .as_deref()
        .unwrap_or(&config.daemon.log_level);

    let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .init();

    // Startup banner
    info!("========================================");
    info!("  discussmail daemon v{}", env!("CARGO_PKG_VERSION"));
    info!("========================================");
    info!("Config file   : {}", args.config.display());
    info!("Listen        : {}", config.web.listen);
    info!("Repo root     : {}", config.recipients.repo_root.display());
    info!("Templates     : {}", config.templates.dir.display());
    info!("SMTP relay    : {}:{}", config.mail.smtp_host, config.mail.smtp_port);
    info!("Range refresh : {}s", config.github.range_refresh_secs);
    info!("Log level     : {}", log_level);
    info!("========================================");

    // Templates are loaded once and shared read-only
    let templates = Templates::load_dir(&config.templates.dir)
        .context("failed to load notification templates")?;

    let dispatcher =
        SmtpDispatcher::new(&config.mail).context("failed to initialize SMTP dispatcher")?;

    let composer = Composer::new(
        Arc::new(templates),
        Arc::new(FileRecipientSource::new(&config.recipients.repo_root)),
        Arc::new(dispatcher),
        config.mail.sender.clone(),
    );
    info!("Composer initialized");

    // Origin ranges: static ranges from config plus the provider's published set
    let static_ranges = OriginRanges::parse_strict(&config.github.allowed_ranges)
        .context("invalid github.allowed_ranges")?;
    let refresher = Arc::new(RangeRefresher::new(
        meta_client().context("failed to build meta HTTP client")?,
        config.github.api_url.clone(),
        static_ranges,
        Duration::from_secs(config.github.range_refresh_secs),
    ));
    let range_count = refresher
        .load_initial()
        .await
        .context("failed to obtain webhook origin ranges")?;
    info!(count = range_count, "webhook origin ranges loaded");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Start the range refresher in the background
    let refresher_task = {
        let refresher = Arc::clone(&refresher);
        let shutdown = shutdown_rx.clone();
        tokio::spawn(async move { refresher.run(shutdown).await })
    };

    // Start the web server in the background
    let web_server = WebServer::new(AppState {
        composer: Arc::new(composer),
        origins: refresher.shared(),
        trust_forwarded_for: config.web.trust_forwarded_for,
    });
    let listen_addr = config.web.listen.clone();
    let web_handle = {
        let mut shutdown = shutdown_rx;
        tokio::spawn(async move {
            let stop = async move {
                let _ = shutdown.changed().await;
            };
            if let Err(e) = web_server.start(&listen_addr, stop).await {
                error!("Web server error: {}", e);
            }
        })
    };

    // Wait for shutdown signal
    signals::wait_for_shutdown().await;

    info!("Shutdown signal received, stopping...");
    let _ = shutdown_tx.send(true);

    // Let in-flight deliveries finish (up to 10s)
    match tokio::time::timeout(Duration::from_secs(10), web_handle).await {
        Ok(Ok(())) => info!("web server stopped gracefully"),
        Ok(Err(e)) => warn!("web server task error: {}", e),
        Err(_) => warn!("web server did not stop within 10s, forcing shutdown"),
    }

    if let Err(e) = refresher_task.await {
        warn!("range refresher task error: {}", e);
    }

    let stats = refresher.stats();
    info!(
        refreshes = stats.total_refreshes.load(Ordering::Relaxed),
        failures = stats.total_failures.load(Ordering::Relaxed),
        "range refresher summary"
    );

    info!("discussmail daemon stopped.");
    Ok(())
}
