//! Main entry point for the Star Tally rating service
//!
//! Initializes logging and configuration, then serves the vote gate with
//! graceful shutdown.

use anyhow::Result;
use clap::Parser;
use star_tally::config::{validate_config, AppConfig};
use star_tally::rating::AttributeRegistry;
use star_tally::service::{AppState, HealthCheck};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio::time::Duration;
use tracing::{error, info, warn};

/// Star Tally - star-rating vote aggregation service
#[derive(Parser)]
#[command(
    name = "star-tally",
    version,
    about = "A star-rating service aggregating votes into per-item running means",
    long_about = "Star Tally accepts star-rating votes over HTTP, folds them into per-item \
                 running means normalized to each attribute's scale, locks sessions against \
                 repeat votes, and orders item lists by rating."
)]
struct Args {
    /// Configuration file path
    #[arg(
        short,
        long,
        value_name = "FILE",
        help = "Path to configuration file (TOML format)"
    )]
    config: Option<PathBuf>,

    /// Log level override
    #[arg(
        short,
        long,
        value_name = "LEVEL",
        help = "Override log level (trace, debug, info, warn, error)"
    )]
    log_level: Option<String>,

    /// HTTP port override
    #[arg(long, value_name = "PORT", help = "Override HTTP server port")]
    http_port: Option<u16>,

    /// Enable debug mode
    #[arg(short, long, help = "Enable debug mode with verbose logging")]
    debug: bool,

    /// Dry run mode (validate config and exit)
    #[arg(
        long,
        help = "Validate configuration and exit without starting service"
    )]
    dry_run: bool,
}

/// Initialize structured logging with the configured level
fn init_logging(log_level: &str) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_level.into()),
        )
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    Ok(())
}

/// Wait for shutdown signals (SIGINT, SIGTERM)
async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C) signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}

/// Log a health summary and forget idle sessions periodically
async fn health_check_task(app_state: Arc<AppState>) {
    let mut interval = tokio::time::interval(Duration::from_secs(30));

    loop {
        interval.tick().await;
        if !app_state.is_running().await {
            continue;
        }

        let pruned = app_state.sessions().prune_expired();
        if pruned > 0 {
            info!("Pruned {} idle sessions", pruned);
        }

        let health = HealthCheck::check(&app_state).await;
        info!(
            "Health check: {} - {} aggregates, {} sessions",
            health.status, health.stats.stored_aggregates, health.stats.sessions
        );
    }
}

/// Display startup banner with service information
fn display_startup_banner(config: &AppConfig) -> Result<()> {
    info!("⭐ Star Tally Rating Service");
    info!("   Service: {}", config.service.name);
    info!("   Log level: {}", config.service.log_level);
    info!(
        "   HTTP: {}:{}",
        config.service.http_host, config.service.http_port
    );
    info!(
        "   Session header: {} (idle TTL {}s)",
        config.service.session_header, config.service.session_ttl_seconds
    );

    let registry = config.attribute_registry()?;
    for scope in registry.scopes() {
        if let Some(rating) = registry.resolve(scope.model_id, scope.attribute_id) {
            info!(
                "   Attribute {}: max {}, half steps {}, sortable {}",
                scope, rating.rating_max, rating.allow_half_steps, rating.sortable
            );
        }
    }
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    Ok(())
}

/// Load and merge configuration from file, environment and CLI arguments
fn load_config(args: &Args) -> Result<AppConfig> {
    let mut config = if let Some(config_path) = &args.config {
        AppConfig::from_file(config_path)?
    } else {
        AppConfig::from_env()?
    };

    // Apply CLI overrides
    if let Some(log_level) = &args.log_level {
        config.service.log_level = log_level.clone();
    }

    if args.debug {
        config.service.log_level = "debug".to_string();
    }

    if let Some(http_port) = args.http_port {
        config.service.http_port = http_port;
    }

    validate_config(&config)?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            std::process::exit(1);
        }
    };

    // Initialize logging early (before any other operations)
    if let Err(e) = init_logging(&config.service.log_level) {
        eprintln!("Failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    display_startup_banner(&config)?;

    if args.dry_run {
        info!("Configuration validation successful");
        info!("Dry run completed - exiting without starting service");
        return Ok(());
    }

    if config.ratings.attributes.is_empty() {
        warn!("No rating attributes configured, every vote will be rejected");
    }

    let app_state = match AppState::new(config.clone()) {
        Ok(state) => Arc::new(state),
        Err(e) => {
            error!("Failed to initialize application: {}", e);
            std::process::exit(1);
        }
    };

    let health_task = tokio::spawn(health_check_task(app_state.clone()));

    info!("Press Ctrl+C to shutdown gracefully...");

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let mut server = tokio::spawn(app_state.clone().serve(async move {
        let _ = shutdown_rx.await;
    }));

    tokio::select! {
        _ = wait_for_shutdown_signal() => {
            info!("🛑 Shutdown signal received, beginning graceful shutdown...");
        }
        result = &mut server => {
            health_task.abort();
            match result {
                Ok(Ok(())) => warn!("HTTP server exited without a shutdown signal"),
                Ok(Err(e)) => {
                    error!("HTTP server failed: {}", e);
                    std::process::exit(1);
                }
                Err(e) => {
                    error!("HTTP server task panicked: {}", e);
                    std::process::exit(1);
                }
            }
            return Ok(());
        }
    }

    health_task.abort();
    let _ = shutdown_tx.send(());

    match tokio::time::timeout(config.shutdown_timeout(), server).await {
        Ok(Ok(Ok(()))) => info!("✅ Graceful shutdown completed successfully"),
        Ok(Ok(Err(e))) => {
            error!("HTTP server failed: {}", e);
            std::process::exit(1);
        }
        Ok(Err(e)) => error!("HTTP server task panicked: {}", e),
        Err(_) => warn!("⚠️  Shutdown timeout exceeded, forcing exit"),
    }

    info!("🛑 Star Tally Rating Service stopped");
    Ok(())
}
