//! currency_exchange - exchange core process
//!
//! Connects to the store, verifies the schema and runs the selling pool
//! maintenance jobs until shut down.

use currency_exchange::config::LogFormat;
use currency_exchange::jobs::{JobScheduler, JobSchedulerConfig};
use currency_exchange::registry::{CurrencyRegistry, UserRegistry};
use currency_exchange::{db, Config};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing/logging
fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "currency_exchange=debug".into());

    match format {
        LogFormat::Text => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = Config::from_env()?;
    init_tracing(config.log_format);

    tracing::info!(
        environment = %config.environment,
        production = config.is_production(),
        "Starting currency exchange"
    );
    tracing::info!("Connecting to database...");

    let pool = db::connect(&config)
        .await
        .map_err(|e| anyhow::anyhow!("cannot connect to the database: {}", e))?;

    if !db::check_schema(&pool).await? {
        tracing::error!("Database schema is not complete. Please run migrations.");
        return Err(anyhow::anyhow!("Database schema incomplete"));
    }

    let users = UserRegistry::new(pool.clone()).count().await?;
    let currencies = CurrencyRegistry::new(pool.clone()).list().await?;
    tracing::info!(
        users = users,
        currencies = currencies.len(),
        "Database connected successfully"
    );

    let jobs = JobScheduler::with_config(
        pool.clone(),
        JobSchedulerConfig {
            prune_interval: config.prune_interval,
            ..JobSchedulerConfig::default()
        },
    )
    .start();

    shutdown_signal().await;

    // Cleanup
    tracing::info!("Shutting down...");
    jobs.abort();
    pool.close().await;
    tracing::info!("Database connections closed. Goodbye!");

    Ok(())
}

/// Shutdown signal handler for graceful shutdown
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        },
    }
}
