//! Scheduled Jobs
//!
//! Background maintenance of the selling pool. Exhausted offers (residual
//! zero) are kept by the pool until pruned here.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use std::time::Duration;
use tokio::time::interval;

use crate::domain::CurrencyCode;

/// Delete offers whose residual reached zero.
///
/// Waits for the selling pool lock so it never removes a row a settlement
/// has just read.
pub async fn prune_exhausted_offers(pool: &PgPool) -> Result<u64, JobError> {
    let mut tx = pool.begin().await?;

    sqlx::query("LOCK TABLE selling IN ACCESS EXCLUSIVE MODE")
        .execute(&mut *tx)
        .await?;
    let result = sqlx::query(
        r#"
        DELETE FROM selling
        WHERE amount = 0
        "#,
    )
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    let rows_deleted = result.rows_affected();
    if rows_deleted > 0 {
        tracing::info!(rows_deleted = rows_deleted, "Pruned exhausted offers");
    }

    Ok(rows_deleted)
}

/// Open liquidity of one currency
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolDepth {
    pub currency: CurrencyCode,
    pub offers: i64,
    pub total_amount: Decimal,
    pub best_price: Decimal,
}

/// Per-currency count, volume and best price of open offers.
pub async fn pool_depth(pool: &PgPool) -> Result<Vec<PoolDepth>, JobError> {
    let rows: Vec<(String, i64, Decimal, Decimal)> = sqlx::query_as(
        r#"
        SELECT currency, COUNT(*), SUM(amount), MIN(price)
        FROM selling
        WHERE amount > 0
        GROUP BY currency
        ORDER BY currency
        "#,
    )
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|(currency, offers, total_amount, best_price)| -> Result<PoolDepth, JobError> {
            let currency = CurrencyCode::new(&currency)
                .map_err(|e| JobError::CorruptRow(format!("selling.currency: {}", e)))?;
            Ok(PoolDepth {
                currency,
                offers,
                total_amount,
                best_price,
            })
        })
        .collect()
}

fn log_pool_depth(depths: &[PoolDepth]) {
    for depth in depths {
        tracing::info!(
            currency = %depth.currency,
            offers = depth.offers,
            total_amount = %depth.total_amount,
            best_price = %depth.best_price,
            "Selling pool depth"
        );
    }
}

// =========================================================================
// Job Scheduler
// =========================================================================

/// Configuration for job scheduler
#[derive(Debug, Clone)]
pub struct JobSchedulerConfig {
    /// Interval for pruning exhausted offers (default: 5 minutes)
    pub prune_interval: Duration,
    /// Interval for the pool depth report (default: 1 minute)
    pub depth_report_interval: Duration,
}

impl Default for JobSchedulerConfig {
    fn default() -> Self {
        Self {
            prune_interval: Duration::from_secs(300),
            depth_report_interval: Duration::from_secs(60),
        }
    }
}

/// Job Scheduler - runs periodic maintenance tasks
pub struct JobScheduler {
    pool: PgPool,
    config: JobSchedulerConfig,
}

impl JobScheduler {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            config: JobSchedulerConfig::default(),
        }
    }

    pub fn with_config(pool: PgPool, config: JobSchedulerConfig) -> Self {
        Self { pool, config }
    }

    /// Start the job scheduler in the background
    /// Returns a handle that can be used to abort the scheduler
    pub fn start(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(&self) {
        tracing::info!("Job scheduler started");

        let mut prune_interval = interval(self.config.prune_interval);
        let mut depth_interval = interval(self.config.depth_report_interval);

        loop {
            tokio::select! {
                _ = prune_interval.tick() => {
                    if let Err(e) = prune_exhausted_offers(&self.pool).await {
                        tracing::error!(error = %e, "Offer pruning failed");
                    }
                }
                _ = depth_interval.tick() => {
                    match pool_depth(&self.pool).await {
                        Ok(depths) => log_pool_depth(&depths),
                        Err(e) => tracing::error!(error = %e, "Pool depth report failed"),
                    }
                }
            }
        }
    }

    /// Run all maintenance jobs once (for manual trigger or testing)
    pub async fn run_all_once(&self) -> MaintenanceReport {
        let mut report = MaintenanceReport::default();

        match prune_exhausted_offers(&self.pool).await {
            Ok(count) => report.offers_pruned = count,
            Err(e) => report.errors.push(format!("Offer pruning: {}", e)),
        }

        match pool_depth(&self.pool).await {
            Ok(depths) => report.pool_depth = depths,
            Err(e) => report.errors.push(format!("Pool depth: {}", e)),
        }

        report.completed_at = Utc::now();
        report
    }
}

/// Report from running maintenance jobs
#[derive(Debug, Clone, Default)]
pub struct MaintenanceReport {
    pub offers_pruned: u64,
    pub pool_depth: Vec<PoolDepth>,
    pub errors: Vec<String>,
    pub completed_at: DateTime<Utc>,
}

/// Job execution errors
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Corrupt row: {0}")]
    CorruptRow(String),
}

// =========================================================================
// Tests
// =========================================================================
