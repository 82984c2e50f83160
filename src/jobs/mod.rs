//! Scheduled Jobs
//!
//! Background jobs for periodic maintenance tasks.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;

use crate::signing::{self, NonceStore};
use crate::store::StoreError;

// =========================================================================
// Expired Nonce Purge Job
// =========================================================================

/// Delete nonce claims whose TTL has passed
///
/// Expired nonces are already claimable again; purging only bounds the
/// size of the store.
pub async fn purge_expired_nonces(nonces: &dyn NonceStore, now_ms: i64) -> Result<u64, JobError> {
    let rows_deleted = nonces.purge_expired(now_ms).await?;

    if rows_deleted > 0 {
        tracing::info!(rows_deleted = rows_deleted, "Purged expired request nonces");
    }

    Ok(rows_deleted)
}

// =========================================================================
// Job Scheduler
// =========================================================================

/// Configuration for job scheduler
#[derive(Debug, Clone)]
pub struct JobSchedulerConfig {
    /// Interval for nonce purging (default: 1 minute)
    pub nonce_purge_interval: Duration,
}

impl Default for JobSchedulerConfig {
    fn default() -> Self {
        Self {
            nonce_purge_interval: Duration::from_secs(60),
        }
    }
}

/// Job Scheduler - runs periodic maintenance tasks
pub struct JobScheduler {
    nonces: Arc<dyn NonceStore>,
    config: JobSchedulerConfig,
}

impl JobScheduler {
    /// Create a new job scheduler
    pub fn new(nonces: Arc<dyn NonceStore>) -> Self {
        Self {
            nonces,
            config: JobSchedulerConfig::default(),
        }
    }

    /// Create with custom configuration
    pub fn with_config(nonces: Arc<dyn NonceStore>, config: JobSchedulerConfig) -> Self {
        Self { nonces, config }
    }

    /// Start the job scheduler in the background
    /// Returns a handle that can be used to abort the scheduler
    pub fn start(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    /// Run the scheduler loop
    async fn run(&self) {
        tracing::info!(
            nonce_purge_interval_secs = self.config.nonce_purge_interval.as_secs(),
            "Job scheduler started"
        );

        let mut nonce_interval = interval(self.config.nonce_purge_interval);

        loop {
            nonce_interval.tick().await;
            if let Err(e) = purge_expired_nonces(&*self.nonces, signing::now_ms()).await {
                tracing::error!(error = %e, "Nonce purge failed");
            }
        }
    }

    /// Run all maintenance jobs once (for manual trigger or testing)
    pub async fn run_all_once(&self) -> MaintenanceReport {
        let mut report = MaintenanceReport::default();

        match purge_expired_nonces(&*self.nonces, signing::now_ms()).await {
            Ok(count) => report.nonces_purged = count,
            Err(e) => report.errors.push(format!("Nonce purge: {}", e)),
        }

        report.completed_at = Utc::now();
        report
    }
}

/// Report from running maintenance jobs
#[derive(Debug, Clone, Default)]
pub struct MaintenanceReport {
    pub nonces_purged: u64,
    pub errors: Vec<String>,
    pub completed_at: DateTime<Utc>,
}

/// Job execution errors
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

// =========================================================================
// Tests
// =========================================================================
