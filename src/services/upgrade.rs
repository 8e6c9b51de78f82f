//! Upgrade service
//!
//! Runs one cycle across every configured provider, one after another. Each
//! provider gets its own queue; a provider that fails or is misconfigured is
//! logged and skipped while the others continue. Only a storage failure ends
//! the pass.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use tracing::{debug, info};

use crate::config::{ProviderConfig, ProviderKind};
use crate::db::Database;
use crate::error::{ProviderError, UpgradeError, UpgradeResult};
use crate::providers::{Provider, RadarrProvider};
use crate::services::cycle::{CycleOutcome, CycleReport, run_provider_cycle};

/// A provider ready to take part in a cycle
#[derive(Clone)]
pub struct ProviderSlot {
    pub name: String,
    pub max_batch_size: usize,
    pub provider: Arc<dyn Provider>,
}

/// Totals for one multi-provider pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleSummary {
    /// Providers whose cycle ran to completion
    pub processed: usize,
    /// Enabled providers skipped because of their configuration
    pub skipped: usize,
    /// Items dispatched across all providers
    pub dispatched: usize,
    /// Providers whose dispatch was rejected this pass
    pub failed_dispatches: usize,
}

impl CycleSummary {
    fn record(&mut self, report: &CycleReport) {
        self.processed += 1;
        match report.outcome {
            CycleOutcome::Dispatched { count, .. } => self.dispatched += count,
            CycleOutcome::DispatchFailed { .. } => self.failed_dispatches += 1,
            CycleOutcome::NothingToProcess => {}
        }
    }
}

/// Queue size of one provider, as shown by `upgradarr status`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueStatus {
    pub provider: String,
    pub enabled: bool,
    pub queued: i64,
}

/// Service owning the queue database and the shared HTTP client
pub struct UpgradeService {
    db: Database,
    http: Client,
}

impl UpgradeService {
    /// Create a new upgrade service
    pub fn new(db: Database, http_timeout: Duration) -> UpgradeResult<Self> {
        let http = Client::builder()
            .timeout(http_timeout)
            .build()
            .map_err(ProviderError::from)?;

        Ok(Self { db, http })
    }

    /// Run one cycle for every enabled provider in `providers`
    pub async fn run_cycle(&self, providers: &[ProviderConfig]) -> UpgradeResult<CycleSummary> {
        let mut slots = Vec::new();
        let mut skipped = 0;

        for config in providers {
            if !config.enabled {
                debug!(provider = %config.name, "Provider disabled, skipping");
                continue;
            }

            match self.build_slot(config) {
                Ok(slot) => slots.push(slot),
                Err(e) => {
                    e.log(&config.name);
                    skipped += 1;
                }
            }
        }

        let mut summary = self.run_slots(&slots).await?;
        summary.skipped += skipped;
        Ok(summary)
    }

    /// Run one cycle for each slot, in order
    pub async fn run_slots(&self, slots: &[ProviderSlot]) -> UpgradeResult<CycleSummary> {
        let mut summary = CycleSummary::default();

        info!(providers = slots.len(), "Starting upgrade cycle");

        for slot in slots {
            let queue = self.db.queue(&slot.name).await.map_err(|e| {
                let err = UpgradeError::from(e);
                err.log(&slot.name);
                err
            })?;

            let report = run_provider_cycle(&slot.name, slot.provider.as_ref(), &queue, slot.max_batch_size)
                .await
                .map_err(|e| {
                    let err = UpgradeError::from(e);
                    err.log(&slot.name);
                    err
                })?;

            debug!(
                provider = %slot.name,
                repopulated = report.repopulated,
                enqueued = report.enqueued,
                outcome = ?report.outcome,
                "Provider cycle finished"
            );
            summary.record(&report);
        }

        info!(
            processed = summary.processed,
            dispatched = summary.dispatched,
            failed_dispatches = summary.failed_dispatches,
            "Upgrade cycle complete"
        );

        Ok(summary)
    }

    /// Queue sizes for every configured provider
    pub async fn queue_status(&self, providers: &[ProviderConfig]) -> UpgradeResult<Vec<QueueStatus>> {
        let mut statuses = Vec::with_capacity(providers.len());

        for config in providers {
            let queue = self.db.queue(&config.name).await?;
            statuses.push(QueueStatus {
                provider: config.name.clone(),
                enabled: config.enabled,
                queued: queue.count().await?,
            });
        }

        Ok(statuses)
    }

    fn build_slot(&self, config: &ProviderConfig) -> UpgradeResult<ProviderSlot> {
        let (url, api_key) = config.connection()?;

        let provider: Arc<dyn Provider> = match config.kind {
            ProviderKind::Radarr => Arc::new(RadarrProvider::with_client(url, api_key, self.http.clone())),
        };

        Ok(ProviderSlot {
            name: config.name.clone(),
            max_batch_size: config.batch_size,
            provider,
        })
    }
}
