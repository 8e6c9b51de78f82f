//! Per-provider upgrade cycle
//!
//! One call runs one pass for one provider:
//! 1. If the queue is empty, list profiles and items and enqueue the candidates
//! 2. Take up to `max_batch_size` ids from the queue
//! 3. Ask the provider to search for them
//! 4. Remove them from the queue only once the provider accepted the search
//!
//! Provider failures are logged and end the step they happened in; the queue
//! is left as it was so the next tick picks up where this one stopped.
//! Storage failures are returned to the caller.

use tracing::{debug, info, warn};

use crate::db::QueueRepository;
use crate::error::{ProviderError, ProviderErrorKind};
use crate::providers::{ItemId, ListedItem, Provider, TrackedItem};
use crate::services::selector::CandidateSelector;

/// Where a provider's cycle ended up
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Queue was (still) empty after the repopulation step
    NothingToProcess,
    /// Batch was accepted and removed from the queue
    Dispatched { count: usize, remaining: i64 },
    /// Provider rejected the batch; it stays queued unchanged
    DispatchFailed { count: usize },
}

/// Result of [`run_provider_cycle`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    /// Whether the provider listing was queried this cycle
    pub repopulated: bool,
    /// Rows newly inserted by the repopulation
    pub enqueued: u64,
    pub outcome: CycleOutcome,
}

/// Run one cycle for a single provider
pub async fn run_provider_cycle(
    provider_name: &str,
    provider: &dyn Provider,
    queue: &QueueRepository,
    max_batch_size: usize,
) -> Result<CycleReport, sqlx::Error> {
    let queued = queue.count().await?;
    let mut repopulated = false;
    let mut enqueued = 0;

    if queued == 0 {
        repopulated = true;
        match find_candidates(provider_name, provider).await {
            Ok(candidates) => {
                enqueued = queue.insert_many(&candidates).await?;
                info!(
                    provider = %provider_name,
                    candidates = candidates.len(),
                    enqueued,
                    "Upgrade queue repopulated"
                );
            }
            Err(e) => log_provider_error(provider_name, "repopulate", &e),
        }
    } else {
        debug!(
            provider = %provider_name,
            queued,
            "Queue not empty, skipping repopulation"
        );
    }

    let batch = queue.select_batch(max_batch_size).await?;

    if batch.is_empty() {
        info!(provider = %provider_name, "Nothing to process");
        return Ok(CycleReport {
            repopulated,
            enqueued,
            outcome: CycleOutcome::NothingToProcess,
        });
    }

    let outcome = match provider.dispatch_search(&batch).await {
        Ok(()) => {
            queue.delete_many(&batch).await?;
            let remaining = queue.count().await?;
            info!(
                provider = %provider_name,
                dispatched = batch.len(),
                remaining,
                "Search dispatched"
            );
            CycleOutcome::Dispatched {
                count: batch.len(),
                remaining,
            }
        }
        Err(e) => {
            log_provider_error(provider_name, "dispatch", &e);
            CycleOutcome::DispatchFailed { count: batch.len() }
        }
    };

    Ok(CycleReport {
        repopulated,
        enqueued,
        outcome,
    })
}

/// Fetch a fresh snapshot from the provider and run the selector over it
async fn find_candidates(
    provider_name: &str,
    provider: &dyn Provider,
) -> Result<Vec<ItemId>, ProviderError> {
    let profiles = provider.list_quality_profiles().await?;
    let listed = provider.list_items().await?;

    let tracked = score_items(provider_name, provider, &listed).await;
    let candidates = CandidateSelector::select(&profiles, &tracked);

    debug!(
        provider = %provider_name,
        profiles = profiles.len(),
        listed = listed.len(),
        scored = tracked.len(),
        candidates = candidates.len(),
        "Candidate selection complete"
    );

    Ok(candidates)
}

/// Look up scores for the items the selector could pick. Items whose score
/// cannot be fetched are left out of this repopulation.
async fn score_items(
    provider_name: &str,
    provider: &dyn Provider,
    listed: &[ListedItem],
) -> Vec<TrackedItem> {
    let mut tracked = Vec::new();

    for item in listed.iter().filter(|i| i.monitored && i.has_file) {
        match provider.get_item_score(item.id).await {
            Ok(score) => tracked.push(TrackedItem::from_listed(item, score)),
            Err(e) => {
                warn!(
                    provider = %provider_name,
                    item_id = item.id,
                    kind = %e.kind,
                    error = %e,
                    "Failed to fetch item score, skipping item"
                );
            }
        }
    }

    tracked
}

fn log_provider_error(provider_name: &str, step: &'static str, err: &ProviderError) {
    match err.kind {
        ProviderErrorKind::Transient => warn!(
            provider = %provider_name,
            step,
            error = %err,
            "Provider unavailable, queue left for next cycle"
        ),
        ProviderErrorKind::Configuration => tracing::error!(
            provider = %provider_name,
            step,
            error = %err,
            "Provider rejected credentials or endpoint"
        ),
        ProviderErrorKind::InvalidResponse => tracing::error!(
            provider = %provider_name,
            step,
            error = %err,
            "Provider returned an unusable response"
        ),
    }
}
