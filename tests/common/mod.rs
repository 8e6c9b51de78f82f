//! Shared fixtures for integration tests

#![allow(dead_code)]

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use upgradarr::error::{ProviderError, ProviderResult};
use upgradarr::providers::{ItemId, ListedItem, ProfileCutoffs, Provider};

/// In-memory provider that records every call
#[derive(Default)]
pub struct MockProvider {
    pub profiles: ProfileCutoffs,
    pub items: Vec<(ListedItem, i64)>,
    list_calls: AtomicUsize,
    score_calls: AtomicUsize,
    dispatched: Mutex<Vec<Vec<ItemId>>>,
    list_error: Mutex<Option<ProviderError>>,
    dispatch_error: Mutex<Option<ProviderError>>,
    score_errors: Mutex<Vec<ItemId>>,
}

impl MockProvider {
    pub fn new(profiles: ProfileCutoffs, items: Vec<(ListedItem, i64)>) -> Self {
        Self {
            profiles,
            items,
            ..Default::default()
        }
    }

    /// Provider with one profile (id 1, cutoff 100) and the given
    /// `(id, score)` items, all monitored with a file
    pub fn with_scores(scores: &[(ItemId, i64)]) -> Self {
        Self::new(
            ProfileCutoffs::from([(1, 100)]),
            scores.iter().map(|&(id, score)| (listed(id, 1), score)).collect(),
        )
    }

    pub fn fail_listing(&self, err: ProviderError) {
        *self.list_error.lock().unwrap() = Some(err);
    }

    pub fn fail_dispatch(&self, err: ProviderError) {
        *self.dispatch_error.lock().unwrap() = Some(err);
    }

    pub fn clear_dispatch_failure(&self) {
        *self.dispatch_error.lock().unwrap() = None;
    }

    pub fn fail_score_for(&self, id: ItemId) {
        self.score_errors.lock().unwrap().push(id);
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn score_calls(&self) -> usize {
        self.score_calls.load(Ordering::SeqCst)
    }

    pub fn dispatched(&self) -> Vec<Vec<ItemId>> {
        self.dispatched.lock().unwrap().clone()
    }
}

pub fn listed(id: ItemId, profile: i64) -> ListedItem {
    ListedItem {
        id,
        monitored: true,
        has_file: true,
        quality_profile_id: profile,
    }
}

#[async_trait]
impl Provider for MockProvider {
    async fn list_quality_profiles(&self) -> ProviderResult<ProfileCutoffs> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.list_error.lock().unwrap().clone() {
            return Err(err);
        }
        Ok(self.profiles.clone())
    }

    async fn list_items(&self) -> ProviderResult<Vec<ListedItem>> {
        if let Some(err) = self.list_error.lock().unwrap().clone() {
            return Err(err);
        }
        Ok(self.items.iter().map(|(item, _)| item.clone()).collect())
    }

    async fn get_item_score(&self, id: ItemId) -> ProviderResult<i64> {
        self.score_calls.fetch_add(1, Ordering::SeqCst);
        if self.score_errors.lock().unwrap().contains(&id) {
            return Err(ProviderError::transient(format!("score for {} unavailable", id)));
        }
        self.items
            .iter()
            .find(|(item, _)| item.id == id)
            .map(|(_, score)| *score)
            .ok_or_else(|| ProviderError::invalid_response(format!("unknown item {}", id)))
    }

    async fn dispatch_search(&self, ids: &[ItemId]) -> ProviderResult<()> {
        if let Some(err) = self.dispatch_error.lock().unwrap().clone() {
            return Err(err);
        }
        self.dispatched.lock().unwrap().push(ids.to_vec());
        Ok(())
    }
}
