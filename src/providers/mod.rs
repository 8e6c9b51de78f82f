//! Provider contract
//!
//! A provider is an external media manager (Radarr and friends) that owns the
//! item catalogue and can be asked to search for a better release. The cycle
//! only talks to providers through [`Provider`].

pub mod radarr;

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderResult;

pub use radarr::RadarrProvider;

/// Provider-side item identifier
pub type ItemId = i64;

/// Provider-side quality profile identifier
pub type ProfileId = i64;

/// Cutoff score per quality profile
pub type ProfileCutoffs = HashMap<ProfileId, i64>;

/// An item as returned by the provider's listing, before its score is known
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListedItem {
    pub id: ItemId,
    pub monitored: bool,
    pub has_file: bool,
    pub quality_profile_id: ProfileId,
}

/// A listed item together with the score of its current file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedItem {
    pub item_id: ItemId,
    pub monitored: bool,
    pub has_file: bool,
    pub quality_profile_id: ProfileId,
    pub current_score: i64,
}

impl TrackedItem {
    pub fn from_listed(item: &ListedItem, current_score: i64) -> Self {
        Self {
            item_id: item.id,
            monitored: item.monitored,
            has_file: item.has_file,
            quality_profile_id: item.quality_profile_id,
            current_score,
        }
    }
}

/// The four calls the upgrade cycle needs from a media manager
#[async_trait]
pub trait Provider: Send + Sync {
    /// Cutoff score for every quality profile the provider knows about
    async fn list_quality_profiles(&self) -> ProviderResult<ProfileCutoffs>;

    /// Every item in the provider's catalogue, in the provider's order
    async fn list_items(&self) -> ProviderResult<Vec<ListedItem>>;

    /// Score of the item's current file
    async fn get_item_score(&self, id: ItemId) -> ProviderResult<i64>;

    /// Ask the provider to search for new releases of the given items
    async fn dispatch_search(&self, ids: &[ItemId]) -> ProviderResult<()>;
}
