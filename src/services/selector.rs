//! Upgrade candidate selection
//!
//! Decides which items are below their quality profile's cutoff. Used by the
//! cycle orchestrator when it repopulates an empty queue.

use crate::providers::{ItemId, ProfileCutoffs, TrackedItem};

/// Cutoff used for items whose profile has no registered cutoff.
///
/// Large enough that practically every scored item is below it, so items on an
/// unknown profile are still queued.
pub const UNMAPPED_PROFILE_CUTOFF: i64 = i64::MAX;

/// Selects upgrade candidates from a provider snapshot
pub struct CandidateSelector;

impl CandidateSelector {
    /// Ids of monitored items with a file whose score is below their cutoff.
    ///
    /// Keeps the listing order and does not de-duplicate.
    pub fn select(profiles: &ProfileCutoffs, items: &[TrackedItem]) -> Vec<ItemId> {
        items
            .iter()
            .filter(|item| item.monitored && item.has_file)
            .filter(|item| item.current_score < Self::cutoff_for(profiles, item.quality_profile_id))
            .map(|item| item.item_id)
            .collect()
    }

    /// Cutoff for a profile, falling back to [`UNMAPPED_PROFILE_CUTOFF`]
    pub fn cutoff_for(profiles: &ProfileCutoffs, profile_id: i64) -> i64 {
        profiles
            .get(&profile_id)
            .copied()
            .unwrap_or(UNMAPPED_PROFILE_CUTOFF)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: i64, profile: i64, score: i64) -> TrackedItem {
        TrackedItem {
            item_id: id,
            monitored: true,
            has_file: true,
            quality_profile_id: profile,
            current_score: score,
        }
    }

    // =========================================================================
    // Cutoff Comparison
    // =========================================================================

    #[test]
    fn test_below_at_and_above_cutoff() {
        let profiles = ProfileCutoffs::from([(1, 100)]);
        let items = vec![item(1, 1, 99), item(2, 1, 100), item(3, 1, 101)];

        assert_eq!(CandidateSelector::select(&profiles, &items), vec![1]);
    }

    #[test]
    fn test_unmapped_profile_uses_sentinel() {
        const PROFILE_A: i64 = 1;
        const PROFILE_B: i64 = 2;
        let profiles = ProfileCutoffs::from([(PROFILE_A, 100)]);
        let items = vec![
            item(10, PROFILE_A, 80),  // X
            item(11, PROFILE_A, 120), // Y
            item(12, PROFILE_B, 50),  // Z
        ];

        assert_eq!(CandidateSelector::select(&profiles, &items), vec![10, 12]);
    }

    #[test]
    fn test_unmapped_profile_at_sentinel_is_excluded() {
        let profiles = ProfileCutoffs::new();
        let items = vec![item(1, 9, UNMAPPED_PROFILE_CUTOFF), item(2, 9, 0)];

        assert_eq!(CandidateSelector::select(&profiles, &items), vec![2]);
    }

    #[test]
    fn test_negative_scores() {
        let profiles = ProfileCutoffs::from([(1, 0)]);
        let items = vec![item(1, 1, -50), item(2, 1, 0)];

        assert_eq!(CandidateSelector::select(&profiles, &items), vec![1]);
    }

    // =========================================================================
    // Filtering and Ordering
    // =========================================================================

    #[test]
    fn test_unmonitored_and_fileless_items_are_skipped() {
        let profiles = ProfileCutoffs::from([(1, 100)]);
        let mut unmonitored = item(1, 1, 0);
        unmonitored.monitored = false;
        let mut missing_file = item(2, 1, 0);
        missing_file.has_file = false;
        let items = vec![unmonitored, missing_file, item(3, 1, 0)];

        assert_eq!(CandidateSelector::select(&profiles, &items), vec![3]);
    }

    #[test]
    fn test_listing_order_and_duplicates_preserved() {
        let profiles = ProfileCutoffs::from([(1, 100)]);
        let items = vec![item(30, 1, 0), item(10, 1, 0), item(30, 1, 0)];

        assert_eq!(CandidateSelector::select(&profiles, &items), vec![30, 10, 30]);
    }

    #[test]
    fn test_empty_listing() {
        assert!(CandidateSelector::select(&ProfileCutoffs::new(), &[]).is_empty());
    }
}
