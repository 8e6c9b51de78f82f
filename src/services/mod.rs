//! Upgrade selection and cycle orchestration

pub mod cycle;
pub mod selector;
pub mod upgrade;

pub use cycle::{CycleOutcome, CycleReport, run_provider_cycle};
pub use selector::{CandidateSelector, UNMAPPED_PROFILE_CUTOFF};
pub use upgrade::{CycleSummary, ProviderSlot, QueueStatus, UpgradeService};
