//! Convenience re-exports for library consumers.
//!
//! ```rust,no_run
//! use pv_teardown::prelude::*;
//! ```

// Core
pub use crate::core::config::Config;
pub use crate::core::errors::{PvtdError, Result};

// Cluster
pub use crate::cluster::accessor::ClusterAccessor;
pub use crate::cluster::apiserver::KubeAccessor;
pub use crate::cluster::memory::InMemoryCluster;
pub use crate::cluster::types::{DeletionTarget, StorageClaim, StorageVolume, TargetKind};

// Teardown
pub use crate::teardown::coordinator::{ClaimCoordinator, FragmentEntry, FragmentStatus};
pub use crate::teardown::locator::ResourceLocator;
pub use crate::teardown::orchestrator::{Campaign, CampaignPlan, CampaignResult};
pub use crate::teardown::reporter::{ClusterStateReporter, Inventory};
pub use crate::teardown::sweeper::{NamespaceSweeper, SweepEntry, SweepStatus};
pub use crate::teardown::verifier::{
    Cancellation, Clock, DeletionVerifier, ManualClock, SystemClock, VerificationOutcome,
    VerifyPolicy,
};

// Logging
pub use crate::logger::activity::{ActivityEvent, ActivityLoggerHandle, spawn_logger};
