#![forbid(unsafe_code)]

//! PV Teardown (pvtd): deletes Kubernetes PersistentVolumeClaims and the
//! PersistentVolumes bound to them, then polls until removal is confirmed.
//!
//! One campaign per invocation, three phases:
//! 1. **Fragment pass**: delete and verify every claim whose name contains a
//!    configured fragment, then the volumes still referencing such a claim
//! 2. **Namespace sweep**: bulk-delete the claims left in configured namespaces
//! 3. **Inventory**: list whatever claims and volumes remain
//!
//! # Library usage
//!
//! ```rust,no_run
//! use pv_teardown::prelude::*;
//!
//! let cluster = InMemoryCluster::new().with_bound_pair("consul-data", "backend", "pv-0001");
//! let plan = CampaignPlan::from_config(&Config::default().campaign);
//! let result = Campaign::new(&cluster, &SystemClock, VerifyPolicy::default(), plan).run()?;
//! assert!(result.inventory.is_empty());
//! # Ok::<(), PvtdError>(())
//! ```

pub mod prelude;

pub mod cluster;
pub mod core;
pub mod logger;
#[cfg(feature = "signals")]
pub mod signals;
pub mod teardown;
