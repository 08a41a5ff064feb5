//! Cluster state reporter: final read-only accounting of leftovers.

use serde::{Deserialize, Serialize};

use crate::cluster::accessor::ClusterAccessor;
use crate::cluster::types::{StorageClaim, StorageVolume};
use crate::core::errors::Result;

/// Claims and volumes still present when the snapshot was taken.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inventory {
    pub volumes: Vec<StorageVolume>,
    pub claims: Vec<StorageClaim>,
}

impl Inventory {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.volumes.is_empty() && self.claims.is_empty()
    }
}

pub struct ClusterStateReporter<'a> {
    cluster: &'a dyn ClusterAccessor,
}

impl<'a> ClusterStateReporter<'a> {
    #[must_use]
    pub fn new(cluster: &'a dyn ClusterAccessor) -> Self {
        Self { cluster }
    }

    /// List every remaining volume and claim. Never deletes.
    pub fn snapshot(&self) -> Result<Inventory> {
        Ok(Inventory {
            volumes: self.cluster.list_volumes()?,
            claims: self.cluster.list_claims()?,
        })
    }
}
