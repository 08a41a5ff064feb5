//! Resource locator: list-then-filter lookups by name fragment.

use crate::cluster::accessor::ClusterAccessor;
use crate::cluster::types::{StorageClaim, StorageVolume};
use crate::core::errors::Result;

/// Finds claims and volumes by case-sensitive substring match.
///
/// An empty result is a normal answer. Only a failing list call is an error.
pub struct ResourceLocator<'a> {
    cluster: &'a dyn ClusterAccessor,
}

impl<'a> ResourceLocator<'a> {
    #[must_use]
    pub fn new(cluster: &'a dyn ClusterAccessor) -> Self {
        Self { cluster }
    }

    /// Claims in any namespace whose name contains `fragment`.
    pub fn find_claims_by_fragment(&self, fragment: &str) -> Result<Vec<StorageClaim>> {
        Ok(self
            .cluster
            .list_claims()?
            .into_iter()
            .filter(|claim| claim.name.contains(fragment))
            .collect())
    }

    /// Every claim in one namespace.
    pub fn find_claims_in_namespace(&self, namespace: &str) -> Result<Vec<StorageClaim>> {
        self.cluster.list_claims_in(namespace)
    }

    /// Volumes whose claim reference name contains `claim_name`.
    ///
    /// Unbound volumes never match.
    pub fn find_volumes_by_claim_name(&self, claim_name: &str) -> Result<Vec<StorageVolume>> {
        Ok(self
            .cluster
            .list_volumes()?
            .into_iter()
            .filter(|volume| volume.claim_name().is_some_and(|name| name.contains(claim_name)))
            .collect())
    }
}
