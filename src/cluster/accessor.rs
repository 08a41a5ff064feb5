//! Narrow contract for reading and deleting storage objects.
//!
//! Every call either succeeds or fails with a classified error: a missing
//! object is `PvtdError::NotFound`, anything else (authorization,
//! connectivity, malformed request) is `PvtdError::ClusterApi`. Callers branch
//! on `PvtdError::is_not_found`, never on message text.

use crate::cluster::types::{DeletionTarget, StorageClaim, StorageVolume};
use crate::core::errors::Result;

/// List/get/delete surface of the orchestration platform.
pub trait ClusterAccessor: Send + Sync {
    /// All claims across every namespace.
    fn list_claims(&self) -> Result<Vec<StorageClaim>>;

    /// Claims scoped to one namespace.
    fn list_claims_in(&self, namespace: &str) -> Result<Vec<StorageClaim>>;

    /// All volumes (cluster-scoped).
    fn list_volumes(&self) -> Result<Vec<StorageVolume>>;

    /// Point read of one claim.
    fn get_claim(&self, name: &str, namespace: &str) -> Result<StorageClaim>;

    /// Point read of one volume.
    fn get_volume(&self, name: &str) -> Result<StorageVolume>;

    /// Request deletion of one claim. Returns once the request is accepted.
    fn delete_claim(&self, name: &str, namespace: &str) -> Result<()>;

    /// Request deletion of one volume. Returns once the request is accepted.
    fn delete_volume(&self, name: &str) -> Result<()>;

    /// Request deletion of every claim in a namespace in one call.
    fn delete_claims_in(&self, namespace: &str) -> Result<()>;

    /// Existence read dispatched on the target kind.
    fn read_target(&self, target: &DeletionTarget) -> Result<()> {
        match target {
            DeletionTarget::Claim { name, namespace } => self.get_claim(name, namespace).map(drop),
            DeletionTarget::Volume { name } => self.get_volume(name).map(drop),
        }
    }

    /// Delete dispatched on the target kind.
    fn delete_target(&self, target: &DeletionTarget) -> Result<()> {
        match target {
            DeletionTarget::Claim { name, namespace } => self.delete_claim(name, namespace),
            DeletionTarget::Volume { name } => self.delete_volume(name),
        }
    }
}
