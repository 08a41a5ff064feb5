//! In-memory `ClusterAccessor` with scripted eventual consistency.
//!
//! Models the platform behaviors the teardown workflow has to survive:
//! objects that stay readable for a few reads after deletion was accepted,
//! volumes reclaimed by the platform when their claim goes away, volumes that
//! disappear between being listed and being deleted, objects stuck behind a
//! finalizer, and injected API failures. Every call is journaled so tests can
//! assert on ordering and on calls that must never happen.

#![allow(missing_docs)]

use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;

use crate::cluster::accessor::ClusterAccessor;
use crate::cluster::types::{DeletionTarget, StorageClaim, StorageVolume, TargetKind};
use crate::core::errors::{PvtdError, Result};

/// A call observed by the in-memory cluster, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClusterCall {
    ListClaims,
    ListClaimsIn(String),
    ListVolumes,
    Read(DeletionTarget),
    Delete(DeletionTarget),
    BulkDelete(String),
}

/// Remaining visibility of an object whose deletion was accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Terminating {
    /// Still returned by this many more point reads, then gone.
    Reads(u32),
    /// Never goes away (finalizer never clears).
    Stuck,
}

#[derive(Debug, Clone)]
struct Entry<T> {
    object: T,
    terminating: Option<Terminating>,
}

impl<T> Entry<T> {
    const fn live(object: T) -> Self {
        Self {
            object,
            terminating: None,
        }
    }
}

#[derive(Debug, Default)]
struct State {
    claims: Vec<Entry<StorageClaim>>,
    volumes: Vec<Entry<StorageVolume>>,
    lingering: HashMap<DeletionTarget, u32>,
    stuck: HashSet<DeletionTarget>,
    racing_volumes: HashSet<String>,
    cascade: bool,
    fail_claim_listing: bool,
    fail_volume_listing: bool,
    fail_namespace_listing: HashSet<String>,
    fail_deletes: HashSet<DeletionTarget>,
    fail_bulk_deletes: HashSet<String>,
    flaky_reads: HashMap<DeletionTarget, u32>,
    calls: Vec<ClusterCall>,
}

/// Scriptable in-memory cluster.
#[derive(Debug, Default)]
pub struct InMemoryCluster {
    state: Mutex<State>,
}

impl InMemoryCluster {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // ──────────────────── builders ────────────────────

    #[must_use]
    pub fn with_claim(self, claim: StorageClaim) -> Self {
        self.state.lock().claims.push(Entry::live(claim));
        self
    }

    #[must_use]
    pub fn with_volume(self, volume: StorageVolume) -> Self {
        self.state.lock().volumes.push(Entry::live(volume));
        self
    }

    /// Add a claim and a volume bound to each other.
    #[must_use]
    pub fn with_bound_pair(self, claim: &str, namespace: &str, volume: &str) -> Self {
        self.with_claim(StorageClaim::new(claim, namespace).bound_to(volume))
            .with_volume(StorageVolume::new(volume).bound_to(claim, namespace))
    }

    /// Deleting a claim also starts deletion of the volumes bound to it.
    #[must_use]
    pub fn with_cascading_reclaim(self) -> Self {
        self.state.lock().cascade = true;
        self
    }

    /// After deletion is accepted, the target stays readable for `reads`
    /// more point reads.
    #[must_use]
    pub fn lingering(self, target: DeletionTarget, reads: u32) -> Self {
        self.state.lock().lingering.insert(target, reads);
        self
    }

    /// Deletion is accepted but the target never disappears.
    #[must_use]
    pub fn stuck(self, target: DeletionTarget) -> Self {
        self.state.lock().stuck.insert(target);
        self
    }

    /// The platform removes this volume after it was listed but before an
    /// explicit delete reaches it.
    #[must_use]
    pub fn racing_volume(self, name: &str) -> Self {
        self.state.lock().racing_volumes.insert(name.to_string());
        self
    }

    #[must_use]
    pub fn failing_claim_listing(self) -> Self {
        self.state.lock().fail_claim_listing = true;
        self
    }

    #[must_use]
    pub fn failing_volume_listing(self) -> Self {
        self.state.lock().fail_volume_listing = true;
        self
    }

    #[must_use]
    pub fn failing_namespace_listing(self, namespace: &str) -> Self {
        self.state
            .lock()
            .fail_namespace_listing
            .insert(namespace.to_string());
        self
    }

    #[must_use]
    pub fn failing_delete(self, target: DeletionTarget) -> Self {
        self.state.lock().fail_deletes.insert(target);
        self
    }

    #[must_use]
    pub fn failing_bulk_delete(self, namespace: &str) -> Self {
        self.state
            .lock()
            .fail_bulk_deletes
            .insert(namespace.to_string());
        self
    }

    /// The next `count` reads of the target fail with a non-NotFound error.
    #[must_use]
    pub fn flaky_reads(self, target: DeletionTarget, count: u32) -> Self {
        self.state.lock().flaky_reads.insert(target, count);
        self
    }

    // ──────────────────── inspection ────────────────────

    /// Every call received so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<ClusterCall> {
        self.state.lock().calls.clone()
    }

    /// Number of delete requests (single or bulk) received so far.
    #[must_use]
    pub fn delete_calls(&self) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|c| matches!(c, ClusterCall::Delete(_) | ClusterCall::BulkDelete(_)))
            .count()
    }

    /// Whether the object is still present (live or terminating).
    #[must_use]
    pub fn contains(&self, target: &DeletionTarget) -> bool {
        let state = self.state.lock();
        match target {
            DeletionTarget::Claim { .. } => state.claims.iter().any(|e| e.object.target() == *target),
            DeletionTarget::Volume { .. } => {
                state.volumes.iter().any(|e| e.object.target() == *target)
            }
        }
    }
}

fn api_failure(operation: &'static str, details: &str) -> PvtdError {
    PvtdError::ClusterApi {
        operation,
        details: details.to_string(),
    }
}

impl State {
    fn termination_for(&self, target: &DeletionTarget) -> Option<Terminating> {
        if self.stuck.contains(target) {
            return Some(Terminating::Stuck);
        }
        self.lingering
            .get(target)
            .copied()
            .filter(|reads| *reads > 0)
            .map(Terminating::Reads)
    }

    /// Accept deletion of a present object. Returns false if it is absent.
    fn request_deletion(&mut self, target: &DeletionTarget) -> bool {
        let termination = self.termination_for(target);
        let found = match target {
            DeletionTarget::Claim { .. } => {
                mark_or_remove(&mut self.claims, target, termination, StorageClaim::target)
            }
            DeletionTarget::Volume { .. } => {
                mark_or_remove(&mut self.volumes, target, termination, StorageVolume::target)
            }
        };
        if found
            && self.cascade
            && let DeletionTarget::Claim { name, namespace } = target
        {
            let bound: Vec<DeletionTarget> = self
                .volumes
                .iter()
                .filter(|e| {
                    e.terminating.is_none()
                        && e.object.claim_ref.as_ref().is_some_and(|r| {
                            r.name == *name && r.namespace.as_deref().is_none_or(|ns| ns == namespace.as_str())
                        })
                })
                .map(|e| e.object.target())
                .collect();
            for volume in bound {
                self.request_deletion(&volume);
            }
        }
        found
    }

    /// Point read. Terminating objects consume one visible read per call.
    fn read(&mut self, target: &DeletionTarget) -> bool {
        match target {
            DeletionTarget::Claim { .. } => read_entry(&mut self.claims, target, StorageClaim::target),
            DeletionTarget::Volume { .. } => {
                read_entry(&mut self.volumes, target, StorageVolume::target)
            }
        }
    }
}

fn mark_or_remove<T>(
    entries: &mut Vec<Entry<T>>,
    target: &DeletionTarget,
    termination: Option<Terminating>,
    key: fn(&T) -> DeletionTarget,
) -> bool {
    let Some(idx) = entries.iter().position(|e| key(&e.object) == *target) else {
        return false;
    };
    if entries[idx].terminating.is_some() {
        return true;
    }
    match termination {
        Some(t) => entries[idx].terminating = Some(t),
        None => {
            entries.remove(idx);
        }
    }
    true
}

fn read_entry<T>(
    entries: &mut Vec<Entry<T>>,
    target: &DeletionTarget,
    key: fn(&T) -> DeletionTarget,
) -> bool {
    let Some(idx) = entries.iter().position(|e| key(&e.object) == *target) else {
        return false;
    };
    match entries[idx].terminating {
        None | Some(Terminating::Stuck) => true,
        Some(Terminating::Reads(0)) => {
            entries.remove(idx);
            false
        }
        Some(Terminating::Reads(n)) => {
            entries[idx].terminating = Some(Terminating::Reads(n - 1));
            true
        }
    }
}

impl ClusterAccessor for InMemoryCluster {
    fn list_claims(&self) -> Result<Vec<StorageClaim>> {
        let mut state = self.state.lock();
        state.calls.push(ClusterCall::ListClaims);
        if state.fail_claim_listing {
            return Err(api_failure("list claims", "injected listing failure"));
        }
        Ok(state.claims.iter().map(|e| e.object.clone()).collect())
    }

    fn list_claims_in(&self, namespace: &str) -> Result<Vec<StorageClaim>> {
        let mut state = self.state.lock();
        state.calls.push(ClusterCall::ListClaimsIn(namespace.to_string()));
        if state.fail_namespace_listing.contains(namespace) {
            return Err(api_failure(
                "list namespaced claims",
                "injected namespace listing failure",
            ));
        }
        Ok(state
            .claims
            .iter()
            .filter(|e| e.object.namespace == namespace)
            .map(|e| e.object.clone())
            .collect())
    }

    fn list_volumes(&self) -> Result<Vec<StorageVolume>> {
        let mut state = self.state.lock();
        state.calls.push(ClusterCall::ListVolumes);
        if state.fail_volume_listing {
            return Err(api_failure("list volumes", "injected listing failure"));
        }
        Ok(state.volumes.iter().map(|e| e.object.clone()).collect())
    }

    fn get_claim(&self, name: &str, namespace: &str) -> Result<StorageClaim> {
        let target = DeletionTarget::claim(name, namespace);
        let mut state = self.state.lock();
        state.calls.push(ClusterCall::Read(target.clone()));
        if let Some(remaining) = state.flaky_reads.get_mut(&target)
            && *remaining > 0
        {
            *remaining -= 1;
            return Err(api_failure("read claim", "injected read failure"));
        }
        if state.read(&target) {
            let claim = state
                .claims
                .iter()
                .find(|e| e.object.target() == target)
                .map(|e| e.object.clone());
            if let Some(claim) = claim {
                return Ok(claim);
            }
        }
        Err(PvtdError::not_found(TargetKind::Claim, name, Some(namespace)))
    }

    fn get_volume(&self, name: &str) -> Result<StorageVolume> {
        let target = DeletionTarget::volume(name);
        let mut state = self.state.lock();
        state.calls.push(ClusterCall::Read(target.clone()));
        if let Some(remaining) = state.flaky_reads.get_mut(&target)
            && *remaining > 0
        {
            *remaining -= 1;
            return Err(api_failure("read volume", "injected read failure"));
        }
        if state.read(&target) {
            let volume = state
                .volumes
                .iter()
                .find(|e| e.object.target() == target)
                .map(|e| e.object.clone());
            if let Some(volume) = volume {
                return Ok(volume);
            }
        }
        Err(PvtdError::not_found(TargetKind::Volume, name, None))
    }

    fn delete_claim(&self, name: &str, namespace: &str) -> Result<()> {
        let target = DeletionTarget::claim(name, namespace);
        let mut state = self.state.lock();
        state.calls.push(ClusterCall::Delete(target.clone()));
        if state.fail_deletes.contains(&target) {
            return Err(api_failure("delete claim", "injected delete failure"));
        }
        if state.request_deletion(&target) {
            Ok(())
        } else {
            Err(PvtdError::not_found(TargetKind::Claim, name, Some(namespace)))
        }
    }

    fn delete_volume(&self, name: &str) -> Result<()> {
        let target = DeletionTarget::volume(name);
        let mut state = self.state.lock();
        state.calls.push(ClusterCall::Delete(target.clone()));
        if state.fail_deletes.contains(&target) {
            return Err(api_failure("delete volume", "injected delete failure"));
        }
        if state.racing_volumes.remove(name) {
            state.volumes.retain(|e| e.object.name != name);
        }
        if state.request_deletion(&target) {
            Ok(())
        } else {
            Err(PvtdError::not_found(TargetKind::Volume, name, None))
        }
    }

    fn delete_claims_in(&self, namespace: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.calls.push(ClusterCall::BulkDelete(namespace.to_string()));
        if state.fail_bulk_deletes.contains(namespace) {
            return Err(api_failure("bulk delete claims", "injected bulk delete failure"));
        }
        let targets: Vec<DeletionTarget> = state
            .claims
            .iter()
            .filter(|e| e.object.namespace == namespace)
            .map(|e| e.object.target())
            .collect();
        for target in targets {
            state.request_deletion(&target);
        }
        Ok(())
    }
}
