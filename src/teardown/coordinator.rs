//! Claim deletion coordinator: delete matched claims, then their volumes.
//!
//! Volumes are looked up after the claims are gone rather than chained from
//! each claim, because the platform may reclaim a bound volume at any point
//! in that window. A volume delete that answers NotFound lost that race and
//! counts as success.
//!
//! Once the campaign is interrupted no further delete is issued. Reports for
//! targets already handled are kept on the entry, including when a Fatal-API
//! error ends the fragment early.

#![allow(missing_docs)]

use serde::{Deserialize, Serialize};

use crate::cluster::accessor::ClusterAccessor;
use crate::cluster::types::DeletionTarget;
use crate::core::errors::{PvtdError, Result};
use crate::logger::activity::{ActivityEvent, ActivityLoggerHandle};
use crate::teardown::locator::ResourceLocator;
use crate::teardown::verifier::{Cancellation, DeletionVerifier, VerificationOutcome};

/// What happened to one claim or volume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetReport {
    pub target: DeletionTarget,
    /// `None` in dry-run mode, where nothing is deleted.
    pub outcome: Option<VerificationOutcome>,
    pub attempts: u32,
    /// The delete call answered NotFound.
    pub already_absent: bool,
}

impl TargetReport {
    fn planned(target: DeletionTarget) -> Self {
        Self {
            target,
            outcome: None,
            attempts: 0,
            already_absent: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FragmentStatus {
    /// No claim name contains the fragment.
    NothingToDelete,
    Deleted,
    /// Dry run: targets were located but left alone.
    Planned,
    /// An interrupt stopped the fragment before all targets were deleted.
    Interrupted,
    /// A Fatal-API error aborted this fragment.
    Errored { code: String, message: String },
}

impl FragmentStatus {
    fn errored(err: &PvtdError) -> Self {
        Self::Errored {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

/// Per-fragment entry of a campaign result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FragmentEntry {
    pub fragment: String,
    #[serde(flatten)]
    pub status: FragmentStatus,
    pub claims: Vec<TargetReport>,
    pub volumes: Vec<TargetReport>,
}

impl FragmentEntry {
    fn new(fragment: &str, status: FragmentStatus) -> Self {
        Self {
            fragment: fragment.to_string(),
            status,
            claims: Vec::new(),
            volumes: Vec::new(),
        }
    }

    #[must_use]
    pub fn errored(fragment: &str, err: &PvtdError) -> Self {
        Self::new(fragment, FragmentStatus::errored(err))
    }

    /// Entry for a fragment the campaign never started on.
    #[must_use]
    pub fn interrupted(fragment: &str) -> Self {
        Self::new(fragment, FragmentStatus::Interrupted)
    }

    /// Every verified target in claim-then-volume order.
    pub fn targets(&self) -> impl Iterator<Item = &TargetReport> {
        self.claims.iter().chain(self.volumes.iter())
    }

    #[must_use]
    pub fn timed_out(&self) -> usize {
        self.targets()
            .filter(|t| t.outcome == Some(VerificationOutcome::TimedOut))
            .count()
    }
}

pub struct ClaimCoordinator<'a> {
    cluster: &'a dyn ClusterAccessor,
    verifier: &'a DeletionVerifier<'a>,
    cancel: Option<&'a Cancellation>,
    dry_run: bool,
    logger: Option<&'a ActivityLoggerHandle>,
}

impl<'a> ClaimCoordinator<'a> {
    #[must_use]
    pub fn new(cluster: &'a dyn ClusterAccessor, verifier: &'a DeletionVerifier<'a>) -> Self {
        Self {
            cluster,
            verifier,
            cancel: None,
            dry_run: false,
            logger: None,
        }
    }

    /// Stop issuing deletes once `cancel` reports an interrupt.
    #[must_use]
    pub const fn with_cancellation(mut self, cancel: &'a Cancellation) -> Self {
        self.cancel = Some(cancel);
        self
    }

    #[must_use]
    pub const fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    #[must_use]
    pub fn with_logger(mut self, logger: Option<&'a ActivityLoggerHandle>) -> Self {
        self.logger = logger;
        self
    }

    /// Delete and verify every claim matching `fragment`, then every volume
    /// still referencing a matching claim name.
    ///
    /// A Fatal-API error from any list or delete call ends the fragment with
    /// an `Errored` status; the reports gathered up to that point stay on the
    /// entry. Verification timeouts are recorded, not errors.
    pub fn delete_claim_and_volume(&self, fragment: &str) -> FragmentEntry {
        let mut entry = FragmentEntry::new(fragment, FragmentStatus::NothingToDelete);
        if let Err(err) = self.process(fragment, &mut entry) {
            entry.status = FragmentStatus::errored(&err);
        }
        entry
    }

    fn process(&self, fragment: &str, entry: &mut FragmentEntry) -> Result<()> {
        let locator = ResourceLocator::new(self.cluster);
        let claims = locator.find_claims_by_fragment(fragment)?;
        if claims.is_empty() {
            return Ok(());
        }

        if self.dry_run {
            let volumes = locator.find_volumes_by_claim_name(fragment)?;
            entry.status = FragmentStatus::Planned;
            entry.claims = claims.iter().map(|c| TargetReport::planned(c.target())).collect();
            entry.volumes = volumes.iter().map(|v| TargetReport::planned(v.target())).collect();
            return Ok(());
        }

        for claim in &claims {
            if self.interrupted() {
                entry.status = FragmentStatus::Interrupted;
                return Ok(());
            }
            entry.claims.push(self.delete_and_verify(claim.target(), fragment)?);
        }

        let volumes = locator.find_volumes_by_claim_name(fragment)?;
        for volume in &volumes {
            if self.interrupted() {
                entry.status = FragmentStatus::Interrupted;
                return Ok(());
            }
            entry.volumes.push(self.delete_and_verify(volume.target(), fragment)?);
        }

        entry.status = FragmentStatus::Deleted;
        Ok(())
    }

    fn interrupted(&self) -> bool {
        self.cancel.is_some_and(Cancellation::is_interrupted)
    }

    fn delete_and_verify(&self, target: DeletionTarget, fragment: &str) -> Result<TargetReport> {
        let already_absent = match self.cluster.delete_target(&target) {
            Ok(()) => {
                self.log(ActivityEvent::DeleteIssued {
                    target: target.clone(),
                    fragment: Some(fragment.to_string()),
                });
                false
            }
            Err(err) if err.is_not_found() => {
                self.log(ActivityEvent::DeleteRaced {
                    target: target.clone(),
                    fragment: fragment.to_string(),
                });
                true
            }
            Err(err) => return Err(err),
        };

        let verification = self.verifier.await_absence(&target);
        Ok(TargetReport {
            target,
            outcome: Some(verification.outcome),
            attempts: verification.attempts,
            already_absent,
        })
    }

    fn log(&self, event: ActivityEvent) {
        if let Some(logger) = self.logger {
            logger.send(event);
        }
    }
}
