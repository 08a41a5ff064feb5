//! Namespace sweeper: bulk-delete whatever claims remain in a namespace.
//!
//! Sweeps are best-effort cleanup of stragglers. The bulk delete is not
//! verified per claim; leftovers show up in the final inventory instead.
//! No bulk delete is issued once the campaign is interrupted.

#![allow(missing_docs)]

use serde::{Deserialize, Serialize};

use crate::cluster::accessor::ClusterAccessor;
use crate::core::errors::{PvtdError, Result};
use crate::logger::activity::{ActivityEvent, ActivityLoggerHandle};
use crate::teardown::locator::ResourceLocator;
use crate::teardown::verifier::Cancellation;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SweepStatus {
    NoClaims,
    /// Bulk delete accepted for these claims.
    Swept { claims: Vec<String> },
    /// Dry run: these claims would be bulk-deleted.
    Planned { claims: Vec<String> },
    /// Interrupted before the bulk delete went out.
    Interrupted,
    Errored { code: String, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepEntry {
    pub namespace: String,
    #[serde(flatten)]
    pub status: SweepStatus,
}

impl SweepEntry {
    #[must_use]
    pub fn errored(namespace: &str, err: &PvtdError) -> Self {
        Self {
            namespace: namespace.to_string(),
            status: SweepStatus::Errored {
                code: err.code().to_string(),
                message: err.to_string(),
            },
        }
    }

    #[must_use]
    pub fn interrupted(namespace: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            status: SweepStatus::Interrupted,
        }
    }
}

pub struct NamespaceSweeper<'a> {
    cluster: &'a dyn ClusterAccessor,
    cancel: Option<&'a Cancellation>,
    dry_run: bool,
    logger: Option<&'a ActivityLoggerHandle>,
}

impl<'a> NamespaceSweeper<'a> {
    #[must_use]
    pub fn new(cluster: &'a dyn ClusterAccessor) -> Self {
        Self {
            cluster,
            cancel: None,
            dry_run: false,
            logger: None,
        }
    }

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

    /// List the namespace's claims and, if any remain, delete them in one call.
    pub fn sweep_namespace(&self, namespace: &str) -> Result<SweepEntry> {
        let claims: Vec<String> = ResourceLocator::new(self.cluster)
            .find_claims_in_namespace(namespace)?
            .into_iter()
            .map(|claim| claim.name)
            .collect();

        let status = if claims.is_empty() {
            SweepStatus::NoClaims
        } else if self.dry_run {
            SweepStatus::Planned { claims }
        } else if self.cancel.is_some_and(Cancellation::is_interrupted) {
            SweepStatus::Interrupted
        } else {
            self.cluster.delete_claims_in(namespace)?;
            if let Some(logger) = self.logger {
                logger.send(ActivityEvent::NamespaceSwept {
                    namespace: namespace.to_string(),
                    claims: claims.len(),
                });
            }
            SweepStatus::Swept { claims }
        };

        Ok(SweepEntry {
            namespace: namespace.to_string(),
            status,
        })
    }
}
