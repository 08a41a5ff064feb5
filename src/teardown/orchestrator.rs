//! Cleanup orchestrator: fragment pass, namespace sweep pass, final inventory.
//!
//! Phases run strictly in sequence. Inside a phase, items are handed to up to
//! `concurrency` scoped worker threads through a crossbeam channel; finished
//! entries land in a mutex-guarded accumulator and are sorted back into plan
//! order, so the report is identical whatever order workers finish in.
//!
//! A Fatal-API error inside an item is recorded on that item and the campaign
//! moves on. Only the final inventory runs outside any item boundary, so its
//! failure is the one error `run` returns.
//!
//! An interrupt stops new deletes: items not yet started are reported as
//! interrupted, and the inventory still runs. A passed deadline only cuts
//! verification short.

#![allow(missing_docs)]

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::thread;
use std::time::Duration;

use crossbeam_channel::unbounded;
use parking_lot::Mutex;
use serde::Serialize;

use crate::cluster::accessor::ClusterAccessor;
use crate::core::config::CampaignConfig;
use crate::core::errors::Result;
use crate::logger::activity::{ActivityEvent, ActivityLoggerHandle};
use crate::teardown::coordinator::{ClaimCoordinator, FragmentEntry, FragmentStatus};
use crate::teardown::reporter::{ClusterStateReporter, Inventory};
use crate::teardown::sweeper::{NamespaceSweeper, SweepEntry, SweepStatus};
use crate::teardown::verifier::{
    Cancellation, Clock, DeletionVerifier, VerificationOutcome, VerifyPolicy,
};

/// What one campaign targets, passed explicitly into [`Campaign::new`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CampaignPlan {
    pub fragments: Vec<String>,
    pub namespaces: Vec<String>,
    pub concurrency: usize,
    pub deadline: Option<Duration>,
    pub dry_run: bool,
}

impl CampaignPlan {
    #[must_use]
    pub fn from_config(config: &CampaignConfig) -> Self {
        Self {
            fragments: config.fragments.clone(),
            namespaces: config.namespaces.clone(),
            concurrency: config.concurrency.max(1),
            deadline: config.deadline(),
            dry_run: config.dry_run,
        }
    }
}

/// Aggregate result of one campaign, entries in plan order.
#[derive(Debug, Clone, Serialize)]
pub struct CampaignResult {
    pub fragments: Vec<FragmentEntry>,
    pub namespaces: Vec<SweepEntry>,
    pub inventory: Inventory,
    pub dry_run: bool,
    #[serde(rename = "duration_ms", serialize_with = "serialize_millis")]
    pub duration: Duration,
}

/// Counts used for the summary line and the strict exit check.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CampaignSummary {
    pub confirmed: usize,
    pub timed_out: usize,
    pub errored: usize,
    pub interrupted: usize,
}

impl CampaignResult {
    #[must_use]
    pub fn summary(&self) -> CampaignSummary {
        let mut summary = CampaignSummary::default();
        for entry in &self.fragments {
            match entry.status {
                FragmentStatus::Errored { .. } => summary.errored += 1,
                FragmentStatus::Interrupted => summary.interrupted += 1,
                _ => {}
            }
            for report in entry.targets() {
                match report.outcome {
                    Some(VerificationOutcome::Confirmed) => summary.confirmed += 1,
                    Some(VerificationOutcome::TimedOut) => summary.timed_out += 1,
                    None => {}
                }
            }
        }
        for entry in &self.namespaces {
            match entry.status {
                SweepStatus::Errored { .. } => summary.errored += 1,
                SweepStatus::Interrupted => summary.interrupted += 1,
                _ => {}
            }
        }
        summary
    }

    /// No item errored or was interrupted, and no verification timed out.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        let summary = self.summary();
        summary.errored == 0 && summary.timed_out == 0 && summary.interrupted == 0
    }
}

fn serialize_millis<S: serde::Serializer>(duration: &Duration, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
}

pub struct Campaign<'a> {
    cluster: &'a dyn ClusterAccessor,
    clock: &'a dyn Clock,
    policy: VerifyPolicy,
    plan: CampaignPlan,
    interrupted: Option<Arc<AtomicBool>>,
    logger: Option<&'a ActivityLoggerHandle>,
    config_hash: Option<String>,
}

impl<'a> Campaign<'a> {
    #[must_use]
    pub fn new(
        cluster: &'a dyn ClusterAccessor,
        clock: &'a dyn Clock,
        policy: VerifyPolicy,
        plan: CampaignPlan,
    ) -> Self {
        Self {
            cluster,
            clock,
            policy,
            plan,
            interrupted: None,
            logger: None,
            config_hash: None,
        }
    }

    /// Stop issuing deletes and abandon verifications once this flag is set.
    #[must_use]
    pub fn with_interrupt_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.interrupted = Some(flag);
        self
    }

    #[must_use]
    pub fn with_logger(mut self, logger: Option<&'a ActivityLoggerHandle>) -> Self {
        self.logger = logger;
        self
    }

    /// Config hash recorded in the campaign-started event.
    #[must_use]
    pub fn with_config_hash(mut self, hash: String) -> Self {
        self.config_hash = Some(hash);
        self
    }

    #[must_use]
    pub const fn plan(&self) -> &CampaignPlan {
        &self.plan
    }

    pub fn run(&self) -> Result<CampaignResult> {
        let started = self.clock.now();
        // A deadline too far out to represent is no deadline at all.
        let mut cancel = Cancellation::none()
            .with_deadline(self.plan.deadline.and_then(|d| started.checked_add(d)));
        if let Some(flag) = &self.interrupted {
            cancel = cancel.with_flag(Arc::clone(flag));
        }

        self.log(ActivityEvent::CampaignStarted {
            version: env!("CARGO_PKG_VERSION").to_string(),
            config_hash: self.config_hash.clone().unwrap_or_default(),
            fragments: self.plan.fragments.len(),
            namespaces: self.plan.namespaces.len(),
            dry_run: self.plan.dry_run,
        });

        let verifier = DeletionVerifier::new(self.cluster, self.clock, self.policy)
            .with_cancellation(&cancel)
            .with_logger(self.logger);
        let coordinator = ClaimCoordinator::new(self.cluster, &verifier)
            .with_cancellation(&cancel)
            .dry_run(self.plan.dry_run)
            .with_logger(self.logger);
        let sweeper = NamespaceSweeper::new(self.cluster)
            .with_cancellation(&cancel)
            .dry_run(self.plan.dry_run)
            .with_logger(self.logger);

        let fragments = run_phase(&self.plan.fragments, self.plan.concurrency, |fragment| {
            if cancel.is_interrupted() {
                return FragmentEntry::interrupted(fragment);
            }
            let entry = coordinator.delete_claim_and_volume(fragment);
            if let FragmentStatus::Errored { code, message } = &entry.status {
                self.log_item_failure(fragment, code, message);
            }
            entry
        });

        let namespaces = run_phase(&self.plan.namespaces, self.plan.concurrency, |namespace| {
            if cancel.is_interrupted() {
                return SweepEntry::interrupted(namespace);
            }
            sweeper.sweep_namespace(namespace).unwrap_or_else(|err| {
                self.log_item_failure(namespace, err.code(), &err.to_string());
                SweepEntry::errored(namespace, &err)
            })
        });

        let inventory = ClusterStateReporter::new(self.cluster)
            .snapshot()
            .inspect_err(|err| {
                self.log(ActivityEvent::Error {
                    code: err.code().to_string(),
                    message: err.to_string(),
                });
            })?;

        let result = CampaignResult {
            fragments,
            namespaces,
            inventory,
            dry_run: self.plan.dry_run,
            duration: self.clock.now().saturating_duration_since(started),
        };

        let summary = result.summary();
        self.log(ActivityEvent::CampaignFinished {
            duration_ms: u64::try_from(result.duration.as_millis()).unwrap_or(u64::MAX),
            confirmed: summary.confirmed,
            timed_out: summary.timed_out,
            errored: summary.errored,
            interrupted: summary.interrupted,
        });
        Ok(result)
    }

    fn log_item_failure(&self, item: &str, code: &str, message: &str) {
        self.log(ActivityEvent::ItemFailed {
            item: item.to_string(),
            code: code.to_string(),
            message: message.to_string(),
        });
    }

    fn log(&self, event: ActivityEvent) {
        if let Some(logger) = self.logger {
            logger.send(event);
        }
    }
}

/// Run `work` over `items` on up to `concurrency` threads, results in input order.
fn run_phase<T, F>(items: &[String], concurrency: usize, work: F) -> Vec<T>
where
    T: Send,
    F: Fn(&str) -> T + Sync,
{
    let workers = concurrency.min(items.len());
    if workers <= 1 {
        return items.iter().map(|item| work(item)).collect();
    }

    let (tx, rx) = unbounded::<(usize, &str)>();
    for (index, item) in items.iter().enumerate() {
        let _ = tx.send((index, item.as_str()));
    }
    drop(tx);

    let done: Mutex<Vec<(usize, T)>> = Mutex::new(Vec::with_capacity(items.len()));
    thread::scope(|scope| {
        for _ in 0..workers {
            let rx = rx.clone();
            let done = &done;
            let work = &work;
            scope.spawn(move || {
                while let Ok((index, item)) = rx.recv() {
                    let entry = work(item);
                    done.lock().push((index, entry));
                }
            });
        }
    });

    let mut done = done.into_inner();
    done.sort_by_key(|(index, _)| *index);
    done.into_iter().map(|(_, entry)| entry).collect()
}
