//! Deletion verifier: bounded polling for the absence of one target.
//!
//! Each attempt is a point read. A NotFound read confirms the deletion
//! immediately; a successful read or any other error means "still there" and
//! costs one attempt. Sleeps go through a [`Clock`] so tests run on virtual
//! time, and a [`Cancellation`] cuts the loop short when the campaign deadline
//! passes or the process is interrupted.

#![allow(missing_docs)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::cluster::accessor::ClusterAccessor;
use crate::cluster::types::DeletionTarget;
use crate::core::config::VerifyConfig;
use crate::logger::activity::{ActivityEvent, ActivityLoggerHandle};

// ──────────────────── policy ────────────────────

/// Attempt budget and spacing for one verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerifyPolicy {
    pub max_attempts: u32,
    pub interval: Duration,
}

impl Default for VerifyPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 30,
            interval: Duration::from_secs(1),
        }
    }
}

impl VerifyPolicy {
    #[must_use]
    pub const fn from_config(config: &VerifyConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            interval: config.interval(),
        }
    }

    /// Upper bound on time spent sleeping in one verification.
    #[must_use]
    pub fn worst_case(&self) -> Duration {
        self.interval * self.max_attempts.saturating_sub(1)
    }
}

// ──────────────────── clock ────────────────────

/// Source of time and the single suspension point of a campaign.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
    fn sleep(&self, duration: Duration);
}

/// Wall clock backed by `thread::sleep`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            thread::sleep(duration);
        }
    }
}

/// Virtual clock: `sleep` advances time instantly and is recorded.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    elapsed: Mutex<Duration>,
    sleeps: Mutex<Vec<Duration>>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            elapsed: Mutex::new(Duration::ZERO),
            sleeps: Mutex::new(Vec::new()),
        }
    }

    /// Virtual time elapsed since construction.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        *self.elapsed.lock()
    }

    /// Every sleep requested so far.
    #[must_use]
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().clone()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + *self.elapsed.lock()
    }

    fn sleep(&self, duration: Duration) {
        self.sleeps.lock().push(duration);
        *self.elapsed.lock() += duration;
    }
}

// ──────────────────── cancellation ────────────────────

/// Campaign-wide stop condition: an optional deadline plus an interrupt flag.
#[derive(Debug, Clone, Default)]
pub struct Cancellation {
    deadline: Option<Instant>,
    interrupted: Arc<AtomicBool>,
}

impl Cancellation {
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_deadline(mut self, deadline: Option<Instant>) -> Self {
        self.deadline = deadline;
        self
    }

    /// Share an interrupt flag (set by the signal handler).
    #[must_use]
    pub fn with_flag(mut self, interrupted: Arc<AtomicBool>) -> Self {
        self.interrupted = interrupted;
        self
    }

    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn interrupt(&self) {
        self.interrupted.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn is_cancelled(&self, now: Instant) -> bool {
        self.is_interrupted() || self.deadline.is_some_and(|deadline| now >= deadline)
    }

    /// `wanted`, capped at the time left before the deadline.
    #[must_use]
    pub fn cap(&self, now: Instant, wanted: Duration) -> Duration {
        self.deadline.map_or(wanted, |deadline| {
            wanted.min(deadline.saturating_duration_since(now))
        })
    }
}

// ──────────────────── outcome ────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationOutcome {
    Confirmed,
    TimedOut,
}

impl VerificationOutcome {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Confirmed => "confirmed",
            Self::TimedOut => "timed_out",
        }
    }
}

/// Result of one `await_absence` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verification {
    pub outcome: VerificationOutcome,
    /// Point reads issued.
    pub attempts: u32,
    /// Last non-NotFound read error seen, if the object never disappeared.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

// ──────────────────── verifier ────────────────────

pub struct DeletionVerifier<'a> {
    cluster: &'a dyn ClusterAccessor,
    clock: &'a dyn Clock,
    policy: VerifyPolicy,
    cancel: Option<&'a Cancellation>,
    logger: Option<&'a ActivityLoggerHandle>,
}

impl<'a> DeletionVerifier<'a> {
    #[must_use]
    pub fn new(cluster: &'a dyn ClusterAccessor, clock: &'a dyn Clock, policy: VerifyPolicy) -> Self {
        Self {
            cluster,
            clock,
            policy,
            cancel: None,
            logger: None,
        }
    }

    #[must_use]
    pub fn with_cancellation(mut self, cancel: &'a Cancellation) -> Self {
        self.cancel = Some(cancel);
        self
    }

    #[must_use]
    pub fn with_logger(mut self, logger: Option<&'a ActivityLoggerHandle>) -> Self {
        self.logger = logger;
        self
    }

    #[must_use]
    pub const fn policy(&self) -> VerifyPolicy {
        self.policy
    }

    /// Poll until the target is gone, the budget runs out, or the campaign is
    /// cancelled. Never sleeps after the last attempt.
    pub fn await_absence(&self, target: &DeletionTarget) -> Verification {
        let started = self.clock.now();
        let mut attempts = 0;
        let mut last_error = None;
        let mut outcome = VerificationOutcome::TimedOut;

        while attempts < self.policy.max_attempts {
            if self.cancelled() {
                break;
            }
            attempts += 1;
            match self.cluster.read_target(target) {
                Err(err) if err.is_not_found() => {
                    outcome = VerificationOutcome::Confirmed;
                    last_error = None;
                    break;
                }
                Err(err) => last_error = Some(err.to_string()),
                Ok(()) => last_error = None,
            }
            if attempts < self.policy.max_attempts {
                self.pause();
            }
        }

        if let Some(logger) = self.logger {
            let elapsed = self.clock.now().saturating_duration_since(started);
            logger.send(ActivityEvent::VerificationFinished {
                target: target.clone(),
                outcome,
                attempts,
                duration_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            });
        }

        Verification {
            outcome,
            attempts,
            last_error,
        }
    }

    fn cancelled(&self) -> bool {
        self.cancel
            .is_some_and(|cancel| cancel.is_cancelled(self.clock.now()))
    }

    fn pause(&self) {
        let wait = self.cancel.map_or(self.policy.interval, |cancel| {
            cancel.cap(self.clock.now(), self.policy.interval)
        });
        self.clock.sleep(wait);
    }
}
