//! Activity logger: a dedicated thread owns the `JsonlWriter`.
//!
//! Campaign workers send `ActivityEvent`s over a bounded crossbeam channel.
//! `send()` uses `try_send()` so a verifier poll loop is never held up by
//! logging back-pressure; overflow is counted and reported on the next write.

#![allow(missing_docs)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};

use crate::cluster::types::DeletionTarget;
use crate::core::errors::{PvtdError, Result};
use crate::logger::jsonl::{EventType, JsonlConfig, JsonlWriter, LogEntry, Severity};
use crate::teardown::verifier::VerificationOutcome;

const CHANNEL_CAPACITY: usize = 1024;

// ──────────────────── public event type ────────────────────

/// Events emitted while a campaign runs.
#[derive(Debug, Clone)]
pub enum ActivityEvent {
    CampaignStarted {
        version: String,
        config_hash: String,
        fragments: usize,
        namespaces: usize,
        dry_run: bool,
    },
    CampaignFinished {
        duration_ms: u64,
        confirmed: usize,
        timed_out: usize,
        errored: usize,
        interrupted: usize,
    },
    DeleteIssued {
        target: DeletionTarget,
        fragment: Option<String>,
    },
    /// Volume delete answered "not found": the cascade got there first.
    DeleteRaced {
        target: DeletionTarget,
        fragment: String,
    },
    VerificationFinished {
        target: DeletionTarget,
        outcome: VerificationOutcome,
        attempts: u32,
        duration_ms: u64,
    },
    NamespaceSwept {
        namespace: String,
        claims: usize,
    },
    ItemFailed {
        item: String,
        code: String,
        message: String,
    },
    Error {
        code: String,
        message: String,
    },
    /// Sentinel to request graceful shutdown of the logger thread.
    Shutdown,
}

// ──────────────────── public handle ────────────────────

/// Cheaply-cloneable handle for sending log events from any worker.
#[derive(Clone)]
pub struct ActivityLoggerHandle {
    tx: Sender<ActivityEvent>,
    dropped_events: Arc<AtomicU64>,
}

impl ActivityLoggerHandle {
    /// Send an event to the logger thread. Non-blocking.
    pub fn send(&self, event: ActivityEvent) {
        if let Err(TrySendError::Full(_)) = self.tx.try_send(event) {
            self.dropped_events.fetch_add(1, Ordering::Relaxed);
        }
        // Disconnected is fine during shutdown.
    }

    /// Number of events dropped due to channel back-pressure.
    pub fn dropped_events(&self) -> u64 {
        self.dropped_events.load(Ordering::Relaxed)
    }

    /// Request graceful shutdown. Join the thread handle to wait for the flush.
    pub fn shutdown(&self) {
        let _ = self.tx.send(ActivityEvent::Shutdown);
    }
}

/// Options for the activity logger thread.
pub struct ActivityLoggerConfig {
    pub jsonl_config: JsonlConfig,
    pub channel_capacity: usize,
}

impl Default for ActivityLoggerConfig {
    fn default() -> Self {
        Self {
            jsonl_config: JsonlConfig::default(),
            channel_capacity: CHANNEL_CAPACITY,
        }
    }
}

// ──────────────────── spawn ────────────────────

/// Spawn the logger thread and return a handle plus its join handle.
///
/// The thread runs until `shutdown()` is called or every handle is dropped.
pub fn spawn_logger(
    config: ActivityLoggerConfig,
) -> Result<(ActivityLoggerHandle, thread::JoinHandle<()>)> {
    let (tx, rx) = bounded::<ActivityEvent>(config.channel_capacity);
    let dropped = Arc::new(AtomicU64::new(0));
    let dropped_clone = Arc::clone(&dropped);

    let handle = ActivityLoggerHandle {
        tx,
        dropped_events: dropped,
    };

    let join = thread::Builder::new()
        .name("pvtd-logger".to_string())
        .spawn(move || logger_thread_main(rx, config.jsonl_config, dropped_clone))
        .map_err(|e| PvtdError::Runtime {
            details: format!("failed to spawn logger thread: {e}"),
        })?;

    Ok((handle, join))
}

#[allow(clippy::needless_pass_by_value)]
fn logger_thread_main(rx: Receiver<ActivityEvent>, jsonl_config: JsonlConfig, dropped: Arc<AtomicU64>) {
    let mut jsonl = JsonlWriter::open(jsonl_config);

    while let Ok(event) = rx.recv() {
        let d = dropped.swap(0, Ordering::Relaxed);
        if d > 0 {
            let mut warn = LogEntry::new(EventType::Error, Severity::Warning);
            warn.details = Some(format!("{d} log events dropped due to back-pressure"));
            jsonl.write_entry(&warn);
        }

        if matches!(event, ActivityEvent::Shutdown) {
            break;
        }
        if let Some(entry) = event_to_log_entry(&event) {
            jsonl.write_entry(&entry);
        }
    }

    jsonl.flush();
    jsonl.fsync();
}

// ──────────────────── event conversion ────────────────────

fn with_target(mut entry: LogEntry, target: &DeletionTarget) -> LogEntry {
    entry.kind = Some(target.kind());
    entry.name = Some(target.name().to_string());
    entry.namespace = target.namespace().map(str::to_string);
    entry
}

fn event_to_log_entry(event: &ActivityEvent) -> Option<LogEntry> {
    let entry = match event {
        ActivityEvent::CampaignStarted {
            version,
            config_hash,
            fragments,
            namespaces,
            dry_run,
        } => {
            let mut e = LogEntry::new(EventType::CampaignStart, Severity::Info);
            e.details = Some(format!(
                "version={version} config_hash={config_hash} fragments={fragments} namespaces={namespaces} dry_run={dry_run}"
            ));
            e.ok = Some(true);
            e
        }
        ActivityEvent::CampaignFinished {
            duration_ms,
            confirmed,
            timed_out,
            errored,
            interrupted,
        } => {
            let severity = if *errored > 0 || *timed_out > 0 || *interrupted > 0 {
                Severity::Warning
            } else {
                Severity::Info
            };
            let mut e = LogEntry::new(EventType::CampaignFinish, severity);
            e.duration_ms = Some(*duration_ms);
            e.details = Some(format!(
                "confirmed={confirmed} timed_out={timed_out} errored={errored} interrupted={interrupted}"
            ));
            e.ok = Some(*errored == 0);
            e
        }
        ActivityEvent::DeleteIssued { target, fragment } => {
            let mut e = with_target(LogEntry::new(EventType::DeleteIssued, Severity::Info), target);
            e.fragment.clone_from(fragment);
            e.ok = Some(true);
            e
        }
        ActivityEvent::DeleteRaced { target, fragment } => {
            let mut e = with_target(LogEntry::new(EventType::DeleteRace, Severity::Info), target);
            e.fragment = Some(fragment.clone());
            e.details = Some("already absent on delete".to_string());
            e.ok = Some(true);
            e
        }
        ActivityEvent::VerificationFinished {
            target,
            outcome,
            attempts,
            duration_ms,
        } => {
            let confirmed = matches!(outcome, VerificationOutcome::Confirmed);
            let severity = if confirmed {
                Severity::Info
            } else {
                Severity::Warning
            };
            let mut e = with_target(LogEntry::new(EventType::VerifyComplete, severity), target);
            e.outcome = Some(outcome.label().to_string());
            e.attempts = Some(*attempts);
            e.duration_ms = Some(*duration_ms);
            e.ok = Some(confirmed);
            e
        }
        ActivityEvent::NamespaceSwept { namespace, claims } => {
            let mut e = LogEntry::new(EventType::NamespaceSweep, Severity::Info);
            e.namespace = Some(namespace.clone());
            e.details = Some(format!("claims={claims}"));
            e.ok = Some(true);
            e
        }
        ActivityEvent::ItemFailed {
            item,
            code,
            message,
        } => {
            let mut e = LogEntry::new(EventType::ItemFailed, Severity::Warning);
            e.details = Some(format!("item={item}"));
            e.error_code = Some(code.clone());
            e.error_message = Some(message.clone());
            e.ok = Some(false);
            e
        }
        ActivityEvent::Error { code, message } => {
            let mut e = LogEntry::new(EventType::Error, Severity::Critical);
            e.error_code = Some(code.clone());
            e.error_message = Some(message.clone());
            e.ok = Some(false);
            e
        }
        ActivityEvent::Shutdown => return None,
    };
    Some(entry)
}

// ──────────────────── tests ────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(dir: &std::path::Path, channel_capacity: usize) -> ActivityLoggerConfig {
        ActivityLoggerConfig {
            jsonl_config: JsonlConfig {
                path: dir.join("test.jsonl"),
                fallback_path: None,
                max_size_bytes: 10 * 1024 * 1024,
                max_rotated_files: 3,
                fsync_interval_secs: 60,
            },
            channel_capacity,
        }
    }

    #[test]
    fn spawn_and_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let (handle, join) = spawn_logger(test_config(dir.path(), 64)).unwrap();
        handle.send(ActivityEvent::CampaignStarted {
            version: "0.1.0".to_string(),
            config_hash: "abc".to_string(),
            fragments: 2,
            namespaces: 3,
            dry_run: false,
        });
        handle.shutdown();
        join.join().unwrap();

        let contents = std::fs::read_to_string(dir.path().join("test.jsonl")).unwrap();
        assert!(contents.contains("campaign_start"));
        assert!(contents.contains("config_hash=abc"));
    }

    #[test]
    fn events_from_cloned_handles_are_all_logged() {
        let dir = tempfile::tempdir().unwrap();
        let (handle, join) = spawn_logger(test_config(dir.path(), 64)).unwrap();
        let h2 = handle.clone();

        handle.send(ActivityEvent::DeleteIssued {
            target: DeletionTarget::claim("consul-data", "backend"),
            fragment: Some("consul".to_string()),
        });
        h2.send(ActivityEvent::VerificationFinished {
            target: DeletionTarget::volume("pv-0001"),
            outcome: VerificationOutcome::TimedOut,
            attempts: 30,
            duration_ms: 29_000,
        });
        h2.send(ActivityEvent::ItemFailed {
            item: "postgres".to_string(),
            code: "PVTD-2001".to_string(),
            message: "forbidden".to_string(),
        });
        handle.shutdown();
        join.join().unwrap();

        let contents = std::fs::read_to_string(dir.path().join("test.jsonl")).unwrap();
        let lines: Vec<serde_json::Value> = contents
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0]["namespace"], "backend");
        assert_eq!(lines[0]["fragment"], "consul");
        assert_eq!(lines[1]["outcome"], "timed_out");
        assert_eq!(lines[1]["severity"], "warning");
        assert_eq!(lines[2]["error_code"], "PVTD-2001");
    }

    #[test]
    fn dropping_all_handles_stops_thread() {
        let dir = tempfile::tempdir().unwrap();
        let (handle, join) = spawn_logger(test_config(dir.path(), 2)).unwrap();
        assert_eq!(handle.dropped_events(), 0);
        drop(handle);
        join.join().unwrap();
    }

    #[test]
    fn shutdown_sentinel_has_no_log_entry() {
        assert!(event_to_log_entry(&ActivityEvent::Shutdown).is_none());
    }
}
