//! SIGINT/SIGTERM handling for a running campaign.
//!
//! Signals only set a flag. The verifier polls that flag before each attempt,
//! so an interrupted campaign finishes its in-flight calls, reports pending
//! verifications as timed out, and still prints the final inventory.

#![allow(missing_docs)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use signal_hook::consts::{SIGINT, SIGTERM};

#[derive(Clone)]
pub struct InterruptFlag {
    flag: Arc<AtomicBool>,
}

impl InterruptFlag {
    /// Create the flag and register SIGINT/SIGTERM against it.
    ///
    /// Registration is best-effort; failures go to stderr but are not fatal.
    pub fn register() -> Self {
        let handler = Self::unregistered();
        for (signal, name) in [(SIGTERM, "SIGTERM"), (SIGINT, "SIGINT")] {
            if let Err(e) = signal_hook::flag::register(signal, Arc::clone(&handler.flag)) {
                eprintln!("[PVTD-SIGNAL] failed to register {name}: {e}");
            }
        }
        handler
    }

    /// A flag no signal is wired to.
    pub fn unregistered() -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_set(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    pub fn trigger(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    /// Shared flag to hand to `Campaign::with_interrupt_flag`.
    pub fn shared(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.flag)
    }
}
