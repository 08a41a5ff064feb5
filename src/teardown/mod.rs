//! Deletion-and-verification orchestration.
//!
//! Data flows top-down: `orchestrator` → `coordinator`/`sweeper` →
//! `locator`/`verifier` → `ClusterAccessor`. Only the verifier sleeps.

pub mod coordinator;
pub mod locator;
pub mod orchestrator;
pub mod reporter;
pub mod sweeper;
pub mod verifier;

#[cfg(test)]
mod test_properties;
