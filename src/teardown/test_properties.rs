//! Property-based tests for verification bounds and locator matching.
//!
//! Uses `proptest` over arbitrary policies, linger counts and deadlines to
//! check that polling never outlives its budget, never exceeds its attempt
//! count, and confirms exactly when the object disappears within budget.

use std::collections::BTreeSet;
use std::time::Duration;

use proptest::prelude::*;

use super::locator::ResourceLocator;
use super::verifier::{
    Cancellation, Clock, DeletionVerifier, ManualClock, VerificationOutcome, VerifyPolicy,
};
use crate::cluster::accessor::ClusterAccessor;
use crate::cluster::memory::InMemoryCluster;
use crate::cluster::types::{DeletionTarget, StorageClaim, StorageVolume};

// ──────────────────── strategies ────────────────────

fn arb_policy() -> impl Strategy<Value = VerifyPolicy> {
    (1u32..=20, 1u64..=5_000).prop_map(|(max_attempts, interval_ms)| VerifyPolicy {
        max_attempts,
        interval: Duration::from_millis(interval_ms),
    })
}

fn arb_claim_name() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("consul"),
        Just("postgres"),
        Just("data"),
        Just("es"),
        Just("vault"),
        Just("redis"),
    ]
    .prop_map(str::to_string)
}

fn arb_claims() -> impl Strategy<Value = Vec<(String, String)>> {
    prop::collection::vec(
        (
            prop::collection::vec(arb_claim_name(), 1..=3).prop_map(|parts| parts.join("-")),
            prop_oneof![Just("backend"), Just("logging"), Just("frontend")].prop_map(str::to_string),
        ),
        0..12,
    )
}

/// A deleted volume that stays readable for `linger` more reads.
fn lingering_volume(linger: u32) -> (InMemoryCluster, DeletionTarget) {
    let target = DeletionTarget::volume("pv-0001");
    let cluster = InMemoryCluster::new()
        .with_volume(StorageVolume::new("pv-0001"))
        .lingering(target.clone(), linger);
    cluster.delete_volume("pv-0001").expect("volume exists");
    (cluster, target)
}

// ──────────────────── properties ────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn polling_stays_within_attempt_and_time_budget(
        policy in arb_policy(),
        linger in 0u32..30,
    ) {
        let (cluster, target) = lingering_volume(linger);
        let clock = ManualClock::new();
        let verification = DeletionVerifier::new(&cluster, &clock, policy).await_absence(&target);

        prop_assert!(verification.attempts >= 1);
        prop_assert!(verification.attempts <= policy.max_attempts);
        prop_assert!(clock.elapsed() <= policy.worst_case());
    }

    #[test]
    fn confirmed_exactly_when_object_vanishes_within_budget(
        policy in arb_policy(),
        linger in 0u32..30,
    ) {
        let (cluster, target) = lingering_volume(linger);
        let clock = ManualClock::new();
        let verification = DeletionVerifier::new(&cluster, &clock, policy).await_absence(&target);

        if linger < policy.max_attempts {
            prop_assert_eq!(verification.outcome, VerificationOutcome::Confirmed);
            prop_assert_eq!(verification.attempts, linger + 1);
            prop_assert_eq!(clock.sleeps().len(), linger as usize);
        } else {
            prop_assert_eq!(verification.outcome, VerificationOutcome::TimedOut);
            prop_assert_eq!(verification.attempts, policy.max_attempts);
            prop_assert_eq!(clock.elapsed(), policy.worst_case());
        }
    }

    #[test]
    fn deadline_caps_total_polling_time(
        policy in arb_policy(),
        deadline_ms in 0u64..60_000,
    ) {
        let target = DeletionTarget::claim("stuck", "backend");
        let cluster = InMemoryCluster::new()
            .with_claim(StorageClaim::new("stuck", "backend"))
            .stuck(target.clone());
        cluster.delete_claim("stuck", "backend").expect("claim exists");

        let clock = ManualClock::new();
        let deadline = Duration::from_millis(deadline_ms);
        let cancel = Cancellation::none().with_deadline(Some(clock.now() + deadline));
        let verification = DeletionVerifier::new(&cluster, &clock, policy)
            .with_cancellation(&cancel)
            .await_absence(&target);

        prop_assert_eq!(verification.outcome, VerificationOutcome::TimedOut);
        prop_assert!(clock.elapsed() <= deadline.min(policy.worst_case()));
        prop_assert!(verification.attempts <= policy.max_attempts);
    }

    #[test]
    fn fragment_lookup_matches_exactly_the_containing_names(
        claims in arb_claims(),
        fragment in arb_claim_name(),
    ) {
        let mut cluster = InMemoryCluster::new();
        let mut unique = BTreeSet::new();
        for (name, namespace) in &claims {
            if unique.insert((name.clone(), namespace.clone())) {
                cluster = cluster.with_claim(StorageClaim::new(name, namespace));
            }
        }

        let found: BTreeSet<(String, String)> = ResourceLocator::new(&cluster)
            .find_claims_by_fragment(&fragment)
            .expect("listing succeeds")
            .into_iter()
            .map(|c| (c.name, c.namespace))
            .collect();
        let expected: BTreeSet<(String, String)> = unique
            .into_iter()
            .filter(|(name, _)| name.contains(&fragment))
            .collect();
        prop_assert_eq!(found, expected);
        prop_assert_eq!(cluster.delete_calls(), 0);
    }
}
