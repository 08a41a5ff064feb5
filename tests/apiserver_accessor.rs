//! `KubeAccessor` against a local stand-in API server.

mod common;

use pv_teardown::core::config::ClusterConfig;
use pv_teardown::prelude::*;

use common::apiserver::{FakeApiServer, FakeCluster};

fn connect(server: &FakeApiServer, dir: &std::path::Path) -> KubeAccessor {
    let cluster = ClusterConfig {
        kubeconfig: Some(server.write_kubeconfig(dir)),
        request_timeout_secs: 5,
        ..ClusterConfig::default()
    };
    KubeAccessor::connect(&cluster).expect("client builds")
}

fn cluster() -> FakeCluster {
    FakeCluster::new()
        .bound_pair("backend", "consul-data", "pv-0001")
        .claim("logging", "es-data-0")
        .claim("logging", "es-data-1")
        .forbidden_namespace("broken")
}

#[test]
fn lists_claims_and_volumes() {
    let tmp = tempfile::tempdir().unwrap();
    let server = cluster().serve();
    let accessor = connect(&server, tmp.path());

    let claims = accessor.list_claims().unwrap();
    assert_eq!(claims.len(), 3);
    assert_eq!(
        claims[0],
        StorageClaim::new("consul-data", "backend").bound_to("pv-0001")
    );

    let logging = accessor.list_claims_in("logging").unwrap();
    let names: Vec<&str> = logging.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, ["es-data-0", "es-data-1"]);

    let volumes = accessor.list_volumes().unwrap();
    assert_eq!(volumes.len(), 1);
    assert_eq!(volumes[0].claim_name(), Some("consul-data"));
}

#[test]
fn reads_and_deletes_named_objects() {
    let tmp = tempfile::tempdir().unwrap();
    let server = cluster().serve();
    let accessor = connect(&server, tmp.path());

    let claim = accessor.get_claim("consul-data", "backend").unwrap();
    assert_eq!(claim.volume_name.as_deref(), Some("pv-0001"));
    assert_eq!(accessor.get_volume("pv-0001").unwrap().name, "pv-0001");

    accessor.delete_claim("consul-data", "backend").unwrap();
    accessor.delete_volume("pv-0001").unwrap();
    assert!(!server.has_claim("backend", "consul-data"));
    assert!(!server.has_volume("pv-0001"));

    let err = accessor.get_claim("consul-data", "backend").unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(err.code(), "PVTD-2002");
}

#[test]
fn deleting_an_absent_object_is_not_found() {
    let tmp = tempfile::tempdir().unwrap();
    let server = FakeCluster::new().serve();
    let accessor = connect(&server, tmp.path());

    assert!(accessor.delete_volume("pv-ghost").unwrap_err().is_not_found());
    assert!(
        accessor
            .delete_claim("ghost", "backend")
            .unwrap_err()
            .is_not_found()
    );
    assert!(
        accessor
            .read_target(&DeletionTarget::volume("pv-ghost"))
            .unwrap_err()
            .is_not_found()
    );
}

#[test]
fn bulk_delete_clears_only_the_namespace() {
    let tmp = tempfile::tempdir().unwrap();
    let server = cluster().serve();
    let accessor = connect(&server, tmp.path());

    accessor.delete_claims_in("logging").unwrap();
    assert!(accessor.list_claims_in("logging").unwrap().is_empty());
    assert!(server.has_claim("backend", "consul-data"));
    assert_eq!(
        server.deletes(),
        vec!["DELETE /api/v1/namespaces/logging/persistentvolumeclaims"]
    );
}

#[test]
fn forbidden_listing_is_cluster_api_error() {
    let tmp = tempfile::tempdir().unwrap();
    let server = cluster().serve();
    let accessor = connect(&server, tmp.path());

    let err = accessor.list_claims_in("broken").unwrap_err();
    assert!(!err.is_not_found());
    assert_eq!(err.code(), "PVTD-2001");
    assert!(err.to_string().contains("forbidden"));
}

#[test]
fn unreachable_server_is_cluster_api_error() {
    let tmp = tempfile::tempdir().unwrap();
    let server = FakeCluster::new().serve();
    let accessor = connect(&server, tmp.path());
    drop(server);
    std::thread::sleep(std::time::Duration::from_millis(50));

    let err = accessor.list_volumes().unwrap_err();
    assert_eq!(err.code(), "PVTD-2001");
}

#[test]
fn campaign_runs_end_to_end_through_the_client() {
    let tmp = tempfile::tempdir().unwrap();
    let server = cluster().serve();
    let accessor = connect(&server, tmp.path());
    let policy = VerifyPolicy {
        max_attempts: 3,
        interval: std::time::Duration::from_millis(1),
    };
    let plan = CampaignPlan {
        fragments: vec!["consul".to_string()],
        namespaces: vec!["logging".to_string()],
        concurrency: 2,
        deadline: None,
        dry_run: false,
    };

    let result = Campaign::new(&accessor, &SystemClock, policy, plan)
        .run()
        .unwrap();
    assert_eq!(result.fragments[0].status, FragmentStatus::Deleted);
    assert_eq!(result.summary().confirmed, 2);
    assert!(result.inventory.is_empty());
    assert!(result.is_clean());
}
