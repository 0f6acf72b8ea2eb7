//! State prober tests

use swarmdeck::catalog::{StackId, Unit};
use swarmdeck::probe::StateProber;

use crate::support::{docker_host, fresh_host, swarm_host, NETWORK};

#[tokio::test]
async fn test_fresh_host_probes_negative() {
    let snapshot = StateProber::new(NETWORK).probe(&fresh_host()).await;
    assert!(snapshot.system_status.docker_version.is_none());
    assert!(!snapshot.system_status.swarm_active);
    assert!(!snapshot.system_status.network_present);
    assert!(!snapshot.system_status.monitor_installed);
    assert!(snapshot.detected_stacks.is_empty());
}

#[tokio::test]
async fn test_stack_detection_is_exact() {
    let host = swarm_host(&["postgres", "n8n_editor", "postgres_old", "my-app", "Traefik"]);
    let snapshot = StateProber::new(NETWORK).probe(&host).await;

    let stacks: Vec<StackId> = snapshot.detected_stacks.iter().collect();
    assert_eq!(stacks, vec![StackId::Postgres, StackId::N8nEditor]);
    assert!(snapshot.is_satisfied(Unit::Postgres));
    assert!(snapshot.is_satisfied(Unit::N8n));
    assert!(!snapshot.is_satisfied(Unit::Traefik));
}

#[tokio::test]
async fn test_network_must_match_configured_name() {
    let host = swarm_host(&[]);
    assert!(StateProber::new(NETWORK).probe(&host).await.system_status.network_present);
    assert!(!StateProber::new("edge_public").probe(&host).await.system_status.network_present);
}

#[tokio::test]
async fn test_monitor_detected_on_path() {
    let host = docker_host().ok(
        "export PATH=\"$PATH:/usr/local/bin\"; command -v ctop",
        "/usr/local/bin/ctop",
    );
    let snapshot = StateProber::new(NETWORK).probe(&host).await;
    assert!(snapshot.system_status.monitor_installed);
    assert!(snapshot.is_satisfied(Unit::Ctop));
}

#[tokio::test]
async fn test_snapshot_serializes_stack_names() {
    let snapshot = StateProber::new(NETWORK).probe(&swarm_host(&["redis"])).await;
    let json = serde_json::to_value(&snapshot).unwrap();
    assert_eq!(json["detected_stacks"], serde_json::json!(["redis"]));
    assert_eq!(json["system_status"]["docker_version"], "27.3.1");
}
