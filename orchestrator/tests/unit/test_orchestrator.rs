//! Orchestrator tests against scripted hosts

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio_test::{assert_err, assert_ok};

use swarmdeck::catalog::Unit;
use swarmdeck::errors::OrchestratorError;
use swarmdeck::jobs::JobStatus;
use swarmdeck::orchestrator::HostTask;

use crate::support::{
    credentials, docker_host, fresh_host, orchestrator, scripted, swarm_host, wait_terminal,
    RejectingConnector,
};

fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[tokio::test]
async fn test_swarm_install_runs_to_success() {
    let (orchestrator, executor, _) = scripted(docker_host().ok("docker swarm init", "Swarm initialized"));

    let response = assert_ok!(
        orchestrator
            .install(Unit::Swarm, &credentials(), &HashMap::new(), false)
            .await
    );
    assert!(response.accepted);
    assert!(response.job_id.is_some());

    let record = wait_terminal(&orchestrator, "swarm").await;
    assert_eq!(record.status, JobStatus::Success);
    assert_eq!(record.job_id, response.job_id);
    assert!(record.finished_at.is_some());
    assert_eq!(
        executor.calls_starting_with("docker swarm init --advertise-addr 10.0.0.5"),
        1
    );
}

#[tokio::test]
async fn test_existing_swarm_counts_as_success() {
    let (orchestrator, _, _) = scripted(docker_host().fail(
        "docker swarm init",
        1,
        "Error response from daemon: This node is already part of a swarm.",
    ));

    assert_ok!(
        orchestrator
            .install(Unit::Swarm, &credentials(), &HashMap::new(), false)
            .await
    );
    let record = wait_terminal(&orchestrator, "swarm").await;
    assert_eq!(record.status, JobStatus::Success);
    assert!(record.message.contains("already part of a swarm"));
}

#[tokio::test]
async fn test_second_start_while_running_conflicts() {
    let gate = Arc::new(Semaphore::new(0));
    let (orchestrator, executor, _) = scripted(
        docker_host()
            .ok("docker swarm init", "Swarm initialized")
            .gate("docker swarm init", gate.clone()),
    );

    let first = assert_ok!(
        orchestrator
            .install(Unit::Swarm, &credentials(), &HashMap::new(), false)
            .await
    );
    let second = orchestrator
        .install(Unit::Swarm, &credentials(), &HashMap::new(), false)
        .await;
    assert!(matches!(second, Err(OrchestratorError::Conflict(_))));

    // the running record belongs to the first job
    let running = orchestrator.install_status("swarm");
    assert_eq!(running.status, JobStatus::Running);
    assert_eq!(running.job_id, first.job_id);

    gate.add_permits(1);
    let record = wait_terminal(&orchestrator, "swarm").await;
    assert_eq!(record.status, JobStatus::Success);
    assert_eq!(executor.calls_starting_with("docker swarm init"), 1);
}

#[tokio::test]
async fn test_unknown_key_is_absent() {
    let (orchestrator, _, _) = scripted(fresh_host());
    let record = orchestrator.install_status("never-started");
    assert_eq!(record.status, JobStatus::Absent);
    assert!(record.job_id.is_none());
    assert!(orchestrator.all_install_status().is_empty());
}

#[tokio::test]
async fn test_missing_docker_blocks_swarm_without_job() {
    let (orchestrator, executor, _) = scripted(fresh_host());

    let err = assert_err!(
        orchestrator
            .install(Unit::Swarm, &credentials(), &HashMap::new(), false)
            .await
    );
    match err {
        OrchestratorError::PreconditionError(reason) => assert!(reason.contains("Docker")),
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(orchestrator.install_status("swarm").status, JobStatus::Absent);
    assert_eq!(executor.calls_starting_with("docker swarm init"), 0);
}

#[tokio::test]
async fn test_n8n_names_only_the_missing_database() {
    let (orchestrator, _, _) = scripted(swarm_host(&["traefik", "redis"]));

    let err = assert_err!(
        orchestrator
            .install(
                Unit::N8n,
                &credentials(),
                &params(&[
                    ("postgres_password", "pg"),
                    ("n8n_host", "n8n.example.com"),
                    ("n8n_webhook_host", "hooks.example.com"),
                ]),
                false,
            )
            .await
    );
    let reason = err.to_string();
    assert!(reason.contains("Postgres"), "{}", reason);
    assert!(!reason.contains("Redis"), "{}", reason);
    assert_eq!(orchestrator.install_status("n8n").status, JobStatus::Absent);
}

#[tokio::test]
async fn test_missing_parameter_rejected_before_connecting() {
    let (orchestrator, _, connector) = scripted(swarm_host(&[]));

    let err = assert_err!(
        orchestrator
            .install(Unit::Traefik, &credentials(), &params(&[("email", "  ")]), false)
            .await
    );
    assert!(matches!(err, OrchestratorError::ValidationError(_)));
    assert!(err.to_string().contains("email"));
    assert_eq!(connector.connects(), 0);
    assert_eq!(orchestrator.install_status("traefik").status, JobStatus::Absent);
}

#[tokio::test]
async fn test_installed_docker_short_circuits() {
    let (orchestrator, _, _) = scripted(docker_host());

    let response = assert_ok!(
        orchestrator
            .install(Unit::Docker, &credentials(), &HashMap::new(), false)
            .await
    );
    assert!(!response.accepted);
    assert!(response.message.contains("27.3.1"));
    assert!(response.job_id.is_none());
    assert_eq!(orchestrator.install_status("docker").status, JobStatus::Absent);
}

#[tokio::test]
async fn test_overwrite_redeploys_installed_stack() {
    let (orchestrator, executor, _) = scripted(
        swarm_host(&["traefik", "redis"]).ok("docker stack deploy", "Updating service redis_redis"),
    );

    let response = assert_ok!(
        orchestrator
            .install(Unit::Redis, &credentials(), &HashMap::new(), true)
            .await
    );
    assert!(response.accepted);
    let record = wait_terminal(&orchestrator, "redis").await;
    assert_eq!(record.status, JobStatus::Success);
    assert_eq!(executor.calls_starting_with("docker stack deploy"), 1);
}

#[tokio::test]
async fn test_failed_job_keeps_error_until_restarted() {
    let (orchestrator, _, _) = scripted(
        swarm_host(&["traefik"]).fail("docker stack deploy", 1, "network network_swarm_public not found"),
    );

    assert_ok!(
        orchestrator
            .install(Unit::Redis, &credentials(), &HashMap::new(), false)
            .await
    );
    let record = wait_terminal(&orchestrator, "redis").await;
    assert_eq!(record.status, JobStatus::Error);
    assert!(record.message.contains("not found"));

    // terminal state is retained across polls
    let again = orchestrator.install_status("redis");
    assert_eq!(again.status, JobStatus::Error);
    assert_eq!(again.job_id, record.job_id);

    // and the key can be re-armed
    let retry = assert_ok!(
        orchestrator
            .install(Unit::Redis, &credentials(), &HashMap::new(), false)
            .await
    );
    assert_ne!(retry.job_id, record.job_id);
}

#[tokio::test]
async fn test_host_task_requires_docker() {
    let (orchestrator, _, _) = scripted(fresh_host());
    let err = assert_err!(
        orchestrator
            .run_host_task(HostTask::ConfigureDocker, &credentials())
            .await
    );
    assert!(matches!(err, OrchestratorError::PreconditionError(_)));
    assert_eq!(
        orchestrator.install_status("docker-config").status,
        JobStatus::Absent
    );
}

#[tokio::test]
async fn test_docker_config_job_writes_override() {
    let (orchestrator, executor, _) = scripted(
        docker_host()
            .ok("sudo mkdir -p /etc/systemd/system/docker.service.d", "")
            .ok("sudo systemctl", "")
            .ok(
                "systemctl show --property=Environment docker",
                "Environment=DOCKER_MIN_API_VERSION=1.24",
            ),
    );

    let response = assert_ok!(
        orchestrator
            .run_host_task(HostTask::ConfigureDocker, &credentials())
            .await
    );
    assert_eq!(response.service_key, "docker-config");
    let record = wait_terminal(&orchestrator, "docker-config").await;
    assert_eq!(record.status, JobStatus::Success, "{}", record.message);
    assert_eq!(executor.calls_starting_with("sudo systemctl restart docker"), 1);
}

#[tokio::test]
async fn test_partial_probe_failure_degrades_single_field() {
    let (orchestrator, _, _) = scripted(
        docker_host().fail("docker info", 1, "Cannot connect to the Docker daemon"),
    );

    let report = assert_ok!(orchestrator.system_status(&credentials()).await);
    assert_eq!(report.system_status.docker_version.as_deref(), Some("27.3.1"));
    assert!(!report.system_status.swarm_active);

    let swarm = report.units.iter().find(|u| u.service_key == "swarm").unwrap();
    assert!(swarm.enabled);
    assert!(!swarm.installed);
    let network = report.units.iter().find(|u| u.service_key == "network").unwrap();
    assert!(!network.enabled);
    assert!(network.reason.contains("Docker Swarm"));
}

#[tokio::test]
async fn test_rejected_login_is_auth_error() {
    let orchestrator = orchestrator(Arc::new(RejectingConnector));
    let err = assert_err!(orchestrator.verify_connection(&credentials()).await);
    assert!(matches!(err, OrchestratorError::AuthError(_)));
    assert_eq!(err.status_code().as_u16(), 401);
}

#[tokio::test]
async fn test_verify_connection_reports_lattice() {
    let (orchestrator, _, _) = scripted(swarm_host(&["traefik", "postgres"]));
    let report = assert_ok!(orchestrator.verify_connection(&credentials()).await);
    assert!(report.ok);
    assert!(report.system_status.network_present);

    let baserow = report.units.iter().find(|u| u.service_key == "baserow").unwrap();
    assert!(baserow.enabled);
    let chatwoot = report.units.iter().find(|u| u.service_key == "chatwoot").unwrap();
    assert!(!chatwoot.enabled);
    assert!(chatwoot.reason.contains("Redis"));
}

#[tokio::test]
async fn test_stack_env_round_trip() {
    let (orchestrator, executor, _) = scripted(
        swarm_host(&["postgres"])
            .ok("docker stack services postgres", "postgres_postgres")
            .ok(
                "docker service inspect postgres_postgres",
                r#"["POSTGRES_PASSWORD=old","PGDATA=/var/lib/postgresql/data"]"#,
            )
            .ok("docker service update", "postgres_postgres"),
    );

    let env = assert_ok!(orchestrator.get_stack_env(&credentials(), "postgres").await);
    assert_eq!(env.len(), 1);
    assert_eq!(env.get("POSTGRES_PASSWORD").map(String::as_str), Some("old"));

    // writing back what was read changes nothing else
    let updated = assert_ok!(
        orchestrator
            .update_stack_env(&credentials(), "postgres", &env)
            .await
    );
    assert_eq!(updated, 1);
    assert_eq!(
        executor.calls_starting_with(
            "docker service update --env-add POSTGRES_PASSWORD=old postgres_postgres"
        ),
        1
    );
    let reread = assert_ok!(orchestrator.get_stack_env(&credentials(), "postgres").await);
    assert_eq!(reread, env);

    let mut changed = env.clone();
    changed.insert("POSTGRES_PASSWORD".to_string(), "rotated".to_string());
    assert_ok!(
        orchestrator
            .update_stack_env(&credentials(), "postgres", &changed)
            .await
    );
    let reread = assert_ok!(orchestrator.get_stack_env(&credentials(), "postgres").await);
    assert_eq!(reread, changed);
}

#[tokio::test]
async fn test_n8n_env_update_reaches_sibling_stacks() {
    let (orchestrator, executor, _) = scripted(
        swarm_host(&["postgres", "redis", "n8n_editor", "n8n_webhook"])
            .ok("docker stack services n8n_editor", "n8n_editor_n8n_editor")
            .ok("docker stack services n8n_webhook", "n8n_webhook_n8n_webhook")
            .fail("docker stack services n8n_worker", 1, "Nothing found in stack: n8n_worker")
            .ok(
                "docker service inspect n8n_webhook_n8n_webhook",
                r#"["N8N_HOST=old.example.com","WEBHOOK_URL=https://hooks.example.com/"]"#,
            )
            .ok("docker service update", ""),
    );

    let mut env = BTreeMap::new();
    env.insert("N8N_HOST".to_string(), "flows.example.com".to_string());
    let updated = assert_ok!(
        orchestrator
            .update_stack_env(&credentials(), "n8n_editor", &env)
            .await
    );
    assert_eq!(updated, 2);
    assert_eq!(
        executor.calls_starting_with(
            "docker service update --env-add N8N_HOST=flows.example.com n8n_webhook_n8n_webhook"
        ),
        1
    );

    let webhook = assert_ok!(orchestrator.get_stack_env(&credentials(), "n8n_webhook").await);
    assert_eq!(webhook.get("N8N_HOST").map(String::as_str), Some("flows.example.com"));
    assert_eq!(
        webhook.get("WEBHOOK_URL").map(String::as_str),
        Some("https://hooks.example.com/")
    );
}

#[tokio::test]
async fn test_update_stack_env_rejects_foreign_keys() {
    let (orchestrator, executor, _) = scripted(swarm_host(&["postgres"]));

    let mut env = BTreeMap::new();
    env.insert("PGDATA".to_string(), "/tmp".to_string());
    let err = assert_err!(
        orchestrator
            .update_stack_env(&credentials(), "postgres", &env)
            .await
    );
    assert!(matches!(err, OrchestratorError::ValidationError(_)));
    assert_eq!(executor.calls_starting_with("docker service update"), 0);

    let empty = assert_ok!(
        orchestrator
            .update_stack_env(&credentials(), "postgres", &BTreeMap::new())
            .await
    );
    assert_eq!(empty, 0);
}

#[tokio::test]
async fn test_unknown_stack_is_not_found() {
    let (orchestrator, _, connector) = scripted(swarm_host(&[]));
    let err = assert_err!(orchestrator.get_stack_env(&credentials(), "wordpress").await);
    assert!(matches!(err, OrchestratorError::NotFound(_)));
    assert_eq!(connector.connects(), 0);
}

#[tokio::test]
async fn test_restart_reports_each_service() {
    let (orchestrator, _, _) = scripted(
        swarm_host(&["n8n_editor"])
            .ok("docker stack services n8n_editor", "n8n_editor_n8n_editor\nn8n_editor_sidecar")
            .ok("docker service update --force n8n_editor_n8n_editor", "")
            .fail("docker service update --force n8n_editor_sidecar", 1, "update out of sequence"),
    );

    let outcomes = assert_ok!(orchestrator.restart_stack(&credentials(), "n8n_editor").await);
    assert_eq!(outcomes.len(), 2);
    assert!(outcomes[0].restarted);
    assert!(!outcomes[1].restarted);
    assert!(outcomes[1].message.contains("out of sequence"));
}

#[tokio::test]
async fn test_restart_of_missing_stack_is_not_found() {
    let (orchestrator, _, _) = scripted(
        swarm_host(&[]).fail("docker stack services", 1, "Nothing found in stack: ghost"),
    );
    let err = assert_err!(orchestrator.restart_stack(&credentials(), "ghost").await);
    assert!(matches!(err, OrchestratorError::NotFound(_)));
}
