//! Operations on the services of a running stack

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{error, info};

use crate::catalog::StackId;
use crate::errors::OrchestratorError;
use crate::remote::RemoteExecutor;
use crate::utils::shell_quote;

const NAME_FORMAT: &str = "'{{.Name}}'";
const ENV_FORMAT: &str = "'{{json .Spec.TaskTemplate.ContainerSpec.Env}}'";

/// Result of restarting one service
#[derive(Debug, Clone, Serialize)]
pub struct ServiceRestart {
    pub service: String,
    pub restarted: bool,
    pub message: String,
}

/// Service names of `stack_name`; empty when the stack is not deployed
pub async fn list_services(
    executor: &dyn RemoteExecutor,
    stack_name: &str,
) -> Result<Vec<String>, OrchestratorError> {
    let command = format!(
        "docker stack services {} --format {}",
        shell_quote(stack_name),
        NAME_FORMAT
    );
    let output = executor.run(&command).await?;
    if !output.success() {
        // docker exits non-zero for unknown stacks
        if output.diagnostic().contains("Nothing found in stack") {
            return Ok(Vec::new());
        }
        return Err(output.into_error(&command));
    }
    Ok(output
        .stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

async fn require_services(
    executor: &dyn RemoteExecutor,
    stack_name: &str,
) -> Result<Vec<String>, OrchestratorError> {
    let services = list_services(executor, stack_name).await?;
    if services.is_empty() {
        return Err(OrchestratorError::NotFound(format!(
            "no services found for stack '{}'",
            stack_name
        )));
    }
    Ok(services)
}

/// Force a rolling restart of every service in the stack
///
/// A failing service does not stop the others; each outcome is reported.
pub async fn restart_stack(
    executor: &dyn RemoteExecutor,
    stack_name: &str,
) -> Result<Vec<ServiceRestart>, OrchestratorError> {
    let services = require_services(executor, stack_name).await?;
    info!("Restarting {} services of stack {}", services.len(), stack_name);

    let mut outcomes = Vec::with_capacity(services.len());
    for service in services {
        let command = format!("docker service update --force {}", shell_quote(&service));
        let outcome = match executor.run_long_checked(&command).await {
            Ok(_) => ServiceRestart {
                message: format!("Service '{}' restarted", service),
                service,
                restarted: true,
            },
            Err(e) => {
                error!("Failed to restart {}: {}", service, e);
                ServiceRestart {
                    message: e.to_string(),
                    service,
                    restarted: false,
                }
            }
        };
        outcomes.push(outcome);
    }
    Ok(outcomes)
}

/// Parse `docker service inspect` env output (`["K=V", ...]` or `null`)
fn parse_env(json: &str) -> Result<BTreeMap<String, String>, OrchestratorError> {
    let entries: Option<Vec<String>> = serde_json::from_str(json.trim())?;
    Ok(entries
        .unwrap_or_default()
        .into_iter()
        .filter_map(|entry| {
            entry
                .split_once('=')
                .map(|(k, v)| (k.to_string(), v.to_string()))
        })
        .collect())
}

/// Editable environment of the stack, read from its first service
pub async fn get_stack_env(
    executor: &dyn RemoteExecutor,
    stack: StackId,
) -> Result<BTreeMap<String, String>, OrchestratorError> {
    let services = require_services(executor, stack.name()).await?;
    let command = format!(
        "docker service inspect {} --format {}",
        shell_quote(&services[0]),
        ENV_FORMAT
    );
    let env = parse_env(&executor.run_checked(&command).await?)?;

    let editable = stack.editable_env();
    Ok(env
        .into_iter()
        .filter(|(key, _)| editable.contains(&key.as_str()))
        .collect())
}

/// Apply `env` to every service of the stack and of its sibling stacks
///
/// Stacks of one unit share their editable variables, so the n8n and
/// Chatwoot stacks stay in step. Siblings that are not deployed are
/// skipped. Keys outside the stack's editable set are rejected before
/// anything runs. Returns the number of services updated.
pub async fn update_stack_env(
    executor: &dyn RemoteExecutor,
    stack: StackId,
    env: &BTreeMap<String, String>,
) -> Result<usize, OrchestratorError> {
    let editable = stack.editable_env();
    if let Some(key) = env.keys().find(|key| !editable.contains(&key.as_str())) {
        return Err(OrchestratorError::ValidationError(format!(
            "'{}' is not editable on stack {}",
            key, stack
        )));
    }
    if env.is_empty() {
        return Ok(0);
    }

    let mut targets = vec![(stack, require_services(executor, stack.name()).await?)];
    for &sibling in stack.unit().stacks().iter().filter(|&&s| s != stack) {
        let services = list_services(executor, sibling.name()).await?;
        if !services.is_empty() {
            targets.push((sibling, services));
        }
    }

    let mut updated = 0;
    for (target, services) in targets {
        let args = env
            .iter()
            .filter(|(key, _)| target.editable_env().contains(&key.as_str()))
            .map(|(key, value)| format!("--env-add {}", shell_quote(&format!("{}={}", key, value))))
            .collect::<Vec<_>>();
        if args.is_empty() {
            continue;
        }
        let args = args.join(" ");

        for service in &services {
            info!("Updating environment of {}", service);
            let command = format!("docker service update {} {}", args, shell_quote(service));
            executor.run_long_checked(&command).await?;
            updated += 1;
        }
    }
    Ok(updated)
}
