//! Stack deployer

use std::time::Duration;

use tracing::{error, info, warn};

use crate::catalog::params::StackParams;
use crate::catalog::{StackId, Unit};
use crate::deploy::templates;
use crate::errors::OrchestratorError;
use crate::jobs::JobHandle;
use crate::remote::RemoteExecutor;
use crate::utils::shell_quote;

const POSTGRES_CONTAINER_CMD: &str = "docker ps -q -f name=postgres_postgres | head -n 1";
const CHATWOOT_CONTAINER_CMD: &str = "docker ps -q -f name=chatwoot_admin_chatwoot_admin | head -n 1";

/// A template rendered for one stack, ready to upload
#[derive(Debug, Clone)]
pub struct RenderedStack {
    pub stack: StackId,
    pub content: String,
}

/// Deployer settings
#[derive(Debug, Clone)]
pub struct DeployerOptions {
    /// Remote directory receiving rendered stack files
    pub stack_dir: String,

    /// Overlay network every stack attaches to
    pub network_name: String,

    /// Attempts to find the chatwoot admin container after deploy
    pub migrate_attempts: u32,

    /// Delay between those attempts
    pub migrate_interval: Duration,
}

impl Default for DeployerOptions {
    fn default() -> Self {
        Self {
            stack_dir: "/root/stacks".to_string(),
            network_name: "network_swarm_public".to_string(),
            migrate_attempts: 12,
            migrate_interval: Duration::from_secs(5),
        }
    }
}

/// Renders, uploads and deploys the stacks of an application unit
#[derive(Debug, Clone, Default)]
pub struct StackDeployer {
    options: DeployerOptions,
}

impl StackDeployer {
    pub fn new(options: DeployerOptions) -> Self {
        Self { options }
    }

    pub fn network_name(&self) -> &str {
        &self.options.network_name
    }

    /// Render every stack of `unit`; runs before the job starts
    pub fn render(
        &self,
        unit: Unit,
        params: &StackParams,
    ) -> Result<Vec<RenderedStack>, OrchestratorError> {
        unit.stacks()
            .iter()
            .map(|&stack| {
                templates::render(stack, params, &self.options.network_name)
                    .map(|content| RenderedStack { stack, content })
            })
            .collect()
    }

    /// Deploy previously rendered stacks of `unit`
    ///
    /// Re-running with the same input re-applies the same files;
    /// `docker stack deploy` updates a running stack in place.
    pub async fn deploy(
        &self,
        executor: &dyn RemoteExecutor,
        job: &JobHandle,
        unit: Unit,
        rendered: Vec<RenderedStack>,
    ) -> Result<String, OrchestratorError> {
        // 1. Database the application expects to find
        if let Some(database) = unit.database() {
            job.progress(format!("Ensuring database {}", database));
            ensure_database(executor, database).await?;
        }

        // 2. Upload and deploy each stack
        for RenderedStack { stack, content } in rendered {
            job.progress(format!("Deploying stack {}", stack));
            self.deploy_stack(executor, stack, &content).await?;
        }

        // 3. Post-deploy hooks
        if unit == Unit::Chatwoot {
            job.progress("Preparing Chatwoot database");
            return Ok(match self.migrate_chatwoot(executor).await {
                Ok(()) => "Chatwoot installed and database prepared".to_string(),
                Err(e) => {
                    error!("Chatwoot migration failed: {}", e);
                    format!("Chatwoot installed; database preparation failed: {}", e)
                }
            });
        }

        Ok(format!("{} deployed", unit.display_name()))
    }

    /// Upload `content` and create or update the stack
    pub async fn deploy_stack(
        &self,
        executor: &dyn RemoteExecutor,
        stack: StackId,
        content: &str,
    ) -> Result<(), OrchestratorError> {
        let remote_path = format!(
            "{}/{}.yml",
            self.options.stack_dir.trim_end_matches('/'),
            stack.name()
        );
        executor.upload(content.as_bytes(), &remote_path).await?;

        let command = format!(
            "docker stack deploy -c {} {}",
            shell_quote(&remote_path),
            stack.name()
        );
        executor.run_long_checked(&command).await?;
        info!("Stack {} deployed on {}", stack, executor.host());
        Ok(())
    }

    async fn migrate_chatwoot(&self, executor: &dyn RemoteExecutor) -> Result<(), OrchestratorError> {
        let mut container = String::new();
        for attempt in 1..=self.options.migrate_attempts {
            container = executor.run_checked(CHATWOOT_CONTAINER_CMD).await?;
            if !container.is_empty() {
                break;
            }
            info!(
                "Waiting for chatwoot admin container ({}/{})",
                attempt, self.options.migrate_attempts
            );
            tokio::time::sleep(self.options.migrate_interval).await;
        }

        if container.is_empty() {
            return Err(OrchestratorError::NotFound(
                "chatwoot admin container did not start".to_string(),
            ));
        }

        let command = format!(
            "docker exec {} bundle exec rails db:chatwoot_prepare",
            shell_quote(&container)
        );
        executor.run_long_checked(&command).await?;
        info!("Chatwoot database prepared");
        Ok(())
    }
}

/// Create `database` in the running postgres container unless present
async fn ensure_database(
    executor: &dyn RemoteExecutor,
    database: &str,
) -> Result<(), OrchestratorError> {
    let container = executor.run_checked(POSTGRES_CONTAINER_CMD).await?;
    if container.is_empty() {
        return Err(OrchestratorError::NotFound(
            "no running postgres container on this host".to_string(),
        ));
    }
    let container = shell_quote(&container);

    let check = format!(
        "docker exec {} psql -U postgres -tAc \"SELECT 1 FROM pg_database WHERE datname='{}'\"",
        container, database
    );
    match executor.run_checked(&check).await {
        Ok(found) if found.trim() == "1" => {
            info!("Database {} already exists", database);
            return Ok(());
        }
        Ok(_) => {}
        Err(e) => warn!("Database lookup failed, creating anyway: {}", e),
    }

    let create = format!(
        "docker exec {} psql -U postgres -c \"CREATE DATABASE {};\"",
        container, database
    );
    let output = executor.run(&create).await?;
    if output.success() || output.diagnostic().contains("already exists") {
        info!("Database {} ready", database);
        Ok(())
    } else {
        Err(output.into_error(&create))
    }
}
