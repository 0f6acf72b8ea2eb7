//! Installation orchestrator
//!
//! Wires executor, prober, resolver, job runner and deployer together for
//! one request. Each call opens its own session from the request's
//! credentials; the only state kept between calls is the job table.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::catalog::params::StackParams;
use crate::catalog::{StackId, Unit, DOCKER_CONFIG_KEY, DOCKER_UPGRADE_KEY};
use crate::deploy::services::{self, ServiceRestart};
use crate::deploy::{host, StackDeployer};
use crate::dns::DnsClient;
use crate::errors::OrchestratorError;
use crate::jobs::{JobAction, JobHandle, JobRecord, JobRunner};
use crate::probe::{InstalledStacks, Snapshot, StateProber, SystemStatus};
use crate::remote::{Connector, Credentials};
use crate::resolver::{self, Evaluation, UnitState};

/// Host maintenance jobs outside the unit catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostTask {
    UpgradeDocker,
    ConfigureDocker,
}

impl HostTask {
    pub fn service_key(self) -> &'static str {
        match self {
            HostTask::UpgradeDocker => DOCKER_UPGRADE_KEY,
            HostTask::ConfigureDocker => DOCKER_CONFIG_KEY,
        }
    }
}

/// Response to verify-connection
#[derive(Debug, Serialize)]
pub struct ConnectionReport {
    pub ok: bool,
    pub message: String,
    pub system_status: SystemStatus,
    pub detected_stacks: InstalledStacks,
    pub units: Vec<UnitState>,
}

/// Response to system-status
#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub system_status: SystemStatus,
    pub detected_stacks: InstalledStacks,
    pub units: Vec<UnitState>,
}

impl From<Snapshot> for StatusReport {
    fn from(snapshot: Snapshot) -> Self {
        let units = resolver::lattice(&snapshot);
        Self {
            system_status: snapshot.system_status,
            detected_stacks: snapshot.detected_stacks,
            units,
        }
    }
}

/// Response to an install request
#[derive(Debug, Serialize)]
pub struct InstallResponse {
    pub accepted: bool,
    pub service_key: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<Uuid>,
}

impl InstallResponse {
    fn started(service_key: &str, job_id: Uuid) -> Self {
        Self {
            accepted: true,
            service_key: service_key.to_string(),
            message: "Installation started".to_string(),
            job_id: Some(job_id),
        }
    }

    fn skipped(service_key: &str, message: String) -> Self {
        Self {
            accepted: false,
            service_key: service_key.to_string(),
            message,
            job_id: None,
        }
    }
}

pub struct Orchestrator {
    connector: Arc<dyn Connector>,
    prober: StateProber,
    deployer: StackDeployer,
    jobs: JobRunner,
    dns: DnsClient,
}

impl Orchestrator {
    pub fn new(
        connector: Arc<dyn Connector>,
        prober: StateProber,
        deployer: StackDeployer,
        dns: DnsClient,
    ) -> Self {
        Self {
            connector,
            prober,
            deployer,
            jobs: JobRunner::new(),
            dns,
        }
    }

    pub fn dns(&self) -> &DnsClient {
        &self.dns
    }

    pub fn jobs(&self) -> &JobRunner {
        &self.jobs
    }

    /// Check reachability and credentials, returning a first snapshot
    pub async fn verify_connection(
        &self,
        credentials: &Credentials,
    ) -> Result<ConnectionReport, OrchestratorError> {
        let executor = self.connector.connect(credentials).await?;
        let report = StatusReport::from(self.prober.probe(executor.as_ref()).await);
        Ok(ConnectionReport {
            ok: true,
            message: format!("Connected to {}", executor.host()),
            system_status: report.system_status,
            detected_stacks: report.detected_stacks,
            units: report.units,
        })
    }

    /// Fresh probe plus the dependency lattice
    pub async fn system_status(
        &self,
        credentials: &Credentials,
    ) -> Result<StatusReport, OrchestratorError> {
        let executor = self.connector.connect(credentials).await?;
        Ok(StatusReport::from(self.prober.probe(executor.as_ref()).await))
    }

    /// Validate, check prerequisites and start the install job for `unit`
    ///
    /// Everything that can be rejected is rejected here, before a job
    /// record exists.
    pub async fn install(
        &self,
        unit: Unit,
        credentials: &Credentials,
        parameters: &HashMap<String, String>,
        overwrite: bool,
    ) -> Result<InstallResponse, OrchestratorError> {
        let service_key = unit.service_key();

        // 1. Parameters and templates
        let params = StackParams::validate(unit, parameters)?;
        let rendered = self.deployer.render(unit, &params)?;

        // 2. Connection and fresh state
        let executor = self.connector.connect(credentials).await?;
        let snapshot = self.prober.probe(executor.as_ref()).await;

        // 3. Prerequisites
        resolver::evaluate(unit, &snapshot).into_result()?;

        if snapshot.is_satisfied(unit) && !overwrite {
            let message = match (&snapshot.system_status.docker_version, unit) {
                (Some(version), Unit::Docker) => {
                    format!("{} is already installed ({})", unit, version)
                }
                _ => format!("{} is already installed", unit),
            };
            info!("Skipping {}: {}", service_key, message);
            return Ok(InstallResponse::skipped(service_key, message));
        }

        // 4. Background job
        let deployer = self.deployer.clone();
        let job_id = self.jobs.start(service_key, move |job| -> JobAction {
            Box::pin(async move {
                let executor = executor.as_ref();
                match unit {
                    Unit::Docker => host::install_docker(executor, &job).await,
                    Unit::Swarm => {
                        let advertise_addr = executor.host().to_string();
                        host::init_swarm(executor, &job, &advertise_addr).await
                    }
                    Unit::Network => {
                        host::create_network(executor, &job, deployer.network_name()).await
                    }
                    Unit::Ctop => host::install_ctop(executor, &job).await,
                    app => deployer.deploy(executor, &job, app, rendered).await,
                }
            })
        })?;

        info!("Started {} job {}", service_key, job_id);
        Ok(InstallResponse::started(service_key, job_id))
    }

    /// Start a Docker maintenance job; Docker must already be present
    pub async fn run_host_task(
        &self,
        task: HostTask,
        credentials: &Credentials,
    ) -> Result<InstallResponse, OrchestratorError> {
        let service_key = task.service_key();
        let executor = self.connector.connect(credentials).await?;
        let snapshot = self.prober.probe(executor.as_ref()).await;

        if !snapshot.is_satisfied(Unit::Docker) {
            Evaluation::blocked_by(Unit::Docker).into_result()?;
        }

        let job_id = self.jobs.start(service_key, move |job: JobHandle| -> JobAction {
            Box::pin(async move {
                let executor = executor.as_ref();
                match task {
                    HostTask::UpgradeDocker => host::upgrade_docker(executor, &job).await,
                    HostTask::ConfigureDocker => host::configure_docker_api(executor, &job).await,
                }
            })
        })?;

        info!("Started {} job {}", service_key, job_id);
        Ok(InstallResponse::started(service_key, job_id))
    }

    /// Job record for `service_key`; `absent` when never started
    pub fn install_status(&self, service_key: &str) -> JobRecord {
        self.jobs.poll(service_key)
    }

    pub fn all_install_status(&self) -> Vec<JobRecord> {
        self.jobs.list()
    }

    pub async fn restart_stack(
        &self,
        credentials: &Credentials,
        stack_name: &str,
    ) -> Result<Vec<ServiceRestart>, OrchestratorError> {
        let stack_name = stack_name.trim();
        if stack_name.is_empty() {
            return Err(OrchestratorError::ValidationError(
                "stack_name must not be empty".to_string(),
            ));
        }
        let executor = self.connector.connect(credentials).await?;
        services::restart_stack(executor.as_ref(), stack_name).await
    }

    pub async fn get_stack_env(
        &self,
        credentials: &Credentials,
        stack_name: &str,
    ) -> Result<BTreeMap<String, String>, OrchestratorError> {
        let stack = known_stack(stack_name)?;
        let executor = self.connector.connect(credentials).await?;
        services::get_stack_env(executor.as_ref(), stack).await
    }

    /// Returns the number of services updated
    pub async fn update_stack_env(
        &self,
        credentials: &Credentials,
        stack_name: &str,
        env: &BTreeMap<String, String>,
    ) -> Result<usize, OrchestratorError> {
        let stack = known_stack(stack_name)?;
        let executor = self.connector.connect(credentials).await?;
        services::update_stack_env(executor.as_ref(), stack, env).await
    }
}

fn known_stack(name: &str) -> Result<StackId, OrchestratorError> {
    StackId::from_name(name)
        .ok_or_else(|| OrchestratorError::NotFound(format!("unknown stack '{}'", name)))
}
