//! Application state management

use std::sync::Arc;

use tracing::{info, warn};

use crate::app::options::AppOptions;
use crate::deploy::StackDeployer;
use crate::dns::DnsClient;
use crate::errors::OrchestratorError;
use crate::jobs::JobStatus;
use crate::orchestrator::Orchestrator;
use crate::probe::StateProber;
use crate::remote::ssh::SshConnector;
use crate::remote::Connector;

/// Main application state
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
}

impl AppState {
    /// Initialize application state with the SSH transport
    pub fn init(options: &AppOptions) -> Result<Self, OrchestratorError> {
        let connector = Arc::new(SshConnector::new(options.ssh.clone()));
        Self::with_connector(options, connector)
    }

    /// Initialize application state over an arbitrary transport
    pub fn with_connector(
        options: &AppOptions,
        connector: Arc<dyn Connector>,
    ) -> Result<Self, OrchestratorError> {
        info!("Initializing application state...");

        let dns = DnsClient::new(&options.dns_api_base_url)?;
        let prober = StateProber::new(options.deployer.network_name.clone());
        let deployer = StackDeployer::new(options.deployer.clone());

        Ok(Self {
            orchestrator: Arc::new(Orchestrator::new(connector, prober, deployer, dns)),
        })
    }

    /// Shutdown application state
    ///
    /// Running jobs are not awaited; their remote commands keep running on
    /// the target host and the records are lost with the process.
    pub async fn shutdown(&self) -> Result<(), OrchestratorError> {
        info!("Shutting down application state...");
        let running: Vec<String> = self
            .orchestrator
            .all_install_status()
            .into_iter()
            .filter(|record| record.status == JobStatus::Running)
            .map(|record| record.service_key)
            .collect();
        if !running.is_empty() {
            warn!("Abandoning running jobs: {}", running.join(", "));
        }
        Ok(())
    }
}
