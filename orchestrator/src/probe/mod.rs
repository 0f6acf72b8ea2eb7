//! State prober
//!
//! Reads the current infrastructure state of the target host. Every
//! sub-probe is independent: a failure degrades that one field to its
//! negative value and never fails the whole probe.

use std::collections::BTreeSet;

use serde::{Serialize, Serializer};
use tracing::debug;

use crate::catalog::{StackId, Unit};
use crate::remote::RemoteExecutor;
use crate::utils::shell_quote;

const NAME_FORMAT: &str = "'{{.Name}}'";
const SWARM_STATE_CMD: &str = "docker info --format '{{.Swarm.LocalNodeState}}'";
const DOCKER_VERSION_CMD: &str = "docker --version";
/// Non-login shells can leave /usr/local/bin off the PATH
const CTOP_CMD: &str = "export PATH=\"$PATH:/usr/local/bin\"; command -v ctop";

/// Host-level state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SystemStatus {
    /// Engine version, `None` when Docker is absent
    pub docker_version: Option<String>,

    /// Swarm mode is active on this node
    pub swarm_active: bool,

    /// The configured overlay network exists
    pub network_present: bool,

    /// The ctop monitor is on the PATH
    pub monitor_installed: bool,
}

/// Known stacks currently deployed on the host
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstalledStacks(BTreeSet<StackId>);

impl InstalledStacks {
    /// Match `docker stack ls` output against the known identifiers
    pub fn from_listing(listing: &str) -> Self {
        Self(listing.lines().filter_map(StackId::from_name).collect())
    }

    pub fn contains(&self, stack: StackId) -> bool {
        self.0.contains(&stack)
    }

    pub fn iter(&self) -> impl Iterator<Item = StackId> + '_ {
        self.0.iter().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<StackId> for InstalledStacks {
    fn from_iter<I: IntoIterator<Item = StackId>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Serialize for InstalledStacks {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.0.iter().map(|stack| stack.name()))
    }
}

/// Everything one probe learned about the host
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    pub system_status: SystemStatus,
    pub detected_stacks: InstalledStacks,
}

impl Snapshot {
    /// Whether `unit` is already present on the host
    pub fn is_satisfied(&self, unit: Unit) -> bool {
        match unit {
            Unit::Docker => self.system_status.docker_version.is_some(),
            Unit::Swarm => self.system_status.swarm_active,
            Unit::Network => self.system_status.network_present,
            Unit::Ctop => self.system_status.monitor_installed,
            app => app
                .primary_stack()
                .is_some_and(|stack| self.detected_stacks.contains(stack)),
        }
    }
}

/// Runs the read-only queries that make up a snapshot
#[derive(Debug, Clone)]
pub struct StateProber {
    network_name: String,
}

impl StateProber {
    pub fn new(network_name: impl Into<String>) -> Self {
        Self {
            network_name: network_name.into(),
        }
    }

    /// Probe the host; never fails
    pub async fn probe(&self, executor: &dyn RemoteExecutor) -> Snapshot {
        let (docker_version, swarm_active, network_present, monitor_installed, detected_stacks) = tokio::join!(
            self.docker_version(executor),
            self.swarm_active(executor),
            self.network_present(executor),
            self.monitor_installed(executor),
            self.installed_stacks(executor),
        );

        let snapshot = Snapshot {
            system_status: SystemStatus {
                docker_version,
                swarm_active,
                network_present,
                monitor_installed,
            },
            detected_stacks,
        };
        debug!("Probe of {}: {:?}", executor.host(), snapshot);
        snapshot
    }

    async fn docker_version(&self, executor: &dyn RemoteExecutor) -> Option<String> {
        let output = query(executor, DOCKER_VERSION_CMD).await?;
        parse_docker_version(&output)
    }

    async fn swarm_active(&self, executor: &dyn RemoteExecutor) -> bool {
        query(executor, SWARM_STATE_CMD)
            .await
            .is_some_and(|state| state.trim() == "active")
    }

    async fn network_present(&self, executor: &dyn RemoteExecutor) -> bool {
        let filter = shell_quote(&format!("name=^{}$", self.network_name));
        let command = format!("docker network ls --filter {} --format {}", filter, NAME_FORMAT);
        query(executor, &command)
            .await
            .is_some_and(|listing| listing.lines().any(|name| name.trim() == self.network_name))
    }

    async fn monitor_installed(&self, executor: &dyn RemoteExecutor) -> bool {
        query(executor, CTOP_CMD)
            .await
            .is_some_and(|path| !path.trim().is_empty())
    }

    async fn installed_stacks(&self, executor: &dyn RemoteExecutor) -> InstalledStacks {
        let command = format!("docker stack ls --format {}", NAME_FORMAT);
        query(executor, &command)
            .await
            .map(|listing| InstalledStacks::from_listing(&listing))
            .unwrap_or_default()
    }
}

/// Run a read-only query, folding every failure into `None`
async fn query(executor: &dyn RemoteExecutor, command: &str) -> Option<String> {
    match executor.run_checked(command).await {
        Ok(stdout) => Some(stdout),
        Err(e) => {
            debug!("Probe `{}` degraded: {}", command, e);
            None
        }
    }
}

/// `Docker version 27.3.1, build ce12230` -> `27.3.1`
fn parse_docker_version(output: &str) -> Option<String> {
    let line = output.lines().next()?.trim();
    let version = line
        .strip_prefix("Docker version ")
        .map(|rest| rest.split(',').next().unwrap_or(rest).trim())
        .unwrap_or(line);
    if version.is_empty() {
        None
    } else {
        Some(version.to_string())
    }
}
