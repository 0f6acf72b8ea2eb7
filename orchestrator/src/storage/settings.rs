//! Settings file management

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::deploy::DeployerOptions;
use crate::dns::CLOUDFLARE_API;
use crate::errors::OrchestratorError;
use crate::filesys::file::File;
use crate::logs::{LogLevel, LogOptions};
use crate::remote::ssh::SshOptions;

/// Orchestrator settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Emit JSON log lines
    #[serde(default)]
    pub log_json: bool,

    /// Directory for rolling log files
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// HTTP listener
    #[serde(default)]
    pub server: ServerSettings,

    /// SSH transport
    #[serde(default)]
    pub ssh: SshSettings,

    /// Swarm layout on the target host
    #[serde(default)]
    pub swarm: SwarmSettings,

    /// DNS provider
    #[serde(default)]
    pub dns: DnsSettings,

    /// Process lifecycle
    #[serde(default)]
    pub lifecycle: LifecycleSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            log_json: false,
            log_dir: None,
            server: ServerSettings::default(),
            ssh: SshSettings::default(),
            swarm: SwarmSettings::default(),
            dns: DnsSettings::default(),
            lifecycle: LifecycleSettings::default(),
        }
    }
}

impl Settings {
    /// Read settings from `path`; a missing file yields the defaults
    pub async fn load(path: &Path) -> Result<Self, OrchestratorError> {
        let file = File::new(path);
        if !file.exists().await {
            info!("No settings file at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        file.read_json().await
    }

    /// Write the default settings to `path`
    pub async fn write_defaults(path: &Path) -> Result<Self, OrchestratorError> {
        let settings = Self::default();
        File::new(path).write_json(&settings).await?;
        Ok(settings)
    }

    pub fn max_shutdown_delay(&self) -> Duration {
        Duration::from_secs(self.lifecycle.max_shutdown_delay_secs)
    }

    pub fn log_options(&self) -> LogOptions {
        LogOptions {
            log_level: self.log_level.clone(),
            stdout: true,
            log_dir: self.log_dir.clone(),
            json_format: self.log_json,
        }
    }

    pub fn ssh_options(&self) -> SshOptions {
        SshOptions {
            port: self.ssh.port,
            connect_timeout: Duration::from_secs(self.ssh.connect_timeout_secs),
            command_timeout: Duration::from_secs(self.ssh.command_timeout_secs),
            long_command_timeout: Duration::from_secs(self.ssh.long_command_timeout_secs),
        }
    }

    pub fn deployer_options(&self) -> DeployerOptions {
        DeployerOptions {
            stack_dir: self.swarm.stack_dir.clone(),
            network_name: self.swarm.network_name.clone(),
            ..DeployerOptions::default()
        }
    }
}

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_server_host")]
    pub host: String,

    #[serde(default = "default_server_port")]
    pub port: u16,
}

fn default_server_host() -> String {
    "0.0.0.0".to_string()
}

fn default_server_port() -> u16 {
    8000
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_server_host(),
            port: default_server_port(),
        }
    }
}

/// SSH settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SshSettings {
    #[serde(default = "default_ssh_port")]
    pub port: u16,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Per-call limit for short commands
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,

    /// Per-call limit for package installs and deploys
    #[serde(default = "default_long_command_timeout")]
    pub long_command_timeout_secs: u64,
}

fn default_ssh_port() -> u16 {
    22
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_command_timeout() -> u64 {
    30
}

fn default_long_command_timeout() -> u64 {
    600
}

impl Default for SshSettings {
    fn default() -> Self {
        Self {
            port: default_ssh_port(),
            connect_timeout_secs: default_connect_timeout(),
            command_timeout_secs: default_command_timeout(),
            long_command_timeout_secs: default_long_command_timeout(),
        }
    }
}

/// Swarm settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwarmSettings {
    /// Overlay network shared by every stack
    #[serde(default = "default_network_name")]
    pub network_name: String,

    /// Remote directory for rendered stack files
    #[serde(default = "default_stack_dir")]
    pub stack_dir: String,
}

fn default_network_name() -> String {
    "network_swarm_public".to_string()
}

fn default_stack_dir() -> String {
    "/root/stacks".to_string()
}

impl Default for SwarmSettings {
    fn default() -> Self {
        Self {
            network_name: default_network_name(),
            stack_dir: default_stack_dir(),
        }
    }
}

/// DNS provider settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DnsSettings {
    #[serde(default = "default_dns_api")]
    pub api_base_url: String,
}

fn default_dns_api() -> String {
    CLOUDFLARE_API.to_string()
}

impl Default for DnsSettings {
    fn default() -> Self {
        Self {
            api_base_url: default_dns_api(),
        }
    }
}

/// Lifecycle settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleSettings {
    /// Upper bound on graceful shutdown
    #[serde(default = "default_max_shutdown_delay")]
    pub max_shutdown_delay_secs: u64,
}

fn default_max_shutdown_delay() -> u64 {
    10
}

impl Default for LifecycleSettings {
    fn default() -> Self {
        Self {
            max_shutdown_delay_secs: default_max_shutdown_delay(),
        }
    }
}
