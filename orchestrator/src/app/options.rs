//! Application configuration options

use std::time::Duration;

use crate::deploy::DeployerOptions;
use crate::dns::CLOUDFLARE_API;
use crate::remote::ssh::SshOptions;
use crate::storage::settings::Settings;

/// Main application options
#[derive(Debug, Clone)]
pub struct AppOptions {
    /// Lifecycle configuration
    pub lifecycle: LifecycleOptions,

    /// Server configuration
    pub server: ServerOptions,

    /// SSH transport to target hosts
    pub ssh: SshOptions,

    /// Stack deployment
    pub deployer: DeployerOptions,

    /// DNS provider API base URL
    pub dns_api_base_url: String,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            lifecycle: LifecycleOptions::default(),
            server: ServerOptions::default(),
            ssh: SshOptions::default(),
            deployer: DeployerOptions::default(),
            dns_api_base_url: CLOUDFLARE_API.to_string(),
        }
    }
}

impl From<&Settings> for AppOptions {
    fn from(settings: &Settings) -> Self {
        Self {
            lifecycle: LifecycleOptions {
                max_shutdown_delay: settings.max_shutdown_delay(),
            },
            server: ServerOptions {
                host: settings.server.host.clone(),
                port: settings.server.port,
            },
            ssh: settings.ssh_options(),
            deployer: settings.deployer_options(),
            dns_api_base_url: settings.dns.api_base_url.clone(),
        }
    }
}

/// Lifecycle options for the orchestrator process
#[derive(Debug, Clone)]
pub struct LifecycleOptions {
    /// Maximum delay for graceful shutdown
    pub max_shutdown_delay: Duration,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            max_shutdown_delay: Duration::from_secs(10),
        }
    }
}

/// Local HTTP server options
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}
