//! Catalog of installable units and the stacks they deploy
//!
//! Everything here is fixed at compile time. Stack detection matches the
//! names reported by the host against [`StackId::KNOWN`] exactly, so an
//! unrelated stack such as `redis_cache` is never mistaken for `redis`.

pub mod params;

use serde::{Deserialize, Serialize};

/// Job key for upgrading an installed Docker engine
pub const DOCKER_UPGRADE_KEY: &str = "docker-upgrade";

/// Job key for re-applying the Docker API compatibility override
pub const DOCKER_CONFIG_KEY: &str = "docker-config";

/// Whether a unit changes the host itself or deploys stacks onto it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitKind {
    Host,
    Application,
}

/// An installable unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Unit {
    Docker,
    Swarm,
    Network,
    Ctop,
    Traefik,
    Portainer,
    Redis,
    Postgres,
    Rabbitmq,
    Minio,
    Baserow,
    N8n,
    Chatwoot,
}

impl Unit {
    pub const ALL: [Unit; 13] = [
        Unit::Docker,
        Unit::Swarm,
        Unit::Network,
        Unit::Ctop,
        Unit::Traefik,
        Unit::Portainer,
        Unit::Redis,
        Unit::Postgres,
        Unit::Rabbitmq,
        Unit::Minio,
        Unit::Baserow,
        Unit::N8n,
        Unit::Chatwoot,
    ];

    /// Stable key used for job tracking and routing
    pub fn service_key(self) -> &'static str {
        match self {
            Unit::Docker => "docker",
            Unit::Swarm => "swarm",
            Unit::Network => "network",
            Unit::Ctop => "ctop",
            Unit::Traefik => "traefik",
            Unit::Portainer => "portainer",
            Unit::Redis => "redis",
            Unit::Postgres => "postgres",
            Unit::Rabbitmq => "rabbitmq",
            Unit::Minio => "minio",
            Unit::Baserow => "baserow",
            Unit::N8n => "n8n",
            Unit::Chatwoot => "chatwoot",
        }
    }

    pub fn from_service_key(key: &str) -> Option<Unit> {
        Unit::ALL.into_iter().find(|unit| unit.service_key() == key)
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Unit::Docker => "Docker Engine",
            Unit::Swarm => "Docker Swarm",
            Unit::Network => "Overlay network",
            Unit::Ctop => "Ctop",
            Unit::Traefik => "Traefik",
            Unit::Portainer => "Portainer",
            Unit::Redis => "Redis",
            Unit::Postgres => "Postgres",
            Unit::Rabbitmq => "RabbitMQ",
            Unit::Minio => "MinIO",
            Unit::Baserow => "Baserow",
            Unit::N8n => "n8n",
            Unit::Chatwoot => "Chatwoot",
        }
    }

    pub fn kind(self) -> UnitKind {
        match self {
            Unit::Docker | Unit::Swarm | Unit::Network | Unit::Ctop => UnitKind::Host,
            _ => UnitKind::Application,
        }
    }

    /// Stacks deployed by this unit, primary stack first
    pub fn stacks(self) -> &'static [StackId] {
        match self {
            Unit::Docker | Unit::Swarm | Unit::Network | Unit::Ctop => &[],
            Unit::Traefik => &[StackId::Traefik],
            Unit::Portainer => &[StackId::Portainer],
            Unit::Redis => &[StackId::Redis],
            Unit::Postgres => &[StackId::Postgres],
            Unit::Rabbitmq => &[StackId::Rabbitmq],
            Unit::Minio => &[StackId::Minio],
            Unit::Baserow => &[StackId::Baserow],
            Unit::N8n => &[StackId::N8nEditor, StackId::N8nWebhook, StackId::N8nWorker],
            Unit::Chatwoot => &[StackId::ChatwootAdmin, StackId::ChatwootSidekiq],
        }
    }

    /// The stack whose presence marks the unit as installed
    pub fn primary_stack(self) -> Option<StackId> {
        self.stacks().first().copied()
    }

    /// Request parameters that must be present and non-empty
    pub fn required_params(self) -> &'static [&'static str] {
        match self {
            Unit::Docker | Unit::Swarm | Unit::Network | Unit::Ctop => &[],
            Unit::Traefik => &["email"],
            Unit::Portainer => &["portainer_host"],
            Unit::Redis => &[],
            Unit::Postgres => &["postgres_password"],
            Unit::Rabbitmq => &["rabbit_user", "rabbit_password", "rabbit_host"],
            Unit::Minio => &[
                "minio_user",
                "minio_password",
                "minio_console_host",
                "minio_api_host",
            ],
            Unit::Baserow => &["baserow_host", "postgres_password"],
            Unit::N8n => &["postgres_password", "n8n_host", "n8n_webhook_host"],
            Unit::Chatwoot => &[
                "postgres_password",
                "minio_user",
                "minio_password",
                "minio_api_host",
                "chatwoot_host",
            ],
        }
    }

    /// Postgres database the unit needs before its stacks start
    pub fn database(self) -> Option<&'static str> {
        match self {
            Unit::Baserow => Some("baserow"),
            Unit::N8n => Some("n8n_queue"),
            Unit::Chatwoot => Some("chatwoot"),
            _ => None,
        }
    }
}

impl std::fmt::Display for Unit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

/// A stack identifier as deployed with `docker stack deploy`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StackId {
    Traefik,
    Portainer,
    Redis,
    Postgres,
    Rabbitmq,
    Minio,
    Baserow,
    N8nEditor,
    N8nWebhook,
    N8nWorker,
    ChatwootAdmin,
    ChatwootSidekiq,
}

impl StackId {
    pub const KNOWN: [StackId; 12] = [
        StackId::Traefik,
        StackId::Portainer,
        StackId::Redis,
        StackId::Postgres,
        StackId::Rabbitmq,
        StackId::Minio,
        StackId::Baserow,
        StackId::N8nEditor,
        StackId::N8nWebhook,
        StackId::N8nWorker,
        StackId::ChatwootAdmin,
        StackId::ChatwootSidekiq,
    ];

    pub fn name(self) -> &'static str {
        match self {
            StackId::Traefik => "traefik",
            StackId::Portainer => "portainer",
            StackId::Redis => "redis",
            StackId::Postgres => "postgres",
            StackId::Rabbitmq => "rabbitmq",
            StackId::Minio => "minio",
            StackId::Baserow => "baserow",
            StackId::N8nEditor => "n8n_editor",
            StackId::N8nWebhook => "n8n_webhook",
            StackId::N8nWorker => "n8n_worker",
            StackId::ChatwootAdmin => "chatwoot_admin",
            StackId::ChatwootSidekiq => "chatwoot_sidekiq",
        }
    }

    /// Exact match against the known identifiers
    pub fn from_name(name: &str) -> Option<StackId> {
        let name = name.trim();
        StackId::KNOWN.into_iter().find(|stack| stack.name() == name)
    }

    /// Unit that owns this stack
    pub fn unit(self) -> Unit {
        match self {
            StackId::Traefik => Unit::Traefik,
            StackId::Portainer => Unit::Portainer,
            StackId::Redis => Unit::Redis,
            StackId::Postgres => Unit::Postgres,
            StackId::Rabbitmq => Unit::Rabbitmq,
            StackId::Minio => Unit::Minio,
            StackId::Baserow => Unit::Baserow,
            StackId::N8nEditor | StackId::N8nWebhook | StackId::N8nWorker => Unit::N8n,
            StackId::ChatwootAdmin | StackId::ChatwootSidekiq => Unit::Chatwoot,
        }
    }

    /// Environment variables an operator may edit on the running stack
    pub fn editable_env(self) -> &'static [&'static str] {
        match self {
            StackId::Traefik => &["TRAEFIK_CERTIFICATESRESOLVERS_LETSENCRYPTRESOLVER_ACME_EMAIL"],
            StackId::Portainer | StackId::Redis => &[],
            StackId::Postgres => &["POSTGRES_PASSWORD"],
            StackId::Rabbitmq => &["RABBITMQ_DEFAULT_USER", "RABBITMQ_DEFAULT_PASS"],
            StackId::Minio => &["MINIO_ROOT_USER", "MINIO_ROOT_PASSWORD"],
            StackId::Baserow => &["BASEROW_PUBLIC_URL", "DATABASE_PASSWORD"],
            StackId::N8nEditor | StackId::N8nWebhook | StackId::N8nWorker => {
                &["N8N_HOST", "WEBHOOK_URL", "DB_POSTGRESDB_PASSWORD"]
            }
            StackId::ChatwootAdmin | StackId::ChatwootSidekiq => {
                &["FRONTEND_URL", "POSTGRES_PASSWORD"]
            }
        }
    }
}

impl std::fmt::Display for StackId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
