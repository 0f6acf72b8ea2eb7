//! Remote command execution on the target host
//!
//! Every operation that touches the target host goes through
//! [`RemoteExecutor`]. A [`Connector`] opens one executor per request from
//! the credentials carried in that request; nothing is retained between
//! requests.

pub mod ssh;

use std::sync::Arc;

use async_trait::async_trait;
use secrecy::SecretString;
use serde::Deserialize;

use crate::errors::OrchestratorError;

/// Credentials for the target host, supplied with every request
#[derive(Debug, Deserialize)]
pub struct Credentials {
    /// Host address (IP or hostname)
    pub host: String,

    /// Login user
    pub username: String,

    /// Password authentication
    #[serde(default)]
    pub password: Option<SecretString>,

    /// PEM-encoded private key authentication
    #[serde(default)]
    pub private_key: Option<SecretString>,
}

impl Credentials {
    /// Reject credentials that cannot possibly authenticate
    pub fn validate(&self) -> Result<(), OrchestratorError> {
        if self.host.trim().is_empty() {
            return Err(OrchestratorError::ValidationError(
                "host must not be empty".to_string(),
            ));
        }
        if self.username.trim().is_empty() {
            return Err(OrchestratorError::ValidationError(
                "username must not be empty".to_string(),
            ));
        }
        if self.password.is_none() && self.private_key.is_none() {
            return Err(OrchestratorError::ValidationError(
                "either password or private_key is required".to_string(),
            ));
        }
        Ok(())
    }
}

/// Result of a remote command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: u32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Best diagnostic text for a failed command
    pub fn diagnostic(&self) -> String {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            self.stdout.trim().to_string()
        } else {
            stderr.to_string()
        }
    }

    /// Trimmed stdout on success, `CommandFailed` otherwise
    pub fn into_result(self, command: &str) -> Result<String, OrchestratorError> {
        if self.success() {
            Ok(self.stdout.trim().to_string())
        } else {
            Err(self.into_error(command))
        }
    }

    pub fn into_error(self, command: &str) -> OrchestratorError {
        OrchestratorError::CommandFailed {
            command: command.to_string(),
            exit_code: self.exit_code,
            stderr: self.diagnostic(),
        }
    }
}

/// An authenticated channel to one target host
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    /// Address of the host this executor is connected to
    fn host(&self) -> &str;

    /// Run a short command under the per-call timeout
    async fn run(&self, command: &str) -> Result<CommandOutput, OrchestratorError>;

    /// Run a command that may legitimately take minutes (package installs)
    async fn run_long(&self, command: &str) -> Result<CommandOutput, OrchestratorError>;

    /// Write `content` to `remote_path`, creating parent directories
    async fn upload(&self, content: &[u8], remote_path: &str) -> Result<(), OrchestratorError>;

    /// Run a short command and fail on non-zero exit
    async fn run_checked(&self, command: &str) -> Result<String, OrchestratorError> {
        self.run(command).await?.into_result(command)
    }

    /// Run a long command and fail on non-zero exit
    async fn run_long_checked(&self, command: &str) -> Result<String, OrchestratorError> {
        self.run_long(command).await?.into_result(command)
    }
}

/// Opens executors from request credentials
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(
        &self,
        credentials: &Credentials,
    ) -> Result<Arc<dyn RemoteExecutor>, OrchestratorError>;
}
