//! SSH backend for the remote executor

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use russh::client::{self, Handle};
use russh::ChannelMsg;
use russh_keys::key;
use secrecy::ExposeSecret;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::errors::OrchestratorError;
use crate::remote::{CommandOutput, Connector, Credentials, RemoteExecutor};
use crate::utils::{parent_dir, shell_quote};

/// SSH connection options
#[derive(Debug, Clone)]
pub struct SshOptions {
    /// SSH port on the target host
    pub port: u16,

    /// Timeout for TCP connect plus handshake plus authentication
    pub connect_timeout: Duration,

    /// Per-call timeout for short commands
    pub command_timeout: Duration,

    /// Per-call timeout for package installs and similar
    pub long_command_timeout: Duration,
}

impl Default for SshOptions {
    fn default() -> Self {
        Self {
            port: 22,
            connect_timeout: Duration::from_secs(30),
            command_timeout: Duration::from_secs(30),
            long_command_timeout: Duration::from_secs(600),
        }
    }
}

/// Accepts any host key; the operator is provisioning a freshly created host
struct HostKeyPolicy {
    host: String,
}

#[async_trait]
impl client::Handler for HostKeyPolicy {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &key::PublicKey,
    ) -> Result<bool, Self::Error> {
        debug!("Accepting host key for {}", self.host);
        Ok(true)
    }
}

/// Opens SSH sessions
#[derive(Debug, Clone, Default)]
pub struct SshConnector {
    options: SshOptions,
}

impl SshConnector {
    pub fn new(options: SshOptions) -> Self {
        Self { options }
    }

    async fn connect_impl(
        &self,
        credentials: &Credentials,
    ) -> Result<Handle<HostKeyPolicy>, OrchestratorError> {
        let config = Arc::new(client::Config {
            inactivity_timeout: Some(self.options.long_command_timeout),
            ..Default::default()
        });

        let handler = HostKeyPolicy {
            host: credentials.host.clone(),
        };
        let mut handle = client::connect(
            config,
            (credentials.host.as_str(), self.options.port),
            handler,
        )
        .await
        .map_err(|e| {
            OrchestratorError::ConnectionError(format!(
                "unable to reach {}:{}: {}",
                credentials.host, self.options.port, e
            ))
        })?;

        let mut authenticated = false;

        if let Some(pem) = &credentials.private_key {
            let key_pair = russh_keys::decode_secret_key(pem.expose_secret(), None).map_err(|e| {
                OrchestratorError::ValidationError(format!("invalid private key: {}", e))
            })?;
            authenticated = handle
                .authenticate_publickey(credentials.username.as_str(), Arc::new(key_pair))
                .await?;
            if !authenticated {
                warn!("Public key rejected for {}@{}", credentials.username, credentials.host);
            }
        }

        if !authenticated {
            if let Some(password) = &credentials.password {
                authenticated = handle
                    .authenticate_password(
                        credentials.username.as_str(),
                        password.expose_secret(),
                    )
                    .await?;
            }
        }

        if !authenticated {
            return Err(OrchestratorError::AuthError(format!(
                "{}@{} rejected the supplied credentials",
                credentials.username, credentials.host
            )));
        }

        Ok(handle)
    }
}

#[async_trait]
impl Connector for SshConnector {
    async fn connect(
        &self,
        credentials: &Credentials,
    ) -> Result<Arc<dyn RemoteExecutor>, OrchestratorError> {
        credentials.validate()?;
        info!("Connecting to {}@{}", credentials.username, credentials.host);

        let secs = self.options.connect_timeout.as_secs();
        let handle = tokio::time::timeout(self.options.connect_timeout, self.connect_impl(credentials))
            .await
            .map_err(|_| OrchestratorError::Timeout {
                operation: format!("connect to {}", credentials.host),
                secs,
            })??;

        info!("SSH session established with {}", credentials.host);
        Ok(Arc::new(SshExecutor {
            host: credentials.host.clone(),
            handle: Mutex::new(handle),
            options: self.options.clone(),
        }))
    }
}

/// An authenticated SSH session
pub struct SshExecutor {
    host: String,
    handle: Mutex<Handle<HostKeyPolicy>>,
    options: SshOptions,
}

impl SshExecutor {
    async fn exec(
        &self,
        command: &str,
        stdin: Option<&[u8]>,
        limit: Duration,
    ) -> Result<CommandOutput, OrchestratorError> {
        debug!("CMD [{}]: {}", self.host, command);

        let exchange = async {
            let mut channel = {
                let handle = self.handle.lock().await;
                handle.channel_open_session().await?
            };
            channel.exec(true, command).await?;

            if let Some(data) = stdin {
                channel.data(data).await?;
                channel.eof().await?;
            }

            let mut stdout = Vec::new();
            let mut stderr = Vec::new();
            let mut exit_code = None;

            while let Some(msg) = channel.wait().await {
                match msg {
                    ChannelMsg::Data { ref data } => stdout.extend_from_slice(data),
                    ChannelMsg::ExtendedData { ref data, ext } if ext == 1 => {
                        stderr.extend_from_slice(data)
                    }
                    ChannelMsg::ExitStatus { exit_status } => exit_code = Some(exit_status),
                    _ => {}
                }
            }

            let exit_code = exit_code.ok_or_else(|| {
                OrchestratorError::ConnectionError(format!(
                    "channel to {} closed without exit status",
                    self.host
                ))
            })?;

            Ok::<_, OrchestratorError>(CommandOutput {
                exit_code,
                stdout: String::from_utf8_lossy(&stdout).into_owned(),
                stderr: String::from_utf8_lossy(&stderr).into_owned(),
            })
        };

        let output = tokio::time::timeout(limit, exchange)
            .await
            .map_err(|_| OrchestratorError::Timeout {
                operation: command.to_string(),
                secs: limit.as_secs(),
            })??;

        if output.success() {
            debug!("OK [{}]: {}", self.host, command);
        } else {
            debug!(
                "EXIT {} [{}]: {}: {}",
                output.exit_code,
                self.host,
                command,
                output.diagnostic()
            );
        }
        Ok(output)
    }
}

#[async_trait]
impl RemoteExecutor for SshExecutor {
    fn host(&self) -> &str {
        &self.host
    }

    async fn run(&self, command: &str) -> Result<CommandOutput, OrchestratorError> {
        self.exec(command, None, self.options.command_timeout).await
    }

    async fn run_long(&self, command: &str) -> Result<CommandOutput, OrchestratorError> {
        self.exec(command, None, self.options.long_command_timeout)
            .await
    }

    async fn upload(&self, content: &[u8], remote_path: &str) -> Result<(), OrchestratorError> {
        let command = format!(
            "mkdir -p {} && cat > {}",
            shell_quote(parent_dir(remote_path)),
            shell_quote(remote_path)
        );
        info!("Uploading {} bytes to {}:{}", content.len(), self.host, remote_path);
        self.exec(&command, Some(content), self.options.command_timeout)
            .await?
            .into_result(&command)
            .map(|_| ())
    }
}
