//! Scripted remote hosts for tests

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use secrecy::SecretString;
use tokio::sync::Semaphore;

use swarmdeck::deploy::{DeployerOptions, StackDeployer};
use swarmdeck::dns::{DnsClient, CLOUDFLARE_API};
use swarmdeck::errors::OrchestratorError;
use swarmdeck::jobs::JobRecord;
use swarmdeck::orchestrator::Orchestrator;
use swarmdeck::probe::StateProber;
use swarmdeck::remote::{CommandOutput, Connector, Credentials, RemoteExecutor};

pub const HOST: &str = "10.0.0.5";
pub const NETWORK: &str = "network_swarm_public";
pub const DOCKER_VERSION: &str = "Docker version 27.3.1, build ce12230";

/// In-memory host answering commands by prefix; the last matching rule wins
///
/// `docker service update --env-add` edits are remembered per service and
/// merged into later `docker service inspect` answers.
pub struct ScriptedExecutor {
    host: String,
    rules: Vec<(String, CommandOutput)>,
    gates: Vec<(String, Arc<Semaphore>)>,
    calls: Mutex<Vec<String>>,
    uploads: Mutex<Vec<(String, String)>>,
    service_env: Mutex<HashMap<String, BTreeMap<String, String>>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self {
            host: HOST.to_string(),
            rules: Vec::new(),
            gates: Vec::new(),
            calls: Mutex::new(Vec::new()),
            uploads: Mutex::new(Vec::new()),
            service_env: Mutex::new(HashMap::new()),
        }
    }

    pub fn ok(mut self, prefix: &str, stdout: &str) -> Self {
        self.rules.push((
            prefix.to_string(),
            CommandOutput {
                exit_code: 0,
                stdout: stdout.to_string(),
                stderr: String::new(),
            },
        ));
        self
    }

    pub fn fail(mut self, prefix: &str, exit_code: u32, stderr: &str) -> Self {
        self.rules.push((
            prefix.to_string(),
            CommandOutput {
                exit_code,
                stdout: String::new(),
                stderr: stderr.to_string(),
            },
        ));
        self
    }

    /// Commands starting with `prefix` wait for a permit on `gate`
    pub fn gate(mut self, prefix: &str, gate: Arc<Semaphore>) -> Self {
        self.gates.push((prefix.to_string(), gate));
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_starting_with(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }

    pub fn uploads(&self) -> Vec<(String, String)> {
        self.uploads.lock().unwrap().clone()
    }

    fn answer(&self, command: &str) -> CommandOutput {
        let output = self.scripted_answer(command);
        let tokens: Vec<&str> = command.split_whitespace().collect();
        match tokens.as_slice() {
            ["docker", "service", "update", args @ .., service] if output.success() => {
                let mut env = self.service_env.lock().unwrap();
                let edits = env.entry(unquote(service)).or_default();
                for pair in args.windows(2).filter(|pair| pair[0] == "--env-add") {
                    if let Some((key, value)) = unquote(pair[1]).split_once('=') {
                        edits.insert(key.to_string(), value.to_string());
                    }
                }
                output
            }
            ["docker", "service", "inspect", service, ..] if output.success() => {
                let env = self.service_env.lock().unwrap();
                let Some(edits) = env.get(&unquote(service)) else {
                    return output;
                };
                let mut entries: Vec<String> =
                    serde_json::from_str(output.stdout.trim()).unwrap_or_default();
                entries.retain(|entry| {
                    entry
                        .split_once('=')
                        .map_or(true, |(key, _)| !edits.contains_key(key))
                });
                entries.extend(edits.iter().map(|(key, value)| format!("{}={}", key, value)));
                CommandOutput {
                    stdout: serde_json::to_string(&entries).unwrap(),
                    ..output
                }
            }
            _ => output,
        }
    }

    fn scripted_answer(&self, command: &str) -> CommandOutput {
        self.rules
            .iter()
            .rev()
            .find(|(prefix, _)| command.starts_with(prefix.as_str()))
            .map(|(_, output)| output.clone())
            .unwrap_or_else(|| CommandOutput {
                exit_code: 127,
                stdout: String::new(),
                stderr: format!("sh: 1: {}: not found", command),
            })
    }
}

#[async_trait]
impl RemoteExecutor for ScriptedExecutor {
    fn host(&self) -> &str {
        &self.host
    }

    async fn run(&self, command: &str) -> Result<CommandOutput, OrchestratorError> {
        self.calls.lock().unwrap().push(command.to_string());
        let gate = self
            .gates
            .iter()
            .find(|(prefix, _)| command.starts_with(prefix.as_str()))
            .map(|(_, gate)| gate.clone());
        if let Some(gate) = gate {
            gate.acquire().await.unwrap().forget();
        }
        Ok(self.answer(command))
    }

    async fn run_long(&self, command: &str) -> Result<CommandOutput, OrchestratorError> {
        self.run(command).await
    }

    async fn upload(&self, content: &[u8], remote_path: &str) -> Result<(), OrchestratorError> {
        self.uploads.lock().unwrap().push((
            remote_path.to_string(),
            String::from_utf8_lossy(content).to_string(),
        ));
        Ok(())
    }
}

fn unquote(token: &str) -> String {
    token.trim_matches('\'').to_string()
}

/// Host with nothing installed
pub fn fresh_host() -> ScriptedExecutor {
    ScriptedExecutor::new()
}

/// Host with the engine installed but swarm mode off
pub fn docker_host() -> ScriptedExecutor {
    ScriptedExecutor::new()
        .ok("docker --version", DOCKER_VERSION)
        .ok("docker info", "inactive")
        .ok("docker network ls", "")
        .ok("docker stack ls", "")
}

/// Host with engine, swarm and network in place and `stacks` deployed
pub fn swarm_host(stacks: &[&str]) -> ScriptedExecutor {
    docker_host()
        .ok("docker info", "active")
        .ok("docker network ls", NETWORK)
        .ok("docker stack ls", &stacks.join("\n"))
}

/// Hands out the same scripted executor for every connection
pub struct ScriptedConnector {
    executor: Arc<ScriptedExecutor>,
    connects: AtomicUsize,
}

impl ScriptedConnector {
    pub fn new(executor: Arc<ScriptedExecutor>) -> Self {
        Self {
            executor,
            connects: AtomicUsize::new(0),
        }
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(
        &self,
        credentials: &Credentials,
    ) -> Result<Arc<dyn RemoteExecutor>, OrchestratorError> {
        credentials.validate()?;
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(self.executor.clone())
    }
}

/// Rejects every login
pub struct RejectingConnector;

#[async_trait]
impl Connector for RejectingConnector {
    async fn connect(
        &self,
        credentials: &Credentials,
    ) -> Result<Arc<dyn RemoteExecutor>, OrchestratorError> {
        Err(OrchestratorError::AuthError(format!(
            "{}@{} rejected the supplied credentials",
            credentials.username, credentials.host
        )))
    }
}

pub fn credentials() -> Credentials {
    Credentials {
        host: HOST.to_string(),
        username: "root".to_string(),
        password: Some(SecretString::from("hunter2")),
        private_key: None,
    }
}

pub fn deployer() -> StackDeployer {
    StackDeployer::new(DeployerOptions {
        migrate_attempts: 2,
        migrate_interval: Duration::from_millis(10),
        ..DeployerOptions::default()
    })
}

pub fn orchestrator(connector: Arc<dyn Connector>) -> Orchestrator {
    Orchestrator::new(
        connector,
        StateProber::new(NETWORK),
        deployer(),
        DnsClient::new(CLOUDFLARE_API).unwrap(),
    )
}

/// Orchestrator over `executor`, plus the connector for call counting
pub fn scripted(executor: ScriptedExecutor) -> (Orchestrator, Arc<ScriptedExecutor>, Arc<ScriptedConnector>) {
    let executor = Arc::new(executor);
    let connector = Arc::new(ScriptedConnector::new(executor.clone()));
    (orchestrator(connector.clone()), executor, connector)
}

/// Poll until the job for `service_key` leaves `running`
pub async fn wait_terminal(orchestrator: &Orchestrator, service_key: &str) -> JobRecord {
    for _ in 0..200 {
        let record = orchestrator.install_status(service_key);
        if record.status.is_terminal() {
            return record;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {} never finished", service_key);
}
