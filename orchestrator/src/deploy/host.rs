//! Host provisioning actions: engine, swarm, overlay network, monitor

use tracing::{info, warn};

use crate::errors::OrchestratorError;
use crate::jobs::JobHandle;
use crate::remote::RemoteExecutor;
use crate::utils::shell_quote;

const DOCKER_PACKAGES: &str =
    "docker-ce docker-ce-cli containerd.io docker-buildx-plugin docker-compose-plugin";

const DOCKER_OVERRIDE_DIR: &str = "/etc/systemd/system/docker.service.d";
const DOCKER_OVERRIDE_FILE: &str = "/etc/systemd/system/docker.service.d/override.conf";

/// Minimum API version kept enabled for Traefik and Portainer
pub const DOCKER_MIN_API_VERSION: &str = "1.24";

/// (phase, command) pairs of the Debian engine install
fn docker_install_steps() -> Vec<(&'static str, String)> {
    vec![
        ("Updating package index", "sudo apt-get update".to_string()),
        (
            "Installing base packages",
            "sudo DEBIAN_FRONTEND=noninteractive apt-get install -y sudo gnupg2 wget ca-certificates apt-transport-https curl gnupg".to_string(),
        ),
        (
            "Adding Docker signing key",
            "sudo install -m 0755 -d /etc/apt/keyrings && curl -fsSL https://download.docker.com/linux/debian/gpg | sudo gpg --dearmor --batch --yes -o /etc/apt/keyrings/docker.gpg && sudo chmod a+r /etc/apt/keyrings/docker.gpg".to_string(),
        ),
        (
            "Adding Docker repository",
            r#"echo "deb [arch=$(dpkg --print-architecture) signed-by=/etc/apt/keyrings/docker.gpg] https://download.docker.com/linux/debian $(. /etc/os-release && echo "$VERSION_CODENAME") stable" | sudo tee /etc/apt/sources.list.d/docker.list >/dev/null"#.to_string(),
        ),
        ("Refreshing package index", "sudo apt-get update".to_string()),
        (
            "Installing Docker Engine",
            format!(
                "sudo DEBIAN_FRONTEND=noninteractive apt-get install -y {}",
                DOCKER_PACKAGES
            ),
        ),
        (
            "Enabling Docker services",
            "sudo systemctl enable docker.service && sudo systemctl enable containerd.service"
                .to_string(),
        ),
    ]
}

fn ctop_install_steps() -> Vec<(&'static str, String)> {
    vec![
        (
            "Installing prerequisites",
            "sudo DEBIAN_FRONTEND=noninteractive apt-get install -y ca-certificates curl gnupg lsb-release".to_string(),
        ),
        (
            "Adding azlux signing key",
            "curl -fsSL https://azlux.fr/repo.gpg.key | sudo gpg --dearmor --batch --yes -o /usr/share/keyrings/azlux-archive-keyring.gpg".to_string(),
        ),
        (
            "Adding azlux repository",
            r#"echo "deb [arch=$(dpkg --print-architecture) signed-by=/usr/share/keyrings/azlux-archive-keyring.gpg] http://packages.azlux.fr/debian $(lsb_release -cs) main" | sudo tee /etc/apt/sources.list.d/azlux.list >/dev/null"#.to_string(),
        ),
        ("Updating package index", "sudo apt-get update".to_string()),
        (
            "Installing ctop",
            "sudo DEBIAN_FRONTEND=noninteractive apt-get install -y docker-ctop".to_string(),
        ),
    ]
}

async fn run_steps(
    executor: &dyn RemoteExecutor,
    job: &JobHandle,
    steps: Vec<(&'static str, String)>,
) -> Result<(), OrchestratorError> {
    let total = steps.len();
    for (idx, (phase, command)) in steps.into_iter().enumerate() {
        job.progress(format!("[{}/{}] {}", idx + 1, total, phase));
        executor.run_long_checked(&command).await?;
    }
    Ok(())
}

/// Install Docker Engine from the upstream apt repository
pub async fn install_docker(
    executor: &dyn RemoteExecutor,
    job: &JobHandle,
) -> Result<String, OrchestratorError> {
    info!("Installing Docker Engine on {}", executor.host());
    run_steps(executor, job, docker_install_steps()).await?;
    configure_docker_api(executor, job).await?;

    let version = executor.run_checked("docker --version").await?;
    Ok(format!("Docker installed: {}", version))
}

/// Upgrade the installed engine packages in place
pub async fn upgrade_docker(
    executor: &dyn RemoteExecutor,
    job: &JobHandle,
) -> Result<String, OrchestratorError> {
    info!("Upgrading Docker Engine on {}", executor.host());
    let steps = vec![
        ("Updating package index", "sudo apt-get update".to_string()),
        (
            "Upgrading Docker Engine",
            format!(
                "sudo DEBIAN_FRONTEND=noninteractive apt-get install --only-upgrade -y {}",
                DOCKER_PACKAGES
            ),
        ),
    ];
    run_steps(executor, job, steps).await?;

    let version = executor.run_checked("docker --version").await?;
    Ok(format!("Docker upgraded: {}", version))
}

/// Write the systemd override enabling the old API version and restart dockerd
pub async fn configure_docker_api(
    executor: &dyn RemoteExecutor,
    job: &JobHandle,
) -> Result<String, OrchestratorError> {
    job.progress("Applying Docker API compatibility override");

    let write_override = format!(
        "sudo mkdir -p {} && printf '%s\\n' '[Service]' {} | sudo tee {} >/dev/null",
        DOCKER_OVERRIDE_DIR,
        shell_quote(&format!(
            "Environment=\"DOCKER_MIN_API_VERSION={}\"",
            DOCKER_MIN_API_VERSION
        )),
        DOCKER_OVERRIDE_FILE
    );
    executor.run_checked(&write_override).await?;

    job.progress("Restarting Docker");
    executor.run_checked("sudo systemctl daemon-reload").await?;
    executor
        .run_long_checked("sudo systemctl restart docker")
        .await?;

    let environment = executor
        .run_checked("systemctl show --property=Environment docker")
        .await?;
    if !environment.contains("DOCKER_MIN_API_VERSION") {
        warn!("Docker override not visible after restart: {}", environment);
    }

    Ok(format!(
        "Docker configured with DOCKER_MIN_API_VERSION={}",
        DOCKER_MIN_API_VERSION
    ))
}

/// Initialise swarm mode advertising `advertise_addr`
pub async fn init_swarm(
    executor: &dyn RemoteExecutor,
    job: &JobHandle,
    advertise_addr: &str,
) -> Result<String, OrchestratorError> {
    job.progress(format!("Initializing swarm on {}", advertise_addr));
    let command = format!("docker swarm init --advertise-addr {}", shell_quote(advertise_addr));
    let output = executor.run(&command).await?;

    if output.success() {
        return Ok("Swarm initialized".to_string());
    }
    if output.diagnostic().contains("already part of a swarm") {
        info!("{} is already part of a swarm", executor.host());
        return Ok("Node is already part of a swarm".to_string());
    }
    Err(output.into_error(&command))
}

/// Create the attachable overlay network `name`
pub async fn create_network(
    executor: &dyn RemoteExecutor,
    job: &JobHandle,
    name: &str,
) -> Result<String, OrchestratorError> {
    job.progress(format!("Creating overlay network {}", name));
    let command = format!(
        "docker network create --driver overlay --attachable {}",
        shell_quote(name)
    );
    let output = executor.run(&command).await?;

    if output.success() {
        return Ok(format!("Network {} created", name));
    }
    if output.diagnostic().contains("already exists") {
        info!("Network {} already exists", name);
        return Ok(format!("Network {} already exists", name));
    }
    Err(output.into_error(&command))
}

/// Install the ctop container monitor
pub async fn install_ctop(
    executor: &dyn RemoteExecutor,
    job: &JobHandle,
) -> Result<String, OrchestratorError> {
    info!("Installing ctop on {}", executor.host());
    run_steps(executor, job, ctop_install_steps()).await?;
    Ok("Ctop installed".to_string())
}
