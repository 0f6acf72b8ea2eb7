//! swarmdeck - Entry Point
//!
//! HTTP service that provisions a remote host over SSH into a Docker Swarm
//! and deploys service stacks onto it.

use std::collections::HashMap;
use std::env;
use std::path::PathBuf;

use secrecy::SecretString;

use swarmdeck::app::options::AppOptions;
use swarmdeck::app::run::run;
use swarmdeck::errors::OrchestratorError;
use swarmdeck::logs::init_logging;
use swarmdeck::orchestrator::StatusReport;
use swarmdeck::probe::StateProber;
use swarmdeck::remote::ssh::SshConnector;
use swarmdeck::remote::{Connector, Credentials};
use swarmdeck::storage::settings::Settings;
use swarmdeck::utils::version_info;

use tracing::{error, info};

const DEFAULT_CONFIG_PATH: &str = "swarmdeck.json";

#[tokio::main]
async fn main() {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();
    let mut cli_args: HashMap<String, String> = HashMap::new();

    for arg in args.iter().skip(1) {
        if let Some((key, value)) = arg.split_once('=') {
            // Handle --key=value format
            let clean_key = key.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), value.to_string());
        } else if arg.starts_with("--") {
            // Handle standalone flags like --version
            let clean_key = arg.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), "true".to_string());
        }
    }

    // Print version and exit
    let version = version_info();
    if cli_args.contains_key("version") {
        match serde_json::to_string_pretty(&version) {
            Ok(json) => println!("{}", json),
            Err(e) => eprintln!("Failed to render version: {}", e),
        }
        return;
    }

    // Write a default settings file and exit
    if let Some(path) = cli_args.get("init-config") {
        match Settings::write_defaults(&PathBuf::from(path)).await {
            Ok(_) => println!("Wrote default settings to {}", path),
            Err(e) => eprintln!("Unable to write settings file: {}", e),
        }
        return;
    }

    // Retrieve the settings file
    let config_path = cli_args
        .get("config")
        .cloned()
        .or_else(|| env::var("SWARMDECK_CONFIG").ok())
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let settings = match Settings::load(&PathBuf::from(&config_path)).await {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Unable to read settings file {}: {}", config_path, e);
            return;
        }
    };

    // Initialize logging; the guard flushes the file writer on exit
    let _log_guard = match init_logging(settings.log_options()) {
        Ok(guard) => guard,
        Err(e) => {
            println!("Failed to initialize logging: {e}");
            None
        }
    };

    let options = AppOptions::from(&settings);

    // Probe a host once and exit
    if cli_args.contains_key("probe") {
        if let Err(e) = probe_once(&cli_args, &options).await {
            error!("Probe failed: {}", e);
        }
        return;
    }

    info!("Running swarmdeck {} with options: {:?}", version.version, options);
    if let Err(e) = run(options, await_shutdown_signal()).await {
        error!("Failed to run swarmdeck: {e}");
    }
}

async fn probe_once(
    cli_args: &HashMap<String, String>,
    options: &AppOptions,
) -> Result<(), OrchestratorError> {
    let host = cli_args.get("host").cloned().unwrap_or_default();
    let username = cli_args
        .get("user")
        .cloned()
        .unwrap_or_else(|| "root".to_string());
    let password = env::var("SWARMDECK_SSH_PASSWORD").ok().map(SecretString::from);
    let private_key = match cli_args.get("key-file") {
        Some(path) => Some(SecretString::from(tokio::fs::read_to_string(path).await?)),
        None => None,
    };

    let credentials = Credentials {
        host,
        username,
        password,
        private_key,
    };

    let connector = SshConnector::new(options.ssh.clone());
    let executor = connector.connect(&credentials).await?;
    let snapshot = StateProber::new(options.deployer.network_name.clone())
        .probe(executor.as_ref())
        .await;

    println!(
        "{}",
        serde_json::to_string_pretty(&StatusReport::from(snapshot))?
    );
    Ok(())
}

async fn await_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let (mut sigterm, mut sigint) =
            match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
                _ => {
                    error!("Unable to install signal handlers, falling back to Ctrl+C");
                    let _ = tokio::signal::ctrl_c().await;
                    return;
                }
            };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("SIGTERM received, shutting down...");
            }
            _ = sigint.recv() => {
                info!("SIGINT received, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
        }
        info!("Ctrl+C received, shutting down...");
    }
}
