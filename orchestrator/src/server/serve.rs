//! HTTP server setup

use std::future::Future;
use std::sync::Arc;

use axum::{
    extract::State,
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::app::options::ServerOptions;
use crate::catalog::Unit;
use crate::errors::OrchestratorError;
use crate::orchestrator::HostTask;
use crate::server::handlers::{
    all_install_status_handler, dns_create_handler, dns_delete_handler, dns_records_handler,
    dns_update_handler, dns_zones_handler, get_stack_env_handler, health_handler,
    host_task_handler, install_handler, install_status_handler, restart_stack_handler,
    system_status_handler, units_handler, update_stack_env_handler, verify_connection_handler,
    version_handler, InstallRequest,
};
use crate::remote::Credentials;
use crate::server::extract::JsonBody;
use crate::server::state::ServerState;

/// Build the application router
pub fn router(state: Arc<ServerState>) -> Router {
    let mut app = Router::new()
        // Health and version
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        // Catalog and host state
        .route("/units", get(units_handler))
        .route("/verify-connection", post(verify_connection_handler))
        .route("/system-status", post(system_status_handler))
        // Host maintenance jobs
        .route(
            "/upgrade-docker",
            post(
                |state: State<Arc<ServerState>>, body: JsonBody<Credentials>| async move {
                    host_task_handler(HostTask::UpgradeDocker, state, body).await
                },
            ),
        )
        .route(
            "/docker-config",
            post(
                |state: State<Arc<ServerState>>, body: JsonBody<Credentials>| async move {
                    host_task_handler(HostTask::ConfigureDocker, state, body).await
                },
            ),
        )
        // Jobs
        .route("/install-status", get(all_install_status_handler))
        .route("/install-status/{service_key}", get(install_status_handler))
        // Stacks
        .route("/restart-stack", post(restart_stack_handler))
        .route("/get-stack-env/{stack_name}", post(get_stack_env_handler))
        .route("/update-stack-env", post(update_stack_env_handler))
        // DNS
        .route("/dns/zones", post(dns_zones_handler))
        .route("/dns/records", post(dns_records_handler))
        .route("/dns/create", post(dns_create_handler))
        .route("/dns/update", post(dns_update_handler))
        .route("/dns/delete", post(dns_delete_handler));

    // One install route per unit
    for unit in Unit::ALL {
        app = app.route(
            &format!("/install-{}", unit.service_key()),
            post(
                move |state: State<Arc<ServerState>>, body: JsonBody<InstallRequest>| async move {
                    install_handler(unit, state, body).await
                },
            ),
        );
    }

    app.with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Start the HTTP server
pub async fn serve(
    options: &ServerOptions,
    state: Arc<ServerState>,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<JoinHandle<Result<(), OrchestratorError>>, OrchestratorError> {
    let app = router(state);

    let addr = format!("{}:{}", options.host, options.port);
    info!("Starting HTTP server on {}", addr);

    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| OrchestratorError::ServerError(e.to_string()))?;

    let handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal)
            .await
            .map_err(|e| OrchestratorError::ServerError(e.to_string()))
    });

    Ok(handle)
}
