//! HTTP request handlers

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::catalog::Unit;
use crate::deploy::services::ServiceRestart;
use crate::dns::RecordInput;
use crate::errors::OrchestratorError;
use crate::orchestrator::{HostTask, InstallResponse};
use crate::remote::Credentials;
use crate::server::extract::JsonBody;
use crate::resolver;
use crate::server::state::ServerState;
use crate::utils::version_info;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

/// Health check handler
pub async fn health_handler() -> impl IntoResponse {
    let version = version_info();
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "swarmdeck".to_string(),
        version: version.version,
    })
}

/// Version handler
pub async fn version_handler() -> impl IntoResponse {
    Json(version_info())
}

/// Static dependency table
pub async fn units_handler() -> impl IntoResponse {
    Json(resolver::catalog())
}

// ============================== HOST STATE ==================================== //

pub async fn verify_connection_handler(
    State(state): State<Arc<ServerState>>,
    JsonBody(credentials): JsonBody<Credentials>,
) -> Result<impl IntoResponse, OrchestratorError> {
    let report = state.orchestrator.verify_connection(&credentials).await?;
    Ok(Json(report))
}

pub async fn system_status_handler(
    State(state): State<Arc<ServerState>>,
    JsonBody(credentials): JsonBody<Credentials>,
) -> Result<impl IntoResponse, OrchestratorError> {
    let report = state.orchestrator.system_status(&credentials).await?;
    Ok(Json(report))
}

// ============================== INSTALL JOBS ================================== //

/// Install request
#[derive(Debug, Deserialize)]
pub struct InstallRequest {
    #[serde(flatten)]
    pub credentials: Credentials,

    #[serde(default)]
    pub parameters: HashMap<String, String>,

    /// Redeploy even when the unit is already present
    #[serde(default)]
    pub overwrite: bool,
}

fn accepted(response: InstallResponse) -> impl IntoResponse {
    let status = if response.accepted {
        StatusCode::ACCEPTED
    } else {
        StatusCode::OK
    };
    (status, Json(response))
}

pub async fn install_handler(
    unit: Unit,
    State(state): State<Arc<ServerState>>,
    JsonBody(request): JsonBody<InstallRequest>,
) -> Result<impl IntoResponse, OrchestratorError> {
    let response = state
        .orchestrator
        .install(
            unit,
            &request.credentials,
            &request.parameters,
            request.overwrite,
        )
        .await?;
    Ok(accepted(response))
}

pub async fn host_task_handler(
    task: HostTask,
    State(state): State<Arc<ServerState>>,
    JsonBody(credentials): JsonBody<Credentials>,
) -> Result<impl IntoResponse, OrchestratorError> {
    let response = state.orchestrator.run_host_task(task, &credentials).await?;
    Ok(accepted(response))
}

pub async fn install_status_handler(
    State(state): State<Arc<ServerState>>,
    Path(service_key): Path<String>,
) -> impl IntoResponse {
    Json(state.orchestrator.install_status(&service_key))
}

pub async fn all_install_status_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    Json(state.orchestrator.all_install_status())
}

// ================================ STACKS ====================================== //

#[derive(Debug, Deserialize)]
pub struct RestartStackRequest {
    #[serde(flatten)]
    pub credentials: Credentials,
    pub stack_name: String,
}

#[derive(Debug, Serialize)]
pub struct RestartStackResponse {
    pub stack_name: String,
    pub services: Vec<ServiceRestart>,
}

pub async fn restart_stack_handler(
    State(state): State<Arc<ServerState>>,
    JsonBody(request): JsonBody<RestartStackRequest>,
) -> Result<impl IntoResponse, OrchestratorError> {
    let services = state
        .orchestrator
        .restart_stack(&request.credentials, &request.stack_name)
        .await?;
    Ok(Json(RestartStackResponse {
        stack_name: request.stack_name,
        services,
    }))
}

#[derive(Debug, Serialize)]
pub struct StackEnvResponse {
    pub stack_name: String,
    pub env: BTreeMap<String, String>,
}

pub async fn get_stack_env_handler(
    State(state): State<Arc<ServerState>>,
    Path(stack_name): Path<String>,
    JsonBody(credentials): JsonBody<Credentials>,
) -> Result<impl IntoResponse, OrchestratorError> {
    let env = state
        .orchestrator
        .get_stack_env(&credentials, &stack_name)
        .await?;
    Ok(Json(StackEnvResponse { stack_name, env }))
}

#[derive(Debug, Deserialize)]
pub struct UpdateStackEnvRequest {
    #[serde(flatten)]
    pub credentials: Credentials,
    pub stack_name: String,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

#[derive(Debug, Serialize)]
pub struct UpdateStackEnvResponse {
    pub stack_name: String,
    pub services_updated: usize,
}

pub async fn update_stack_env_handler(
    State(state): State<Arc<ServerState>>,
    JsonBody(request): JsonBody<UpdateStackEnvRequest>,
) -> Result<impl IntoResponse, OrchestratorError> {
    let services_updated = state
        .orchestrator
        .update_stack_env(&request.credentials, &request.stack_name, &request.env)
        .await?;
    Ok(Json(UpdateStackEnvResponse {
        stack_name: request.stack_name,
        services_updated,
    }))
}

// ================================== DNS ======================================= //

#[derive(Debug, Deserialize)]
pub struct DnsZonesRequest {
    pub api_token: SecretString,
}

#[derive(Debug, Deserialize)]
pub struct DnsRecordsRequest {
    pub api_token: SecretString,
    pub zone_id: String,
    /// Only records pointing at this address
    #[serde(default)]
    pub ip: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DnsCreateRequest {
    pub api_token: SecretString,
    pub zone_id: String,
    #[serde(flatten)]
    pub record: RecordInput,
}

#[derive(Debug, Deserialize)]
pub struct DnsUpdateRequest {
    pub api_token: SecretString,
    pub zone_id: String,
    pub record_id: String,
    #[serde(flatten)]
    pub record: RecordInput,
}

#[derive(Debug, Deserialize)]
pub struct DnsDeleteRequest {
    pub api_token: SecretString,
    pub zone_id: String,
    pub record_id: String,
}

#[derive(Debug, Serialize)]
pub struct DnsDeleteResponse {
    pub deleted: String,
}

fn require(field: &str, value: &str) -> Result<(), OrchestratorError> {
    if value.trim().is_empty() {
        return Err(OrchestratorError::ValidationError(format!(
            "{} must not be empty",
            field
        )));
    }
    Ok(())
}

pub async fn dns_zones_handler(
    State(state): State<Arc<ServerState>>,
    JsonBody(request): JsonBody<DnsZonesRequest>,
) -> Result<impl IntoResponse, OrchestratorError> {
    let zones = state.orchestrator.dns().list_zones(&request.api_token).await?;
    Ok(Json(zones))
}

pub async fn dns_records_handler(
    State(state): State<Arc<ServerState>>,
    JsonBody(request): JsonBody<DnsRecordsRequest>,
) -> Result<impl IntoResponse, OrchestratorError> {
    require("zone_id", &request.zone_id)?;
    let records = state
        .orchestrator
        .dns()
        .list_records(&request.api_token, &request.zone_id, request.ip.as_deref())
        .await?;
    Ok(Json(records))
}

pub async fn dns_create_handler(
    State(state): State<Arc<ServerState>>,
    JsonBody(request): JsonBody<DnsCreateRequest>,
) -> Result<impl IntoResponse, OrchestratorError> {
    require("zone_id", &request.zone_id)?;
    require("name", &request.record.name)?;
    require("content", &request.record.content)?;
    let record = state
        .orchestrator
        .dns()
        .create_record(&request.api_token, &request.zone_id, &request.record)
        .await?;
    Ok((StatusCode::CREATED, Json(record)))
}

pub async fn dns_update_handler(
    State(state): State<Arc<ServerState>>,
    JsonBody(request): JsonBody<DnsUpdateRequest>,
) -> Result<impl IntoResponse, OrchestratorError> {
    require("zone_id", &request.zone_id)?;
    require("record_id", &request.record_id)?;
    require("name", &request.record.name)?;
    require("content", &request.record.content)?;
    let record = state
        .orchestrator
        .dns()
        .update_record(
            &request.api_token,
            &request.zone_id,
            &request.record_id,
            &request.record,
        )
        .await?;
    Ok(Json(record))
}

pub async fn dns_delete_handler(
    State(state): State<Arc<ServerState>>,
    JsonBody(request): JsonBody<DnsDeleteRequest>,
) -> Result<impl IntoResponse, OrchestratorError> {
    require("zone_id", &request.zone_id)?;
    require("record_id", &request.record_id)?;
    let deleted = state
        .orchestrator
        .dns()
        .delete_record(&request.api_token, &request.zone_id, &request.record_id)
        .await?;
    Ok(Json(DnsDeleteResponse { deleted }))
}
