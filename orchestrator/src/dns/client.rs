//! Cloudflare HTTP client

use std::time::Duration;

use reqwest::{Client, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use tracing::{debug, error, info};
use url::Url;

use crate::dns::{ApiMessage, DnsRecord, Envelope, RecordInput, RecordPayload, Zone};
use crate::errors::OrchestratorError;

/// Provider codes for an identical record that already exists
const RECORD_EXISTS_CODES: &[i64] = &[81057, 81058];

/// Client for the zone and record endpoints
#[derive(Debug, Clone)]
pub struct DnsClient {
    client: Client,
    base_url: String,
}

impl DnsClient {
    /// Create a new client rooted at `base_url`
    pub fn new(base_url: &str) -> Result<Self, OrchestratorError> {
        Url::parse(base_url).map_err(|e| {
            OrchestratorError::ConfigError(format!("invalid DNS API url '{}': {}", base_url, e))
        })?;

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Zones visible to `token`
    pub async fn list_zones(&self, token: &SecretString) -> Result<Vec<Zone>, OrchestratorError> {
        let url = format!("{}/zones", self.base_url);
        debug!("GET {}", url);
        self.send(self.client.get(&url).query(&[("per_page", "50")]), token)
            .await
    }

    /// `A` records of a zone, optionally only those pointing at `ip`
    pub async fn list_records(
        &self,
        token: &SecretString,
        zone_id: &str,
        ip: Option<&str>,
    ) -> Result<Vec<DnsRecord>, OrchestratorError> {
        let url = format!("{}/zones/{}/dns_records", self.base_url, zone_id);
        debug!("GET {}", url);

        let mut request = self
            .client
            .get(&url)
            .query(&[("type", "A"), ("per_page", "100")]);
        if let Some(ip) = ip.filter(|ip| !ip.is_empty()) {
            request = request.query(&[("content", ip)]);
        }

        let records: Vec<DnsRecord> = self.send(request, token).await?;
        // filter locally as well; content matching is exact
        Ok(match ip.filter(|ip| !ip.is_empty()) {
            Some(ip) => records.into_iter().filter(|r| r.content == ip).collect(),
            None => records,
        })
    }

    /// Create an `A` record
    pub async fn create_record(
        &self,
        token: &SecretString,
        zone_id: &str,
        input: &RecordInput,
    ) -> Result<DnsRecord, OrchestratorError> {
        let url = format!("{}/zones/{}/dns_records", self.base_url, zone_id);
        debug!("POST {}", url);

        let record: DnsRecord = self
            .send(self.client.post(&url).json(&RecordPayload::from(input)), token)
            .await?;
        info!("Created DNS record {} -> {}", record.name, record.content);
        Ok(record)
    }

    /// Replace an existing `A` record
    pub async fn update_record(
        &self,
        token: &SecretString,
        zone_id: &str,
        record_id: &str,
        input: &RecordInput,
    ) -> Result<DnsRecord, OrchestratorError> {
        let url = format!("{}/zones/{}/dns_records/{}", self.base_url, zone_id, record_id);
        debug!("PUT {}", url);

        let record: DnsRecord = self
            .send(self.client.put(&url).json(&RecordPayload::from(input)), token)
            .await?;
        info!("Updated DNS record {} -> {}", record.name, record.content);
        Ok(record)
    }

    /// Delete a record; returns the deleted id
    pub async fn delete_record(
        &self,
        token: &SecretString,
        zone_id: &str,
        record_id: &str,
    ) -> Result<String, OrchestratorError> {
        let url = format!("{}/zones/{}/dns_records/{}", self.base_url, zone_id, record_id);
        debug!("DELETE {}", url);

        let deleted: serde_json::Value = self.send(self.client.delete(&url), token).await?;
        info!("Deleted DNS record {}", record_id);
        Ok(deleted
            .get("id")
            .and_then(|id| id.as_str())
            .unwrap_or(record_id)
            .to_string())
    }

    /// Send `request` and unwrap the provider envelope
    async fn send<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        token: &SecretString,
    ) -> Result<T, OrchestratorError> {
        let response = request.bearer_auth(token.expose_secret()).send().await?;
        let status = response.status();
        let body = response.text().await?;

        let envelope: Envelope<T> = serde_json::from_str(&body).map_err(|e| {
            error!("Unparseable DNS response: {} - {}", status, body);
            OrchestratorError::DnsError(format!("{}: unexpected response: {}", status, e))
        })?;

        if !envelope.success {
            return Err(envelope_error(&envelope.errors, status.as_u16()));
        }
        envelope.result.ok_or_else(|| {
            OrchestratorError::DnsError(format!("{}: response carried no result", status))
        })
    }
}

fn envelope_error(errors: &[ApiMessage], status: u16) -> OrchestratorError {
    if errors.iter().any(|e| {
        RECORD_EXISTS_CODES.contains(&e.code) || e.message.to_lowercase().contains("already exists")
    }) {
        return OrchestratorError::Conflict("this DNS record already exists".to_string());
    }
    if status == 401 || status == 403 {
        return OrchestratorError::AuthError("DNS provider rejected the API token".to_string());
    }
    let message = errors
        .first()
        .map(|e| e.message.clone())
        .unwrap_or_else(|| "unknown error".to_string());
    error!("DNS provider error ({}): {}", status, message);
    OrchestratorError::DnsError(message)
}
