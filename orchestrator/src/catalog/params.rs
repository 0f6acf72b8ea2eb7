//! Stack deployment parameters

use std::collections::HashMap;

use uuid::Uuid;

use crate::catalog::Unit;
use crate::errors::OrchestratorError;
use crate::utils::strip_scheme;

/// Parameters whose values are hostnames and may arrive as URLs
const HOST_PARAMS: &[&str] = &[
    "portainer_host",
    "rabbit_host",
    "minio_console_host",
    "minio_api_host",
    "baserow_host",
    "n8n_host",
    "n8n_webhook_host",
    "chatwoot_host",
];

/// Secrets filled with random hex when the caller leaves them out,
/// as (unit, parameter, uuid count)
const GENERATED_PARAMS: &[(Unit, &str, usize)] = &[
    (Unit::N8n, "n8n_encryption_key", 1),
    (Unit::Chatwoot, "chatwoot_secret_key_base", 4),
];

/// Validated parameter bag for one deployment
#[derive(Debug, Clone, Default)]
pub struct StackParams {
    values: HashMap<String, String>,
}

impl StackParams {
    /// Validate `raw` against the unit's required fields
    ///
    /// Fails on the first missing or blank field, in declaration order.
    /// Host-like values are normalized to bare hostnames.
    pub fn validate(unit: Unit, raw: &HashMap<String, String>) -> Result<Self, OrchestratorError> {
        let mut values = HashMap::new();

        for &field in unit.required_params() {
            let value = raw.get(field).map(|v| v.trim()).unwrap_or_default();
            if value.is_empty() {
                return Err(OrchestratorError::ValidationError(format!(
                    "missing required parameter '{}' for {}",
                    field, unit
                )));
            }

            let value = if HOST_PARAMS.contains(&field) {
                strip_scheme(value)
            } else {
                value.to_string()
            };
            values.insert(field.to_string(), value);
        }

        for &(_, field, uuids) in GENERATED_PARAMS.iter().filter(|(u, _, _)| *u == unit) {
            let value = match raw.get(field).map(|v| v.trim()) {
                Some(v) if !v.is_empty() => v.to_string(),
                _ => random_hex(uuids),
            };
            values.insert(field.to_string(), value);
        }

        Ok(Self { values })
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

fn random_hex(uuids: usize) -> String {
    (0..uuids)
        .map(|_| Uuid::new_v4().simple().to_string())
        .collect()
}
