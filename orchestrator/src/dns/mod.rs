//! DNS gateway
//!
//! Pass-through to the Cloudflare v4 zone API. The API token arrives with
//! each request and is never stored.

pub mod client;

use serde::{Deserialize, Serialize};

pub use client::DnsClient;

/// Default Cloudflare API root
pub const CLOUDFLARE_API: &str = "https://api.cloudflare.com/client/v4";

/// A DNS zone (domain)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Zone {
    pub id: String,
    pub name: String,
}

/// An `A` record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsRecord {
    pub id: String,
    pub name: String,
    pub content: String,
    #[serde(default)]
    pub proxied: bool,
    #[serde(default)]
    pub ttl: u32,
}

/// Fields sent when creating or replacing an `A` record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordInput {
    /// Record name, either relative to the zone or fully qualified
    pub name: String,

    /// Target IPv4 address
    pub content: String,

    #[serde(default = "default_proxied")]
    pub proxied: bool,
}

fn default_proxied() -> bool {
    true
}

/// Body sent to the provider
#[derive(Debug, Serialize)]
struct RecordPayload<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    name: &'a str,
    content: &'a str,
    ttl: u32,
    proxied: bool,
}

impl<'a> From<&'a RecordInput> for RecordPayload<'a> {
    fn from(input: &'a RecordInput) -> Self {
        Self {
            kind: "A",
            name: &input.name,
            content: &input.content,
            // 1 = automatic
            ttl: 1,
            proxied: input.proxied,
        }
    }
}

/// Provider error entry
#[derive(Debug, Clone, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

/// Provider response envelope
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    success: bool,
    #[serde(default)]
    errors: Vec<ApiMessage>,
    result: Option<T>,
}
