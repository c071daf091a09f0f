//! Typed payloads exchanged with the hdns backend
//!
//! Every endpoint gets its own type; payloads are decoded at the transport
//! boundary instead of being passed around as untyped JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::net::IpAddr;

/// A public address observed by the backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub id: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub ip: String,
    /// Whether this is the address currently in use
    #[serde(default)]
    pub current: bool,
}

/// A managed DNS record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub id: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Provider API token the record is updated with
    pub token: String,
    pub zone_id: String,
    pub domain: String,
    pub name: String,
    pub ttl: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<Address>,
    pub last_update: DateTime<Utc>,
}

impl Record {
    /// Fully qualified name, e.g. `home.example.org`
    pub fn fqdn(&self) -> String {
        if self.name.is_empty() || self.name == "@" {
            return self.domain.clone();
        }
        format!("{}.{}", self.name, self.domain)
    }
}

/// One resolution of a record observed by the backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordHistory {
    pub id: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub record_id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record: Option<Record>,
    pub address_id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<Address>,
    pub resolved_ip: String,
    pub resolved_at: DateTime<Utc>,
}

/// A DNS zone available for a provider token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Zone {
    pub id: String,
    pub name: String,
    pub records_count: u32,
}

/// Backend runtime configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub log_level: i32,
    pub web_port: u16,
    /// Refresh interval in the backend's duration notation (e.g. `5m`)
    pub refresh_interval: String,
    pub dns_servers: Vec<String>,
}

/// Answer of the `info` resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiInfo {
    /// Whether the backend's database is connected
    pub status: bool,
}

/// Result of resolving a record against one DNS server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    pub server: String,
    /// Empty when the lookup failed; the backend sends `null` then
    #[serde(default, deserialize_with = "null_as_empty")]
    pub addresses: Vec<String>,
    /// Response time as reported by the backend
    pub response_time: f64,
    #[serde(default)]
    pub error: Option<ResolutionError>,
}

impl Resolution {
    /// Whether the server answered without error
    pub fn is_success(&self) -> bool {
        match &self.error {
            None => true,
            Some(ResolutionError::Message(message)) => message.is_empty(),
            Some(ResolutionError::Lookup { .. }) => false,
        }
    }
}

/// Why a lookup against one server failed
///
/// The backend forwards its resolver error as-is: usually a DNS error object
/// (`{"Err": "no such host", "Name": ..., "IsNotFound": true}`), sometimes a
/// plain string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResolutionError {
    Message(String),
    Lookup {
        #[serde(rename = "Err", default)]
        err: String,
        #[serde(rename = "Name", default)]
        name: String,
        #[serde(rename = "IsTimeout", default)]
        is_timeout: bool,
        #[serde(rename = "IsNotFound", default)]
        is_not_found: bool,
    },
}

impl ResolutionError {
    /// Human readable reason
    pub fn message(&self) -> &str {
        match self {
            Self::Message(message) => message,
            Self::Lookup { err, .. } if !err.is_empty() => err,
            Self::Lookup { .. } => "lookup failed",
        }
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Address family of a textual IP address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IpFamily {
    V4,
    V6,
}

impl IpFamily {
    /// Classify a textual address; `None` when it is not an IP address
    pub fn of(address: &str) -> Option<Self> {
        match address.trim().parse::<IpAddr>().ok()? {
            IpAddr::V4(_) => Some(Self::V4),
            IpAddr::V6(_) => Some(Self::V6),
        }
    }

    /// Display label
    pub fn label(&self) -> &'static str {
        match self {
            Self::V4 => "IPv4",
            Self::V6 => "IPv6",
        }
    }
}

/// Upstream control messages sent over a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlMessage {
    /// Ask the server to push the current state of the resource
    Refresh,
}
