//! Wire shapes and well-known paths of the dispatch server

use serde::{Deserialize, Serialize};

pub const API_PREFIX: &str = "/api/";
pub const WEBHOOK_PATH: &str = "/api/webhook";
pub const HEALTH_PATH: &str = "/api/health";

/// Paths the server owns; custom endpoints may not claim them
pub const RESERVED_PATHS: &[&str] = &[WEBHOOK_PATH, HEALTH_PATH];

/// Maximum request body size (1MB)
pub const MAX_REQUEST_BODY_SIZE: usize = 1_048_576;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Initializing,
    Healthy,
}

/// Body of `GET /api/health`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: HealthState,
    pub agent_address: Option<String>,
}

impl HealthStatus {
    pub fn from_address(address: Option<&str>) -> Self {
        match address {
            Some(address) => Self {
                status: HealthState::Healthy,
                agent_address: Some(address.to_string()),
            },
            None => Self {
                status: HealthState::Initializing,
                agent_address: None,
            },
        }
    }
}

/// Body returned for every webhook message that decoded
pub fn webhook_ack() -> serde_json::Value {
    serde_json::json!({ "status": "success" })
}
