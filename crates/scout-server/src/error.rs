use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use scout_agentverse::AgentverseError;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Missing required API keys")]
    MissingCredentials,

    #[error("failed to create agent identity: {0}")]
    Identity(#[from] AgentverseError),

    #[error("agent registration failed: {0:#}")]
    Registration(anyhow::Error),

    #[error("{0}")]
    Decode(String),

    #[error("{0}")]
    Handler(String),

    #[error("endpoint already registered: {0}")]
    DuplicateEndpoint(String),

    #[error("invalid endpoint path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("unsupported method {method} for endpoint {path}")]
    UnsupportedMethod { method: String, path: String },

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("server task failed: {0}")]
    Serve(String),
}

/// Every request-level failure becomes `500 {"error": message}`
impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "error": self.to_string() });
        (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
    }
}
