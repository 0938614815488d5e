use thiserror::Error;

/// Errors raised by identity, envelope and Agentverse API operations
#[derive(Debug, Error)]
pub enum AgentverseError {
    #[error("invalid agent seed: {0}")]
    InvalidSeed(String),

    #[error("invalid address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("malformed envelope: {0}")]
    Envelope(String),

    #[error("signature error: {0}")]
    Signature(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Agentverse API returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("no endpoints registered for agent {0}")]
    NoEndpoints(String),
}

impl From<serde_json::Error> for AgentverseError {
    fn from(e: serde_json::Error) -> Self {
        Self::Envelope(e.to_string())
    }
}
