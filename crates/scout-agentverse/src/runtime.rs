//! The runtime seam between the dispatch server and the agent network

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use crate::client::{AgentverseClient, Registration};
use crate::envelope::{InboundMessage, parse_message};
use crate::identity::AgentIdentity;

/// Operations the dispatch server needs from the agent network
#[async_trait]
pub trait AgentRuntime: Send + Sync {
    /// Decode a raw webhook body into a message
    fn parse_envelope(&self, raw: &str) -> Result<InboundMessage>;

    /// Publish `identity` and its webhook in the directory
    async fn register(&self, identity: &AgentIdentity, registration: &Registration) -> Result<()>;

    /// Deliver `payload` to the agent at `recipient`
    async fn send(&self, identity: &AgentIdentity, recipient: &str, payload: &Value) -> Result<()>;
}

/// [`AgentRuntime`] backed by the Agentverse API
#[derive(Debug, Clone)]
pub struct AgentverseRuntime {
    client: AgentverseClient,
}

impl AgentverseRuntime {
    pub fn new(client: AgentverseClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &AgentverseClient {
        &self.client
    }
}

#[async_trait]
impl AgentRuntime for AgentverseRuntime {
    fn parse_envelope(&self, raw: &str) -> Result<InboundMessage> {
        Ok(parse_message(raw)?)
    }

    async fn register(&self, identity: &AgentIdentity, registration: &Registration) -> Result<()> {
        Ok(self.client.register(identity, registration).await?)
    }

    async fn send(&self, identity: &AgentIdentity, recipient: &str, payload: &Value) -> Result<()> {
        Ok(self.client.send(identity, recipient, payload).await?)
    }
}
