//! Envelope: the signed wire format carrying one agent message over HTTP

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::AgentverseError;
use crate::identity::{AgentIdentity, verify_digest};

/// Current envelope format version
pub const ENVELOPE_VERSION: u32 = 1;

/// Schema digest announced for free-form JSON payloads
pub const JSON_SCHEMA_DIGEST: &str =
    "model:708d789bb90923ce8f5ab2d1baa70e3bdb1f5f6c5a8b3b2b0ed76c2f0c37bfc5";

/// A message decoded from an inbound envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub sender: String,
    pub payload: Value,
}

/// Signed agent-to-agent envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub version: u32,
    pub sender: String,
    pub target: String,
    pub session: Uuid,
    pub schema_digest: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol_digest: Option<String>,
    /// Base64 of the JSON-encoded payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

impl Envelope {
    /// Build an unsigned envelope in a fresh session
    pub fn new(sender: &str, target: &str, payload: &Value) -> Result<Self, AgentverseError> {
        let encoded = STANDARD.encode(serde_json::to_vec(payload)?);
        Ok(Self {
            version: ENVELOPE_VERSION,
            sender: sender.to_string(),
            target: target.to_string(),
            session: Uuid::new_v4(),
            schema_digest: JSON_SCHEMA_DIGEST.to_string(),
            protocol_digest: None,
            payload: Some(encoded),
            expires: None,
            nonce: None,
            signature: None,
        })
    }

    /// SHA-256 over the signed fields, in wire order
    pub fn digest(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(self.sender.as_bytes());
        hasher.update(self.target.as_bytes());
        hasher.update(self.session.to_string().as_bytes());
        hasher.update(self.schema_digest.as_bytes());
        if let Some(payload) = &self.payload {
            hasher.update(payload.as_bytes());
        }
        if let Some(expires) = self.expires {
            hasher.update(expires.to_be_bytes());
        }
        if let Some(nonce) = self.nonce {
            hasher.update(nonce.to_be_bytes());
        }
        hasher.finalize().into()
    }

    /// Sign with the sender's identity
    pub fn sign(&mut self, identity: &AgentIdentity) -> Result<(), AgentverseError> {
        if identity.address() != self.sender {
            return Err(AgentverseError::Signature(format!(
                "identity {} cannot sign for sender {}",
                identity.address(),
                self.sender
            )));
        }
        self.signature = Some(identity.sign_digest(&self.digest())?);
        Ok(())
    }

    /// Check the signature against the sender address
    pub fn verify(&self) -> Result<(), AgentverseError> {
        let signature = self
            .signature
            .as_deref()
            .ok_or_else(|| AgentverseError::Signature("envelope is not signed".to_string()))?;
        verify_digest(&self.sender, &self.digest(), signature)
    }

    /// Decode the payload; an absent payload decodes to `null`
    pub fn decode_payload(&self) -> Result<Value, AgentverseError> {
        let Some(encoded) = &self.payload else {
            return Ok(Value::Null);
        };
        let bytes = STANDARD
            .decode(encoded)
            .map_err(|e| AgentverseError::Envelope(format!("payload is not base64: {}", e)))?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// Parse, verify and unpack a raw envelope received on a webhook
pub fn parse_message(raw: &str) -> Result<InboundMessage, AgentverseError> {
    let envelope: Envelope = serde_json::from_str(raw)?;
    envelope.verify()?;
    let payload = envelope.decode_payload()?;
    Ok(InboundMessage {
        sender: envelope.sender,
        payload,
    })
}
