//! scout-agentverse - agent runtime for the Fetch.ai Agentverse
//!
//! This crate provides:
//! - Deterministic agent identities derived from a secret seed
//! - The signed envelope format agents exchange over HTTP
//! - An Agentverse HTTP client (registration, endpoint lookup, delivery, search)
//! - The [`AgentRuntime`] seam consumed by the scout dispatch server

pub mod client;
pub mod envelope;
pub mod error;
pub mod identity;
pub mod runtime;

pub use client::{AgentSearch, AgentSummary, AgentverseClient, DEFAULT_AGENTVERSE_URL, Registration};
pub use envelope::{Envelope, InboundMessage, parse_message};
pub use error::AgentverseError;
pub use identity::AgentIdentity;
pub use runtime::{AgentRuntime, AgentverseRuntime};
