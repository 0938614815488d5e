//! scout-server - dispatch surface for an Agentverse-registered agent
//!
//! Accepts inbound work over HTTP and routes it to handlers:
//! - `POST /api/webhook` - signed envelopes from other agents, routed by sender
//! - `GET  /api/health` - identity status
//! - custom endpoints registered before start, JSON in and JSON out

pub mod config;
pub mod endpoint;
pub mod error;
pub mod handler;
pub mod inbox;
pub mod protocol;
pub mod server;

pub use config::{AgentMetadata, Credentials, ServerConfig};
pub use endpoint::{CustomEndpoint, DEFAULT_ENDPOINT_METHODS, normalize_path};
pub use error::ServerError;
pub use handler::{Handler, HandlerTable, handler_fn};
pub use inbox::Inbox;
pub use protocol::{HealthState, HealthStatus};
pub use server::{AgentServer, Messenger, RunningServer};

pub use scout_agentverse::{AgentIdentity, AgentRuntime, InboundMessage, Registration};
