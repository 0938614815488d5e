//! Test client: query a running scout agent over HTTP or through Agentverse

use std::time::Duration;

use serde_json::{Value, json};
use tracing::{debug, error, info};

use scout_agentverse::{AgentIdentity, AgentverseClient};

const API_TIMEOUT: Duration = Duration::from_secs(300);

fn error_value(message: impl Into<String>) -> Value {
    json!({"status": "error", "error": message.into()})
}

/// POST `{"query"}` to `{server_url}/api/search` and return the JSON answer
pub async fn query_api(server_url: &str, query: &str) -> Value {
    let url = format!("{}/api/search", server_url.trim_end_matches('/'));
    debug!("Querying {}", url);

    let client = match reqwest::Client::builder().timeout(API_TIMEOUT).build() {
        Ok(client) => client,
        Err(e) => return error_value(e.to_string()),
    };

    let response = match client.post(&url).json(&json!({"query": query})).send().await {
        Ok(response) => response,
        Err(e) => {
            error!("Request to {} failed: {}", url, e);
            return error_value(e.to_string());
        }
    };

    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    if !status.is_success() {
        return error_value(format!("HTTP {}: {}", status.as_u16(), text));
    }
    serde_json::from_str(&text)
        .unwrap_or_else(|e| error_value(format!("Invalid JSON response: {}", e)))
}

/// Send the query as an agent message from the identity derived from `client_key`
///
/// Delivery is fire-and-forget; the answer arrives at the client's own webhook.
pub async fn query_agentverse(
    client: &AgentverseClient,
    client_key: &str,
    agent_address: &str,
    query: &str,
) -> Value {
    if client_key.is_empty() {
        return error_value("CLIENT_KEY environment variable not set");
    }
    if agent_address.is_empty() {
        return error_value("Agent address not provided");
    }

    let identity = match AgentIdentity::from_seed(client_key, 0) {
        Ok(identity) => identity,
        Err(e) => return error_value(format!("Invalid client key: {}", e)),
    };
    info!("Sending query from {} to {}", identity.address(), agent_address);

    match client
        .send(&identity, agent_address, &json!({"query": query}))
        .await
    {
        Ok(()) => json!({
            "status": "success",
            "message": "Message sent to agent. Check your webhook for response."
        }),
        Err(e) => error_value(format!("Failed to send message: {}", e)),
    }
}
