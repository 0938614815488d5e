//! Agentverse HTTP client: registration, endpoint lookup, delivery and search

use std::time::Duration;

use chrono::Utc;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::envelope::Envelope;
use crate::error::AgentverseError;
use crate::identity::AgentIdentity;

/// Public Agentverse deployment
pub const DEFAULT_AGENTVERSE_URL: &str = "https://agentverse.ai";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Everything the directory needs to list an agent
#[derive(Clone)]
pub struct Registration {
    pub webhook_url: String,
    pub token: String,
    pub title: String,
    pub readme: String,
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration")
            .field("webhook_url", &self.webhook_url)
            .field("token", &"***")
            .field("title", &self.title)
            .field("readme", &format!("{} chars", self.readme.len()))
            .finish()
    }
}

/// Directory search request
#[derive(Debug, Clone, Serialize)]
pub struct AgentSearch {
    pub search_text: String,
    pub sort: String,
    pub direction: String,
    pub offset: u32,
    pub limit: u32,
}

impl AgentSearch {
    /// Most-interacted agents first, three results
    pub fn new(search_text: impl Into<String>) -> Self {
        Self {
            search_text: search_text.into(),
            sort: "interactions".to_string(),
            direction: "desc".to_string(),
            offset: 0,
            limit: 3,
        }
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }
}

/// One directory search hit
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentSummary {
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub readme: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub total_interactions: u64,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    agents: Vec<AgentSummary>,
}

#[derive(Debug, Deserialize)]
struct AlmanacRecord {
    #[serde(default)]
    endpoints: Vec<AlmanacEndpoint>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct AlmanacEndpoint {
    url: String,
    #[serde(default)]
    weight: u32,
}

/// Client for the Agentverse REST API
#[derive(Clone)]
pub struct AgentverseClient {
    client: Client,
    base_url: String,
}

impl std::fmt::Debug for AgentverseClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentverseClient")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl AgentverseClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, AgentverseError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent("scout-agent/0.1")
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Publish the agent's webhook in the almanac and upsert its directory profile
    pub async fn register(
        &self,
        identity: &AgentIdentity,
        registration: &Registration,
    ) -> Result<(), AgentverseError> {
        let address = identity.address();
        let timestamp = Utc::now().timestamp().max(0) as u64;
        let attestation = attestation_digest(address, &registration.webhook_url, timestamp);

        let endpoint = AlmanacEndpoint {
            url: registration.webhook_url.clone(),
            weight: 1,
        };
        let almanac = serde_json::json!({
            "agent_identifier": address,
            "endpoints": [endpoint],
            "protocols": [],
            "timestamp": timestamp,
            "signature": identity.sign_digest(&attestation)?,
        });
        debug!("Registering {} in almanac", address);
        let response = self
            .client
            .post(format!("{}/v1/almanac/agents", self.base_url))
            .bearer_auth(&registration.token)
            .json(&almanac)
            .send()
            .await?;
        check_status(response).await?;

        let response = self
            .client
            .post(format!("{}/v1/agents", self.base_url))
            .bearer_auth(&registration.token)
            .json(&serde_json::json!({
                "address": address,
                "name": registration.title,
                "agent_type": "custom",
            }))
            .send()
            .await?;
        if response.status() == reqwest::StatusCode::CONFLICT {
            debug!("Agent {} already exists in directory", address);
        } else {
            check_status(response).await?;
        }

        let response = self
            .client
            .put(format!("{}/v1/agents/{}", self.base_url, address))
            .bearer_auth(&registration.token)
            .json(&serde_json::json!({
                "address": address,
                "name": registration.title,
                "readme": registration.readme,
                "endpoint": registration.webhook_url,
            }))
            .send()
            .await?;
        check_status(response).await?;

        info!("Registered agent {} as '{}'", address, registration.title);
        Ok(())
    }

    /// Look up the webhook URLs an agent registered, highest weight first
    pub async fn resolve_endpoints(&self, address: &str) -> Result<Vec<String>, AgentverseError> {
        let response = self
            .client
            .get(format!("{}/v1/almanac/agents/{}", self.base_url, address))
            .send()
            .await?;
        let record: AlmanacRecord = check_status(response).await?.json().await?;

        let mut endpoints = record.endpoints;
        endpoints.sort_by(|a, b| b.weight.cmp(&a.weight));
        if endpoints.is_empty() {
            return Err(AgentverseError::NoEndpoints(address.to_string()));
        }
        Ok(endpoints.into_iter().map(|e| e.url).collect())
    }

    /// Sign `payload` into an envelope and deliver it to `recipient`
    ///
    /// Endpoints are tried in order; the first one accepting the envelope wins.
    pub async fn send(
        &self,
        identity: &AgentIdentity,
        recipient: &str,
        payload: &Value,
    ) -> Result<(), AgentverseError> {
        let mut envelope = Envelope::new(identity.address(), recipient, payload)?;
        envelope.sign(identity)?;

        let endpoints = self.resolve_endpoints(recipient).await?;
        let mut last_error = None;
        for endpoint in &endpoints {
            let result = self.client.post(endpoint).json(&envelope).send().await;
            match result {
                Ok(response) => match check_status(response).await {
                    Ok(_) => {
                        debug!("Delivered envelope to {} via {}", recipient, endpoint);
                        return Ok(());
                    }
                    Err(e) => {
                        warn!("Endpoint {} rejected envelope: {}", endpoint, e);
                        last_error = Some(e);
                    }
                },
                Err(e) => {
                    warn!("Failed to reach endpoint {}: {}", endpoint, e);
                    last_error = Some(e.into());
                }
            }
        }

        Err(last_error.unwrap_or_else(|| AgentverseError::NoEndpoints(recipient.to_string())))
    }

    /// Search the public directory
    pub async fn search_agents(
        &self,
        search: &AgentSearch,
    ) -> Result<Vec<AgentSummary>, AgentverseError> {
        let response = self
            .client
            .post(format!("{}/v1/search/agents", self.base_url))
            .json(search)
            .send()
            .await?;
        let results: SearchResponse = check_status(response).await?.json().await?;
        debug!(
            "Directory search '{}' returned {} agents",
            search.search_text,
            results.agents.len()
        );
        Ok(results.agents)
    }
}

/// SHA-256(address ‖ webhook url ‖ timestamp)
fn attestation_digest(address: &str, url: &str, timestamp: u64) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(address.as_bytes());
    hasher.update(url.as_bytes());
    hasher.update(timestamp.to_be_bytes());
    hasher.finalize().into()
}

async fn check_status(response: Response) -> Result<Response, AgentverseError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    Err(AgentverseError::Api {
        status: status.as_u16(),
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn registration(url: &str) -> Registration {
        Registration {
            webhook_url: url.to_string(),
            token: "av-token".to_string(),
            title: "Test Agent".to_string(),
            readme: "<description>test</description>".to_string(),
        }
    }

    #[tokio::test]
    async fn test_search_agents() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/search/agents"))
            .and(body_partial_json(json!({"search_text": "Tavily search agent", "limit": 3})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "agents": [
                    {"address": "agent1qabc", "name": "Tavily Search Agent", "total_interactions": 42}
                ]
            })))
            .mount(&server)
            .await;

        let client = AgentverseClient::new(server.uri()).unwrap();
        let agents = client
            .search_agents(&AgentSearch::new("Tavily search agent"))
            .await
            .unwrap();
        assert_eq!(agents.len(), 1);
        assert_eq!(agents[0].address, "agent1qabc");
        assert_eq!(agents[0].total_interactions, 42);
    }

    #[tokio::test]
    async fn test_register_sends_token_and_profile() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/almanac/agents"))
            .and(header("authorization", "Bearer av-token"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/agents"))
            .respond_with(ResponseTemplate::new(409))
            .expect(1)
            .mount(&server)
            .await;

        let identity = AgentIdentity::from_seed("register me", 0).unwrap();
        Mock::given(method("PUT"))
            .and(path(format!("/v1/agents/{}", identity.address())))
            .and(body_partial_json(json!({"name": "Test Agent"})))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let client = AgentverseClient::new(server.uri()).unwrap();
        client
            .register(&identity, &registration("http://localhost:5002/api/webhook"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_register_failure_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/almanac/agents"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad token"))
            .mount(&server)
            .await;

        let identity = AgentIdentity::from_seed("rejected", 0).unwrap();
        let client = AgentverseClient::new(server.uri()).unwrap();
        let err = client
            .register(&identity, &registration("http://localhost/api/webhook"))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentverseError::Api { status: 401, .. }));
    }

    #[tokio::test]
    async fn test_send_delivers_signed_envelope() {
        let server = MockServer::start().await;
        let recipient = AgentIdentity::from_seed("recipient", 0).unwrap();
        Mock::given(method("GET"))
            .and(path(format!("/v1/almanac/agents/{}", recipient.address())))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "endpoints": [{"url": format!("{}/inbox", server.uri()), "weight": 1}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/inbox"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let sender = AgentIdentity::from_seed("sender", 0).unwrap();
        let client = AgentverseClient::new(server.uri()).unwrap();
        client
            .send(&sender, recipient.address(), &json!({"query": "hi"}))
            .await
            .unwrap();

        let requests = server.received_requests().await.unwrap();
        let delivered = requests
            .iter()
            .find(|r| r.url.path() == "/inbox")
            .unwrap();
        let raw = String::from_utf8(delivered.body.clone()).unwrap();
        let message = crate::envelope::parse_message(&raw).unwrap();
        assert_eq!(message.sender, sender.address());
        assert_eq!(message.payload, json!({"query": "hi"}));
    }

    #[tokio::test]
    async fn test_send_without_endpoints_fails() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"endpoints": []})))
            .mount(&server)
            .await;

        let sender = AgentIdentity::from_seed("lonely", 0).unwrap();
        let client = AgentverseClient::new(server.uri()).unwrap();
        let err = client
            .send(&sender, "agent1qnowhere", &json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentverseError::NoEndpoints(_)));
    }

    #[test]
    fn test_registration_debug_masks_token() {
        let debug = format!("{:?}", registration("http://x"));
        assert!(!debug.contains("av-token"));
    }
}
