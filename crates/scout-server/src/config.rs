//! Server configuration and agent metadata

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Origins allowed to call `/api/*` from a browser ("*" allows any)
    pub cors_origins: Vec<String>,
    /// Externally reachable webhook URL announced to the directory.
    /// Defaults to `http://{host}:{port}/api/webhook`.
    pub public_url: Option<String>,
    /// Inbound messages buffered for an inbox consumer before new ones are dropped
    pub inbox_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5001,
            cors_origins: vec!["http://localhost:3000".to_string()],
            public_url: None,
            inbox_capacity: 1024,
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn webhook_url(&self) -> String {
        match &self.public_url {
            Some(url) if !url.is_empty() => url.clone(),
            _ => format!("http://{}:{}/api/webhook", self.host, self.port),
        }
    }
}

/// How the agent is listed in the directory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentMetadata {
    pub title: String,
    /// Complete readme document, published verbatim
    pub readme: String,
}

/// Secrets needed to create and register the agent identity
#[derive(Clone, Default)]
pub struct Credentials {
    pub agent_key: String,
    pub agentverse_token: String,
}

impl Credentials {
    pub fn is_complete(&self) -> bool {
        !self.agent_key.is_empty() && !self.agentverse_token.is_empty()
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mask = |s: &str| if s.is_empty() { "(empty)" } else { "***" };
        f.debug_struct("Credentials")
            .field("agent_key", &mask(&self.agent_key))
            .field("agentverse_token", &mask(&self.agentverse_token))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_webhook_url() {
        let config = ServerConfig {
            port: 5002,
            ..Default::default()
        };
        assert_eq!(config.webhook_url(), "http://0.0.0.0:5002/api/webhook");
        assert_eq!(config.bind_addr(), "0.0.0.0:5002");
    }

    #[test]
    fn test_public_url_overrides_webhook() {
        let config = ServerConfig {
            public_url: Some("https://scout.example.com/api/webhook".to_string()),
            ..Default::default()
        };
        assert_eq!(config.webhook_url(), "https://scout.example.com/api/webhook");
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: ServerConfig = serde_json::from_str(r#"{"port": 8080}"#).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.cors_origins, vec!["http://localhost:3000"]);
    }

    #[test]
    fn test_credentials() {
        let creds = Credentials {
            agent_key: "seed".to_string(),
            agentverse_token: String::new(),
        };
        assert!(!creds.is_complete());
        let debug = format!("{:?}", creds);
        assert!(!debug.contains("seed"));
        assert!(debug.contains("(empty)"));
    }
}
