use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use scout_agentverse::DEFAULT_AGENTVERSE_URL;
use scout_core::providers::openai::{DEFAULT_OPENAI_MODEL, DEFAULT_OPENAI_URL, DEFAULT_TEMPERATURE};
use scout_core::tavily::DEFAULT_MAX_RESULTS;
use scout_server::{AgentMetadata, Credentials, ServerConfig};

pub const DEFAULT_CONFIG: &str = include_str!("../../../config/default.toml");

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoutConfig {
    pub server: ServerConfig,
    pub agent: AgentConfig,
    pub providers: ProvidersConfig,
    pub agentverse: AgentverseConfig,
    pub client: ClientConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default = "default_readme")]
    pub readme: String,
    /// Answer search queries arriving over the agent messaging protocol
    #[serde(default)]
    pub answer_messages: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            title: default_title(),
            readme: default_readme(),
            answer_messages: false,
            system_prompt: None,
        }
    }
}

fn default_title() -> String {
    "Tavily Search Agent".to_string()
}

fn default_readme() -> String {
    r#"![tag:innovationlab](https://img.shields.io/badge/innovation--lab-3D8BD3)
<description>An agent that performs web searches using the Tavily API and returns comprehensive results.</description>
<use_cases>
    <use_case>Find up-to-date information about any topic</use_case>
    <use_case>Research facts and get summarized information</use_case>
    <use_case>Answer questions that require current web data</use_case>
</use_cases>
<payload_requirements>
    <description>Send your search query</description>
    <payload>
        <requirement>
            <parameter>query</parameter>
            <description>The search query you want to run</description>
        </requirement>
    </payload>
</payload_requirements>
"#
    .to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    pub openai: OpenAiConfig,
    pub tavily: TavilyConfig,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct OpenAiConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,
    #[serde(default = "default_openai_model")]
    pub model: String,
    #[serde(default = "default_openai_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: default_openai_base_url(),
            model: default_openai_model(),
            max_tokens: default_openai_max_tokens(),
            temperature: default_temperature(),
        }
    }
}

impl std::fmt::Debug for OpenAiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiConfig")
            .field("api_key", &mask_secret(&self.api_key))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .finish()
    }
}

fn default_openai_base_url() -> String {
    DEFAULT_OPENAI_URL.to_string()
}

fn default_openai_model() -> String {
    DEFAULT_OPENAI_MODEL.to_string()
}

fn default_openai_max_tokens() -> u32 {
    1024
}

fn default_temperature() -> f64 {
    DEFAULT_TEMPERATURE
}

#[derive(Clone, Serialize, Deserialize)]
pub struct TavilyConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_max_results")]
    pub max_results: u32,
}

impl Default for TavilyConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            max_results: default_max_results(),
        }
    }
}

impl std::fmt::Debug for TavilyConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TavilyConfig")
            .field("api_key", &mask_secret(&self.api_key))
            .field("max_results", &self.max_results)
            .finish()
    }
}

fn default_max_results() -> u32 {
    DEFAULT_MAX_RESULTS
}

#[derive(Clone, Serialize, Deserialize)]
pub struct AgentverseConfig {
    /// Seed the agent identity is derived from
    #[serde(default)]
    pub agent_key: String,
    #[serde(default)]
    pub api_token: String,
    #[serde(default = "default_agentverse_url")]
    pub base_url: String,
}

impl Default for AgentverseConfig {
    fn default() -> Self {
        Self {
            agent_key: String::new(),
            api_token: String::new(),
            base_url: default_agentverse_url(),
        }
    }
}

impl std::fmt::Debug for AgentverseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentverseConfig")
            .field("agent_key", &mask_secret(&self.agent_key))
            .field("api_token", &mask_secret(&self.api_token))
            .field("base_url", &self.base_url)
            .finish()
    }
}

fn default_agentverse_url() -> String {
    DEFAULT_AGENTVERSE_URL.to_string()
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Seed for the identity `scout query --method agentverse` sends from
    #[serde(default)]
    pub client_key: String,
    #[serde(default = "default_server_url")]
    pub server_url: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            client_key: String::new(),
            server_url: default_server_url(),
        }
    }
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("client_key", &mask_secret(&self.client_key))
            .field("server_url", &self.server_url)
            .finish()
    }
}

fn default_server_url() -> String {
    "http://localhost:5002".to_string()
}

/// Mask a secret for display: first 3 and last 4 chars of longer keys, otherwise "***"
pub fn mask_secret(s: &str) -> String {
    if s.is_empty() {
        return "(empty)".to_string();
    }
    let chars: Vec<char> = s.chars().collect();
    if chars.len() > 7 {
        let prefix: String = chars[..3].iter().collect();
        let suffix: String = chars[chars.len() - 4..].iter().collect();
        format!("{}...{}", prefix, suffix)
    } else {
        "***".to_string()
    }
}

pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".scout")
}

impl ScoutConfig {
    /// Load `custom_path`, or `~/.scout/config.toml`, falling back to the
    /// built-in defaults when the default file does not exist.
    pub fn load(custom_path: &Option<PathBuf>) -> Result<Self> {
        let lookup = |name: &str| std::env::var(name).ok();
        match custom_path {
            Some(path) => Self::load_from(path, lookup),
            None => {
                let path = config_dir().join("config.toml");
                if path.exists() {
                    Self::load_from(&path, lookup)
                } else {
                    debug!("No config at {}, using built-in defaults", path.display());
                    Self::parse(DEFAULT_CONFIG, lookup)
                }
            }
        }
    }

    pub fn load_from(path: &Path, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Ok(metadata) = std::fs::metadata(path) {
                let mode = metadata.permissions().mode();
                if mode & 0o077 != 0 {
                    warn!(
                        "Config file {} is readable by other users ({:o}). Fix with: chmod 600 {}",
                        path.display(),
                        mode & 0o777,
                        path.display()
                    );
                }
            }
        }

        let content = std::fs::read_to_string(path).with_context(|| {
            format!(
                "Failed to read config at {}. Run `scout init` first.",
                path.display()
            )
        })?;
        Self::parse(&content, lookup)
            .with_context(|| format!("Failed to parse config at {}", path.display()))
    }

    pub fn parse(content: &str, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let expanded = expand_env_vars(content, lookup);
        let config: Self = toml::from_str(&expanded)?;

        if config.providers.openai.api_key.starts_with("sk-") {
            warn!(
                "OpenAI API key is hardcoded in config file. For security, use environment variables: api_key = \"${{OPENAI_API_KEY}}\""
            );
        }
        Ok(config)
    }

    /// Names of the required secrets that are empty
    pub fn missing_keys(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.providers.openai.api_key.is_empty() {
            missing.push("OPENAI_API_KEY");
        }
        if self.providers.tavily.api_key.is_empty() {
            missing.push("TAVILY_API_KEY");
        }
        if self.agentverse.agent_key.is_empty() {
            missing.push("AGENT_KEY");
        }
        if self.agentverse.api_token.is_empty() {
            missing.push("AGENTVERSE_API_KEY");
        }
        missing
    }

    pub fn metadata(&self) -> AgentMetadata {
        AgentMetadata {
            title: self.agent.title.clone(),
            readme: self.agent.readme.clone(),
        }
    }

    pub fn credentials(&self) -> Credentials {
        Credentials {
            agent_key: self.agentverse.agent_key.clone(),
            agentverse_token: self.agentverse.api_token.clone(),
        }
    }

    /// Copy with every secret masked, for display
    pub fn masked(&self) -> Self {
        let mut masked = self.clone();
        masked.providers.openai.api_key = mask_secret(&self.providers.openai.api_key);
        masked.providers.tavily.api_key = mask_secret(&self.providers.tavily.api_key);
        masked.agentverse.agent_key = mask_secret(&self.agentverse.agent_key);
        masked.agentverse.api_token = mask_secret(&self.agentverse.api_token);
        masked.client.client_key = mask_secret(&self.client.client_key);
        masked
    }
}

/// Environment variables that may be expanded in config files
const ALLOWED_ENV_VARS: &[&str] = &[
    "OPENAI_API_KEY",
    "TAVILY_API_KEY",
    "AGENT_KEY",
    "AGENTVERSE_API_KEY",
    "CLIENT_KEY",
];

/// Replace `${VAR}` for allowlisted names; unknown names are left as written
fn expand_env_vars(s: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut result = s.to_string();
    let mut pos = 0;
    while pos < result.len() {
        let Some(start) = result[pos..].find("${") else {
            break;
        };
        let abs_start = pos + start;
        let Some(end) = result[abs_start..].find('}') else {
            break;
        };
        let var_name = &result[abs_start + 2..abs_start + end];

        if !ALLOWED_ENV_VARS.contains(&var_name) {
            warn!(
                "Skipping expansion of unrecognized env var '{}' in config (not in allowlist)",
                var_name
            );
            pos = abs_start + end + 1;
            continue;
        }

        let value = lookup(var_name).unwrap_or_default();
        let value_len = value.len();
        result = format!(
            "{}{}{}",
            &result[..abs_start],
            value,
            &result[abs_start + end + 1..]
        );
        pos = abs_start + value_len;
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| vars.get(name).cloned()
    }

    #[test]
    fn test_expand_allowlisted_vars() {
        let lookup = env(&[("OPENAI_API_KEY", "sk-abc"), ("HOME", "/root")]);
        assert_eq!(expand_env_vars("key = \"${OPENAI_API_KEY}\"", &lookup), "key = \"sk-abc\"");
        assert_eq!(expand_env_vars("home = \"${HOME}\"", &lookup), "home = \"${HOME}\"");
        assert_eq!(expand_env_vars("x = \"${AGENT_KEY}\"", &lookup), "x = \"\"");
        assert_eq!(expand_env_vars("broken ${OPENAI_API_KEY", &lookup), "broken ${OPENAI_API_KEY");
    }

    #[test]
    fn test_expanded_value_is_not_reexpanded() {
        let lookup = env(&[("AGENT_KEY", "${CLIENT_KEY}"), ("CLIENT_KEY", "leak")]);
        assert_eq!(expand_env_vars("${AGENT_KEY}", &lookup), "${CLIENT_KEY}");
    }

    #[test]
    fn test_default_config_parses() {
        let lookup = env(&[
            ("OPENAI_API_KEY", "openai-key"),
            ("TAVILY_API_KEY", "tvly-key"),
            ("AGENT_KEY", "agent seed"),
            ("AGENTVERSE_API_KEY", "av-token"),
        ]);
        let config = ScoutConfig::parse(DEFAULT_CONFIG, lookup).unwrap();

        assert_eq!(config.server.port, 5002);
        assert_eq!(config.agent.title, "Tavily Search Agent");
        assert!(config.agent.readme.contains("<parameter>query</parameter>"));
        assert!(!config.agent.answer_messages);
        assert_eq!(config.providers.openai.temperature, 0.7);
        assert_eq!(config.providers.tavily.max_results, 5);
        assert_eq!(config.agentverse.base_url, "https://agentverse.ai");
        assert!(config.missing_keys().is_empty());
        assert_eq!(config.credentials().agent_key, "agent seed");
        assert!(config.client.client_key.is_empty());
    }

    #[test]
    fn test_missing_keys_reported_by_name() {
        let config = ScoutConfig::parse(DEFAULT_CONFIG, env(&[("TAVILY_API_KEY", "tvly")])).unwrap();
        assert_eq!(
            config.missing_keys(),
            vec!["OPENAI_API_KEY", "AGENT_KEY", "AGENTVERSE_API_KEY"]
        );
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = ScoutConfig::parse("", env(&[])).unwrap();
        assert_eq!(config.server.port, 5001);
        assert_eq!(config.providers.openai.model, DEFAULT_OPENAI_MODEL);
        assert_eq!(config.client.server_url, "http://localhost:5002");
        assert_eq!(config.missing_keys().len(), 4);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[server]\nport = 6000\n\n[agentverse]\nagent_key = \"${{AGENT_KEY}}\"\n"
        )
        .unwrap();

        let config = ScoutConfig::load_from(file.path(), env(&[("AGENT_KEY", "seed")])).unwrap();
        assert_eq!(config.server.port, 6000);
        assert_eq!(config.agentverse.agent_key, "seed");
    }

    #[test]
    fn test_load_missing_file_mentions_init() {
        let err = ScoutConfig::load_from(Path::new("/nonexistent/scout.toml"), env(&[])).unwrap_err();
        assert!(format!("{:#}", err).contains("scout init"));
    }

    #[test]
    fn test_mask_secret() {
        assert_eq!(mask_secret(""), "(empty)");
        assert_eq!(mask_secret("short"), "***");
        assert_eq!(mask_secret("sk-abcdefghijkl"), "sk-...ijkl");
    }

    #[test]
    fn test_masked_config_and_debug_hide_secrets() {
        let config = ScoutConfig::parse(
            DEFAULT_CONFIG,
            env(&[("OPENAI_API_KEY", "openai-secret-value"), ("CLIENT_KEY", "client-seed-phrase")]),
        )
        .unwrap();

        let rendered = toml::to_string_pretty(&config.masked()).unwrap();
        assert!(!rendered.contains("openai-secret-value"));
        assert!(!rendered.contains("client-seed-phrase"));
        assert!(rendered.contains("ope...alue"));

        let debug = format!("{:?}", config);
        assert!(!debug.contains("openai-secret-value"));
        assert!(!debug.contains("client-seed-phrase"));
    }
}
