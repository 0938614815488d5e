use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod client;
mod config;

use config::ScoutConfig;
use scout_agentverse::{AgentSearch, AgentverseClient, AgentverseRuntime};
use scout_core::tools::search::WebSearchTool;
use scout_core::{OpenAiProvider, SearchAgent, TavilyClient, ToolRegistry};
use scout_server::{AgentServer, handler_fn};

#[derive(Parser)]
#[command(name = "scout")]
#[command(version)]
#[command(about = "Scout: a web search agent on Agentverse")]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register with Agentverse and serve search requests
    Start,

    /// Run one search locally and print the result
    Ask {
        /// The search query
        query: String,
    },

    /// Query a running scout agent
    Query {
        /// The search query
        query: String,

        /// How to reach the agent
        #[arg(short, long, value_enum, default_value_t = QueryMethod::Api)]
        method: QueryMethod,

        /// Agent address, required for `--method agentverse`
        #[arg(long)]
        agent_address: Option<String>,

        /// Server URL for `--method api` (overrides client.server_url)
        #[arg(long)]
        url: Option<String>,
    },

    /// Search the Agentverse directory
    Find {
        /// Free-text search
        text: String,

        /// Maximum number of agents to show
        #[arg(short, long, default_value_t = 3)]
        limit: u32,
    },

    /// Initialize config directory and default config
    Init,

    /// Show current configuration with secrets masked
    Config,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum QueryMethod {
    /// POST to the agent's /api/search endpoint
    Api,
    /// Send an agent message through Agentverse
    Agentverse,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let filter = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match cli.command {
        Commands::Init => cmd_init().await,
        Commands::Config => cmd_config(&cli.config),
        Commands::Start => cmd_start(&cli.config).await,
        Commands::Ask { query } => cmd_ask(&cli.config, &query).await,
        Commands::Query {
            query,
            method,
            agent_address,
            url,
        } => cmd_query(&cli.config, &query, method, agent_address, url).await,
        Commands::Find { text, limit } => cmd_find(&cli.config, &text, limit).await,
    }
}

async fn cmd_init() -> Result<()> {
    let config_dir = config::config_dir();
    tokio::fs::create_dir_all(&config_dir)
        .await
        .with_context(|| format!("Failed to create config dir: {}", config_dir.display()))?;

    let config_path = config_dir.join("config.toml");
    if config_path.exists() {
        warn!("Config already exists at {}", config_path.display());
    } else {
        tokio::fs::write(&config_path, config::DEFAULT_CONFIG).await?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&config_path, std::fs::Permissions::from_mode(0o600))
                .await?;
        }
        info!("Created default config at {}", config_path.display());
    }

    println!("Scout initialized at {}", config_dir.display());
    println!(
        "Set OPENAI_API_KEY, TAVILY_API_KEY, AGENT_KEY and AGENTVERSE_API_KEY (a .env file works), or edit {}.",
        config_path.display()
    );
    Ok(())
}

fn cmd_config(config_path: &Option<PathBuf>) -> Result<()> {
    let cfg = ScoutConfig::load(config_path)?;
    println!("{}", toml::to_string_pretty(&cfg.masked())?);
    Ok(())
}

/// Build the search agent from the provider and Tavily settings
fn build_agent(cfg: &ScoutConfig) -> Result<SearchAgent> {
    let openai = &cfg.providers.openai;
    let provider = OpenAiProvider::new(
        openai.api_key.clone(),
        openai.model.clone(),
        openai.base_url.clone(),
        openai.max_tokens,
    )?
    .with_temperature(openai.temperature);

    let tavily = TavilyClient::new(cfg.providers.tavily.api_key.clone())?;
    let mut tools = ToolRegistry::new();
    tools.register(Arc::new(
        WebSearchTool::new(Arc::new(tavily)).with_max_results(cfg.providers.tavily.max_results),
    ));

    let agent = SearchAgent::new(Arc::new(provider), Arc::new(tools));
    Ok(match &cfg.agent.system_prompt {
        Some(prompt) if !prompt.trim().is_empty() => agent.with_system_prompt(prompt.clone()),
        _ => agent,
    })
}

async fn cmd_start(config_path: &Option<PathBuf>) -> Result<()> {
    let cfg = ScoutConfig::load(config_path)?;

    let missing = cfg.missing_keys();
    if !missing.is_empty() {
        bail!("Missing required API keys: {}", missing.join(", "));
    }

    let agent = Arc::new(build_agent(&cfg)?);
    info!("Search agent ready ({:?})", agent);

    let runtime = AgentverseRuntime::new(AgentverseClient::new(cfg.agentverse.base_url.clone())?);
    let mut server = AgentServer::new(
        cfg.server.clone(),
        cfg.metadata(),
        cfg.credentials(),
        Arc::new(runtime),
    );

    let search_agent = agent.clone();
    let path = server.register_endpoint(
        "search",
        handler_fn(move |payload| {
            let agent = search_agent.clone();
            async move { Ok(agent.handle_request(&payload).await) }
        }),
    )?;
    info!("Search endpoint mounted at {}", path);

    let inbox = if cfg.agent.answer_messages {
        server.take_inbox()
    } else {
        None
    };
    let messenger = server.messenger();

    let running = server.start().await.context("Failed to start agent server")?;
    println!("Agent address: {}", running.address());
    println!("Listening on {}", running.local_addr());

    let consumer = inbox.map(|mut inbox| {
        let agent = agent.clone();
        tokio::spawn(async move {
            while let Some(message) = inbox.recv().await {
                let agent = agent.clone();
                let messenger = messenger.clone();
                tokio::spawn(async move {
                    info!("Answering query from {}", message.sender);
                    let reply = agent.handle_request(&message.payload).await;
                    if !messenger.send_message(&message.sender, &reply).await {
                        error!("Failed to deliver answer to {}", message.sender);
                    }
                });
            }
        })
    });

    signal::ctrl_c().await?;
    info!("Received Ctrl+C, shutting down...");
    running.stop().await?;
    if let Some(consumer) = consumer {
        consumer.abort();
    }

    println!("Scout stopped.");
    Ok(())
}

async fn cmd_ask(config_path: &Option<PathBuf>, query: &str) -> Result<()> {
    let cfg = ScoutConfig::load(config_path)?;
    let missing: Vec<&str> = cfg
        .missing_keys()
        .into_iter()
        .filter(|key| matches!(*key, "OPENAI_API_KEY" | "TAVILY_API_KEY"))
        .collect();
    if !missing.is_empty() {
        bail!("Missing required API keys: {}", missing.join(", "));
    }

    let agent = build_agent(&cfg)?;
    let outcome = agent.search(query).await;
    println!("{}", serde_json::to_string_pretty(&outcome.to_value())?);
    Ok(())
}

async fn cmd_query(
    config_path: &Option<PathBuf>,
    query: &str,
    method: QueryMethod,
    agent_address: Option<String>,
    url: Option<String>,
) -> Result<()> {
    let cfg = ScoutConfig::load(config_path)?;

    let result = match method {
        QueryMethod::Api => {
            let server_url = url.unwrap_or_else(|| cfg.client.server_url.clone());
            client::query_api(&server_url, query).await
        }
        QueryMethod::Agentverse => {
            let agentverse = AgentverseClient::new(cfg.agentverse.base_url.clone())?;
            client::query_agentverse(
                &agentverse,
                &cfg.client.client_key,
                agent_address.as_deref().unwrap_or_default(),
                query,
            )
            .await
        }
    };

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

async fn cmd_find(config_path: &Option<PathBuf>, text: &str, limit: u32) -> Result<()> {
    let cfg = ScoutConfig::load(config_path)?;
    let agentverse = AgentverseClient::new(cfg.agentverse.base_url.clone())?;

    let agents = agentverse
        .search_agents(&AgentSearch::new(text).with_limit(limit))
        .await
        .context("Agent search failed")?;

    if agents.is_empty() {
        println!("No agents found for '{}'", text);
        return Ok(());
    }
    for agent in &agents {
        println!("{}  {}", agent.address, agent.name);
        if let Some(status) = &agent.status {
            println!("    status: {}  interactions: {}", status, agent.total_interactions);
        }
    }
    Ok(())
}
