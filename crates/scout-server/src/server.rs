//! Agent server: webhook, health and custom endpoints behind one axum router
//!
//! Handlers and endpoints are registered on [`AgentServer`] before `start`.
//! Starting consumes the server, so the tables the listener routes with can
//! no longer change.

use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, Request, State};
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderValue, Method};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{Instrument, Span, debug, error, info, info_span, warn};

use scout_agentverse::{AgentIdentity, AgentRuntime, Registration};

use crate::config::{AgentMetadata, Credentials, ServerConfig};
use crate::endpoint::CustomEndpoint;
use crate::error::ServerError;
use crate::handler::{Handler, HandlerTable, invoke};
use crate::inbox::{self, Inbox, InboxSender};
use crate::protocol::{HEALTH_PATH, HealthStatus, MAX_REQUEST_BODY_SIZE, WEBHOOK_PATH, webhook_ack};

/// Outbound side of a server: identity status and message delivery
#[derive(Clone)]
pub struct Messenger {
    runtime: Arc<dyn AgentRuntime>,
    identity: Arc<OnceLock<AgentIdentity>>,
}

impl Messenger {
    fn new(runtime: Arc<dyn AgentRuntime>) -> Self {
        Self {
            runtime,
            identity: Arc::new(OnceLock::new()),
        }
    }

    /// Agent address, once startup registration succeeded
    pub fn address(&self) -> Option<&str> {
        self.identity.get().map(|identity| identity.address())
    }

    pub fn health(&self) -> HealthStatus {
        HealthStatus::from_address(self.address())
    }

    /// Deliver `payload` to `recipient`. Failures are logged and reported as false.
    pub async fn send_message(&self, recipient: &str, payload: &Value) -> bool {
        let Some(identity) = self.identity.get() else {
            error!("Agent not initialized, cannot send message to {}", recipient);
            return false;
        };

        match self.runtime.send(identity, recipient, payload).await {
            Ok(()) => {
                info!("Sent message to {}", recipient);
                true
            }
            Err(e) => {
                error!("Error sending message to {}: {:#}", recipient, e);
                false
            }
        }
    }
}

impl std::fmt::Debug for Messenger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Messenger")
            .field("address", &self.address())
            .finish_non_exhaustive()
    }
}

/// Shared by every request once the router is built
#[derive(Clone)]
struct DispatchState {
    messenger: Messenger,
    handlers: Arc<HandlerTable>,
    inbox: InboxSender,
}

/// A dispatch server that has not started yet
pub struct AgentServer {
    config: ServerConfig,
    metadata: AgentMetadata,
    credentials: Credentials,
    messenger: Messenger,
    handlers: HandlerTable,
    endpoints: Vec<CustomEndpoint>,
    inbox_tx: InboxSender,
    inbox: Option<Inbox>,
    span: Span,
}

impl AgentServer {
    pub fn new(
        config: ServerConfig,
        metadata: AgentMetadata,
        credentials: Credentials,
        runtime: Arc<dyn AgentRuntime>,
    ) -> Self {
        let span = info_span!("agent_server", title = %metadata.title);
        let (inbox_tx, inbox) = inbox::channel(config.inbox_capacity);
        Self {
            config,
            metadata,
            credentials,
            messenger: Messenger::new(runtime),
            handlers: HandlerTable::new(),
            endpoints: Vec::new(),
            inbox_tx,
            inbox: Some(inbox),
            span,
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Route webhook messages from `sender` to `handler`; a later registration
    /// for the same sender replaces the earlier one.
    pub fn register_handler(&mut self, sender: impl Into<String>, handler: Arc<dyn Handler>) {
        let _enter = self.span.enter();
        if self.handlers.insert(sender, handler) {
            debug!("Replaced existing handler");
        }
    }

    /// Register a POST endpoint; returns the normalized path it is served at
    pub fn register_endpoint(
        &mut self,
        path: &str,
        handler: Arc<dyn Handler>,
    ) -> Result<String, ServerError> {
        self.register_endpoint_with_methods(path, handler, &[])
    }

    /// Register an endpoint for `methods` (POST when empty)
    pub fn register_endpoint_with_methods(
        &mut self,
        path: &str,
        handler: Arc<dyn Handler>,
        methods: &[Method],
    ) -> Result<String, ServerError> {
        let _enter = self.span.enter();
        let endpoint = CustomEndpoint::new(path, methods, handler)?;
        if self.endpoints.iter().any(|e| e.path() == endpoint.path()) {
            return Err(ServerError::DuplicateEndpoint(endpoint.path().to_string()));
        }

        let path = endpoint.path().to_string();
        info!("Registered endpoint {} {:?}", path, endpoint.methods());
        self.endpoints.push(endpoint);
        Ok(path)
    }

    pub fn endpoints(&self) -> &[CustomEndpoint] {
        &self.endpoints
    }

    /// Take the receiving half of the inbox. Only the first call gets it;
    /// if nobody takes it, decoded messages are dropped after dispatch.
    pub fn take_inbox(&mut self) -> Option<Inbox> {
        self.inbox.take()
    }

    pub fn health(&self) -> HealthStatus {
        self.messenger.health()
    }

    /// Always false before `start`: there is no identity to send from
    pub async fn send_message(&self, recipient: &str, payload: &Value) -> bool {
        self.messenger
            .send_message(recipient, payload)
            .instrument(self.span.clone())
            .await
    }

    pub fn messenger(&self) -> Messenger {
        self.messenger.clone()
    }

    /// Build the router from a snapshot of the registered handlers and endpoints
    pub fn router(&self) -> Router {
        let state = DispatchState {
            messenger: self.messenger.clone(),
            handlers: Arc::new(self.handlers.clone()),
            inbox: self.inbox_tx.clone(),
        };

        let mut api = Router::new()
            .route(WEBHOOK_PATH, post(webhook_handler))
            .route(HEALTH_PATH, get(health_handler));
        let mut other = Router::new();
        for endpoint in &self.endpoints {
            if endpoint.is_api() {
                api = api.route(endpoint.path(), endpoint.method_router());
            } else {
                other = other.route(endpoint.path(), endpoint.method_router());
            }
        }

        let api = api
            .with_state(state)
            .layer(cors_layer(&self.config.cors_origins));

        let span = self.span.clone();
        api.merge(other)
            .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_SIZE))
            .layer(TraceLayer::new_for_http().make_span_with(move |request: &Request| {
                info_span!(
                    parent: &span,
                    "request",
                    method = %request.method(),
                    uri = %request.uri(),
                )
            }))
    }

    /// Derive the identity, register it with the directory, then bind and
    /// serve in the background. Nothing is served if any step fails.
    pub async fn start(self) -> Result<RunningServer, ServerError> {
        let span = self.span.clone();
        self.start_inner().instrument(span).await
    }

    async fn start_inner(self) -> Result<RunningServer, ServerError> {
        if !self.credentials.is_complete() {
            error!("Missing required API keys");
            return Err(ServerError::MissingCredentials);
        }

        let identity = AgentIdentity::from_seed(&self.credentials.agent_key, 0)?;
        let registration = Registration {
            webhook_url: self.config.webhook_url(),
            token: self.credentials.agentverse_token.clone(),
            title: self.metadata.title.clone(),
            readme: self.metadata.readme.clone(),
        };
        info!("Registering agent {} at {}", identity.address(), registration.webhook_url);
        self.messenger
            .runtime
            .register(&identity, &registration)
            .await
            .map_err(|e| {
                error!("Agent registration failed: {:#}", e);
                ServerError::Registration(e)
            })?;

        let address = identity.address().to_string();
        if self.messenger.identity.set(identity).is_err() {
            warn!("Agent identity was already set");
        }
        info!("Agent registered: {}", address);

        let router = self.router();
        let bind_addr = self.config.bind_addr();
        let listener = tokio::net::TcpListener::bind(&bind_addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: bind_addr.clone(),
                source,
            })?;
        let local_addr = listener.local_addr().map_err(|source| ServerError::Bind {
            addr: bind_addr,
            source,
        })?;
        info!("Agent server listening on {}", local_addr);

        let cancel = CancellationToken::new();
        let shutdown = cancel.clone();
        let task = tokio::spawn(
            async move {
                axum::serve(listener, router)
                    .with_graceful_shutdown(async move { shutdown.cancelled().await })
                    .await
            }
            .instrument(Span::current()),
        );

        Ok(RunningServer {
            local_addr,
            address,
            messenger: self.messenger,
            cancel,
            task,
            span: self.span,
        })
    }
}

impl std::fmt::Debug for AgentServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentServer")
            .field("config", &self.config)
            .field("title", &self.metadata.title)
            .field("handlers", &self.handlers)
            .field("endpoints", &self.endpoints)
            .finish_non_exhaustive()
    }
}

/// Handle to a server that is accepting connections
#[derive(Debug)]
pub struct RunningServer {
    local_addr: SocketAddr,
    address: String,
    messenger: Messenger,
    cancel: CancellationToken,
    task: JoinHandle<std::io::Result<()>>,
    span: Span,
}

impl RunningServer {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The registered agent address
    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn health(&self) -> HealthStatus {
        self.messenger.health()
    }

    pub async fn send_message(&self, recipient: &str, payload: &Value) -> bool {
        self.messenger
            .send_message(recipient, payload)
            .instrument(self.span.clone())
            .await
    }

    pub fn messenger(&self) -> Messenger {
        self.messenger.clone()
    }

    /// Token that stops the listener when cancelled
    pub fn shutdown_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stop accepting connections and wait for in-flight requests to finish
    pub async fn stop(self) -> Result<(), ServerError> {
        self.span.in_scope(|| info!("Stopping agent server"));
        self.cancel.cancel();
        self.wait().await
    }

    /// Wait until the listener exits
    pub async fn wait(self) -> Result<(), ServerError> {
        let result = match self.task.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(ServerError::Serve(e.to_string())),
            Err(e) => Err(ServerError::Serve(e.to_string())),
        };
        self.span.in_scope(|| match &result {
            Ok(()) => info!("Agent server stopped"),
            Err(e) => error!("Agent server exited: {}", e),
        });
        result
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .max_age(Duration::from_secs(3600));

    if origins.iter().any(|origin| origin == "*") {
        return layer.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(allowed))
}

// ── HTTP Handlers ──

async fn health_handler(State(state): State<DispatchState>) -> Json<HealthStatus> {
    Json(state.messenger.health())
}

async fn webhook_handler(State(state): State<DispatchState>, body: Bytes) -> Response {
    let raw = match std::str::from_utf8(&body) {
        Ok(raw) => raw,
        Err(e) => {
            error!("Error processing webhook: {}", e);
            return ServerError::Decode(format!("webhook body is not valid UTF-8: {}", e))
                .into_response();
        }
    };

    let message = match state.messenger.runtime.parse_envelope(raw) {
        Ok(message) => message,
        Err(e) => {
            error!("Error processing webhook: {:#}", e);
            return ServerError::Decode(format!("{:#}", e)).into_response();
        }
    };

    let sender = message.sender.clone();
    info!("Received message from {}", sender);

    let handler = state.handlers.get(&sender);
    let payload = message.payload.clone();
    state.inbox.offer(message);

    if let Some(handler) = handler {
        if let Err(e) = invoke(handler, payload).await {
            error!("Handler for {} failed: {:#}", sender, e);
        }
    } else {
        debug!("No handler registered for {}", sender);
    }

    Json(webhook_ack()).into_response()
}
