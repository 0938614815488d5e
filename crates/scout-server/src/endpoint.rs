//! Custom endpoints: JSON request/response routes registered before start

use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, Method};
use axum::response::{IntoResponse, Response};
use axum::routing::{MethodFilter, MethodRouter, on};
use serde_json::Value;
use tracing::{error, info};

use crate::error::ServerError;
use crate::handler::{Handler, invoke};
use crate::protocol::{API_PREFIX, RESERVED_PATHS};

/// Methods bound when none are given
pub const DEFAULT_ENDPOINT_METHODS: [Method; 1] = [Method::POST];

/// Bare names are namespaced under `/api/`; absolute paths are kept as given
pub fn normalize_path(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("{}{}", API_PREFIX, path)
    }
}

/// A registered custom endpoint
#[derive(Clone)]
pub struct CustomEndpoint {
    path: String,
    methods: Vec<Method>,
    filter: MethodFilter,
    handler: Arc<dyn Handler>,
}

impl CustomEndpoint {
    pub(crate) fn new(
        path: &str,
        methods: &[Method],
        handler: Arc<dyn Handler>,
    ) -> Result<Self, ServerError> {
        let path = normalize_path(path);
        if RESERVED_PATHS.contains(&path.as_str()) {
            return Err(ServerError::DuplicateEndpoint(path));
        }
        if path.contains(['{', '}', '*']) || path.split('/').any(|s| s.starts_with(':')) {
            return Err(ServerError::InvalidPath {
                path,
                reason: "path parameters and wildcards are not supported".to_string(),
            });
        }

        let methods = if methods.is_empty() {
            DEFAULT_ENDPOINT_METHODS.to_vec()
        } else {
            methods.to_vec()
        };
        let filter = method_filter(&path, &methods)?;

        Ok(Self {
            path,
            methods,
            filter,
            handler,
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn methods(&self) -> &[Method] {
        &self.methods
    }

    pub(crate) fn is_api(&self) -> bool {
        self.path.starts_with(API_PREFIX)
    }

    pub(crate) fn method_router<S>(&self) -> MethodRouter<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        let path = self.path.clone();
        let handler = self.handler.clone();
        on(self.filter, move |headers: HeaderMap, body: Bytes| {
            let path = path.clone();
            let handler = handler.clone();
            async move { handle_request(&path, handler, &headers, &body).await }
        })
    }
}

impl std::fmt::Debug for CustomEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CustomEndpoint")
            .field("path", &self.path)
            .field("methods", &self.methods)
            .finish_non_exhaustive()
    }
}

fn method_filter(path: &str, methods: &[Method]) -> Result<MethodFilter, ServerError> {
    let mut combined: Option<MethodFilter> = None;
    for method in methods {
        let filter =
            MethodFilter::try_from(method.clone()).map_err(|_| ServerError::UnsupportedMethod {
                method: method.to_string(),
                path: path.to_string(),
            })?;
        combined = Some(match combined {
            Some(existing) => existing.or(filter),
            None => filter,
        });
    }
    Ok(combined.unwrap_or(MethodFilter::POST))
}

/// True for `application/json` and `application/*+json`
fn is_json(headers: &HeaderMap) -> bool {
    let Some(content_type) = headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok()) else {
        return false;
    };
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    mime == "application/json" || (mime.starts_with("application/") && mime.ends_with("+json"))
}

/// Parse the body when it is declared as JSON, otherwise use an empty object
fn request_payload(headers: &HeaderMap, body: &[u8]) -> Result<Value, ServerError> {
    if !is_json(headers) {
        return Ok(Value::Object(serde_json::Map::new()));
    }
    serde_json::from_slice(body)
        .map_err(|e| ServerError::Decode(format!("Failed to decode JSON body: {}", e)))
}

async fn handle_request(
    path: &str,
    handler: Arc<dyn Handler>,
    headers: &HeaderMap,
    body: &[u8],
) -> Response {
    let payload = match request_payload(headers, body) {
        Ok(payload) => payload,
        Err(e) => {
            error!("Endpoint error on {}: {}", path, e);
            return e.into_response();
        }
    };
    info!("Received request to {}: {}", path, payload);

    match invoke(handler, payload).await {
        Ok(result) => Json(result).into_response(),
        Err(e) => {
            error!("Endpoint error on {}: {:#}", path, e);
            ServerError::Handler(format!("{:#}", e)).into_response()
        }
    }
}
