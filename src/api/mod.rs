//! REST API for the emulated datastore
//!
//! Serves the device's HTTP interface: `GET` reads (long-polling when the
//! client presents its current tag in `If-None-Match`) and `PATCH` writes under
//! `/datastore/<path>`. Default port: 8888

mod clients;

pub use clients::ClientRegistry;

use crate::datastore::{ClientId, FlatView, HierarchicalStore, PollCoordinator, PollOutcome, StoreError};
use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, info, warn};

/// Default API port
pub const DEFAULT_API_PORT: u16 = 8888;

/// Version string reported by `/apiversion`
pub const API_VERSION: &str = "0.0.0";

/// Shared state for API handlers
pub struct ApiState {
    /// Datastore written by PATCH requests
    pub store: Arc<HierarchicalStore>,
    /// Long-poll coordinator answering GET requests
    pub poller: Arc<PollCoordinator>,
    /// Clients seen so far
    pub clients: ClientRegistry,
}

impl ApiState {
    pub fn new(poller: Arc<PollCoordinator>) -> Self {
        Self {
            store: poller.store().clone(),
            poller,
            clients: ClientRegistry::new(),
        }
    }
}

/// Query arguments accepted on datastore routes
#[derive(Debug, Default, Deserialize)]
pub struct DatastoreQuery {
    /// Client identifier, `-1` for anonymous
    pub client: Option<i64>,
    /// JSON object of values to write (PATCH)
    pub json: Option<String>,
}

/// API error response
#[derive(Debug, Serialize)]
pub struct ApiError {
    error: String,
}

impl ApiError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(error: StoreError) -> Self {
        Self::new(error.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (StatusCode::BAD_REQUEST, Json(self)).into_response()
    }
}

/// Build the API router
pub fn build_router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route(
            "/datastore",
            get(get_root).patch(patch_root).options(preflight),
        )
        // The catch-all below does not match an empty remainder
        .route(
            "/datastore/",
            get(get_root).patch(patch_root).options(preflight),
        )
        .route(
            "/datastore/*path",
            get(get_path).patch(patch_path).options(preflight),
        )
        .route("/apiversion", get(api_version))
        .route("/api/health", get(health_check))
        .layer(cors_layer())
        .with_state(state)
}

/// CORS policy for browser-based clients
fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_headers([header::IF_NONE_MATCH])
        .allow_methods([Method::POST, Method::PATCH, Method::GET, Method::OPTIONS])
        .expose_headers([header::ETAG])
}

/// GET /datastore - Read (or long-poll) the whole datastore
async fn get_root(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<DatastoreQuery>,
    headers: HeaderMap,
) -> Response {
    read_datastore(&state, "", &query, &headers).await
}

/// GET /datastore/*path - Read (or long-poll) a subtree or single value
async fn get_path(
    State(state): State<Arc<ApiState>>,
    Path(path): Path<String>,
    Query(query): Query<DatastoreQuery>,
    headers: HeaderMap,
) -> Response {
    read_datastore(&state, &path, &query, &headers).await
}

/// PATCH /datastore - Write values relative to the root
async fn patch_root(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<DatastoreQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    write_datastore(&state, "", query, &headers, &body)
}

/// PATCH /datastore/*path - Write values under a base path
async fn patch_path(
    State(state): State<Arc<ApiState>>,
    Path(path): Path<String>,
    Query(query): Query<DatastoreQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    write_datastore(&state, &path, query, &headers, &body)
}

async fn read_datastore(
    state: &ApiState,
    path: &str,
    query: &DatastoreQuery,
    headers: &HeaderMap,
) -> Response {
    let client = state.clients.identify(query.client);
    let caller_tag = headers
        .get(header::IF_NONE_MATCH)
        .and_then(|value| value.to_str().ok())
        .and_then(parse_etag);

    match state.poller.poll(path, caller_tag, client).await {
        PollOutcome::Fresh { tag, body } => {
            debug!("Serving {} values at '{}' (tag {})", body.len(), path, tag);
            ([(header::ETAG, tag.to_string())], Json(body)).into_response()
        }
        PollOutcome::NotModified { tag } => {
            (StatusCode::NOT_MODIFIED, [(header::ETAG, tag.to_string())]).into_response()
        }
    }
}

fn write_datastore(
    state: &ApiState,
    path: &str,
    query: DatastoreQuery,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<Response, ApiError> {
    let client = state.clients.identify(query.client);
    let payload = write_payload(query.json, headers, body)?;

    let values: FlatView = serde_json::from_str(&payload).map_err(|e| {
        warn!("{:?}: Rejected datastore payload at '{}': {}", client, path, e);
        ApiError::new(format!("Invalid datastore payload: {}", e))
    })?;

    let tag = store_write(&state.store, path, &values, client)?;
    Ok((StatusCode::OK, [(header::ETAG, tag.to_string())]).into_response())
}

fn store_write(
    store: &HierarchicalStore,
    path: &str,
    values: &FlatView,
    client: Option<ClientId>,
) -> Result<u64, ApiError> {
    store.write(path, values, client).map_err(|e| {
        warn!("{:?}: Rejected datastore write at '{}': {}", client, path, e);
        ApiError::from(e)
    })
}

/// Locate the JSON payload of a write.
///
/// Clients send it as a `json` argument, either in the query string or in a
/// form-encoded body. A raw JSON body is accepted as well.
fn write_payload(
    query_json: Option<String>,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<String, ApiError> {
    if let Some(json) = query_json {
        return Ok(json);
    }

    let is_form = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/x-www-form-urlencoded"));

    if is_form {
        return url::form_urlencoded::parse(body)
            .find(|(key, _)| key == "json")
            .map(|(_, value)| value.into_owned())
            .ok_or_else(|| ApiError::new("Missing 'json' argument"));
    }

    if body.is_empty() {
        return Err(ApiError::new("Missing 'json' argument"));
    }

    String::from_utf8(body.to_vec()).map_err(|_| ApiError::new("Request body is not valid UTF-8"))
}

/// Parse an `If-None-Match` value into a tag. Negative or malformed tags are ignored.
fn parse_etag(value: &str) -> Option<u64> {
    let value = value.trim();
    let value = value.strip_prefix("W/").unwrap_or(value).trim_matches('"');
    value
        .parse::<i64>()
        .ok()
        .and_then(|tag| u64::try_from(tag).ok())
}

/// OPTIONS - CORS headers only
async fn preflight() -> StatusCode {
    StatusCode::OK
}

/// GET /apiversion - Datastore API version
async fn api_version() -> &'static str {
    API_VERSION
}

/// GET /api/health - Health check endpoint
async fn health_check() -> &'static str {
    "ok"
}

/// Start the API server, stopping when `shutdown` resolves
pub async fn start_server(
    state: Arc<ApiState>,
    addr: SocketAddr,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let router = build_router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind datastore server on {}", addr))?;

    info!("Server listening at http://{}", addr);
    info!("Datastore located at http://{}/datastore", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .context("Datastore server error")?;

    Ok(())
}
