//! HTTP front end for the vault assistant

pub mod error;
pub mod routes;

use axum::{
    extract::{Request, State},
    http::HeaderValue,
    middleware::{self, Next},
    response::Response,
    routing::get,
    Router,
};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use vault_router::config::ServerConfig;
use vault_router::vault::vault_executors;
use vault_router::{ConfigError, NoteStore, Orchestrator, RouterConfig, TraceSink, TracingTraceSink};

use crate::error::ApiError;

pub const API_KEY_HEADER: &str = "x-api-key";

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<RouterConfig>,
    pub store: Arc<NoteStore>,
    pub orchestrator: Arc<Orchestrator>,
}

impl AppState {
    pub fn new(config: RouterConfig) -> Result<Self, ConfigError> {
        Self::with_sink(config, Arc::new(TracingTraceSink))
    }

    pub fn with_sink(config: RouterConfig, sink: Arc<dyn TraceSink>) -> Result<Self, ConfigError> {
        let store = Arc::new(NoteStore::from_config(&config.vault));
        if !store.exists() {
            tracing::warn!(root = %store.root().display(), "Vault root does not exist yet");
        }
        let orchestrator = Orchestrator::from_config(&config, vault_executors(store.clone()), sink)?;
        Ok(Self {
            config: Arc::new(config),
            store,
            orchestrator: Arc::new(orchestrator),
        })
    }
}

/// Rejects requests without the configured `X-API-Key`. Open when no key is set.
async fn require_api_key(State(state): State<AppState>, request: Request, next: Next) -> Result<Response, ApiError> {
    if let Some(expected) = state.config.server.api_key.as_deref().filter(|k| !k.is_empty()) {
        let provided = request
            .headers()
            .get(API_KEY_HEADER)
            .and_then(|v| v.to_str().ok());
        if provided != Some(expected) {
            tracing::warn!(path = %request.uri().path(), "Rejected request with invalid API key");
            return Err(ApiError::unauthorized());
        }
    }
    Ok(next.run(request).await)
}

fn cors_layer(server: &ServerConfig) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if server.allows_any_origin() {
        return layer.allow_origin(Any);
    }
    let origins: Vec<HeaderValue> = server
        .origins()
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(origins))
}

pub fn build_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/files", get(routes::files))
        .route("/search", get(routes::search))
        .route("/note", get(routes::note))
        .route("/resolve", get(routes::resolve))
        .route("/open", get(routes::open))
        .route("/assistant", get(routes::assistant))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_api_key));

    Router::new()
        .route("/health", get(routes::health))
        .route("/obsidian-api/health", get(routes::health))
        .merge(protected)
        .layer(cors_layer(&state.config.server))
        .with_state(state)
}
