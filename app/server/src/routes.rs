//! Route handlers. Vault access runs on the blocking pool.

use axum::{
    extract::{Query as QueryParams, State},
    http::header,
    response::{IntoResponse, Json},
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use vault_router::vault::obsidian_open_urls;
use vault_router::{AssistantReply, NoteStore, NoteStoreError, Prefer, Query};

use crate::error::ApiError;
use crate::AppState;

const SERVICE_NAME: &str = "obsidian-api";

async fn blocking<T, F>(store: &Arc<NoteStore>, work: F) -> Result<T, ApiError>
where
    F: FnOnce(&NoteStore) -> Result<T, NoteStoreError> + Send + 'static,
    T: Send + 'static,
{
    let store = store.clone();
    tokio::task::spawn_blocking(move || work(&store))
        .await
        .map_err(|e| ApiError::internal(format!("vault task failed: {}", e)))?
        .map_err(ApiError::from)
}

fn required(value: &str, name: &str) -> Result<(), ApiError> {
    if value.trim().is_empty() {
        return Err(ApiError::bad_request(format!("'{}' must not be empty", name)));
    }
    Ok(())
}

pub async fn health() -> impl IntoResponse {
    (
        [(header::CACHE_CONTROL, "no-store")],
        Json(json!({
            "status": "ok",
            "service": SERVICE_NAME,
            "version": env!("CARGO_PKG_VERSION"),
            "time": chrono::Local::now().to_rfc3339(),
        })),
    )
}

pub async fn files(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let files = blocking(&state.store, |store| store.list_notes()).await?;
    Ok(Json(json!({ "files": files })))
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub q: String,
    pub limit: Option<usize>,
}

pub async fn search(
    State(state): State<AppState>,
    QueryParams(params): QueryParams<SearchParams>,
) -> Result<Json<Value>, ApiError> {
    required(&params.q, "q")?;
    let limit = params.limit.unwrap_or_else(|| state.store.search_limit());
    let q = params.q.clone();
    let hits = blocking(&state.store, move |store| store.grep(&q, limit)).await?;
    Ok(Json(json!({ "q": params.q, "hits": hits })))
}

#[derive(Debug, Deserialize)]
pub struct NoteParams {
    pub path: String,
    pub section: Option<String>,
    pub with_frontmatter: Option<bool>,
}

pub async fn note(
    State(state): State<AppState>,
    QueryParams(params): QueryParams<NoteParams>,
) -> Result<Json<Value>, ApiError> {
    required(&params.path, "path")?;
    let path = params.path.clone();
    let section = params.section.clone().filter(|s| !s.trim().is_empty());

    let (note, text) = blocking(&state.store, move |store| match section {
        Some(heading) => store.read_section(&path, &heading),
        None => store.read_note(&path).map(|note| {
            let text = note.text.clone();
            (note, text)
        }),
    })
    .await?;

    let mut body = json!({ "path": note.path, "text": text });
    if params.with_frontmatter.unwrap_or(true) {
        body["frontmatter"] = note.frontmatter;
    }
    Ok(Json(body))
}

#[derive(Debug, Deserialize)]
pub struct ResolveParams {
    pub q: String,
    pub prefer: Option<String>,
}

pub async fn resolve(
    State(state): State<AppState>,
    QueryParams(params): QueryParams<ResolveParams>,
) -> Result<Json<Value>, ApiError> {
    required(&params.q, "q")?;
    let prefer = Prefer::parse(params.prefer.as_deref().unwrap_or_default());
    let target = blocking(&state.store, move |store| store.resolve(&params.q, prefer)).await?;
    Ok(Json(json!(target)))
}

#[derive(Debug, Deserialize)]
pub struct OpenParams {
    pub q: String,
    pub vault: String,
    pub prefer: Option<String>,
    pub heading: Option<String>,
}

pub async fn open(
    State(state): State<AppState>,
    QueryParams(params): QueryParams<OpenParams>,
) -> Result<Json<Value>, ApiError> {
    required(&params.q, "q")?;
    required(&params.vault, "vault")?;
    let prefer = Prefer::parse(params.prefer.as_deref().unwrap_or_default());
    let q = params.q.clone();
    let target = blocking(&state.store, move |store| store.resolve(&q, prefer)).await?;

    let Some(open_path) = target.open_path.as_deref().filter(|_| target.found) else {
        return Ok(Json(json!({
            "found": false,
            "obsidian_url": null,
            "reason": target.reason,
        })));
    };

    let urls = obsidian_open_urls(&params.vault, open_path, params.heading.as_deref());
    Ok(Json(json!({
        "found": true,
        "source": target.source,
        "open_path": open_path,
        "obsidian_url": urls.without_md,
        "obsidian_urls": urls,
        "candidates": target.candidates,
    })))
}

#[derive(Debug, Deserialize)]
pub struct AssistantParams {
    pub q: String,
    pub vault: String,
    pub prefer: Option<String>,
    pub heading: Option<String>,
    pub section: Option<String>,
}

/// One orchestration pass for a voice command.
pub async fn assistant(
    State(state): State<AppState>,
    QueryParams(params): QueryParams<AssistantParams>,
) -> Result<Json<AssistantReply>, ApiError> {
    required(&params.q, "q")?;
    required(&params.vault, "vault")?;

    let mut query = Query::new(params.q, params.vault)
        .with_prefer(Prefer::parse(params.prefer.as_deref().unwrap_or_default()));
    if let Some(section) = params
        .section
        .or(params.heading)
        .filter(|s| !s.trim().is_empty())
    {
        query = query.with_section(section);
    }

    let reply = state.orchestrator.handle(query).await;
    Ok(Json(reply))
}
