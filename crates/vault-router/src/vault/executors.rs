//! Vault-backed executors, one per intent.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

use super::links::obsidian_open_urls;
use super::markdown::{extract_section, extract_tables, headings};
use super::resolver::ResolvedTarget;
use super::{Note, NoteStore, NoteStoreError};
use crate::executor::{ExecutionRequest, Executor, ExecutorRegistry, ExecutorReply};
use crate::intent::Intent;

const SUMMARY_LINES: usize = 20;

/// Registry with every vault executor sharing one store.
pub fn vault_executors(store: Arc<NoteStore>) -> ExecutorRegistry {
    ExecutorRegistry::new()
        .with(Arc::new(OpenExecutor::new(store.clone())))
        .with(Arc::new(SearchExecutor::new(store.clone())))
        .with(Arc::new(ReadExecutor::new(store.clone())))
        .with(Arc::new(SummarizeExecutor::new(store.clone())))
        .with(Arc::new(TableExecutor::new(store.clone())))
        .with(Arc::new(CommentExecutor::new(store)))
        .with(Arc::new(UpdateExecutor))
}

/// Run blocking note-store work off the async runtime.
async fn blocking<F>(store: &Arc<NoteStore>, request: &ExecutionRequest, work: F) -> Result<ExecutorReply>
where
    F: FnOnce(&NoteStore, &ExecutionRequest) -> Result<ExecutorReply> + Send + 'static,
{
    let store = store.clone();
    let request = request.clone();
    tokio::task::spawn_blocking(move || work(&store, &request))
        .await
        .context("note store task failed")?
}

/// Resolved and loaded note, or the reason there is none.
enum Located {
    Note { target: ResolvedTarget, note: Note },
    Missing(String),
}

fn locate(store: &NoteStore, request: &ExecutionRequest) -> Result<Located> {
    let Some(target_text) = request.entities.target() else {
        return Ok(Located::Missing("no note was named".into()));
    };

    let target = store.resolve(target_text, request.prefer)?;
    let Some(path) = target.open_path.clone().filter(|_| target.found) else {
        let reason = target.reason.unwrap_or_else(|| "no hits".into());
        return Ok(Located::Missing(format!("no note matches '{}' ({})", target_text, reason)));
    };

    match store.read_note(&path) {
        Ok(note) => Ok(Located::Note { target, note }),
        Err(NoteStoreError::NotFound(path)) => Ok(Located::Missing(format!("note not found: {}", path))),
        Err(e) => Err(e).with_context(|| format!("failed to read '{}'", path)),
    }
}

/// Section text when the request names one, otherwise `None`.
fn section_of(note: &Note, request: &ExecutionRequest) -> Option<Result<String, String>> {
    let heading = request
        .entities
        .section
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())?;
    Some(extract_section(&note.body, heading).ok_or_else(|| heading.to_string()))
}

/// Resolves a note and builds its `obsidian://` links.
pub struct OpenExecutor {
    store: Arc<NoteStore>,
}

impl OpenExecutor {
    pub fn new(store: Arc<NoteStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Executor for OpenExecutor {
    fn intent(&self) -> Intent {
        Intent::Open
    }

    async fn execute(&self, request: &ExecutionRequest) -> Result<ExecutorReply> {
        blocking(&self.store, request, |store, request| {
            let Some(target_text) = request.entities.target() else {
                return Ok(ExecutorReply::not_found("no note was named"));
            };
            let target = store.resolve(target_text, request.prefer)?;
            let Some(open_path) = target.open_path.as_deref().filter(|_| target.found) else {
                return Ok(ExecutorReply::not_found(format!(
                    "no note matches '{}'",
                    target_text
                )));
            };

            let vault = vault_name(store, &request.collection);
            let urls = obsidian_open_urls(&vault, open_path, request.entities.section.as_deref());
            let message = format!("Opening {}", open_path);
            Ok(ExecutorReply::found(
                json!({
                    "found": true,
                    "source": target.source,
                    "open_path": open_path,
                    "obsidian_url": urls.without_md,
                    "obsidian_urls": urls,
                    "candidates": target.candidates,
                }),
                message,
            ))
        })
        .await
    }
}

/// The vault's display name: the request's collection, else the root folder name.
fn vault_name(store: &NoteStore, collection: &str) -> String {
    let collection = collection.trim();
    if !collection.is_empty() {
        return collection.to_string();
    }
    store
        .root()
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Grep over the whole vault.
pub struct SearchExecutor {
    store: Arc<NoteStore>,
}

impl SearchExecutor {
    pub fn new(store: Arc<NoteStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Executor for SearchExecutor {
    fn intent(&self) -> Intent {
        Intent::Search
    }

    async fn execute(&self, request: &ExecutionRequest) -> Result<ExecutorReply> {
        blocking(&self.store, request, |store, request| {
            let Some(keyword) = request.entities.target() else {
                return Ok(ExecutorReply::not_found("nothing to search for"));
            };
            let hits = store.grep(keyword, store.search_limit())?;
            if hits.is_empty() {
                return Ok(ExecutorReply::not_found(format!("no hits for '{}'", keyword)));
            }
            let message = format!("{} hits for '{}'", hits.len(), keyword);
            Ok(ExecutorReply::found(json!({ "q": keyword, "hits": hits }), message))
        })
        .await
    }
}

pub struct ReadExecutor {
    store: Arc<NoteStore>,
}

impl ReadExecutor {
    pub fn new(store: Arc<NoteStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Executor for ReadExecutor {
    fn intent(&self) -> Intent {
        Intent::Read
    }

    async fn execute(&self, request: &ExecutionRequest) -> Result<ExecutorReply> {
        blocking(&self.store, request, |store, request| {
            let (target, note) = match locate(store, request)? {
                Located::Note { target, note } => (target, note),
                Located::Missing(reason) => return Ok(ExecutorReply::not_found(reason)),
            };

            let mut payload = json!({
                "path": note.path,
                "source": target.source,
                "frontmatter": note.frontmatter,
                "candidates": target.candidates,
            });
            match section_of(&note, request) {
                Some(Ok(section)) => {
                    payload["section"] = json!(request.entities.section);
                    payload["text"] = json!(section);
                }
                Some(Err(heading)) => {
                    return Ok(ExecutorReply::not_found(format!(
                        "section '{}' not found in {}",
                        heading, note.path
                    )));
                }
                None => payload["text"] = json!(note.body),
            }
            Ok(ExecutorReply::found(payload, format!("Read {}", note.path)))
        })
        .await
    }
}

/// Opening lines of a note or section.
pub struct SummarizeExecutor {
    store: Arc<NoteStore>,
}

impl SummarizeExecutor {
    pub fn new(store: Arc<NoteStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Executor for SummarizeExecutor {
    fn intent(&self) -> Intent {
        Intent::Summarize
    }

    async fn execute(&self, request: &ExecutionRequest) -> Result<ExecutorReply> {
        blocking(&self.store, request, |store, request| {
            let (target, note) = match locate(store, request)? {
                Located::Note { target, note } => (target, note),
                Located::Missing(reason) => return Ok(ExecutorReply::not_found(reason)),
            };

            let source_text = match section_of(&note, request) {
                Some(Ok(section)) => section,
                Some(Err(heading)) => {
                    return Ok(ExecutorReply::not_found(format!(
                        "section '{}' not found in {}",
                        heading, note.path
                    )));
                }
                None => note.body.clone(),
            };

            let summary = source_text
                .trim()
                .lines()
                .take(SUMMARY_LINES)
                .collect::<Vec<_>>()
                .join("\n")
                .trim()
                .to_string();
            if summary.is_empty() {
                return Ok(ExecutorReply::not_found(format!("{} is empty", note.path)));
            }

            Ok(ExecutorReply::found(
                json!({
                    "path": note.path,
                    "source": target.source,
                    "frontmatter": note.frontmatter,
                    "summary": summary,
                }),
                format!("Summary of {}", note.path),
            ))
        })
        .await
    }
}

pub struct TableExecutor {
    store: Arc<NoteStore>,
}

impl TableExecutor {
    pub fn new(store: Arc<NoteStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Executor for TableExecutor {
    fn intent(&self) -> Intent {
        Intent::Table
    }

    async fn execute(&self, request: &ExecutionRequest) -> Result<ExecutorReply> {
        blocking(&self.store, request, |store, request| {
            let (target, note) = match locate(store, request)? {
                Located::Note { target, note } => (target, note),
                Located::Missing(reason) => return Ok(ExecutorReply::not_found(reason)),
            };

            let tables = match section_of(&note, request) {
                Some(Ok(section)) => extract_tables(&section),
                Some(Err(heading)) => {
                    return Ok(ExecutorReply::not_found(format!(
                        "section '{}' not found in {}",
                        heading, note.path
                    )));
                }
                None => extract_tables(&note.text),
            };
            if tables.is_empty() {
                return Ok(ExecutorReply::not_found(format!("no tables in {}", note.path)));
            }

            let message = format!("{} tables in {}", tables.len(), note.path);
            Ok(ExecutorReply::found(
                json!({
                    "path": note.path,
                    "source": target.source,
                    "count": tables.len(),
                    "tables": tables,
                }),
                message,
            ))
        })
        .await
    }
}

pub struct CommentExecutor {
    store: Arc<NoteStore>,
}

impl CommentExecutor {
    pub fn new(store: Arc<NoteStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Executor for CommentExecutor {
    fn intent(&self) -> Intent {
        Intent::Comment
    }

    /// Material for commenting on a note: its outline and opening lines.
    async fn execute(&self, request: &ExecutionRequest) -> Result<ExecutorReply> {
        blocking(&self.store, request, |store, request| {
            let (target, note) = match locate(store, request)? {
                Located::Note { target, note } => (target, note),
                Located::Missing(reason) => return Ok(ExecutorReply::not_found(reason)),
            };

            let outline = headings(&note.body);
            let excerpt = note
                .body
                .trim()
                .lines()
                .take(SUMMARY_LINES)
                .collect::<Vec<_>>()
                .join("\n");

            Ok(ExecutorReply::found(
                json!({
                    "path": note.path,
                    "source": target.source,
                    "frontmatter": note.frontmatter,
                    "outline": outline,
                    "excerpt": excerpt,
                }),
                format!("About {}", note.path),
            ))
        })
        .await
    }
}

/// Editing notes is not supported; every call fails.
pub struct UpdateExecutor;

#[async_trait]
impl Executor for UpdateExecutor {
    fn intent(&self) -> Intent {
        Intent::Update
    }

    async fn execute(&self, request: &ExecutionRequest) -> Result<ExecutorReply> {
        let target = request.entities.target().unwrap_or("the note");
        bail!("editing is not supported (requested for '{}')", target)
    }
}
