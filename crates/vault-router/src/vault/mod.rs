//! Filesystem vault of Markdown notes
//!
//! Listing, grep-style search, path-safe reads and note resolution. All
//! operations are blocking; async callers go through `spawn_blocking`.

pub mod executors;
pub mod links;
pub mod markdown;
pub mod resolver;

use regex::RegexBuilder;
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

use crate::config::VaultConfig;

pub use executors::vault_executors;
pub use links::{obsidian_open_urls, ObsidianUrls};
pub use resolver::{Candidate, Command, ResolvedTarget, TargetSource};

#[derive(Debug, Error)]
pub enum NoteStoreError {
    #[error("vault root not found: {0}")]
    VaultMissing(PathBuf),

    #[error("path traversal detected: {0}")]
    PathTraversal(String),

    #[error("note not found: {0}")]
    NotFound(String),

    #[error("section not found: {0}")]
    SectionNotFound(String),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub path: String,
    /// 0 for a file-name match, otherwise the 1-based line number.
    pub line_no: usize,
    pub line: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Note {
    pub path: String,
    pub text: String,
    pub frontmatter: serde_json::Value,
    pub body: String,
}

#[derive(Debug, Clone)]
pub struct NoteStore {
    root: PathBuf,
    commands_file: PathBuf,
    search_limit: usize,
    resolve_limit: usize,
}

impl NoteStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            commands_file: root.join("commands.yml"),
            root,
            search_limit: 30,
            resolve_limit: 200,
        }
    }

    pub fn from_config(config: &VaultConfig) -> Self {
        Self {
            root: config.root.clone(),
            commands_file: config.commands_path(),
            search_limit: config.search_limit,
            resolve_limit: config.resolve_limit,
        }
    }

    pub fn with_commands_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.commands_file = path.into();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn commands_file(&self) -> &Path {
        &self.commands_file
    }

    pub fn search_limit(&self) -> usize {
        self.search_limit
    }

    pub fn exists(&self) -> bool {
        self.root.is_dir()
    }

    fn ensure_root(&self) -> Result<(), NoteStoreError> {
        if self.exists() {
            Ok(())
        } else {
            Err(NoteStoreError::VaultMissing(self.root.clone()))
        }
    }

    /// Join a vault-relative path, refusing anything that escapes the root.
    pub fn safe_join(&self, rel_path: &str) -> Result<PathBuf, NoteStoreError> {
        let cleaned = rel_path.trim().replace('\\', "/");
        let cleaned = cleaned.trim_start_matches('/');
        let relative = Path::new(cleaned);

        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return Err(NoteStoreError::PathTraversal(rel_path.to_string()));
        }

        let joined = self.root.join(relative);
        if let (Ok(real), Ok(real_root)) = (joined.canonicalize(), self.root.canonicalize()) {
            if !real.starts_with(&real_root) {
                return Err(NoteStoreError::PathTraversal(rel_path.to_string()));
            }
        }
        Ok(joined)
    }

    fn relative(&self, path: &Path) -> String {
        path.strip_prefix(&self.root)
            .unwrap_or(path)
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }

    fn markdown_files(&self) -> impl Iterator<Item = PathBuf> + '_ {
        WalkDir::new(&self.root)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter(|e| e.path().extension().and_then(|ext| ext.to_str()) == Some("md"))
            .map(|e| e.into_path())
    }

    /// Every `*.md` file, vault-relative with `/` separators.
    pub fn list_notes(&self) -> Result<Vec<String>, NoteStoreError> {
        self.ensure_root()?;
        Ok(self.markdown_files().map(|p| self.relative(&p)).collect())
    }

    /// File-name matches first (line 0), then case-insensitive line matches.
    pub fn grep(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, NoteStoreError> {
        self.ensure_root()?;
        let query = query.trim();
        if query.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let files: Vec<PathBuf> = self.markdown_files().collect();
        let mut hits = Vec::new();

        let lowered = query.to_lowercase();
        for file in &files {
            let rel = self.relative(file);
            if rel.to_lowercase().contains(&lowered) {
                hits.push(SearchHit {
                    line: format!("[FileName Match: {}]", rel),
                    path: rel,
                    line_no: 0,
                });
                if hits.len() >= limit {
                    return Ok(hits);
                }
            }
        }

        let pattern = RegexBuilder::new(&regex::escape(query))
            .case_insensitive(true)
            .build()
            .map_err(|e| NoteStoreError::NotFound(format!("invalid search pattern: {}", e)))?;

        for file in &files {
            let Ok(bytes) = std::fs::read(file) else {
                tracing::debug!(path = %file.display(), "Skipping unreadable note");
                continue;
            };
            let text = String::from_utf8_lossy(&bytes);
            let rel = self.relative(file);
            for (idx, line) in text.lines().enumerate() {
                if pattern.is_match(line) {
                    hits.push(SearchHit {
                        path: rel.clone(),
                        line_no: idx + 1,
                        line: line.trim().to_string(),
                    });
                    if hits.len() >= limit {
                        return Ok(hits);
                    }
                }
            }
        }

        Ok(hits)
    }

    pub fn read_note(&self, rel_path: &str) -> Result<Note, NoteStoreError> {
        self.ensure_root()?;
        let path = self.safe_join(rel_path)?;
        if !path.is_file() {
            return Err(NoteStoreError::NotFound(rel_path.to_string()));
        }

        let bytes = std::fs::read(&path).map_err(|source| NoteStoreError::Io {
            path: path.clone(),
            source,
        })?;
        let text = String::from_utf8_lossy(&bytes).into_owned();
        let (frontmatter, body) = markdown::parse_frontmatter(&text);
        let body = body.to_string();

        Ok(Note {
            path: self.relative(&path),
            frontmatter,
            body,
            text,
        })
    }

    /// Section of a note by exact heading title.
    pub fn read_section(&self, rel_path: &str, heading: &str) -> Result<(Note, String), NoteStoreError> {
        let note = self.read_note(rel_path)?;
        let section = markdown::extract_section(&note.body, heading)
            .ok_or_else(|| NoteStoreError::SectionNotFound(heading.to_string()))?;
        Ok((note, section))
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use std::fs;
    use std::path::Path;

    /// A small vault used across the vault tests.
    pub fn write_vault(root: &Path) {
        fs::create_dir_all(root.join("Projects/Sub")).unwrap();
        fs::create_dir_all(root.join("Daily")).unwrap();
        fs::write(
            root.join("部品.md"),
            "---\ntitle: 部品\n---\n# 部品\n\n部品リストの説明。\n\n## 手順\n部品を取り付ける。\n\n## 在庫\n| 名前 | 数 |\n|---|---|\n| ねじ | 10 |\n",
        )
        .unwrap();
        fs::write(
            root.join("Projects/Budget Plan.md"),
            "# Budget Plan\n\nThe budget for 部品 purchases.\nAnother BUDGET line.\n",
        )
        .unwrap();
        fs::write(
            root.join("Projects/Sub/部品メモ.md"),
            "# メモ\n部品の発注について。\n",
        )
        .unwrap();
        fs::write(root.join("Daily/2024-01-01.md"), "# Daily\nnothing here\n").unwrap();
        fs::write(root.join("Daily/ignored.txt"), "部品 部品 部品\n").unwrap();
    }
}
