//! Free text -> note path. Keyword commands win, otherwise the note with the
//! best grep hits.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use super::{NoteStore, NoteStoreError};
use crate::intent::Prefer;

const MAX_CANDIDATES: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandOpen {
    pub path: String,
}

/// One entry of `commands.yml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub name: String,
    pub keywords: Vec<String>,
    pub open: CommandOpen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetSource {
    Command,
    Search,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub path: String,
    pub hits: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedTarget {
    pub found: bool,
    pub reason: Option<String>,
    pub open_path: Option<String>,
    pub source: Option<TargetSource>,
    pub candidates: Vec<Candidate>,
}

impl ResolvedTarget {
    fn missing(reason: impl Into<String>) -> Self {
        Self {
            found: false,
            reason: Some(reason.into()),
            open_path: None,
            source: None,
            candidates: Vec::new(),
        }
    }
}

/// Load the command table. A missing file, bad YAML or malformed entries are
/// skipped rather than treated as errors.
pub fn load_commands(path: &Path) -> Vec<Command> {
    let Ok(content) = std::fs::read_to_string(path) else {
        return Vec::new();
    };
    let entries: Vec<serde_yaml::Value> = match serde_yaml::from_str(&content) {
        Ok(Some(entries)) => entries,
        Ok(None) => return Vec::new(),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Ignoring unreadable command table");
            return Vec::new();
        }
    };

    entries
        .into_iter()
        .filter_map(|entry| match serde_yaml::from_value::<Command>(entry) {
            Ok(command) => Some(command),
            Err(e) => {
                tracing::debug!(error = %e, "Skipping malformed command entry");
                None
            }
        })
        .collect()
}

/// First command with a keyword contained in `text` (case-insensitive).
pub fn match_command<'a>(text: &str, commands: &'a [Command]) -> Option<&'a Command> {
    let text = text.to_lowercase();
    commands.iter().find(|command| {
        command
            .keywords
            .iter()
            .any(|k| !k.trim().is_empty() && text.contains(&k.to_lowercase()))
    })
}

impl NoteStore {
    pub fn commands(&self) -> Vec<Command> {
        load_commands(self.commands_file())
    }

    pub fn resolve(&self, text: &str, prefer: Prefer) -> Result<ResolvedTarget, NoteStoreError> {
        let commands = self.commands();
        if let Some(command) = match_command(text, &commands) {
            tracing::debug!(command = %command.name, path = %command.open.path, "Resolved by command");
            return Ok(ResolvedTarget {
                found: true,
                reason: None,
                open_path: Some(command.open.path.clone()),
                source: Some(TargetSource::Command),
                candidates: Vec::new(),
            });
        }

        let hits = self.grep(text, self.resolve_limit)?;
        if hits.is_empty() {
            return Ok(ResolvedTarget::missing("no hits"));
        }

        // Hit count per path, in first-seen order so ties stay stable.
        let mut order: Vec<String> = Vec::new();
        let mut counts: HashMap<String, usize> = HashMap::new();
        for hit in hits {
            let count = counts.entry(hit.path.clone()).or_insert(0);
            if *count == 0 {
                order.push(hit.path);
            }
            *count += 1;
        }

        let mut candidates: Vec<Candidate> = order
            .into_iter()
            .map(|path| Candidate {
                hits: counts.get(&path).copied().unwrap_or(0),
                path,
            })
            .collect();

        match prefer {
            Prefer::Shortest => candidates.sort_by_key(|c| (c.path.chars().count(), std::cmp::Reverse(c.hits))),
            Prefer::MostHits => candidates.sort_by_key(|c| (std::cmp::Reverse(c.hits), c.path.chars().count())),
        }
        candidates.truncate(MAX_CANDIDATES);

        Ok(ResolvedTarget {
            found: true,
            reason: None,
            open_path: candidates.first().map(|c| c.path.clone()),
            source: Some(TargetSource::Search),
            candidates,
        })
    }
}
