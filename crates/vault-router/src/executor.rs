//! Executors - one per intent, invoked by the orchestrator

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::intent::{Entities, Intent, Prefer};

/// Input for an executor call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRequest {
    /// Entities extracted by the classifier
    pub entities: Entities,

    /// Target collection (vault) identifier
    pub collection: String,

    /// Candidate ranking preference when several notes match
    #[serde(default)]
    pub prefer: Prefer,
}

/// What an executor produced.
///
/// A missing target is a soft outcome, not an error: the orchestrator may
/// decide to fall back. Genuine failures are returned as `Err`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExecutorReply {
    Found {
        payload: serde_json::Value,
        message: String,
    },
    NotFound {
        message: String,
    },
}

impl ExecutorReply {
    pub fn found(payload: serde_json::Value, message: impl Into<String>) -> Self {
        ExecutorReply::Found {
            payload,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ExecutorReply::NotFound {
            message: message.into(),
        }
    }

    /// Not-found, or found with nothing in it (null, empty string/array/object).
    pub fn is_empty(&self) -> bool {
        match self {
            ExecutorReply::NotFound { .. } => true,
            ExecutorReply::Found { payload, .. } => match payload {
                serde_json::Value::Null => true,
                serde_json::Value::String(s) => s.trim().is_empty(),
                serde_json::Value::Array(items) => items.is_empty(),
                serde_json::Value::Object(map) => map.is_empty(),
                _ => false,
            },
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ExecutorReply::Found { message, .. } | ExecutorReply::NotFound { message } => message,
        }
    }
}

/// Trait for intent executors
#[async_trait]
pub trait Executor: Send + Sync {
    /// The intent this executor serves
    fn intent(&self) -> Intent;

    /// Run the action for the given request
    async fn execute(&self, request: &ExecutionRequest) -> Result<ExecutorReply>;
}

/// Registry of executors keyed by intent
#[derive(Default, Clone)]
pub struct ExecutorRegistry {
    executors: HashMap<Intent, Arc<dyn Executor>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an executor, replacing any previous one for the same intent
    pub fn register(&mut self, executor: Arc<dyn Executor>) {
        self.executors.insert(executor.intent(), executor);
    }

    pub fn with(mut self, executor: Arc<dyn Executor>) -> Self {
        self.register(executor);
        self
    }

    /// Get the executor for an intent
    pub fn get(&self, intent: Intent) -> Option<Arc<dyn Executor>> {
        self.executors.get(&intent).cloned()
    }

    /// Intents with a registered executor, in declaration order
    pub fn intents(&self) -> Vec<Intent> {
        Intent::ALL
            .into_iter()
            .filter(|i| self.executors.contains_key(i))
            .collect()
    }
}
