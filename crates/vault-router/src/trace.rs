//! Per-request execution trace and the sinks that receive it.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::time::{Duration, Instant};

use crate::orchestrator::{AssistantReply, Resolution};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Ok,
    /// Completed, but on a degraded path (e.g. rule fallback for classification).
    Degraded,
    /// The executor found nothing.
    Empty,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceStep {
    pub name: String,
    pub status: StepStatus,
    pub duration_ms: f64,
    pub detail: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionTrace {
    pub session_id: String,
    pub started_at: DateTime<Utc>,
    pub steps: Vec<TraceStep>,
    pub total_ms: f64,
    pub classification_degraded: bool,
    #[serde(skip)]
    clock: Option<Instant>,
}

impl ExecutionTrace {
    pub fn start() -> Self {
        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            started_at: Utc::now(),
            steps: Vec::new(),
            total_ms: 0.0,
            classification_degraded: false,
            clock: Some(Instant::now()),
        }
    }

    pub fn record(&mut self, name: impl Into<String>, status: StepStatus, elapsed: Duration, detail: impl Into<String>) {
        let step = TraceStep {
            name: name.into(),
            status,
            duration_ms: elapsed.as_secs_f64() * 1000.0,
            detail: detail.into(),
        };
        tracing::debug!(
            session_id = %self.session_id,
            step = %step.name,
            status = ?step.status,
            duration_ms = step.duration_ms,
            "{}",
            step.detail
        );
        self.steps.push(step);
    }

    pub fn finish(&mut self) {
        if let Some(clock) = self.clock {
            self.total_ms = clock.elapsed().as_secs_f64() * 1000.0;
        }
    }

    pub fn step(&self, name: &str) -> Option<&TraceStep> {
        self.steps.iter().find(|s| s.name == name)
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name.as_str()).collect()
    }

    /// `name:duration` pairs for one-line logging.
    pub fn summary(&self) -> Vec<String> {
        self.steps
            .iter()
            .map(|s| format!("{}:{:.1}ms", s.name, s.duration_ms))
            .collect()
    }
}

/// Receives one record per request
pub trait TraceSink: Send + Sync {
    fn emit(&self, reply: &AssistantReply);
}

/// Writes each request as one structured log line.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingTraceSink;

impl TraceSink for TracingTraceSink {
    fn emit(&self, reply: &AssistantReply) {
        let (intent, confidence) = reply
            .classification
            .as_ref()
            .map(|c| (c.intent.as_str(), c.confidence))
            .unwrap_or(("none", 0.0));
        let method = reply
            .metrics
            .as_ref()
            .map(|m| m.model.as_str())
            .unwrap_or("none");
        let action = reply
            .decision
            .as_ref()
            .map(|d| format!("{:?}", d.action))
            .unwrap_or_else(|| "none".to_string());
        let routing = reply.decision.as_ref().map(|d| d.rationale.as_str()).unwrap_or("");
        let fallback_used = matches!(&reply.resolution, Resolution::Executed(o) if o.fallback_used);
        let response = sanitize_response(&reply.resolution).to_string();
        let steps = reply.trace.summary().join(" > ");

        if reply.is_failure() {
            tracing::error!(
                session_id = %reply.trace.session_id,
                query = %reply.query.text,
                intent = %intent,
                confidence = confidence,
                method = %method,
                action = %action,
                routing = %routing,
                success = false,
                duration_ms = reply.trace.total_ms,
                fallback_used = fallback_used,
                degraded = reply.trace.classification_degraded,
                steps = %steps,
                response = %response,
                "Assistant request failed"
            );
        } else {
            tracing::info!(
                session_id = %reply.trace.session_id,
                query = %reply.query.text,
                intent = %intent,
                confidence = confidence,
                method = %method,
                action = %action,
                routing = %routing,
                success = true,
                duration_ms = reply.trace.total_ms,
                fallback_used = fallback_used,
                degraded = reply.trace.classification_degraded,
                steps = %steps,
                response = %response,
                "Assistant request completed"
            );
        }
    }
}

/// Keeps every reply in memory. Used by tests and by callers that want the
/// records back after the fact.
#[derive(Debug, Default)]
pub struct CollectingTraceSink {
    replies: Mutex<Vec<AssistantReply>>,
}

impl CollectingTraceSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replies(&self) -> Vec<AssistantReply> {
        self.replies.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.replies.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.replies.lock().is_empty()
    }
}

impl TraceSink for CollectingTraceSink {
    fn emit(&self, reply: &AssistantReply) {
        self.replies.lock().push(reply.clone());
    }
}

const MAX_FIELD_CHARS: usize = 200;
const PREVIEW_CHARS: usize = 100;

/// Compact, log-safe view of a resolution: counts and previews instead of
/// whole note bodies.
pub fn sanitize_response(resolution: &Resolution) -> Value {
    match resolution {
        Resolution::Executed(outcome) => {
            let mut summary = Map::new();
            summary.insert("success".into(), json!(outcome.success));
            summary.insert("executed_intent".into(), json!(outcome.executed_intent));
            summary.insert("message".into(), json!(truncate(&outcome.message, MAX_FIELD_CHARS)));
            if let Value::Object(payload) = &outcome.payload {
                summarize_payload(payload, &mut summary);
            }
            Value::Object(summary)
        }
        Resolution::Clarification(prompt) => json!({
            "clarification_options": prompt.options.len(),
        }),
        Resolution::Rejected { reason } => json!({ "rejected": truncate(reason, MAX_FIELD_CHARS) }),
        Resolution::Cancelled { stage } => json!({ "cancelled_at": stage }),
    }
}

fn summarize_payload(payload: &Map<String, Value>, summary: &mut Map<String, Value>) {
    for field in ["path", "open_path", "source", "reason", "found"] {
        if let Some(value) = payload.get(field) {
            let value = match value {
                Value::String(s) => json!(truncate(s, MAX_FIELD_CHARS)),
                other => other.clone(),
            };
            summary.insert(field.into(), value);
        }
    }

    if let Some(Value::Array(hits)) = payload.get("hits") {
        summary.insert("hits_count".into(), json!(hits.len()));
        let sample: Vec<&str> = hits
            .iter()
            .take(3)
            .filter_map(|h| h.get("path").and_then(Value::as_str))
            .collect();
        if !sample.is_empty() {
            summary.insert("sample_files".into(), json!(sample));
        }
        if hits.len() > 3 {
            summary.insert("more_files".into(), json!(hits.len() - 3));
        }
    }

    if let Some(Value::Array(tables)) = payload.get("tables") {
        summary.insert("tables_count".into(), json!(tables.len()));
    }

    if let Some(Value::String(text)) = payload.get("text") {
        summary.insert("text_length".into(), json!(text.chars().count()));
        let first_line = text.lines().next().unwrap_or("");
        if !first_line.is_empty() {
            summary.insert("text_preview".into(), json!(truncate(first_line, PREVIEW_CHARS)));
        }
    }

    if let Some(Value::String(url)) = payload.get("obsidian_url") {
        summary.insert("obsidian_url".into(), json!(url));
    }

    if let Some(Value::Array(candidates)) = payload.get("candidates") {
        summary.insert("candidates_count".into(), json!(candidates.len()));
        let top: Vec<&Value> = candidates.iter().take(3).collect();
        if !top.is_empty() {
            summary.insert("top_candidates".into(), json!(top));
        }
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let kept: String = text.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{}...", kept)
}
