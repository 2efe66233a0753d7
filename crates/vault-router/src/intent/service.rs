//! External structured classification service
//!
//! The delegated classifier talks to the service only through
//! [`ClassificationService`]. [`OpenAiClassificationService`] is the
//! production implementation against any OpenAI-compatible chat completions
//! endpoint.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::time::Duration;

use super::Query;

pub const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";

// ---------------------------------------------------------------------------
// Contract
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct ServiceRequest {
    pub query: String,
    pub section: Option<String>,
    pub collection: Option<String>,
}

impl ServiceRequest {
    pub fn from_query(query: &Query) -> Self {
        Self {
            query: query.text.clone(),
            section: query.section.clone(),
            collection: Some(query.collection.clone()).filter(|c| !c.trim().is_empty()),
        }
    }
}

/// Structured verdict as returned by the service, before validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceVerdict {
    pub intent: String,
    pub confidence: f32,
    #[serde(default)]
    pub entities: HashMap<String, Option<String>>,
    #[serde(default)]
    pub reasoning: String,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
}

#[derive(Debug, Clone)]
pub struct ServiceReply {
    pub verdict: ServiceVerdict,
    pub usage: TokenUsage,
}

#[async_trait]
pub trait ClassificationService: Send + Sync {
    /// Model identifier reported in metrics.
    fn model(&self) -> &str;

    async fn classify(&self, request: &ServiceRequest) -> Result<ServiceReply>;
}

// ---------------------------------------------------------------------------
// Prompt
// ---------------------------------------------------------------------------

const CLASSIFIER_SYSTEM_PROMPT: &str = r#"You classify voice commands for a Markdown note vault (Obsidian). Output a JSON object with exactly these fields:

{"intent":"open|search|read|summarize|comment|update|table|unknown","confidence":0.0,"entities":{"query":"...","note":"...","section":null,"collection":null},"reasoning":"..."}

INTENTS:
- open: show a specific note in the editor
- search: find notes or passages containing something
- read: return the text of a note
- summarize: give a short summary of a note
- comment: explain, compare or analyse a note's content
- update: add to or change a note (analysis only, nothing is written)
- table: extract tables or list notes
- unknown: the request cannot be determined

RULES:
- confidence is between 0.0 and 1.0 and reflects how clear the request is.
- note is the note name or topic the command refers to, without particles or verbs. Use null when there is none.
- Ignore spacing and grammatical variation, voice transcripts often insert stray spaces.

EXAMPLES:
- "部品を開いて" -> intent open, note "部品"
- "部品 を開いて" -> intent open, note "部品"
- "部品について検索" -> intent search, note "部品"
- "部品ケース１の内容を見せて" -> intent read, note "部品ケース１"

Output ONLY the JSON object."#;

fn build_user_prompt(request: &ServiceRequest) -> String {
    let mut parts = vec![format!("Command: \"{}\"", request.query)];
    if let Some(section) = &request.section {
        parts.push(format!("Section hint: {}", section));
    }
    if let Some(collection) = &request.collection {
        parts.push(format!("Vault: {}", collection));
    }
    parts.push("JSON:".to_string());
    parts.join("\n")
}

// ---------------------------------------------------------------------------
// Response parsing
// ---------------------------------------------------------------------------

/// Parse model output into a verdict. Tolerates markdown fences and prose
/// around the JSON object; fails when no intent/confidence can be found.
pub fn parse_verdict(raw: &str) -> Result<ServiceVerdict> {
    let cleaned = raw
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    let json_str = match (cleaned.find('{'), cleaned.rfind('}')) {
        (Some(start), Some(end)) if end > start => &cleaned[start..=end],
        _ => cleaned,
    };

    if let Ok(verdict) = serde_json::from_str::<ServiceVerdict>(json_str) {
        return Ok(verdict);
    }

    // Lenient parse: intent and confidence are mandatory, the rest is optional.
    let intent = extract_json_string(json_str, "intent")
        .ok_or_else(|| anyhow!("classification response has no intent field"))?;
    let confidence = extract_json_number(json_str, "confidence")
        .ok_or_else(|| anyhow!("classification response has no confidence field"))?;

    let mut entities = HashMap::new();
    for field in ["query", "note", "section", "collection"] {
        if let Some(value) = extract_json_string(json_str, field) {
            entities.insert(field.to_string(), Some(value));
        }
    }

    Ok(ServiceVerdict {
        intent,
        confidence,
        entities,
        reasoning: extract_json_string(json_str, "reasoning")
            .unwrap_or_else(|| "partial parse".to_string()),
    })
}

/// Extract a JSON string field value by scanning for `"field":"value"`.
fn extract_json_string(json: &str, field: &str) -> Option<String> {
    let after_colon = value_start(json, field)?;
    let content = after_colon.strip_prefix('"')?;

    let mut escaped = false;
    for (i, ch) in content.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' => escaped = true,
            '"' => return Some(content[..i].to_string()),
            _ => {}
        }
    }
    None
}

/// Extract a bare JSON number field value.
fn extract_json_number(json: &str, field: &str) -> Option<f32> {
    let after_colon = value_start(json, field)?;
    let end = after_colon
        .find(|c: char| !(c.is_ascii_digit() || matches!(c, '.' | '-' | '+' | 'e' | 'E')))
        .unwrap_or(after_colon.len());
    after_colon[..end].parse().ok()
}

fn value_start<'a>(json: &'a str, field: &str) -> Option<&'a str> {
    let pattern = format!("\"{}\"", field);
    let pos = json.find(&pattern)?;
    let after_key = &json[pos + pattern.len()..];
    Some(after_key.trim_start().strip_prefix(':')?.trim_start())
}

/// Quick token estimate (chars / 4).
fn estimate_tokens(text: &str) -> usize {
    (text.len() + 3) / 4
}

// ---------------------------------------------------------------------------
// OpenAI-compatible implementation
// ---------------------------------------------------------------------------

pub struct OpenAiClassificationService {
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: usize,
    client: Client,
}

impl OpenAiClassificationService {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5).min(timeout))
            .timeout(timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_nodelay(true)
            .build()
            .context("failed to build HTTP client for classification service")?;

        let service = Self {
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            model: model.into(),
            temperature: 0.1,
            max_tokens: 200,
            client,
        };

        tracing::info!(
            endpoint = %service.endpoint,
            model = %service.model,
            timeout_ms = timeout.as_millis() as u64,
            "Created classification service client"
        );

        Ok(service)
    }

    pub fn with_sampling(mut self, temperature: f32, max_tokens: usize) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }

    /// Read the body as JSON, failing clearly when a proxy answered with HTML.
    async fn parse_json_response(&self, response: reqwest::Response) -> Result<serde_json::Value> {
        let status = response.status();
        let body = response
            .text()
            .await
            .with_context(|| format!("failed to read response body from {}", self.endpoint))?;

        let trimmed = body.trim_start();
        if trimmed.starts_with('<') {
            let preview: String = trimmed.chars().take(200).collect();
            bail!(
                "endpoint {} returned HTML instead of JSON (HTTP {}): {}",
                self.endpoint,
                status,
                preview
            );
        }

        if !status.is_success() {
            let preview: String = body.chars().take(300).collect();
            bail!("classification API error ({}): {}", status, preview);
        }

        serde_json::from_str(&body).map_err(|e| {
            let preview: String = body.chars().take(300).collect();
            anyhow!("failed to parse JSON from {} (HTTP {}): {}. Body: {}", self.endpoint, status, e, preview)
        })
    }
}

#[async_trait]
impl ClassificationService for OpenAiClassificationService {
    fn model(&self) -> &str {
        &self.model
    }

    async fn classify(&self, request: &ServiceRequest) -> Result<ServiceReply> {
        let user_prompt = build_user_prompt(request);
        let body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": CLASSIFIER_SYSTEM_PROMPT},
                {"role": "user", "content": user_prompt}
            ],
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
            "response_format": {"type": "json_object"},
            "stream": false
        });

        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    anyhow!("request to {} timed out", self.endpoint)
                } else if e.is_connect() {
                    anyhow!("failed to connect to {}: {}", self.endpoint, e)
                } else {
                    anyhow!("request to {} failed: {}", self.endpoint, e)
                }
            })?;

        let value = self.parse_json_response(response).await?;
        let content = value["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| anyhow!("classification response has no message content"))?;

        let verdict = parse_verdict(content)?;

        let usage = match value.get("usage") {
            Some(usage) => TokenUsage {
                prompt_tokens: usage["prompt_tokens"].as_u64().unwrap_or(0) as usize,
                completion_tokens: usage["completion_tokens"].as_u64().unwrap_or(0) as usize,
            },
            None => TokenUsage {
                prompt_tokens: estimate_tokens(CLASSIFIER_SYSTEM_PROMPT) + estimate_tokens(&user_prompt),
                completion_tokens: estimate_tokens(content),
            },
        };

        tracing::debug!(
            intent = %verdict.intent,
            confidence = verdict.confidence,
            reasoning = %verdict.reasoning,
            prompt_tokens = usage.prompt_tokens,
            completion_tokens = usage.completion_tokens,
            "Classification service verdict"
        );

        Ok(ServiceReply { verdict, usage })
    }
}
