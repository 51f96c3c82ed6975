//! Text-generation backend used by the research stages.

use crate::config::BackendConfig;
use crate::error::{PackopsError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

const ASSESSOR_SYSTEM_PROMPT: &str = "You are an expert at evaluating business ideas and \
compliance pack concepts. Provide accurate, thoughtful assessments with clear reasoning.";

#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    pub system: String,
    pub prompt: String,
    /// Overrides the configured limit for long outputs such as reports.
    pub max_tokens: Option<u32>,
    /// Ask the model for a single JSON object.
    pub json_output: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub text: String,
    pub tokens_used: u64,
}

/// Backend scores for a work item, each clamped to 0..=100.
#[derive(Debug, Clone, PartialEq)]
pub struct Assessment {
    pub viability: u8,
    pub data_availability: u8,
    pub icp_clarity: u8,
    pub rationale: String,
    pub tokens_used: u64,
}

pub trait GenerationBackend: Send + Sync {
    fn generate(&self, request: &CompletionRequest) -> Result<Completion>;

    /// Score a work item. The default implementation requests a JSON object
    /// and parses it with [`parse_assessment`].
    fn assess(&self, prompt: &str) -> Result<Assessment> {
        let completion = self.generate(&CompletionRequest {
            system: ASSESSOR_SYSTEM_PROMPT.to_string(),
            prompt: prompt.to_string(),
            max_tokens: None,
            json_output: true,
        })?;
        parse_assessment(&completion.text, completion.tokens_used)
    }
}

/// Parse `{"viability", "data_availability", "icp_clarity", "rationale"}`.
///
/// Missing scores count as 0 and out-of-range scores are clamped; a body that
/// is not a JSON object is an error.
pub fn parse_assessment(text: &str, tokens_used: u64) -> Result<Assessment> {
    let value: Value = serde_json::from_str(text.trim())
        .map_err(|e| PackopsError::BackendResponse(format!("assessment is not JSON: {e}")))?;
    let Value::Object(obj) = value else {
        return Err(PackopsError::BackendResponse(
            "assessment must be a JSON object".to_string(),
        ));
    };
    let score = |key: &str| -> u8 {
        let raw = match obj.get(key) {
            Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
            Some(Value::String(s)) => s.trim().parse::<f64>().unwrap_or(0.0),
            _ => 0.0,
        };
        raw.clamp(0.0, 100.0) as u8
    };
    Ok(Assessment {
        viability: score("viability"),
        data_availability: score("data_availability"),
        icp_clarity: score("icp_clarity"),
        rationale: obj
            .get("rationale")
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .unwrap_or("No rationale provided")
            .to_string(),
        tokens_used,
    })
}

// ---------------------------------------------------------------------------
// OpenAI-compatible HTTP backend
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f64,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatUsage {
    #[serde(default)]
    total_tokens: u64,
}

/// Blocking client for any `/chat/completions` endpoint speaking the OpenAI
/// wire format. Errors are returned as-is; there is no retry.
pub struct OpenAiBackend {
    client: reqwest::blocking::Client,
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f64,
    max_tokens: u32,
}

impl OpenAiBackend {
    pub fn new(cfg: &BackendConfig, api_key: impl Into<String>) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_seconds))
            .build()
            .map_err(|e| PackopsError::Backend(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", cfg.base_url.trim_end_matches('/')),
            api_key: api_key.into(),
            model: cfg.model.clone(),
            temperature: cfg.temperature,
            max_tokens: cfg.max_tokens,
        })
    }

    /// Build a client with the key read from `cfg.api_key_env`.
    pub fn from_env(cfg: &BackendConfig) -> Result<Self> {
        let key = std::env::var(&cfg.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| PackopsError::MissingApiKey(cfg.api_key_env.clone()))?;
        Self::new(cfg, key)
    }
}

impl GenerationBackend for OpenAiBackend {
    fn generate(&self, request: &CompletionRequest) -> Result<Completion> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &request.system,
                },
                ChatMessage {
                    role: "user",
                    content: &request.prompt,
                },
            ],
            temperature: self.temperature,
            max_tokens: request.max_tokens.unwrap_or(self.max_tokens),
            response_format: request.json_output.then_some(ResponseFormat {
                kind: "json_object",
            }),
        };

        debug!(model = %self.model, endpoint = %self.endpoint, "chat completion request");
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .map_err(|e| {
                if e.is_timeout() {
                    PackopsError::Backend(format!("request timed out: {e}"))
                } else {
                    PackopsError::Backend(format!("request failed: {e}"))
                }
            })?;

        let status = response.status();
        let text = response
            .text()
            .map_err(|e| PackopsError::Backend(format!("reading response body: {e}")))?;
        if !status.is_success() {
            return Err(PackopsError::Backend(format!("HTTP {status}: {text}")));
        }

        let parsed: ChatResponse = serde_json::from_str(&text)
            .map_err(|e| PackopsError::BackendResponse(format!("{e}: {text}")))?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| PackopsError::BackendResponse("no choices in response".to_string()))?;

        Ok(Completion {
            text: content,
            tokens_used: parsed.usage.map(|u| u.total_tokens).unwrap_or(0),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
