//! Reasoning-service clients.
//!
//! The pipeline only ever sees the `ReasoningService` trait: one call in,
//! one text completion out. The HTTP implementation speaks the
//! OpenAI-compatible chat-completions shape; the dry-run implementation
//! answers every call with a fixed sentinel so the whole pipeline can run
//! without credentials or network.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::ServiceError;
use crate::config::ReasoningConfig;

/// Fixed reply used when API execution is disabled. Deliberately a small
/// valid JSON object: the lenient stage parsers degrade it to empty
/// results instead of erroring, so a dry run exercises every stage.
pub const DRY_RUN_RESPONSE: &str = r#"{"dry_run": true, "note": "simulated response"}"#;

/// One chat message in a reasoning request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".into(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }
}

/// A single reasoning request: messages plus response-shape hints.
#[derive(Debug, Clone)]
pub struct ReasoningRequest {
    pub messages: Vec<Message>,
    /// Ask the service for a JSON object response.
    pub structured: bool,
    pub max_output_tokens: Option<u32>,
}

impl ReasoningRequest {
    pub fn user(prompt: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::user(prompt)],
            structured: false,
            max_output_tokens: None,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.messages.insert(0, Message::system(system));
        self
    }

    pub fn structured(mut self) -> Self {
        self.structured = true;
        self
    }

    pub fn max_output_tokens(mut self, tokens: u32) -> Self {
        self.max_output_tokens = Some(tokens);
        self
    }
}

/// Opaque reasoning capability. Implementations must be safe to invoke
/// concurrently up to the gate's configured cap.
#[async_trait]
pub trait ReasoningService: Send + Sync {
    async fn call(&self, request: ReasoningRequest) -> Result<String, ServiceError>;
}

// ---------------------------------------------------------------------------
// HTTP client
// ---------------------------------------------------------------------------

/// HTTP client for an OpenAI-compatible chat-completions endpoint.
pub struct HttpReasoningClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
    temperature: f32,
    timeout_secs: u64,
}

impl HttpReasoningClient {
    /// Build from configuration. Fails fast when no API key is available —
    /// dry-run mode constructs [`DryRunReasoning`] instead and never gets
    /// here.
    pub fn new(config: &ReasoningConfig) -> Result<Self, ServiceError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or(ServiceError::MissingCredentials)?;

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ServiceError::HttpClient(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
            temperature: config.temperature,
            timeout_secs: config.timeout_secs,
        })
    }

    fn endpoint(&self) -> String {
        if self.base_url.ends_with("/chat/completions") {
            self.base_url.clone()
        } else if self.base_url.ends_with("/v1") {
            format!("{}/chat/completions", self.base_url)
        } else {
            format!("{}/v1/chat/completions", self.base_url)
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: String,
}

#[async_trait]
impl ReasoningService for HttpReasoningClient {
    async fn call(&self, request: ReasoningRequest) -> Result<String, ServiceError> {
        let body = ChatRequest {
            model: &self.model,
            messages: &request.messages,
            temperature: self.temperature,
            max_tokens: request.max_output_tokens,
            response_format: request
                .structured
                .then_some(ResponseFormat { kind: "json_object" }),
        };

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    ServiceError::Connection(self.base_url.clone())
                } else if e.is_timeout() {
                    ServiceError::Timeout(self.timeout_secs)
                } else {
                    ServiceError::HttpClient(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::ResponseParsing(e.to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| ServiceError::ResponseParsing("Response carried no choices".into()))
    }
}

// ---------------------------------------------------------------------------
// Dry-run client
// ---------------------------------------------------------------------------

/// Answers every call with [`DRY_RUN_RESPONSE`] immediately, without
/// touching the network or needing credentials.
pub struct DryRunReasoning;

#[async_trait]
impl ReasoningService for DryRunReasoning {
    async fn call(&self, _request: ReasoningRequest) -> Result<String, ServiceError> {
        tracing::debug!("Dry run: skipping reasoning call");
        Ok(DRY_RUN_RESPONSE.to_string())
    }
}

// ---------------------------------------------------------------------------
// Mock client
// ---------------------------------------------------------------------------

/// Scriptable reasoning service for tests: replies with a queue of canned
/// outcomes (then repeats the last one) and counts calls.
pub struct MockReasoning {
    script: std::sync::Mutex<Vec<Result<String, String>>>,
    calls: std::sync::atomic::AtomicUsize,
}

impl MockReasoning {
    /// Always respond with `response`.
    pub fn new(response: &str) -> Self {
        Self::scripted(vec![Ok(response.to_string())])
    }

    /// Always fail with `message` as an HTTP-layer error.
    pub fn failing(message: &str) -> Self {
        Self::scripted(vec![Err(message.to_string())])
    }

    /// Respond with the given outcomes in order; the final entry repeats
    /// for any further calls.
    pub fn scripted(outcomes: Vec<Result<String, String>>) -> Self {
        Self {
            script: std::sync::Mutex::new(outcomes),
            calls: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[async_trait]
impl ReasoningService for MockReasoning {
    async fn call(&self, _request: ReasoningRequest) -> Result<String, ServiceError> {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let mut script = self.script.lock().unwrap();
        let outcome = if script.len() > 1 {
            script.remove(0)
        } else {
            script[0].clone()
        };
        outcome.map_err(ServiceError::HttpClient)
    }
}
