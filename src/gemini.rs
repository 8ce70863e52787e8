//! Gemini API client - the completion backend wrapper
//!
//! Wraps the generateContent and countTokens REST endpoints behind the
//! `Completion` trait. Uses a long-lived reqwest::Client for connection
//! pooling.
//!
//! Callers only ever see a clean string: blocked or empty backend output
//! decodes to a fixed fallback string here, never to an error. Transport
//! and decode failures are the only `Err` values this module produces.

use crate::error::ChatError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;
use tracing::{debug, warn};

/// Fixed identifier reported to callers for every response.
pub const BACKEND_NAME: &str = "gemini";

/// Returned when the backend blocks output on safety grounds.
pub const BLOCKED_REPLY: &str =
    "Sorry, I can't respond to that request due to safety policies. Please try rephrasing.";

/// Returned when the backend produces no usable text.
pub const EMPTY_REPLY: &str = "I'm sorry, I didn't understand that. Can you rephrase?";

/// Returned by synthesis paths when the completion call itself fails.
pub const FAILURE_REPLY: &str = "Sorry, something went wrong. Please contact the administrator.";

/// Returned when no API key is configured.
pub const NOT_CONFIGURED_REPLY: &str =
    "Gemini API is not configured. Set GEMINI_API_KEY and restart.";

//
// ================= Messages =================
//

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    System,
    User,
}

/// One role-tagged message of a completion request.
#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

//
// ================= Completion Seam =================
//

/// Text-completion capability used by the planner and synthesizer.
#[async_trait]
pub trait Completion: Send + Sync {
    /// Generate text for the given messages. Anticipated backend refusals
    /// (safety block, empty output, missing key) come back as fixed strings;
    /// `Err` means the transport or decode itself failed.
    async fn generate(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
        max_output_tokens: u32,
    ) -> crate::Result<String>;

    /// Best-effort token count for `text`; `None` when counting is
    /// unavailable, which callers must handle explicitly.
    async fn count_tokens(&self, text: &str) -> Option<u32>;
}

//
// ================= Client =================
//

const GEMINI_MODEL_BASE: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.5-flash";

/// Reusable Gemini client (connection-pooled)
pub struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(api_key: String) -> Self {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        Self {
            client,
            api_key,
            base_url: GEMINI_MODEL_BASE.to_string(),
        }
    }

    /// Build from `GEMINI_API_KEY`. A missing key is not fatal: calls will
    /// answer with the fixed not-configured notice instead.
    pub fn from_env() -> Self {
        let api_key = env::var("GEMINI_API_KEY").unwrap_or_default();
        if api_key.is_empty() {
            warn!("GEMINI_API_KEY not set; completion calls will report not-configured");
        }
        Self::new(api_key)
    }
}

#[async_trait]
impl Completion for GeminiClient {
    async fn generate(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
        max_output_tokens: u32,
    ) -> crate::Result<String> {
        if self.api_key.is_empty() {
            return Ok(NOT_CONFIGURED_REPLY.to_string());
        }

        let url = format!("{}:generateContent?key={}", self.base_url, self.api_key);
        let request = GenerateRequest::from_messages(messages, temperature, max_output_tokens);

        debug!(
            message_count = messages.len(),
            temperature, max_output_tokens, "Calling Gemini generateContent"
        );

        let response = self.client.post(&url).json(&request).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ChatError::LlmError(format!(
                "Gemini API returned {}: {}",
                status, body
            )));
        }

        let decoded: GenerateResponse = response
            .json()
            .await
            .map_err(|e| ChatError::LlmError(format!("Gemini parse error: {}", e)))?;

        match decoded.reply() {
            Reply::Text(text) => Ok(text),
            Reply::Blocked => {
                warn!("Gemini output blocked by safety filtering");
                Ok(BLOCKED_REPLY.to_string())
            }
            Reply::Empty => {
                debug!("Gemini response carried no text; returning default message");
                Ok(EMPTY_REPLY.to_string())
            }
        }
    }

    async fn count_tokens(&self, text: &str) -> Option<u32> {
        if self.api_key.is_empty() {
            return None;
        }

        let url = format!("{}:countTokens?key={}", self.base_url, self.api_key);
        let request = CountRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: text.to_string(),
                }],
            }],
        };

        let response = match self.client.post(&url).json(&request).send().await {
            Ok(r) if r.status().is_success() => r,
            Ok(r) => {
                debug!(status = %r.status(), "Gemini countTokens returned an error status");
                return None;
            }
            Err(e) => {
                debug!("Gemini countTokens request failed: {}", e);
                return None;
            }
        };

        match response.json::<CountResponse>().await {
            Ok(counted) => Some(counted.total_tokens),
            Err(e) => {
                debug!("Gemini countTokens parse failed: {}", e);
                None
            }
        }
    }
}

//
// ================= Wire Types =================
//

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
}

impl GenerateRequest {
    fn from_messages(messages: &[ChatMessage], temperature: f32, max_output_tokens: u32) -> Self {
        let join = |role: Role| -> String {
            messages
                .iter()
                .filter(|m| m.role == role)
                .map(|m| m.content.as_str())
                .collect::<Vec<_>>()
                .join("\n\n")
        };

        let system = join(Role::System);
        let user = join(Role::User);

        Self {
            contents: vec![Content {
                parts: vec![Part { text: user }],
            }],
            generation_config: GenerationConfig {
                temperature,
                max_output_tokens,
            },
            system_instruction: if system.is_empty() {
                None
            } else {
                Some(Content {
                    parts: vec![Part { text: system }],
                })
            },
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Serialize)]
struct CountRequest {
    contents: Vec<Content>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CountResponse {
    total_tokens: u32,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

/// Decoded shape of a backend reply.
enum Reply {
    Text(String),
    Blocked,
    Empty,
}

impl GenerateResponse {
    fn reply(&self) -> Reply {
        if let Some(feedback) = &self.prompt_feedback {
            if feedback.block_reason.is_some() {
                return Reply::Blocked;
            }
        }

        let Some(candidate) = self.candidates.first() else {
            return Reply::Empty;
        };

        if candidate.finish_reason.as_deref() == Some("SAFETY") {
            return Reply::Blocked;
        }

        let text = candidate
            .content
            .as_ref()
            .map(|c| {
                c.parts
                    .iter()
                    .map(|p| p.text.as_str())
                    .collect::<String>()
            })
            .unwrap_or_default();

        let text = text.trim();
        if text.is_empty() {
            Reply::Empty
        } else {
            Reply::Text(text.to_string())
        }
    }
}
