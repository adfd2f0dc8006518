//! Storefront support-chat core.
//!
//! `shopchat` turns raw user input plus a sampled slice of static store
//! knowledge into a bounded chat-completion prompt, and turns the raw model
//! reply into display text plus (possibly) a structured cart-add command.
//! The pipeline is deliberately linear:
//!
//! 1. [`KnowledgeBase::sample`](knowledge::KnowledgeBase::sample) picks a
//!    fixed-size random subset of the static fact list.
//! 2. [`PromptAssembler`](prompt::PromptAssembler) validates the input and
//!    builds the role-tagged turn list — system instructions first, sampled
//!    context as further system turns, a token-budget-bounded window of
//!    prior user turns, the new user turn last.
//! 3. [`CompletionClient`] sends the turns and awaits one text reply.
//! 4. [`interpret`](reply::interpret) scans the reply for a cart-add phrase
//!    and formats it for display (first letter capitalized, heading flag).
//! 5. [`ChatSession`](session::ChatSession) owns the transcript and the
//!    idle/awaiting-reply state, mutated only through its transitions.
//!
//! [`ChatEngine`](engine::ChatEngine) runs the whole pipeline per
//! submission. See [`engine`] for the end-to-end entry point.
//!
//! # Where to find things
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`knowledge`] | [`ContextFact`](knowledge::ContextFact), [`KnowledgeBase`](knowledge::KnowledgeBase), uniform sampling |
//! | [`prompt`] | Input validation, history window, turn assembly |
//! | [`reply`] | Cart-add extraction, display formatting |
//! | [`session`] | Transcript, pending state, explicit transitions |
//! | [`engine`] | [`ChatEngine`](engine::ChatEngine), [`EngineConfig`](engine::EngineConfig) |
//!
//! # Design principles
//!
//! 1. **The session owns its state.** The transcript and pending flag are
//!    mutated only through `submit_start` / `reply_received` /
//!    `reply_failed`. A completion failure clears pending state and appends
//!    a visible error message — it never leaves the session hanging.
//!
//! 2. **Randomness is injected.** Sampling takes any `rand_core::RngCore`,
//!    so tests run deterministically and production uses `OsRng`.
//!
//! 3. **The network is a seam.** [`CompletionBackend`] is the only async
//!    boundary; everything before and after it is a pure function over
//!    plain data.

pub mod engine;
pub mod knowledge;
pub mod prompt;
pub mod reply;
pub mod session;

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

// ── Constants ──────────────────────────────────────────────────────

pub const OPENAI_URL: &str = "https://api.openai.com/v1/chat/completions";

/// Default model for completion calls.
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";

/// Default maximum tokens per model response.
pub const DEFAULT_MAX_TOKENS: u32 = 2048;

// ── Turn types ─────────────────────────────────────────────────────

/// Role of a turn in the conversation.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// One role-tagged message unit sent to the completion service.
///
/// Turns are ephemeral: constructed fresh per submission and discarded once
/// the request completes. The durable record is the session transcript.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
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

// ── Request / response types ───────────────────────────────────────

/// Chat completion request body (OpenAI chat-completions format).
/// Zero-valued generation parameters are omitted from serialization.
#[derive(Serialize, Debug, Default)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Turn>,
    #[serde(skip_serializing_if = "is_zero_u32")]
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

fn is_zero_u32(v: &u32) -> bool {
    *v == 0
}

/// Raw API response (internal deserialization target).
#[derive(Deserialize, Debug)]
struct RawChatResponse {
    choices: Option<Vec<RawChoice>>,
    error: Option<ApiErrorResponse>,
    #[serde(default)]
    usage: Option<UsageInfo>,
}

#[derive(Deserialize, Debug)]
struct RawChoice {
    message: RawResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct RawResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ApiErrorResponse {
    message: String,
}

/// Token usage statistics.
#[derive(Deserialize, Debug, Clone)]
pub struct UsageInfo {
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub total_tokens: Option<u32>,
}

// ── Backend seam ───────────────────────────────────────────────────

/// Boxed future returned by [`CompletionBackend::complete`].
pub type CompletionFuture<'a> = Pin<Box<dyn Future<Output = Result<String, String>> + Send + 'a>>;

/// The single async boundary of the pipeline: given a role-tagged turn
/// list, a model id, and generation parameters, produce one text reply or
/// fail. Implemented by [`CompletionClient`] for the real API and by stubs
/// in tests.
pub trait CompletionBackend: Send + Sync {
    fn complete(&self, request: ChatRequest) -> CompletionFuture<'_>;
}

// ── Client ─────────────────────────────────────────────────────────

/// Async HTTP client for the OpenAI chat completions API.
pub struct CompletionClient {
    client: reqwest::Client,
    api_key: String,
    url: String,
}

impl CompletionClient {
    /// Create a new client with the given API key and the default endpoint.
    pub fn new(api_key: impl Into<String>) -> Result<Self, String> {
        Self::with_url(api_key, OPENAI_URL)
    }

    /// Create a new client against a custom endpoint URL (proxies,
    /// OpenAI-compatible servers, test fixtures).
    pub fn with_url(api_key: impl Into<String>, url: impl Into<String>) -> Result<Self, String> {
        let client = reqwest::Client::builder()
            .user_agent("shopchat/0.2")
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| format!("failed to build HTTP client: {e}"))?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            url: url.into(),
        })
    }

    /// Send a chat completion request and return the first choice's text.
    pub async fn chat(&self, body: &ChatRequest) -> Result<String, String> {
        debug!(
            "completion request: model={}, messages={}, max_tokens={}",
            body.model,
            body.messages.len(),
            body.max_tokens,
        );
        trace!(
            "request payload size: {} bytes",
            serde_json::to_string(body).map_or(0, |s| s.len())
        );

        let start = Instant::now();

        let resp = self
            .client
            .post(&self.url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(body)
            .send()
            .await
            .map_err(|e| format!("request failed: {e}"))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| format!("failed to read response: {e}"))?;

        debug!(
            "completion response: HTTP {} in {:.1}s ({} bytes)",
            status,
            start.elapsed().as_secs_f64(),
            text.len()
        );

        if !status.is_success() {
            return Err(format!("completion API HTTP {status}: {text}"));
        }

        let parsed: RawChatResponse =
            serde_json::from_str(&text).map_err(|e| format!("failed to parse response: {e}"))?;

        if let Some(err) = parsed.error {
            return Err(format!("completion API error: {}", err.message));
        }

        if let Some(ref usage) = parsed.usage {
            debug!(
                "token usage: prompt={}, completion={}, total={}",
                usage.prompt_tokens.unwrap_or(0),
                usage.completion_tokens.unwrap_or(0),
                usage.total_tokens.unwrap_or(0),
            );
        }

        let choice = parsed
            .choices
            .and_then(|c| c.into_iter().next())
            .ok_or_else(|| "completion API returned no choices".to_string())?;

        if let Some(ref reason) = choice.finish_reason {
            debug!("finish reason: {reason}");
        }

        choice
            .message
            .content
            .ok_or_else(|| "completion API returned empty content".to_string())
    }
}

impl CompletionBackend for CompletionClient {
    fn complete(&self, request: ChatRequest) -> CompletionFuture<'_> {
        Box::pin(async move { self.chat(&request).await })
    }
}

// ── Configuration ──────────────────────────────────────────────────

/// Read the API key from the `OPENAI_API_KEY` environment variable.
///
/// This is the only external configuration the core consumes; everything
/// else arrives through [`EngineConfig`](engine::EngineConfig).
pub fn api_key_from_env() -> Result<String, String> {
    std::env::var("OPENAI_API_KEY").map_err(|_| "OPENAI_API_KEY not set".to_string())
}
