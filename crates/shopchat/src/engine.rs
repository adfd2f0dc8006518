//! The per-submission pipeline: validate, sample, assemble, complete,
//! interpret, record.
//!
//! [`ChatEngine`] wires the stateless pieces together around a
//! [`ChatSession`]: it validates the input, draws the context sample,
//! assembles the bounded turn list, awaits the completion backend, and
//! applies exactly one session transition for the outcome. Rejected input
//! dispatches no request and appends nothing.

use crate::knowledge::{DEFAULT_SAMPLE_SIZE, KnowledgeBase};
use crate::prompt::{HISTORY_TOKEN_BUDGET, InputRejection, PromptAssembler, TOKENS_PER_MESSAGE};
use crate::reply::{Reply, interpret};
use crate::session::ChatSession;
use crate::{ChatRequest, CompletionBackend, DEFAULT_MAX_TOKENS, DEFAULT_MODEL};
use rand_core::{OsRng, RngCore};
use tracing::debug;

// ── Config ─────────────────────────────────────────────────────────

/// Configuration for a [`ChatEngine`].
///
/// Defaults match the production widget: `gpt-3.5-turbo`, 2048 response
/// tokens, 5 sampled facts, a 1000-token history budget at an assumed 100
/// tokens per message.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Model identifier.
    pub model: String,
    /// Maximum tokens per model response.
    pub max_tokens: u32,
    /// Sampling temperature. `None` uses the service default.
    pub temperature: Option<f32>,
    /// Number of context facts sampled into each prompt.
    pub sample_size: usize,
    /// Token budget allotted to trailing history.
    pub history_token_budget: usize,
    /// Assumed token cost per included history message.
    pub tokens_per_message: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: None,
            sample_size: DEFAULT_SAMPLE_SIZE,
            history_token_budget: HISTORY_TOKEN_BUDGET,
            tokens_per_message: TOKENS_PER_MESSAGE,
        }
    }
}

impl EngineConfig {
    /// Set the model identifier.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the maximum tokens per model response.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Set the sampling temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set the number of context facts sampled per prompt.
    pub fn with_sample_size(mut self, sample_size: usize) -> Self {
        self.sample_size = sample_size;
        self
    }
}

// ── Errors ─────────────────────────────────────────────────────────

/// Why a submission produced no bot reply.
#[derive(Debug)]
pub enum AskError {
    /// Input failed validation. No request was dispatched and the
    /// transcript is unchanged.
    Rejected(InputRejection),
    /// A prior request is still in flight.
    Busy,
    /// The completion call failed. The session has already recorded a
    /// visible error message and returned to idle.
    Completion(String),
}

impl std::fmt::Display for AskError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AskError::Rejected(r) => write!(f, "submission rejected: {r}"),
            AskError::Busy => write!(f, "a request is already in flight"),
            AskError::Completion(e) => write!(f, "completion failed: {e}"),
        }
    }
}

// ── Engine ─────────────────────────────────────────────────────────

/// Runs the full submission pipeline against a completion backend.
pub struct ChatEngine<'a> {
    backend: &'a dyn CompletionBackend,
    knowledge: KnowledgeBase,
    assembler: PromptAssembler,
    config: EngineConfig,
    rng: Box<dyn RngCore + Send>,
}

impl<'a> ChatEngine<'a> {
    /// Create an engine over a backend and knowledge base. Sampling uses
    /// the operating system's entropy source.
    pub fn new(
        backend: &'a dyn CompletionBackend,
        knowledge: KnowledgeBase,
        config: EngineConfig,
    ) -> Self {
        let assembler =
            PromptAssembler::with_budget(config.history_token_budget, config.tokens_per_message);
        Self {
            backend,
            knowledge,
            assembler,
            config,
            rng: Box::new(OsRng),
        }
    }

    /// Replace the random source (seeded generators for deterministic tests).
    pub fn with_rng(mut self, rng: impl RngCore + Send + 'static) -> Self {
        self.rng = Box::new(rng);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Submit one user message through the pipeline.
    ///
    /// On success the session gains a user turn (the original text) and a
    /// bot turn (the formatted reply), and the returned [`Reply`] carries
    /// the extracted cart item if one was present. On rejection nothing is
    /// appended and no request is sent. On completion failure the session
    /// has already appended a visible error message and is idle again.
    pub async fn ask(&mut self, session: &mut ChatSession, input: &str) -> Result<Reply, AskError> {
        self.assembler.validate(input).map_err(AskError::Rejected)?;

        if session.is_pending() {
            return Err(AskError::Busy);
        }

        // History pool is the user turns recorded before this submission.
        let prior = session.user_texts();
        let prior_refs: Vec<&str> = prior.iter().map(|s| s.as_str()).collect();

        session
            .submit_start(input)
            .map_err(|_| AskError::Busy)?;

        let context = self
            .knowledge
            .sample(self.config.sample_size, self.rng.as_mut());
        let messages = self.assembler.assemble(&context, &prior_refs, input);

        debug!(
            "dispatching submission: model={}, {} turns",
            self.config.model,
            messages.len()
        );

        let request = ChatRequest {
            model: self.config.model.clone(),
            messages,
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        };

        match self.backend.complete(request).await {
            Ok(raw) => {
                let reply = interpret(&raw);
                session.reply_received(&reply);
                Ok(reply)
            }
            Err(e) => {
                session.reply_failed(&e);
                Err(AskError::Completion(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{FAILURE_MESSAGE, Sender, SessionState};
    use crate::{CompletionFuture, Role};
    use std::sync::Mutex;

    /// Stub backend: records requests, returns a canned result.
    struct StubBackend {
        result: Result<String, String>,
        requests: Mutex<Vec<ChatRequest>>,
    }

    impl StubBackend {
        fn replying(text: &str) -> Self {
            Self {
                result: Ok(text.to_string()),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn failing(error: &str) -> Self {
            Self {
                result: Err(error.to_string()),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn request_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    impl CompletionBackend for StubBackend {
        fn complete(&self, request: ChatRequest) -> CompletionFuture<'_> {
            self.requests.lock().unwrap().push(request);
            let result = self.result.clone();
            Box::pin(async move { result })
        }
    }

    fn engine<'a>(backend: &'a StubBackend) -> ChatEngine<'a> {
        ChatEngine::new(backend, KnowledgeBase::builtin(), EngineConfig::default())
    }

    #[tokio::test]
    async fn successful_submission_end_to_end() {
        let backend = StubBackend::replying("Order delivered. Contact if any concerns.");
        let mut engine = engine(&backend);
        let mut session = ChatSession::new();

        let reply = engine.ask(&mut session, "Where is my order?").await.unwrap();
        assert_eq!(reply.text, "Order delivered. Contact if any concerns.");
        assert_eq!(reply.cart_add, None);

        let transcript = session.transcript();
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript[0].sender, Sender::User);
        assert_eq!(transcript[0].text, "Where is my order?");
        assert_eq!(transcript[1].sender, Sender::Bot);
        assert_eq!(transcript[1].text, "Order delivered. Contact if any concerns.");
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn dispatched_request_has_expected_shape() {
        let backend = StubBackend::replying("ok");
        let mut engine = engine(&backend);
        let mut session = ChatSession::new();

        engine.ask(&mut session, "hi there").await.unwrap();

        let requests = backend.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        let req = &requests[0];
        assert_eq!(req.model, DEFAULT_MODEL);
        assert_eq!(req.max_tokens, DEFAULT_MAX_TOKENS);
        // Instructions + 5 sampled facts, then the new user turn last.
        let system_count = req.messages.iter().filter(|t| t.role == Role::System).count();
        assert_eq!(system_count, 1 + DEFAULT_SAMPLE_SIZE);
        assert_eq!(req.messages.last().unwrap().content, "hi there");
    }

    #[tokio::test]
    async fn blank_input_dispatches_nothing() {
        let backend = StubBackend::replying("should never be seen");
        let mut engine = engine(&backend);
        let mut session = ChatSession::new();

        let err = engine.ask(&mut session, "   ").await.unwrap_err();
        assert!(matches!(err, AskError::Rejected(InputRejection::Blank)));
        assert_eq!(backend.request_count(), 0);
        assert!(session.transcript().is_empty());
    }

    #[tokio::test]
    async fn overlength_input_dispatches_nothing() {
        let backend = StubBackend::replying("should never be seen");
        let mut engine = engine(&backend);
        let mut session = ChatSession::new();

        let long = vec!["word"; 501].join(" ");
        let err = engine.ask(&mut session, &long).await.unwrap_err();
        assert!(matches!(
            err,
            AskError::Rejected(InputRejection::TooLong { words: 501 })
        ));
        assert_eq!(backend.request_count(), 0);
        assert!(session.transcript().is_empty());
    }

    #[tokio::test]
    async fn failure_appends_visible_error_and_returns_to_idle() {
        let backend = StubBackend::failing("HTTP 429: quota exceeded");
        let mut engine = engine(&backend);
        let mut session = ChatSession::new();

        let err = engine.ask(&mut session, "hello").await.unwrap_err();
        assert!(matches!(err, AskError::Completion(_)));

        let transcript = session.transcript();
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript[1].sender, Sender::Bot);
        assert_eq!(transcript[1].text, FAILURE_MESSAGE);
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn cart_add_reply_exposes_item() {
        let backend = StubBackend::replying("Bananas has been added to your cart.");
        let mut engine = engine(&backend);
        let mut session = ChatSession::new();

        let reply = engine.ask(&mut session, "add bananas").await.unwrap();
        assert_eq!(reply.cart_add.as_deref(), Some("Bananas"));
        // Display text still passes through to the transcript.
        assert_eq!(
            session.transcript()[1].text,
            "Bananas has been added to your cart."
        );
    }

    #[tokio::test]
    async fn prior_user_turns_flow_into_later_prompts() {
        let backend = StubBackend::replying("noted");
        let mut engine = engine(&backend);
        let mut session = ChatSession::new();

        engine.ask(&mut session, "first question").await.unwrap();
        engine.ask(&mut session, "second question").await.unwrap();

        let requests = backend.requests.lock().unwrap();
        let second = &requests[1];
        let user_contents: Vec<&str> = second
            .messages
            .iter()
            .filter(|t| t.role == Role::User)
            .map(|t| t.content.as_str())
            .collect();
        assert_eq!(user_contents, vec!["first question", "second question"]);
    }

    #[tokio::test]
    async fn reply_is_capitalized_in_transcript() {
        let backend = StubBackend::replying("your order is on the way.");
        let mut engine = engine(&backend);
        let mut session = ChatSession::new();

        let reply = engine.ask(&mut session, "status?").await.unwrap();
        assert_eq!(reply.text, "Your order is on the way.");
        assert_eq!(session.transcript()[1].text, "Your order is on the way.");
    }
}
