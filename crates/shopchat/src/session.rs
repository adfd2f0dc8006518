//! Chat session state: transcript and pending flag with owned transitions.
//!
//! The session holds the two pieces of mutable state the pipeline has — an
//! append-only transcript and the idle/awaiting-reply flag — and exposes
//! them only through explicit transitions: [`ChatSession::submit_start`],
//! [`ChatSession::reply_received`], [`ChatSession::reply_failed`]. A
//! completion failure clears the pending flag and appends a visible error
//! message, so the session can never hang in an indistinguishable
//! still-awaiting state.
//!
//! Transcript entries are immutable once appended and live for the session
//! only; there is no persistence.

use crate::reply::Reply;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Visible transcript entry appended when a completion call fails.
pub const FAILURE_MESSAGE: &str = "Sorry, something went wrong answering that. Please try again.";

// ── Transcript types ───────────────────────────────────────────────

/// Who authored a transcript entry.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Bot,
}

/// One immutable transcript entry.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ChatMessage {
    pub sender: Sender,
    pub text: String,
}

// ── Session state ──────────────────────────────────────────────────

/// The pipeline's two UI states.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    AwaitingReply,
}

/// A submission attempted while a prior request is still pending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionBusy;

impl std::fmt::Display for SessionBusy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "a request is already in flight")
    }
}

/// One chat session: transcript plus pending flag.
#[derive(Debug, Default)]
pub struct ChatSession {
    transcript: Vec<ChatMessage>,
    pending: bool,
}

impl ChatSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// The ordered, append-only transcript.
    pub fn transcript(&self) -> &[ChatMessage] {
        &self.transcript
    }

    pub fn state(&self) -> SessionState {
        if self.pending {
            SessionState::AwaitingReply
        } else {
            SessionState::Idle
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    /// Texts of all user turns, oldest first. This is the history pool the
    /// assembler windows into the prompt.
    pub fn user_texts(&self) -> Vec<String> {
        self.transcript
            .iter()
            .filter(|m| m.sender == Sender::User)
            .map(|m| m.text.clone())
            .collect()
    }

    // ── Transitions ────────────────────────────────────────────────

    /// Enter Awaiting-Reply: append the user's message and set the pending
    /// flag. Only one request may be in flight per session, so a submit
    /// while pending is refused and the transcript is untouched.
    pub fn submit_start(&mut self, text: impl Into<String>) -> Result<(), SessionBusy> {
        if self.pending {
            return Err(SessionBusy);
        }
        self.transcript.push(ChatMessage {
            sender: Sender::User,
            text: text.into(),
        });
        self.pending = true;
        Ok(())
    }

    /// Exit Awaiting-Reply with a formatted reply: append the bot's message
    /// and clear the pending flag.
    pub fn reply_received(&mut self, reply: &Reply) {
        self.transcript.push(ChatMessage {
            sender: Sender::Bot,
            text: reply.text.clone(),
        });
        self.pending = false;
    }

    /// Exit Awaiting-Reply after a completion failure: clear the pending
    /// flag and append a visible error message so the user is never left
    /// staring at a permanent typing indicator.
    pub fn reply_failed(&mut self, error: &str) {
        warn!("completion failed: {error}");
        self.transcript.push(ChatMessage {
            sender: Sender::Bot,
            text: FAILURE_MESSAGE.to_string(),
        });
        self.pending = false;
    }
}
