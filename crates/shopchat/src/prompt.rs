//! Prompt assembly: input validation, history windowing, turn ordering.
//!
//! The assembler turns a sampled context slice, the prior user turns, and
//! the new user message into the ordered turn list sent to the completion
//! service. Ordering is fixed: system instructions first, sampled context
//! as further system turns, then up to
//! `history_token_budget / tokens_per_message` most recent prior user
//! turns, then the new user turn last.
//!
//! The history bound is a coarse per-message estimate, not a tokenizer —
//! the point is a hard cap on prompt growth, not accurate accounting.

use crate::Turn;
use crate::knowledge::ContextFact;
use tracing::debug;

/// System instructions prepended to every prompt.
pub const SYSTEM_INSTRUCTIONS: &str = "You are an AI bot called ShopBot that specializes in \
     storefront customer care. Answer the question based on the context \
     added. If the question can't be answered based on the context, try to \
     provide a relevant answer using your general knowledge about the \
     store. Do not ask for order details or details about things you have \
     no access to. Keep your answers as relevant as possible. If you still \
     can't provide a relevant answer, say \"I don't have an answer for \
     that at the moment.\"";

/// Maximum words accepted in a single submission.
pub const MAX_INPUT_WORDS: usize = 500;

/// Token budget allotted to trailing history.
pub const HISTORY_TOKEN_BUDGET: usize = 1000;

/// Assumed token cost per included history message.
pub const TOKENS_PER_MESSAGE: usize = 100;

// ── Validation ─────────────────────────────────────────────────────

/// Why a submission was rejected before any request was dispatched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputRejection {
    /// Empty or whitespace-only input.
    Blank,
    /// Input over the word limit.
    TooLong { words: usize },
}

impl std::fmt::Display for InputRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InputRejection::Blank => write!(f, "input is empty"),
            InputRejection::TooLong { words } => {
                write!(f, "input is {words} words (limit {MAX_INPUT_WORDS})")
            }
        }
    }
}

// ── Assembler ──────────────────────────────────────────────────────

/// Builds the bounded, role-tagged turn list for one submission.
#[derive(Debug, Clone)]
pub struct PromptAssembler {
    system_instructions: String,
    history_window: usize,
}

impl PromptAssembler {
    /// Create an assembler with the default instructions and history budget.
    pub fn new() -> Self {
        Self::with_budget(HISTORY_TOKEN_BUDGET, TOKENS_PER_MESSAGE)
    }

    /// Create an assembler with an explicit history budget. The window is
    /// `budget / tokens_per_message`, floored; a zero per-message cost
    /// yields a zero window rather than dividing by zero.
    pub fn with_budget(history_token_budget: usize, tokens_per_message: usize) -> Self {
        let history_window = if tokens_per_message == 0 {
            0
        } else {
            history_token_budget / tokens_per_message
        };
        Self {
            system_instructions: SYSTEM_INSTRUCTIONS.to_string(),
            history_window,
        }
    }

    /// Override the system instructions.
    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.system_instructions = instructions.into();
        self
    }

    /// Number of prior user turns the prompt may carry.
    pub fn history_window(&self) -> usize {
        self.history_window
    }

    /// Check a submission before dispatch. Blank and over-length input is
    /// rejected; the caller skips the request entirely.
    pub fn validate(&self, input: &str) -> Result<(), InputRejection> {
        if input.trim().is_empty() {
            return Err(InputRejection::Blank);
        }
        let words = input.split_whitespace().count();
        if words > MAX_INPUT_WORDS {
            return Err(InputRejection::TooLong { words });
        }
        Ok(())
    }

    /// Assemble the turn list for a validated submission.
    ///
    /// `prior_user_turns` is the full user-side history, oldest first; only
    /// the most recent `history_window` entries are included.
    pub fn assemble(
        &self,
        context: &[&ContextFact],
        prior_user_turns: &[&str],
        input: &str,
    ) -> Vec<Turn> {
        let mut turns = Vec::with_capacity(2 + context.len() + self.history_window);

        turns.push(Turn::system(&self.system_instructions));

        for fact in context {
            turns.push(Turn::system(fact.as_system_text()));
        }

        let skip = prior_user_turns.len().saturating_sub(self.history_window);
        for prior in &prior_user_turns[skip..] {
            turns.push(Turn::user(*prior));
        }

        turns.push(Turn::user(input));

        debug!(
            "assembled prompt: {} context facts, {} of {} prior turns, {} turns total",
            context.len(),
            prior_user_turns.len() - skip,
            prior_user_turns.len(),
            turns.len(),
        );

        turns
    }
}

impl Default for PromptAssembler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Role;
    use crate::knowledge::KnowledgeBase;

    fn context_of(base: &KnowledgeBase, n: usize) -> Vec<&ContextFact> {
        base.facts().iter().take(n).collect()
    }

    #[test]
    fn blank_input_rejected() {
        let assembler = PromptAssembler::new();
        assert_eq!(assembler.validate(""), Err(InputRejection::Blank));
        assert_eq!(assembler.validate("   \t\n"), Err(InputRejection::Blank));
    }

    #[test]
    fn overlength_input_rejected() {
        let assembler = PromptAssembler::new();
        let long = vec!["word"; 501].join(" ");
        assert_eq!(
            assembler.validate(&long),
            Err(InputRejection::TooLong { words: 501 })
        );
    }

    #[test]
    fn boundary_length_accepted() {
        let assembler = PromptAssembler::new();
        let exactly_500 = vec!["word"; 500].join(" ");
        assert!(assembler.validate(&exactly_500).is_ok());
        assert!(assembler.validate("Where is my order?").is_ok());
    }

    #[test]
    fn new_user_turn_is_exactly_one_and_last() {
        let base = KnowledgeBase::builtin();
        let assembler = PromptAssembler::new();
        let turns = assembler.assemble(&context_of(&base, 5), &[], "Where is my order?");

        let user_turns: Vec<&Turn> = turns.iter().filter(|t| t.role == Role::User).collect();
        assert_eq!(user_turns.len(), 1);
        let last = turns.last().unwrap();
        assert_eq!(last.role, Role::User);
        assert_eq!(last.content, "Where is my order?");
    }

    #[test]
    fn system_instructions_come_first() {
        let base = KnowledgeBase::builtin();
        let assembler = PromptAssembler::new();
        let turns = assembler.assemble(&context_of(&base, 3), &[], "hi");

        assert_eq!(turns[0].role, Role::System);
        assert_eq!(turns[0].content, SYSTEM_INSTRUCTIONS);
        // Sampled context follows as further system turns.
        for turn in &turns[1..4] {
            assert_eq!(turn.role, Role::System);
        }
    }

    #[test]
    fn prior_turns_never_exceed_window() {
        let base = KnowledgeBase::builtin();
        let assembler = PromptAssembler::with_budget(300, 100); // window = 3
        assert_eq!(assembler.history_window(), 3);

        let prior: Vec<String> = (0..50).map(|i| format!("earlier question {i}")).collect();
        let prior_refs: Vec<&str> = prior.iter().map(|s| s.as_str()).collect();
        let turns = assembler.assemble(&context_of(&base, 2), &prior_refs, "latest");

        let user_contents: Vec<&str> = turns
            .iter()
            .filter(|t| t.role == Role::User)
            .map(|t| t.content.as_str())
            .collect();
        // 3 prior + 1 new, most recent priors kept, oldest-first order.
        assert_eq!(
            user_contents,
            vec![
                "earlier question 47",
                "earlier question 48",
                "earlier question 49",
                "latest"
            ]
        );
    }

    #[test]
    fn window_is_floor_of_budget_division() {
        assert_eq!(PromptAssembler::with_budget(1000, 100).history_window(), 10);
        assert_eq!(PromptAssembler::with_budget(999, 100).history_window(), 9);
        assert_eq!(PromptAssembler::with_budget(99, 100).history_window(), 0);
        assert_eq!(PromptAssembler::with_budget(1000, 0).history_window(), 0);
    }

    #[test]
    fn zero_window_drops_all_history() {
        let base = KnowledgeBase::builtin();
        let assembler = PromptAssembler::with_budget(0, 100);
        let turns = assembler.assemble(&context_of(&base, 1), &["old question"], "new question");

        let user_contents: Vec<&str> = turns
            .iter()
            .filter(|t| t.role == Role::User)
            .map(|t| t.content.as_str())
            .collect();
        assert_eq!(user_contents, vec!["new question"]);
    }

    #[test]
    fn custom_instructions_replace_default() {
        let assembler = PromptAssembler::new().with_instructions("terse bot");
        let turns = assembler.assemble(&[], &[], "hi");
        assert_eq!(turns[0].content, "terse bot");
    }
}
