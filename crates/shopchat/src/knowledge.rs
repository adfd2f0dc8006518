//! Static store knowledge and uniform context sampling.
//!
//! The [`KnowledgeBase`] is an immutable configuration resource loaded once
//! at process start: a list of [`ContextFact`]s that get injected as system
//! turns to ground the model's replies. Per submission the assembler draws
//! a fixed-size random subset — this bounds prompt size and adds variety
//! across requests.
//!
//! Sampling takes any [`rand_core::RngCore`], so production code uses
//! [`OsRng`](rand_core::OsRng) while tests inject a seeded generator.

use rand_core::RngCore;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Number of facts sampled into each prompt.
pub const DEFAULT_SAMPLE_SIZE: usize = 5;

// ── Facts ──────────────────────────────────────────────────────────

/// A static piece of domain knowledge: either a bare line, or a recorded
/// prompt/response exchange.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(untagged)]
pub enum ContextFact {
    Line(String),
    Exchange { prompt: String, response: String },
}

impl ContextFact {
    /// Render the fact as system-turn content.
    pub fn as_system_text(&self) -> String {
        match self {
            ContextFact::Line(line) => line.clone(),
            ContextFact::Exchange { prompt, response } => {
                format!("Customer: {prompt}\nSupport: {response}")
            }
        }
    }
}

// ── Knowledge base ─────────────────────────────────────────────────

/// Immutable, process-wide fact list. Never mutated after construction.
#[derive(Clone, Debug)]
pub struct KnowledgeBase {
    facts: Vec<ContextFact>,
}

impl KnowledgeBase {
    /// Build from an explicit fact list.
    pub fn new(facts: Vec<ContextFact>) -> Self {
        Self { facts }
    }

    /// The built-in storefront support facts.
    pub fn builtin() -> Self {
        Self::new(builtin_facts())
    }

    /// Load facts from a JSON file: an array whose elements are either
    /// strings or `{"prompt": ..., "response": ...}` objects.
    pub fn from_json_file(path: &str) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("failed to read facts file '{path}': {e}"))?;
        let facts: Vec<ContextFact> = serde_json::from_str(&content)
            .map_err(|e| format!("failed to parse facts file '{path}': {e}"))?;
        if facts.is_empty() {
            return Err(format!("facts file '{path}' contains no facts"));
        }
        debug!("loaded {} facts from {path}", facts.len());
        Ok(Self::new(facts))
    }

    pub fn facts(&self) -> &[ContextFact] {
        &self.facts
    }

    pub fn len(&self) -> usize {
        self.facts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }

    /// Draw `n` facts uniformly at random, without replacement, in random
    /// order. `n` is clamped to the list length, so every element has equal
    /// selection probability and the result never contains duplicates.
    pub fn sample<'a>(&'a self, n: usize, rng: &mut dyn RngCore) -> Vec<&'a ContextFact> {
        let n = n.min(self.facts.len());
        let mut indices: Vec<usize> = (0..self.facts.len()).collect();

        // Partial Fisher–Yates: after i swaps, indices[..i] is a uniform
        // random prefix of a full permutation.
        for i in 0..n {
            let j = i + uniform_index(rng, indices.len() - i);
            indices.swap(i, j);
        }

        indices.iter().take(n).map(|&i| &self.facts[i]).collect()
    }
}

/// Uniform integer in `[0, bound)` via rejection sampling (no modulo bias).
fn uniform_index(rng: &mut dyn RngCore, bound: usize) -> usize {
    debug_assert!(bound > 0);
    let bound = bound as u64;
    let zone = u64::MAX - (u64::MAX % bound);
    loop {
        let v = rng.next_u64();
        if v < zone {
            return (v % bound) as usize;
        }
    }
}

// ── Built-in facts ─────────────────────────────────────────────────

fn builtin_facts() -> Vec<ContextFact> {
    let lines = [
        "Support phone line: 030 700 0576.",
        "Adding a location or an extra item after an order is placed is not \
         possible. Cancel the order and place a new one, or call support.",
        "Delayed delivery: apologies for the delay. The rider is picking up \
         the order and is on the way, and will call when at your location.",
        "Order processed successfully. The rider will contact you for delivery.",
        "Payment received. The rider is picking up the order from the kitchen.",
        "Order modification is not possible after checkout. Add preferences \
         in the order notes for future orders.",
        "Delivery is strictly to the chosen location only.",
        "Order ready for pick up. The rider will call upon arrival.",
        "Order ready for delivery. The rider will call upon arrival.",
        "Unable to process requests for an already delivered order. Add notes \
         for future orders.",
        "Assistance with placing an order is available on the app and on the web.",
        "Order delivered. Contact support if there are any concerns.",
    ];
    let mut facts: Vec<ContextFact> = lines
        .iter()
        .map(|l| ContextFact::Line((*l).to_string()))
        .collect();
    facts.extend([
        ContextFact::Exchange {
            prompt: "Still waiting for my delivery.".into(),
            response: "Apologies for the delay. Delivery has started and the \
                       rider will contact you shortly."
                .into(),
        },
        ContextFact::Exchange {
            prompt: "Please cancel my order.".into(),
            response: "Order cancellation requested. You will receive a \
                       confirmation shortly."
                .into(),
        },
        ContextFact::Exchange {
            prompt: "Will my food arrive today?".into(),
            response: "Yes. The rider is on the way to pick up your order and \
                       will call when at your location."
                .into(),
        },
        ContextFact::Exchange {
            prompt: "I received the wrong order.".into(),
            response: "Apologies for the wrong order. We are investigating \
                       and will revert."
                .into(),
        },
    ]);
    facts
}
