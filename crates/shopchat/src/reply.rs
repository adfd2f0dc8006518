//! Reply post-processing: cart-add extraction and display formatting.
//!
//! The interpreter runs one deterministic regex over the model's free-text
//! reply. It is not a command parser — there are no alternative phrasings
//! and no retries. On a match the item name is extracted and exposed to
//! the caller (and logged); the reply text passes through for display
//! either way. No cart state is mutated here.

use regex::Regex;
use std::sync::OnceLock;
use tracing::info;

/// Literal phrase the interpreter anchors on. Case- and wording-sensitive.
const CART_ADD_SUFFIX: &str = " has been added to your cart";

fn cart_add_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        // The pattern is a compile-time constant; construction cannot fail.
        Regex::new(r"(.+) has been added to your cart").expect("valid cart-add pattern")
    })
}

fn heading_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-zA-Z]+:$").expect("valid heading pattern"))
}

// ── Interpretation ─────────────────────────────────────────────────

/// A fully post-processed model reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Display text: the raw reply with its first letter capitalized.
    pub text: String,
    /// Whether the whole text is a single-word colon-terminated heading.
    pub heading: bool,
    /// Item name extracted from a cart-add phrase, if one was present.
    pub cart_add: Option<String>,
}

/// Interpret and format a raw model reply.
pub fn interpret(raw: &str) -> Reply {
    let cart_add = extract_cart_add(raw);
    if let Some(ref item) = cart_add {
        info!("cart-add command detected: item={item:?}");
    }
    let text = capitalize_first(raw);
    let heading = is_heading(&text);
    Reply {
        text,
        heading,
        cart_add,
    }
}

/// Scan a reply for `"<item> has been added to your cart"` and return the
/// item name. The reply text itself is untouched.
pub fn extract_cart_add(raw: &str) -> Option<String> {
    cart_add_regex()
        .captures(raw)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
}

// ── Formatting ─────────────────────────────────────────────────────

/// Upper-case the first character of the text. Pure and total: empty input
/// yields empty output, non-letter first characters pass through.
pub fn capitalize_first(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Whether the entire text is a single-word colon-terminated heading
/// (styled prominently by the display layer).
pub fn is_heading(text: &str) -> bool {
    heading_regex().is_match(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cart_add_extracts_item_name() {
        let reply = interpret("Bananas has been added to your cart.");
        assert_eq!(reply.cart_add.as_deref(), Some("Bananas"));
        assert_eq!(reply.text, "Bananas has been added to your cart.");
    }

    #[test]
    fn plain_reply_passes_through_without_extraction() {
        let reply = interpret("Sorry, I can't help with that.");
        assert_eq!(reply.cart_add, None);
        assert_eq!(reply.text, "Sorry, I can't help with that.");
        assert!(!reply.heading);
    }

    #[test]
    fn cart_add_is_wording_sensitive() {
        assert_eq!(extract_cart_add("Bananas were added to your cart."), None);
        assert_eq!(extract_cart_add("Bananas has been added to your basket."), None);
    }

    #[test]
    fn cart_add_is_case_sensitive() {
        assert_eq!(extract_cart_add("Bananas HAS BEEN ADDED TO YOUR CART"), None);
    }

    #[test]
    fn cart_add_multiword_item() {
        assert_eq!(
            extract_cart_add("Dry Skin Repair 400ml lotion has been added to your cart."),
            Some("Dry Skin Repair 400ml lotion".into())
        );
    }

    #[test]
    fn capitalize_first_letter() {
        assert_eq!(capitalize_first("hello world"), "Hello world");
        assert_eq!(capitalize_first("Hello"), "Hello");
        assert_eq!(capitalize_first(""), "");
        assert_eq!(capitalize_first("123 go"), "123 go");
    }

    #[test]
    fn heading_flag_for_colon_terminated_word() {
        let reply = interpret("Delivery:");
        assert_eq!(reply.text, "Delivery:");
        assert!(reply.heading);
    }

    #[test]
    fn heading_flag_false_for_sentences() {
        assert!(!is_heading("Delivery: today"));
        assert!(!is_heading("Delivery"));
        assert!(!is_heading("two words:"));
        assert!(!is_heading(""));
    }

    #[test]
    fn heading_checked_after_capitalization() {
        // "delivery:" capitalizes to "Delivery:" which is still a heading.
        let reply = interpret("delivery:");
        assert_eq!(reply.text, "Delivery:");
        assert!(reply.heading);
    }
}
