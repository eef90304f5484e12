//! Follow-up conversation context.
//!
//! The functions here are pure; the state (which question/answer pair a
//! follow-up uses) is owned by the follow-up ticket in [`crate::followup`].

/// One completed question/answer exchange. Ephemeral: lives only as long as
/// the follow-up affordance that carries it, never persisted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConversationTurn {
    pub question: String,
    pub answer: String,
}

const TRUNCATION_MARKER: &str = "[earlier context truncated]\n";

/// Embed free-form context ahead of a question, explicitly labeled so the
/// model treats it as background rather than instructions.
pub fn build_context_prompt(context: &str, new_question: &str) -> String {
    format!("Previous Context Provided by User:\n{context}\n\nUser Question: {new_question}")
}

/// Build the augmented prompt for a follow-up question.
///
/// The prior turn is embedded as explicitly labeled context, the new
/// question last. Each call embeds exactly one prior turn; chains carry
/// forward only the most recent exchange.
pub fn build_followup_prompt(
    original_question: &str,
    original_answer: &str,
    new_question: &str,
) -> String {
    build_context_prompt(
        &format!("User asked: {original_question}\nAI Answered: {original_answer}"),
        new_question,
    )
}

/// Cap a context string at `max_chars` characters, keeping the tail.
///
/// Answers embedded verbatim would otherwise grow a long reply chain without
/// bound; the tail is kept because it sits closest to the new question.
pub fn cap_context(text: &str, max_chars: usize) -> String {
    let total = text.chars().count();
    if total <= max_chars {
        return text.to_string();
    }

    let keep = max_chars.saturating_sub(TRUNCATION_MARKER.chars().count());
    let tail: String = text.chars().skip(total - keep).collect();
    let capped = format!("{TRUNCATION_MARKER}{tail}");

    // A cap smaller than the marker itself still holds.
    if keep == 0 {
        return capped.chars().take(max_chars).collect();
    }
    capped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn followup_prompt_labels_both_sides() {
        let p = build_followup_prompt("What is 2+2?", "4", "Why?");
        assert!(p.starts_with("Previous Context Provided by User:\n"));
        assert!(p.contains("User asked: What is 2+2?"));
        assert!(p.contains("AI Answered: 4"));
        assert!(p.ends_with("User Question: Why?"));
    }

    #[test]
    fn short_context_passes_through() {
        assert_eq!(cap_context("hello", 100), "hello");
        assert_eq!(cap_context("hello", 5), "hello");
    }

    #[test]
    fn context_prompt_labels_context_block() {
        let p = build_context_prompt("the sky is green here", "What color is the sky?");
        assert!(p.starts_with("Previous Context Provided by User:\nthe sky is green here"));
        assert!(p.ends_with("User Question: What color is the sky?"));
    }

    #[test]
    fn tiny_cap_never_exceeds_itself() {
        for max_chars in [0usize, 1, 5, 27, 28] {
            let capped = cap_context(&"x".repeat(100), max_chars);
            assert!(
                capped.chars().count() <= max_chars,
                "cap {max_chars} produced {} chars",
                capped.chars().count()
            );
        }
    }

    #[test]
    fn long_context_keeps_tail_within_cap() {
        let text = format!("{}{}", "a".repeat(500), "b".repeat(100));
        let capped = cap_context(&text, 150);

        assert!(capped.chars().count() <= 150);
        assert!(capped.starts_with(TRUNCATION_MARKER));
        assert!(capped.ends_with(&"b".repeat(100)));
    }
}
