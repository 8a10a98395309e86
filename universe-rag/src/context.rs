//! Folding recent conversation turns into a standalone question.

use std::fmt::Write;

use crate::document::ConversationTurn;

/// Number of most recent turns folded into an enhanced question.
pub const HISTORY_WINDOW: usize = 3;

/// Rewrite `question` so it carries the last [`HISTORY_WINDOW`] turns.
///
/// With no history the question is returned unchanged. Older turns are
/// dropped. Turns are numbered from 1, oldest first.
///
/// ```
/// use universe_rag::{ConversationTurn, enhance};
///
/// assert_eq!(enhance("Who is the leader?", &[]), "Who is the leader?");
///
/// let history = [ConversationTurn::new("Who are (G)I-DLE?", "A K-pop group.")];
/// assert!(enhance("Who is the leader?", &history).contains("Turn 1:\nUser: Who are (G)I-DLE?"));
/// ```
pub fn enhance(question: &str, history: &[ConversationTurn]) -> String {
    if history.is_empty() {
        return question.to_string();
    }

    let recent = &history[history.len().saturating_sub(HISTORY_WINDOW)..];
    let mut turns = String::new();
    for (i, turn) in recent.iter().enumerate() {
        let _ = write!(
            turns,
            "Turn {}:\nUser: {}\nAssistant: {}\n\n",
            i + 1,
            turn.user_message,
            turn.assistant_message
        );
    }

    format!(
        "Based on the following conversation history, answer the current question:\n\n\
         {turns}\n\
         Current question: {question}\n\n\
         Use the context of the previous turns to answer the current question accurately."
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turns(n: usize) -> Vec<ConversationTurn> {
        (1..=n).map(|i| ConversationTurn::new(format!("q{i}"), format!("a{i}"))).collect()
    }

    #[test]
    fn empty_history_is_identity() {
        assert_eq!(enhance("  what?  ", &[]), "  what?  ");
    }

    #[test]
    fn two_turns_render_exactly() {
        let expected = "Based on the following conversation history, answer the current question:\n\n\
                        Turn 1:\nUser: q1\nAssistant: a1\n\n\
                        Turn 2:\nUser: q2\nAssistant: a2\n\n\n\
                        Current question: next\n\n\
                        Use the context of the previous turns to answer the current question accurately.";
        assert_eq!(enhance("next", &turns(2)), expected);
        assert_eq!(enhance("next", &turns(2)), enhance("next", &turns(2)));
    }

    #[test]
    fn only_the_last_three_turns_are_kept() {
        let out = enhance("next", &turns(5));
        assert!(!out.contains("q1") && !out.contains("q2"));
        assert!(out.contains("Turn 1:\nUser: q3"));
        assert!(out.contains("Turn 3:\nUser: q5"));
        assert!(!out.contains("Turn 4:"));
    }
}
