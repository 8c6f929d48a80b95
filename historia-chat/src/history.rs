//! Conversation windowing applied before a history is sent.

use crate::types::ChatMessage;

/// Number of recent messages the app forwards by default.
pub const DEFAULT_HISTORY_WINDOW: usize = 10;

/// Keep the last `limit` messages that have non-blank content, in order.
#[must_use]
pub fn recent_history(messages: &[ChatMessage], limit: usize) -> Vec<ChatMessage> {
    let kept: Vec<&ChatMessage> = messages
        .iter()
        .filter(|m| !m.content.trim().is_empty())
        .collect();
    let skip = kept.len().saturating_sub(limit);
    kept.into_iter().skip(skip).cloned().collect()
}
