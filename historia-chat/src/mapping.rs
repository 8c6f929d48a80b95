//! Request assembly for the chat-completions streaming endpoint.
//!
//! Reference: <https://api-docs.deepseek.com/api/create-chat-completion>

use crate::persona::Persona;
use crate::types::{ChatMessage, CompletionOptions, DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE};

/// Build the JSON body for a streaming completion.
///
/// The persona's preamble, when present, goes first as a `system` message,
/// followed by `history` in caller order. Option values are not range-checked.
#[must_use]
pub fn to_api_request(
    history: &[ChatMessage],
    options: &CompletionOptions,
    default_model: &str,
    persona: Option<&Persona>,
) -> serde_json::Value {
    let model = options
        .model
        .as_deref()
        .filter(|m| !m.is_empty())
        .unwrap_or(default_model);

    let mut messages = Vec::with_capacity(history.len() + 1);
    if let Some(persona) = persona {
        messages.push(map_message(&ChatMessage::system(
            persona.system_prompt.as_str(),
        )));
    }
    messages.extend(history.iter().map(map_message));

    serde_json::json!({
        "model": model,
        "messages": messages,
        "temperature": options.temperature.unwrap_or(DEFAULT_TEMPERATURE),
        "max_tokens": options.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        "stream": true,
    })
}

fn map_message(msg: &ChatMessage) -> serde_json::Value {
    serde_json::json!({
        "role": msg.role.as_str(),
        "content": msg.content,
    })
}
