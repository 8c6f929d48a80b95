//! Conversation and wire types for the chat-completions streaming API.

use serde::{Deserialize, Serialize};

/// Sampling temperature used when [`CompletionOptions::temperature`] is unset.
pub const DEFAULT_TEMPERATURE: f64 = 0.7;

/// Generation cap used when [`CompletionOptions::max_tokens`] is unset.
pub const DEFAULT_MAX_TOKENS: u32 = 2000;

/// Author of a [`ChatMessage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Instruction framing the assistant's behavior.
    System,
    /// The learner.
    User,
    /// The model.
    Assistant,
}

impl Role {
    /// Wire name of this role.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One turn of a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Who wrote the message.
    pub role: Role,
    /// Plain-text body.
    pub content: String,
}

impl ChatMessage {
    /// Build a message with an explicit role.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    /// A system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// A user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// An assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Per-call generation options.
///
/// Every field is optional; unset fields fall back to the client's default
/// model, [`DEFAULT_TEMPERATURE`] and [`DEFAULT_MAX_TOKENS`]. Values are passed
/// through to the backend as-is; out-of-range values are for the backend to
/// reject.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompletionOptions {
    /// Backend model identifier.
    pub model: Option<String>,
    /// Sampling randomness, nominally in `[0, 2]`.
    pub temperature: Option<f64>,
    /// Upper bound on generated tokens.
    pub max_tokens: Option<u32>,
}

impl CompletionOptions {
    /// Options with every field unset.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Select the backend model.
    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set the sampling temperature.
    #[must_use]
    pub fn temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Cap the generated length.
    #[must_use]
    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// One decoded unit of the response stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedEvent {
    /// A fragment of generated text.
    TextDelta(String),
    /// Explicit end of stream (`[DONE]` or a `stop` finish reason).
    Terminator,
    /// The backend embedded an error object in the stream.
    Error(String),
}

// ─── Wire shapes ─────────────────────────────────────────────────────────────

/// A single `data:` payload.
///
/// Covers both the provider shape (`choices[0].delta.content`) and the shape
/// the application's own relay emits (`{"content": ...}` / `{"error": ...}`).
#[derive(Debug, Default, Deserialize)]
pub(crate) struct WireEvent {
    #[serde(default)]
    pub choices: Option<Vec<WireChoice>>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub error: Option<WireError>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct WireChoice {
    #[serde(default)]
    pub delta: Option<WireDelta>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct WireDelta {
    #[serde(default)]
    pub content: Option<String>,
}

/// Error object embedded in a stream event or an error response body.
///
/// Any non-null `error` value deserializes to one of these, so a payload with
/// an oddly typed error never parses as an ordinary event.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum WireError {
    Detailed {
        #[serde(default)]
        message: Option<serde_json::Value>,
    },
    Plain(String),
    Opaque(serde_json::Value),
}

impl WireError {
    /// Trimmed, non-empty message text. Non-string messages are rendered as JSON.
    pub(crate) fn message(&self) -> Option<String> {
        let text = match self {
            WireError::Detailed {
                message: Some(serde_json::Value::String(text)),
            }
            | WireError::Plain(text) => text.trim().to_string(),
            WireError::Detailed {
                message: Some(serde_json::Value::Null) | None,
            }
            | WireError::Opaque(_) => return None,
            WireError::Detailed {
                message: Some(other),
            } => other.to_string(),
        };
        (!text.is_empty()).then_some(text)
    }
}

/// Body of a non-success HTTP response.
#[derive(Debug, Deserialize)]
pub(crate) struct WireErrorBody {
    #[serde(default)]
    pub error: Option<WireError>,
    #[serde(default)]
    pub detail: Option<serde_json::Value>,
}
