//! Static configuration for a [`ChatClient`](crate::ChatClient).

use crate::persona::Persona;

/// Default model used when neither the call nor the config names one.
pub const DEFAULT_MODEL: &str = "deepseek-chat";

/// Default API base URL (OpenAI-compatible).
pub const DEFAULT_BASE_URL: &str = "https://api.deepseek.com/v1";

/// Default path of the streaming chat-completions endpoint.
pub const DEFAULT_ENDPOINT_PATH: &str = "/chat/completions";

/// Environment variable conventionally holding the API key.
pub const API_KEY_ENV: &str = "DEEPSEEK_API_KEY";

/// Environment variable overriding [`ClientConfig::base_url`].
pub const BASE_URL_ENV: &str = "DEEPSEEK_BASE_URL";

/// Environment variable overriding [`ClientConfig::default_model`].
pub const MODEL_ENV: &str = "DEEPSEEK_MODEL";

/// Endpoint, model and persona defaults for a client.
///
/// Per-call overrides come from [`CompletionOptions`](crate::CompletionOptions).
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// API base URL, without a trailing slash.
    pub base_url: String,
    /// Path appended to `base_url` for the streaming endpoint.
    pub endpoint_path: String,
    /// Model used when the call does not select one.
    pub default_model: String,
    /// System preamble prepended to every request. `None` forwards the history
    /// untouched, for backends that inject their own preamble.
    pub persona: Option<Persona>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.into(),
            endpoint_path: DEFAULT_ENDPOINT_PATH.into(),
            default_model: DEFAULT_MODEL.into(),
            persona: Some(Persona::history_tutor()),
        }
    }
}

impl ClientConfig {
    /// Defaults overlaid with [`BASE_URL_ENV`] and [`MODEL_ENV`] when set and
    /// non-empty.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overlaid with values from `lookup`.
    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(url) = non_empty(BASE_URL_ENV) {
            config.base_url = url;
        }
        if let Some(model) = non_empty(MODEL_ENV) {
            config.default_model = model;
        }
        config
    }

    /// Full URL of the streaming endpoint.
    #[must_use]
    pub fn endpoint_url(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        if self.endpoint_path.starts_with('/') {
            format!("{base}{}", self.endpoint_path)
        } else {
            format!("{base}/{}", self.endpoint_path)
        }
    }
}
