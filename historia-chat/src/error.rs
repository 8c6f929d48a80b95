//! Error taxonomy for the streaming client and HTTP status classification.

use historia_secret::CredentialError;

use crate::types::{WireError, WireErrorBody};

/// Errors surfaced to callers of [`ChatClient`](crate::ChatClient).
///
/// Malformed individual stream lines are not represented here: they are
/// logged and skipped by the decoder.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    /// Required configuration (usually the credential) is missing or unusable.
    /// Raised before any network activity.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Connection-level failure before or during the response.
    #[error("network connection failed, please check your connection")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The backend answered with a non-success HTTP status.
    #[error("{message}")]
    ApiStatus {
        /// HTTP status code.
        status: u16,
        /// Coarse classification of `status`.
        class: StatusClass,
        /// Human-readable message, from the response body when available.
        message: String,
    },

    /// The transport reported success but handed over no response body.
    #[error("response has no readable body")]
    MissingBody,

    /// A well-formed stream event carried an explicit error object.
    #[error("upstream error: {0}")]
    Upstream(String),
}

impl ChatError {
    /// Whether a caller-side retry could plausibly succeed.
    ///
    /// The client itself never retries.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::ApiStatus { class, .. } => {
                matches!(class, StatusClass::RateLimited | StatusClass::ServerError)
            }
            Self::Configuration(_) | Self::MissingBody | Self::Upstream(_) => false,
        }
    }

    /// The HTTP status, for [`ChatError::ApiStatus`].
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::ApiStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<CredentialError> for ChatError {
    fn from(err: CredentialError) -> Self {
        ChatError::Configuration(err.to_string())
    }
}

/// Coarse classes of non-success HTTP statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    /// 401 / 403: the credential was rejected.
    Unauthorized,
    /// 429: too many requests.
    RateLimited,
    /// 5xx: the backend failed.
    ServerError,
    /// Anything else.
    Other,
}

impl StatusClass {
    /// Classify an HTTP status code.
    #[must_use]
    pub fn from_status(status: u16) -> Self {
        match status {
            401 | 403 => StatusClass::Unauthorized,
            429 => StatusClass::RateLimited,
            500..=599 => StatusClass::ServerError,
            _ => StatusClass::Other,
        }
    }

    /// Message used when the response body carries nothing readable.
    #[must_use]
    pub fn canned_message(self, status: u16) -> String {
        match self {
            StatusClass::Unauthorized => {
                "invalid API key, please check the configured credential".into()
            }
            StatusClass::RateLimited => "too many requests, please try again later".into(),
            StatusClass::ServerError => {
                "upstream server error, please try again later".into()
            }
            StatusClass::Other => format!("API request failed with HTTP {status}"),
        }
    }
}

/// Map a non-success HTTP status and its (possibly absent) body to a [`ChatError`].
///
/// The body wins when it is JSON carrying `error.message`, a plain-string
/// `error`, or a `detail` string. Otherwise the canned message for the status
/// class is used.
pub(crate) fn map_http_status(status: u16, body: Option<&str>) -> ChatError {
    let class = StatusClass::from_status(status);
    let message = body
        .and_then(message_from_body)
        .unwrap_or_else(|| class.canned_message(status));
    ChatError::ApiStatus {
        status,
        class,
        message,
    }
}

fn message_from_body(body: &str) -> Option<String> {
    let parsed: WireErrorBody = serde_json::from_str(body).ok()?;
    if let Some(message) = parsed.error.as_ref().and_then(WireError::message) {
        return Some(message);
    }
    match parsed.detail {
        Some(serde_json::Value::String(detail)) if !detail.trim().is_empty() => {
            Some(detail.trim().to_string())
        }
        _ => None,
    }
}

/// Map a [`reqwest::Error`] to a [`ChatError`].
pub(crate) fn map_reqwest_error(err: reqwest::Error) -> ChatError {
    ChatError::Transport(Box::new(err))
}
