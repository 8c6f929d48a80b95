//! Streaming chat-completion client for the HistoriaQuest learning app.
//!
//! Talks to an OpenAI-compatible `/chat/completions` endpoint (DeepSeek by
//! default) with `stream: true`, or to the app's own relay, and turns the
//! `data:`-framed response body into a lazy stream of text fragments.
//!
//! # Usage
//!
//! ```no_run
//! use historia_chat::{ChatClient, ChatMessage, CompletionOptions, Persona};
//!
//! # async fn run() -> Result<(), historia_chat::ChatError> {
//! let client = ChatClient::from_env()
//!     .persona(Persona::historical_figure("Su Shi", "You are Su Shi, Song dynasty poet."));
//! let history = vec![ChatMessage::user("What did you write at Red Cliff?")];
//! let reply = client.complete(&history, &CompletionOptions::default()).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! - Chunk-boundary-safe decoding, including characters split across chunks
//! - Tolerance of malformed or non-`data:` lines
//! - Termination on `[DONE]`, a `stop` finish reason, or end of body
//! - Error classification from HTTP statuses and embedded error objects
//! - Credentials injected through [`historia_secret::CredentialProvider`]
//! - Cooperative cancellation via [`tokio_util::sync::CancellationToken`]

pub mod client;
pub mod config;
pub mod error;
pub mod history;
pub mod mapping;
pub mod persona;
pub mod streaming;
pub mod transport;
pub mod types;

pub use client::{ChatClient, CompletionStream};
pub use config::ClientConfig;
pub use error::{ChatError, StatusClass};
pub use history::{DEFAULT_HISTORY_WINDOW, recent_history};
pub use persona::Persona;
pub use streaming::StreamDecoder;
pub use transport::{ByteStream, HttpRequest, HttpTransport, Transport, TransportResponse};
pub use types::{ChatMessage, CompletionOptions, DecodedEvent, Role};

// Re-exported so callers can cancel without a direct tokio-util dependency.
pub use tokio_util::sync::CancellationToken;
