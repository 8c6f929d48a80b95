//! The streaming chat-completion client and its builder.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::{Stream, StreamExt};
use historia_secret::{CredentialProvider, EnvCredential};
use tokio_util::sync::CancellationToken;

use crate::config::{API_KEY_ENV, ClientConfig};
use crate::error::{ChatError, map_http_status};
use crate::mapping::to_api_request;
use crate::persona::Persona;
use crate::streaming::decode_stream;
use crate::transport::{
    HttpRequest, HttpTransport, MAX_ERROR_BODY_BYTES, Transport, read_to_string,
};
use crate::types::{ChatMessage, CompletionOptions};

/// Client for an OpenAI-compatible streaming chat-completions endpoint.
///
/// Each call is independent: it resolves the credential, sends one request
/// and owns its own decode buffer and body reader. Nothing is retried.
///
/// # Example
///
/// ```no_run
/// use futures::StreamExt;
/// use historia_chat::{ChatClient, ChatMessage, CompletionOptions};
/// use historia_secret::StaticCredential;
///
/// # async fn run() -> Result<(), historia_chat::ChatError> {
/// let client = ChatClient::new(StaticCredential::new("sk-..."));
/// let history = vec![ChatMessage::user("Why did the Western Han fall?")];
/// let mut stream = client.send(&history, &CompletionOptions::default()).await?;
/// while let Some(fragment) = stream.next().await {
///     print!("{}", fragment?);
/// }
/// # Ok(())
/// # }
/// ```
pub struct ChatClient<T = HttpTransport> {
    pub(crate) config: ClientConfig,
    pub(crate) credentials: Arc<dyn CredentialProvider>,
    pub(crate) transport: T,
}

impl ChatClient<HttpTransport> {
    /// Client with the default configuration and an HTTP transport.
    pub fn new(credentials: impl CredentialProvider + 'static) -> Self {
        Self::from_config(ClientConfig::default(), credentials)
    }

    /// Client with an explicit configuration and an HTTP transport.
    pub fn from_config(config: ClientConfig, credentials: impl CredentialProvider + 'static) -> Self {
        Self {
            config,
            credentials: Arc::new(credentials),
            transport: HttpTransport::new(),
        }
    }

    /// Client configured from the environment: [`ClientConfig::from_env`] plus
    /// the API key read from `DEEPSEEK_API_KEY` on each call.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_config(ClientConfig::from_env(), EnvCredential::new(API_KEY_ENV))
    }
}

impl<T> ChatClient<T> {
    /// Replace the transport.
    pub fn with_transport<U: Transport>(self, transport: U) -> ChatClient<U> {
        ChatClient {
            config: self.config,
            credentials: self.credentials,
            transport,
        }
    }

    /// Override the default model.
    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.default_model = model.into();
        self
    }

    /// Override the API base URL.
    ///
    /// Useful for testing with a local mock server or pointing at the app's relay.
    #[must_use]
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into();
        self
    }

    /// Override the endpoint path appended to the base URL.
    #[must_use]
    pub fn endpoint_path(mut self, path: impl Into<String>) -> Self {
        self.config.endpoint_path = path.into();
        self
    }

    /// Use `persona` as the system preamble.
    #[must_use]
    pub fn persona(mut self, persona: Persona) -> Self {
        self.config.persona = Some(persona);
        self
    }

    /// Send the history without a system preamble.
    #[must_use]
    pub fn without_persona(mut self) -> Self {
        self.config.persona = None;
        self
    }

    /// The active configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }
}

impl<T: Transport> ChatClient<T> {
    /// Start a streaming completion for `history`.
    ///
    /// Configuration and HTTP status errors are returned here, before any
    /// fragment. The returned stream yields fragments in wire order and ends
    /// after `[DONE]`, a `stop` finish reason, or end of body; an upstream
    /// error embedded in the stream is yielded as the final item.
    pub async fn send(
        &self,
        history: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<CompletionStream, ChatError> {
        self.send_with_cancel(history, options, CancellationToken::new())
            .await
    }

    /// Like [`send`](Self::send), but `cancel` tears the body down and ends
    /// the stream early.
    pub async fn send_with_cancel(
        &self,
        history: &[ChatMessage],
        options: &CompletionOptions,
        cancel: CancellationToken,
    ) -> Result<CompletionStream, ChatError> {
        let credential = self.credentials.credential().await?;

        let url = self.config.endpoint_url();
        let body = to_api_request(
            history,
            options,
            &self.config.default_model,
            self.config.persona.as_ref(),
        );

        tracing::debug!(
            url = %url,
            model = %body["model"],
            messages = history.len(),
            persona = self.config.persona.as_ref().map(|p| p.name.as_str()),
            "sending streaming completion request"
        );

        let response = self
            .transport
            .open(HttpRequest {
                url,
                credential,
                body,
            })
            .await?;

        if !(200..300).contains(&response.status) {
            let text = match response.body {
                Some(body) => match read_to_string(body, MAX_ERROR_BODY_BYTES).await {
                    Ok(text) => Some(text),
                    Err(e) => {
                        tracing::warn!(status = response.status, error = %e, "failed to read error response body");
                        None
                    }
                },
                None => None,
            };
            let err = map_http_status(response.status, text.as_deref());
            tracing::warn!(status = response.status, error = %err, "completion request rejected");
            return Err(err);
        }

        let body = response.body.ok_or(ChatError::MissingBody)?;

        Ok(CompletionStream::new(decode_stream(body, cancel)))
    }

    /// Run a completion to the end and return the concatenated text.
    pub async fn complete(
        &self,
        history: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<String, ChatError> {
        self.send(history, options).await?.collect_text().await
    }
}

/// Lazy, single-pass sequence of text fragments from one completion.
///
/// Dropping it releases the underlying connection.
pub struct CompletionStream {
    inner: Pin<Box<dyn Stream<Item = Result<String, ChatError>> + Send>>,
}

impl CompletionStream {
    pub(crate) fn new(
        stream: impl Stream<Item = Result<String, ChatError>> + Send + 'static,
    ) -> Self {
        Self {
            inner: Box::pin(stream),
        }
    }

    /// Drain the stream, concatenating fragments. Stops at the first error.
    pub async fn collect_text(mut self) -> Result<String, ChatError> {
        let mut text = String::new();
        while let Some(fragment) = self.inner.next().await {
            text.push_str(&fragment?);
        }
        Ok(text)
    }
}

impl Stream for CompletionStream {
    type Item = Result<String, ChatError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

impl std::fmt::Debug for CompletionStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionStream").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::future::Future;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use bytes::Bytes;
    use historia_secret::StaticCredential;

    use crate::error::StatusClass;
    use crate::transport::{ByteStream, TransportResponse};

    /// In-memory transport replaying a fixed response.
    #[derive(Clone)]
    struct ScriptedTransport {
        status: u16,
        chunks: Option<Vec<&'static str>>,
        fail_after_chunks: bool,
        opened: Arc<AtomicUsize>,
        released: Arc<AtomicUsize>,
        last_body: Arc<Mutex<Option<serde_json::Value>>>,
    }

    impl ScriptedTransport {
        fn new(status: u16, chunks: Option<Vec<&'static str>>) -> Self {
            Self {
                status,
                chunks,
                fail_after_chunks: false,
                opened: Arc::new(AtomicUsize::new(0)),
                released: Arc::new(AtomicUsize::new(0)),
                last_body: Arc::new(Mutex::new(None)),
            }
        }

        /// Reset the connection once the scripted chunks are exhausted.
        fn failing_after_chunks(mut self) -> Self {
            self.fail_after_chunks = true;
            self
        }
    }

    struct ReleaseGuard {
        inner: futures::stream::Iter<std::vec::IntoIter<Result<Bytes, ChatError>>>,
        released: Arc<AtomicUsize>,
    }

    impl Stream for ReleaseGuard {
        type Item = Result<Bytes, ChatError>;

        fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
            Pin::new(&mut self.inner).poll_next(cx)
        }
    }

    impl Drop for ReleaseGuard {
        fn drop(&mut self) {
            self.released.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl Transport for ScriptedTransport {
        fn open(
            &self,
            request: HttpRequest,
        ) -> impl Future<Output = Result<TransportResponse, ChatError>> + Send {
            let this = self.clone();
            async move {
                this.opened.fetch_add(1, Ordering::SeqCst);
                *this.last_body.lock().unwrap() = Some(request.body);
                let fail = this.fail_after_chunks;
                let body = this.chunks.map(|chunks| {
                    let mut items: Vec<Result<Bytes, ChatError>> = chunks
                        .into_iter()
                        .map(|c| Ok(Bytes::from_static(c.as_bytes())))
                        .collect();
                    if fail {
                        items.push(Err(ChatError::Transport("connection reset by peer".into())));
                    }
                    let guard = ReleaseGuard {
                        inner: futures::stream::iter(items),
                        released: this.released.clone(),
                    };
                    Box::pin(guard) as ByteStream
                });
                Ok(TransportResponse {
                    status: this.status,
                    body,
                })
            }
        }
    }

    fn client(transport: ScriptedTransport) -> ChatClient<ScriptedTransport> {
        ChatClient::new(StaticCredential::new("sk-test")).with_transport(transport)
    }

    fn history() -> Vec<ChatMessage> {
        vec![ChatMessage::user("Tell me about the Silk Road.")]
    }

    #[test]
    fn builder_overrides_config() {
        let c = ChatClient::new(StaticCredential::new("k"))
            .model("deepseek-reasoner")
            .base_url("http://localhost:9999")
            .endpoint_path("/chat/stream")
            .without_persona();
        assert_eq!(c.config().default_model, "deepseek-reasoner");
        assert_eq!(c.config().endpoint_url(), "http://localhost:9999/chat/stream");
        assert!(c.config().persona.is_none());
    }

    #[test]
    fn builder_sets_persona() {
        let figure = Persona::historical_figure("Zheng He", "You are the admiral Zheng He.");
        let c = ChatClient::new(StaticCredential::new("k")).persona(figure.clone());
        assert_eq!(c.config().persona, Some(figure));
    }

    #[tokio::test]
    async fn send_streams_fragments_and_releases_once() {
        let transport = ScriptedTransport::new(
            200,
            Some(vec![
                "data: {\"choices\":[{\"delta\":{\"content\":\"Hel",
                "lo\"}}]}\n\ndata: [DONE]\n",
            ]),
        );
        let released = transport.released.clone();
        let c = client(transport);

        let stream = c.send(&history(), &CompletionOptions::default()).await.unwrap();
        let items: Vec<_> = stream.collect().await;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].as_ref().unwrap(), "Hello");
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn send_prepends_persona_to_request() {
        let transport = ScriptedTransport::new(200, Some(vec!["data: [DONE]\n"]));
        let last_body = transport.last_body.clone();
        let c = client(transport);

        let text = c.complete(&history(), &CompletionOptions::default()).await.unwrap();
        assert!(text.is_empty());

        let body = last_body.lock().unwrap().take().unwrap();
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "Tell me about the Silk Road.");
        assert_eq!(body["stream"], true);
    }

    #[tokio::test]
    async fn rate_limit_with_unparseable_body_uses_canned_message() {
        let transport = ScriptedTransport::new(429, Some(vec!["<html>too many</html>"]));
        let released = transport.released.clone();
        let c = client(transport);

        let err = c
            .send(&history(), &CompletionOptions::default())
            .await
            .unwrap_err();
        match err {
            ChatError::ApiStatus {
                status,
                class,
                ref message,
            } => {
                assert_eq!(status, 429);
                assert_eq!(class, StatusClass::RateLimited);
                assert_eq!(message, &StatusClass::RateLimited.canned_message(429));
            }
            other => panic!("expected ApiStatus, got {other:?}"),
        }
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn error_body_read_failure_keeps_status_classification() {
        let transport =
            ScriptedTransport::new(429, Some(vec!["<html>"])).failing_after_chunks();
        let released = transport.released.clone();
        let c = client(transport);

        let err = c
            .send(&history(), &CompletionOptions::default())
            .await
            .unwrap_err();
        match err {
            ChatError::ApiStatus {
                status,
                class,
                ref message,
            } => {
                assert_eq!(status, 429);
                assert_eq!(class, StatusClass::RateLimited);
                assert_eq!(message, "too many requests, please try again later");
            }
            other => panic!("expected ApiStatus, got {other:?}"),
        }
        assert!(err.is_retryable());
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn error_status_without_body_uses_canned_message() {
        let c = client(ScriptedTransport::new(503, None));
        let err = c
            .send(&history(), &CompletionOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(503));
        assert_eq!(err.to_string(), "upstream server error, please try again later");
    }

    #[tokio::test]
    async fn missing_body_fails_immediately() {
        let c = client(ScriptedTransport::new(200, None));
        let err = c
            .send(&history(), &CompletionOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::MissingBody));
    }

    #[tokio::test]
    async fn missing_credential_fails_before_network() {
        let transport = ScriptedTransport::new(200, Some(vec!["data: [DONE]\n"]));
        let opened = transport.opened.clone();
        let c = ChatClient::new(StaticCredential::new("")).with_transport(transport);

        let err = c
            .send(&history(), &CompletionOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::Configuration(_)));
        assert_eq!(opened.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn upstream_error_is_raised_from_complete() {
        let transport = ScriptedTransport::new(
            200,
            Some(vec![
                "data: {\"choices\":[{\"delta\":{\"content\":\"partial\"}}]}\n",
                "data: {\"error\":{\"message\":\"quota exceeded\"}}\n",
            ]),
        );
        let released = transport.released.clone();
        let c = client(transport);

        let err = c
            .complete(&history(), &CompletionOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::Upstream(ref m) if m == "quota exceeded"));
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn abandoning_the_stream_releases_the_body() {
        let transport = ScriptedTransport::new(
            200,
            Some(vec![
                "data: {\"choices\":[{\"delta\":{\"content\":\"first\"}}]}\n",
                "data: {\"choices\":[{\"delta\":{\"content\":\"second\"}}]}\n",
            ]),
        );
        let released = transport.released.clone();
        let c = client(transport);

        let mut stream = c.send(&history(), &CompletionOptions::default()).await.unwrap();
        assert_eq!(stream.next().await.unwrap().unwrap(), "first");
        drop(stream);
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn concurrent_calls_do_not_share_state() {
        let a = client(ScriptedTransport::new(
            200,
            Some(vec![
                "data: {\"choices\":[{\"delta\":{\"content\":\"Tang\"}}]}\n",
                "data: [DONE]\n",
            ]),
        ));
        let b = client(ScriptedTransport::new(
            200,
            Some(vec![
                "data: {\"choices\":[{\"delta\":{\"content\":\"So",
                "ng\"}}]}\n",
            ]),
        ));
        let opts = CompletionOptions::default();
        let h = history();
        let (ra, rb) = tokio::join!(a.complete(&h, &opts), b.complete(&h, &opts));
        assert_eq!(ra.unwrap(), "Tang");
        assert_eq!(rb.unwrap(), "Song");
    }
}
