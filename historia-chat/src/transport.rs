//! The byte-stream seam between the client and the network.
//!
//! A [`Transport`] opens one request and hands back the status code plus an
//! incrementally readable body. Releasing the reader is dropping the
//! [`ByteStream`]; for [`HttpTransport`] that closes the connection and tears
//! down the in-flight request.

use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use historia_secret::SecretValue;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderValue};
use zeroize::Zeroizing;

use crate::error::{ChatError, map_reqwest_error};

/// An incrementally readable response body.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, ChatError>> + Send>>;

/// One outbound request.
#[derive(Debug)]
pub struct HttpRequest {
    /// Absolute endpoint URL.
    pub url: String,
    /// Bearer credential for the `Authorization` header.
    pub credential: SecretValue,
    /// JSON request body.
    pub body: serde_json::Value,
}

/// What the transport got back.
pub struct TransportResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body, if the transport could provide one.
    pub body: Option<ByteStream>,
}

impl std::fmt::Debug for TransportResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportResponse")
            .field("status", &self.status)
            .field("body", &self.body.as_ref().map(|_| "<stream>"))
            .finish()
    }
}

/// Opens requests and exposes their bodies as byte streams.
pub trait Transport: Send + Sync {
    /// Send `request` and return once the status line and headers are in.
    fn open(
        &self,
        request: HttpRequest,
    ) -> impl Future<Output = Result<TransportResponse, ChatError>> + Send;
}

/// [`Transport`] backed by a shared [`reqwest::Client`].
#[derive(Debug, Clone, Default)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Transport with a default reqwest client.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Transport reusing an existing client (proxies, timeouts, pools).
    #[must_use]
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

fn bearer_header(credential: &SecretValue) -> Result<HeaderValue, ChatError> {
    credential.with_bytes(|token| {
        let mut raw = Zeroizing::new(Vec::with_capacity(token.len() + 7));
        raw.extend_from_slice(b"Bearer ");
        raw.extend_from_slice(token);
        let mut value = HeaderValue::from_bytes(&raw).map_err(|_| {
            ChatError::Configuration("credential contains characters not allowed in a header".into())
        })?;
        value.set_sensitive(true);
        Ok(value)
    })
}

impl Transport for HttpTransport {
    fn open(
        &self,
        request: HttpRequest,
    ) -> impl Future<Output = Result<TransportResponse, ChatError>> + Send {
        let http_client = self.client.clone();

        async move {
            let auth = bearer_header(&request.credential)?;

            let response = http_client
                .post(&request.url)
                .header(AUTHORIZATION, auth)
                .header(CONTENT_TYPE, "application/json")
                .json(&request.body)
                .send()
                .await
                .map_err(map_reqwest_error)?;

            let status = response.status().as_u16();
            let body: ByteStream =
                Box::pin(response.bytes_stream().map(|chunk| chunk.map_err(map_reqwest_error)));

            Ok(TransportResponse {
                status,
                body: Some(body),
            })
        }
    }
}

/// Most bytes of a non-success response body kept for error reporting.
pub(crate) const MAX_ERROR_BODY_BYTES: usize = 64 * 1024;

/// Read at most `limit` bytes of a body into text, decoding lossily. Used for
/// error responses only; the rest of the body is dropped unread.
pub(crate) async fn read_to_string(mut body: ByteStream, limit: usize) -> Result<String, ChatError> {
    let mut buf = Vec::new();
    while let Some(chunk) = body.next().await {
        let chunk = chunk?;
        let room = limit - buf.len();
        if chunk.len() >= room {
            buf.extend_from_slice(&chunk[..room]);
            break;
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(String::from_utf8_lossy(&buf).into_owned())
}
