//! Streaming execution with reconnect-on-failure.
//!
//! The stream returned by [`Executor::stream`] owns its reconnect loop: chunks
//! are relayed unmodified as they arrive, and a dropped connection is retried
//! with exponential backoff until `max_stream_retries` consecutive attempts
//! have failed. Dropping the stream releases whatever connection is open.

use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use futures_core::Stream;
use futures_util::StreamExt;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{ApiError, classify_status};
use crate::http::{HttpBodyStream, HttpMethod, HttpRequest};

use super::{Executor, backoff, resource_path, serialize_body};

/// Header sent on reconnect so the server can continue where it stopped.
pub const RESUME_HEADER: &str = "X-Resume-From";
/// Response header whose value becomes the resume marker.
pub const JOB_ID_HEADER: &str = "X-Job-Id";
/// `Accept` sent on stream requests; completions arrive as plain chunks.
pub const STREAM_ACCEPT: &str = "*/*";
/// Upper bound on how much of a failed stream response is read for its message.
const MAX_ERROR_BODY_BYTES: usize = 64 * 1024;

/// Raw chunks as delivered by the server, possibly spanning several connections.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>, ApiError>> + Send>>;

/// Chunks decoded as UTF-8 text, with no further framing.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String, ApiError>> + Send>>;

impl Executor {
    /// Opens a lazily connecting stream of raw response chunks.
    ///
    /// Nothing is sent until the stream is first polled. Empty chunks are
    /// dropped; everything else is yielded exactly as received.
    ///
    /// # Errors
    ///
    /// Fails up front only if `body` cannot be serialized. Later failures are
    /// yielded as the final item of the stream:
    /// [`ApiError::StreamRetryBudgetExceeded`] when reconnecting kept failing,
    /// or the classified error for a status that is not worth retrying.
    pub fn stream<B>(
        &self,
        method: HttpMethod,
        url: impl Into<String>,
        body: Option<&B>,
    ) -> Result<ByteStream, ApiError>
    where
        B: Serialize + ?Sized,
    {
        let state = StreamState {
            executor: self.clone(),
            method,
            url: url.into(),
            payload: serialize_body(body)?,
            body: None,
            attempts: 0,
            resume_marker: None,
            resuming: false,
            finished: false,
        };
        Ok(Box::pin(futures_util::stream::unfold(
            state,
            StreamState::next_item,
        )))
    }

    /// Same as [`Executor::stream`], decoding each chunk as UTF-8.
    ///
    /// A multi-byte character split across chunks is held back until its
    /// remaining bytes arrive.
    pub fn stream_text<B>(
        &self,
        method: HttpMethod,
        url: impl Into<String>,
        body: Option<&B>,
    ) -> Result<TextStream, ApiError>
    where
        B: Serialize + ?Sized,
    {
        Ok(Box::pin(Utf8Chunks::new(self.stream(method, url, body)?)))
    }
}

/// Why a connection ended, and whether fresh credentials might help.
struct Interruption {
    error: ApiError,
    /// Credential generation the server rejected with 401, if it did.
    rejected_generation: Option<u64>,
}

enum ConnectFailure {
    Retryable(Interruption),
    Fatal(ApiError),
}

struct StreamState {
    executor: Executor,
    method: HttpMethod,
    url: String,
    payload: Option<Vec<u8>>,
    body: Option<HttpBodyStream>,
    /// Consecutive failed attempts; reset whenever a connection is established.
    attempts: u32,
    resume_marker: Option<String>,
    resuming: bool,
    finished: bool,
}

impl StreamState {
    async fn next_item(mut self) -> Option<(Result<Vec<u8>, ApiError>, Self)> {
        loop {
            if self.finished {
                return None;
            }

            if self.body.is_none() {
                match self.connect().await {
                    Ok(body) => {
                        self.body = Some(body);
                        self.attempts = 0;
                    }
                    Err(ConnectFailure::Fatal(err)) => return Some(self.fail(err)),
                    Err(ConnectFailure::Retryable(interruption)) => {
                        if let Err(err) = self.back_off(interruption).await {
                            return Some(self.fail(err));
                        }
                    }
                }
                continue;
            }

            let Some(body) = self.body.as_mut() else {
                continue;
            };
            match body.next().await {
                Some(Ok(chunk)) if chunk.is_empty() => {}
                Some(Ok(chunk)) => return Some((Ok(chunk), self)),
                Some(Err(err)) => {
                    self.body = None;
                    if !err.is_transient() {
                        return Some(self.fail(err));
                    }
                    let interruption = Interruption {
                        error: err,
                        rejected_generation: None,
                    };
                    if let Err(err) = self.back_off(interruption).await {
                        return Some(self.fail(err));
                    }
                }
                None => {
                    debug!(url = %self.url, "stream completed");
                    self.body = None;
                    self.finished = true;
                    return None;
                }
            }
        }
    }

    fn fail(mut self, err: ApiError) -> (Result<Vec<u8>, ApiError>, Self) {
        self.body = None;
        self.finished = true;
        (Err(err), self)
    }

    async fn connect(&mut self) -> Result<HttpBodyStream, ConnectFailure> {
        let inner = &self.executor.inner;
        let transport = inner
            .session
            .ensure_open()
            .await
            .map_err(ConnectFailure::Fatal)?;

        let (mut headers, generation) = inner.auth.headers().await;
        if self.resuming {
            if let Some(marker) = &self.resume_marker {
                headers.insert(RESUME_HEADER.to_string(), marker.clone());
            }
        }
        let request = HttpRequest::json(self.method, self.url.clone(), self.payload.clone())
            .with_header("Accept", STREAM_ACCEPT)
            .with_headers(headers)
            .with_timeout(inner.stream_timeout);

        let response = match transport.send_stream(request).await {
            Ok(response) => response,
            Err(error) if error.is_transient() => {
                return Err(ConnectFailure::Retryable(Interruption {
                    error,
                    rejected_generation: None,
                }));
            }
            Err(error) => return Err(ConnectFailure::Fatal(error)),
        };

        if response.is_success() {
            if let Some(job_id) = response.header(JOB_ID_HEADER) {
                self.resume_marker = Some(job_id.to_string());
            }
            debug!(url = %self.url, resuming = self.resuming, "stream connected");
            return Ok(response.body);
        }

        let status = response.status;
        let text = collect_error_body(response.body, inner.session.timeout()).await;
        let error = classify_status(status, &resource_path(&self.url), &text);
        match status {
            401 => Err(ConnectFailure::Retryable(Interruption {
                error,
                rejected_generation: Some(generation),
            })),
            408 | 429 | 500..=599 => Err(ConnectFailure::Retryable(Interruption {
                error,
                rejected_generation: None,
            })),
            _ => Err(ConnectFailure::Fatal(error)),
        }
    }

    /// Accounts for one failed attempt and waits before the next one.
    async fn back_off(&mut self, interruption: Interruption) -> Result<(), ApiError> {
        let policy = self.executor.inner.policy;
        self.attempts += 1;
        self.resuming = true;

        if self.attempts > policy.max_stream_retries {
            warn!(
                url = %self.url,
                max_stream_retries = policy.max_stream_retries,
                error = %interruption.error,
                "stream reconnect budget exhausted"
            );
            return Err(ApiError::StreamRetryBudgetExceeded {
                attempts: policy.max_stream_retries,
                message: interruption.error.to_string(),
            });
        }

        let delay = backoff::jittered_delay(policy.stream_retry_delay, self.attempts);
        warn!(
            url = %self.url,
            attempt = self.attempts,
            max_stream_retries = policy.max_stream_retries,
            delay_ms = delay.as_millis() as u64,
            error = %interruption.error,
            "stream interrupted, reconnecting"
        );

        if let Some(generation) = interruption.rejected_generation {
            // best effort: the next attempt uses whatever credentials are current
            match self
                .executor
                .authenticator()
                .relogin_if_stale(generation)
                .await
            {
                Ok(true) => debug!("re-authenticated before reconnect"),
                Ok(false) => debug!("no username/password configured, reconnecting as is"),
                Err(err) => warn!(error = %err, "re-authentication before reconnect failed"),
            }
        }

        tokio::time::sleep(delay).await;
        Ok(())
    }
}

/// Reads at most [`MAX_ERROR_BODY_BYTES`] of a failed response, giving up
/// after `limit`; whatever arrived by then becomes the error message.
async fn collect_error_body(mut body: HttpBodyStream, limit: Duration) -> String {
    let mut bytes = Vec::new();
    let drain = async {
        while let Some(Ok(chunk)) = body.next().await {
            bytes.extend_from_slice(&chunk);
            if bytes.len() >= MAX_ERROR_BODY_BYTES {
                bytes.truncate(MAX_ERROR_BODY_BYTES);
                break;
            }
        }
    };
    if tokio::time::timeout(limit, drain).await.is_err() {
        debug!(limit_ms = limit.as_millis() as u64, "error body stalled, using what arrived");
    }
    String::from_utf8_lossy(&bytes).into_owned()
}

/// Adapts a [`ByteStream`] into UTF-8 text chunks.
pub struct Utf8Chunks {
    inner: ByteStream,
    pending: Vec<u8>,
    done: bool,
}

impl Utf8Chunks {
    pub fn new(inner: ByteStream) -> Self {
        Self {
            inner,
            pending: Vec::new(),
            done: false,
        }
    }

    /// Splits off the longest valid UTF-8 prefix of the buffer.
    fn take_text(&mut self) -> Result<Option<String>, ApiError> {
        let valid = match std::str::from_utf8(&self.pending) {
            Ok(_) => self.pending.len(),
            Err(err) if err.error_len().is_none() => err.valid_up_to(),
            Err(err) => {
                return Err(ApiError::decode(format!(
                    "invalid UTF-8 in stream chunk: {err}"
                )));
            }
        };
        if valid == 0 {
            return Ok(None);
        }
        let rest = self.pending.split_off(valid);
        let text = std::mem::replace(&mut self.pending, rest);
        String::from_utf8(text)
            .map(Some)
            .map_err(|err| ApiError::decode(err.to_string()))
    }
}

impl Stream for Utf8Chunks {
    type Item = Result<String, ApiError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(None);
        }

        loop {
            match this.inner.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => {
                    this.pending.extend_from_slice(&bytes);
                    match this.take_text() {
                        Ok(Some(text)) => return Poll::Ready(Some(Ok(text))),
                        Ok(None) => continue,
                        Err(err) => {
                            this.done = true;
                            return Poll::Ready(Some(Err(err)));
                        }
                    }
                }
                Poll::Ready(Some(Err(err))) => {
                    this.done = true;
                    return Poll::Ready(Some(Err(err)));
                }
                Poll::Ready(None) => {
                    this.done = true;
                    if this.pending.is_empty() {
                        return Poll::Ready(None);
                    }
                    return Poll::Ready(Some(Err(ApiError::decode(
                        "stream ended inside a UTF-8 sequence",
                    ))));
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use futures_util::stream;

    use super::*;

    fn bytes(chunks: Vec<Result<Vec<u8>, ApiError>>) -> ByteStream {
        Box::pin(stream::iter(chunks))
    }

    #[tokio::test]
    async fn text_chunks_pass_through() {
        let mut text = Utf8Chunks::new(bytes(vec![Ok(b"hello ".to_vec()), Ok(b"world".to_vec())]));
        assert_eq!(text.next().await.expect("item").expect("ok"), "hello ");
        assert_eq!(text.next().await.expect("item").expect("ok"), "world");
        assert!(text.next().await.is_none());
    }

    #[tokio::test]
    async fn split_multibyte_characters_are_reassembled() {
        let snowman = "☃".as_bytes();
        let mut text = Utf8Chunks::new(bytes(vec![
            Ok([b"a".as_slice(), &snowman[..1]].concat()),
            Ok(snowman[1..].to_vec()),
        ]));
        assert_eq!(text.next().await.expect("item").expect("ok"), "a");
        assert_eq!(text.next().await.expect("item").expect("ok"), "☃");
        assert!(text.next().await.is_none());
    }

    #[tokio::test]
    async fn invalid_bytes_are_decode_errors() {
        let mut text = Utf8Chunks::new(bytes(vec![Ok(b"ok\xff".to_vec())]));
        let err = text.next().await.expect("item").unwrap_err();
        assert!(matches!(err, ApiError::Decode { .. }));
        assert!(text.next().await.is_none());
    }

    #[tokio::test]
    async fn truncated_sequences_at_end_of_stream_are_reported() {
        let snowman = "☃".as_bytes();
        let mut text = Utf8Chunks::new(bytes(vec![Ok(snowman[..2].to_vec())]));
        let err = text.next().await.expect("item").unwrap_err();
        assert!(matches!(err, ApiError::Decode { .. }));
    }

    #[tokio::test]
    async fn upstream_errors_end_the_text_stream() {
        let mut text = Utf8Chunks::new(bytes(vec![
            Err(ApiError::connection("reset")),
            Ok(b"late".to_vec()),
        ]));
        assert!(matches!(
            text.next().await,
            Some(Err(ApiError::ConnectionFailure { .. }))
        ));
        assert!(text.next().await.is_none());
    }
}
