//! Scripted in-memory transport for exercising reconnect behaviour under
//! paused tokio time.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use futures_core::Stream;
use futures_util::{StreamExt, stream};
use ml_api_client::ApiError;
use ml_api_client::http::{
    HttpBodyStream, HttpRequest, HttpResponse, HttpStreamResponse, HttpTransport,
};
use tokio::sync::Barrier;
use tokio::time::Instant;

/// What one `send_stream` call resolves to.
pub enum Connect {
    /// Response head with `status`, then `chunks` in order.
    Respond {
        status: u16,
        headers: HashMap<String, String>,
        chunks: Vec<Result<Vec<u8>, ApiError>>,
        /// Keep the body open after the last chunk instead of ending it.
        hang: bool,
        dropped: Option<Arc<AtomicBool>>,
        /// Held back until every connect sharing the barrier has arrived.
        gate: Option<Arc<Barrier>>,
    },
    /// The connection attempt itself fails.
    Fail(ApiError),
}

impl Connect {
    pub fn ok(chunks: &[&str]) -> Self {
        Self::Respond {
            status: 200,
            headers: HashMap::new(),
            chunks: chunks.iter().map(|c| Ok(c.as_bytes().to_vec())).collect(),
            hang: false,
            dropped: None,
            gate: None,
        }
    }

    pub fn raw(chunks: Vec<Vec<u8>>) -> Self {
        Self::Respond {
            status: 200,
            headers: HashMap::new(),
            chunks: chunks.into_iter().map(Ok).collect(),
            hang: false,
            dropped: None,
            gate: None,
        }
    }

    /// Delivers `chunks`, then fails with a transient connection error.
    pub fn interrupted(chunks: &[&str]) -> Self {
        Self::interrupted_by(chunks, ApiError::connection("connection reset by peer"))
    }

    /// Delivers `chunks`, then yields `error` from the body.
    pub fn interrupted_by(chunks: &[&str], error: ApiError) -> Self {
        let mut items: Vec<Result<Vec<u8>, ApiError>> =
            chunks.iter().map(|c| Ok(c.as_bytes().to_vec())).collect();
        items.push(Err(error));
        Self::Respond {
            status: 200,
            headers: HashMap::new(),
            chunks: items,
            hang: false,
            dropped: None,
            gate: None,
        }
    }

    pub fn status(status: u16, body: &str) -> Self {
        Self::Respond {
            status,
            headers: HashMap::new(),
            chunks: vec![Ok(body.as_bytes().to_vec())],
            hang: false,
            dropped: None,
            gate: None,
        }
    }

    pub fn refused() -> Self {
        Self::Fail(ApiError::connection("connection refused"))
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let Self::Respond { headers, .. } = &mut self {
            headers.insert(name.to_string(), value.to_string());
        }
        self
    }

    /// Keeps the body open after the scripted chunks.
    pub fn stalled(mut self) -> Self {
        if let Self::Respond { hang, .. } = &mut self {
            *hang = true;
        }
        self
    }

    pub fn gated(mut self, barrier: Arc<Barrier>) -> Self {
        if let Self::Respond { gate, .. } = &mut self {
            *gate = Some(barrier);
        }
        self
    }

    pub fn hanging(mut self, flag: Arc<AtomicBool>) -> Self {
        if let Self::Respond { hang, dropped, .. } = &mut self {
            *hang = true;
            *dropped = Some(flag);
        }
        self
    }
}

/// A request as the transport saw it, with the (virtual) time it arrived.
#[derive(Clone, Debug)]
pub struct Recorded {
    pub url: String,
    pub headers: HashMap<String, String>,
    pub body: Option<Vec<u8>>,
    pub timeout: Option<Duration>,
    pub at: Instant,
}

impl Recorded {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Default)]
pub struct ScriptedTransport {
    connects: Mutex<VecDeque<Connect>>,
    replies: Mutex<VecDeque<HttpResponse>>,
    stream_requests: Mutex<Vec<Recorded>>,
    requests: Mutex<Vec<Recorded>>,
}

impl ScriptedTransport {
    pub fn new(connects: Vec<Connect>) -> Arc<Self> {
        Arc::new(Self {
            connects: Mutex::new(connects.into()),
            ..Self::default()
        })
    }

    /// Queues a reply for the next buffered `send` (logins).
    pub fn reply(&self, status: u16, body: serde_json::Value) {
        self.replies.lock().unwrap().push_back(HttpResponse {
            status,
            headers: HashMap::new(),
            body: serde_json::to_vec(&body).unwrap(),
        });
    }

    pub fn stream_requests(&self) -> Vec<Recorded> {
        self.stream_requests.lock().unwrap().clone()
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }
}

fn record(request: &HttpRequest) -> Recorded {
    Recorded {
        url: request.url.clone(),
        headers: request.headers.clone(),
        body: request.body.clone(),
        timeout: request.timeout,
        at: Instant::now(),
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, ApiError> {
        self.requests.lock().unwrap().push(record(&request));
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| ApiError::connection("no scripted reply left"))
    }

    async fn send_stream(&self, request: HttpRequest) -> Result<HttpStreamResponse, ApiError> {
        self.stream_requests.lock().unwrap().push(record(&request));
        let next = self.connects.lock().unwrap().pop_front();
        match next {
            Some(Connect::Respond {
                status,
                headers,
                chunks,
                hang,
                dropped,
                gate,
            }) => {
                if let Some(barrier) = gate {
                    barrier.wait().await;
                }
                let body: HttpBodyStream = if hang {
                    Box::pin(stream::iter(chunks).chain(stream::pending()))
                } else {
                    Box::pin(stream::iter(chunks))
                };
                let body: HttpBodyStream = match dropped {
                    Some(flag) => Box::pin(DropGuard { inner: body, flag }),
                    None => body,
                };
                Ok(HttpStreamResponse {
                    status,
                    headers,
                    body,
                })
            }
            Some(Connect::Fail(err)) => Err(err),
            None => Err(ApiError::connection("no scripted connection left")),
        }
    }
}

/// Flags when the body stream is released.
struct DropGuard {
    inner: HttpBodyStream,
    flag: Arc<AtomicBool>,
}

impl Stream for DropGuard {
    type Item = Result<Vec<u8>, ApiError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

impl Drop for DropGuard {
    fn drop(&mut self) {
        self.flag.store(true, Ordering::SeqCst);
    }
}
