use std::collections::HashMap;
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_core::Stream;

use crate::error::ApiError;

/// Enumerates HTTP methods understood by the lightweight transport abstraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
        };
        f.write_str(name)
    }
}

/// Request descriptor handed to a transport.
///
/// The executor builds a fresh descriptor for every attempt so that headers
/// always reflect the credentials current at send time.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: HashMap<String, String>,
    pub body: Option<Vec<u8>>,
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    /// Builds a request carrying an optional JSON body.
    ///
    /// `Accept: application/json` is always set; `Content-Type` only when a body
    /// is present.
    ///
    /// # Examples
    ///
    /// ```
    /// use ml_api_client::http::{HttpMethod, HttpRequest};
    ///
    /// let request = HttpRequest::json(HttpMethod::Post, "https://example.com", Some(br"{}".to_vec()));
    /// assert_eq!(request.method, HttpMethod::Post);
    /// assert_eq!(request.headers.get("Content-Type"), Some(&"application/json".to_string()));
    /// ```
    pub fn json(method: HttpMethod, url: impl Into<String>, body: Option<Vec<u8>>) -> Self {
        let mut headers = HashMap::from([("Accept".to_string(), "application/json".to_string())]);
        if body.is_some() {
            headers.insert("Content-Type".to_string(), "application/json".to_string());
        }
        Self {
            method,
            url: url.into(),
            headers,
            body,
            timeout: None,
        }
    }

    /// Adds headers on top of the ones already present, replacing duplicates.
    pub fn with_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.headers.extend(headers);
        self
    }

    /// Sets one header, replacing any existing entry regardless of case.
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.retain(|key, _| !key.eq_ignore_ascii_case(name));
        self.headers.insert(name.to_string(), value.into());
        self
    }

    /// Sets the deadline for this single attempt.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Minimal HTTP response representation.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Returns `true` for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// HTTP response that carries a streaming body.
pub struct HttpStreamResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: HttpBodyStream,
}

impl HttpStreamResponse {
    /// Returns `true` for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Looks a header up case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }
}

/// Alias for the body stream returned by [`HttpTransport::send_stream`].
///
/// Dropping the stream releases the underlying connection.
pub type HttpBodyStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>, ApiError>> + Send>>;

/// Transport abstraction used to decouple the executor from the concrete HTTP client.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Sends a request and resolves when the full response is available.
    ///
    /// # Examples
    ///
    /// ```
    /// # use async_trait::async_trait;
    /// # use ml_api_client::http::{HttpTransport, HttpRequest, HttpResponse, HttpStreamResponse, HttpMethod};
    /// # use ml_api_client::error::ApiError;
    /// # use futures_util::stream;
    /// struct MemoryTransport;
    ///
    /// #[async_trait]
    /// impl HttpTransport for MemoryTransport {
    ///     async fn send(&self, request: HttpRequest) -> Result<HttpResponse, ApiError> {
    ///         Ok(HttpResponse { status: 200, headers: request.headers, body: b"{}".to_vec() })
    ///     }
    ///     async fn send_stream(&self, request: HttpRequest) -> Result<HttpStreamResponse, ApiError> {
    ///         Ok(HttpStreamResponse { status: 200, headers: request.headers, body: Box::pin(stream::empty()) })
    ///     }
    /// }
    ///
    /// # tokio::runtime::Runtime::new().unwrap().block_on(async {
    /// let response = MemoryTransport
    ///     .send(HttpRequest::json(HttpMethod::Get, "https://example.com", None))
    ///     .await
    ///     .unwrap();
    /// assert_eq!(response.status, 200);
    /// # });
    /// ```
    ///
    /// # Errors
    ///
    /// Implementations map deadline expiry to [`ApiError::Timeout`] and every other
    /// transport failure to [`ApiError::ConnectionFailure`]. Non-success statuses
    /// are returned as responses, not errors.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, ApiError>;

    /// Sends a request and returns the body as a stream of raw chunks.
    ///
    /// # Errors
    ///
    /// Same mapping as [`HttpTransport::send`]; failures after the response head
    /// arrived are reported as items of the body stream.
    async fn send_stream(&self, request: HttpRequest) -> Result<HttpStreamResponse, ApiError>;
}

/// Thread-safe handle to a transport implementation.
pub type DynHttpTransport = Arc<dyn HttpTransport>;

/// Builds a transport bound to the given connect timeout.
///
/// The session calls the factory lazily, and again after an explicit close.
pub type TransportFactory =
    Arc<dyn Fn(Duration) -> Result<DynHttpTransport, ApiError> + Send + Sync>;

/// Wraps an existing transport in a factory that always hands out the same instance.
pub fn fixed_transport(transport: DynHttpTransport) -> TransportFactory {
    Arc::new(move |_timeout: Duration| -> Result<DynHttpTransport, ApiError> {
        Ok(transport.clone())
    })
}

pub(crate) fn find_header<'a>(headers: &'a HashMap<String, String>, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}

pub mod reqwest;
