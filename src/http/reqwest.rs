use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::{Client, Method};

use crate::error::ApiError;

use super::{
    DynHttpTransport, HttpBodyStream, HttpMethod, HttpRequest, HttpResponse, HttpStreamResponse,
    HttpTransport, TransportFactory,
};

/// Default [`HttpTransport`] backed by reqwest.
///
/// reqwest pools connections internally; one transport is one logical session.
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Wraps a preconfigured `reqwest::Client`.
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Builds a client whose connection establishment is bounded by `timeout`.
    ///
    /// The total per-attempt deadline is carried by each [`HttpRequest`], so
    /// streaming requests can opt out of it.
    pub fn with_connect_timeout(timeout: Duration) -> Result<Self, ApiError> {
        Client::builder()
            .connect_timeout(timeout)
            .build()
            .map(Self::new)
            .map_err(|err| ApiError::connection(format!("failed to create reqwest client: {err}")))
    }

    fn method(method: HttpMethod) -> Method {
        match method {
            HttpMethod::Get => Method::GET,
            HttpMethod::Post => Method::POST,
        }
    }

    fn build_request(&self, mut request: HttpRequest) -> Result<reqwest::RequestBuilder, ApiError> {
        let method = Self::method(request.method);
        let mut builder = self.client.request(method, &request.url);

        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        for (name, value) in request.headers.drain() {
            let header_name = reqwest::header::HeaderName::from_bytes(name.as_bytes())
                .map_err(|err| ApiError::connection(format!("invalid header name: {err}")))?;
            let header_value = reqwest::header::HeaderValue::from_str(&value).map_err(|err| {
                ApiError::connection(format!("invalid header value for {header_name}: {err}"))
            })?;
            builder = builder.header(header_name, header_value);
        }

        if let Some(body) = request.body.take() {
            builder = builder.body(body);
        }

        Ok(builder)
    }

    fn headers_to_map(headers: &reqwest::header::HeaderMap) -> HashMap<String, String> {
        headers
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    value.to_str().unwrap_or_default().to_string(),
                )
            })
            .collect()
    }
}

/// Splits reqwest failures into the timeout / connection halves of the taxonomy.
fn map_reqwest_error(err: reqwest::Error) -> ApiError {
    if err.is_timeout() {
        ApiError::timeout(err.to_string())
    } else {
        ApiError::connection(err.to_string())
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, ApiError> {
        let response = self
            .build_request(request)?
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status().as_u16();
        let headers = Self::headers_to_map(response.headers());
        let body = response
            .bytes()
            .await
            .map_err(map_reqwest_error)?
            .to_vec();

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }

    async fn send_stream(&self, request: HttpRequest) -> Result<HttpStreamResponse, ApiError> {
        let response = self
            .build_request(request)?
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status().as_u16();
        let headers = Self::headers_to_map(response.headers());
        let stream = response.bytes_stream().map(|chunk| {
            chunk
                .map(|bytes| bytes.to_vec())
                .map_err(map_reqwest_error)
        });
        let body: HttpBodyStream = Box::pin(stream);

        Ok(HttpStreamResponse {
            status,
            headers,
            body,
        })
    }
}

/// Factory used by the session when no transport was injected.
pub fn default_factory() -> TransportFactory {
    Arc::new(|timeout: Duration| -> Result<DynHttpTransport, ApiError> {
        Ok(Arc::new(ReqwestTransport::with_connect_timeout(timeout)?))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_request_rejects_invalid_header_names() {
        let transport =
            ReqwestTransport::with_connect_timeout(Duration::from_secs(1)).expect("transport");
        let request = HttpRequest::json(HttpMethod::Get, "http://localhost/models/", None)
            .with_headers(HashMap::from([("bad header".to_string(), "x".to_string())]));

        match transport.build_request(request) {
            Err(ApiError::ConnectionFailure { message }) => {
                assert!(message.contains("invalid header name"), "unexpected: {message}");
            }
            Ok(_) => panic!("expected invalid header error"),
            Err(other) => panic!("unexpected error type: {other:?}"),
        }
    }

    #[test]
    fn default_factory_builds_a_transport() {
        let factory = default_factory();
        assert!(factory(Duration::from_secs(5)).is_ok());
    }
}
