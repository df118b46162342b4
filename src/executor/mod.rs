//! Request execution: session ownership, credential injection and bounded re-authentication.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::{Span, instrument};

use crate::auth::Authenticator;
use crate::config::RetryPolicy;
use crate::credentials::{AuthState, Credentials};
use crate::error::{ApiError, classify_status};
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::session::Session;

pub mod backoff;
pub mod stream;

pub use stream::{ByteStream, TextStream};

/// Executes requests against the service on behalf of the endpoint callers.
///
/// Cloning is cheap; clones share the session, the credentials and the retry
/// counter, so a re-authentication triggered by one call benefits every other.
#[derive(Clone)]
pub struct Executor {
    pub(crate) inner: Arc<ExecutorInner>,
}

pub(crate) struct ExecutorInner {
    pub(crate) session: Session,
    pub(crate) auth: AuthState,
    pub(crate) policy: RetryPolicy,
    pub(crate) base_url: String,
    pub(crate) stream_timeout: Option<std::time::Duration>,
}

impl Executor {
    pub(crate) fn new(
        session: Session,
        credentials: Credentials,
        policy: RetryPolicy,
        base_url: String,
        stream_timeout: Option<std::time::Duration>,
    ) -> Self {
        Self {
            inner: Arc::new(ExecutorInner {
                session,
                auth: AuthState::new(credentials),
                policy,
                base_url,
                stream_timeout,
            }),
        }
    }

    /// Base URL every endpoint path is appended to.
    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    /// Retry settings in effect.
    pub fn policy(&self) -> RetryPolicy {
        self.inner.policy
    }

    /// Current number of consecutive re-authentication retries.
    pub fn retry_count(&self) -> u32 {
        self.inner.auth.retry_count()
    }

    /// Snapshot of the credentials as they stand right now.
    pub async fn credentials(&self) -> Credentials {
        self.inner.auth.snapshot().await
    }

    /// The session this executor sends through.
    pub fn session(&self) -> &Session {
        &self.inner.session
    }

    pub(crate) fn authenticator(&self) -> Authenticator<'_> {
        Authenticator::new(self)
    }

    /// Sends one logical request and returns the parsed JSON body.
    ///
    /// With `allow_retry`, a 401 clears the stored credentials, waits
    /// `retry_delay * retry_count` and logs in again with the configured
    /// username and password before resending. The retry counter is shared by
    /// the whole client and reset by the next successful retrying request; a
    /// request that finds the credentials already refreshed by a concurrent
    /// one just resends without counting a retry.
    /// Without `allow_retry`, a 401 fails immediately and the counter is left
    /// untouched; login itself runs that way.
    ///
    /// # Errors
    ///
    /// - [`ApiError::RetryBudgetExceeded`] once `max_retries` re-authentications
    ///   did not help.
    /// - [`ApiError::PermissionDenied`] on 403, or on 401 when no re-login is
    ///   possible.
    /// - [`ApiError::NotFound`] on 404, [`ApiError::Api`] on any other failure
    ///   status.
    /// - [`ApiError::ConnectionFailure`] / [`ApiError::Timeout`] from the transport.
    /// - [`ApiError::Decode`] if a success body is not JSON.
    #[instrument(
        name = "ml_api_request",
        skip(self, body),
        fields(
            http.method = %method,
            http.url = %url,
            http.status_code = tracing::field::Empty,
        )
    )]
    pub async fn execute<B>(
        &self,
        method: HttpMethod,
        url: &str,
        body: Option<&B>,
        allow_retry: bool,
    ) -> Result<Value, ApiError>
    where
        B: Serialize + ?Sized,
    {
        let payload = serialize_body(body)?;

        loop {
            let (response, generation) = self.send_once(method, url, payload.clone()).await?;

            if response.is_success() {
                if allow_retry {
                    self.inner.auth.reset_retries();
                }
                return parse_json(response);
            }

            if response.status == 401 && allow_retry {
                self.authenticator()
                    .refresh(generation, self.inner.policy)
                    .await?;
                continue;
            }

            return Err(failure(url, &response));
        }
    }

    /// Single attempt with no re-authentication; what login goes through.
    #[instrument(
        name = "ml_api_request",
        skip(self, payload),
        fields(
            http.method = %method,
            http.url = %url,
            http.status_code = tracing::field::Empty,
        )
    )]
    pub(crate) async fn execute_once(
        &self,
        method: HttpMethod,
        url: &str,
        payload: Option<Vec<u8>>,
    ) -> Result<Value, ApiError> {
        let (response, _) = self.send_once(method, url, payload).await?;
        if response.is_success() {
            parse_json(response)
        } else {
            Err(failure(url, &response))
        }
    }

    /// Opens the session if needed and sends with the current credentials.
    ///
    /// Returns the credential generation the request was built with.
    async fn send_once(
        &self,
        method: HttpMethod,
        url: &str,
        payload: Option<Vec<u8>>,
    ) -> Result<(HttpResponse, u64), ApiError> {
        let transport = self.inner.session.ensure_open().await?;
        // headers are rebuilt per attempt; a retry may have swapped the credentials
        let (headers, generation) = self.inner.auth.headers().await;
        let request = HttpRequest::json(method, url, payload)
            .with_headers(headers)
            .with_timeout(Some(self.inner.session.timeout()));

        let response = transport.send(request).await?;
        Span::current().record("http.status_code", response.status);
        Ok((response, generation))
    }

    /// Sends a GET without a body.
    pub async fn get(&self, url: &str) -> Result<Value, ApiError> {
        self.execute::<Value>(HttpMethod::Get, url, None, true).await
    }

    /// Sends a POST with a JSON body.
    pub async fn post<B>(&self, url: &str, body: &B) -> Result<Value, ApiError>
    where
        B: Serialize + ?Sized,
    {
        self.execute(HttpMethod::Post, url, Some(body), true).await
    }
}

pub(crate) fn serialize_body<B>(body: Option<&B>) -> Result<Option<Vec<u8>>, ApiError>
where
    B: Serialize + ?Sized,
{
    body.map(serde_json::to_vec)
        .transpose()
        .map_err(|err| ApiError::Validation {
            message: format!("failed to serialize request: {err}"),
        })
}

fn failure(url: &str, response: &HttpResponse) -> ApiError {
    let text = String::from_utf8_lossy(&response.body);
    classify_status(response.status, &resource_path(url), &text)
}

fn parse_json(response: HttpResponse) -> Result<Value, ApiError> {
    if response.body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }
    serde_json::from_slice(&response.body)
        .map_err(|err| ApiError::decode(format!("response is not valid JSON: {err}")))
}

/// Path component of `url`, used to name the resource in [`ApiError::NotFound`].
pub(crate) fn resource_path(url: &str) -> String {
    match reqwest::Url::parse(url) {
        Ok(parsed) => parsed.path().to_string(),
        Err(_) => url.to_string(),
    }
}
