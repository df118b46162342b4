//! Login against the token endpoint and credential refresh after a 401.

use tracing::{debug, info, warn};

use crate::config::RetryPolicy;
use crate::error::ApiError;
use crate::executor::backoff::linear_delay;
use crate::executor::{Executor, serialize_body};
use crate::http::HttpMethod;
use crate::types::{LoginRequest, TokenResponse};

/// Lifetime requested for tokens obtained by silent re-authentication.
pub const REAUTH_TOKEN_EXPIRES_IN: u32 = 30;

/// Performs logins and installs the resulting bearer token.
///
/// Safe to use from inside the executor's retry paths: logins go out with
/// retries disabled, and concurrent refreshes are serialized on the shared
/// state so only one of them actually logs in.
pub struct Authenticator<'a> {
    executor: &'a Executor,
}

impl<'a> Authenticator<'a> {
    pub fn new(executor: &'a Executor) -> Self {
        Self { executor }
    }

    /// Exchanges username and password for a bearer token.
    ///
    /// On success the token replaces any stored API key. On failure the
    /// executor's error is returned unchanged and the credentials are untouched.
    pub async fn login(
        &self,
        username: &str,
        password: &str,
        expires_in: u32,
    ) -> Result<TokenResponse, ApiError> {
        let url = format!("{}/auth/token", self.executor.base_url());
        let body = LoginRequest {
            username: username.to_string(),
            password: password.to_string(),
            expires_in,
        };
        let payload = serialize_body(Some(&body))?;
        let value = self
            .executor
            .execute_once(HttpMethod::Post, &url, payload)
            .await?;
        let token: TokenResponse = serde_json::from_value(value)
            .map_err(|err| ApiError::decode(format!("unexpected token response: {err}")))?;

        self.executor
            .inner
            .auth
            .install_token(token.access_token.clone())
            .await;
        info!(expires_in, token_type = %token.token_type, "bearer token installed");
        Ok(token)
    }

    /// Logs in again with the configured username and password.
    ///
    /// Returns `Ok(false)` when no username/password pair is configured.
    pub async fn relogin(&self) -> Result<bool, ApiError> {
        let Some((username, password)) = self.executor.inner.auth.login_pair().await else {
            return Ok(false);
        };
        self.login(&username, &password, REAUTH_TOKEN_EXPIRES_IN)
            .await
            .map(|_| true)
    }

    /// Recovers from a 401 observed with credentials of `observed_generation`.
    ///
    /// If the credentials changed since the failing request was built,
    /// another caller already refreshed them: nothing is done and no retry is
    /// counted. Otherwise one slot of the client-wide retry budget is claimed,
    /// the bearer token and API key are cleared, and after a linear delay the
    /// configured username and password are used to log in again.
    ///
    /// # Errors
    ///
    /// [`ApiError::RetryBudgetExceeded`] once `policy.max_retries` refreshes
    /// went by without a successful request, [`ApiError::PermissionDenied`]
    /// when no username/password pair is configured, or the login's own error.
    pub(crate) async fn refresh(
        &self,
        observed_generation: u64,
        policy: RetryPolicy,
    ) -> Result<(), ApiError> {
        let auth = &self.executor.inner.auth;
        let _guard = auth.refresh_guard().await;
        if auth.generation() != observed_generation {
            debug!("credentials already refreshed by a concurrent request");
            return Ok(());
        }

        let Some(retry) = auth.try_begin_retry(policy.max_retries) else {
            warn!(
                max_retries = policy.max_retries,
                "authentication still rejected, giving up"
            );
            return Err(ApiError::RetryBudgetExceeded {
                attempts: policy.max_retries,
            });
        };
        debug!(
            retry,
            max_retries = policy.max_retries,
            "request unauthorized, re-authenticating"
        );

        auth.clear_tokens().await;
        tokio::time::sleep(linear_delay(policy.retry_delay, retry)).await;

        if self.relogin().await? {
            Ok(())
        } else {
            Err(ApiError::permission_denied("invalid api key or token"))
        }
    }

    /// Logs in again unless the credentials changed since `observed_generation`.
    ///
    /// Shares the single-flight guard with [`Authenticator::refresh`] but
    /// leaves the retry budget alone; reconnecting streams count their own
    /// attempts. Returns `Ok(false)` when no username/password is configured.
    pub(crate) async fn relogin_if_stale(&self, observed_generation: u64) -> Result<bool, ApiError> {
        let auth = &self.executor.inner.auth;
        let _guard = auth.refresh_guard().await;
        if auth.generation() != observed_generation {
            debug!("credentials already refreshed by a concurrent request");
            return Ok(true);
        }
        self.relogin().await
    }
}
