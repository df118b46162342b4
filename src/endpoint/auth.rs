use crate::error::ApiError;
use crate::executor::Executor;
use crate::types::{ApiKeyRequest, ApiKeyResponse, RegisterRequest, RegisterResponse, TokenResponse};

use super::{decode, endpoint_url};

/// Account and credential endpoints under `/auth`.
pub struct AuthEndpoint<'a> {
    executor: &'a Executor,
}

impl<'a> AuthEndpoint<'a> {
    pub fn new(executor: &'a Executor) -> Self {
        Self { executor }
    }

    /// Logs in and installs the returned bearer token on the client.
    ///
    /// The username and password are not remembered; configure them on the
    /// client to enable silent re-authentication.
    pub async fn login(
        &self,
        username: &str,
        password: &str,
        expires_in: u32,
    ) -> Result<TokenResponse, ApiError> {
        self.executor
            .authenticator()
            .login(username, password, expires_in)
            .await
    }

    pub async fn register(&self, request: &RegisterRequest) -> Result<RegisterResponse, ApiError> {
        let url = endpoint_url(self.executor, &["auth", "register"])?;
        let value = self.executor.post(&url, request).await?;
        decode("register", value)
    }

    /// Issues a new API key for the authenticated user.
    pub async fn create_api_key(&self, expires_in: Option<u32>) -> Result<ApiKeyResponse, ApiError> {
        let url = endpoint_url(self.executor, &["auth", "api-key"])?;
        let value = self
            .executor
            .post(&url, &ApiKeyRequest { expires_in })
            .await?;
        decode("api key", value)
    }
}
