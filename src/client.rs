use std::future::Future;
use std::time::Duration;

use tracing::debug;

use crate::config::ClientConfig;
use crate::credentials::Credentials;
use crate::endpoint::{
    AuthEndpoint, ChatEndpoint, EmbeddingsEndpoint, ModelsEndpoint, RagEndpoint, VectorDbEndpoint,
};
use crate::error::ApiError;
use crate::executor::Executor;
use crate::http::reqwest::default_factory;
use crate::http::{DynHttpTransport, TransportFactory, fixed_transport};
use crate::session::Session;

/// Entry point of the library: one executor plus the endpoint groups on top.
///
/// Clones share the session, credentials and retry counter.
///
/// # Examples
///
/// ```no_run
/// # async fn run() -> Result<(), ml_api_client::ApiError> {
/// use ml_api_client::MlApiClient;
/// use ml_api_client::types::ChatCompletionsRequest;
///
/// let client = MlApiClient::builder().api_key("my-key").build()?;
/// let reply = client
///     .chat()
///     .get_completions(ChatCompletionsRequest {
///         input: "Say hi".into(),
///         ..Default::default()
///     })
///     .await?;
/// println!("{}", reply.response);
/// client.close().await;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct MlApiClient {
    executor: Executor,
}

impl MlApiClient {
    /// Builds a client from `config` with the default reqwest transport.
    pub fn new(config: ClientConfig) -> Result<Self, ApiError> {
        Self::builder().config(config).build()
    }

    /// Builds a client from `ML_API_*` environment variables.
    pub fn from_env() -> Result<Self, ApiError> {
        Self::new(ClientConfig::from_env()?)
    }

    pub fn builder() -> MlApiClientBuilder {
        MlApiClientBuilder::default()
    }

    pub fn base_url(&self) -> &str {
        self.executor.base_url()
    }

    /// The request executor every endpoint goes through.
    pub fn executor(&self) -> &Executor {
        &self.executor
    }

    pub fn auth(&self) -> AuthEndpoint<'_> {
        AuthEndpoint::new(&self.executor)
    }

    pub fn chat(&self) -> ChatEndpoint<'_> {
        ChatEndpoint::new(&self.executor)
    }

    pub fn models(&self) -> ModelsEndpoint<'_> {
        ModelsEndpoint::new(&self.executor)
    }

    pub fn vector_db(&self) -> VectorDbEndpoint<'_> {
        VectorDbEndpoint::new(&self.executor)
    }

    pub fn embeddings(&self) -> EmbeddingsEndpoint<'_> {
        EmbeddingsEndpoint::new(&self.executor)
    }

    pub fn rag(&self) -> RagEndpoint<'_> {
        RagEndpoint::new(&self.executor)
    }

    /// Opens the session now instead of on the first request.
    pub async fn open(&self) -> Result<(), ApiError> {
        self.executor.session().ensure_open().await.map(|_| ())
    }

    /// Releases the session. Safe to call when nothing was ever sent.
    pub async fn close(&self) {
        self.executor.session().close().await;
    }

    /// Runs `f` with an open session and closes it afterwards, whether `f`
    /// succeeded or not.
    pub async fn scoped<F, Fut, T>(&self, f: F) -> Result<T, ApiError>
    where
        F: FnOnce(MlApiClient) -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        self.open().await?;
        let result = f(self.clone()).await;
        self.close().await;
        if let Err(err) = &result {
            debug!(error = %err, "scoped client work failed");
        }
        result
    }

    /// Snapshot of the current credentials.
    pub async fn credentials(&self) -> Credentials {
        self.executor.credentials().await
    }

    /// Consecutive re-authentication retries since the last success.
    pub fn retry_count(&self) -> u32 {
        self.executor.retry_count()
    }
}

impl std::fmt::Debug for MlApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MlApiClient")
            .field("base_url", &self.base_url())
            .field("session", self.executor.session())
            .finish()
    }
}

/// Builder for [`MlApiClient`]; starts from [`ClientConfig::default`].
#[derive(Default)]
pub struct MlApiClientBuilder {
    config: ClientConfig,
    factory: Option<TransportFactory>,
}

impl MlApiClientBuilder {
    /// Replaces every setting made so far with `config`.
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.config.base_url = base_url.into();
        self
    }

    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.config.api_key = Some(api_key.into());
        self
    }

    pub fn bearer_token(mut self, token: impl Into<String>) -> Self {
        self.config.bearer_token = Some(token.into());
        self
    }

    /// Username and password used to log in again after a 401.
    pub fn login_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.config.username = Some(username.into());
        self.config.password = Some(password.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    pub fn stream_timeout(mut self, timeout: Duration) -> Self {
        self.config.stream_timeout = Some(timeout);
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.config.max_retries = max_retries;
        self
    }

    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.config.retry_delay = delay;
        self
    }

    pub fn max_stream_retries(mut self, max_retries: u32) -> Self {
        self.config.max_stream_retries = max_retries;
        self
    }

    pub fn stream_retry_delay(mut self, delay: Duration) -> Self {
        self.config.stream_retry_delay = delay;
        self
    }

    /// Sends every request through `transport` instead of reqwest.
    pub fn transport(self, transport: DynHttpTransport) -> Self {
        self.transport_factory(fixed_transport(transport))
    }

    /// Opens sessions with `factory`; it receives the configured timeout.
    pub fn transport_factory(mut self, factory: TransportFactory) -> Self {
        self.factory = Some(factory);
        self
    }

    /// # Errors
    ///
    /// [`ApiError::InvalidConfig`] if the configuration does not validate.
    pub fn build(self) -> Result<MlApiClient, ApiError> {
        let config = self.config.validate()?;
        let factory = self.factory.unwrap_or_else(default_factory);
        let session = Session::new(factory, config.timeout);
        let executor = Executor::new(
            session,
            config.credentials(),
            config.retry_policy(),
            config.base_url.clone(),
            config.stream_timeout,
        );
        debug!(base_url = %config.base_url, "ml api client built");
        Ok(MlApiClient { executor })
    }
}
