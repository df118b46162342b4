//! Shared authentication state: credentials and the client-wide retry counter.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use tokio::sync::{Mutex, MutexGuard, RwLock};

/// Header carrying the static API key.
pub const API_KEY_HEADER: &str = "X-ML-API-Key";
/// Header carrying the bearer token.
pub const AUTHORIZATION_HEADER: &str = "Authorization";

/// Credential values known to a client.
///
/// A bearer token always takes precedence over the API key: once a token is
/// set, [`Credentials::auth_headers`] no longer emits `X-ML-API-Key` even if a
/// key is still stored.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub api_key: Option<String>,
    pub bearer_token: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Credentials {
    /// Computes the authentication headers for one attempt.
    ///
    /// # Examples
    ///
    /// ```
    /// use ml_api_client::credentials::Credentials;
    ///
    /// let credentials = Credentials {
    ///     api_key: Some("key".into()),
    ///     bearer_token: Some("token".into()),
    ///     ..Credentials::default()
    /// };
    /// let headers = credentials.auth_headers();
    /// assert_eq!(headers.get("Authorization"), Some(&"Bearer token".to_string()));
    /// assert!(!headers.contains_key("X-ML-API-Key"));
    /// ```
    pub fn auth_headers(&self) -> HashMap<String, String> {
        let mut headers = HashMap::new();
        match (&self.bearer_token, &self.api_key) {
            (Some(token), _) => {
                headers.insert(AUTHORIZATION_HEADER.to_string(), format!("Bearer {token}"));
            }
            (None, Some(key)) => {
                headers.insert(API_KEY_HEADER.to_string(), key.clone());
            }
            (None, None) => {}
        }
        headers
    }

    /// Username and password, when both are configured.
    pub fn login_pair(&self) -> Option<(String, String)> {
        match (&self.username, &self.password) {
            (Some(username), Some(password)) => Some((username.clone(), password.clone())),
            _ => None,
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn redact(value: &Option<String>) -> &'static str {
            if value.is_some() { "<set>" } else { "<unset>" }
        }
        f.debug_struct("Credentials")
            .field("api_key", &redact(&self.api_key))
            .field("bearer_token", &redact(&self.bearer_token))
            .field("username", &self.username)
            .field("password", &redact(&self.password))
            .finish()
    }
}

/// Internally synchronized state cell shared by every executor of a client.
///
/// `generation` increases on every credential mutation, which lets a caller
/// that observed a 401 tell whether somebody else already refreshed the
/// credentials it was using.
#[derive(Debug, Default)]
pub(crate) struct AuthState {
    credentials: RwLock<Credentials>,
    generation: AtomicU64,
    retry_count: AtomicU32,
    refresh: Mutex<()>,
}

impl AuthState {
    pub(crate) fn new(credentials: Credentials) -> Self {
        Self {
            credentials: RwLock::new(credentials),
            ..Self::default()
        }
    }

    pub(crate) async fn snapshot(&self) -> Credentials {
        self.credentials.read().await.clone()
    }

    /// Headers for the next attempt together with the generation they belong to.
    pub(crate) async fn headers(&self) -> (HashMap<String, String>, u64) {
        let credentials = self.credentials.read().await;
        (
            credentials.auth_headers(),
            self.generation.load(Ordering::SeqCst),
        )
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Installs a fresh bearer token and drops the API key.
    pub(crate) async fn install_token(&self, token: String) {
        let mut credentials = self.credentials.write().await;
        credentials.bearer_token = Some(token);
        credentials.api_key = None;
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    /// Forgets both the bearer token and the API key.
    pub(crate) async fn clear_tokens(&self) {
        let mut credentials = self.credentials.write().await;
        credentials.bearer_token = None;
        credentials.api_key = None;
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) async fn login_pair(&self) -> Option<(String, String)> {
        self.credentials.read().await.login_pair()
    }

    /// Serializes re-authentication so concurrent 401s trigger one login.
    pub(crate) async fn refresh_guard(&self) -> MutexGuard<'_, ()> {
        self.refresh.lock().await
    }

    pub(crate) fn retry_count(&self) -> u32 {
        self.retry_count.load(Ordering::SeqCst)
    }

    pub(crate) fn reset_retries(&self) {
        self.retry_count.store(0, Ordering::SeqCst);
    }

    /// Claims one unit of the retry budget.
    ///
    /// Returns the new count, or `None` when `max_retries` is already spent.
    pub(crate) fn try_begin_retry(&self, max_retries: u32) -> Option<u32> {
        self.retry_count
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |count| {
                (count < max_retries).then_some(count + 1)
            })
            .ok()
            .map(|previous| previous + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_key() -> Credentials {
        Credentials {
            api_key: Some("static-key".to_string()),
            ..Credentials::default()
        }
    }

    #[test]
    fn api_key_alone_sends_only_the_key_header() {
        let headers = with_key().auth_headers();
        assert_eq!(headers.get(API_KEY_HEADER), Some(&"static-key".to_string()));
        assert!(!headers.contains_key(AUTHORIZATION_HEADER));
    }

    #[test]
    fn no_credentials_sends_no_headers() {
        assert!(Credentials::default().auth_headers().is_empty());
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let credentials = Credentials {
            api_key: Some("static-key".to_string()),
            bearer_token: Some("tok".to_string()),
            username: Some("alice".to_string()),
            password: Some("hunter2".to_string()),
        };
        let rendered = format!("{credentials:?}");
        assert!(!rendered.contains("static-key"));
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("alice"));
    }

    #[test]
    fn login_pair_requires_both_halves() {
        let mut credentials = Credentials {
            username: Some("alice".to_string()),
            ..Credentials::default()
        };
        assert!(credentials.login_pair().is_none());
        credentials.password = Some("secret".to_string());
        assert_eq!(
            credentials.login_pair(),
            Some(("alice".to_string(), "secret".to_string()))
        );
    }

    #[tokio::test]
    async fn installing_a_token_drops_the_api_key() {
        let state = AuthState::new(with_key());
        let before = state.generation();

        state.install_token("fresh".to_string()).await;

        let snapshot = state.snapshot().await;
        assert_eq!(snapshot.bearer_token.as_deref(), Some("fresh"));
        assert!(snapshot.api_key.is_none());
        assert!(state.generation() > before);
    }

    #[tokio::test]
    async fn clearing_tokens_removes_both_credentials() {
        let state = AuthState::new(Credentials {
            bearer_token: Some("old".to_string()),
            ..with_key()
        });

        state.clear_tokens().await;

        let (headers, _) = state.headers().await;
        assert!(headers.is_empty());
    }

    #[test]
    fn retry_budget_is_bounded() {
        let state = AuthState::default();
        assert_eq!(state.try_begin_retry(2), Some(1));
        assert_eq!(state.try_begin_retry(2), Some(2));
        assert_eq!(state.try_begin_retry(2), None);
        assert_eq!(state.retry_count(), 2);

        state.reset_retries();
        assert_eq!(state.retry_count(), 0);
    }
}
