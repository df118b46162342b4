use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::credentials::Credentials;
use crate::error::ApiError;

/// Public deployment of the service.
pub const DEFAULT_BASE_URL: &str = "https://api.mathislambert.fr/v1";

/// Client configuration. Every field has a default so partial documents deserialize.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    /// Token obtained out of band; wins over `api_key` when both are set.
    pub bearer_token: Option<String>,
    /// Username and password enable silent re-authentication after a 401.
    pub username: Option<String>,
    pub password: Option<String>,
    /// Total deadline of one request attempt, also used as connect timeout.
    #[serde(with = "secs")]
    pub timeout: Duration,
    /// Deadline of one streaming attempt; unbounded when unset.
    #[serde(with = "opt_secs")]
    pub stream_timeout: Option<Duration>,
    pub max_retries: u32,
    /// Base of the linear re-authentication backoff.
    #[serde(with = "secs")]
    pub retry_delay: Duration,
    pub max_stream_retries: u32,
    /// Base of the exponential stream reconnect backoff.
    #[serde(with = "secs")]
    pub stream_retry_delay: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            bearer_token: None,
            username: None,
            password: None,
            timeout: Duration::from_secs(60),
            stream_timeout: None,
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
            max_stream_retries: 3,
            stream_retry_delay: Duration::from_secs(1),
        }
    }
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("base_url", &self.base_url)
            .field("credentials", &self.credentials())
            .field("timeout", &self.timeout)
            .field("stream_timeout", &self.stream_timeout)
            .field("max_retries", &self.max_retries)
            .field("retry_delay", &self.retry_delay)
            .field("max_stream_retries", &self.max_stream_retries)
            .field("stream_retry_delay", &self.stream_retry_delay)
            .finish()
    }
}

/// Retry knobs consumed by the executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub max_stream_retries: u32,
    pub stream_retry_delay: Duration,
}

impl ClientConfig {
    /// Reads configuration from `ML_API_*` environment variables on top of the defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::InvalidConfig`] when a numeric variable cannot be parsed.
    pub fn from_env() -> Result<Self, ApiError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`ClientConfig::from_env`] with a caller-supplied lookup.
    ///
    /// Blank values are treated as unset.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::collections::HashMap;
    /// use ml_api_client::config::ClientConfig;
    ///
    /// let vars = HashMap::from([("ML_API_MAX_RETRIES", "5"), ("ML_API_KEY", "k")]);
    /// let config = ClientConfig::from_lookup(|key| vars.get(key).map(|v| v.to_string())).unwrap();
    /// assert_eq!(config.max_retries, 5);
    /// assert_eq!(config.api_key.as_deref(), Some("k"));
    /// ```
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ApiError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let mut config = Self::default();

        if let Some(base_url) = get("ML_API_BASE_URL") {
            config.base_url = base_url;
        }
        config.api_key = get("ML_API_KEY");
        config.username = get("ML_API_USERNAME");
        config.password = get("ML_API_PASSWORD");
        if let Some(value) = get("ML_API_TIMEOUT") {
            config.timeout = parse_secs("ML_API_TIMEOUT", &value)?;
        }
        if let Some(value) = get("ML_API_MAX_RETRIES") {
            config.max_retries = parse_count("ML_API_MAX_RETRIES", &value)?;
        }
        if let Some(value) = get("ML_API_RETRY_DELAY") {
            config.retry_delay = parse_secs("ML_API_RETRY_DELAY", &value)?;
        }
        if let Some(value) = get("ML_API_MAX_STREAM_RETRIES") {
            config.max_stream_retries = parse_count("ML_API_MAX_STREAM_RETRIES", &value)?;
        }
        if let Some(value) = get("ML_API_STREAM_RETRY_DELAY") {
            config.stream_retry_delay = parse_secs("ML_API_STREAM_RETRY_DELAY", &value)?;
        }
        Ok(config)
    }

    /// Checks the configuration and normalizes the base URL.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::InvalidConfig`] naming the first offending field.
    pub fn validate(mut self) -> Result<Self, ApiError> {
        let base_url = self.base_url.trim().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(ApiError::invalid_config("base_url", "must not be empty"));
        }
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ApiError::invalid_config(
                "base_url",
                format!("unsupported scheme in {base_url}"),
            ));
        }
        if self.timeout.is_zero() {
            return Err(ApiError::invalid_config("timeout", "must be greater than zero"));
        }
        if self.stream_timeout.is_some_and(|timeout| timeout.is_zero()) {
            return Err(ApiError::invalid_config(
                "stream_timeout",
                "must be greater than zero when set",
            ));
        }
        self.base_url = base_url;
        Ok(self)
    }

    /// Initial credential values.
    pub fn credentials(&self) -> Credentials {
        Credentials {
            api_key: self.api_key.clone(),
            bearer_token: self.bearer_token.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            retry_delay: self.retry_delay,
            max_stream_retries: self.max_stream_retries,
            stream_retry_delay: self.stream_retry_delay,
        }
    }
}

fn parse_secs(field: &str, value: &str) -> Result<Duration, ApiError> {
    let secs: f64 = value
        .trim()
        .parse()
        .map_err(|err| ApiError::invalid_config(field, format!("{value:?} is not a number: {err}")))?;
    Duration::try_from_secs_f64(secs)
        .map_err(|err| ApiError::invalid_config(field, format!("{value:?} is not a duration: {err}")))
}

fn parse_count(field: &str, value: &str) -> Result<u32, ApiError> {
    value
        .trim()
        .parse()
        .map_err(|err| ApiError::invalid_config(field, format!("{value:?} is not a count: {err}")))
}

/// Durations as floating-point seconds.
mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer, de::Error as _};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(D::Error::custom)
    }
}

mod opt_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer, de::Error as _};

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(duration) => serializer.serialize_some(&duration.as_secs_f64()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Option::<f64>::deserialize(deserializer)?
            .map(|secs| Duration::try_from_secs_f64(secs).map_err(D::Error::custom))
            .transpose()
    }
}
