use thiserror::Error;

/// Aggregates every failure mode exposed by the ML API client.
///
/// Authentication failures are absorbed by the executor up to the configured
/// retry budget, so a caller only sees [`ApiError::PermissionDenied`] once no
/// usable re-authentication path remains. Everything else surfaces unchanged.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The credentials were rejected (401 without a usable re-auth path, or 403).
    #[error("permission denied: {message}")]
    PermissionDenied { message: String },
    /// The addressed resource does not exist.
    #[error("not found: {resource}: {message}")]
    NotFound {
        /// Path or identifier of the resource that could not be resolved.
        resource: String,
        /// Message returned by the service.
        message: String,
    },
    /// Re-authentication was attempted as many times as allowed and the
    /// service kept answering 401.
    #[error("retry budget exceeded after {attempts} re-authentication attempts")]
    RetryBudgetExceeded { attempts: u32 },
    /// A stream could not be re-established within the reconnect budget.
    #[error("stream retry budget exceeded after {attempts} reconnect attempts: {message}")]
    StreamRetryBudgetExceeded {
        /// Number of reconnect attempts made before giving up.
        attempts: u32,
        /// Description of the last failure observed.
        message: String,
    },
    /// Represents transport-layer or networking failures.
    #[error("connection failure: {message}")]
    ConnectionFailure { message: String },
    /// The per-attempt deadline elapsed.
    #[error("request timed out: {message}")]
    Timeout { message: String },
    /// Any other non-success status returned by the service.
    #[error("api error (status {status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Server-provided message, or the status line when the body was empty.
        message: String,
    },
    /// The request payload could not be serialized.
    #[error("invalid request: {message}")]
    Validation { message: String },
    /// A response body was not valid JSON, or a stream chunk was not valid UTF-8.
    #[error("failed to decode response: {message}")]
    Decode { message: String },
    /// Raised when building or validating configuration fails.
    #[error("invalid configuration for {field}: {reason}")]
    InvalidConfig {
        /// Name of the configuration field that failed validation.
        field: String,
        /// Additional context explaining why the field is invalid.
        reason: String,
    },
}

impl ApiError {
    /// Creates an [`ApiError::ConnectionFailure`] from a textual description.
    ///
    /// # Examples
    ///
    /// ```
    /// use ml_api_client::error::ApiError;
    ///
    /// let err = ApiError::connection("connection refused");
    /// assert!(matches!(err, ApiError::ConnectionFailure { .. }));
    /// ```
    pub fn connection<T: Into<String>>(message: T) -> Self {
        Self::ConnectionFailure {
            message: message.into(),
        }
    }

    /// Creates an [`ApiError::Timeout`] from a textual description.
    pub fn timeout<T: Into<String>>(message: T) -> Self {
        Self::Timeout {
            message: message.into(),
        }
    }

    /// Creates an [`ApiError::PermissionDenied`] from a textual description.
    pub fn permission_denied<T: Into<String>>(message: T) -> Self {
        Self::PermissionDenied {
            message: message.into(),
        }
    }

    /// Creates an [`ApiError::Decode`] from a textual description.
    pub fn decode<T: Into<String>>(message: T) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Creates an [`ApiError::InvalidConfig`] for the named field.
    ///
    /// # Examples
    ///
    /// ```
    /// use ml_api_client::error::ApiError;
    ///
    /// let err = ApiError::invalid_config("timeout", "must be greater than zero");
    /// assert_eq!(
    ///     err.to_string(),
    ///     "invalid configuration for timeout: must be greater than zero"
    /// );
    /// ```
    pub fn invalid_config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Returns `true` for failures a reconnecting stream may recover from.
    pub(crate) fn is_transient(&self) -> bool {
        matches!(self, Self::ConnectionFailure { .. } | Self::Timeout { .. })
    }
}

/// Maps a non-success status and its body onto the error taxonomy.
///
/// `resource` names what was addressed and is carried by [`ApiError::NotFound`].
pub(crate) fn classify_status(status: u16, resource: &str, body: &str) -> ApiError {
    let message = extract_message(status, body);
    match status {
        401 | 403 => ApiError::PermissionDenied { message },
        404 => ApiError::NotFound {
            resource: resource.to_string(),
            message,
        },
        _ => ApiError::Api { status, message },
    }
}

/// Pulls a human-readable message out of an error body.
///
/// The service answers errors as `{"detail": ...}` where `detail` is either a
/// string or a list of validation entries; anything else is returned verbatim.
pub(crate) fn extract_message(status: u16, body: &str) -> String {
    if let Ok(serde_json::Value::Object(map)) = serde_json::from_str::<serde_json::Value>(body) {
        match map.get("detail") {
            Some(serde_json::Value::String(detail)) => return detail.clone(),
            Some(detail @ serde_json::Value::Array(_)) => return detail.to_string(),
            _ => {}
        }
        if let Some(serde_json::Value::String(message)) = map.get("message") {
            return message.clone();
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        format!("status {status}")
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_is_never_a_generic_api_error() {
        let err = classify_status(404, "/models/ghost", r#"{"detail":"Model not found"}"#);
        match err {
            ApiError::NotFound { resource, message } => {
                assert_eq!(resource, "/models/ghost");
                assert_eq!(message, "Model not found");
            }
            other => panic!("unexpected error type: {other:?}"),
        }
    }

    #[test]
    fn forbidden_maps_to_permission_denied() {
        let err = classify_status(403, "/vector-db/collections", "");
        assert!(matches!(err, ApiError::PermissionDenied { .. }));
    }

    #[test]
    fn other_statuses_carry_status_and_message() {
        let err = classify_status(502, "/chat/completions", "upstream unavailable");
        match err {
            ApiError::Api { status, message } => {
                assert_eq!(status, 502);
                assert_eq!(message, "upstream unavailable");
            }
            other => panic!("unexpected error type: {other:?}"),
        }
    }

    #[test]
    fn validation_detail_lists_are_kept_as_json() {
        let body = r#"{"detail":[{"loc":["body","chunks"],"msg":"field required"}]}"#;
        let message = extract_message(422, body);
        assert!(message.contains("field required"), "unexpected: {message}");
    }

    #[test]
    fn empty_body_falls_back_to_status() {
        assert_eq!(extract_message(500, "  "), "status 500");
    }
}
