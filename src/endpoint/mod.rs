//! Endpoint callers: URL and payload templating over the [`Executor`].
//!
//! Each group borrows the executor and turns typed requests into calls to
//! [`Executor::get`], [`Executor::post`] or [`Executor::stream`].

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::ApiError;
use crate::executor::Executor;

pub mod auth;
pub mod chat;
pub mod embeddings;
pub mod models;
pub mod rag;
pub mod vector_db;

pub use auth::AuthEndpoint;
pub use chat::ChatEndpoint;
pub use embeddings::EmbeddingsEndpoint;
pub use models::ModelsEndpoint;
pub use rag::RagEndpoint;
pub use vector_db::VectorDbEndpoint;

/// Joins `segments` onto the executor's base URL, percent-encoding each one.
///
/// An empty trailing segment produces a trailing slash, which some routes
/// require (`/models/`).
pub(crate) fn endpoint_url(executor: &Executor, segments: &[&str]) -> Result<String, ApiError> {
    let mut url = reqwest::Url::parse(executor.base_url())
        .map_err(|err| ApiError::invalid_config("base_url", err.to_string()))?;
    url.path_segments_mut()
        .map_err(|_| ApiError::invalid_config("base_url", "cannot be a base URL"))?
        .pop_if_empty()
        .extend(segments);
    Ok(url.into())
}

/// Decodes an executor result into the endpoint's response type.
pub(crate) fn decode<T: DeserializeOwned>(endpoint: &str, value: Value) -> Result<T, ApiError> {
    serde_json::from_value(value)
        .map_err(|err| ApiError::decode(format!("unexpected {endpoint} response: {err}")))
}
