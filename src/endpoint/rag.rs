use crate::error::ApiError;
use crate::executor::Executor;
use crate::types::{RagEncodeRequest, RagEncodeResponse, RagRetrieveRequest, RagRetrieveResponse};

use super::{decode, endpoint_url};

/// Retrieval-augmented generation over named collections.
pub struct RagEndpoint<'a> {
    executor: &'a Executor,
}

impl<'a> RagEndpoint<'a> {
    pub fn new(executor: &'a Executor) -> Self {
        Self { executor }
    }

    /// Embeds `request.chunks` and stores them in `collection`.
    pub async fn encode(
        &self,
        collection: &str,
        request: &RagEncodeRequest,
    ) -> Result<RagEncodeResponse, ApiError> {
        let url = endpoint_url(self.executor, &["rag", "encode", collection])?;
        let value = self.executor.post(&url, request).await?;
        decode("rag encode", value)
    }

    /// Returns the stored chunks closest to `request.query`, best first.
    pub async fn retrieve(
        &self,
        collection: &str,
        request: &RagRetrieveRequest,
    ) -> Result<RagRetrieveResponse, ApiError> {
        let url = endpoint_url(self.executor, &["rag", "retrieve", collection])?;
        let value = self.executor.post(&url, request).await?;
        decode("rag retrieve", value)
    }
}
