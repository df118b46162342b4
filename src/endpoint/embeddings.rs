use crate::error::ApiError;
use crate::executor::Executor;
use crate::types::{EmbeddingsRequest, EmbeddingsResponse};

use super::{decode, endpoint_url};

pub struct EmbeddingsEndpoint<'a> {
    executor: &'a Executor,
}

impl<'a> EmbeddingsEndpoint<'a> {
    pub fn new(executor: &'a Executor) -> Self {
        Self { executor }
    }

    /// Embeds every chunk of `request` with the requested model.
    pub async fn get_embeddings(
        &self,
        request: &EmbeddingsRequest,
    ) -> Result<EmbeddingsResponse, ApiError> {
        let url = endpoint_url(self.executor, &["embeddings", ""])?;
        let value = self.executor.post(&url, request).await?;
        decode("embeddings", value)
    }
}
