use serde_json::Value;

use crate::error::ApiError;
use crate::executor::Executor;
use crate::types::GetModelResponse;

use super::{decode, endpoint_url};

/// Model catalogue.
pub struct ModelsEndpoint<'a> {
    executor: &'a Executor,
}

impl<'a> ModelsEndpoint<'a> {
    pub fn new(executor: &'a Executor) -> Self {
        Self { executor }
    }

    pub async fn list_models(&self) -> Result<Value, ApiError> {
        let url = endpoint_url(self.executor, &["models", ""])?;
        self.executor.get(&url).await
    }

    /// Fetches one model card.
    ///
    /// # Errors
    ///
    /// [`ApiError::NotFound`] if no model has that id.
    pub async fn retrieve_model(&self, model_id: &str) -> Result<GetModelResponse, ApiError> {
        let url = endpoint_url(self.executor, &["models", model_id])?;
        let value = self.executor.get(&url).await?;
        decode("model", value)
    }
}
