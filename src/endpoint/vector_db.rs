use serde_json::Value;

use crate::error::ApiError;
use crate::executor::Executor;

use super::endpoint_url;

pub struct VectorDbEndpoint<'a> {
    executor: &'a Executor,
}

impl<'a> VectorDbEndpoint<'a> {
    pub fn new(executor: &'a Executor) -> Self {
        Self { executor }
    }

    pub async fn list_collections(&self) -> Result<Value, ApiError> {
        let url = endpoint_url(self.executor, &["vector-db", "collections"])?;
        self.executor.get(&url).await
    }

    pub async fn get_collection(&self, name: &str) -> Result<Value, ApiError> {
        let url = endpoint_url(self.executor, &["vector-db", "collections", name])?;
        self.executor.get(&url).await
    }
}
