use crate::error::ApiError;
use crate::executor::{ByteStream, Executor, TextStream};
use crate::http::HttpMethod;
use crate::types::{ChatCompletionResponse, ChatCompletionsRequest};

use super::{decode, endpoint_url};

/// Chat completions, buffered or streamed.
pub struct ChatEndpoint<'a> {
    executor: &'a Executor,
}

impl<'a> ChatEndpoint<'a> {
    pub fn new(executor: &'a Executor) -> Self {
        Self { executor }
    }

    /// Requests a full completion. `stream` is forced off.
    pub async fn get_completions(
        &self,
        request: ChatCompletionsRequest,
    ) -> Result<ChatCompletionResponse, ApiError> {
        let request = ChatCompletionsRequest {
            stream: false,
            ..request
        };
        let url = self.url()?;
        let value = self.executor.post(&url, &request).await?;
        decode("chat completion", value)
    }

    /// Streams the completion as raw chunks. `stream` is forced on.
    ///
    /// Interrupted connections are resumed transparently; see
    /// [`Executor::stream`].
    pub fn stream_completions(
        &self,
        request: ChatCompletionsRequest,
    ) -> Result<ByteStream, ApiError> {
        let request = ChatCompletionsRequest {
            stream: true,
            ..request
        };
        self.executor
            .stream(HttpMethod::Post, self.url()?, Some(&request))
    }

    /// Streams the completion as UTF-8 text.
    pub fn stream_completions_text(
        &self,
        request: ChatCompletionsRequest,
    ) -> Result<TextStream, ApiError> {
        let request = ChatCompletionsRequest {
            stream: true,
            ..request
        };
        self.executor
            .stream_text(HttpMethod::Post, self.url()?, Some(&request))
    }

    fn url(&self) -> Result<String, ApiError> {
        endpoint_url(self.executor, &["chat", "completions"])
    }
}
