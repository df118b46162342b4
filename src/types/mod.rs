//! Request and response bodies of the service endpoints.
//!
//! Request types carry the service's documented defaults, so
//! `..Default::default()` produces a valid body. Response types only model
//! what the endpoints are known to return; listing endpoints whose shape is
//! not fixed are exposed as raw [`serde_json::Value`].

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Body of `POST /chat/completions`.
///
/// # Examples
///
/// ```
/// # use ml_api_client::types::ChatCompletionsRequest;
/// let request = ChatCompletionsRequest {
///     input: "Answer 'yes' or 'no' only.".into(),
///     ..ChatCompletionsRequest::default()
/// };
/// assert_eq!(request.model, "mistral-small-latest");
/// assert!(!request.stream);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatCompletionsRequest {
    pub model: String,
    /// User turn to answer.
    pub input: String,
    /// System prompt.
    pub prompt: String,
    /// Previous turns, passed through verbatim.
    pub history: Vec<HashMap<String, Value>>,
    pub temperature: f64,
    pub max_tokens: u32,
    pub top_p: f64,
    pub stream: bool,
}

impl Default for ChatCompletionsRequest {
    fn default() -> Self {
        Self {
            model: "mistral-small-latest".to_string(),
            input: "Hello, how are you?".to_string(),
            prompt: "You are a helpful assistant.".to_string(),
            history: Vec::new(),
            temperature: 0.7,
            max_tokens: 512,
            top_p: 1.0,
            stream: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionResponse {
    pub response: String,
    pub job_id: String,
}

/// Body of the embeddings endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingsRequest {
    pub chunks: Vec<String>,
    pub model: String,
    #[serde(default = "default_encoding_format")]
    pub encoding_format: String,
}

impl EmbeddingsRequest {
    pub fn new(chunks: Vec<String>, model: impl Into<String>) -> Self {
        Self {
            chunks,
            model: model.into(),
            encoding_format: default_encoding_format(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingsResponse {
    pub embeddings: Vec<Embedding>,
    pub job_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub index: usize,
    pub embedding: Vec<f32>,
    #[serde(default)]
    pub payload: HashMap<String, Value>,
    pub object: String,
}

/// Body of `POST /rag/encode/{collection}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RagEncodeRequest {
    pub chunks: Vec<String>,
    pub model: String,
    pub encoding_format: String,
}

impl Default for RagEncodeRequest {
    fn default() -> Self {
        Self {
            chunks: Vec::new(),
            model: DEFAULT_EMBEDDING_MODEL.to_string(),
            encoding_format: default_encoding_format(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RagEncodeResponse {
    pub collection_name: String,
    pub success: bool,
}

/// Body of `POST /rag/retrieve/{collection}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RagRetrieveRequest {
    pub query: String,
    pub model: String,
    /// Maximum number of results.
    pub limit: u32,
}

impl Default for RagRetrieveRequest {
    fn default() -> Self {
        Self {
            query: String::new(),
            model: DEFAULT_EMBEDDING_MODEL.to_string(),
            limit: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RagRetrieveResponse {
    pub collection_name: String,
    pub results: Vec<RetrieveResult>,
    pub success: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrieveResult {
    pub score: f64,
    #[serde(default)]
    pub payload: HashMap<String, Value>,
}

/// Body of `POST /auth/token`.
#[derive(Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
    /// Requested token lifetime.
    pub expires_in: u32,
}

impl std::fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginRequest")
            .field("username", &self.username)
            .field("expires_in", &self.expires_in)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
}

impl std::fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenResponse")
            .field("token_type", &self.token_type)
            .finish_non_exhaustive()
    }
}

/// Body of `POST /auth/register`.
#[derive(Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

impl std::fmt::Debug for RegisterRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisterRequest")
            .field("username", &self.username)
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub msg: String,
    #[serde(default)]
    pub user: HashMap<String, Value>,
}

/// Body of `POST /auth/api-key`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiKeyRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u32>,
}

#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiKeyResponse {
    pub api_key: String,
    pub expires_at: Option<String>,
}

impl std::fmt::Debug for ApiKeyResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiKeyResponse")
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

/// Capabilities advertised by a model card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelCapabilities {
    pub completion_chat: bool,
    pub completion_fim: bool,
    pub function_calling: bool,
    pub fine_tuning: bool,
    pub vision: bool,
}

impl Default for ModelCapabilities {
    fn default() -> Self {
        Self {
            completion_chat: true,
            completion_fim: false,
            function_calling: true,
            fine_tuning: false,
            vision: false,
        }
    }
}

/// Fields shared by base and fine-tuned model cards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelCardInfo {
    pub id: String,
    #[serde(default)]
    pub capabilities: ModelCapabilities,
    pub object: Option<String>,
    pub created: Option<i64>,
    pub owned_by: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub max_context_length: Option<u64>,
    #[serde(default)]
    pub aliases: Vec<String>,
    pub deprecation: Option<String>,
    pub default_model_temperature: Option<f64>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

/// A model card as returned by `GET /models/{id}`.
///
/// Fine-tuned cards carry the originating `job` and `root` model; the variant
/// is picked by the presence of those fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ModelCard {
    FineTuned {
        #[serde(flatten)]
        info: ModelCardInfo,
        job: String,
        root: String,
        #[serde(default)]
        archived: bool,
    },
    Base {
        #[serde(flatten)]
        info: ModelCardInfo,
    },
}

impl ModelCard {
    pub fn info(&self) -> &ModelCardInfo {
        match self {
            ModelCard::FineTuned { info, .. } | ModelCard::Base { info } => info,
        }
    }

    pub fn id(&self) -> &str {
        &self.info().id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetModelResponse {
    pub model: ModelCard,
}

/// Default embedding model for RAG requests.
pub const DEFAULT_EMBEDDING_MODEL: &str = "mistral-embed";

fn default_encoding_format() -> String {
    "float".to_string()
}
