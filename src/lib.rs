//! Client library for the ML inference service.
//!
//! Requests go through one [`Executor`] per client, which opens the HTTP
//! session lazily, injects credentials, logs in again after a 401 within a
//! bounded budget and maps failures onto [`ApiError`]. Streaming responses
//! reconnect with exponential backoff.

pub mod auth;
pub mod client;
pub mod config;
pub mod credentials;
pub mod endpoint;
pub mod error;
pub mod executor;
pub mod http;
pub mod session;
pub mod types;

pub use client::{MlApiClient, MlApiClientBuilder};
pub use config::{ClientConfig, RetryPolicy};
pub use credentials::Credentials;
pub use error::ApiError;
pub use executor::{ByteStream, Executor, TextStream};
