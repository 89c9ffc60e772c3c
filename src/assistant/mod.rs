//! Client side of the remote assistants job API.
//!
//! The core never talks HTTP directly; it goes through [`AssistantApi`], which
//! [`AssistantsClient`] implements against the OpenAI Assistants v2 endpoints.

mod client_core;
pub mod types;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::StatusCode;

pub use client_core::*;
pub use types::*;

/// Operations the run orchestration consumes from the remote service.
#[async_trait]
pub trait AssistantApi: Send + Sync {
    async fn create_thread(&self) -> Result<Thread>;

    async fn create_message(&self, thread_id: &str, content: &str) -> Result<()>;

    async fn create_run(&self, thread_id: &str, assistant_id: &str) -> Result<Run>;

    async fn retrieve_run(&self, thread_id: &str, run_id: &str) -> Result<Run>;

    async fn submit_tool_outputs(
        &self,
        thread_id: &str,
        run_id: &str,
        outputs: &[ToolCallOutput],
    ) -> Result<Run>;

    /// Messages produced by `run_id`, oldest first.
    async fn list_messages(&self, thread_id: &str, run_id: &str) -> Result<Vec<Message>>;

    /// Execution steps of `run_id`, oldest first.
    async fn list_run_steps(&self, thread_id: &str, run_id: &str) -> Result<Vec<RunStep>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiErrorKind {
    RateLimited,
    Server,
    Network,
    Timeout,
    Client,
    Deserialize,
    Unknown,
}

/// Non-success HTTP answer from the remote service.
#[derive(Debug, thiserror::Error)]
#[error("assistants api error: {status} - {body}")]
pub struct ApiStatusError {
    pub status: StatusCode,
    pub body: String,
}

pub fn classify_error(status: Option<StatusCode>, err: &anyhow::Error) -> ApiErrorKind {
    let status = status.or_else(|| err.downcast_ref::<ApiStatusError>().map(|e| e.status));
    if let Some(st) = status {
        if st == StatusCode::TOO_MANY_REQUESTS {
            return ApiErrorKind::RateLimited;
        }
        if st.is_server_error() {
            return ApiErrorKind::Server;
        }
        if st.is_client_error() {
            return ApiErrorKind::Client;
        }
    }
    if let Some(e) = err.downcast_ref::<reqwest::Error>() {
        if e.is_timeout() {
            return ApiErrorKind::Timeout;
        }
        if e.is_connect() || e.is_body() || e.is_request() {
            return ApiErrorKind::Network;
        }
        if e.is_decode() {
            return ApiErrorKind::Deserialize;
        }
    }
    if err.downcast_ref::<serde_json::Error>().is_some() {
        return ApiErrorKind::Deserialize;
    }
    ApiErrorKind::Unknown
}
