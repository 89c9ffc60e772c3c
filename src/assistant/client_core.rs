use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Method;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, warn};

use crate::assistant::AssistantApi;
use crate::assistant::types::{
    CreateMessageRequest, CreateRunRequest, ListResponse, Message, Run, RunStep,
    SubmitToolOutputsRequest, Thread, ToolCallOutput,
};
use crate::config::HttpConfig;

mod network;

const LIST_LIMIT: u32 = 100;

#[derive(Debug, Clone)]
pub struct AssistantsClient {
    pub base_url: String,
    pub api_key: String,
    pub(crate) inner: reqwest::Client,
    pub http_cfg: HttpConfig,
}

impl AssistantsClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self> {
        let inner = reqwest::Client::builder().build()?;
        Ok(Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            inner,
            http_cfg: HttpConfig::default(),
        })
    }

    pub fn with_http_config(mut self, cfg: HttpConfig) -> Result<Self> {
        self.inner = reqwest::Client::builder()
            .connect_timeout(Duration::from_millis(cfg.connect_timeout_ms))
            .timeout(Duration::from_millis(cfg.request_timeout_ms))
            .build()
            .context("build http client")?;
        self.http_cfg = cfg;
        Ok(self)
    }

    /// `{base}/v1/{path}`, tolerating a base URL with or without `/v1`.
    pub(crate) fn endpoint(&self, path: &str) -> String {
        let base = self.base_url.trim_end_matches('/');
        let base = base.strip_suffix("/v1").unwrap_or(base).trim_end_matches('/');
        format!("{base}/v1/{}", path.trim_start_matches('/'))
    }
}

/// Ids are spliced into the path; anything beyond `[A-Za-z0-9_-]` is refused.
fn segment(id: &str) -> Result<&str> {
    let ok = !id.is_empty()
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-');
    if !ok {
        anyhow::bail!("invalid id for url path: {id:?}");
    }
    Ok(id)
}

#[async_trait]
impl AssistantApi for AssistantsClient {
    async fn create_thread(&self) -> Result<Thread> {
        let url = self.endpoint("threads");
        network::send_once(self, Method::POST, &url, Some(json!({})))
            .await
            .context("create thread")
    }

    async fn create_message(&self, thread_id: &str, content: &str) -> Result<()> {
        let thread_id = segment(thread_id).context("create message")?;
        let url = self.endpoint(&format!("threads/{thread_id}/messages"));
        let body = serde_json::to_value(CreateMessageRequest {
            role: "user",
            content,
        })?;
        let _: serde_json::Value = network::send_once(self, Method::POST, &url, Some(body))
            .await
            .context("create message")?;
        Ok(())
    }

    async fn create_run(&self, thread_id: &str, assistant_id: &str) -> Result<Run> {
        let thread_id = segment(thread_id).context("create run")?;
        let url = self.endpoint(&format!("threads/{thread_id}/runs"));
        let body = serde_json::to_value(CreateRunRequest { assistant_id })?;
        network::send_once(self, Method::POST, &url, Some(body))
            .await
            .context("create run")
    }

    async fn retrieve_run(&self, thread_id: &str, run_id: &str) -> Result<Run> {
        let (thread_id, run_id) = (segment(thread_id)?, segment(run_id)?);
        let url = self.endpoint(&format!("threads/{thread_id}/runs/{run_id}"));
        network::get_with_retry(self, &url)
            .await
            .context("retrieve run")
    }

    async fn submit_tool_outputs(
        &self,
        thread_id: &str,
        run_id: &str,
        outputs: &[ToolCallOutput],
    ) -> Result<Run> {
        let (thread_id, run_id) = (segment(thread_id)?, segment(run_id)?);
        let url = self.endpoint(&format!(
            "threads/{thread_id}/runs/{run_id}/submit_tool_outputs"
        ));
        let body = serde_json::to_value(SubmitToolOutputsRequest {
            tool_outputs: outputs,
        })?;
        debug!(run_id, outputs = outputs.len(), "submitting tool outputs");
        network::send_once(self, Method::POST, &url, Some(body))
            .await
            .context("submit tool outputs")
    }

    async fn list_messages(&self, thread_id: &str, run_id: &str) -> Result<Vec<Message>> {
        let (thread_id, run_id) = (segment(thread_id)?, segment(run_id)?);
        let url = self.endpoint(&format!(
            "threads/{thread_id}/messages?order=asc&limit={LIST_LIMIT}&run_id={run_id}"
        ));
        let page: ListResponse<Message> = network::get_with_retry(self, &url)
            .await
            .context("list messages")?;
        if page.has_more {
            warn!(thread_id, run_id, limit = LIST_LIMIT, "message list truncated");
        }
        Ok(page.data)
    }

    async fn list_run_steps(&self, thread_id: &str, run_id: &str) -> Result<Vec<RunStep>> {
        let (thread_id, run_id) = (segment(thread_id)?, segment(run_id)?);
        let url = self.endpoint(&format!(
            "threads/{thread_id}/runs/{run_id}/steps?order=asc&limit={LIST_LIMIT}"
        ));
        let page: ListResponse<RunStep> = network::get_with_retry(self, &url)
            .await
            .context("list run steps")?;
        if page.has_more {
            warn!(thread_id, run_id, limit = LIST_LIMIT, "run step list truncated");
        }
        Ok(page.data)
    }
}
