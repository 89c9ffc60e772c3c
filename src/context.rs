use anyhow::{Context, Result};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::assistant::{AssistantApi, AssistantsClient};
use crate::config::{AppConfig, RunConfig};
use crate::tools::ToolRegistry;

/// Everything a session needs, built once at startup and only read afterwards.
#[derive(Clone)]
pub struct AppContext {
    pub api: Arc<dyn AssistantApi>,
    pub registry: Arc<ToolRegistry>,
    pub assistant_id: String,
    pub phase_tool: String,
    pub run: RunConfig,
    pub shutdown: CancellationToken,
}

impl std::fmt::Debug for AppContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppContext")
            .field("assistant_id", &self.assistant_id)
            .field("phase_tool", &self.phase_tool)
            .field("registry", &self.registry)
            .field("run", &self.run)
            .finish()
    }
}

impl AppContext {
    pub fn from_config(cfg: &AppConfig, shutdown: CancellationToken) -> Result<Self> {
        let api_key = cfg
            .api_key
            .clone()
            .context("OPENAI_API_KEY not set; cannot reach the assistants api")?;
        let assistant_id = cfg
            .assistant_id
            .clone()
            .context("ASSISTANT_ID not set; no assistant to run")?;
        let client = AssistantsClient::new(cfg.base_url.clone(), api_key)?
            .with_http_config(cfg.http.clone())?;
        let registry = ToolRegistry::from_config(&cfg.tools)?;

        Ok(Self {
            api: Arc::new(client),
            registry: Arc::new(registry),
            assistant_id,
            phase_tool: cfg.tools.phase_tool.clone(),
            run: cfg.run.clone(),
            shutdown,
        })
    }
}
