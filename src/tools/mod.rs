//! Name-keyed tool handlers the remote assistant can ask us to run.

pub mod phase;
pub mod sheet;

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

use crate::config::ToolsConfig;

pub use phase::PhaseTool;
pub use sheet::SheetRowTool;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),
    #[error("invalid tool args: {0}")]
    InvalidArguments(String),
    #[error("tool timed out after {0} ms")]
    Timeout(u128),
    #[error("{0:#}")]
    Failed(anyhow::Error),
}

impl From<anyhow::Error> for ToolError {
    fn from(e: anyhow::Error) -> Self {
        ToolError::Failed(e)
    }
}

/// A locally fulfilled tool. Whatever string it returns is submitted verbatim
/// as the call's output.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn invoke(&self, args: &serde_json::Value) -> Result<String, ToolError>;
}

/// Read-only after startup; shared across sessions without locking.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    handlers: HashMap<String, Arc<dyn ToolHandler>>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tool(mut self, name: impl Into<String>, handler: Arc<dyn ToolHandler>) -> Self {
        self.handlers.insert(name.into(), handler);
        self
    }

    /// Built-in tools enabled by configuration.
    pub fn from_config(cfg: &ToolsConfig) -> Result<Self> {
        let mut registry = Self::new().with_tool(cfg.phase_tool.clone(), Arc::new(PhaseTool));
        if let Some(sheet) = &cfg.sheet {
            registry = registry.with_tool(
                sheet::SHEET_TOOL_NAME,
                Arc::new(SheetRowTool::new(sheet.clone())?),
            );
        }
        Ok(registry)
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<dyn ToolHandler>> {
        self.handlers.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SheetConfig;

    #[test]
    fn from_config_registers_phase_tool_only_by_default() {
        let registry = ToolRegistry::from_config(&ToolsConfig::default()).unwrap();
        assert_eq!(registry.names(), vec!["update_phase"]);
        assert!(registry.lookup("append_sheet_row").is_none());
    }

    #[test]
    fn from_config_honours_phase_name_and_sheet() {
        let cfg = ToolsConfig {
            phase_tool: "set_phase".into(),
            sheet: Some(SheetConfig {
                webhook_url: "http://localhost/append".into(),
                token: None,
                columns: vec!["name".into()],
            }),
        };
        let registry = ToolRegistry::from_config(&cfg).unwrap();
        assert_eq!(registry.names(), vec!["append_sheet_row", "set_phase"]);
        assert!(registry.lookup("update_phase").is_none());
    }

    #[test]
    fn tool_error_display() {
        assert_eq!(
            ToolError::UnknownTool("nope".into()).to_string(),
            "unknown tool: nope"
        );
        let err = ToolError::from(anyhow::anyhow!("disk full").context("write row"));
        assert_eq!(err.to_string(), "write row: disk full");
    }
}
