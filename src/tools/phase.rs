use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::{ToolError, ToolHandler};

/// Echoes the requested phase back so the run's step trace carries it.
#[derive(Debug, Clone, Copy, Default)]
pub struct PhaseTool;

#[derive(Debug, Deserialize)]
struct PhaseArgs {
    next_phase: String,
}

#[async_trait]
impl ToolHandler for PhaseTool {
    async fn invoke(&self, args: &serde_json::Value) -> Result<String, ToolError> {
        let PhaseArgs { next_phase } = serde_json::from_value(args.clone())
            .map_err(|e| ToolError::InvalidArguments(e.to_string()))?;
        Ok(json!({ "newPhase": next_phase }).to_string())
    }
}
