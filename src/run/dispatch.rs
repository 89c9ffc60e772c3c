use futures::future::join_all;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, error, warn};

use crate::assistant::{ToolCallOutput, ToolCallRequest};
use crate::tools::{ToolError, ToolRegistry};

/// Answers a whole `requires_action` batch. Every request gets exactly one
/// output with its own call id, whatever happens to the handler.
pub struct ToolDispatcher<'a> {
    registry: &'a ToolRegistry,
    tool_timeout: Duration,
}

impl<'a> ToolDispatcher<'a> {
    pub fn new(registry: &'a ToolRegistry, tool_timeout: Duration) -> Self {
        Self {
            registry,
            tool_timeout,
        }
    }

    /// Outputs come back in request order.
    pub async fn dispatch(&self, calls: &[ToolCallRequest]) -> Vec<ToolCallOutput> {
        debug!(calls = calls.len(), "dispatching tool call batch");
        join_all(calls.iter().map(|call| self.dispatch_one(call))).await
    }

    async fn dispatch_one(&self, call: &ToolCallRequest) -> ToolCallOutput {
        let output = match self.invoke(call).await {
            Ok(output) => output,
            Err(e) => {
                match &e {
                    ToolError::UnknownTool(_) => {
                        warn!(call_id = %call.id, tool = %call.function.name, "unknown tool requested")
                    }
                    _ => {
                        error!(call_id = %call.id, tool = %call.function.name, error = %e, "tool call failed")
                    }
                }
                failure_output(&e)
            }
        };
        ToolCallOutput {
            tool_call_id: call.id.clone(),
            output,
        }
    }

    async fn invoke(&self, call: &ToolCallRequest) -> Result<String, ToolError> {
        let name = call.function.name.as_str();
        if call.kind != "function" {
            return Err(ToolError::UnknownTool(format!("{} ({})", name, call.kind)));
        }
        let handler = self
            .registry
            .lookup(name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;
        let args = parse_arguments(&call.function.arguments)?;

        debug!(call_id = %call.id, tool = name, "invoking tool");
        match tokio::time::timeout(self.tool_timeout, handler.invoke(&args)).await {
            Ok(res) => res,
            Err(_) => Err(ToolError::Timeout(self.tool_timeout.as_millis())),
        }
    }
}

/// Tool arguments arrive JSON-encoded; an empty string means no arguments.
pub fn parse_arguments(raw: &str) -> Result<serde_json::Value, ToolError> {
    if raw.trim().is_empty() {
        return Ok(json!({}));
    }
    serde_json::from_str(raw).map_err(|e| ToolError::InvalidArguments(e.to_string()))
}

pub fn failure_output(err: &ToolError) -> String {
    json!({ "ok": false, "error": err.to_string() }).to_string()
}
