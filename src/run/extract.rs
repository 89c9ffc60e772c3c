use serde::Serialize;
use tracing::{debug, warn};

use crate::assistant::{AssistantApi, Message, Role, Run, RunStep, StepDetails, StepToolCall};
use crate::run::RunError;

/// Stands in for an assistant message that carries no text parts.
pub const NO_TEXT_REPLY: &str = "No text response received.";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TurnReply {
    pub reply: String,
    #[serde(rename = "newPhase")]
    pub new_phase: Option<String>,
}

pub struct ResponseExtractor<'a> {
    api: &'a dyn AssistantApi,
    phase_tool: &'a str,
}

impl<'a> ResponseExtractor<'a> {
    pub fn new(api: &'a dyn AssistantApi, phase_tool: &'a str) -> Self {
        Self { api, phase_tool }
    }

    pub async fn extract(&self, thread_id: &str, run: &Run) -> Result<TurnReply, RunError> {
        let messages = self.api.list_messages(thread_id, &run.id).await?;
        let reply = reply_text(&messages, &run.id);

        let steps = self.api.list_run_steps(thread_id, &run.id).await?;
        let new_phase = phase_signal(&steps, self.phase_tool);

        debug!(
            run_id = %run.id,
            reply_len = reply.len(),
            new_phase = ?new_phase,
            "extracted turn reply"
        );
        Ok(TurnReply { reply, new_phase })
    }
}

/// Text of the newest assistant message produced by `run_id`. A run that only
/// called tools has none, which yields an empty reply.
pub fn reply_text(messages: &[Message], run_id: &str) -> String {
    let latest = messages
        .iter()
        .filter(|m| m.role == Role::Assistant && m.run_id.as_deref() == Some(run_id))
        .max_by_key(|m| m.created_at);

    match latest {
        None => String::new(),
        Some(msg) => {
            let parts: Vec<&str> = msg.text_parts().collect();
            if parts.is_empty() {
                NO_TEXT_REPLY.to_string()
            } else {
                parts.join("\n")
            }
        }
    }
}

/// `newPhase` from the latest recorded output of `phase_tool` in the run's
/// tool-call steps.
pub fn phase_signal(steps: &[RunStep], phase_tool: &str) -> Option<String> {
    let mut ordered: Vec<&RunStep> = steps.iter().collect();
    ordered.sort_by_key(|s| s.created_at);

    ordered
        .into_iter()
        .filter_map(|step| match &step.step_details {
            StepDetails::ToolCalls { tool_calls } => Some(tool_calls),
            StepDetails::Other => None,
        })
        .flatten()
        .filter_map(|call| match call {
            StepToolCall::Function { id, function } if function.name == phase_tool => {
                function.output.as_deref().map(|out| (id, out))
            }
            _ => None,
        })
        .filter_map(|(id, out)| parse_phase_output(id, out))
        .last()
}

fn parse_phase_output(call_id: &str, output: &str) -> Option<String> {
    let value: serde_json::Value = match serde_json::from_str(output) {
        Ok(v) => v,
        Err(e) => {
            warn!(call_id, error = %e, "phase tool output is not json");
            return None;
        }
    };
    match value.get("newPhase").and_then(|p| p.as_str()) {
        Some(phase) => Some(phase.to_string()),
        None => {
            warn!(call_id, output, "phase tool output has no newPhase");
            None
        }
    }
}
