//! In-memory stand-in for the remote assistants service.

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

use crate::assistant::{
    AssistantApi, Message, MessageContent, RequiredAction, Role, Run, RunStatus, RunStep,
    StepDetails, StepFunction, StepToolCall, SubmitToolOutputsAction, TextValue, Thread,
    ToolCallFunction, ToolCallOutput, ToolCallRequest,
};
use crate::config::RunConfig;
use crate::context::AppContext;
use crate::tools::ToolRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    CreateThread,
    CreateMessage,
    CreateRun,
    RetrieveRun,
    SubmitToolOutputs,
    ListMessages,
    ListRunSteps,
}

pub fn run(id: &str, status: RunStatus) -> Run {
    Run {
        id: id.into(),
        thread_id: "thread_test".into(),
        status,
        required_action: None,
        last_error: None,
    }
}

/// A `requires_action` run asking for `(call_id, tool, arguments)` calls.
pub fn run_requiring(id: &str, calls: &[(&str, &str, &str)]) -> Run {
    let mut r = run(id, RunStatus::RequiresAction);
    r.required_action = Some(RequiredAction {
        kind: "submit_tool_outputs".into(),
        submit_tool_outputs: Some(SubmitToolOutputsAction {
            tool_calls: calls
                .iter()
                .map(|(call_id, name, args)| ToolCallRequest {
                    id: (*call_id).into(),
                    kind: "function".into(),
                    function: ToolCallFunction {
                        name: (*name).into(),
                        arguments: (*args).into(),
                    },
                })
                .collect(),
        }),
    });
    r
}

pub fn assistant_message(run_id: &str, created_at: i64, text: &str) -> Message {
    Message {
        id: format!("msg_{created_at}"),
        role: Role::Assistant,
        run_id: Some(run_id.into()),
        created_at,
        content: vec![MessageContent::Text {
            text: TextValue { value: text.into() },
        }],
    }
}

/// Hands out scripted run observations in order (the first one answers
/// `create_run`) and repeats the last one once the script runs dry.
/// Submitted outputs are recorded as tool-call run steps, the way the real
/// service exposes them.
#[derive(Default)]
pub struct ScriptedApi {
    script: Mutex<VecDeque<Run>>,
    current: Mutex<Option<Run>>,
    messages: Mutex<Vec<Message>>,
    steps: Mutex<Vec<RunStep>>,
    submissions: Mutex<Vec<Vec<ToolCallOutput>>>,
    operations: Mutex<Vec<String>>,
    fail_on: Option<Op>,
}

impl ScriptedApi {
    pub fn new(script: Vec<Run>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            ..Default::default()
        }
    }

    pub fn with_messages(self, messages: Vec<Message>) -> Self {
        *self.messages.lock().unwrap() = messages;
        self
    }

    pub fn failing_on(mut self, op: Op) -> Self {
        self.fail_on = Some(op);
        self
    }

    pub fn operations(&self) -> Vec<String> {
        self.operations.lock().unwrap().clone()
    }

    pub fn submissions(&self) -> Vec<Vec<ToolCallOutput>> {
        self.submissions.lock().unwrap().clone()
    }

    fn record(&self, op: Op, entry: String) -> Result<()> {
        self.operations.lock().unwrap().push(entry);
        if self.fail_on == Some(op) {
            return Err(anyhow!("connection reset by peer"));
        }
        Ok(())
    }

    fn next_run(&self) -> Result<Run> {
        let mut current = self.current.lock().unwrap();
        let next = match self.script.lock().unwrap().pop_front() {
            Some(run) => run,
            None => current.clone().ok_or_else(|| anyhow!("empty run script"))?,
        };
        *current = Some(next.clone());
        Ok(next)
    }
}

#[async_trait]
impl AssistantApi for ScriptedApi {
    async fn create_thread(&self) -> Result<Thread> {
        self.record(Op::CreateThread, "create_thread".into())
            .map_err(|e| e.context("create thread"))?;
        Ok(Thread {
            id: "thread_test".into(),
        })
    }

    async fn create_message(&self, thread_id: &str, content: &str) -> Result<()> {
        self.record(
            Op::CreateMessage,
            format!("create_message:{thread_id}:{content}"),
        )
        .map_err(|e| e.context("create message"))
    }

    async fn create_run(&self, thread_id: &str, assistant_id: &str) -> Result<Run> {
        self.record(
            Op::CreateRun,
            format!("create_run:{thread_id}:{assistant_id}"),
        )
        .map_err(|e| e.context("create run"))?;
        self.next_run()
    }

    async fn retrieve_run(&self, thread_id: &str, run_id: &str) -> Result<Run> {
        self.record(Op::RetrieveRun, format!("retrieve_run:{thread_id}:{run_id}"))
            .map_err(|e| e.context("retrieve run"))?;
        self.next_run()
    }

    async fn submit_tool_outputs(
        &self,
        _thread_id: &str,
        run_id: &str,
        outputs: &[ToolCallOutput],
    ) -> Result<Run> {
        self.record(
            Op::SubmitToolOutputs,
            format!("submit_tool_outputs:{run_id}:{}", outputs.len()),
        )
        .map_err(|e| e.context("submit tool outputs"))?;

        let current = self.current.lock().unwrap().clone();
        let requested = current
            .as_ref()
            .and_then(|r| r.pending_tool_calls())
            .map(|calls| calls.to_vec())
            .unwrap_or_default();
        let tool_calls = requested
            .iter()
            .map(|call| StepToolCall::Function {
                id: call.id.clone(),
                function: StepFunction {
                    name: call.function.name.clone(),
                    arguments: call.function.arguments.clone(),
                    output: outputs
                        .iter()
                        .find(|o| o.tool_call_id == call.id)
                        .map(|o| o.output.clone()),
                },
            })
            .collect();

        let mut steps = self.steps.lock().unwrap();
        let created_at = steps.len() as i64;
        steps.push(RunStep {
            id: format!("step_{created_at}"),
            created_at,
            step_details: StepDetails::ToolCalls { tool_calls },
        });
        self.submissions.lock().unwrap().push(outputs.to_vec());

        let mut queued = current.unwrap_or_else(|| run(run_id, RunStatus::Queued));
        queued.status = RunStatus::Queued;
        queued.required_action = None;
        Ok(queued)
    }

    async fn list_messages(&self, thread_id: &str, run_id: &str) -> Result<Vec<Message>> {
        self.record(Op::ListMessages, format!("list_messages:{thread_id}:{run_id}"))
            .map_err(|e| e.context("list messages"))?;
        Ok(self.messages.lock().unwrap().clone())
    }

    async fn list_run_steps(&self, thread_id: &str, run_id: &str) -> Result<Vec<RunStep>> {
        self.record(Op::ListRunSteps, format!("list_run_steps:{thread_id}:{run_id}"))
            .map_err(|e| e.context("list run steps"))?;
        Ok(self.steps.lock().unwrap().clone())
    }
}

/// Context with fast polling so scripted runs finish in milliseconds.
pub fn context_with(api: Arc<ScriptedApi>, registry: ToolRegistry) -> AppContext {
    AppContext {
        api,
        registry: Arc::new(registry),
        assistant_id: "asst_test".into(),
        phase_tool: "update_phase".into(),
        run: RunConfig {
            poll_interval_ms: 1,
            max_poll_interval_ms: 5,
            run_timeout_ms: 5_000,
            tool_timeout_ms: 1_000,
            ..RunConfig::default()
        },
        shutdown: CancellationToken::new(),
    }
}
