//! Entry point for one client request: validate the action, then either open
//! a thread or run a full turn and hand back the reply.

mod error;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::context::AppContext;
use crate::run::{ResponseExtractor, RunDriver, RunError, TurnReply};

pub use error::SessionError;

pub const ACTION_CREATE_THREAD: &str = "create_thread";
pub const ACTION_SEND_MESSAGE: &str = "send_message";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub user_message: Option<String>,
    #[serde(default)]
    pub thread_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionAction {
    CreateThread,
    SendMessage {
        thread_id: String,
        user_message: String,
    },
}

impl ChatRequest {
    pub fn into_action(self) -> Result<SessionAction, SessionError> {
        match self.action.as_str() {
            ACTION_CREATE_THREAD => Ok(SessionAction::CreateThread),
            ACTION_SEND_MESSAGE => {
                let thread_id = non_blank(self.thread_id);
                let user_message = non_blank(self.user_message);
                match (thread_id, user_message) {
                    (Some(thread_id), _) if !is_opaque_id(&thread_id) => {
                        Err(SessionError::InvalidRequest("Invalid threadId".into()))
                    }
                    (Some(thread_id), Some(user_message)) => Ok(SessionAction::SendMessage {
                        thread_id,
                        user_message,
                    }),
                    _ => Err(SessionError::InvalidRequest(
                        "Missing threadId or userMessage".into(),
                    )),
                }
            }
            _ => Err(SessionError::InvalidRequest("Invalid action".into())),
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Thread ids end up as a URL path segment, so only `[A-Za-z0-9_-]` passes.
pub fn is_opaque_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ChatResponse {
    Thread {
        #[serde(rename = "threadId")]
        thread_id: String,
    },
    Reply(TurnReply),
}

pub async fn handle(ctx: &AppContext, req: ChatRequest) -> Result<ChatResponse, SessionError> {
    match req.into_action()? {
        SessionAction::CreateThread => {
            let thread = ctx.api.create_thread().await.map_err(RunError::from)?;
            info!(thread_id = %thread.id, "thread created");
            Ok(ChatResponse::Thread {
                thread_id: thread.id,
            })
        }
        SessionAction::SendMessage {
            thread_id,
            user_message,
        } => {
            let extractor = ResponseExtractor::new(ctx.api.as_ref(), &ctx.phase_tool);
            let reply = RunDriver::new(ctx)
                .complete_turn(&thread_id, &user_message, &extractor)
                .await
                .inspect_err(|e| {
                    warn!(thread_id = %thread_id, run_status = ?e.status(), error = %format!("{e:#}"), "turn failed")
                })?;
            Ok(ChatResponse::Reply(reply))
        }
    }
}
