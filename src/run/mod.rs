//! Run orchestration: submit a turn, follow the remote run through its
//! states, fulfil tool calls, and pull the reply out of the finished run.

mod dispatch;
mod driver;
mod extract;

use thiserror::Error;

use crate::assistant::RunStatus;

pub use dispatch::*;
pub use driver::*;
pub use extract::*;

#[derive(Debug, Error)]
pub enum RunError {
    #[error(
        "Run failed with status: {status}{}",
        .message.as_deref().map(|m| format!(" ({m})")).unwrap_or_default()
    )]
    RunFailed {
        run_id: String,
        status: RunStatus,
        message: Option<String>,
    },

    #[error("run {run_id} requires action but carried no tool calls")]
    MissingRequiredAction { run_id: String },

    #[error("run {run_id} exceeded {rounds} tool-call rounds")]
    ActionRoundLimit { run_id: String, rounds: usize },

    #[error("run did not finish within {after_ms} ms")]
    Timeout { after_ms: u128 },

    #[error("run polling cancelled by shutdown")]
    Cancelled,

    #[error(transparent)]
    Transport(#[from] anyhow::Error),
}

impl RunError {
    /// Terminal status carried by a failed run, if that is what this is.
    pub fn status(&self) -> Option<RunStatus> {
        match self {
            RunError::RunFailed { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_failed_display_includes_remote_message() {
        let err = RunError::RunFailed {
            run_id: "run_1".into(),
            status: RunStatus::Failed,
            message: Some("rate limit exceeded".into()),
        };
        assert_eq!(
            err.to_string(),
            "Run failed with status: failed (rate limit exceeded)"
        );

        let err = RunError::RunFailed {
            run_id: "run_1".into(),
            status: RunStatus::Expired,
            message: None,
        };
        assert_eq!(err.to_string(), "Run failed with status: expired");
        assert_eq!(err.status(), Some(RunStatus::Expired));
    }

    #[test]
    fn transport_display_keeps_context_chain() {
        let err = RunError::from(anyhow::anyhow!("connection refused").context("retrieve run"));
        assert_eq!(format!("{err:#}"), "retrieve run: connection refused");
        assert_eq!(err.status(), None);
    }
}
