use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::assistant::{AssistantApi, Run, RunStatus};
use crate::config::RunConfig;
use crate::context::AppContext;
use crate::run::{ResponseExtractor, RunError, ToolDispatcher, TurnReply};

/// Drives one turn: posts the user message, starts a run and follows it
/// until it completes, fails, or runs out of budget.
pub struct RunDriver<'a> {
    api: &'a dyn AssistantApi,
    dispatcher: ToolDispatcher<'a>,
    assistant_id: &'a str,
    cfg: &'a RunConfig,
    cancel: CancellationToken,
}

impl<'a> RunDriver<'a> {
    pub fn new(ctx: &'a AppContext) -> Self {
        Self {
            api: ctx.api.as_ref(),
            dispatcher: ToolDispatcher::new(&ctx.registry, ctx.run.tool_timeout()),
            assistant_id: &ctx.assistant_id,
            cfg: &ctx.run,
            cancel: ctx.shutdown.clone(),
        }
    }

    /// Drives the run and reads its reply under one deadline, so a slow
    /// listing after completion still counts against the turn.
    pub async fn complete_turn(
        &self,
        thread_id: &str,
        user_message: &str,
        extractor: &ResponseExtractor<'_>,
    ) -> Result<TurnReply, RunError> {
        self.bounded(thread_id, async {
            let run = self.drive(thread_id, user_message).await?;
            extractor.extract(thread_id, &run).await
        })
        .await
    }

    async fn bounded<T>(
        &self,
        thread_id: &str,
        turn: impl Future<Output = Result<T, RunError>>,
    ) -> Result<T, RunError> {
        let started = Instant::now();
        let guarded = async {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    info!(thread_id, "turn cancelled by shutdown");
                    Err(RunError::Cancelled)
                }
                res = turn => res,
            }
        };
        match tokio::time::timeout(self.cfg.run_timeout(), guarded).await {
            Ok(res) => res,
            Err(_) => {
                warn!(thread_id, elapsed_ms = %started.elapsed().as_millis(), "run timed out");
                Err(RunError::Timeout {
                    after_ms: self.cfg.run_timeout().as_millis(),
                })
            }
        }
    }

    async fn drive(&self, thread_id: &str, user_message: &str) -> Result<Run, RunError> {
        self.api.create_message(thread_id, user_message).await?;
        let mut run = self.api.create_run(thread_id, self.assistant_id).await?;
        info!(thread_id, run_id = %run.id, status = %run.status, "run created");

        let mut interval = self.cfg.poll_interval();
        let mut rounds = 0usize;
        let mut polls = 0usize;

        loop {
            match run.status {
                RunStatus::Queued | RunStatus::InProgress | RunStatus::Cancelling => {
                    tokio::time::sleep(interval).await;
                    interval = self.cfg.next_interval(interval);
                    run = self.api.retrieve_run(thread_id, &run.id).await?;
                    polls += 1;
                    debug!(run_id = %run.id, status = %run.status, polls, "polled run");
                }
                RunStatus::RequiresAction => {
                    let calls = run
                        .pending_tool_calls()
                        .ok_or_else(|| RunError::MissingRequiredAction {
                            run_id: run.id.clone(),
                        })?;

                    rounds += 1;
                    if rounds > self.cfg.max_action_rounds {
                        warn!(run_id = %run.id, rounds, "tool-call round limit reached");
                        return Err(RunError::ActionRoundLimit {
                            run_id: run.id.clone(),
                            rounds: self.cfg.max_action_rounds,
                        });
                    }

                    info!(run_id = %run.id, round = rounds, calls = calls.len(), "run requires action");
                    let outputs = self.dispatcher.dispatch(calls).await;
                    self.api
                        .submit_tool_outputs(thread_id, &run.id, &outputs)
                        .await?;

                    // the next observation must postdate the submission
                    interval = self.cfg.poll_interval();
                    run = self.api.retrieve_run(thread_id, &run.id).await?;
                    polls += 1;
                    debug!(run_id = %run.id, status = %run.status, polls, "polled run after submission");
                }
                RunStatus::Completed => {
                    info!(run_id = %run.id, rounds, polls, "run completed");
                    return Ok(run);
                }
                status => {
                    debug_assert!(status.is_terminal());
                    let message = run.last_error.as_ref().and_then(|e| e.message.clone());
                    return Err(RunError::RunFailed {
                        run_id: run.id.clone(),
                        status,
                        message,
                    });
                }
            }
        }
    }
}
