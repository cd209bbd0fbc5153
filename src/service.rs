//! Task control surface: the thin layer between an embedder (HTTP server,
//! UI loop, scheduler) and the decision engine.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::agent::engine::{DecisionEngine, StepResult};
use crate::errors::{EyeHandError, EyeHandResult};

const RESULT_CHANNEL_CAPACITY: usize = 32;

/// Drives repeated [`DecisionEngine::step`] calls for one goal and streams
/// every step's result. One task at a time: a second `start_task` while
/// one runs is rejected with [`EyeHandError::Busy`], never queued.
pub struct AgentWorker {
    engine: Arc<DecisionEngine>,
    busy: Arc<AtomicBool>,
}

impl AgentWorker {
    pub fn new(engine: Arc<DecisionEngine>) -> Self {
        Self {
            engine,
            busy: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Start a task. The returned channel yields one [`StepResult`] per
    /// step until the goal is verified finished or `max_steps` runs out.
    /// Step-level errors are streamed and do not stop the task; retrying is
    /// exactly what the next loop iteration does.
    pub fn start_task(
        &self,
        goal: String,
        max_steps: usize,
    ) -> EyeHandResult<mpsc::Receiver<StepResult>> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(EyeHandError::Busy);
        }

        let (tx, rx) = mpsc::channel(RESULT_CHANNEL_CAPACITY);
        let engine = self.engine.clone();
        let busy = self.busy.clone();

        tokio::spawn(async move {
            tracing::info!(goal = %goal, max_steps, "task started");
            engine.reset().await;

            for step_no in 1..=max_steps {
                let result = match engine.step(&goal).await {
                    Ok(result) => result,
                    Err(e) => StepResult::Error {
                        reason: e.to_string(),
                    },
                };

                let finished = matches!(result, StepResult::Finished { .. });
                if let StepResult::Error { reason } = &result {
                    tracing::warn!(step = step_no, reason = %reason, "step failed");
                }

                if tx.send(result).await.is_err() {
                    tracing::info!(step = step_no, "result receiver dropped, task abandoned");
                    break;
                }
                if finished {
                    tracing::info!(steps = step_no, "task finished");
                    break;
                }
            }

            busy.store(false, Ordering::Release);
        });

        Ok(rx)
    }
}
