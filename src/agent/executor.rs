use std::sync::Arc;
use std::time::Duration;

use crate::agent::action::{ActionKind, ActionRecord};
use crate::errors::{EyeHandError, EyeHandResult};
use crate::hid::ActionSink;

/// Timing and bounding policy for physical actuation.
#[derive(Debug, Clone)]
pub struct ExecPolicy {
    /// Symmetric per-axis clamp on relative moves.
    pub max_displacement: i32,
    /// Pause after a move so the pointer visibly settles.
    pub move_settle: Duration,
    /// Longer pause after a click so the UI can react before the next capture.
    pub click_settle: Duration,
    /// Delay between individual key taps when typing.
    pub key_delay: Duration,
    /// Fixed pause after every dispatched action (except wait) so the next
    /// frame reflects the action's effect.
    pub cooldown: Duration,
    /// Ceiling on a single wait action. Model-supplied seconds are valid
    /// JSON up to ~1e308; an unbounded sleep would stall the loop (and
    /// overflow `Duration`).
    pub max_wait: Duration,
}

impl Default for ExecPolicy {
    fn default() -> Self {
        Self {
            max_displacement: 200,
            move_settle: Duration::from_millis(200),
            click_settle: Duration::from_millis(800),
            key_delay: Duration::from_millis(50),
            cooldown: Duration::from_millis(500),
            max_wait: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExecOutcome {
    pub success: bool,
    pub message: Option<String>,
}

impl ExecOutcome {
    fn ok() -> Self {
        Self {
            success: true,
            message: None,
        }
    }

    fn ok_with(message: String) -> Self {
        Self {
            success: true,
            message: Some(message),
        }
    }
}

/// Translates one normalized action record into sink primitives with
/// clamping, sub-step sequencing, and settle delays.
pub struct ActionExecutor {
    sink: Arc<dyn ActionSink>,
    policy: ExecPolicy,
}

impl ActionExecutor {
    pub fn new(sink: Arc<dyn ActionSink>, policy: ExecPolicy) -> Self {
        Self { sink, policy }
    }

    pub async fn execute(&self, record: &ActionRecord) -> EyeHandResult<ExecOutcome> {
        if record.kind == ActionKind::Wait {
            // Wait touches no hardware and needs no connectivity or cooldown.
            // `from_secs_f64` panics past Duration's range, and JSON happily
            // carries seconds up to ~1e308. Bound to the policy ceiling.
            let secs = record
                .params
                .seconds
                .clamp(0.0, self.policy.max_wait.as_secs_f64());
            tracing::info!(seconds = secs, "waiting");
            tokio::time::sleep(Duration::from_secs_f64(secs)).await;
            return Ok(ExecOutcome::ok());
        }

        if !self.sink.is_connected() {
            return Err(EyeHandError::SinkDisconnected);
        }

        let outcome = match record.kind {
            ActionKind::Move => {
                let dx = self.clamp(record.params.dx);
                let dy = self.clamp(record.params.dy);
                if dx != record.params.dx || dy != record.params.dy {
                    tracing::warn!(
                        requested = ?(record.params.dx, record.params.dy),
                        clamped = ?(dx, dy),
                        bound = self.policy.max_displacement,
                        "displacement clamped"
                    );
                }
                self.sink.move_relative(dx, dy).await?;
                tokio::time::sleep(self.policy.move_settle).await;
                if (dx, dy) != (record.params.dx, record.params.dy) {
                    ExecOutcome::ok_with(format!("displacement clamped to ({dx},{dy})"))
                } else {
                    ExecOutcome::ok()
                }
            }
            ActionKind::Click => {
                tracing::info!(button = %record.params.button, "click");
                self.sink.click(record.params.button).await?;
                tokio::time::sleep(self.policy.click_settle).await;
                ExecOutcome::ok()
            }
            ActionKind::Type => {
                tracing::info!(chars = record.params.text.chars().count(), "typing");
                for ch in record.params.text.chars() {
                    self.sink.key_tap(ch).await?;
                    tokio::time::sleep(self.policy.key_delay).await;
                }
                ExecOutcome::ok()
            }
            ActionKind::Finish => {
                // Finish is routed to verification by the engine, never here.
                return Err(EyeHandError::Executor(
                    "finish is not a dispatchable action".into(),
                ));
            }
            ActionKind::Wait => unreachable!("handled above"),
        };

        tokio::time::sleep(self.policy.cooldown).await;
        Ok(outcome)
    }

    fn clamp(&self, v: i32) -> i32 {
        v.clamp(-self.policy.max_displacement, self.policy.max_displacement)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::action::ParamSet;
    use crate::hid::MouseButton;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tokio::time::Instant;

    #[derive(Default)]
    struct RecordingSink {
        calls: Mutex<Vec<String>>,
        disconnected: bool,
    }

    #[async_trait]
    impl ActionSink for RecordingSink {
        async fn move_relative(&self, dx: i32, dy: i32) -> EyeHandResult<()> {
            self.calls.lock().unwrap().push(format!("move {dx} {dy}"));
            Ok(())
        }
        async fn click(&self, button: MouseButton) -> EyeHandResult<()> {
            self.calls.lock().unwrap().push(format!("click {button}"));
            Ok(())
        }
        async fn key_tap(&self, ch: char) -> EyeHandResult<()> {
            self.calls.lock().unwrap().push(format!("tap {ch}"));
            Ok(())
        }
        fn is_connected(&self) -> bool {
            !self.disconnected
        }
    }

    fn record(kind: ActionKind, params: ParamSet) -> ActionRecord {
        ActionRecord {
            kind,
            thought: String::new(),
            params,
        }
    }

    fn move_record(dx: i32, dy: i32) -> ActionRecord {
        record(
            ActionKind::Move,
            ParamSet {
                dx,
                dy,
                ..ParamSet::default()
            },
        )
    }

    #[tokio::test(start_paused = true)]
    async fn out_of_range_displacement_is_clamped() {
        let sink = Arc::new(RecordingSink::default());
        let executor = ActionExecutor::new(sink.clone(), ExecPolicy::default());

        let outcome = executor.execute(&move_record(999, -450)).await.unwrap();
        assert!(outcome.success);
        assert!(outcome.message.unwrap().contains("clamped"));
        assert_eq!(sink.calls.lock().unwrap()[0], "move 200 -200");
    }

    #[tokio::test(start_paused = true)]
    async fn boundary_displacement_passes_unchanged() {
        let sink = Arc::new(RecordingSink::default());
        let executor = ActionExecutor::new(sink.clone(), ExecPolicy::default());

        let outcome = executor.execute(&move_record(200, -200)).await.unwrap();
        assert!(outcome.success);
        assert!(outcome.message.is_none());
        assert_eq!(sink.calls.lock().unwrap()[0], "move 200 -200");
    }

    #[tokio::test(start_paused = true)]
    async fn wait_blocks_without_touching_the_sink() {
        let sink = Arc::new(RecordingSink::default());
        let executor = ActionExecutor::new(sink.clone(), ExecPolicy::default());

        let start = Instant::now();
        let outcome = executor
            .execute(&record(
                ActionKind::Wait,
                ParamSet {
                    seconds: 2.0,
                    ..ParamSet::default()
                },
            ))
            .await
            .unwrap();

        assert!(outcome.success);
        assert!(start.elapsed() >= Duration::from_secs(2));
        assert!(sink.calls.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn absurd_wait_is_capped_at_the_policy_ceiling() {
        let sink = Arc::new(RecordingSink::default());
        let executor = ActionExecutor::new(sink.clone(), ExecPolicy::default());

        let start = Instant::now();
        let outcome = executor
            .execute(&record(
                ActionKind::Wait,
                ParamSet {
                    seconds: 1e300,
                    ..ParamSet::default()
                },
            ))
            .await
            .unwrap();

        assert!(outcome.success);
        assert_eq!(start.elapsed(), Duration::from_secs(60));
        assert!(sink.calls.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn typing_taps_each_character() {
        let sink = Arc::new(RecordingSink::default());
        let executor = ActionExecutor::new(sink.clone(), ExecPolicy::default());

        executor
            .execute(&record(
                ActionKind::Type,
                ParamSet {
                    text: "hi!".into(),
                    ..ParamSet::default()
                },
            ))
            .await
            .unwrap();

        let calls = sink.calls.lock().unwrap();
        assert_eq!(*calls, vec!["tap h", "tap i", "tap !"]);
    }

    #[tokio::test(start_paused = true)]
    async fn disconnected_sink_is_a_hard_failure() {
        let sink = Arc::new(RecordingSink {
            disconnected: true,
            ..RecordingSink::default()
        });
        let executor = ActionExecutor::new(sink.clone(), ExecPolicy::default());

        let err = executor.execute(&move_record(10, 10)).await.unwrap_err();
        assert!(matches!(err, EyeHandError::SinkDisconnected));
        assert!(sink.calls.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn finish_is_not_dispatchable() {
        let sink = Arc::new(RecordingSink::default());
        let executor = ActionExecutor::new(sink, ExecPolicy::default());
        let err = executor
            .execute(&record(ActionKind::Finish, ParamSet::default()))
            .await
            .unwrap_err();
        assert!(matches!(err, EyeHandError::Executor(_)));
    }
}
