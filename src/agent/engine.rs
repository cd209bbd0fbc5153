use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use crate::agent::action::{ActionKind, ActionRecord};
use crate::agent::executor::{ActionExecutor, ExecPolicy};
use crate::agent::history::{DecisionHistory, HistoryEntry};
use crate::agent::trace::{SessionTrace, TraceEntry};
use crate::agent::verify::{self, VerifyOutcome};
use crate::agent::{hybrid, parser, prompt};
use crate::config::{AgentMode, AppConfig};
use crate::errors::{EyeHandError, EyeHandResult};
use crate::hid::ActionSink;
use crate::llm::gateway::ModelGateway;
use crate::llm::types::ChatMessage;
use crate::vision::FrameSource;

/// Outcome of one decision step.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepResult {
    /// The model proposed finish and verification confirmed the goal.
    Finished { thought: String },
    /// An action was executed (or a finish was discarded); keep stepping.
    InProgress {
        action: ActionKind,
        message: Option<String>,
    },
    /// The step aborted early; the reason string is surfaced verbatim.
    Error { reason: String },
}

/// Releases the run flag on every exit path, including early `?` returns.
struct RunGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> RunGuard<'a> {
    fn try_acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// The orchestrator: owns the run/idle state and the rolling history,
/// builds prompts, calls the gateway, parses replies, and drives the
/// executor. One instance per process, injected wherever the task surface
/// lives.
pub struct DecisionEngine {
    gateway: Arc<dyn ModelGateway>,
    frames: Arc<dyn FrameSource>,
    executor: ActionExecutor,
    history: Mutex<DecisionHistory>,
    trace: Option<SessionTrace>,
    config: AppConfig,
    running: AtomicBool,
}

impl DecisionEngine {
    pub fn new(
        gateway: Arc<dyn ModelGateway>,
        frames: Arc<dyn FrameSource>,
        sink: Arc<dyn ActionSink>,
        config: AppConfig,
    ) -> Self {
        let policy = ExecPolicy {
            max_displacement: config.agent.max_displacement,
            ..ExecPolicy::default()
        };
        let trace = config.agent.session_trace.then(SessionTrace::new);
        Self {
            gateway,
            frames,
            executor: ActionExecutor::new(sink, policy),
            history: Mutex::new(DecisionHistory::new(config.agent.history_depth)),
            trace,
            config,
            running: AtomicBool::new(false),
        }
    }

    /// Discard history at a task boundary.
    pub async fn reset(&self) {
        self.history.lock().await.clear();
        tracing::info!("engine reset, history cleared");
    }

    /// Run one perceive → decide → act iteration toward `goal`.
    ///
    /// Fails fast with [`EyeHandError::Busy`] if a step is already in
    /// flight; the gateway is never contacted in that case. All other
    /// failures abort only this step and leave the engine idle again.
    pub async fn step(&self, goal: &str) -> EyeHandResult<StepResult> {
        let _guard = RunGuard::try_acquire(&self.running).ok_or(EyeHandError::Busy)?;

        let frame = self.frames.latest_frame().ok_or(EyeHandError::NoFrame)?;
        let frame_data_url = frame.to_data_url()?;
        let history_block = self.history.lock().await.render();
        let timeout = Duration::from_secs(self.config.gateway.request_timeout_secs);

        let actions = match self.config.agent.mode {
            AgentMode::Single => {
                let messages = vec![ChatMessage::user_with_image(
                    prompt::decision_prompt(goal, &history_block),
                    frame_data_url,
                )];
                let reply = self.gateway.chat(messages, timeout).await?;
                parser::parse_actions(&reply)?
            }
            AgentMode::Hybrid => {
                hybrid::decide(
                    self.gateway.as_ref(),
                    goal,
                    &history_block,
                    &frame_data_url,
                    &self.config.agent,
                    timeout,
                )
                .await?
            }
        };

        tracing::info!(count = actions.len(), goal = %goal, "actions parsed");

        let mut last = StepResult::Error {
            reason: "no action processed".into(),
        };
        for record in &actions {
            last = if record.kind == ActionKind::Finish {
                self.handle_finish(goal, record).await?
            } else {
                self.dispatch(goal, record).await?
            };
            if matches!(last, StepResult::Finished { .. }) {
                break;
            }
        }
        Ok(last)
    }

    async fn dispatch(&self, goal: &str, record: &ActionRecord) -> EyeHandResult<StepResult> {
        let outcome = self.executor.execute(record).await?;
        self.history.lock().await.push(HistoryEntry::from(record));
        self.trace_action(goal, record);
        Ok(StepResult::InProgress {
            action: record.kind,
            message: outcome.message,
        })
    }

    /// Finish never terminates the loop on its own: a fresh frame and a
    /// positive confirmation from the gateway are required.
    async fn handle_finish(&self, goal: &str, record: &ActionRecord) -> EyeHandResult<StepResult> {
        let verify_timeout = Duration::from_secs(self.config.gateway.verify_timeout_secs);
        match verify::verify(
            self.gateway.as_ref(),
            self.frames.as_ref(),
            goal,
            verify_timeout,
        )
        .await?
        {
            VerifyOutcome::Confirmed { reason } => {
                self.trace_action(goal, record);
                let thought = if record.thought.is_empty() {
                    reason
                } else {
                    record.thought.clone()
                };
                Ok(StepResult::Finished { thought })
            }
            VerifyOutcome::NotConfirmed { reason } => {
                tracing::info!(reason = %reason, "finish discarded, loop continues");
                Ok(StepResult::InProgress {
                    action: ActionKind::Finish,
                    message: Some(format!("finish not confirmed: {reason}")),
                })
            }
        }
    }

    fn trace_action(&self, goal: &str, record: &ActionRecord) {
        let Some(trace) = &self.trace else { return };
        let entry = TraceEntry::now(
            Some(goal.to_string()),
            serde_json::to_value(record).ok(),
            None,
        );
        if let Err(e) = trace.append(&entry) {
            tracing::warn!(error = %e, "session trace write failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AgentConfig, GatewayConfig};
    use crate::hid::MouseButton;
    use crate::vision::Frame;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex as StdMutex;

    fn test_config() -> AppConfig {
        AppConfig {
            gateway: GatewayConfig {
                api_base: "http://localhost/unused".into(),
                model: "test-model".into(),
                api_key: None,
                request_timeout_secs: 60,
                verify_timeout_secs: 30,
                temperature: 0.1,
            },
            agent: AgentConfig {
                session_trace: false,
                ..AgentConfig::default()
            },
        }
    }

    struct ScriptedGateway {
        // Stored reversed so popping from the back follows call order.
        replies: StdMutex<Vec<String>>,
        calls: Arc<AtomicUsize>,
        gate: Option<Arc<tokio::sync::Notify>>,
    }

    impl ScriptedGateway {
        fn new(mut replies: Vec<&str>) -> Self {
            replies.reverse();
            Self {
                replies: StdMutex::new(replies.into_iter().map(String::from).collect()),
                calls: Arc::new(AtomicUsize::new(0)),
                gate: None,
            }
        }
    }

    #[async_trait]
    impl ModelGateway for ScriptedGateway {
        async fn chat(
            &self,
            _messages: Vec<ChatMessage>,
            _timeout: Duration,
        ) -> EyeHandResult<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            self.replies
                .lock()
                .unwrap()
                .pop()
                .ok_or_else(|| EyeHandError::Gateway("script exhausted".into()))
        }
    }

    struct StaticFrames;
    struct EmptyFrames;

    impl FrameSource for StaticFrames {
        fn latest_frame(&self) -> Option<Frame> {
            Some(Frame {
                image: image::DynamicImage::new_rgb8(4, 4),
            })
        }
    }

    impl FrameSource for EmptyFrames {
        fn latest_frame(&self) -> Option<Frame> {
            None
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        calls: StdMutex<Vec<String>>,
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
            true
        }
    }

    fn engine_with(gateway: ScriptedGateway, sink: Arc<RecordingSink>) -> DecisionEngine {
        DecisionEngine::new(Arc::new(gateway), Arc::new(StaticFrames), sink, test_config())
    }

    #[tokio::test(start_paused = true)]
    async fn move_reply_executes_and_enters_history() {
        let gateway = ScriptedGateway::new(vec![
            "```json\n{\"thought\": \"cursor left of target\", \"action\": \"move\", \"params\": {\"dx\": 30, \"dy\": 10}}\n```",
        ]);
        let sink = Arc::new(RecordingSink::default());
        let engine = engine_with(gateway, sink.clone());

        let result = engine.step("open the browser").await.unwrap();
        assert!(matches!(
            result,
            StepResult::InProgress {
                action: ActionKind::Move,
                ..
            }
        ));
        assert_eq!(sink.calls.lock().unwrap()[0], "move 30 10");
        assert_eq!(engine.history.lock().await.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn no_frame_fails_before_the_gateway_is_contacted() {
        let gateway = ScriptedGateway::new(vec!["{\"action\": \"click\"}"]);
        let calls = gateway.calls.clone();
        let engine = DecisionEngine::new(
            Arc::new(gateway),
            Arc::new(EmptyFrames),
            Arc::new(RecordingSink::default()),
            test_config(),
        );

        let err = engine.step("anything").await.unwrap_err();
        assert!(matches!(err, EyeHandError::NoFrame));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn parse_failure_surfaces_and_touches_no_hardware() {
        let gateway = ScriptedGateway::new(vec!["I am not sure what to do next."]);
        let sink = Arc::new(RecordingSink::default());
        let engine = engine_with(gateway, sink.clone());

        let err = engine.step("open the browser").await.unwrap_err();
        assert!(matches!(err, EyeHandError::Parse(_)));
        assert!(sink.calls.lock().unwrap().is_empty());
        assert!(engine.history.lock().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn unconfirmed_finish_keeps_the_loop_in_progress() {
        let gateway = ScriptedGateway::new(vec![
            "{\"thought\": \"looks done\", \"action\": \"finish\"}",
            "{\"verified\": false, \"reason\": \"browser still open\"}",
        ]);
        let sink = Arc::new(RecordingSink::default());
        let engine = engine_with(gateway, sink.clone());

        let result = engine.step("close the browser").await.unwrap();
        assert!(matches!(
            result,
            StepResult::InProgress {
                action: ActionKind::Finish,
                ..
            }
        ));
        assert!(sink.calls.lock().unwrap().is_empty());

        // The next step still works and history keeps accumulating.
        let gateway2 = ScriptedGateway::new(vec!["{\"action\": \"move\", \"dx\": 5, \"dy\": 5}"]);
        let engine2 = engine_with(gateway2, sink.clone());
        let result = engine2.step("close the browser").await.unwrap();
        assert!(matches!(result, StepResult::InProgress { .. }));
        assert_eq!(engine2.history.lock().await.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn confirmed_finish_terminates_with_the_thought() {
        let gateway = ScriptedGateway::new(vec![
            "{\"thought\": \"dialog closed\", \"action\": \"finish\"}",
            "{\"verified\": true, \"reason\": \"desktop is empty\"}",
        ]);
        let engine = engine_with(gateway, Arc::new(RecordingSink::default()));

        let result = engine.step("close the dialog").await.unwrap();
        match result {
            StepResult::Finished { thought } => assert_eq!(thought, "dialog closed"),
            other => panic!("expected Finished, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_step_fails_fast_without_a_second_gateway_call() {
        let gate = Arc::new(tokio::sync::Notify::new());
        let mut gateway = ScriptedGateway::new(vec!["{\"action\": \"wait\", \"seconds\": 0.1}"]);
        gateway.gate = Some(gate.clone());
        let calls = gateway.calls.clone();

        let engine = Arc::new(engine_with(gateway, Arc::new(RecordingSink::default())));

        let first = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.step("goal").await })
        };
        // Let the first step reach the gated gateway call.
        tokio::task::yield_now().await;

        let err = engine.step("goal").await.unwrap_err();
        assert!(matches!(err, EyeHandError::Busy));

        gate.notify_one();
        let result = first.await.unwrap().unwrap();
        assert!(matches!(result, StepResult::InProgress { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // After the in-flight step finished, the engine is idle again.
        let gateway2 = ScriptedGateway::new(vec!["{\"action\": \"move\", \"dx\": 1, \"dy\": 1}"]);
        let engine2 = engine_with(gateway2, Arc::new(RecordingSink::default()));
        assert!(engine2.step("goal").await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn multiple_actions_execute_in_order_within_one_step() {
        let gateway = ScriptedGateway::new(vec![
            "[{\"action\": \"move\", \"dx\": 10, \"dy\": 0}, {\"action\": \"click\", \"button\": \"left\"}]",
        ]);
        let sink = Arc::new(RecordingSink::default());
        let engine = engine_with(gateway, sink.clone());

        let result = engine.step("press the button").await.unwrap();
        assert!(matches!(
            result,
            StepResult::InProgress {
                action: ActionKind::Click,
                ..
            }
        ));
        let calls = sink.calls.lock().unwrap();
        assert_eq!(*calls, vec!["move 10 0", "click left"]);
    }

    #[tokio::test(start_paused = true)]
    async fn history_is_capped_across_steps_and_cleared_on_reset() {
        let sink = Arc::new(RecordingSink::default());
        let engine = Arc::new(engine_with(
            ScriptedGateway::new(vec![
                "{\"action\": \"move\", \"dx\": 1, \"dy\": 0}",
                "{\"action\": \"move\", \"dx\": 2, \"dy\": 0}",
                "{\"action\": \"move\", \"dx\": 3, \"dy\": 0}",
                "{\"action\": \"move\", \"dx\": 4, \"dy\": 0}",
                "{\"action\": \"move\", \"dx\": 5, \"dy\": 0}",
            ]),
            sink,
        ));

        for _ in 0..5 {
            engine.step("goal").await.unwrap();
        }
        {
            let history = engine.history.lock().await;
            assert_eq!(history.len(), 3);
            let dxs: Vec<i32> = history.entries().map(|e| e.params.dx).collect();
            assert_eq!(dxs, vec![3, 4, 5]);
        }

        engine.reset().await;
        assert!(engine.history.lock().await.is_empty());
    }
}
