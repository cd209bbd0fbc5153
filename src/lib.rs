pub mod agent;
pub mod config;
pub mod errors;
pub mod hid;
pub mod llm;
pub mod service;
pub mod vision;

use std::sync::Arc;

pub use agent::engine::{DecisionEngine, StepResult};
pub use errors::{EyeHandError, EyeHandResult};
pub use service::AgentWorker;

use crate::hid::ActionSink;
use crate::llm::gateway::OpenAiGateway;
use crate::vision::FrameSource;

/// Install the global tracing subscriber. Call once from the embedding
/// binary before anything else.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}

/// Wire up a worker from config.toml and the two external seams.
///
/// Construct one per process and hand it to whatever exposes the task
/// surface; there is no ambient global instance.
pub fn bootstrap(
    frames: Arc<dyn FrameSource>,
    sink: Arc<dyn ActionSink>,
) -> EyeHandResult<AgentWorker> {
    let config = config::load_config()?;
    let gateway = Arc::new(OpenAiGateway::from_config(&config.gateway));
    let engine = Arc::new(DecisionEngine::new(gateway, frames, sink, config));
    Ok(AgentWorker::new(engine))
}
