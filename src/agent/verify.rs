use std::time::Duration;

use crate::agent::parser;
use crate::agent::prompt;
use crate::errors::EyeHandResult;
use crate::llm::gateway::ModelGateway;
use crate::llm::types::ChatMessage;
use crate::vision::FrameSource;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyOutcome {
    Confirmed { reason: String },
    NotConfirmed { reason: String },
}

/// Terminal check run when the model proposes `finish`.
///
/// Capture failure is NotConfirmed rather than an error: continuing the
/// loop beats terminating on a stale claim of success. Gateway and parse
/// failures still propagate.
pub async fn verify(
    gateway: &dyn ModelGateway,
    frames: &dyn FrameSource,
    goal: &str,
    timeout: Duration,
) -> EyeHandResult<VerifyOutcome> {
    let Some(frame) = frames.latest_frame() else {
        tracing::warn!("verification: no fresh frame, treating as not confirmed");
        return Ok(VerifyOutcome::NotConfirmed {
            reason: "no frame available for verification".into(),
        });
    };

    let data_url = frame.to_data_url()?;
    let messages = vec![ChatMessage::user_with_image(
        prompt::verify_prompt(goal),
        data_url,
    )];
    let reply = gateway.chat(messages, timeout).await?;

    let values = parser::extract_json(&reply)?;
    let verdict = values.iter().find_map(|v| v.get("verified")?.as_bool());
    let reason = values
        .iter()
        .find_map(|v| v.get("reason")?.as_str().map(str::to_string))
        .unwrap_or_default();

    match verdict {
        Some(true) => {
            tracing::info!(reason = %reason, "goal verified");
            Ok(VerifyOutcome::Confirmed { reason })
        }
        Some(false) => {
            tracing::info!(reason = %reason, "goal not verified, loop continues");
            Ok(VerifyOutcome::NotConfirmed { reason })
        }
        None => {
            tracing::warn!("verification reply carried no verified field");
            Ok(VerifyOutcome::NotConfirmed {
                reason: "verification reply had no verdict".into(),
            })
        }
    }
}
