//! Plan → ground → execute pipeline.
//!
//! Three sequential gateway calls replace the single decision call: a
//! text-only plan of UI elements, one concurrent locate call per element
//! against the current frame, and a final call that turns plan + locations
//! into explicit relative displacements.

use std::collections::HashMap;
use std::time::Duration;

use futures_util::future::join_all;
use serde::{Deserialize, Serialize};

use crate::agent::action::{ActionKind, ActionRecord};
use crate::agent::parser;
use crate::agent::prompt;
use crate::config::AgentConfig;
use crate::errors::EyeHandResult;
use crate::llm::gateway::ModelGateway;
use crate::llm::types::ChatMessage;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanElement {
    pub target_element: String,
    pub description: String,
    pub action: ActionKind,
    /// The plan entry anchoring the current pointer position, the zero
    /// point for displacement math.
    pub is_reference: bool,
}

impl PlanElement {
    /// Lenient decode of one plan object. Elements without a target name
    /// are unusable and dropped; an unknown action falls back to move.
    fn from_value(value: &serde_json::Value) -> Option<Self> {
        let target_element = value.get("targetElement")?.as_str()?.trim().to_string();
        if target_element.is_empty() {
            return None;
        }
        Some(Self {
            target_element,
            description: value
                .get("description")
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string(),
            action: value
                .get("action")
                .and_then(|v| v.as_str())
                .and_then(ActionKind::parse)
                .unwrap_or(ActionKind::Move),
            is_reference: value
                .get("isReference")
                .and_then(|v| v.as_bool())
                .unwrap_or(false),
        })
    }
}

/// Raw grounding-model output per target element. Never parsed numerically
/// by the core; it is quoted verbatim into the execute-stage prompt.
pub type LocationResult = HashMap<String, String>;

/// Parse the plan-stage reply. A plan without a reference element degrades
/// (displacement precision is lost) but never fails the pipeline.
pub fn parse_plan(raw: &str) -> EyeHandResult<Vec<PlanElement>> {
    let values = parser::extract_json(raw)?;
    let elements: Vec<PlanElement> = values.iter().filter_map(PlanElement::from_value).collect();

    if elements.is_empty() {
        return Err(crate::errors::EyeHandError::Parse(
            "plan reply contained no usable elements".into(),
        ));
    }
    if !elements.iter().any(|e| e.is_reference) {
        tracing::warn!(
            "plan has no reference element; proceeding with unknown cursor position \
             (displacement precision degraded)"
        );
    }
    Ok(elements)
}

fn render_plan(elements: &[PlanElement]) -> String {
    elements
        .iter()
        .map(|e| {
            format!(
                "- {} ({}): {}{}\n",
                e.target_element,
                e.action,
                e.description,
                if e.is_reference { " [reference: cursor]" } else { "" }
            )
        })
        .collect()
}

fn render_locations(locations: &LocationResult) -> String {
    if locations.is_empty() {
        return "(no grounding results)\n".to_string();
    }
    locations
        .iter()
        .map(|(target, raw)| format!("- {target}: {raw}\n"))
        .collect()
}

/// Ground stage: one locate call per element, all in flight at once.
/// Failures are logged and skipped; the execute stage works with whatever
/// was located.
pub async fn ground(
    gateway: &dyn ModelGateway,
    elements: &[PlanElement],
    frame_data_url: &str,
    timeout: Duration,
) -> LocationResult {
    let calls = elements.iter().map(|element| async move {
        let query = prompt::ground_query(&element.target_element, &element.description);
        let messages = vec![ChatMessage::user_with_image(query, frame_data_url)];
        match gateway.chat(messages, timeout).await {
            Ok(reply) => Some((element.target_element.clone(), reply)),
            Err(e) => {
                tracing::warn!(
                    target = %element.target_element,
                    error = %e,
                    "grounding call failed, element skipped"
                );
                None
            }
        }
    });

    let locations: LocationResult = join_all(calls).await.into_iter().flatten().collect();
    tracing::info!(
        located = locations.len(),
        requested = elements.len(),
        "ground stage complete"
    );
    locations
}

/// Run the full pipeline and return the actions to execute.
pub async fn decide(
    gateway: &dyn ModelGateway,
    goal: &str,
    history_block: &str,
    frame_data_url: &str,
    cfg: &AgentConfig,
    timeout: Duration,
) -> EyeHandResult<Vec<ActionRecord>> {
    // Plan stage is text-only.
    let plan_reply = gateway
        .chat(
            vec![ChatMessage::user_text(prompt::plan_prompt(goal, history_block))],
            timeout,
        )
        .await?;
    let plan = parse_plan(&plan_reply)?;
    tracing::info!(elements = plan.len(), "plan stage complete");

    let locations = ground(gateway, &plan, frame_data_url, timeout).await;

    let exec_reply = gateway
        .chat(
            vec![ChatMessage::user_text(prompt::execute_prompt(
                goal,
                &render_plan(&plan),
                &render_locations(&locations),
                cfg.screen_width,
                cfg.screen_height,
            ))],
            timeout,
        )
        .await?;
    parser::parse_actions(&exec_reply)
}
