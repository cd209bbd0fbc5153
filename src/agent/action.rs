use serde::{Deserialize, Serialize};

use crate::hid::MouseButton;

pub const DEFAULT_WAIT_SECS: f64 = 1.0;

/// Closed action vocabulary. Wire values are matched case-insensitively;
/// anything outside this set is a parse-time rejection, never a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Move,
    Click,
    Type,
    Wait,
    Finish,
}

impl ActionKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "move" => Some(ActionKind::Move),
            "click" => Some(ActionKind::Click),
            "type" => Some(ActionKind::Type),
            "wait" => Some(ActionKind::Wait),
            "finish" => Some(ActionKind::Finish),
            _ => None,
        }
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ActionKind::Move => "move",
            ActionKind::Click => "click",
            ActionKind::Type => "type",
            ActionKind::Wait => "wait",
            ActionKind::Finish => "finish",
        };
        write!(f, "{s}")
    }
}

/// Per-action parameters with fixed defaults. Models emit these either at
/// the top level of a record or nested under a `params` object; resolution
/// happens once in [`ActionRecord::from_value`], after which the fields are
/// plain values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSet {
    pub dx: i32,
    pub dy: i32,
    pub button: MouseButton,
    pub text: String,
    pub seconds: f64,
}

impl Default for ParamSet {
    fn default() -> Self {
        Self {
            dx: 0,
            dy: 0,
            button: MouseButton::Left,
            text: String::new(),
            seconds: DEFAULT_WAIT_SECS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRecord {
    pub kind: ActionKind,
    pub thought: String,
    pub params: ParamSet,
}

impl ActionRecord {
    /// Normalize one decoded JSON object into a record.
    ///
    /// Returns `None` when the `action` field is missing or names something
    /// outside the closed vocabulary; the caller decides whether dropping
    /// the record is fatal. Field resolution order: top-level field →
    /// `params` sub-object → default (top level wins when both exist).
    pub fn from_value(value: &serde_json::Value) -> Option<Self> {
        let kind = ActionKind::parse(value.get("action")?.as_str()?)?;

        let thought = field(value, "thought")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string();

        let params = ParamSet {
            dx: int_field(value, "dx"),
            dy: int_field(value, "dy"),
            button: field(value, "button")
                .and_then(|v| v.as_str())
                .map(MouseButton::parse)
                .unwrap_or_default(),
            text: field(value, "text")
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string(),
            seconds: field(value, "seconds")
                .and_then(|v| v.as_f64())
                .unwrap_or(DEFAULT_WAIT_SECS),
        };

        Some(Self {
            kind,
            thought,
            params,
        })
    }
}

fn field<'a>(value: &'a serde_json::Value, key: &str) -> Option<&'a serde_json::Value> {
    value
        .get(key)
        .or_else(|| value.get("params").and_then(|p| p.get(key)))
}

/// Resolve an integer field, saturating into i32 range. A wrapping cast
/// would flip the sign of oversized model output and reverse the move.
fn int_field(value: &serde_json::Value, key: &str) -> i32 {
    field(value, key)
        .and_then(|v| v.as_i64())
        .unwrap_or(0)
        .clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
}
