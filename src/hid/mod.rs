use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::EyeHandResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MouseButton {
    #[default]
    Left,
    Right,
}

impl MouseButton {
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "right" => MouseButton::Right,
            _ => MouseButton::Left,
        }
    }
}

impl std::fmt::Display for MouseButton {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MouseButton::Left => write!(f, "left"),
            MouseButton::Right => write!(f, "right"),
        }
    }
}

/// Seam to the remote HID emulator. The transport (packet framing,
/// checksums, Wi-Fi provisioning) lives behind this trait; the agent only
/// issues primitives and checks connectivity before dispatching.
#[async_trait]
pub trait ActionSink: Send + Sync {
    async fn move_relative(&self, dx: i32, dy: i32) -> EyeHandResult<()>;
    async fn click(&self, button: MouseButton) -> EyeHandResult<()>;
    async fn key_tap(&self, ch: char) -> EyeHandResult<()>;
    fn is_connected(&self) -> bool;
}
