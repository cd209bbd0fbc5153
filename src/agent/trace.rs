use std::io::Write;

use serde::{Deserialize, Serialize};

use crate::errors::EyeHandResult;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEntry {
    pub ts: i64,
    pub goal: Option<String>,
    pub action: Option<serde_json::Value>,
    pub note: Option<String>,
}

impl TraceEntry {
    pub fn now(
        goal: Option<String>,
        action: Option<serde_json::Value>,
        note: Option<String>,
    ) -> Self {
        Self {
            ts: chrono::Utc::now().timestamp_millis(),
            goal,
            action,
            note,
        }
    }
}

/// Append-only JSONL trace of one agent session, kept for post-mortem
/// inspection. Never consulted by control logic.
pub struct SessionTrace {
    pub session_id: String,
    file_path: std::path::PathBuf,
}

impl SessionTrace {
    pub fn new() -> Self {
        let session_id = uuid::Uuid::new_v4().to_string();
        let file_path = sessions_dir().join(format!("session_{session_id}.jsonl"));
        Self {
            session_id,
            file_path,
        }
    }

    /// Append one entry. IO failures are the caller's to ignore; the trace
    /// must never break a step.
    pub fn append(&self, entry: &TraceEntry) -> EyeHandResult<()> {
        let line = serde_json::to_string(entry)?;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.file_path)?;
        writeln!(file, "{line}")?;
        tracing::debug!(path = %self.file_path.display(), "trace entry flushed");
        Ok(())
    }
}

impl Default for SessionTrace {
    fn default() -> Self {
        Self::new()
    }
}

/// `<platform data dir>/eyehand/sessions`, falling back to the working
/// directory when no data dir exists.
fn sessions_dir() -> std::path::PathBuf {
    if let Some(base) = dirs::data_local_dir() {
        let dir = base.join("eyehand").join("sessions");
        let _ = std::fs::create_dir_all(&dir);
        return dir;
    }
    std::env::current_dir().unwrap_or_else(|_| std::path::PathBuf::from("."))
}
