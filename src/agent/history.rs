use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::agent::action::{ActionKind, ActionRecord, ParamSet};

const THOUGHT_PREVIEW_CHARS: usize = 120;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub action: ActionKind,
    pub params: ParamSet,
    pub thought: String,
}

impl From<&ActionRecord> for HistoryEntry {
    fn from(record: &ActionRecord) -> Self {
        Self {
            action: record.kind,
            params: record.params.clone(),
            thought: record.thought.clone(),
        }
    }
}

/// Rolling record of the most recent executed actions, used only to enrich
/// future prompts. Bounded, FIFO eviction, cleared when a new task begins.
pub struct DecisionHistory {
    entries: VecDeque<HistoryEntry>,
    capacity: usize,
}

impl DecisionHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, entry: HistoryEntry) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    /// Human-readable block for the prompt: action, displacement when
    /// relevant, and a truncated thought.
    pub fn render(&self) -> String {
        if self.entries.is_empty() {
            return "(no previous actions)".to_string();
        }
        let mut out = String::new();
        for (i, entry) in self.entries.iter().enumerate() {
            let detail = match entry.action {
                ActionKind::Move => format!(" dx={} dy={}", entry.params.dx, entry.params.dy),
                ActionKind::Click => format!(" button={}", entry.params.button),
                ActionKind::Type => format!(" text={:?}", entry.params.text),
                ActionKind::Wait => format!(" seconds={}", entry.params.seconds),
                ActionKind::Finish => String::new(),
            };
            let thought: String = entry.thought.chars().take(THOUGHT_PREVIEW_CHARS).collect();
            out.push_str(&format!(
                "{}. {}{} - {}\n",
                i + 1,
                entry.action,
                detail,
                thought
            ));
        }
        out
    }
}
