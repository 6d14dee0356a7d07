//! Candidate content competing for the context budget.

use ragloom_core::message::{Message, Role};
use serde::{Deserialize, Serialize};

/// Where a segment came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SegmentSource {
    /// A conversation turn; `index` is its position in the history (0 = oldest).
    History { role: Role, index: usize },
    ToolResult { id: String, capability: String },
}

/// One unit of assembled context.
///
/// Immutable once built: truncation produces a new segment with
/// `truncated = true` and the same source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextSegment {
    pub source: SegmentSource,
    pub text: String,
    /// Estimated cost including per-segment framing overhead.
    pub estimated_tokens: usize,
    pub priority: i32,
    #[serde(default)]
    pub truncated: bool,
}

impl ContextSegment {
    pub(crate) fn history(index: usize, message: &Message, estimated_tokens: usize) -> Self {
        Self {
            source: SegmentSource::History {
                role: message.role,
                index,
            },
            text: message.content.clone(),
            estimated_tokens,
            priority: 0,
            truncated: false,
        }
    }

    pub(crate) fn tool_result(result: &ToolResult, estimated_tokens: usize) -> Self {
        Self {
            source: SegmentSource::ToolResult {
                id: result.id.clone(),
                capability: result.capability.clone(),
            },
            text: result.content.clone(),
            estimated_tokens,
            priority: result.priority,
            truncated: false,
        }
    }

    /// A shortened copy of this segment.
    pub(crate) fn truncated_to(&self, text: String, estimated_tokens: usize) -> Self {
        Self {
            source: self.source.clone(),
            text,
            estimated_tokens,
            priority: self.priority,
            truncated: true,
        }
    }

    pub fn is_history(&self) -> bool {
        matches!(self.source, SegmentSource::History { .. })
    }

    /// Tool invocation id, for tool-result segments.
    pub fn tool_id(&self) -> Option<&str> {
        match &self.source {
            SegmentSource::ToolResult { id, .. } => Some(id),
            SegmentSource::History { .. } => None,
        }
    }

    /// Header used when rendering: the tool capability or the speaker role.
    pub fn label(&self) -> String {
        match &self.source {
            SegmentSource::ToolResult { capability, .. } => format!("[tool:{capability}]"),
            SegmentSource::History { role, .. } => format!("[{role}]"),
        }
    }
}

/// A successful tool result handed to the assembler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResult {
    pub id: String,
    pub capability: String,
    #[serde(default)]
    pub priority: i32,
    pub content: String,
}

impl ToolResult {
    pub fn new(id: impl Into<String>, capability: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            capability: capability.into(),
            priority: 0,
            content: content.into(),
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}
