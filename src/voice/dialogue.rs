//! Per-session rolling dialogue history.
//!
//! Built around `types::Role` with an added `speaker` field for
//! multi-voice households and a bounded length so a long-running
//! session's history doesn't grow without limit — the system message,
//! when present, is always preserved across trims.

use serde::{Deserialize, Serialize};

use crate::types::Role;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DialogueMessage {
    pub role: Role,
    pub content: String,
    /// Identifies which household member said this, when voiceprint
    /// identification is enabled. `None` for assistant/system turns.
    #[serde(default)]
    pub speaker: Option<String>,
    #[serde(default)]
    pub tool_call_id: Option<String>,
}

impl DialogueMessage {
    pub fn user(content: impl Into<String>, speaker: Option<String>) -> Self {
        Self { role: Role::User, content: content.into(), speaker, tool_call_id: None }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into(), speaker: None, tool_call_id: None }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into(), speaker: None, tool_call_id: None }
    }

    /// Result of an MCP/IoT tool invocation, to be fed back to the
    /// dialogue model as part of the next turn's history.
    pub fn tool(content: impl Into<String>, tool_call_id: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            speaker: None,
            tool_call_id: Some(tool_call_id.into()),
        }
    }
}

/// Bounded message history for one session.
pub struct DialogueHistory {
    max_len: usize,
    messages: Vec<DialogueMessage>,
}

impl DialogueHistory {
    pub fn new(max_len: usize) -> Self {
        Self { max_len, messages: Vec::new() }
    }

    pub fn push(&mut self, message: DialogueMessage) {
        self.messages.push(message);
        self.trim();
    }

    pub fn messages(&self) -> &[DialogueMessage] {
        &self.messages
    }

    fn trim(&mut self) {
        if self.messages.len() <= self.max_len {
            return;
        }
        let system_prefix: Vec<DialogueMessage> = self
            .messages
            .iter()
            .take_while(|m| m.role == Role::System)
            .cloned()
            .collect();
        let keep_from = self.messages.len() - self.max_len + system_prefix.len();
        let mut trimmed = system_prefix;
        trimmed.extend(self.messages.drain(..).skip(keep_from));
        self.messages = trimmed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trims_while_preserving_system_prefix() {
        let mut history = DialogueHistory::new(3);
        history.push(DialogueMessage::system("you are a helpful assistant"));
        for i in 0..10 {
            history.push(DialogueMessage::user(format!("msg {i}"), None));
        }
        assert!(history.messages().len() <= 4);
        assert_eq!(history.messages()[0].role, Role::System);
        assert_eq!(history.messages().last().unwrap().content, "msg 9");
    }
}
