//! Dialogue-turn wrapper around the existing LLM client.
//!
//! `agent::llm::OpenRouterClient` already does everything a dialogue
//! turn needs (model routing, streaming, tool calls) and is reused
//! unmodified; this module only adapts [`crate::voice::dialogue::DialogueMessage`]
//! history to `ChatMessage` and turns the callback-based
//! `stream_complete` into the channel-based shape the rest of
//! `voice::*` uses, so the orchestrator can consume dialogue text the
//! same way it consumes ASR results and TTS output.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::agent::llm::{client_for_model, ChatMessage, OpenRouterClient, ToolDefinition};
use crate::types::Role;
use crate::voice::dialogue::DialogueMessage;
use crate::voice::errors::PipelineError;

#[async_trait]
pub trait DialogueModel: Send + Sync {
    /// Stream a reply to `history`, returning a channel of raw text
    /// chunks as they arrive. The orchestrator buffers these and
    /// splits them into sentences via
    /// [`crate::voice::tts::split_into_spoken_sentences`].
    async fn stream_reply(&self, history: &[DialogueMessage]) -> Result<mpsc::Receiver<String>, PipelineError>;

    /// One-shot completion with tool definitions, used for the thin
    /// MCP/IoT tool-invocation scaffolding.
    async fn complete_with_tools(
        &self,
        history: &[DialogueMessage],
        tools: Vec<ToolDefinition>,
    ) -> Result<ChatMessage, PipelineError>;
}

pub struct OpenRouterDialogueModel {
    client: OpenRouterClient,
    model: String,
    max_tokens: Option<u32>,
}

impl OpenRouterDialogueModel {
    pub fn new(client: OpenRouterClient, model: impl Into<String>, max_tokens: Option<u32>) -> Self {
        Self { client, model: model.into(), max_tokens }
    }

    /// Build from a bare model name, resolving NVIDIA NIM vs
    /// OpenRouter the same way the rest of the crate does.
    pub fn for_model(model: impl Into<String>, max_tokens: Option<u32>) -> anyhow::Result<Self> {
        let model = model.into();
        let client = client_for_model(&model)?;
        Ok(Self { client, model, max_tokens })
    }
}

fn to_chat_messages(history: &[DialogueMessage]) -> Vec<ChatMessage> {
    history
        .iter()
        .map(|m| match m.role {
            Role::System => ChatMessage::system(&m.content),
            Role::Assistant => ChatMessage::assistant(&m.content),
            Role::User => match &m.speaker {
                Some(speaker) => ChatMessage::user(format!("[{speaker}] {}", m.content)),
                None => ChatMessage::user(&m.content),
            },
            Role::Tool => ChatMessage::tool_result(m.tool_call_id.clone().unwrap_or_default(), &m.content),
        })
        .collect()
}

#[async_trait]
impl DialogueModel for OpenRouterDialogueModel {
    async fn stream_reply(&self, history: &[DialogueMessage]) -> Result<mpsc::Receiver<String>, PipelineError> {
        let messages = to_chat_messages(history);
        let (tx, rx) = mpsc::channel::<String>(64);
        let client = self.client.clone();
        let model = self.model.clone();
        let max_tokens = self.max_tokens;
        tokio::spawn(async move {
            let result = client
                .stream_complete(&model, messages, max_tokens, |chunk| {
                    let _ = tx.try_send(chunk.to_string());
                })
                .await;
            if let Err(e) = result {
                tracing::warn!(error = %e, "dialogue model stream failed");
            }
        });
        Ok(rx)
    }

    async fn complete_with_tools(
        &self,
        history: &[DialogueMessage],
        tools: Vec<ToolDefinition>,
    ) -> Result<ChatMessage, PipelineError> {
        let messages = to_chat_messages(history);
        self.client
            .complete_with_tools(&self.model, messages, tools, self.max_tokens)
            .await
            .map_err(|e| PipelineError::Dialogue(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_history_roles_and_speaker_tag() {
        let history = vec![
            DialogueMessage::system("be concise"),
            DialogueMessage::user("what's the weather", Some("mom".to_string())),
            DialogueMessage::assistant("sunny"),
        ];
        let messages = to_chat_messages(&history);
        assert_eq!(messages.len(), 3);
        let user_text = messages[1].content_as_text().unwrap_or_default();
        assert!(user_text.contains("[mom]"));
    }
}
