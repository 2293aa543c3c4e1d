//! Thin tool-invocation / MCP scaffolding.
//!
//! Grounded on `helloHandle.py`'s fire-and-forget MCP init tasks: the
//! original spawns MCP server handshakes in the background and never
//! blocks a dialogue turn on them. This module mirrors that shape —
//! a registry of callable tools the dialogue model can be offered via
//! [`crate::agent::llm::ToolDefinition`], dispatched by name, with no
//! built-in tools beyond what a device's IoT descriptor registration
//! supplies at connect time. Full skill/tool execution (file access,
//! shell, browser) lives in `agent::tools` and is out of scope here.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::agent::llm::ToolDefinition;
use crate::voice::errors::PipelineError;

#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn invoke(&self, arguments: Value) -> Result<Value, PipelineError>;
}

/// Per-session registry of tools exposed by a device's IoT
/// descriptors (`ClientMessage::Iot`) or MCP payload
/// (`ClientMessage::Mcp`). Populated as those messages arrive and
/// consulted when the dialogue model requests a tool call.
#[derive(Default)]
pub struct ToolRegistry {
    handlers: RwLock<HashMap<String, Arc<dyn ToolHandler>>>,
    definitions: RwLock<HashMap<String, ToolDefinition>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, definition: ToolDefinition, handler: Arc<dyn ToolHandler>) {
        let name = definition.function.name.clone();
        self.definitions.write().await.insert(name.clone(), definition);
        self.handlers.write().await.insert(name, handler);
    }

    pub async fn definitions(&self) -> Vec<ToolDefinition> {
        self.definitions.read().await.values().cloned().collect()
    }

    pub async fn invoke(&self, name: &str, arguments: Value) -> Result<Value, PipelineError> {
        let handler = self
            .handlers
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| PipelineError::protocol(format!("unknown tool: {name}")))?;
        handler.invoke(arguments).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::llm::FunctionDefinition;

    struct EchoTool;

    #[async_trait]
    impl ToolHandler for EchoTool {
        async fn invoke(&self, arguments: Value) -> Result<Value, PipelineError> {
            Ok(arguments)
        }
    }

    #[tokio::test]
    async fn registers_and_invokes_by_name() {
        let registry = ToolRegistry::new();
        let definition = ToolDefinition {
            r#type: "function".to_string(),
            function: FunctionDefinition {
                name: "turn_on_light".to_string(),
                description: "turn on a light".to_string(),
                parameters: serde_json::json!({"type": "object", "properties": {}}),
            },
        };
        registry.register(definition, Arc::new(EchoTool)).await;
        assert_eq!(registry.definitions().await.len(), 1);

        let result = registry.invoke("turn_on_light", serde_json::json!({"room": "kitchen"})).await.unwrap();
        assert_eq!(result["room"], "kitchen");

        assert!(registry.invoke("missing_tool", Value::Null).await.is_err());
    }
}
