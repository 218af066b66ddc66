//! Picks at most one tool for the current turn.
//!
//! Selection is fail-open: a network error, an error status or an unparseable
//! response all mean "no tool", so a broken classifier never blocks chat.

use std::sync::Arc;

use providers::openai::{ToolChoiceBackend, ToolDefinition};
use shared::agent_api::ChatMessage;
use shared::chat::Message;
use shared::tool::ToolCallDecision;

use crate::prompts::get_tool_selector_prompt;

/// Messages forwarded to the selector: the last two user/assistant pairs.
pub const CONTEXT_WINDOW: usize = 4;

/// The trailing `CONTEXT_WINDOW` messages of `messages`.
pub fn recent_context(messages: &[Message]) -> &[Message] {
    &messages[messages.len().saturating_sub(CONTEXT_WINDOW)..]
}

pub struct ToolSelector {
    backend: Arc<dyn ToolChoiceBackend>,
    tools: Vec<ToolDefinition>,
    instruction: String,
}

impl ToolSelector {
    pub fn new(backend: Arc<dyn ToolChoiceBackend>, tools: Vec<ToolDefinition>) -> Self {
        let names: Vec<String> = tools.iter().map(|t| t.name.clone()).collect();
        Self {
            backend,
            tools,
            instruction: get_tool_selector_prompt(&names),
        }
    }

    /// Decide on a tool for `context` (already windowed by the caller).
    pub async fn select(&self, context: &[Message]) -> Option<ToolCallDecision> {
        if self.tools.is_empty() || context.is_empty() {
            return None;
        }

        let mut messages = Vec::with_capacity(context.len() + 1);
        messages.push(ChatMessage::system(self.instruction.clone()));
        messages.extend(context.iter().map(Message::to_chat_message));

        let calls = match self
            .backend
            .propose_tool_calls(messages, self.tools.clone())
            .await
        {
            Ok(calls) => calls,
            Err(e) => {
                tracing::warn!(error = %e, "Tool selection failed; continuing without tools");
                return None;
            }
        };

        let mut calls = calls.into_iter();
        let first = calls.next()?;
        let dropped = calls.count();
        if dropped > 0 {
            tracing::debug!(dropped, kept = %first.name, "Only the first proposed tool call is executed");
        }

        let arguments = if first.arguments.trim().is_empty() {
            serde_json::Map::new()
        } else {
            match serde_json::from_str::<serde_json::Value>(&first.arguments) {
                Ok(serde_json::Value::Object(map)) => map,
                Ok(other) => {
                    tracing::warn!(tool = %first.name, arguments = %other, "Tool arguments are not an object; ignoring tool call");
                    return None;
                }
                Err(e) => {
                    tracing::warn!(tool = %first.name, error = %e, "Failed to parse tool arguments; ignoring tool call");
                    return None;
                }
            }
        };

        tracing::info!(tool = %first.name, "Tool selected");
        Some(ToolCallDecision {
            tool_name: first.name,
            arguments,
        })
    }
}
