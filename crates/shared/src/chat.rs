//! Conversation data model: messages, rich assistant content and citations.

use serde::{Deserialize, Serialize};

use crate::agent_api::ChatMessage;
use crate::tool::{ImageRef, ToolError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// A numbered source reference. `sequence_number` matches the `[n]` marker
/// embedded in the enhanced prompt for the same item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Citation {
    pub sequence_number: u32,
    pub url: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub domain: String,
}

/// Assistant reply carrying optional generated images and citation links.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RichContent {
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<ImageRef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<Citation>,
}

impl RichContent {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn images(images: Vec<ImageRef>) -> Self {
        Self {
            text: String::new(),
            images,
            links: Vec::new(),
        }
    }

    pub fn with_links(mut self, links: Vec<Citation>) -> Self {
        self.links = links;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Rich(RichContent),
}

impl MessageContent {
    /// Plain text view, as forwarded to completion endpoints.
    pub fn as_text(&self) -> &str {
        match self {
            MessageContent::Text(text) => text,
            MessageContent::Rich(rich) => &rich.text,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: MessageContent,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn assistant(content: RichContent) -> Self {
        Self {
            role: Role::Assistant,
            content: MessageContent::Rich(content),
        }
    }

    pub fn text(&self) -> &str {
        self.content.as_text()
    }

    pub fn links(&self) -> &[Citation] {
        match &self.content {
            MessageContent::Rich(rich) => &rich.links,
            MessageContent::Text(_) => &[],
        }
    }

    pub fn images(&self) -> &[ImageRef] {
        match &self.content {
            MessageContent::Rich(rich) => &rich.images,
            MessageContent::Text(_) => &[],
        }
    }

    pub fn to_chat_message(&self) -> ChatMessage {
        ChatMessage::new(self.role, self.text())
    }
}

/// Errors surfaced by conversation operations.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Rate limit check failed: {0}")]
    RateLimitCheck(String),

    #[error("Tool execution failed: {0}")]
    ToolExecution(#[from] ToolError),

    #[error("Completion failed: {0}")]
    Completion(String),

    #[error("Image chat failed: {0}")]
    Vision(String),

    #[error("No user message found to regenerate response at index {index}")]
    NoPriorUserMessage { index: usize },

    #[error("Message index {index} is out of range for {len} messages")]
    InvalidIndex { index: usize, len: usize },

    #[error("Another operation is already running for this session")]
    Busy,

    #[error("Session not found: {0}")]
    UnknownSession(String),
}

impl ChatError {
    /// Single human-readable line for the UI error slot.
    pub fn user_message(&self) -> String {
        match self {
            ChatError::RateLimitExceeded => "Rate limit exceeded. Try again later.".to_string(),
            ChatError::RateLimitCheck(_)
            | ChatError::ToolExecution(_)
            | ChatError::Completion(_)
            | ChatError::Vision(_) => "Failed to send message".to_string(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_and_rich_content_text() {
        let user = Message::user("hello");
        assert_eq!(user.text(), "hello");
        assert!(user.links().is_empty());

        let reply = Message::assistant(RichContent::text("hi there"));
        assert_eq!(reply.text(), "hi there");
        assert_eq!(reply.to_chat_message().role, Role::Assistant);
    }

    #[test]
    fn test_content_serializes_untagged() {
        let user = serde_json::to_value(Message::user("hello")).unwrap();
        assert_eq!(user["content"], "hello");
        assert_eq!(user["role"], "user");

        let reply = Message::assistant(RichContent::images(vec![ImageRef {
            url: "https://img.example/1.png".into(),
        }]));
        let value = serde_json::to_value(&reply).unwrap();
        assert_eq!(value["content"]["text"], "");
        assert_eq!(value["content"]["images"][0]["url"], "https://img.example/1.png");
        assert!(value["content"].get("links").is_none());
    }

    #[test]
    fn test_citation_camel_case() {
        let citation = Citation {
            sequence_number: 2,
            url: "https://news.example/a".into(),
            title: "A".into(),
            description: None,
            date: Some("1 hour ago".into()),
            image_url: None,
            domain: "news.example".into(),
        };
        let value = serde_json::to_value(&citation).unwrap();
        assert_eq!(value["sequenceNumber"], 2);
        assert!(value.get("imageUrl").is_none());
    }

    #[test]
    fn test_user_message_hides_transport_detail() {
        let err = ChatError::Completion("openai error: 502 Bad Gateway".into());
        assert_eq!(err.user_message(), "Failed to send message");

        let err = ChatError::NoPriorUserMessage { index: 0 };
        assert!(err.user_message().contains("No user message"));
    }
}
