//! Agent Host - chat orchestration over web tools
//!
//! This crate turns a user message into an assistant reply:
//! - Pick at most one tool for the turn (web, news, stocks, places, shopping,
//!   image generation, YouTube transcripts)
//! - Run it and fold the results into a citation-numbered prompt
//! - Stream the completion and keep the conversation history consistent
//!   across send, edit and regenerate

pub mod conversation;
pub mod prompt_enhancer;
pub mod prompts;
pub mod session_store;
pub mod tool_selector;
pub mod tools;
pub mod youtube;

use std::sync::Arc;

use anyhow::{Context, Result};
use providers::fal::{FalClient, ImageBackend};
use providers::openai::{OpenAIClient, ToolChoiceBackend, VisionBackend};
use providers::searchapi::{SearchApiClient, TranscriptBackend};
use providers::serper::{SearchBackend, SerperClient};
use providers::youtube::OEmbedClient;
use shared::settings::AppSettings;

pub use conversation::{ChatServices, Conversation, LiveState, VisionRequest};
pub use prompt_enhancer::{EnhancedPrompt, PromptEnhancer};
pub use session_store::SessionStore;
pub use tool_selector::ToolSelector;
pub use tools::{Tool, ToolDeps, ToolGateway};

/// A tool-side client, or `None` with a warning when it cannot be configured.
fn optional<T>(component: &'static str, built: Result<T>) -> Option<T> {
    match built {
        Ok(client) => Some(client),
        Err(e) => {
            tracing::warn!(component, error = %e, "Not configured; its tools are unavailable");
            None
        }
    }
}

/// Wire the production clients described by `settings`.
///
/// Only the chat endpoint is required. Tool backends, tool choice and vision
/// that fail to configure are left out, so chat still works without them.
pub fn build_services(settings: &AppSettings) -> Result<ChatServices> {
    let chat = Arc::new(
        OpenAIClient::from_endpoint(&settings.chat)
            .context("Failed to configure chat endpoint")?
            .with_parameters(settings.parameters.clone()),
    );

    let tools = ToolGateway::standard(ToolDeps {
        search: optional("search", SerperClient::from_settings(&settings.search))
            .map(|c| Arc::new(c) as Arc<dyn SearchBackend>),
        images: optional("image generation", FalClient::from_settings(&settings.image))
            .map(|c| Arc::new(c) as Arc<dyn ImageBackend>),
        transcripts: optional("transcripts", SearchApiClient::from_settings(&settings.transcript))
            .map(|c| Arc::new(c) as Arc<dyn TranscriptBackend>),
        scan: settings.scan,
        transcript_language: settings.transcript.language.clone(),
    });

    // Without a tool-choice endpoint nothing can be selected, so no tools are offered.
    let (tool_choice, gateway): (Arc<dyn ToolChoiceBackend>, ToolGateway) =
        match optional("tool choice", OpenAIClient::from_endpoint(&settings.tool_choice)) {
            Some(client) => (Arc::new(client) as Arc<dyn ToolChoiceBackend>, tools),
            None => (chat.clone() as Arc<dyn ToolChoiceBackend>, ToolGateway::new()),
        };
    let selector = ToolSelector::new(tool_choice, gateway.definitions());

    let vision = optional("vision", OpenAIClient::from_endpoint(&settings.vision))
        .map(|c| Arc::new(c.with_parameters(settings.parameters.clone())) as Arc<dyn VisionBackend>);

    let enhancer = PromptEnhancer::new(Arc::new(OEmbedClient::new(settings.youtube_oembed_url.clone())));

    tracing::info!(
        chat_model = chat.model(),
        vision = vision.is_some(),
        tools = gateway.names().len(),
        rate_limit = settings.rate_limit.enabled,
        "Chat services ready"
    );

    Ok(ChatServices {
        rate_limiter: Arc::from(providers::rate_limit::from_settings(&settings.rate_limit)),
        selector,
        gateway,
        enhancer,
        completion: chat,
        vision,
        system_prompt: settings.system_prompt.clone(),
    })
}

/// Owns the shared services and the sessions built on them.
pub struct AgentHost {
    pub settings: AppSettings,
    sessions: SessionStore,
}

impl AgentHost {
    pub fn new(settings: AppSettings) -> Result<Self> {
        let services = Arc::new(build_services(&settings)?);
        Ok(Self {
            settings,
            sessions: SessionStore::new(services),
        })
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }
}
