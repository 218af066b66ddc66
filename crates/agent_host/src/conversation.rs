//! Conversation state machine.
//!
//! A [`Conversation`] owns one message history and exposes the three mutating
//! entry points `send`, `edit` and `regenerate`. Each one rewrites a suffix of
//! the history and then runs the same pipeline:
//!
//! rate-limit check -> (vision reply | tool selection -> tool execution ->
//! (image reply | prompt enhancement -> streamed completion)) -> append.
//!
//! `edit` and `regenerate` truncate before any await point, so the truncation
//! is visible immediately and stays applied if a later stage fails.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;
use providers::openai::{CompletionBackend, VisionBackend};
use providers::rate_limit::{RateLimitInfo, RateLimitOutcome, RateLimiter};
use serde::Deserialize;
use shared::agent_api::{ChatMessage, StreamChunk};
use shared::chat::{ChatError, Message, RichContent, Role};
use shared::events::{ConversationEvent, Operation};
use shared::tool::ToolResult;
use tokio::sync::mpsc;

use crate::prompt_enhancer::PromptEnhancer;
use crate::tool_selector::{recent_context, ToolSelector};
use crate::tools::ToolGateway;

pub const DEFAULT_IMAGE_PROMPT: &str = "What's in this image?";

/// Everything a conversation talks to. Built once and shared between sessions.
pub struct ChatServices {
    pub rate_limiter: Arc<dyn RateLimiter>,
    pub selector: ToolSelector,
    pub gateway: ToolGateway,
    pub enhancer: PromptEnhancer,
    pub completion: Arc<dyn CompletionBackend>,
    /// `None` when no vision endpoint is configured
    pub vision: Option<Arc<dyn VisionBackend>>,
    pub system_prompt: String,
}

/// Loading flag and live partial response, readable while an operation runs.
#[derive(Clone, Default)]
pub struct LiveState {
    inner: Arc<LiveInner>,
}

#[derive(Default)]
struct LiveInner {
    loading: AtomicBool,
    partial: RwLock<String>,
}

impl LiveState {
    pub fn is_loading(&self) -> bool {
        self.inner.loading.load(Ordering::SeqCst)
    }

    /// Text streamed so far for the in-flight reply.
    pub fn partial_response(&self) -> String {
        self.inner.partial.read().clone()
    }

    fn set_loading(&self, loading: bool) {
        self.inner.loading.store(loading, Ordering::SeqCst);
    }

    fn push_partial(&self, text: &str) {
        self.inner.partial.write().push_str(text);
    }

    fn clear_partial(&self) {
        self.inner.partial.write().clear();
    }
}

/// Holds the loading flag for one operation. Dropping it, including when the
/// operation future itself is dropped mid-stream, clears loading and partial text.
struct LoadingGuard(LiveState);

impl LoadingGuard {
    fn start(live: LiveState) -> Self {
        live.set_loading(true);
        live.clear_partial();
        Self(live)
    }
}

impl Drop for LoadingGuard {
    fn drop(&mut self) {
        self.0.set_loading(false);
        self.0.clear_partial();
    }
}

/// An image question: either an explicit JSON payload or raw input carrying a data URL.
#[derive(Debug, Clone, PartialEq)]
pub struct VisionRequest {
    pub image: String,
    pub prompt: String,
}

#[derive(Deserialize)]
struct ImagePayload {
    #[serde(rename = "type")]
    kind: Option<String>,
    image: Option<String>,
    prompt: Option<String>,
}

impl VisionRequest {
    /// `{"type":"image","image":..,"prompt":..}`, or any non-JSON input containing
    /// `data:image`. JSON that is not an image payload is plain chat.
    pub fn parse(input: &str) -> Option<Self> {
        match serde_json::from_str::<serde_json::Value>(input) {
            Ok(value) => {
                let payload: ImagePayload = serde_json::from_value(value).ok()?;
                if payload.kind.as_deref() != Some("image") {
                    return None;
                }
                Some(Self {
                    image: payload.image.unwrap_or_default(),
                    prompt: payload
                        .prompt
                        .filter(|p| !p.trim().is_empty())
                        .unwrap_or_else(|| DEFAULT_IMAGE_PROMPT.to_string()),
                })
            }
            Err(_) if input.contains("data:image") => Some(Self {
                image: input.to_string(),
                prompt: DEFAULT_IMAGE_PROMPT.to_string(),
            }),
            Err(_) => None,
        }
    }
}

/// System prompt, prior turns flattened to text, then the enhanced user turn.
pub fn build_chat_messages(system_prompt: &str, previous: &[Message], enhanced_prompt: &str) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(previous.len() + 2);
    if !system_prompt.trim().is_empty() {
        messages.push(ChatMessage::system(system_prompt));
    }
    messages.extend(previous.iter().map(Message::to_chat_message));
    messages.push(ChatMessage::user(enhanced_prompt));
    messages
}

/// What one operation replies to, as slices of the current history.
struct Turn {
    input: String,
    /// Tool-selection context is the window ending here
    selector_end: usize,
    /// Completion history is `messages[..history_end]`
    history_end: usize,
}

pub struct Conversation {
    services: Arc<ChatServices>,
    messages: Vec<Message>,
    live: LiveState,
    last_error: Option<String>,
    rate_limited: bool,
    quota: Option<RateLimitInfo>,
    events: Option<mpsc::UnboundedSender<ConversationEvent>>,
}

impl Conversation {
    pub fn new(services: Arc<ChatServices>) -> Self {
        Self {
            services,
            messages: Vec::new(),
            live: LiveState::default(),
            last_error: None,
            rate_limited: false,
            quota: None,
            events: None,
        }
    }

    /// Create a conversation that reports progress on `events`.
    pub fn with_events(services: Arc<ChatServices>, events: mpsc::UnboundedSender<ConversationEvent>) -> Self {
        let mut conversation = Self::new(services);
        conversation.events = Some(events);
        conversation
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn live(&self) -> LiveState {
        self.live.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.live.is_loading()
    }

    pub fn partial_response(&self) -> String {
        self.live.partial_response()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn is_rate_limited(&self) -> bool {
        self.rate_limited
    }

    /// Quota reported by the most recent rate-limit check.
    pub fn quota(&self) -> Option<RateLimitInfo> {
        self.quota
    }

    /// Drop all history and transient state.
    pub fn reset(&mut self) {
        self.messages.clear();
        self.last_error = None;
        self.rate_limited = false;
        self.live.set_loading(false);
        self.live.clear_partial();
        tracing::info!("Conversation reset");
    }

    pub async fn send(&mut self, input: &str) -> Result<(), ChatError> {
        self.messages.push(Message::user(input));
        let len = self.messages.len();
        self.emit(ConversationEvent::MessageAppended { index: len - 1 });

        let turn = Turn {
            input: input.to_string(),
            selector_end: len,
            history_end: len - 1,
        };
        self.run(Operation::Send, turn).await
    }

    /// Replace the message at `index` with new user input and drop everything after it.
    pub async fn edit(&mut self, index: usize, input: &str) -> Result<(), ChatError> {
        let len = self.messages.len();
        if index >= len {
            return Err(ChatError::InvalidIndex { index, len });
        }

        self.messages.truncate(index + 1);
        self.messages[index] = Message::user(input);
        tracing::debug!(index, dropped = len - index - 1, "Edited message; history truncated");

        let turn = Turn {
            input: input.to_string(),
            selector_end: index + 1,
            history_end: index,
        };
        self.run(Operation::Edit { index }, turn).await
    }

    /// Replace the reply at `index` with a fresh one for the nearest preceding user message.
    pub async fn regenerate(&mut self, index: usize) -> Result<(), ChatError> {
        let len = self.messages.len();
        if index > len {
            return Err(ChatError::InvalidIndex { index, len });
        }
        let user_index = self.messages[..index]
            .iter()
            .rposition(|m| m.role == Role::User)
            .ok_or(ChatError::NoPriorUserMessage { index })?;
        let input = self.messages[user_index].text().to_string();

        self.messages.truncate(index);
        tracing::debug!(index, user_index, dropped = len - index, "Regenerating reply; history truncated");

        let turn = Turn {
            input,
            selector_end: index,
            history_end: user_index,
        };
        self.run(Operation::Regenerate { index }, turn).await
    }

    async fn run(&mut self, operation: Operation, turn: Turn) -> Result<(), ChatError> {
        let start = Instant::now();
        let loading = LoadingGuard::start(self.live.clone());
        self.last_error = None;
        self.emit(ConversationEvent::Started { operation });
        tracing::info!(operation = operation.name(), messages = self.messages.len(), "Operation started");

        let result = self.execute(&turn).await;

        if let Err(e) = &result {
            let message = e.user_message();
            tracing::error!(operation = operation.name(), error = %e, "Operation failed");
            self.last_error = Some(message.clone());
            self.emit(ConversationEvent::Failed { error: message });
        }

        drop(loading);
        let duration_ms = start.elapsed().as_millis() as u64;
        self.emit(ConversationEvent::Finished {
            operation,
            duration_ms,
        });
        tracing::info!(operation = operation.name(), duration_ms, ok = result.is_ok(), "Operation finished");
        result
    }

    async fn execute(&mut self, turn: &Turn) -> Result<(), ChatError> {
        self.check_rate_limit().await?;

        if let Some(request) = VisionRequest::parse(&turn.input) {
            let text = self.stream_vision(request).await?;
            self.append(Message::assistant(RichContent::text(text)));
            return Ok(());
        }

        let context = recent_context(&self.messages[..turn.selector_end]);
        let decision = self.services.selector.select(context).await;

        let tool_result = match &decision {
            Some(decision) => self.services.gateway.invoke(decision).await?,
            None => None,
        };

        if let Some(ToolResult::ImageUrl { images }) = tool_result {
            self.append(Message::assistant(RichContent::images(images)));
            return Ok(());
        }

        let enhanced = self
            .services
            .enhancer
            .enhance(&turn.input, tool_result.as_ref())
            .await;
        let request = build_chat_messages(
            &self.services.system_prompt,
            &self.messages[..turn.history_end],
            &enhanced.prompt,
        );

        let text = self.stream_completion(request).await?;
        if text.is_empty() {
            tracing::debug!("Completion produced no text; nothing appended");
            return Ok(());
        }
        self.append(Message::assistant(
            RichContent::text(text).with_links(enhanced.links),
        ));
        Ok(())
    }

    async fn check_rate_limit(&mut self) -> Result<(), ChatError> {
        match self.services.rate_limiter.check().await {
            Ok(RateLimitOutcome::Allowed(info)) => {
                self.quota = Some(info);
                Ok(())
            }
            Ok(RateLimitOutcome::Exceeded(info)) => {
                self.quota = Some(info);
                self.rate_limited = true;
                self.emit(ConversationEvent::RateLimited);
                tracing::warn!(limit = info.limit, reset = info.reset, "Rate limit exceeded");
                Err(ChatError::RateLimitExceeded)
            }
            Err(e) => Err(ChatError::RateLimitCheck(e.to_string())),
        }
    }

    async fn stream_completion(&self, messages: Vec<ChatMessage>) -> Result<String, ChatError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let completion = Arc::clone(&self.services.completion);
        let (result, text) = tokio::join!(completion.stream_chat(messages, tx), self.consume(rx));
        result.map_err(|e| ChatError::Completion(e.to_string()))?;
        Ok(text)
    }

    async fn stream_vision(&self, request: VisionRequest) -> Result<String, ChatError> {
        let vision = self
            .services
            .vision
            .clone()
            .ok_or_else(|| ChatError::Vision("no vision endpoint configured".into()))?;
        let (tx, rx) = mpsc::unbounded_channel();
        let (result, text) = tokio::join!(
            vision.stream_vision(request.image, request.prompt, tx),
            self.consume(rx)
        );
        result.map_err(|e| ChatError::Vision(e.to_string()))?;
        Ok(text)
    }

    /// Accumulate streamed text, mirroring it into the live partial buffer.
    async fn consume(&self, mut rx: mpsc::UnboundedReceiver<StreamChunk>) -> String {
        let mut accumulated = String::new();
        while let Some(chunk) = rx.recv().await {
            match chunk {
                StreamChunk::Text(text) => {
                    accumulated.push_str(&text);
                    self.live.push_partial(&text);
                    self.emit(ConversationEvent::Delta(text));
                }
                StreamChunk::Done => break,
            }
        }
        accumulated
    }

    fn append(&mut self, message: Message) {
        self.messages.push(message);
        self.emit(ConversationEvent::MessageAppended {
            index: self.messages.len() - 1,
        });
    }

    fn emit(&self, event: ConversationEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scriptable doubles for every collaborator of a conversation.

    use super::*;
    use crate::tools::{Tool, ToolGateway};
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use providers::openai::{ProposedToolCall, ToolChoiceBackend, ToolDefinition};
    use providers::youtube::{VideoInfo, VideoInfoFetcher};
    use shared::tool::{ToolCallDecision, ToolError};

    pub struct ScriptedCompletion {
        pub chunks: Vec<String>,
        /// Fail after sending the chunks
        pub fail: bool,
        /// Never finish after sending the chunks
        pub stall: bool,
        pub requests: Mutex<Vec<Vec<ChatMessage>>>,
    }

    impl ScriptedCompletion {
        fn scripted(chunks: &[&str], fail: bool, stall: bool) -> Arc<Self> {
            Arc::new(Self {
                chunks: chunks.iter().map(|c| c.to_string()).collect(),
                fail,
                stall,
                requests: Mutex::new(Vec::new()),
            })
        }

        pub fn replying(chunks: &[&str]) -> Arc<Self> {
            Self::scripted(chunks, false, false)
        }

        pub fn failing_after(chunks: &[&str]) -> Arc<Self> {
            Self::scripted(chunks, true, false)
        }

        pub fn stalling_after(chunks: &[&str]) -> Arc<Self> {
            Self::scripted(chunks, false, true)
        }

        pub fn request_count(&self) -> usize {
            self.requests.lock().len()
        }

        pub fn last_request(&self) -> Vec<ChatMessage> {
            self.requests.lock().last().cloned().unwrap_or_default()
        }
    }

    #[async_trait]
    impl CompletionBackend for ScriptedCompletion {
        async fn stream_chat(&self, messages: Vec<ChatMessage>, tx: mpsc::UnboundedSender<StreamChunk>) -> Result<()> {
            self.requests.lock().push(messages);
            for chunk in &self.chunks {
                let _ = tx.send(StreamChunk::Text(chunk.clone()));
            }
            if self.stall {
                std::future::pending::<()>().await;
            }
            if self.fail {
                return Err(anyhow!("stream read error: connection reset"));
            }
            let _ = tx.send(StreamChunk::Done);
            Ok(())
        }
    }

    #[async_trait]
    impl VisionBackend for ScriptedCompletion {
        async fn stream_vision(&self, image: String, prompt: String, tx: mpsc::UnboundedSender<StreamChunk>) -> Result<()> {
            self.stream_chat(vec![ChatMessage::user(prompt), ChatMessage::user(image)], tx)
                .await
        }
    }

    pub enum ChooserReply {
        Calls(Vec<(&'static str, String)>),
        Fail,
    }

    pub struct ScriptedChooser {
        pub reply: ChooserReply,
        pub contexts: Mutex<Vec<Vec<ChatMessage>>>,
    }

    impl ScriptedChooser {
        pub fn none() -> Arc<Self> {
            Self::with(ChooserReply::Calls(Vec::new()))
        }

        pub fn call(name: &'static str, arguments: serde_json::Value) -> Arc<Self> {
            Self::with(ChooserReply::Calls(vec![(name, arguments.to_string())]))
        }

        pub fn failing() -> Arc<Self> {
            Self::with(ChooserReply::Fail)
        }

        fn with(reply: ChooserReply) -> Arc<Self> {
            Arc::new(Self {
                reply,
                contexts: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl ToolChoiceBackend for ScriptedChooser {
        async fn propose_tool_calls(&self, messages: Vec<ChatMessage>, _tools: Vec<ToolDefinition>) -> Result<Vec<ProposedToolCall>> {
            self.contexts.lock().push(messages);
            match &self.reply {
                ChooserReply::Calls(calls) => Ok(calls
                    .iter()
                    .map(|(name, arguments)| ProposedToolCall {
                        name: name.to_string(),
                        arguments: arguments.clone(),
                    })
                    .collect()),
                ChooserReply::Fail => Err(anyhow!("tool choice error: 500 Internal Server Error")),
            }
        }
    }

    /// A tool returning a fixed result, or failing.
    pub struct CannedTool {
        pub name: &'static str,
        pub result: Option<ToolResult>,
        pub invocations: Mutex<usize>,
    }

    impl CannedTool {
        pub fn new(name: &'static str, result: Option<ToolResult>) -> Arc<Self> {
            Arc::new(Self {
                name,
                result,
                invocations: Mutex::new(0),
            })
        }
    }

    #[async_trait]
    impl Tool for CannedTool {
        fn name(&self) -> &'static str {
            self.name
        }

        fn description(&self) -> &'static str {
            "canned"
        }

        fn parameters(&self) -> serde_json::Value {
            serde_json::json!({"type": "object", "properties": {}})
        }

        async fn invoke(&self, _decision: &ToolCallDecision) -> Result<ToolResult, ToolError> {
            *self.invocations.lock() += 1;
            self.result
                .clone()
                .ok_or_else(|| anyhow!("news search failed with status: 502").into())
        }
    }

    pub struct FixedLimiter(pub Option<RateLimitOutcome>);

    #[async_trait]
    impl RateLimiter for FixedLimiter {
        async fn check(&self) -> Result<RateLimitOutcome> {
            self.0.ok_or_else(|| anyhow!("rate limit check failed: 500 Internal Server Error"))
        }
    }

    pub struct NoVideoInfo;

    #[async_trait]
    impl VideoInfoFetcher for NoVideoInfo {
        async fn video_info(&self, _video_id: &str) -> Result<VideoInfo> {
            Err(anyhow!("oembed disabled in tests"))
        }
    }

    pub struct Harness {
        pub completion: Arc<ScriptedCompletion>,
        pub vision: Arc<ScriptedCompletion>,
        pub chooser: Arc<ScriptedChooser>,
        pub limiter: Option<RateLimitOutcome>,
        pub tools: Vec<Arc<dyn Tool>>,
        pub vision_configured: bool,
    }

    impl Harness {
        pub fn new(completion: Arc<ScriptedCompletion>, chooser: Arc<ScriptedChooser>) -> Self {
            Self {
                completion,
                vision: ScriptedCompletion::replying(&["A cat ", "on a mat."]),
                chooser,
                limiter: Some(RateLimitOutcome::Allowed(RateLimitInfo {
                    limit: 20,
                    remaining: 19,
                    reset: 0,
                })),
                tools: Vec::new(),
                vision_configured: true,
            }
        }

        pub fn without_vision(mut self) -> Self {
            self.vision_configured = false;
            self
        }

        pub fn tool(mut self, tool: Arc<dyn Tool>) -> Self {
            self.tools.push(tool);
            self
        }

        pub fn limiter(mut self, outcome: Option<RateLimitOutcome>) -> Self {
            self.limiter = outcome;
            self
        }

        pub fn services(&self) -> Arc<ChatServices> {
            let mut gateway = ToolGateway::new();
            for tool in &self.tools {
                gateway.register(tool.clone());
            }
            Arc::new(ChatServices {
                rate_limiter: Arc::new(FixedLimiter(self.limiter)),
                selector: ToolSelector::new(self.chooser.clone(), gateway.definitions()),
                gateway,
                enhancer: PromptEnhancer::new(Arc::new(NoVideoInfo)),
                completion: self.completion.clone(),
                vision: self
                    .vision_configured
                    .then(|| self.vision.clone() as Arc<dyn VisionBackend>),
                system_prompt: "You cite sources.".into(),
            })
        }

        pub fn conversation(&self) -> Conversation {
            Conversation::new(self.services())
        }
    }
}
