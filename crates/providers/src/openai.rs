use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use shared::agent_api::{ChatMessage, StreamChunk};
use shared::settings::{ChatParameters, EndpointSettings};
use tokio::sync::mpsc::UnboundedSender;

use crate::sse::DeltaDecoder;
use crate::{excerpt, SHARED_HTTP};

/// Streaming chat completion.
///
/// Contract: errors before the first chunk and transport errors mid-stream are
/// both returned as `Err`; text already sent through `tx` is the caller's to discard.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn stream_chat(
        &self,
        messages: Vec<ChatMessage>,
        tx: UnboundedSender<StreamChunk>,
    ) -> Result<()>;
}

/// Non-streaming function-calling request with `tool_choice: "auto"`.
#[async_trait]
pub trait ToolChoiceBackend: Send + Sync {
    async fn propose_tool_calls(
        &self,
        messages: Vec<ChatMessage>,
        tools: Vec<ToolDefinition>,
    ) -> Result<Vec<ProposedToolCall>>;
}

/// Streaming image question answering.
#[async_trait]
pub trait VisionBackend: Send + Sync {
    async fn stream_vision(
        &self,
        image: String,
        prompt: String,
        tx: UnboundedSender<StreamChunk>,
    ) -> Result<()>;
}

/// Function-calling tool schema (name, description, JSON-schema parameters).
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// A tool call proposed by the model; `arguments` is the raw JSON string.
#[derive(Debug, Clone, PartialEq)]
pub struct ProposedToolCall {
    pub name: String,
    pub arguments: String,
}

// ── Request types ────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    frequency_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    presence_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<OpenAITool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'static str>,
}

impl OpenAIRequest {
    fn new(model: &str, messages: Vec<serde_json::Value>) -> Self {
        Self {
            model: model.to_string(),
            messages,
            stream: None,
            temperature: None,
            max_tokens: None,
            top_p: None,
            frequency_penalty: None,
            presence_penalty: None,
            tools: None,
            tool_choice: None,
        }
    }

    fn with_parameters(mut self, params: &ChatParameters) -> Self {
        self.temperature = Some(params.temperature);
        self.max_tokens = Some(params.max_tokens);
        self.top_p = Some(params.top_p);
        self.frequency_penalty = Some(params.frequency_penalty);
        self.presence_penalty = Some(params.presence_penalty);
        self
    }
}

#[derive(Debug, Clone, Serialize)]
struct OpenAITool {
    #[serde(rename = "type")]
    tool_type: String,
    function: OpenAIFunction,
}

#[derive(Debug, Clone, Serialize)]
struct OpenAIFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

// ── Non-streaming response types ─────────────────────────────────────

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    #[serde(default)]
    choices: Vec<OpenAIChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIResponseMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponseMessage {
    #[serde(default)]
    tool_calls: Option<Vec<OpenAIToolCall>>,
}

#[derive(Debug, Deserialize)]
struct OpenAIToolCall {
    function: OpenAIToolCallFunction,
}

#[derive(Debug, Deserialize)]
struct OpenAIToolCallFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

// ── Conversion ───────────────────────────────────────────────────────

fn to_openai_tool(tool: &ToolDefinition) -> OpenAITool {
    OpenAITool {
        tool_type: "function".to_string(),
        function: OpenAIFunction {
            name: tool.name.clone(),
            description: tool.description.clone(),
            parameters: tool.parameters.clone(),
        },
    }
}

fn to_openai_messages(messages: &[ChatMessage]) -> Vec<serde_json::Value> {
    messages
        .iter()
        .map(|m| {
            serde_json::json!({
                "role": m.role.as_str(),
                "content": m.content
            })
        })
        .collect()
}

/// Single user turn carrying `[text, image_url]` content parts.
fn vision_message(image: &str, prompt: &str) -> serde_json::Value {
    serde_json::json!({
        "role": "user",
        "content": [
            { "type": "text", "text": prompt },
            { "type": "image_url", "image_url": { "url": image } }
        ]
    })
}

fn first_tool_calls(body: OpenAIResponse) -> Vec<ProposedToolCall> {
    body.choices
        .into_iter()
        .next()
        .and_then(|c| c.message.tool_calls)
        .unwrap_or_default()
        .into_iter()
        .map(|call| ProposedToolCall {
            name: call.function.name,
            arguments: call.function.arguments,
        })
        .collect()
}

// ── Client ───────────────────────────────────────────────────────────

/// Client for any OpenAI-compatible `/chat/completions` endpoint.
pub struct OpenAIClient {
    http: Client,
    auth_token: String,
    model: String,
    base_url: String,
    parameters: Option<ChatParameters>,
}

impl OpenAIClient {
    pub fn from_endpoint(endpoint: &EndpointSettings) -> Result<Self> {
        Ok(Self {
            http: SHARED_HTTP.clone(),
            auth_token: endpoint.auth.resolve()?,
            model: endpoint.model.clone(),
            base_url: endpoint.base_url.trim_end_matches('/').to_string(),
            parameters: None,
        })
    }

    /// Sampling parameters sent with chat (not tool-choice) requests.
    pub fn with_parameters(mut self, parameters: ChatParameters) -> Self {
        self.parameters = Some(parameters);
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    async fn post(&self, req: &OpenAIRequest) -> Result<reqwest::Response> {
        let resp = self
            .http
            .post(self.completions_url())
            .header("Authorization", format!("Bearer {}", self.auth_token))
            .header("Content-Type", "application/json")
            .json(req)
            .send()
            .await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            let detail = excerpt(&body, 800);
            if detail.trim().is_empty() {
                return Err(anyhow!("completion error: {}", status));
            }
            return Err(anyhow!("completion error: {}\n{}", status, detail));
        }
        Ok(resp)
    }

    async fn stream_request(
        &self,
        req: OpenAIRequest,
        tx: &UnboundedSender<StreamChunk>,
    ) -> Result<()> {
        let resp = self.post(&req).await?;

        let mut decoder = DeltaDecoder::new();
        let mut stream = resp.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let bytes = chunk.map_err(|e| anyhow!("stream read error: {}", e))?;
            for text in decoder.feed(&bytes) {
                let _ = tx.send(StreamChunk::Text(text));
            }
            if decoder.is_done() {
                break;
            }
        }
        for text in decoder.finish() {
            let _ = tx.send(StreamChunk::Text(text));
        }

        let _ = tx.send(StreamChunk::Done);
        Ok(())
    }
}

#[async_trait]
impl CompletionBackend for OpenAIClient {
    async fn stream_chat(
        &self,
        messages: Vec<ChatMessage>,
        tx: UnboundedSender<StreamChunk>,
    ) -> Result<()> {
        let mut req = OpenAIRequest::new(&self.model, to_openai_messages(&messages));
        if let Some(params) = &self.parameters {
            req = req.with_parameters(params);
        }
        req.stream = Some(true);
        self.stream_request(req, &tx).await
    }
}

#[async_trait]
impl ToolChoiceBackend for OpenAIClient {
    async fn propose_tool_calls(
        &self,
        messages: Vec<ChatMessage>,
        tools: Vec<ToolDefinition>,
    ) -> Result<Vec<ProposedToolCall>> {
        let mut req = OpenAIRequest::new(&self.model, to_openai_messages(&messages));
        if !tools.is_empty() {
            req.tools = Some(tools.iter().map(to_openai_tool).collect());
            req.tool_choice = Some("auto");
        }
        let resp = self.post(&req).await?;
        let body: OpenAIResponse = resp
            .json()
            .await
            .map_err(|e| anyhow!("Failed to parse tool choice response: {}", e))?;
        Ok(first_tool_calls(body))
    }
}

#[async_trait]
impl VisionBackend for OpenAIClient {
    async fn stream_vision(
        &self,
        image: String,
        prompt: String,
        tx: UnboundedSender<StreamChunk>,
    ) -> Result<()> {
        let mut req = OpenAIRequest::new(&self.model, vec![vision_message(&image, &prompt)]);
        req.stream = Some(true);
        req.temperature = Some(1.0);
        req.max_tokens = Some(1024);
        req.top_p = Some(1.0);
        self.stream_request(req, &tx).await
    }
}
