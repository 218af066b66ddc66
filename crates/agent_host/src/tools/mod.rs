//! Tool registry and dispatch.
//!
//! Every external capability the selector can pick is a [`Tool`]. The
//! [`ToolGateway`] owns them by name and turns a [`ToolCallDecision`] into a
//! [`ToolResult`]. Unknown names are not an error: they produce no result and
//! the turn continues as plain chat. Failures inside a tool are returned to
//! the caller unchanged.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use providers::fal::ImageBackend;
use providers::openai::ToolDefinition;
use providers::searchapi::TranscriptBackend;
use providers::serper::SearchBackend;
use shared::settings::ScanLimits;
use shared::tool::{ToolCallDecision, ToolError, ToolResult};

pub mod image;
pub mod news;
pub mod places;
pub mod shopping;
pub mod stock;
pub mod transcript;

/// Site filter appended to a query to surface social-media posts.
pub const SOCIAL_FILTER: &str = " site:twitter.com OR site:x.com inurl:status";

/// A capability the tool selector may choose.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Function name exposed to the selector (camelCase)
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    /// JSON schema of the arguments object
    fn parameters(&self) -> serde_json::Value;

    async fn invoke(&self, decision: &ToolCallDecision) -> Result<ToolResult, ToolError>;
}

/// Collaborators the standard tool set is built from. A missing backend
/// leaves its tools out of the catalogue.
pub struct ToolDeps {
    pub search: Option<Arc<dyn SearchBackend>>,
    pub images: Option<Arc<dyn ImageBackend>>,
    pub transcripts: Option<Arc<dyn TranscriptBackend>>,
    pub scan: ScanLimits,
    pub transcript_language: String,
}

pub struct ToolGateway {
    tools: HashMap<String, Arc<dyn Tool>>,
    /// Registration order, used for the selector schema
    order: Vec<String>,
}

impl ToolGateway {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// The full catalogue, generic web search first.
    pub fn standard(deps: ToolDeps) -> Self {
        let mut gateway = Self::new();
        if let Some(search) = deps.search {
            gateway.register(Arc::new(news::WebSearchTool::new(search.clone(), deps.scan)));
            gateway.register(Arc::new(news::NewsTool::new(search.clone(), deps.scan)));
            gateway.register(Arc::new(stock::StockInfoTool::new(search.clone(), deps.scan)));
            gateway.register(Arc::new(places::PlacesTool::new(search.clone(), deps.scan)));
            gateway.register(Arc::new(shopping::ShoppingTool::new(search, deps.scan)));
        }
        if let Some(images) = deps.images {
            gateway.register(Arc::new(image::ImageTool::new(images)));
        }
        if let Some(transcripts) = deps.transcripts {
            gateway.register(Arc::new(transcript::TranscriptTool::new(
                transcripts,
                deps.transcript_language,
            )));
        }
        gateway
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), tool).is_none() {
            self.order.push(name);
        }
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    pub fn names(&self) -> &[String] {
        &self.order
    }

    /// Schema handed to the tool-choice model.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|tool| ToolDefinition {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: tool.parameters(),
            })
            .collect()
    }

    /// Run the tool named by `decision`. `Ok(None)` when no such tool exists.
    pub async fn invoke(&self, decision: &ToolCallDecision) -> Result<Option<ToolResult>, ToolError> {
        let Some(tool) = self.tools.get(&decision.tool_name) else {
            tracing::debug!(tool = %decision.tool_name, "Unknown tool; continuing without tool output");
            return Ok(None);
        };

        let start = Instant::now();
        let result = tool.invoke(decision).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        match &result {
            Ok(output) => {
                tracing::info!(tool = %decision.tool_name, kind = output.kind(), duration_ms, "Tool completed")
            }
            Err(e) => {
                tracing::warn!(tool = %decision.tool_name, error = %e, duration_ms, "Tool failed")
            }
        }
        result.map(Some)
    }
}

impl Default for ToolGateway {
    fn default() -> Self {
        Self::new()
    }
}

/// `{query, time?}` schema shared by the search-style tools.
pub(crate) fn query_with_time_schema(query_description: &str) -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "query": {
                "type": "string",
                "description": query_description,
            },
            "time": {
                "type": "string",
                "description": TIME_DESCRIPTION,
            },
        },
        "required": ["query"],
    })
}

pub(crate) const TIME_DESCRIPTION: &str = "Optional time range: d (past day), w (past week), m (past month), y (past year), optionally followed by a count, e.g. d3, w2, m6";
