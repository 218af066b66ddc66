use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;
use providers::fal::ImageBackend;
use shared::tool::{ImageRef, ToolCallDecision, ToolError, ToolResult};

use super::Tool;

/// `generateImage`. Its result bypasses prompt enhancement and completion.
pub struct ImageTool {
    images: Arc<dyn ImageBackend>,
}

impl ImageTool {
    pub fn new(images: Arc<dyn ImageBackend>) -> Self {
        Self { images }
    }
}

#[async_trait]
impl Tool for ImageTool {
    fn name(&self) -> &'static str {
        "generateImage"
    }

    fn description(&self) -> &'static str {
        "Generate images using AI when the user asks for image creation, drawing, or visualization"
    }

    fn parameters(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "prompt": {
                    "type": "string",
                    "description": "The prompt to generate the image",
                },
            },
            "required": ["prompt"],
        })
    }

    async fn invoke(&self, decision: &ToolCallDecision) -> Result<ToolResult, ToolError> {
        let prompt = decision.required_str("prompt")?;
        let urls = self.images.generate(prompt).await?;
        if urls.is_empty() {
            return Err(anyhow!("No result from image generation").into());
        }
        Ok(ToolResult::ImageUrl {
            images: urls.into_iter().map(|url| ImageRef { url }).collect(),
        })
    }
}
