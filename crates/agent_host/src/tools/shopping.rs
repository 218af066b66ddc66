use std::sync::Arc;

use async_trait::async_trait;
use providers::serper::{SearchBackend, SearchQuery, ShoppingResult};
use shared::settings::ScanLimits;
use shared::tool::{ShoppingItem, ToolCallDecision, ToolError, ToolResult};

use super::Tool;

/// `goShopping`: product listings with prices.
pub struct ShoppingTool {
    search: Arc<dyn SearchBackend>,
    scan: ScanLimits,
}

impl ShoppingTool {
    pub fn new(search: Arc<dyn SearchBackend>, scan: ScanLimits) -> Self {
        Self { search, scan }
    }
}

fn to_item(result: ShoppingResult) -> ShoppingItem {
    ShoppingItem {
        title: result.title,
        link: result.link,
        price: result.price.unwrap_or_default(),
        source: result.source,
        image_url: result.image_url,
    }
}

#[async_trait]
impl Tool for ShoppingTool {
    fn name(&self) -> &'static str {
        "goShopping"
    }

    fn description(&self) -> &'static str {
        "Search for shopping items using the given query"
    }

    fn parameters(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The search query for shopping items",
                },
            },
            "required": ["query"],
        })
    }

    async fn invoke(&self, decision: &ToolCallDecision) -> Result<ToolResult, ToolError> {
        let query = decision.required_str("query")?;
        let results = self
            .search
            .shopping(SearchQuery::new(query).num(self.scan.pages))
            .await?;

        Ok(ToolResult::Shopping {
            shopping: results
                .into_iter()
                .take(self.scan.pages)
                .map(to_item)
                .collect(),
        })
    }
}
