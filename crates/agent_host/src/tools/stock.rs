use std::sync::Arc;

use async_trait::async_trait;
use providers::serper::SearchBackend;
use shared::settings::ScanLimits;
use shared::tool::{TimeRange, ToolCallDecision, ToolError, ToolResult};

use super::news::{fetch_news, fetch_social, time_arg};
use super::{Tool, TIME_DESCRIPTION};

/// `getStockInfo`: recent news and posts about a listed company.
pub struct StockInfoTool {
    search: Arc<dyn SearchBackend>,
    scan: ScanLimits,
}

impl StockInfoTool {
    pub fn new(search: Arc<dyn SearchBackend>, scan: ScanLimits) -> Self {
        Self { search, scan }
    }
}

/// `NASDAQ:AAPL` -> `AAPL`; a bare symbol is returned unchanged.
pub fn ticker_symbol(ticker: &str) -> &str {
    ticker.rsplit(':').next().unwrap_or(ticker).trim()
}

#[async_trait]
impl Tool for StockInfoTool {
    fn name(&self) -> &'static str {
        "getStockInfo"
    }

    fn description(&self) -> &'static str {
        "Get recent news and social media posts about a public company when the user mentions a stock or ticker"
    }

    fn parameters(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "ticker": {
                    "type": "string",
                    "description": "The stock ticker symbol and market name, example NYSE:K or NASDAQ:AAPL",
                },
                "time": {
                    "type": "string",
                    "description": TIME_DESCRIPTION,
                },
            },
            "required": ["ticker"],
        })
    }

    async fn invoke(&self, decision: &ToolCallDecision) -> Result<ToolResult, ToolError> {
        let ticker = decision.required_str("ticker")?;
        let symbol = ticker_symbol(ticker);
        if symbol.is_empty() {
            return Err(ToolError::InvalidArgument {
                tool: decision.tool_name.clone(),
                argument: "ticker",
                message: format!("no symbol in {:?}", ticker),
            });
        }
        let time = time_arg(decision, Some(TimeRange::PAST_DAY));
        let query = format!("{} stock", symbol);

        let (news, tweets) = tokio::try_join!(
            fetch_news(self.search.as_ref(), &query, time, self.scan.pages),
            fetch_social(self.search.as_ref(), &query, time, self.scan.social_posts),
        )?;

        Ok(ToolResult::StockInfo {
            ticker: ticker.to_string(),
            tweets,
            news,
        })
    }
}
