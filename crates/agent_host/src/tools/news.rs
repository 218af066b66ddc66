//! Web and news search. Both pair their results with social-media posts
//! found by the same query.

use std::sync::Arc;

use async_trait::async_trait;
use providers::serper::{NewsResult, OrganicResult, SearchBackend, SearchQuery};
use shared::settings::ScanLimits;
use shared::tool::{NewsItem, SocialPost, TimeRange, ToolCallDecision, ToolError, ToolResult};

use super::{query_with_time_schema, Tool, SOCIAL_FILTER};

/// Time range from the `time` argument, else `default`. Unparseable values
/// fall back to the default rather than failing the turn.
pub(crate) fn time_arg(decision: &ToolCallDecision, default: Option<TimeRange>) -> Option<TimeRange> {
    match decision.str_arg("time") {
        Some(raw) => TimeRange::parse(raw).or_else(|| {
            tracing::debug!(tool = %decision.tool_name, time = raw, "Ignoring unrecognized time range");
            default
        }),
        None => default,
    }
}

pub(crate) async fn fetch_social(
    search: &dyn SearchBackend,
    query: &str,
    time: Option<TimeRange>,
    limit: usize,
) -> anyhow::Result<Vec<SocialPost>> {
    let request = SearchQuery::new(format!("{}{}", query, SOCIAL_FILTER))
        .num(limit)
        .tbs(time.map(|t| t.to_tbs()));
    let results = search.search(request).await?;
    Ok(results.into_iter().take(limit).map(to_social_post).collect())
}

pub(crate) async fn fetch_news(
    search: &dyn SearchBackend,
    query: &str,
    time: Option<TimeRange>,
    limit: usize,
) -> anyhow::Result<Vec<NewsItem>> {
    let request = SearchQuery::new(query)
        .num(limit)
        .tbs(time.map(|t| t.to_tbs()));
    let results = search.news(request).await?;
    Ok(results.into_iter().take(limit).map(news_item).collect())
}

fn to_social_post(result: OrganicResult) -> SocialPost {
    SocialPost {
        title: result.title,
        link: result.link,
        snippet: result.snippet,
        date: result.date,
        image_url: result.image_url,
    }
}

fn news_item(result: NewsResult) -> NewsItem {
    NewsItem {
        title: result.title,
        link: result.link,
        snippet: result.snippet,
        date: result.date,
        source: result.source,
        image_url: result.image_url,
    }
}

fn page_item(result: OrganicResult) -> NewsItem {
    NewsItem {
        title: result.title,
        link: result.link,
        snippet: result.snippet,
        date: result.date,
        source: None,
        image_url: result.image_url,
    }
}

/// `searchNews`: news articles plus posts, past week unless told otherwise.
pub struct NewsTool {
    search: Arc<dyn SearchBackend>,
    scan: ScanLimits,
}

impl NewsTool {
    pub fn new(search: Arc<dyn SearchBackend>, scan: ScanLimits) -> Self {
        Self { search, scan }
    }
}

#[async_trait]
impl Tool for NewsTool {
    fn name(&self) -> &'static str {
        "searchNews"
    }

    fn description(&self) -> &'static str {
        "Search for recent news articles and social media posts about a topic or event"
    }

    fn parameters(&self) -> serde_json::Value {
        query_with_time_schema("The search query for news articles")
    }

    async fn invoke(&self, decision: &ToolCallDecision) -> Result<ToolResult, ToolError> {
        let query = decision.required_str("query")?;
        let time = time_arg(decision, Some(TimeRange::PAST_WEEK));

        let (news, tweets) = tokio::try_join!(
            fetch_news(self.search.as_ref(), query, time, self.scan.pages),
            fetch_social(self.search.as_ref(), query, time, self.scan.social_posts),
        )?;

        Ok(ToolResult::NewsAndTweets {
            query: query.to_string(),
            tweets,
            news,
        })
    }
}

/// `searchWeb`: the generic default. Organic pages plus posts, no time filter
/// unless one is given.
pub struct WebSearchTool {
    search: Arc<dyn SearchBackend>,
    scan: ScanLimits,
}

impl WebSearchTool {
    pub fn new(search: Arc<dyn SearchBackend>, scan: ScanLimits) -> Self {
        Self { search, scan }
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &'static str {
        "searchWeb"
    }

    fn description(&self) -> &'static str {
        "Search the web for up-to-date information on any topic. Use this by default when the question needs current or factual information"
    }

    fn parameters(&self) -> serde_json::Value {
        query_with_time_schema("The web search query")
    }

    async fn invoke(&self, decision: &ToolCallDecision) -> Result<ToolResult, ToolError> {
        let query = decision.required_str("query")?;
        let time = time_arg(decision, None);
        let pages_request = SearchQuery::new(query)
            .num(self.scan.pages)
            .tbs(time.map(|t| t.to_tbs()));

        let (pages, tweets) = tokio::try_join!(
            self.search.search(pages_request),
            fetch_social(self.search.as_ref(), query, time, self.scan.social_posts),
        )?;

        Ok(ToolResult::NewsAndTweets {
            query: query.to_string(),
            tweets,
            news: pages.into_iter().take(self.scan.pages).map(page_item).collect(),
        })
    }
}
