//! Tool call decisions, normalized tool records and the `ToolResult` union.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of the tool-selection step. `None` from the selector means plain chat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallDecision {
    pub tool_name: String,
    #[serde(default)]
    pub arguments: serde_json::Map<String, serde_json::Value>,
}

impl ToolCallDecision {
    pub fn new(tool_name: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            arguments: serde_json::Map::new(),
        }
    }

    pub fn with_arg(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.arguments.insert(key.into(), value.into());
        self
    }

    /// String argument, trimmed; empty strings count as absent.
    pub fn str_arg(&self, key: &str) -> Option<&str> {
        self.arguments
            .get(key)
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    pub fn required_str(&self, key: &'static str) -> Result<&str, ToolError> {
        self.str_arg(key).ok_or_else(|| ToolError::MissingArgument {
            tool: self.tool_name.clone(),
            argument: key,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    Day,
    Week,
    Month,
    Year,
}

impl TimeUnit {
    fn code(&self) -> char {
        match self {
            TimeUnit::Day => 'd',
            TimeUnit::Week => 'w',
            TimeUnit::Month => 'm',
            TimeUnit::Year => 'y',
        }
    }
}

/// "Past N days/weeks/months/years", written `d`, `d3`, `w`, `m6`, `y2` ...
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub unit: TimeUnit,
    pub count: Option<u32>,
}

impl TimeRange {
    pub const PAST_DAY: TimeRange = TimeRange {
        unit: TimeUnit::Day,
        count: None,
    };
    pub const PAST_WEEK: TimeRange = TimeRange {
        unit: TimeUnit::Week,
        count: None,
    };

    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        let mut chars = value.chars();
        let unit = match chars.next()?.to_ascii_lowercase() {
            'd' => TimeUnit::Day,
            'w' => TimeUnit::Week,
            'm' => TimeUnit::Month,
            'y' => TimeUnit::Year,
            _ => return None,
        };
        let rest = chars.as_str();
        if rest.is_empty() {
            return Some(Self { unit, count: None });
        }
        let count: u32 = rest.parse().ok().filter(|n| *n > 0)?;
        Some(Self {
            unit,
            count: Some(count),
        })
    }

    /// Search provider `tbs` value, e.g. `qdr:w2`.
    pub fn to_tbs(&self) -> String {
        format!("qdr:{}", self)
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.count {
            Some(n) => write!(f, "{}{}", self.unit.code(), n),
            None => write!(f, "{}", self.unit.code()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRef {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsItem {
    pub title: String,
    pub link: String,
    pub snippet: String,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
}

/// A social-media post (tweet) surfaced through a site-filtered search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SocialPost {
    pub title: String,
    pub link: String,
    pub snippet: String,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Place {
    pub title: String,
    pub address: String,
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub rating_count: Option<u64>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShoppingItem {
    pub title: String,
    pub link: String,
    pub price: String,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
}

/// Output of one tool invocation. Absence (`Option::None`) means no tool ran.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolResult {
    StockInfo {
        ticker: String,
        tweets: Vec<SocialPost>,
        news: Vec<NewsItem>,
    },
    NewsAndTweets {
        query: String,
        tweets: Vec<SocialPost>,
        news: Vec<NewsItem>,
    },
    Places {
        places: Vec<Place>,
    },
    Shopping {
        shopping: Vec<ShoppingItem>,
    },
    YoutubeTranscript {
        url: String,
        video_id: String,
        transcript: String,
    },
    ImageUrl {
        images: Vec<ImageRef>,
    },
}

impl ToolResult {
    pub fn kind(&self) -> &'static str {
        match self {
            ToolResult::StockInfo { .. } => "stock_info",
            ToolResult::NewsAndTweets { .. } => "news_and_tweets",
            ToolResult::Places { .. } => "places",
            ToolResult::Shopping { .. } => "shopping",
            ToolResult::YoutubeTranscript { .. } => "youtube_transcript",
            ToolResult::ImageUrl { .. } => "image_url",
        }
    }
}

/// Host name of a link, or the link itself when it does not parse.
pub fn link_domain(link: &str) -> String {
    url::Url::parse(link)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_else(|| link.to_string())
}

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Missing argument `{argument}` for tool {tool}")]
    MissingArgument { tool: String, argument: &'static str },

    #[error("Invalid argument `{argument}` for tool {tool}: {message}")]
    InvalidArgument {
        tool: String,
        argument: &'static str,
        message: String,
    },

    #[error("Execution failed: {0}")]
    ExecutionFailed(#[from] anyhow::Error),
}
