use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::SHARED_HTTP;

/// Title and channel of a video, from the public oEmbed endpoint.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct VideoInfo {
    pub title: String,
    #[serde(rename = "author_name")]
    pub author: String,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
}

#[async_trait]
pub trait VideoInfoFetcher: Send + Sync {
    async fn video_info(&self, video_id: &str) -> Result<VideoInfo>;
}

pub struct OEmbedClient {
    http: Client,
    endpoint: String,
}

impl OEmbedClient {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            http: SHARED_HTTP.clone(),
            endpoint: endpoint.into(),
        }
    }
}

pub fn watch_url(video_id: &str) -> String {
    format!("https://www.youtube.com/watch?v={}", video_id)
}

#[async_trait]
impl VideoInfoFetcher for OEmbedClient {
    async fn video_info(&self, video_id: &str) -> Result<VideoInfo> {
        let resp = self
            .http
            .get(&self.endpoint)
            .query(&[("url", watch_url(video_id).as_str()), ("format", "json")])
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(anyhow!("oembed error: {}", resp.status()));
        }
        resp.json()
            .await
            .map_err(|e| anyhow!("Failed to parse oembed response: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_oembed() {
        let info: VideoInfo = serde_json::from_value(serde_json::json!({
            "title": "Rust in 100 Seconds",
            "author_name": "Fireship",
            "thumbnail_url": "https://i.ytimg.com/vi/5C_HPTJg5ek/hqdefault.jpg",
            "type": "video"
        }))
        .unwrap();
        assert_eq!(info.author, "Fireship");
        assert!(info.thumbnail_url.is_some());
    }

    #[test]
    fn test_watch_url() {
        assert_eq!(watch_url("dQw4w9WgXcQ"), "https://www.youtube.com/watch?v=dQw4w9WgXcQ");
    }
}
