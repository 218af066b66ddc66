//! Builds the prompt actually sent to the completion model: the user's text
//! followed by tool output as numbered context, plus the matching citations.
//!
//! Social posts and other sources are numbered by separate counters, each
//! starting at 1. Links are returned social first. Every `[n]` marker written
//! into the prompt has exactly one citation with `sequence_number == n` in its
//! group.

use std::sync::Arc;

use providers::youtube::{VideoInfo, VideoInfoFetcher};
use shared::chat::Citation;
use shared::tool::{link_domain, NewsItem, Place, ShoppingItem, SocialPost, ToolResult};

use crate::youtube::find_video_id;

#[derive(Debug, Clone, PartialEq)]
pub struct EnhancedPrompt {
    pub prompt: String,
    pub links: Vec<Citation>,
}

/// One citation group with its own running counter.
#[derive(Default)]
struct CitationGroup {
    citations: Vec<Citation>,
}

impl CitationGroup {
    /// Record a citation and return the marker number assigned to it.
    fn cite(
        &mut self,
        url: &str,
        title: &str,
        description: Option<&str>,
        date: Option<&str>,
        image_url: Option<&str>,
        domain: String,
    ) -> u32 {
        let sequence_number = self.citations.len() as u32 + 1;
        self.citations.push(Citation {
            sequence_number,
            url: url.to_string(),
            title: title.to_string(),
            description: description.filter(|d| !d.is_empty()).map(str::to_string),
            date: date.filter(|d| !d.is_empty()).map(str::to_string),
            image_url: image_url.filter(|u| !u.is_empty()).map(str::to_string),
            domain,
        });
        sequence_number
    }
}

pub struct PromptEnhancer {
    video_info: Arc<dyn VideoInfoFetcher>,
}

fn video_info_block(info: &VideoInfo) -> String {
    format!(
        "\n\nYouTube Video Information:\nTitle: {}\nAuthor: {}\n",
        info.title, info.author
    )
}

fn maps_url(address: &str) -> String {
    format!("https://maps.google.com/?q={}", urlencoding::encode(address))
}

fn tweet_lines(tweets: &[SocialPost], social: &mut CitationGroup) -> String {
    tweets
        .iter()
        .map(|tweet| {
            let n = social.cite(
                &tweet.link,
                &tweet.title,
                Some(&tweet.snippet),
                tweet.date.as_deref(),
                tweet.image_url.as_deref(),
                "twitter.com".to_string(),
            );
            format!(
                "- [{}] {}\n  {} ({}) ({})",
                n,
                tweet.title,
                tweet.snippet,
                tweet.date.as_deref().unwrap_or(""),
                tweet.link
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn news_lines(news: &[NewsItem], other: &mut CitationGroup) -> String {
    news.iter()
        .map(|item| {
            let n = other.cite(
                &item.link,
                &item.title,
                Some(&item.snippet),
                item.date.as_deref(),
                item.image_url.as_deref(),
                link_domain(&item.link),
            );
            format!(
                "- [{}] {}: {} ({}) ({})",
                n,
                item.title,
                item.snippet,
                item.date.as_deref().unwrap_or(""),
                item.link
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn place_lines(places: &[Place], other: &mut CitationGroup) -> String {
    places
        .iter()
        .map(|place| {
            let n = other.cite(
                &maps_url(&place.address),
                &place.title,
                Some(&place.address),
                None,
                None,
                "maps.google.com".to_string(),
            );
            format!("- [{}] {}: {}", n, place.title, place.address)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn shopping_lines(items: &[ShoppingItem], other: &mut CitationGroup) -> String {
    items
        .iter()
        .map(|item| {
            let n = other.cite(
                &item.link,
                &item.title,
                Some(&item.price),
                None,
                item.image_url.as_deref(),
                link_domain(&item.link),
            );
            format!("- [{}] {}: {}", n, item.title, item.price)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

impl PromptEnhancer {
    pub fn new(video_info: Arc<dyn VideoInfoFetcher>) -> Self {
        Self { video_info }
    }

    /// Best-effort metadata lookup; failures are logged and ignored.
    async fn fetch_video_info(&self, video_id: &str) -> Option<VideoInfo> {
        match self.video_info.video_info(video_id).await {
            Ok(info) => Some(info),
            Err(e) => {
                tracing::warn!(video_id, error = %e, "Failed to fetch video info");
                None
            }
        }
    }

    pub async fn enhance(&self, user_message: &str, tool_result: Option<&ToolResult>) -> EnhancedPrompt {
        let mut prompt = user_message.to_string();
        let mut social = CitationGroup::default();
        let mut other = CitationGroup::default();

        // A linked video gets its metadata spliced in whatever tool ran.
        let mut mentioned: Option<(String, VideoInfo)> = None;
        if let Some(video_id) = find_video_id(user_message) {
            if let Some(info) = self.fetch_video_info(&video_id).await {
                prompt.push_str(&video_info_block(&info));
                mentioned = Some((video_id, info));
            }
        }

        match tool_result {
            Some(ToolResult::StockInfo {
                ticker,
                tweets,
                news,
            }) => {
                prompt.push_str(&format!(
                    "\n\nStock Information:\nTicker: {}\n\nRecent tweets about this stock:\n",
                    ticker
                ));
                prompt.push_str(&tweet_lines(tweets, &mut social));
                prompt.push_str("\n\nRecent news about this stock:\n");
                prompt.push_str(&news_lines(news, &mut other));
            }
            Some(ToolResult::NewsAndTweets { tweets, news, .. }) => {
                prompt.push_str("\n\nRecent tweets:\n");
                prompt.push_str(&tweet_lines(tweets, &mut social));
                prompt.push_str("\n\nRecent news context:\n");
                prompt.push_str(&news_lines(news, &mut other));
            }
            Some(ToolResult::Places { places }) => {
                prompt.push_str("\n\nPlaces context:\n");
                prompt.push_str(&place_lines(places, &mut other));
            }
            Some(ToolResult::Shopping { shopping }) => {
                prompt.push_str("\n\nShopping context:\n");
                prompt.push_str(&shopping_lines(shopping, &mut other));
            }
            Some(ToolResult::YoutubeTranscript {
                url,
                video_id,
                transcript,
            }) => {
                let info = match mentioned {
                    Some((ref id, ref info)) if id == video_id => Some(info.clone()),
                    _ => {
                        let info = self.fetch_video_info(video_id).await;
                        if let Some(info) = &info {
                            prompt.push_str(&video_info_block(info));
                        }
                        info
                    }
                };
                let title = info
                    .as_ref()
                    .map(|i| i.title.as_str())
                    .unwrap_or("YouTube video");
                let n = other.cite(
                    url,
                    title,
                    None,
                    None,
                    info.as_ref().and_then(|i| i.thumbnail_url.as_deref()),
                    "youtube.com".to_string(),
                );
                prompt.push_str(&format!(
                    "\n\nYouTube Video Transcript:\n{}\n\nVideo URL: [{}] {}",
                    transcript, n, url
                ));
            }
            // Generated images never reach the completion model.
            Some(ToolResult::ImageUrl { .. }) | None => {}
        }

        let mut links = social.citations;
        links.extend(other.citations);
        EnhancedPrompt { prompt, links }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use regex::Regex;

    struct FakeVideoInfo {
        fail: bool,
        calls: Mutex<Vec<String>>,
    }

    impl FakeVideoInfo {
        fn ok() -> Arc<Self> {
            Arc::new(Self {
                fail: false,
                calls: Mutex::new(Vec::new()),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                fail: true,
                calls: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl VideoInfoFetcher for FakeVideoInfo {
        async fn video_info(&self, video_id: &str) -> Result<VideoInfo> {
            self.calls.lock().push(video_id.to_string());
            if self.fail {
                return Err(anyhow!("oembed error: 404 Not Found"));
            }
            Ok(VideoInfo {
                title: "Never Gonna Give You Up".into(),
                author: "Rick Astley".into(),
                thumbnail_url: Some("https://i.ytimg.com/vi/dQw4w9WgXcQ/hqdefault.jpg".into()),
            })
        }
    }

    fn markers(prompt: &str) -> Vec<u32> {
        let re = Regex::new(r"\[(\d+)\]").unwrap();
        re.captures_iter(prompt)
            .map(|c| c[1].parse().unwrap())
            .collect()
    }

    fn tweet(title: &str, link: &str) -> SocialPost {
        SocialPost {
            title: title.into(),
            link: link.into(),
            snippet: "snip".into(),
            date: None,
            image_url: None,
        }
    }

    fn article(title: &str, link: &str) -> NewsItem {
        NewsItem {
            title: title.into(),
            link: link.into(),
            snippet: format!("{} summary", title),
            date: Some("3 hours ago".into()),
            source: None,
            image_url: None,
        }
    }

    #[tokio::test]
    async fn test_no_tool_is_passthrough() {
        let enhancer = PromptEnhancer::new(FakeVideoInfo::ok());
        let enhanced = enhancer.enhance("hello there", None).await;
        assert_eq!(enhanced.prompt, "hello there");
        assert!(enhanced.links.is_empty());
    }

    #[tokio::test]
    async fn test_stock_scenario_numbering() {
        let enhancer = PromptEnhancer::new(FakeVideoInfo::ok());
        let result = ToolResult::StockInfo {
            ticker: "NASDAQ:AAPL".into(),
            tweets: vec![tweet("$AAPL breakout", "https://twitter.com/a/status/1")],
            news: vec![
                article("Apple earnings", "https://www.reuters.com/tech/apple"),
                article("iPhone demand", "https://www.bloomberg.com/news/iphone"),
            ],
        };
        let enhanced = enhancer
            .enhance("What's AAPL's latest news?", Some(&result))
            .await;

        assert_eq!(enhanced.links.len(), 3);
        assert_eq!(enhanced.links[0].sequence_number, 1);
        assert_eq!(enhanced.links[0].domain, "twitter.com");
        assert_eq!(enhanced.links[1].sequence_number, 1);
        assert_eq!(enhanced.links[1].domain, "www.reuters.com");
        assert_eq!(enhanced.links[2].sequence_number, 2);
        assert_eq!(enhanced.links[2].domain, "www.bloomberg.com");

        assert_eq!(markers(&enhanced.prompt), vec![1, 1, 2]);
        assert!(enhanced.prompt.starts_with("What's AAPL's latest news?\n\nStock Information:\nTicker: NASDAQ:AAPL"));
        assert!(enhanced.prompt.contains(
            "- [1] Apple earnings: Apple earnings summary (3 hours ago) (https://www.reuters.com/tech/apple)"
        ));
        assert!(enhanced
            .prompt
            .contains("- [1] $AAPL breakout\n  snip () (https://twitter.com/a/status/1)"));
    }

    #[tokio::test]
    async fn test_news_and_tweets_counters_are_independent() {
        let enhancer = PromptEnhancer::new(FakeVideoInfo::ok());
        let result = ToolResult::NewsAndTweets {
            query: "mars".into(),
            tweets: vec![
                tweet("t1", "https://x.com/a/status/1"),
                tweet("t2", "https://x.com/a/status/2"),
            ],
            news: vec![
                article("n1", "https://nasa.gov/1"),
                article("n2", "https://esa.int/2"),
                article("n3", "not a url"),
            ],
        };
        let enhanced = enhancer.enhance("mars news", Some(&result)).await;

        let numbers: Vec<u32> = enhanced.links.iter().map(|l| l.sequence_number).collect();
        assert_eq!(numbers, vec![1, 2, 1, 2, 3]);
        assert_eq!(markers(&enhanced.prompt), numbers);
        assert!(enhanced.prompt.contains("\n\nRecent tweets:\n"));
        assert!(enhanced.prompt.contains("\n\nRecent news context:\n"));
        assert_eq!(enhanced.links[4].domain, "not a url");
    }

    #[tokio::test]
    async fn test_places_use_maps_links() {
        let enhancer = PromptEnhancer::new(FakeVideoInfo::ok());
        let result = ToolResult::Places {
            places: vec![Place {
                title: "Tartine".into(),
                address: "600 Guerrero St, San Francisco".into(),
                rating: None,
                rating_count: None,
                category: None,
                phone_number: None,
                website: None,
            }],
        };
        let enhanced = enhancer.enhance("bakeries", Some(&result)).await;
        assert!(enhanced
            .prompt
            .ends_with("Places context:\n- [1] Tartine: 600 Guerrero St, San Francisco"));
        assert_eq!(
            enhanced.links[0].url,
            "https://maps.google.com/?q=600%20Guerrero%20St%2C%20San%20Francisco"
        );
        assert_eq!(enhanced.links[0].domain, "maps.google.com");
    }

    #[tokio::test]
    async fn test_shopping_lines() {
        let enhancer = PromptEnhancer::new(FakeVideoInfo::ok());
        let result = ToolResult::Shopping {
            shopping: vec![ShoppingItem {
                title: "Desk lamp".into(),
                link: "https://store.example/lamp".into(),
                price: "$25".into(),
                source: None,
                image_url: None,
            }],
        };
        let enhanced = enhancer.enhance("lamps", Some(&result)).await;
        assert!(enhanced.prompt.ends_with("Shopping context:\n- [1] Desk lamp: $25"));
        assert_eq!(enhanced.links[0].domain, "store.example");
        assert_eq!(enhanced.links[0].description.as_deref(), Some("$25"));
    }

    #[tokio::test]
    async fn test_video_link_adds_info_block() {
        let fetcher = FakeVideoInfo::ok();
        let enhancer = PromptEnhancer::new(fetcher.clone());
        let enhanced = enhancer
            .enhance("what is https://youtu.be/dQw4w9WgXcQ about?", None)
            .await;
        assert!(enhanced.prompt.ends_with(
            "\n\nYouTube Video Information:\nTitle: Never Gonna Give You Up\nAuthor: Rick Astley\n"
        ));
        assert_eq!(*fetcher.calls.lock(), vec!["dQw4w9WgXcQ".to_string()]);
    }

    #[tokio::test]
    async fn test_video_info_failure_is_ignored() {
        let enhancer = PromptEnhancer::new(FakeVideoInfo::failing());
        let text = "watch https://www.youtube.com/watch?v=dQw4w9WgXcQ";
        let enhanced = enhancer.enhance(text, None).await;
        assert_eq!(enhanced.prompt, text);
    }

    #[tokio::test]
    async fn test_transcript_section() {
        let fetcher = FakeVideoInfo::ok();
        let enhancer = PromptEnhancer::new(fetcher.clone());
        let url = "https://www.youtube.com/watch?v=dQw4w9WgXcQ";
        let result = ToolResult::YoutubeTranscript {
            url: url.into(),
            video_id: "dQw4w9WgXcQ".into(),
            transcript: "[00:00] We're no strangers to love".into(),
        };
        let enhanced = enhancer
            .enhance(&format!("summarize {}", url), Some(&result))
            .await;

        // Same video as the mention: fetched once, block written once.
        assert_eq!(fetcher.calls.lock().len(), 1);
        assert_eq!(enhanced.prompt.matches("YouTube Video Information").count(), 1);
        assert!(enhanced.prompt.ends_with(&format!(
            "YouTube Video Transcript:\n[00:00] We're no strangers to love\n\nVideo URL: [1] {}",
            url
        )));
        assert_eq!(enhanced.links.len(), 1);
        assert_eq!(enhanced.links[0].domain, "youtube.com");
        assert_eq!(enhanced.links[0].title, "Never Gonna Give You Up");
    }
}
