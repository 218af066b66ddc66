//! `getYoutubeTranscript`: captions grouped into timestamped ~10 second blocks.

use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;
use providers::searchapi::{CaptionEntry, TranscriptBackend};
use regex::Regex;
use shared::tool::{ToolCallDecision, ToolError, ToolResult};
use std::sync::LazyLock;

use super::Tool;
use crate::youtube::video_id_from_url;

const FALLBACK_LANGUAGE: &str = "en";
const GROUP_SECONDS: f64 = 10.0;

static ENTITY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&[\w#]+;").expect("valid entity pattern"));
static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid whitespace pattern"));

pub struct TranscriptTool {
    transcripts: Arc<dyn TranscriptBackend>,
    default_language: String,
}

impl TranscriptTool {
    pub fn new(transcripts: Arc<dyn TranscriptBackend>, default_language: impl Into<String>) -> Self {
        Self {
            transcripts,
            default_language: default_language.into(),
        }
    }

    /// Captions in `lang`, retrying in English when that language has none.
    async fn captions(&self, video_id: &str, lang: &str) -> anyhow::Result<Vec<CaptionEntry>> {
        let entries = self.transcripts.fetch_transcript(video_id, lang).await?;
        if !entries.is_empty() {
            return Ok(entries);
        }
        if lang != FALLBACK_LANGUAGE {
            tracing::warn!(video_id, lang, "No transcript for language, trying English");
            let entries = self
                .transcripts
                .fetch_transcript(video_id, FALLBACK_LANGUAGE)
                .await?;
            if !entries.is_empty() {
                return Ok(entries);
            }
        }
        Err(anyhow!("No transcripts found for video {}", video_id))
    }
}

/// Decode the HTML entities caption providers leave in text, including
/// double-escaped ones like `&amp;#39;`.
pub fn decode_entities(text: &str) -> String {
    let text = text
        .replace("&amp;#39;", "'")
        .replace("&amp;quot;", "\"")
        .replace("&amp;gt;", ">")
        .replace("&amp;lt;", "<")
        .replace("&amp;amp;", "&");
    let decoded = ENTITY.replace_all(&text, |caps: &regex::Captures| {
        match &caps[0] {
            "&amp;" => "&",
            "&lt;" => "<",
            "&gt;" => ">",
            "&quot;" => "\"",
            "&#39;" => "'",
            "&#x2F;" => "/",
            "&#x60;" => "`",
            "&#x3D;" => "=",
            "&nbsp;" => " ",
            other => other,
        }
        .to_string()
    });
    decoded.replace("\\'", "'")
}

fn clean_caption(text: &str) -> String {
    WHITESPACE
        .replace_all(&decode_entities(text), " ")
        .trim()
        .to_string()
}

/// `[mm:ss]`, or `[hh:mm:ss]` past the first hour.
pub fn format_timestamp(seconds: f64) -> String {
    let total = seconds.max(0.0).floor() as u64;
    let (hours, minutes, secs) = (total / 3600, (total % 3600) / 60, total % 60);
    if hours > 0 {
        format!("[{:02}:{:02}:{:02}]", hours, minutes, secs)
    } else {
        format!("[{:02}:{:02}]", minutes, secs)
    }
}

/// One line per group; a new group starts once an entry begins at least
/// ten seconds after the current group's start.
pub fn group_captions(entries: &[CaptionEntry]) -> String {
    let mut lines = Vec::new();
    let mut group_start = 0.0;
    let mut group = String::new();

    for (i, entry) in entries.iter().enumerate() {
        let text = clean_caption(&entry.text);
        if i == 0 || entry.start - group_start >= GROUP_SECONDS {
            if !group.trim().is_empty() {
                lines.push(format!("{} {}", format_timestamp(group_start), group.trim()));
            }
            group_start = entry.start;
            group = text;
        } else {
            group.push(' ');
            group.push_str(&text);
        }
    }
    if !group.trim().is_empty() {
        lines.push(format!("{} {}", format_timestamp(group_start), group.trim()));
    }
    lines.join("\n")
}

#[async_trait]
impl Tool for TranscriptTool {
    fn name(&self) -> &'static str {
        "getYoutubeTranscript"
    }

    fn description(&self) -> &'static str {
        "Get the transcript of a YouTube video when the user shares a YouTube link and asks about its content"
    }

    fn parameters(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "url": {
                    "type": "string",
                    "description": "The YouTube video URL",
                },
                "lang": {
                    "type": "string",
                    "description": "Optional transcript language code, e.g. en, ko, ja",
                },
            },
            "required": ["url"],
        })
    }

    async fn invoke(&self, decision: &ToolCallDecision) -> Result<ToolResult, ToolError> {
        let url = decision.required_str("url")?;
        let video_id = video_id_from_url(url).ok_or_else(|| ToolError::InvalidArgument {
            tool: decision.tool_name.clone(),
            argument: "url",
            message: format!("not a YouTube video link: {}", url),
        })?;
        let lang = decision
            .str_arg("lang")
            .unwrap_or(self.default_language.as_str());

        let entries = self.captions(&video_id, lang).await?;
        Ok(ToolResult::YoutubeTranscript {
            url: url.to_string(),
            video_id,
            transcript: group_captions(&entries),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::fakes::FakeTranscripts;
    use super::*;
    use std::collections::HashMap;

    fn entry(text: &str, start: f64) -> CaptionEntry {
        CaptionEntry {
            text: text.into(),
            start,
        }
    }

    #[test]
    fn test_timestamps() {
        assert_eq!(format_timestamp(0.0), "[00:00]");
        assert_eq!(format_timestamp(75.9), "[01:15]");
        assert_eq!(format_timestamp(3725.0), "[01:02:05]");
    }

    #[test]
    fn test_entities() {
        assert_eq!(decode_entities("it&#39;s &quot;fine&quot; &amp; ok"), "it's \"fine\" & ok");
        assert_eq!(decode_entities("don&amp;#39;t"), "don't");
        assert_eq!(decode_entities("&unknown; stays"), "&unknown; stays");
    }

    #[test]
    fn test_grouping() {
        let entries = vec![
            entry("hello", 0.0),
            entry("there", 4.0),
            entry("general", 10.5),
            entry("kenobi", 19.0),
            entry("you are a   bold one", 21.0),
        ];
        assert_eq!(
            group_captions(&entries),
            "[00:00] hello there\n[00:10] general kenobi\n[00:21] you are a bold one"
        );
        assert_eq!(group_captions(&[]), "");
    }

    #[tokio::test]
    async fn test_falls_back_to_english() {
        let backend = Arc::new(FakeTranscripts {
            by_lang: HashMap::from([("en".to_string(), vec![entry("hi", 1.0)])]),
            ..Default::default()
        });
        let tool = TranscriptTool::new(backend.clone(), "en");
        let decision = ToolCallDecision::new("getYoutubeTranscript")
            .with_arg("url", "https://youtu.be/dQw4w9WgXcQ")
            .with_arg("lang", "ko");

        match tool.invoke(&decision).await.unwrap() {
            ToolResult::YoutubeTranscript {
                video_id,
                transcript,
                ..
            } => {
                assert_eq!(video_id, "dQw4w9WgXcQ");
                assert_eq!(transcript, "[00:01] hi");
            }
            other => panic!("unexpected result {:?}", other),
        }
        assert_eq!(*backend.requested.lock(), vec!["ko".to_string(), "en".to_string()]);
    }

    #[tokio::test]
    async fn test_no_transcript_is_error() {
        let tool = TranscriptTool::new(Arc::new(FakeTranscripts::default()), "en");
        let decision = ToolCallDecision::new("getYoutubeTranscript")
            .with_arg("url", "https://www.youtube.com/watch?v=dQw4w9WgXcQ");
        assert!(matches!(
            tool.invoke(&decision).await,
            Err(ToolError::ExecutionFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_rejects_non_youtube_url() {
        let tool = TranscriptTool::new(Arc::new(FakeTranscripts::default()), "en");
        let decision =
            ToolCallDecision::new("getYoutubeTranscript").with_arg("url", "https://vimeo.com/1");
        assert!(matches!(
            tool.invoke(&decision).await,
            Err(ToolError::InvalidArgument { argument: "url", .. })
        ));
    }
}
