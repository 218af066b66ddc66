//! Caption lookup through searchapi.io's `youtube_transcripts` engine.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use shared::settings::TranscriptSettings;

use crate::{excerpt, SHARED_HTTP};

/// One caption line; `start` is seconds from the beginning of the video.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CaptionEntry {
    pub text: String,
    #[serde(default)]
    pub start: f64,
}

#[async_trait]
pub trait TranscriptBackend: Send + Sync {
    /// Captions for `video_id` in `lang`. An empty list means the language is unavailable.
    async fn fetch_transcript(&self, video_id: &str, lang: &str) -> Result<Vec<CaptionEntry>>;
}

#[derive(Debug, Deserialize)]
struct TranscriptResponse {
    #[serde(default)]
    transcripts: Vec<CaptionEntry>,
    #[serde(default)]
    error: Option<String>,
}

impl TranscriptResponse {
    fn into_entries(self) -> Result<Vec<CaptionEntry>> {
        match self.error {
            Some(error) if self.transcripts.is_empty() => {
                Err(anyhow!("transcript lookup failed: {}", error))
            }
            _ => Ok(self.transcripts),
        }
    }
}

pub struct SearchApiClient {
    http: Client,
    api_key: String,
    base_url: String,
}

impl SearchApiClient {
    pub fn from_settings(settings: &TranscriptSettings) -> Result<Self> {
        Ok(Self {
            http: SHARED_HTTP.clone(),
            api_key: settings.auth.resolve()?,
            base_url: settings.base_url.clone(),
        })
    }
}

#[async_trait]
impl TranscriptBackend for SearchApiClient {
    async fn fetch_transcript(&self, video_id: &str, lang: &str) -> Result<Vec<CaptionEntry>> {
        let resp = self
            .http
            .get(&self.base_url)
            .query(&[
                ("engine", "youtube_transcripts"),
                ("video_id", video_id),
                ("lang", lang),
                ("api_key", self.api_key.as_str()),
            ])
            .send()
            .await?;

        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            // A missing language comes back as an error body; let the caller fall back.
            if let Ok(body) = serde_json::from_str::<TranscriptResponse>(&text) {
                if let Some(error) = body.error {
                    tracing::debug!(video_id, lang, %status, error = %error, "No transcript for language");
                    return Ok(Vec::new());
                }
            }
            return Err(anyhow!("transcript error: {}\n{}", status, excerpt(&text, 800)));
        }

        let body: TranscriptResponse = serde_json::from_str(&text)
            .map_err(|e| anyhow!("Failed to parse transcript response: {}", e))?;
        body.into_entries()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_entries() {
        let body: TranscriptResponse = serde_json::from_value(serde_json::json!({
            "search_metadata": {"status": "Success"},
            "transcripts": [
                {"text": "hello", "start": 0.0, "duration": 1.5},
                {"text": "world", "start": 1.5, "duration": 2.0}
            ]
        }))
        .unwrap();
        let entries = body.into_entries().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].start, 1.5);
    }

    #[test]
    fn test_error_without_entries_is_err() {
        let body: TranscriptResponse = serde_json::from_value(serde_json::json!({
            "error": "Transcripts are disabled for this video"
        }))
        .unwrap();
        let err = body.into_entries().unwrap_err();
        assert!(err.to_string().contains("disabled"));
    }

    #[test]
    fn test_empty_body_is_empty_list() {
        let body: TranscriptResponse = serde_json::from_value(serde_json::json!({})).unwrap();
        assert!(body.into_entries().unwrap().is_empty());
    }
}
