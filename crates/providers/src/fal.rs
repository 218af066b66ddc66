use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use shared::settings::ServiceSettings;

use crate::{excerpt, SHARED_HTTP};

const MODEL_PATH: &str = "fal-ai/fast-turbo-diffusion";

/// Text-to-image generation. Returns image URLs.
#[async_trait]
pub trait ImageBackend: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<Vec<String>>;
}

#[derive(Debug, Serialize)]
struct FalRequest<'a> {
    prompt: &'a str,
    model_name: &'static str,
    image_size: &'static str,
    num_inference_steps: u32,
    guidance_scale: f32,
    num_images: u32,
    sync_mode: bool,
}

impl<'a> FalRequest<'a> {
    fn turbo(prompt: &'a str) -> Self {
        Self {
            prompt,
            model_name: "stabilityai/sdxl-turbo",
            image_size: "square_hd",
            num_inference_steps: 2,
            guidance_scale: 1.0,
            num_images: 2,
            sync_mode: true,
        }
    }
}

#[derive(Debug, Deserialize)]
struct FalResponse {
    #[serde(default)]
    images: Vec<FalImage>,
}

#[derive(Debug, Deserialize)]
struct FalImage {
    url: String,
}

pub struct FalClient {
    http: Client,
    api_key: String,
    base_url: String,
}

impl FalClient {
    pub fn from_settings(settings: &ServiceSettings) -> Result<Self> {
        Ok(Self {
            http: SHARED_HTTP.clone(),
            api_key: settings.auth.resolve()?,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl ImageBackend for FalClient {
    async fn generate(&self, prompt: &str) -> Result<Vec<String>> {
        let url = format!("{}/{}", self.base_url, MODEL_PATH);
        let resp = self
            .http
            .post(&url)
            .header("Authorization", format!("Key {}", self.api_key))
            .json(&FalRequest::turbo(prompt))
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(anyhow!(
                "image generation error: {}\n{}",
                status,
                excerpt(&body, 800)
            ));
        }

        let body: FalResponse = resp
            .json()
            .await
            .map_err(|e| anyhow!("Failed to parse image response: {}", e))?;
        Ok(body.images.into_iter().map(|img| img.url).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_turbo_request_body() {
        let value = serde_json::to_value(FalRequest::turbo("a red fox")).unwrap();
        assert_eq!(value["prompt"], "a red fox");
        assert_eq!(value["model_name"], "stabilityai/sdxl-turbo");
        assert_eq!(value["image_size"], "square_hd");
        assert_eq!(value["num_inference_steps"], 2);
        assert_eq!(value["num_images"], 2);
        assert_eq!(value["sync_mode"], true);
    }

    #[test]
    fn test_parse_images() {
        let body: FalResponse = serde_json::from_value(serde_json::json!({
            "images": [
                {"url": "https://fal.media/1.jpeg", "width": 1024},
                {"url": "https://fal.media/2.jpeg", "width": 1024}
            ],
            "seed": 42
        }))
        .unwrap();
        let urls: Vec<_> = body.images.into_iter().map(|i| i.url).collect();
        assert_eq!(urls, vec!["https://fal.media/1.jpeg", "https://fal.media/2.jpeg"]);
    }
}
