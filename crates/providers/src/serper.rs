//! Serper (google.serper.dev) search endpoints: web, news, places and shopping.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use shared::settings::ServiceSettings;

use crate::{excerpt, SHARED_HTTP};

/// Request body shared by every search endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SearchQuery {
    pub q: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tbs: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

impl SearchQuery {
    pub fn new(q: impl Into<String>) -> Self {
        Self {
            q: q.into(),
            ..Default::default()
        }
    }

    pub fn num(mut self, num: usize) -> Self {
        self.num = Some(num);
        self
    }

    pub fn tbs(mut self, tbs: Option<String>) -> Self {
        self.tbs = tbs;
        self
    }

    pub fn location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrganicResult {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub link: String,
    #[serde(default)]
    pub snippet: String,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewsResult {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub link: String,
    #[serde(default)]
    pub snippet: String,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceResult {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
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

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShoppingResult {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub link: String,
    #[serde(default)]
    pub price: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OrganicResponse {
    organic: Vec<OrganicResult>,
}

#[derive(Debug, Deserialize)]
struct NewsResponse {
    news: Vec<NewsResult>,
}

#[derive(Debug, Deserialize)]
struct PlacesResponse {
    places: Vec<PlaceResult>,
}

#[derive(Debug, Deserialize)]
struct ShoppingResponse {
    shopping: Vec<ShoppingResult>,
}

/// Search provider seam used by the tool gateway.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    async fn search(&self, query: SearchQuery) -> Result<Vec<OrganicResult>>;
    async fn news(&self, query: SearchQuery) -> Result<Vec<NewsResult>>;
    async fn places(&self, query: SearchQuery) -> Result<Vec<PlaceResult>>;
    async fn shopping(&self, query: SearchQuery) -> Result<Vec<ShoppingResult>>;
}

pub struct SerperClient {
    http: Client,
    api_key: String,
    base_url: String,
}

impl SerperClient {
    pub fn from_settings(settings: &ServiceSettings) -> Result<Self> {
        Ok(Self {
            http: SHARED_HTTP.clone(),
            api_key: settings.auth.resolve()?,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn post<T: DeserializeOwned>(&self, endpoint: &str, query: &SearchQuery) -> Result<T> {
        let url = format!("{}/{}", self.base_url, endpoint);
        let resp = self
            .http
            .post(&url)
            .header("X-API-KEY", &self.api_key)
            .header("Content-Type", "application/json")
            .json(query)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(anyhow!(
                "{} search failed with status: {}\n{}",
                endpoint,
                status,
                excerpt(&body, 800)
            ));
        }

        let text = resp.text().await?;
        serde_json::from_str(&text).map_err(|e| {
            anyhow!(
                "Failed to parse {} response: {}\nRaw response (first 500 chars): {}",
                endpoint,
                e,
                excerpt(&text, 500)
            )
        })
    }
}

#[async_trait]
impl SearchBackend for SerperClient {
    async fn search(&self, query: SearchQuery) -> Result<Vec<OrganicResult>> {
        let resp: OrganicResponse = self.post("search", &query).await?;
        Ok(resp.organic)
    }

    async fn news(&self, query: SearchQuery) -> Result<Vec<NewsResult>> {
        let resp: NewsResponse = self.post("news", &query).await?;
        Ok(resp.news)
    }

    async fn places(&self, query: SearchQuery) -> Result<Vec<PlaceResult>> {
        let resp: PlacesResponse = self.post("places", &query).await?;
        Ok(resp.places)
    }

    async fn shopping(&self, query: SearchQuery) -> Result<Vec<ShoppingResult>> {
        let resp: ShoppingResponse = self.post("shopping", &query).await?;
        Ok(resp.shopping)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_body_skips_unset_fields() {
        let value = serde_json::to_value(SearchQuery::new("rust").num(10)).unwrap();
        assert_eq!(value, serde_json::json!({"q": "rust", "num": 10}));

        let value = serde_json::to_value(
            SearchQuery::new("coffee")
                .tbs(Some("qdr:w".into()))
                .location("Seoul"),
        )
        .unwrap();
        assert_eq!(value["tbs"], "qdr:w");
        assert_eq!(value["location"], "Seoul");
    }

    #[test]
    fn test_parse_news_payload() {
        let resp: NewsResponse = serde_json::from_value(serde_json::json!({
            "searchParameters": {"q": "apple"},
            "news": [{
                "title": "Apple rallies",
                "link": "https://www.reuters.com/a",
                "snippet": "Shares rose",
                "date": "2 hours ago",
                "source": "Reuters",
                "imageUrl": "https://img/1.jpg"
            }]
        }))
        .unwrap();
        assert_eq!(resp.news.len(), 1);
        assert_eq!(resp.news[0].image_url.as_deref(), Some("https://img/1.jpg"));
    }

    #[test]
    fn test_parse_places_payload() {
        let resp: PlacesResponse = serde_json::from_value(serde_json::json!({
            "places": [{
                "position": 1,
                "title": "Blue Bottle",
                "address": "1 Ferry Building, San Francisco",
                "rating": 4.5,
                "ratingCount": 1200,
                "phoneNumber": "(415) 555-0100"
            }]
        }))
        .unwrap();
        assert_eq!(resp.places[0].rating_count, Some(1200));
        assert_eq!(resp.places[0].phone_number.as_deref(), Some("(415) 555-0100"));
    }

    #[test]
    fn test_error_body_without_results_is_error() {
        let resp = serde_json::from_str::<NewsResponse>(r#"{"message":"Not enough credits","statusCode":400}"#);
        assert!(resp.is_err());

        let resp = serde_json::from_value::<ShoppingResponse>(serde_json::json!({}));
        assert!(resp.is_err());
    }

    #[test]
    fn test_empty_result_list_is_ok() {
        let resp: OrganicResponse = serde_json::from_value(serde_json::json!({"organic": []})).unwrap();
        assert!(resp.organic.is_empty());
    }

    #[test]
    fn test_wrong_shape_is_error() {
        let resp = serde_json::from_value::<OrganicResponse>(serde_json::json!({"organic": "nope"}));
        assert!(resp.is_err());
    }
}
