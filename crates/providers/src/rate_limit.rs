//! Pre-operation quota check against an external rate-limit service.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use shared::settings::RateLimitSettings;

use crate::SHARED_HTTP;

/// Quota snapshot returned by the service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RateLimitInfo {
    #[serde(default)]
    pub limit: u64,
    #[serde(default)]
    pub remaining: u64,
    /// Unix time in milliseconds when the window resets
    #[serde(default)]
    pub reset: i64,
}

impl RateLimitInfo {
    pub fn reset_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.reset).single()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RateLimitOutcome {
    Allowed(RateLimitInfo),
    Exceeded(RateLimitInfo),
}

#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// `Err` means the check itself failed, not that the quota is spent.
    async fn check(&self) -> Result<RateLimitOutcome>;
}

/// Always allows; used when no rate-limit service is configured.
pub struct DisabledRateLimiter;

#[async_trait]
impl RateLimiter for DisabledRateLimiter {
    async fn check(&self) -> Result<RateLimitOutcome> {
        Ok(RateLimitOutcome::Allowed(RateLimitInfo::default()))
    }
}

pub struct HttpRateLimiter {
    http: Client,
    check_url: String,
}

impl HttpRateLimiter {
    pub fn new(check_url: impl Into<String>) -> Self {
        Self {
            http: SHARED_HTTP.clone(),
            check_url: check_url.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RateLimitBody {
    success: Option<bool>,
    #[serde(flatten)]
    info: RateLimitInfo,
}

fn outcome(status: StatusCode, body: &str) -> Result<RateLimitOutcome> {
    let parsed = serde_json::from_str::<RateLimitBody>(body).ok();
    if status == StatusCode::TOO_MANY_REQUESTS {
        let info = parsed.map(|b| b.info).unwrap_or_default();
        return Ok(RateLimitOutcome::Exceeded(info));
    }
    if !status.is_success() {
        return Err(anyhow!("rate limit check failed: {}", status));
    }
    let body = parsed.ok_or_else(|| anyhow!("Failed to parse rate limit response"))?;
    // Only a 429 counts as exceeded; a refusal under 2xx is a failed check.
    if body.success == Some(false) {
        return Err(anyhow!("rate limit check failed: {} with success=false", status));
    }
    Ok(RateLimitOutcome::Allowed(body.info))
}

#[async_trait]
impl RateLimiter for HttpRateLimiter {
    async fn check(&self) -> Result<RateLimitOutcome> {
        let resp = self.http.get(&self.check_url).send().await?;
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        let result = outcome(status, &body)?;
        if let RateLimitOutcome::Allowed(info) = &result {
            tracing::debug!(limit = info.limit, remaining = info.remaining, "Rate limit check passed");
        }
        Ok(result)
    }
}

/// Limiter matching the settings: HTTP when enabled, always-allow otherwise.
pub fn from_settings(settings: &RateLimitSettings) -> Box<dyn RateLimiter> {
    if settings.enabled {
        Box::new(HttpRateLimiter::new(settings.check_url.clone()))
    } else {
        Box::new(DisabledRateLimiter)
    }
}
