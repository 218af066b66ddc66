//! Outbound HTTP clients: completion endpoints, search, image generation,
//! transcripts, video metadata and the rate-limit service.

use reqwest::Client;
use std::sync::LazyLock;
use std::time::Duration;

pub mod fal;
pub mod openai;
pub mod rate_limit;
pub mod searchapi;
pub mod serper;
pub mod sse;
pub mod youtube;

pub(crate) static SHARED_HTTP: LazyLock<Client> = LazyLock::new(|| {
    Client::builder()
        .timeout(Duration::from_secs(120))
        .pool_max_idle_per_host(2)
        .build()
        .expect("failed to build HTTP client")
});

/// First `max` characters of an error body, for log-friendly messages.
pub(crate) fn excerpt(body: &str, max: usize) -> String {
    body.chars().take(max).collect()
}
