//! HTTP client module
//!
//! Provides the HTTP client shared by the inventory API, the search store
//! and the token exchange.
//!
//! # Features
//!
//! - **Automatic Retries**: transport errors, timeouts and 5xx, with jittered backoff
//! - **Rate Limiting**: Token bucket rate limiter using governor
//! - **Authentication**: Integration with auth module

mod client;
mod rate_limit;

pub use client::{HttpClient, HttpClientConfig, RequestConfig};
pub use rate_limit::{RateLimiter, RateLimiterConfig};
