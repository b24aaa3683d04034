use std::sync::Arc;

use crate::config::{CredentialSource, ProxyConfig};
use crate::services::completion::CompletionClient;
use crate::services::content_filter::ContentFilter;
use crate::services::rate_limiter::RateLimiter;

pub type SharedState = Arc<AppState>;

#[derive(Debug)]
pub struct AppState {
    pub rate_limiter: RateLimiter,
    pub content_filter: ContentFilter,
    pub credentials: CredentialSource,
    pub completion: CompletionClient,
}

impl AppState {
    pub fn new(
        rate_limiter: RateLimiter,
        content_filter: ContentFilter,
        credentials: CredentialSource,
        completion: CompletionClient,
    ) -> Self {
        Self {
            rate_limiter,
            content_filter,
            credentials,
            completion,
        }
    }

    /// Production wiring: system clock, default denylist, env credentials.
    pub fn from_config(config: &ProxyConfig) -> Result<Self, reqwest::Error> {
        let rate_limiter = RateLimiter::new(config.rate_limit_max, config.rate_limit_window)
            .with_strategy(config.rate_limit_strategy)
            .with_cleanup_threshold(config.rate_limit_cleanup_threshold);

        Ok(Self::new(
            rate_limiter,
            ContentFilter::default(),
            CredentialSource::from_env(),
            CompletionClient::new(config.completion.clone())?,
        ))
    }
}
