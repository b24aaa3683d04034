pub mod completion;
pub mod content_filter;
pub mod rate_limiter;
