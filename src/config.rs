use std::{fmt, net::SocketAddr, sync::Arc, time::Duration};

use clap::Parser;
use thiserror::Error;

use crate::services::completion::{
    CompletionSettings, DEFAULT_COMPLETIONS_URL, DEFAULT_MAX_TOKENS, DEFAULT_MODEL,
    DEFAULT_TEMPERATURE, SYSTEM_PROMPT,
};
use crate::services::rate_limiter::{DEFAULT_CLEANUP_THRESHOLD, RateLimitStrategy};

/// Environment variables probed for the upstream API key, highest priority first.
/// The last alias, with its space, is kept as-is.
pub const API_KEY_VARS: &[&str] = &["API_KEY", "OPENAI_API_KEY", "API Key"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("no upstream credential set (checked {checked:?})")]
    MissingCredential { checked: Vec<String> },
}

// CLI argument structure
#[derive(Parser, Debug, Clone)]
#[command(name = "coach-proxy")]
#[command(about = "Rate-limited, input-filtering proxy for a chat completion API")]
pub struct Args {
    // Address to bind
    #[arg(long, default_value = "0.0.0.0")]
    pub host: String,

    // Port to run the server on
    #[arg(short, long, default_value_t = 3000)]
    pub port: u16,

    // Full URL of the chat completions endpoint
    #[arg(long, default_value = DEFAULT_COMPLETIONS_URL)]
    pub upstream_url: String,

    #[arg(long, default_value = DEFAULT_MODEL)]
    pub model: String,

    #[arg(long, default_value_t = DEFAULT_MAX_TOKENS)]
    pub max_tokens: u32,

    #[arg(long, default_value_t = DEFAULT_TEMPERATURE)]
    pub temperature: f32,

    // Upstream timeout in seconds
    #[arg(long, default_value_t = 30)]
    pub timeout: u64,

    // Rate limit max requests per window
    #[arg(long, default_value_t = 10)]
    pub rate_limit: u32,

    // Rate limit window in milliseconds
    #[arg(long, default_value_t = 60_000)]
    pub rate_window_ms: u64,

    // "fixed" or "sliding"
    #[arg(long, default_value = "fixed")]
    pub rate_limit_strategy: RateLimitStrategy,

    // Prune expired limiter entries once this many clients are tracked
    #[arg(long, default_value_t = DEFAULT_CLEANUP_THRESHOLD)]
    pub rate_limit_cleanup_threshold: usize,
}

impl Default for Args {
    fn default() -> Self {
        Self::parse_from(["coach-proxy"])
    }
}

/// Validated runtime configuration.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub bind_addr: SocketAddr,
    pub completion: CompletionSettings,
    pub rate_limit_max: u32,
    pub rate_limit_window: Duration,
    pub rate_limit_strategy: RateLimitStrategy,
    pub rate_limit_cleanup_threshold: usize,
}

impl TryFrom<Args> for ProxyConfig {
    type Error = ConfigError;

    fn try_from(args: Args) -> Result<Self, Self::Error> {
        let bind_addr: SocketAddr = format!("{}:{}", args.host, args.port)
            .parse()
            .map_err(|e| ConfigError::Invalid(format!("bind address: {e}")))?;

        if args.rate_limit == 0 {
            return Err(ConfigError::Invalid("rate limit must be at least 1".into()));
        }
        if args.rate_window_ms == 0 {
            return Err(ConfigError::Invalid("rate window must be non-zero".into()));
        }
        if !(0.0..=2.0).contains(&args.temperature) {
            return Err(ConfigError::Invalid(format!(
                "temperature {} outside 0.0..=2.0",
                args.temperature
            )));
        }
        if args.model.trim().is_empty() {
            return Err(ConfigError::Invalid("model must not be empty".into()));
        }

        Ok(Self {
            bind_addr,
            completion: CompletionSettings {
                url: args.upstream_url,
                model: args.model,
                max_tokens: args.max_tokens,
                temperature: args.temperature,
                timeout: Duration::from_secs(args.timeout),
                system_prompt: SYSTEM_PROMPT.to_string(),
            },
            rate_limit_max: args.rate_limit,
            rate_limit_window: Duration::from_millis(args.rate_window_ms),
            rate_limit_strategy: args.rate_limit_strategy,
            rate_limit_cleanup_threshold: args.rate_limit_cleanup_threshold,
        })
    }
}

/// Return the first non-empty value among `names`, looked up in order.
pub fn resolve_first_present<F>(names: &[&str], lookup: F) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    names
        .iter()
        .filter_map(|&name| lookup(name))
        .find(|value| !value.trim().is_empty())
}

type Lookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Where the upstream API key comes from. Read on every request so a key
/// set after startup is picked up.
#[derive(Clone)]
pub struct CredentialSource {
    names: Vec<&'static str>,
    lookup: Lookup,
}

impl fmt::Debug for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialSource")
            .field("names", &self.names)
            .finish()
    }
}

impl Default for CredentialSource {
    fn default() -> Self {
        Self::from_env()
    }
}

impl CredentialSource {
    pub fn from_env() -> Self {
        Self::with_lookup(|name| std::env::var(name).ok())
    }

    pub fn with_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        Self {
            names: API_KEY_VARS.to_vec(),
            lookup: Arc::new(lookup),
        }
    }

    /// Fixed key, handy for tests and embedding.
    pub fn fixed(key: impl Into<String>) -> Self {
        let key = key.into();
        Self::with_lookup(move |_| Some(key.clone()))
    }

    pub fn resolve(&self) -> Result<String, ConfigError> {
        resolve_first_present(&self.names, |name| (self.lookup)(name)).ok_or_else(|| {
            ConfigError::MissingCredential {
                checked: self.names.iter().map(|n| n.to_string()).collect(),
            }
        })
    }
}
