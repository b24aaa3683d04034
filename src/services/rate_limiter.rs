// Per-client request limiter. The table is process-local: behind several
// instances the limit applies per instance, not globally.
use std::{
    collections::{HashMap, VecDeque},
    fmt::Debug,
    str::FromStr,
    sync::{Arc, Mutex as StdMutex},
    time::{Duration, Instant},
};

use tokio::sync::Mutex;
use tracing::debug;

pub const RATE_LIMIT_WINDOW: Duration = Duration::from_millis(60_000);
pub const RATE_LIMIT_MAX: u32 = 10;
pub const DEFAULT_CLEANUP_THRESHOLD: usize = 10_000;

/// Source of "now" for the limiter.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<StdMutex<Instant>>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Arc::new(StdMutex::new(Instant::now())),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RateLimitStrategy {
    /// Discrete windows starting at a client's first request. Allows up to
    /// twice the limit across a window boundary.
    #[default]
    FixedWindow,
    /// Counts accepted requests in the trailing window.
    SlidingWindow,
}

impl FromStr for RateLimitStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fixed" | "fixed-window" => Ok(Self::FixedWindow),
            "sliding" | "sliding-window" => Ok(Self::SlidingWindow),
            other => Err(format!("unknown rate limit strategy '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitEntry {
    pub count: u32,
    pub reset_time: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed { count: u32 },
    Limited { retry_at: Instant },
}

impl RateLimitDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateLimitDecision::Allowed { .. })
    }
}

#[derive(Debug)]
enum Bucket {
    Fixed(RateLimitEntry),
    Sliding(VecDeque<Instant>),
}

impl Bucket {
    fn is_expired(&self, now: Instant, window: Duration) -> bool {
        match self {
            Bucket::Fixed(entry) => now > entry.reset_time,
            Bucket::Sliding(hits) => hits
                .back()
                .is_none_or(|last| now.duration_since(*last) >= window),
        }
    }
}

#[derive(Clone)]
pub struct RateLimiter {
    inner: Arc<Mutex<HashMap<String, Bucket>>>,
    clock: Arc<dyn Clock>,
    max: u32,
    window: Duration,
    strategy: RateLimitStrategy,
    cleanup_threshold: usize,
}

impl Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("max", &self.max)
            .field("window", &self.window)
            .field("strategy", &self.strategy)
            .finish()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RATE_LIMIT_MAX, RATE_LIMIT_WINDOW)
    }
}

impl RateLimiter {
    pub fn new(max: u32, window: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
            clock: Arc::new(SystemClock),
            max,
            window,
            strategy: RateLimitStrategy::FixedWindow,
            cleanup_threshold: DEFAULT_CLEANUP_THRESHOLD,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_strategy(mut self, strategy: RateLimitStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_cleanup_threshold(mut self, threshold: usize) -> Self {
        self.cleanup_threshold = threshold;
        self
    }

    /// Record a request from `key` and decide whether it may proceed.
    pub async fn check(&self, key: &str) -> RateLimitDecision {
        let now = self.clock.now();
        let mut guard = self.inner.lock().await;

        if guard.len() > self.cleanup_threshold {
            let before = guard.len();
            guard.retain(|_, b| !b.is_expired(now, self.window));
            debug!(
                removed = before - guard.len(),
                remaining = guard.len(),
                "pruned expired rate limit entries"
            );
        }

        match self.strategy {
            RateLimitStrategy::FixedWindow => self.check_fixed(&mut guard, key, now),
            RateLimitStrategy::SlidingWindow => self.check_sliding(&mut guard, key, now),
        }
    }

    fn check_fixed(
        &self,
        table: &mut HashMap<String, Bucket>,
        key: &str,
        now: Instant,
    ) -> RateLimitDecision {
        if let Some(Bucket::Fixed(entry)) = table.get_mut(key)
            && now <= entry.reset_time
        {
            if entry.count >= self.max {
                return RateLimitDecision::Limited {
                    retry_at: entry.reset_time,
                };
            }
            entry.count += 1;
            return RateLimitDecision::Allowed { count: entry.count };
        }

        table.insert(
            key.to_string(),
            Bucket::Fixed(RateLimitEntry {
                count: 1,
                reset_time: now + self.window,
            }),
        );
        RateLimitDecision::Allowed { count: 1 }
    }

    fn check_sliding(
        &self,
        table: &mut HashMap<String, Bucket>,
        key: &str,
        now: Instant,
    ) -> RateLimitDecision {
        let bucket = table
            .entry(key.to_string())
            .or_insert_with(|| Bucket::Sliding(VecDeque::new()));

        if let Bucket::Fixed(_) = bucket {
            *bucket = Bucket::Sliding(VecDeque::new());
        }
        let Bucket::Sliding(hits) = bucket else {
            unreachable!("bucket was just normalised to sliding");
        };

        while hits
            .front()
            .is_some_and(|t| now.duration_since(*t) >= self.window)
        {
            hits.pop_front();
        }

        if hits.len() >= self.max as usize {
            let retry_at = hits.front().map_or(now, |t| *t + self.window);
            return RateLimitDecision::Limited { retry_at };
        }

        hits.push_back(now);
        RateLimitDecision::Allowed {
            count: hits.len() as u32,
        }
    }

    /// Current fixed-window entry for `key`, if one is stored.
    pub async fn entry(&self, key: &str) -> Option<RateLimitEntry> {
        let guard = self.inner.lock().await;
        match guard.get(key) {
            Some(Bucket::Fixed(entry)) => Some(entry.clone()),
            _ => None,
        }
    }

    /// Remove entries whose window has passed. Returns number removed.
    pub async fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut guard = self.inner.lock().await;
        let before = guard.len();
        guard.retain(|_, b| !b.is_expired(now, self.window));
        before - guard.len()
    }

    /// Number of tracked clients
    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(max: u32, clock: &ManualClock) -> RateLimiter {
        RateLimiter::new(max, Duration::from_secs(60)).with_clock(Arc::new(clock.clone()))
    }

    #[tokio::test]
    async fn first_request_creates_entry() {
        let clock = ManualClock::new();
        let rl = limiter(10, &clock);

        assert_eq!(rl.check("1.2.3.4").await, RateLimitDecision::Allowed { count: 1 });
        let entry = rl.entry("1.2.3.4").await.unwrap();
        assert_eq!(entry.count, 1);
        assert_eq!(entry.reset_time, clock.now() + Duration::from_secs(60));
    }

    #[tokio::test]
    async fn window_edge_is_inclusive() {
        let clock = ManualClock::new();
        let rl = limiter(1, &clock);
        assert!(rl.check("a").await.is_allowed());

        // now == reset_time still belongs to the old window
        clock.advance(Duration::from_secs(60));
        assert!(!rl.check("a").await.is_allowed());

        clock.advance(Duration::from_millis(1));
        assert_eq!(rl.check("a").await, RateLimitDecision::Allowed { count: 1 });
    }

    #[test]
    fn strategy_parses() {
        assert_eq!("fixed".parse(), Ok(RateLimitStrategy::FixedWindow));
        assert_eq!("Sliding".parse(), Ok(RateLimitStrategy::SlidingWindow));
        assert!("token-bucket".parse::<RateLimitStrategy>().is_err());
    }
}
