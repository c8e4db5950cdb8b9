//! Runtime configuration
//!
//! Every value has a default and can be overridden from the environment.

use std::time::Duration;

use tracing::warn;
use types::ids::Symbol;

const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";

/// Which store backs the order book
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Memory,
    Redis,
}

impl StoreBackend {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "memory" | "mem" => Some(StoreBackend::Memory),
            "redis" => Some(StoreBackend::Redis),
            _ => None,
        }
    }
}

/// Order book service configuration
#[derive(Debug, Clone)]
pub struct BookConfig {
    pub backend: StoreBackend,
    pub redis_url: String,
    /// Symbols served; empty means whatever the book has seen
    pub symbols: Vec<Symbol>,
    /// Price levels per side returned by a depth request
    pub market_depth_limit: usize,
}

impl Default for BookConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            redis_url: DEFAULT_REDIS_URL.to_string(),
            symbols: Vec::new(),
            market_depth_limit: 50,
        }
    }
}

impl BookConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            backend: std::env::var("STORE_BACKEND")
                .ok()
                .and_then(|v| StoreBackend::parse(&v))
                .unwrap_or(defaults.backend),
            redis_url: std::env::var("REDIS_URL").unwrap_or(defaults.redis_url),
            symbols: std::env::var("SYMBOLS")
                .map(|v| parse_symbols(&v))
                .unwrap_or_default(),
            market_depth_limit: env_parse("MARKET_DEPTH_LIMIT").unwrap_or(defaults.market_depth_limit),
        }
    }
}

/// Pending-swap tracker configuration
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Poll interval for outstanding transactions
    pub tick_interval: Duration,
    /// Interval between abandoned-swap sweeps
    pub sweep_interval: Duration,
    /// Swaps not started within this long after creation are aborted
    pub swap_start_timeout: Duration,
    /// Status lookups in flight at once during a poll tick
    pub poll_concurrency: usize,
    pub rpc_url: String,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(10),
            sweep_interval: Duration::from_secs(10),
            swap_start_timeout: Duration::from_secs(60),
            poll_concurrency: 8,
            rpc_url: "http://127.0.0.1:8545".to_string(),
        }
    }
}

impl TrackerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let tick_interval = match std::env::var("TICKER_DURATION") {
            Ok(raw) => parse_duration(&raw).unwrap_or_else(|| {
                warn!(value = %raw, default = ?defaults.tick_interval, "invalid TICKER_DURATION, using default");
                defaults.tick_interval
            }),
            Err(_) => defaults.tick_interval,
        };
        Self {
            tick_interval,
            sweep_interval: env_parse::<u64>("SWEEP_INTERVAL_SECS")
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.sweep_interval),
            swap_start_timeout: env_parse("SEC_SWAP_STARTED")
                .map(Duration::from_secs)
                .unwrap_or(defaults.swap_start_timeout),
            poll_concurrency: env_parse::<usize>("POLL_CONCURRENCY")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.poll_concurrency),
            rpc_url: std::env::var("RPC_URL").unwrap_or(defaults.rpc_url),
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

/// Comma-separated `BASE-QUOTE` list; invalid entries are logged and skipped
pub fn parse_symbols(raw: &str) -> Vec<Symbol> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| match Symbol::try_new(s) {
            Ok(symbol) => Some(symbol),
            Err(e) => {
                warn!(symbol = s, error = %e, "ignoring configured symbol");
                None
            }
        })
        .collect()
}

/// `"250ms"`, `"10s"`, `"2m"` or bare seconds
pub fn parse_duration(raw: &str) -> Option<Duration> {
    let raw = raw.trim();
    let (digits, unit) = match raw.find(|c: char| !c.is_ascii_digit()) {
        Some(split) => raw.split_at(split),
        None => (raw, "s"),
    };
    let value: u64 = digits.parse().ok()?;
    let duration = match unit {
        "ms" => Duration::from_millis(value),
        "s" => Duration::from_secs(value),
        "m" => Duration::from_secs(value.checked_mul(60)?),
        _ => return None,
    };
    (!duration.is_zero()).then_some(duration)
}
