use std::str::FromStr;
use std::time::Duration;

use rust_decimal::Decimal;

use crate::error::{AppError, Result};

/// Default cache TTLs per artifact (seconds). Leaderboard pages are the most
/// volatile artifact, time series the least.
pub const CACHE_TTL_LEADERBOARD_SECS: u64 = 15 * 60;
pub const CACHE_TTL_DETAIL_SECS: u64 = 10 * 60;
pub const CACHE_TTL_SERIES_SECS: u64 = 30 * 60;

/// Upper bound on any single cache call. Calls that take longer are treated as a miss.
pub const CACHE_TIMEOUT_MS: u64 = 50;

/// How often the in-memory cache backend drops expired entries (seconds).
pub const CACHE_SWEEP_INTERVAL_SECS: u64 = 60;

/// EMA window over raw daily volume.
pub const EMA_WINDOW: usize = 7;

/// SMA window and derived-metrics lookback (days, inclusive of the target date).
pub const SMA_WINDOW: usize = 30;

/// Ranking scheduler interval (seconds).
pub const RANKING_INTERVAL_SECS: u64 = 3_600;

/// Read operations slower than this are logged as over budget (milliseconds).
pub const READ_BUDGET_MS: u64 = 200;

/// Leaderboard page sizes that are eligible for caching.
pub const CACHEABLE_PAGE_SIZES: &[u32] = &[10, 50];

/// Largest page a caller may request.
pub const MAX_PAGE_SIZE: u32 = 100;

/// Longest series / sparkline a caller may request (days).
pub const MAX_SERIES_DAYS: u32 = 365;

/// Clamp bounds applied to derived ratios.
pub mod clamps {
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    pub const ABSORPTION_MIN: Decimal = dec!(0);
    pub const ABSORPTION_MAX: Decimal = dec!(1);
    pub const LIQUIDITY_MIN: Decimal = dec!(0);
    pub const LIQUIDITY_MAX: Decimal = dec!(1);
    pub const DAYS_TO_SELL_MIN: Decimal = dec!(1);
    pub const DAYS_TO_SELL_MAX: Decimal = dec!(365);
}

/// Liquidity score component weights. Must sum to 1.
pub mod liquidity_weights {
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    pub const ABSORPTION: Decimal = dec!(0.5);
    pub const DEPTH: Decimal = dec!(0.3);
    pub const VELOCITY: Decimal = dec!(0.2);
}

/// Tunables for the derived-metrics engine.
#[derive(Debug, Clone)]
pub struct MetricsConfig {
    pub ema_window: usize,
    /// How many of the most recent non-null volumes feed the EMA.
    pub ema_lookback_values: usize,
    pub sma_window: usize,
    /// Listings count at which the depth component of the liquidity score saturates.
    pub max_expected_listings: Decimal,
    /// 7-day EMA volume at which the velocity component saturates.
    pub max_volume_norm: Decimal,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            ema_window: EMA_WINDOW,
            ema_lookback_values: EMA_WINDOW,
            sma_window: SMA_WINDOW,
            max_expected_listings: Decimal::from(500),
            max_volume_norm: Decimal::from(100_000),
        }
    }
}

/// Per-artifact TTLs plus the per-call timeout for the cache.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub leaderboard_ttl: Duration,
    pub detail_ttl: Duration,
    pub series_ttl: Duration,
    pub call_timeout: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            leaderboard_ttl: Duration::from_secs(CACHE_TTL_LEADERBOARD_SECS),
            detail_ttl: Duration::from_secs(CACHE_TTL_DETAIL_SECS),
            series_ttl: Duration::from_secs(CACHE_TTL_SERIES_SECS),
            call_timeout: Duration::from_millis(CACHE_TIMEOUT_MS),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub db_path: String,
    pub api_port: u16,
    pub metrics: MetricsConfig,
    pub cache: CacheConfig,
    /// Seconds between scheduled ranking runs (RANKING_INTERVAL_SECS)
    pub ranking_interval_secs: u64,
    /// Latency budget for read operations (READ_BUDGET_MS)
    pub read_budget: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let ema_window: usize = env_parse("EMA_WINDOW", EMA_WINDOW)?;
        let sma_window: usize = env_parse("SMA_WINDOW", SMA_WINDOW)?;
        if ema_window == 0 || sma_window == 0 {
            return Err(AppError::Config(
                "EMA_WINDOW and SMA_WINDOW must be at least 1".to_string(),
            ));
        }

        let defaults = MetricsConfig::default();
        let metrics = MetricsConfig {
            ema_window,
            ema_lookback_values: env_parse("EMA_LOOKBACK_VALUES", ema_window)?,
            sma_window,
            max_expected_listings: env_parse(
                "MAX_EXPECTED_LISTINGS",
                defaults.max_expected_listings,
            )?,
            max_volume_norm: env_parse("MAX_VOLUME_NORM", defaults.max_volume_norm)?,
        };
        if metrics.max_expected_listings <= Decimal::ZERO
            || metrics.max_volume_norm <= Decimal::ZERO
        {
            return Err(AppError::Config(
                "MAX_EXPECTED_LISTINGS and MAX_VOLUME_NORM must be positive".to_string(),
            ));
        }

        let cache = CacheConfig {
            leaderboard_ttl: Duration::from_secs(env_parse(
                "CACHE_TTL_LEADERBOARD_SECS",
                CACHE_TTL_LEADERBOARD_SECS,
            )?),
            detail_ttl: Duration::from_secs(env_parse(
                "CACHE_TTL_DETAIL_SECS",
                CACHE_TTL_DETAIL_SECS,
            )?),
            series_ttl: Duration::from_secs(env_parse(
                "CACHE_TTL_SERIES_SECS",
                CACHE_TTL_SERIES_SECS,
            )?),
            call_timeout: Duration::from_millis(env_parse("CACHE_TIMEOUT_MS", CACHE_TIMEOUT_MS)?),
        };

        Ok(Self {
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            db_path: std::env::var("DB_PATH").unwrap_or_else(|_| "leaderboard.db".to_string()),
            api_port: std::env::var("API_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse::<u16>()
                .map_err(|_| AppError::Config("API_PORT must be a valid port number".to_string()))?,
            metrics,
            cache,
            ranking_interval_secs: env_parse("RANKING_INTERVAL_SECS", RANKING_INTERVAL_SECS)?,
            read_budget: Duration::from_millis(env_parse("READ_BUDGET_MS", READ_BUDGET_MS)?),
        })
    }
}

/// Reads `key` from the environment, falling back to `default` when unset.
/// A value that is set but unparseable is a configuration error.
fn env_parse<T: FromStr>(key: &str, default: T) -> Result<T> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| AppError::Config(format!("{key} has an invalid value: {raw:?}"))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn liquidity_weights_sum_to_one() {
        use liquidity_weights::*;
        assert_eq!(ABSORPTION + DEPTH + VELOCITY, Decimal::ONE);
    }

    #[test]
    fn unset_env_falls_back_to_default() {
        let v: u64 = env_parse("LEADERBOARD_TEST_SURELY_UNSET_KEY", 42).unwrap();
        assert_eq!(v, 42);
    }

    #[test]
    fn default_ttls_follow_artifact_volatility() {
        let c = CacheConfig::default();
        assert!(c.detail_ttl < c.leaderboard_ttl);
        assert!(c.leaderboard_ttl < c.series_ttl);
    }
}
