//! Configuration loader and application settings.

use crate::errors::{AppError, Result};
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_WS_URL: &str = "wss://dlob.drift.trade/ws";

/// Consolidated application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// WebSocket endpoint of the upstream DLOB feed.
    pub ws_url: String,
    /// SQLite file holding the mid-price history.
    pub db_path: String,
    /// Address the HTTP query surface binds to.
    pub http_addr: SocketAddr,
    /// Market type sent with every subscription (e.g., "perp").
    pub market_type: String,
    /// Symbols to subscribe, in upstream market-index order.
    pub markets: Vec<String>,
    pub feed: FeedSettings,
}

impl AppConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn load() -> Result<Self> {
        let ws_url = std::env::var("DLOB_WS_URL").unwrap_or_else(|_| DEFAULT_WS_URL.into());
        let db_path = std::env::var("DB_PATH").unwrap_or_else(|_| ".price_history.db".into());
        let http_addr = env_or("HTTP_ADDR", SocketAddr::from(([127, 0, 0, 1], 8080)))?;
        let market_type = std::env::var("MARKET_TYPE").unwrap_or_else(|_| "perp".into());
        let markets = parse_markets(
            &std::env::var("MARKETS").unwrap_or_else(|_| "SOL-PERP,BTC-PERP,ETH-PERP".into()),
        );
        if markets.is_empty() {
            return Err(AppError::Config("MARKETS must name at least one symbol".into()));
        }

        let defaults = FeedSettings::default();
        let feed = FeedSettings {
            reconnect_attempts: env_or("RECONNECT_ATTEMPTS", defaults.reconnect_attempts)?,
            reconnect_delay: Duration::from_secs(env_or(
                "RECONNECT_DELAY_SECS",
                defaults.reconnect_delay.as_secs(),
            )?),
            read_timeout: Duration::from_millis(env_or(
                "READ_TIMEOUT_MS",
                defaults.read_timeout.as_millis() as u64,
            )?),
            stale_after: Duration::from_secs(env_or(
                "STALE_AFTER_SECS",
                defaults.stale_after.as_secs(),
            )?),
            ..defaults
        };
        if feed.reconnect_attempts == 0 {
            return Err(AppError::Config("RECONNECT_ATTEMPTS must be at least 1".into()));
        }

        Ok(Self {
            ws_url,
            db_path,
            http_addr,
            market_type,
            markets,
            feed,
        })
    }
}

/// Timings that drive the connection lifecycle and the read loop.
#[derive(Debug, Clone)]
pub struct FeedSettings {
    /// Wait after a failed open before the caller may retry.
    pub open_cooldown: Duration,
    /// Pause after a successful handshake before frames are sent.
    pub settle_delay: Duration,
    /// A heartbeat younger than this makes `reconnect` a no-op.
    pub heartbeat_fresh_for: Duration,
    /// Minimum spacing of the "already connected" log line.
    pub fast_path_log_every: Duration,
    pub reconnect_attempts: u32,
    pub reconnect_delay: Duration,
    /// Bounded wait of a single receive in the read loop.
    pub read_timeout: Duration,
    /// Pause after a read failure triggered a reconnect.
    pub failure_cooldown: Duration,
    /// No frame at all for this long counts as a dead connection.
    pub stale_after: Duration,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            open_cooldown: Duration::from_secs(5),
            settle_delay: Duration::from_millis(200),
            heartbeat_fresh_for: Duration::from_secs(10),
            fast_path_log_every: Duration::from_secs(20),
            reconnect_attempts: 5,
            reconnect_delay: Duration::from_secs(20),
            read_timeout: Duration::from_millis(500),
            failure_cooldown: Duration::from_secs(10),
            stale_after: Duration::from_secs(30),
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => parse_value(key, &raw),
        Err(_) => Ok(default),
    }
}

/// Parse a raw setting value; `key` only labels the error.
fn parse_value<T: FromStr>(key: &str, raw: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| AppError::Config(format!("{key}={raw:?}: {e}")))
}

fn parse_markets(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
