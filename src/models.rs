//! Shared data structures used throughout the application.

use serde::{Deserialize, Serialize};

/// Maximum number of price levels kept per book side.
pub const MAX_DEPTH: usize = 10;

/// A desired upstream order-book subscription.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub market_type: String,
    pub market: String,
}

impl Subscription {
    pub fn new(market_type: impl Into<String>, market: impl Into<String>) -> Self {
        Self {
            market_type: market_type.into(),
            market: market.into(),
        }
    }
}

/// Lifecycle of the upstream socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    /// Terminal; entered on shutdown.
    Closed,
}

/// Top-of-book snapshot for one market. Bids descend, asks ascend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderbookSnapshot {
    pub market: String,
    pub bids: Vec<f64>,
    pub asks: Vec<f64>,
}

impl OrderbookSnapshot {
    pub fn empty(market: &str) -> Self {
        Self {
            market: market.to_string(),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }

    /// Midpoint of best bid and best ask, if both sides are quoted.
    pub fn mid_price(&self) -> Option<f64> {
        let bid = self.bids.first()?;
        let ask = self.asks.first()?;
        Some((bid + ask) / 2.0)
    }
}

/// One recorded mid-price observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSample {
    pub symbol: String,
    pub price: f64,
    /// Seconds since the Unix epoch.
    pub timestamp: f64,
}

/// A reconstructed point of a fixed-interval price series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HistoryBucket {
    pub edge_timestamp: f64,
    pub price: Option<f64>,
}
