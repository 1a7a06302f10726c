//! Fixed-interval price series from irregular samples.
//!
//! For `limit` buckets spaced `interval` seconds apart and ending at `now`, each bucket
//! takes the price of the newest sample at or before its edge timestamp. One extra,
//! older edge anchors the fetch window and is dropped from the result.

use crate::errors::Result;
use crate::history::store::PriceHistoryStore;
use crate::models::{HistoryBucket, PriceSample};

pub const MAX_INTERVAL_SECS: u64 = 1800;
pub const MAX_LIMIT: usize = 50;

/// Query parameters, already clamped to the supported ranges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryQuery {
    pub interval: u64,
    pub limit: usize,
}

impl HistoryQuery {
    pub fn new(interval: u64, limit: usize) -> Self {
        Self {
            interval: interval.min(MAX_INTERVAL_SECS),
            limit: limit.min(MAX_LIMIT),
        }
    }

    /// Lower bound (exclusive) of the sample window for a query evaluated at `now`.
    pub fn window_start(&self, now: f64) -> f64 {
        now - self.interval as f64 * (self.limit as f64 + 1.0)
    }

    /// `limit + 1` edge timestamps, newest first.
    pub fn edges(&self, now: f64) -> Vec<f64> {
        (0..=self.limit)
            .map(|i| now - (i as u64 * self.interval) as f64)
            .collect()
    }
}

/// Advance through `samples` (newest first) from `from` to the first sample at or
/// before `edge`. Returns that sample's price and the position to resume from; the
/// position does not move when nothing qualifies.
pub fn scan_to_edge(samples: &[PriceSample], from: usize, edge: f64) -> (Option<f64>, usize) {
    match samples[from..].iter().position(|s| s.timestamp <= edge) {
        Some(offset) => (Some(samples[from + offset].price), from + offset),
        None => (None, from),
    }
}

/// Build the bucket series, oldest first, from samples ordered newest first.
pub fn reconstruct(samples: &[PriceSample], query: HistoryQuery, now: f64) -> Vec<HistoryBucket> {
    let mut cursor = 0;
    let mut buckets: Vec<HistoryBucket> = query
        .edges(now)
        .into_iter()
        .map(|edge| {
            let (price, next) = scan_to_edge(samples, cursor, edge);
            cursor = next;
            HistoryBucket {
                edge_timestamp: edge,
                price,
            }
        })
        .collect();

    buckets.reverse();
    if buckets.len() > query.limit {
        buckets.remove(0);
    }
    buckets
}

/// Load the sample window for `symbol` and reconstruct its series at `now`.
pub async fn price_history(
    store: &PriceHistoryStore,
    symbol: &str,
    query: HistoryQuery,
    now: f64,
) -> Result<Vec<HistoryBucket>> {
    let samples = store.since(symbol, query.window_start(now)).await?;
    Ok(reconstruct(&samples, query, now))
}
