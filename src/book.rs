//! Per-market best-of-book cache.
//!
//! Snapshots are replaced wholesale on every update. Each two-sided update also
//! records its mid-price in the price history.

use crate::history::store::PriceHistoryStore;
use crate::models::{MAX_DEPTH, OrderbookSnapshot, PriceSample};
use crate::utils::unix_now;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{trace, warn};

pub struct OrderbookCache {
    books: RwLock<HashMap<String, OrderbookSnapshot>>,
    history: Arc<PriceHistoryStore>,
}

impl OrderbookCache {
    pub fn new(history: Arc<PriceHistoryStore>) -> Self {
        Self {
            books: RwLock::new(HashMap::new()),
            history,
        }
    }

    pub fn history(&self) -> &Arc<PriceHistoryStore> {
        &self.history
    }

    /// Create or blank the entry for `market`.
    pub fn reset(&self, market: &str) {
        self.books
            .write()
            .insert(market.to_string(), OrderbookSnapshot::empty(market));
    }

    pub fn remove(&self, market: &str) {
        self.books.write().remove(market);
    }

    /// Current snapshot, or an empty one for markets without an entry.
    pub fn read(&self, market: &str) -> OrderbookSnapshot {
        self.books
            .read()
            .get(market)
            .cloned()
            .unwrap_or_else(|| OrderbookSnapshot::empty(market))
    }

    /// Replace the snapshot of a subscribed market and record its mid-price.
    ///
    /// Updates for markets without an entry are dropped. Returns the computed
    /// mid-price, if any. A failed history write is logged and does not undo the
    /// cache update.
    pub async fn update(&self, market: &str, mut bids: Vec<f64>, mut asks: Vec<f64>) -> Option<f64> {
        bids.truncate(MAX_DEPTH);
        asks.truncate(MAX_DEPTH);

        let mid = {
            let mut books = self.books.write();
            let entry = books.get_mut(market)?;
            entry.bids = bids;
            entry.asks = asks;
            entry.mid_price()
        };
        let price = mid?;

        let sample = PriceSample {
            symbol: market.to_string(),
            price,
            timestamp: unix_now(),
        };
        match self.history.append(&sample).await {
            Ok(()) => trace!(market, price, "[BOOK] mid-price recorded"),
            Err(e) => warn!(market, error = %e, "[BOOK] failed to record mid-price"),
        }
        Some(price)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache() -> OrderbookCache {
        OrderbookCache::new(Arc::new(PriceHistoryStore::open_in_memory().unwrap()))
    }

    #[tokio::test]
    async fn two_sided_update_records_mid() {
        let cache = cache();
        cache.reset("SOL-PERP");

        let mid = cache.update("SOL-PERP", vec![99.0, 98.0], vec![101.0, 102.0]).await;
        assert_eq!(mid, Some(100.0));
        assert_eq!(cache.read("SOL-PERP").bids, vec![99.0, 98.0]);

        let latest = cache.history().latest("SOL-PERP").await.unwrap().unwrap();
        assert_eq!(latest.price, 100.0);
    }

    #[tokio::test]
    async fn one_sided_update_never_records() {
        let cache = cache();
        cache.reset("SOL-PERP");

        assert_eq!(cache.update("SOL-PERP", vec![99.0], vec![]).await, None);
        assert_eq!(cache.update("SOL-PERP", vec![], vec![101.0]).await, None);
        assert_eq!(cache.read("SOL-PERP").asks, vec![101.0]);
        assert!(cache.read("SOL-PERP").bids.is_empty());
        assert_eq!(cache.history().latest("SOL-PERP").await.unwrap(), None);
    }

    #[tokio::test]
    async fn updates_for_unsubscribed_markets_are_dropped() {
        let cache = cache();
        assert_eq!(cache.update("BTC-PERP", vec![1.0], vec![2.0]).await, None);
        assert!(cache.read("BTC-PERP").is_empty());
        assert_eq!(cache.history().latest("BTC-PERP").await.unwrap(), None);
    }

    #[tokio::test]
    async fn removed_market_reads_as_empty() {
        let cache = cache();
        cache.reset("ETH-PERP");
        cache.update("ETH-PERP", vec![1.0], vec![2.0]).await;

        cache.remove("ETH-PERP");
        let snap = cache.read("ETH-PERP");
        assert!(snap.is_empty());
        assert_eq!(snap.market, "ETH-PERP");
    }

    #[tokio::test]
    async fn store_failure_keeps_cache_update() {
        let cache = cache();
        cache.reset("SOL-PERP");
        cache.history().close().await.unwrap();

        assert_eq!(cache.update("SOL-PERP", vec![10.0], vec![12.0]).await, Some(11.0));
        assert_eq!(cache.read("SOL-PERP").asks, vec![12.0]);
    }

    #[tokio::test]
    async fn depth_is_capped() {
        let cache = cache();
        cache.reset("SOL-PERP");
        let bids: Vec<f64> = (0..20).map(|i| 100.0 - i as f64).collect();
        cache.update("SOL-PERP", bids, vec![101.0]).await;
        assert_eq!(cache.read("SOL-PERP").bids.len(), MAX_DEPTH);
    }
}
