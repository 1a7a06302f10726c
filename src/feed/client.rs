//! Feed service object shared by the dispatcher task and the HTTP handlers.

use crate::book::OrderbookCache;
use crate::config::FeedSettings;
use crate::errors::{AppError, Result};
use crate::feed::connection::ConnectionManager;
use crate::feed::protocol::{Action, ChannelMap, encode_request};
use crate::feed::subscriptions::SubscriptionRegistry;
use crate::feed::transport::Connector;
use crate::history::store::PriceHistoryStore;
use crate::models::{OrderbookSnapshot, Subscription};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, warn};

pub struct FeedClient {
    connection: ConnectionManager,
    subscriptions: SubscriptionRegistry,
    cache: OrderbookCache,
    channels: ChannelMap,
    settings: FeedSettings,
    exited: AtomicBool,
}

impl FeedClient {
    pub fn new(
        connector: Arc<dyn Connector>,
        history: Arc<PriceHistoryStore>,
        channels: ChannelMap,
        settings: FeedSettings,
    ) -> Self {
        Self {
            connection: ConnectionManager::new(connector, settings.clone()),
            subscriptions: SubscriptionRegistry::new(),
            cache: OrderbookCache::new(history),
            channels,
            settings,
            exited: AtomicBool::new(false),
        }
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    pub fn subscriptions(&self) -> &SubscriptionRegistry {
        &self.subscriptions
    }

    pub fn cache(&self) -> &OrderbookCache {
        &self.cache
    }

    pub fn history(&self) -> &Arc<PriceHistoryStore> {
        self.cache.history()
    }

    pub fn channels(&self) -> &ChannelMap {
        &self.channels
    }

    pub fn settings(&self) -> &FeedSettings {
        &self.settings
    }

    pub fn is_exited(&self) -> bool {
        self.exited.load(Ordering::SeqCst)
    }

    pub async fn open(&self) -> Result<()> {
        self.connection.open().await
    }

    /// Reconnect using the configured attempt budget.
    pub async fn reconnect(&self) -> bool {
        self.connection
            .reconnect(
                self.settings.reconnect_attempts,
                self.settings.reconnect_delay,
                &self.subscriptions,
            )
            .await
    }

    /// Register `market` and request its order book. Re-subscribing resets the cached
    /// book and sends a fresh request; the registry keeps a single entry.
    pub async fn subscribe(&self, market_type: &str, market: &str) -> Result<()> {
        let sub = Subscription::new(market_type, market);
        self.subscriptions.insert(sub.clone());
        self.cache.reset(market);

        info!(market, "[FEED] subscribe to orderbook");
        match self.connection.send(encode_request(Action::Subscribe, &sub)?).await {
            Err(AppError::NotConnected) => {
                warn!(market, "[FEED] socket absent, subscription deferred to reconnect");
                Ok(())
            }
            other => other,
        }
    }

    /// Forget `market`. The unsubscribe request itself is best-effort.
    pub async fn unsubscribe(&self, market_type: &str, market: &str) {
        let sub = Subscription::new(market_type, market);
        self.subscriptions.remove(&sub);
        self.cache.remove(market);

        info!(market, "[FEED] unsubscribe from orderbook");
        let sent = match encode_request(Action::Unsubscribe, &sub) {
            Ok(frame) => self.connection.send(frame).await,
            Err(e) => Err(e),
        };
        match sent {
            Ok(()) | Err(AppError::NotConnected) => {}
            Err(e) => warn!(market, error = %e, "[FEED] unsubscribe request failed"),
        }
    }

    pub fn orderbook(&self, market: &str) -> OrderbookSnapshot {
        self.cache.read(market)
    }

    /// Stop the feed: flag the read loop, drop every subscription, close the socket and
    /// the history store.
    pub async fn shutdown(&self) {
        warn!("[FEED] initiating safe exit");
        self.exited.store(true, Ordering::SeqCst);
        for sub in self.subscriptions.all() {
            self.unsubscribe(&sub.market_type, &sub.market).await;
        }
        self.connection.shutdown().await;
        if let Err(e) = self.history().close().await {
            warn!(error = %e, "[FEED] error while closing price history");
        }
    }
}
