//! Read loop: pulls frames off the live socket and routes them.

use crate::errors::Result;
use crate::feed::client::FeedClient;
use crate::feed::protocol::{Frame, parse_frame};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep};
use tracing::{debug, error, info, warn};

/// Spawn the dispatcher as a background task.
pub fn spawn_dispatcher(feed: Arc<FeedClient>) -> JoinHandle<()> {
    tokio::spawn(async move { run(feed).await })
}

/// Run until the client is shut down.
///
/// Receives wait at most `read_timeout`, so the exit flag is observed promptly. A read
/// failure, or no frame at all within `stale_after`, triggers a reconnect followed by
/// the failure cool-down.
pub async fn run(feed: Arc<FeedClient>) {
    let settings = feed.settings().clone();
    let mut last_frame = Instant::now();

    while !feed.is_exited() {
        let failure = match feed.connection().recv(settings.read_timeout).await {
            Ok(Some(text)) => {
                last_frame = Instant::now();
                if let Err(e) = handle_frame(&feed, &text).await {
                    error!(error = %e, "[FEED] error in processing message");
                }
                continue;
            }
            Ok(None) if last_frame.elapsed() < settings.stale_after => {
                tokio::task::yield_now().await;
                continue;
            }
            Ok(None) => format!("no frames for {:?}", last_frame.elapsed()),
            Err(e) => e.to_string(),
        };

        if feed.is_exited() {
            break;
        }
        warn!(reason = %failure, "[FEED] websocket connection lost");
        feed.reconnect().await;
        sleep(settings.failure_cooldown).await;
        last_frame = Instant::now();
    }
    info!("[FEED] dispatcher stopped");
}

/// Classify one frame and apply it. Heartbeats only refresh the watchdog.
pub async fn handle_frame(feed: &FeedClient, text: &str) -> Result<()> {
    match parse_frame(text, feed.channels())? {
        Frame::Heartbeat => feed.connection().record_heartbeat(),
        Frame::Orderbook { market, bids, asks } => {
            feed.cache().update(&market, bids, asks).await;
        }
        Frame::Notice(message) => info!(%message, "[FEED] server message"),
        Frame::Ignored(channel) => debug!(%channel, "[FEED] orderbook for unmapped market"),
        Frame::Unrecognized(raw) => warn!(%raw, "[FEED] received unrecognized message"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FeedSettings;
    use crate::errors::AppError;
    use crate::feed::client::tests::{client, client_with, test_settings};
    use crate::feed::transport::testing::FakeConnector;
    use std::time::Duration;

    fn book_frame(channel: &str, bid: i64, ask: i64) -> String {
        let data = serde_json::json!({"bids": [{"price": bid}], "asks": [{"price": ask}]});
        serde_json::json!({"channel": channel, "data": data.to_string()}).to_string()
    }

    async fn wait_until(mut cond: impl FnMut() -> bool) {
        for _ in 0..200 {
            if cond() {
                return;
            }
            sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test(start_paused = true)]
    async fn heartbeat_never_touches_books() {
        let connector = Arc::new(FakeConnector::default());
        let feed = client(&connector);
        feed.subscribe("perp", "SOL-PERP").await.unwrap();

        tokio::time::advance(Duration::from_secs(30)).await;
        let before = feed.connection().heartbeat_age();
        handle_frame(&feed, r#"{"channel":"heartbeat","data":"{}"}"#)
            .await
            .unwrap();

        assert!(feed.connection().heartbeat_age() < before);
        assert!(feed.orderbook("SOL-PERP").is_empty());
        assert_eq!(feed.history().latest("SOL-PERP").await.unwrap(), None);
    }

    #[tokio::test]
    async fn orderbook_frames_reach_cache_and_history() {
        let connector = Arc::new(FakeConnector::default());
        let feed = client(&connector);
        feed.subscribe("perp", "BTC-PERP").await.unwrap();

        handle_frame(&feed, &book_frame("orderbook_perp_1", 99_000_000, 101_000_000))
            .await
            .unwrap();

        let snap = feed.orderbook("BTC-PERP");
        assert_eq!(snap.bids, vec![99.0]);
        assert_eq!(snap.asks, vec![101.0]);
        let latest = feed.history().latest("BTC-PERP").await.unwrap().unwrap();
        assert_eq!(latest.price, 100.0);
    }

    #[tokio::test]
    async fn malformed_frame_is_an_error_but_harmless() {
        let connector = Arc::new(FakeConnector::default());
        let feed = client(&connector);
        assert!(handle_frame(&feed, "{oops").await.is_err());
        handle_frame(&feed, r#"{"message":"hello"}"#).await.unwrap();
        handle_frame(&feed, r#"{"something":"else"}"#).await.unwrap();
    }

    #[tokio::test]
    async fn loop_survives_read_failure_and_stops_on_exit() {
        let connector = Arc::new(FakeConnector::default());
        let feed = Arc::new(client(&connector));
        feed.open().await.unwrap();
        feed.subscribe("perp", "SOL-PERP").await.unwrap();

        connector.push_inbound(Ok(r#"{"channel":"heartbeat"}"#.into()));
        connector.push_inbound(Ok("garbage".into()));
        connector.push_inbound(Err(AppError::ConnectionClosed));
        connector.push_inbound(Ok(book_frame("orderbook_perp_0", 10_000_000, 12_000_000)));

        let handle = spawn_dispatcher(feed.clone());
        wait_until(|| !feed.orderbook("SOL-PERP").is_empty()).await;

        assert_eq!(feed.orderbook("SOL-PERP").bids, vec![10.0]);
        assert_eq!(connector.connects(), 2);
        assert_eq!(feed.connection().reconnect_cycles(), 1);

        feed.shutdown().await;
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("dispatcher should stop after shutdown")
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn silent_feed_is_treated_as_stale() {
        let connector = Arc::new(FakeConnector::default());
        let feed = Arc::new(client(&connector));
        feed.open().await.unwrap();
        feed.subscribe("perp", "SOL-PERP").await.unwrap();

        let handle = spawn_dispatcher(feed.clone());
        sleep(Duration::from_secs(29)).await;
        assert_eq!(feed.connection().reconnect_cycles(), 0);
        assert_eq!(connector.connects(), 1);

        sleep(Duration::from_secs(2)).await;
        assert_eq!(feed.connection().reconnect_cycles(), 1);
        assert_eq!(connector.connects(), 2);

        feed.shutdown().await;
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn no_reads_during_failure_cooldown() {
        let connector = Arc::new(FakeConnector::default());
        let settings = FeedSettings {
            failure_cooldown: Duration::from_secs(10),
            ..test_settings()
        };
        let feed = Arc::new(client_with(&connector, settings));
        feed.open().await.unwrap();
        feed.subscribe("perp", "SOL-PERP").await.unwrap();

        connector.push_inbound(Err(AppError::ConnectionClosed));
        connector.push_inbound(Ok(book_frame("orderbook_perp_0", 10_000_000, 12_000_000)));
        let handle = spawn_dispatcher(feed.clone());

        sleep(Duration::from_secs(5)).await;
        assert_eq!(feed.connection().reconnect_cycles(), 1);
        assert_eq!(connector.wire.lock().inbound.len(), 1);
        assert!(feed.orderbook("SOL-PERP").is_empty());

        sleep(Duration::from_secs(6)).await;
        assert!(connector.wire.lock().inbound.is_empty());
        assert_eq!(feed.orderbook("SOL-PERP").bids, vec![10.0]);

        feed.shutdown().await;
        handle.await.unwrap();
    }
}
