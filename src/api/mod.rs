//! HTTP query surface over the order-book cache and price history.

pub mod error;
pub mod handlers;

use crate::feed::FeedClient;
use axum::{Router, routing::get};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub use error::ApiError;

#[derive(Clone)]
pub struct AppState {
    pub feed: Arc<FeedClient>,
}

impl AppState {
    pub fn new(feed: Arc<FeedClient>) -> Self {
        Self { feed }
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/orderbook/:symbol", get(handlers::get_orderbook))
        .route("/price/:symbol", get(handlers::get_current_price))
        .route(
            "/price/:symbol/:interval/:limit",
            get(handlers::get_price_history),
        )
        .route("/health", get(handlers::health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::client::tests::client;
    use crate::feed::transport::testing::FakeConnector;
    use crate::models::PriceSample;
    use crate::utils::unix_now;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use serde_json::Value;
    use tower::ServiceExt;

    fn state() -> AppState {
        AppState::new(Arc::new(client(&Arc::new(FakeConnector::default()))))
    }

    async fn get(state: &AppState, uri: &str) -> (StatusCode, Value) {
        let resp = create_router(state.clone())
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn orderbook_requires_both_sides() {
        let state = state();
        state.feed.subscribe("perp", "SOL-PERP").await.unwrap();

        let (status, body) = get(&state, "/orderbook/SOL-PERP").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "NOT_FOUND");

        state
            .feed
            .cache()
            .update("SOL-PERP", vec![99.5, 99.0], vec![100.5])
            .await;
        let (status, body) = get(&state, "/orderbook/SOL-PERP").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["bids"], serde_json::json!([99.5, 99.0]));
        assert_eq!(body["asks"], serde_json::json!([100.5]));

        let (status, _) = get(&state, "/orderbook/UNKNOWN").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn current_price_is_latest_sample() {
        let state = state();
        let (status, _) = get(&state, "/price/BTC-PERP").await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        for (price, timestamp) in [(60_000.0, 1.0), (60_100.0, 2.0)] {
            let sample = PriceSample {
                symbol: "BTC-PERP".into(),
                price,
                timestamp,
            };
            state.feed.history().append(&sample).await.unwrap();
        }
        let (status, body) = get(&state, "/price/BTC-PERP").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["current_price"], 60_100.0);
    }

    #[tokio::test]
    async fn history_is_clamped_and_null_padded() {
        let state = state();
        let sample = PriceSample {
            symbol: "ETH-PERP".into(),
            price: 3_000.0,
            timestamp: unix_now() - 5.0,
        };
        state.feed.history().append(&sample).await.unwrap();

        let (status, body) = get(&state, "/price/ETH-PERP/60/500").await;
        assert_eq!(status, StatusCode::OK);
        let prices = body["prices"].as_array().unwrap();
        assert_eq!(prices.len(), 50);
        assert_eq!(prices.last().unwrap(), &serde_json::json!(3_000.0));
        assert!(prices[0].is_null());
    }

    #[tokio::test]
    async fn history_rejects_non_numeric_parameters() {
        let state = state();
        let (status, body) = get(&state, "/price/ETH-PERP/abc/10").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "BAD_REQUEST");
    }

    #[tokio::test]
    async fn health_reports_connection_state() {
        let state = state();
        state.feed.subscribe("perp", "SOL-PERP").await.unwrap();
        let (status, body) = get(&state, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["connection"], "disconnected");
        assert_eq!(body["subscriptions"], 1);
    }
}
