use super::{AppState, error::ApiError};
use crate::history::{HistoryQuery, price_history};
use crate::models::{ConnectionState, OrderbookSnapshot};
use crate::utils::unix_now;
use axum::{
    Json,
    extract::{Path, State},
};
use serde::Serialize;

pub async fn get_orderbook(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> Result<Json<OrderbookSnapshot>, ApiError> {
    let book = state.feed.orderbook(&symbol);
    // A book is only useful with both sides quoted.
    if book.bids.is_empty() || book.asks.is_empty() {
        return Err(ApiError::no_data());
    }
    Ok(Json(book))
}

#[derive(Debug, Serialize)]
pub struct CurrentPrice {
    pub current_price: f64,
}

pub async fn get_current_price(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> Result<Json<CurrentPrice>, ApiError> {
    let latest = state.feed.history().latest(&symbol).await?;
    let sample = latest.ok_or_else(ApiError::no_data)?;
    Ok(Json(CurrentPrice {
        current_price: sample.price,
    }))
}

#[derive(Debug, Serialize)]
pub struct PriceSeries {
    /// Oldest first; `null` marks a bucket without any sample.
    pub prices: Vec<Option<f64>>,
}

pub async fn get_price_history(
    State(state): State<AppState>,
    Path((symbol, interval, limit)): Path<(String, String, String)>,
) -> Result<Json<PriceSeries>, ApiError> {
    let interval: u64 = interval
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("invalid interval {interval:?}")))?;
    let limit: usize = limit
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("invalid limit {limit:?}")))?;

    let query = HistoryQuery::new(interval, limit);
    let buckets = price_history(state.feed.history(), &symbol, query, unix_now()).await?;
    Ok(Json(PriceSeries {
        prices: buckets.into_iter().map(|b| b.price).collect(),
    }))
}

#[derive(Debug, Serialize)]
pub struct Health {
    pub connection: ConnectionState,
    pub subscriptions: usize,
    pub heartbeat_age_secs: f64,
}

pub async fn health(State(state): State<AppState>) -> Json<Health> {
    let conn = state.feed.connection();
    Json(Health {
        connection: conn.state(),
        subscriptions: state.feed.subscriptions().len(),
        heartbeat_age_secs: conn.heartbeat_age().as_secs_f64(),
    })
}
