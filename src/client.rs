//! Thin async client for the gateway's own HTTP surface.

use crate::errors::Result;
use crate::models::OrderbookSnapshot;
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct DlobHttpClient {
    http: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct CurrentPrice {
    current_price: f64,
}

#[derive(Debug, Deserialize)]
struct PriceSeries {
    prices: Vec<Option<f64>>,
}

impl DlobHttpClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub async fn orderbook(&self, symbol: &str) -> Result<Option<OrderbookSnapshot>> {
        self.get_json(&format!("/orderbook/{symbol}")).await
    }

    pub async fn current_price(&self, symbol: &str) -> Result<Option<f64>> {
        let body: Option<CurrentPrice> = self.get_json(&format!("/price/{symbol}")).await?;
        Ok(body.map(|b| b.current_price))
    }

    pub async fn price_history(
        &self,
        symbol: &str,
        interval: u64,
        limit: usize,
    ) -> Result<Option<Vec<Option<f64>>>> {
        let path = format!("/price/{symbol}/{interval}/{limit}");
        let body: Option<PriceSeries> = self.get_json(&path).await?;
        Ok(body.map(|b| b.prices))
    }

    /// Non-2xx responses are logged and reported as `None`.
    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self.http.get(&url).send().await?;
        if !resp.status().is_success() {
            warn!(%url, status = %resp.status(), "[CLIENT] request failed");
            return Ok(None);
        }
        Ok(Some(resp.json().await?))
    }
}

/// Fill gaps in a bucket series: each missing bucket takes the next present price
/// after it. Trailing gaps have nothing to borrow from and are dropped.
pub fn fill_gaps(prices: &[Option<f64>]) -> Vec<f64> {
    let mut filled = Vec::with_capacity(prices.len());
    let mut pending = 0;
    for price in prices {
        match price {
            Some(p) => {
                filled.extend(std::iter::repeat_n(*p, pending + 1));
                pending = 0;
            }
            None => pending += 1,
        }
    }
    filled
}
