//! Upstream DLOB wire format.
//!
//! Outbound frames are subscribe/unsubscribe requests. Inbound frames are either
//! heartbeats, order-book updates whose `data` field is itself a JSON document, or
//! informational notices.

use crate::errors::{AppError, Result};
use crate::models::{MAX_DEPTH, Subscription};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Fixed-point scale of upstream prices.
pub const PRICE_PRECISION: f64 = 1_000_000.0;

pub const ORDERBOOK_CHANNEL: &str = "orderbook";
pub const HEARTBEAT_CHANNEL: &str = "heartbeat";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Subscribe,
    Unsubscribe,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct OutboundFrame<'a> {
    #[serde(rename = "type")]
    action: Action,
    market_type: &'a str,
    channel: &'static str,
    market: &'a str,
}

/// Render the request frame for `sub`.
pub fn encode_request(action: Action, sub: &Subscription) -> Result<String> {
    let frame = OutboundFrame {
        action,
        market_type: &sub.market_type,
        channel: ORDERBOOK_CHANNEL,
        market: &sub.market,
    };
    Ok(serde_json::to_string(&frame)?)
}

/// Classified inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Heartbeat,
    Orderbook {
        market: String,
        bids: Vec<f64>,
        asks: Vec<f64>,
    },
    /// A plain `message` field from the server.
    Notice(String),
    /// Order-book channel for a market we have no symbol for.
    Ignored(String),
    Unrecognized(Value),
}

#[derive(Debug, Deserialize)]
struct InboundFrame {
    channel: Option<String>,
    data: Option<Value>,
    message: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
struct BookPayload {
    #[serde(default)]
    bids: Vec<Level>,
    #[serde(default)]
    asks: Vec<Level>,
}

#[derive(Debug, Deserialize)]
struct Level {
    price: RawPrice,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawPrice {
    Number(f64),
    Text(String),
}

impl RawPrice {
    fn scaled(&self) -> Result<f64> {
        let raw = match self {
            RawPrice::Number(n) => *n,
            RawPrice::Text(s) => s.trim().parse::<f64>()?,
        };
        Ok(raw / PRICE_PRECISION)
    }
}

/// Maps upstream order-book channel names to configured symbols.
///
/// The i-th symbol owns the `<market_type>_<i>` channel segment, so with market type
/// `perp` the channel `orderbook_perp_1` resolves to the second symbol.
#[derive(Debug, Clone)]
pub struct ChannelMap {
    market_type: String,
    symbols: Vec<String>,
}

impl ChannelMap {
    pub fn new(market_type: impl Into<String>, symbols: Vec<String>) -> Self {
        Self {
            market_type: market_type.into(),
            symbols,
        }
    }

    /// Resolve a channel name to its symbol by whole `_`-separated tokens.
    pub fn resolve(&self, channel: &str) -> Option<&str> {
        let tokens: Vec<&str> = channel.split('_').collect();
        tokens.windows(2).find_map(|pair| {
            if pair[0] != self.market_type {
                return None;
            }
            let index: usize = pair[1].parse().ok()?;
            self.symbols.get(index).map(String::as_str)
        })
    }
}

/// Parse and classify one text frame.
pub fn parse_frame(text: &str, channels: &ChannelMap) -> Result<Frame> {
    let frame: InboundFrame = serde_json::from_str(text)?;

    match (frame.channel.as_deref(), frame.data) {
        (Some(HEARTBEAT_CHANNEL), _) => Ok(Frame::Heartbeat),
        (Some(channel), Some(data)) if channel.contains(ORDERBOOK_CHANNEL) => {
            let Some(market) = channels.resolve(channel) else {
                return Ok(Frame::Ignored(channel.to_string()));
            };
            let payload = decode_payload(data)?;
            Ok(Frame::Orderbook {
                market: market.to_string(),
                bids: top_levels(&payload.bids)?,
                asks: top_levels(&payload.asks)?,
            })
        }
        (channel, data) => match frame.message {
            Some(Value::String(msg)) => Ok(Frame::Notice(msg)),
            Some(other) => Ok(Frame::Notice(other.to_string())),
            None => {
                let mut raw = serde_json::Map::new();
                if let Some(c) = channel {
                    raw.insert("channel".into(), Value::String(c.to_string()));
                }
                if let Some(d) = data {
                    raw.insert("data".into(), d);
                }
                Ok(Frame::Unrecognized(Value::Object(raw)))
            }
        },
    }
}

fn decode_payload(data: Value) -> Result<BookPayload> {
    match data {
        Value::String(encoded) => Ok(serde_json::from_str(&encoded)?),
        obj @ Value::Object(_) => Ok(serde_json::from_value(obj)?),
        other => Err(AppError::Protocol(format!(
            "orderbook payload is neither string nor object: {other}"
        ))),
    }
}

fn top_levels(levels: &[Level]) -> Result<Vec<f64>> {
    levels.iter().take(MAX_DEPTH).map(|l| l.price.scaled()).collect()
}
