//! Upstream DLOB feed.
//!
//! Responsibilities:
//! • Maintain the websocket connection to the DLOB server and reconnect on failure.
//! • Keep the set of desired subscriptions and replay it after every reconnect.
//! • Route order-book frames into the cache; swallow heartbeats.

pub mod client;
pub mod connection;
pub mod dispatcher;
pub mod protocol;
pub mod subscriptions;
pub mod transport;

pub use client::FeedClient;
pub use connection::ConnectionManager;
pub use dispatcher::spawn_dispatcher;
pub use protocol::{ChannelMap, PRICE_PRECISION};
pub use subscriptions::SubscriptionRegistry;
pub use transport::{Connector, FeedSocket, WsConnector};
