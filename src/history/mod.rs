pub mod query;
pub mod store;

pub use query::{HistoryQuery, price_history};
pub use store::PriceHistoryStore;
