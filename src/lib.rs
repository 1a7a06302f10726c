//! Core library for the dlob-gateway service.
//!
//! Ingests the DLOB order-book websocket feed, keeps the best of book per market,
//! records mid-prices in SQLite and serves both over HTTP.

pub mod api;
pub mod book;
pub mod client;
pub mod config;
pub mod errors;
pub mod feed;
pub mod history;
pub mod models;
pub mod utils;
