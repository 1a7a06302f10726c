use anyhow::Result;
use dlob_gateway::{
    api::{AppState, create_router},
    config::AppConfig,
    feed::{ChannelMap, FeedClient, WsConnector, spawn_dispatcher},
    history::PriceHistoryStore,
    utils,
};
use std::sync::Arc;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    utils::init_logging();

    let config = AppConfig::load()?;
    tracing::info!(
        ws_url = %config.ws_url,
        db_path = %config.db_path,
        markets = ?config.markets,
        "[INIT] dlob-gateway starting"
    );

    let history = Arc::new(PriceHistoryStore::open(&config.db_path).await?);
    let connector = Arc::new(WsConnector::new(&config.ws_url)?);
    let channels = ChannelMap::new(config.market_type.clone(), config.markets.clone());
    let feed = Arc::new(FeedClient::new(
        connector,
        history,
        channels,
        config.feed.clone(),
    ));

    // A failed first open is recovered by the dispatcher's reconnect path.
    if feed.open().await.is_ok() {
        tracing::info!("[INIT] upstream feed connected");
    }
    for market in &config.markets {
        feed.subscribe(&config.market_type, market).await?;
    }
    let dispatcher = spawn_dispatcher(feed.clone());

    let app = create_router(AppState::new(feed.clone()));
    let listener = TcpListener::bind(config.http_addr).await?;
    tracing::info!(addr = %config.http_addr, "[INIT] HTTP listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    feed.shutdown().await;
    dispatcher.abort();
    tracing::info!("[INIT] dlob-gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "[INIT] failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "[INIT] failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::warn!("[INIT] SIGINT or SIGTERM detected, shutting down");
}
