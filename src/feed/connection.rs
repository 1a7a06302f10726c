//! Upstream connection lifecycle.
//!
//! Responsibilities:
//! • Own the socket and its `ConnectionState`.
//! • Track the last heartbeat for the liveness fast-path.
//! • Run at most one reconnect cycle at a time and replay subscriptions after it.

use crate::config::FeedSettings;
use crate::errors::{AppError, Result};
use crate::feed::protocol::{Action, encode_request};
use crate::feed::subscriptions::SubscriptionRegistry;
use crate::feed::transport::{Connector, FeedSocket};
use crate::models::ConnectionState;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::{Instant, sleep, timeout};
use tracing::{debug, error, info, warn};

pub struct ConnectionManager {
    connector: Arc<dyn Connector>,
    settings: FeedSettings,
    socket: tokio::sync::Mutex<Option<Box<dyn FeedSocket>>>,
    state: Mutex<ConnectionState>,
    last_heartbeat: Mutex<Instant>,
    last_fast_path_log: Mutex<Option<Instant>>,
    reconnect_lock: tokio::sync::Mutex<()>,
    cycles: AtomicU64,
}

impl ConnectionManager {
    pub fn new(connector: Arc<dyn Connector>, settings: FeedSettings) -> Self {
        Self {
            connector,
            settings,
            socket: tokio::sync::Mutex::new(None),
            state: Mutex::new(ConnectionState::Disconnected),
            last_heartbeat: Mutex::new(Instant::now()),
            last_fast_path_log: Mutex::new(None),
            reconnect_lock: tokio::sync::Mutex::new(()),
            cycles: AtomicU64::new(0),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    /// Number of reconnect cycles that went past the fast-path.
    pub fn reconnect_cycles(&self) -> u64 {
        self.cycles.load(Ordering::SeqCst)
    }

    pub fn record_heartbeat(&self) {
        *self.last_heartbeat.lock() = Instant::now();
    }

    pub fn heartbeat_age(&self) -> Duration {
        self.last_heartbeat.lock().elapsed()
    }

    /// Open the upstream socket once. On failure the error is logged and returned after
    /// the open cool-down has elapsed; retrying is up to the caller.
    pub async fn open(&self) -> Result<()> {
        if self.state() == ConnectionState::Closed {
            return Err(AppError::NotConnected);
        }
        self.transition(ConnectionState::Connecting);
        match self.establish().await {
            Ok(()) => {
                self.transition(ConnectionState::Connected);
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "[CONN] failed to open upstream socket");
                self.transition(ConnectionState::Disconnected);
                sleep(self.settings.open_cooldown).await;
                Err(e)
            }
        }
    }

    /// Best-effort close. The connection is no longer `Connected` afterwards even if
    /// the close handshake itself failed.
    pub async fn close(&self) {
        self.drop_socket().await;
        self.transition(ConnectionState::Disconnected);
    }

    /// Enter the terminal `Closed` state and release the socket.
    pub async fn shutdown(&self) {
        *self.state.lock() = ConnectionState::Closed;
        self.drop_socket().await;
        info!("[CONN] connection shut down");
    }

    /// Run one reconnect cycle. Returns `true` once the socket is live and every
    /// registered subscription has been replayed.
    ///
    /// Concurrent callers queue on a lock; whoever comes second usually finds a fresh
    /// connection and returns immediately. Exhausting `max_attempts` ends the cycle
    /// quietly in `Disconnected`; the next failure signal starts a new one.
    pub async fn reconnect(
        &self,
        max_attempts: u32,
        delay: Duration,
        subscriptions: &SubscriptionRegistry,
    ) -> bool {
        let _guard = self.reconnect_lock.lock().await;

        match self.state() {
            ConnectionState::Closed => return false,
            ConnectionState::Connected
                if self.heartbeat_age() < self.settings.heartbeat_fresh_for =>
            {
                self.log_fast_path();
                return true;
            }
            _ => {}
        }

        self.cycles.fetch_add(1, Ordering::SeqCst);
        warn!("[CONN] start to reconnect");
        self.transition(ConnectionState::Reconnecting);

        for attempt in 1..=max_attempts {
            if self.state() == ConnectionState::Closed {
                return false;
            }
            self.drop_socket().await;
            match self.reopen_and_replay(subscriptions).await {
                Ok(replayed) => {
                    self.transition(ConnectionState::Connected);
                    info!(attempt, replayed, "[CONN] reconnected to upstream feed");
                    return true;
                }
                Err(e) => error!(attempt, error = %e, "[CONN] reconnect attempt failed"),
            }
            if attempt < max_attempts {
                warn!(delay_secs = delay.as_secs_f64(), "[CONN] waiting before next attempt");
                sleep(delay).await;
            }
        }

        error!(max_attempts, "[CONN] failed to reconnect after multiple attempts");
        self.transition(ConnectionState::Disconnected);
        false
    }

    /// Send one text frame on the current socket.
    pub async fn send(&self, text: String) -> Result<()> {
        let mut guard = self.socket.lock().await;
        let socket = guard.as_mut().ok_or(AppError::NotConnected)?;
        socket.send_text(text).await
    }

    /// Bounded-wait receive. `Ok(None)` means nothing arrived within `wait`.
    pub async fn recv(&self, wait: Duration) -> Result<Option<String>> {
        let mut guard = self.socket.lock().await;
        let socket = guard.as_mut().ok_or(AppError::NotConnected)?;
        match timeout(wait, socket.next_text()).await {
            Ok(Ok(text)) => Ok(Some(text)),
            Ok(Err(e)) => Err(e),
            Err(_) => Ok(None),
        }
    }

    async fn establish(&self) -> Result<()> {
        info!("[CONN] opening upstream socket");
        let mut socket = self.connector.connect().await?;
        {
            // Checked under the socket lock: `shutdown` marks `Closed` before it takes
            // the socket, so a late handshake can never outlive it.
            let mut slot = self.socket.lock().await;
            if self.state() == ConnectionState::Closed {
                drop(slot);
                if let Err(e) = socket.close().await {
                    warn!(error = %e, "[CONN] error while closing late socket");
                }
                return Err(AppError::NotConnected);
            }
            *slot = Some(socket);
        }
        // A completed handshake counts as proof of life.
        self.record_heartbeat();
        info!("[CONN] connected to upstream feed");
        sleep(self.settings.settle_delay).await;
        Ok(())
    }

    async fn reopen_and_replay(&self, subscriptions: &SubscriptionRegistry) -> Result<usize> {
        self.establish().await?;
        let subs = subscriptions.all();
        for sub in &subs {
            self.send(encode_request(Action::Subscribe, sub)?).await?;
            debug!(market = %sub.market, "[CONN] subscription replayed");
        }
        Ok(subs.len())
    }

    async fn drop_socket(&self) {
        let socket = self.socket.lock().await.take();
        if let Some(mut socket) = socket {
            info!("[CONN] closing upstream socket");
            if let Err(e) = socket.close().await {
                warn!(error = %e, "[CONN] error while closing socket");
            }
        }
    }

    fn transition(&self, to: ConnectionState) {
        let mut state = self.state.lock();
        if *state == ConnectionState::Closed || *state == to {
            return;
        }
        debug!(from = ?*state, to = ?to, "[CONN] state change");
        *state = to;
    }

    /// Returns whether the line was emitted.
    fn log_fast_path(&self) -> bool {
        let mut last = self.last_fast_path_log.lock();
        let due = last.is_none_or(|t| t.elapsed() > self.settings.fast_path_log_every);
        if due {
            *last = Some(Instant::now());
            info!("[CONN] already connected, no need to reconnect");
        }
        due
    }
}
