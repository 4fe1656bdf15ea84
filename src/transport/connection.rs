//! Connection lifecycle: bounded-retry connect, receive loop, reconnect.
//!
//! ```text
//! Disconnected -> Connecting -> Connected
//!      ^              |             |
//!      +-- exhausted -+   transport error -> Connecting ...
//! ```
//!
//! `ShutDown` is entered only through [`ConnectionManager::run`]'s
//! shutdown future. Requests are handled one at a time, so replies on a
//! session leave in the order their requests arrived. A request being
//! handled when the session fails is dropped, not retried.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::Transport;
use crate::router::MessageHandler;
use crate::telemetry;
use crate::{MarkovError, Result};

/// Default number of connect attempts before giving up.
pub const DEFAULT_CONNECT_ATTEMPTS: u32 = 12;

/// Default pause between connect attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Default topic requests arrive on.
pub const DEFAULT_INPUT_TOPIC: &str = "/gowon/input";

/// Default topic replies are published to.
pub const DEFAULT_OUTPUT_TOPIC: &str = "/gowon/output";

/// Connection behaviour.
///
/// ```rust
/// # use gowon_markov::transport::ConnectionConfig;
/// # use std::time::Duration;
/// let config = ConnectionConfig::new()
///     .max_attempts(3)
///     .retry_delay(Duration::from_secs(1));
/// ```
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Topic to subscribe to. Default: `/gowon/input`.
    pub input_topic: String,
    /// Topic to publish replies to. Default: `/gowon/output`.
    pub output_topic: String,
    /// Connect attempts per connect sequence, including the first.
    /// Values below 1 are treated as 1. Default: 12.
    pub max_attempts: u32,
    /// Fixed pause between attempts. Default: 5s.
    pub retry_delay: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            input_topic: DEFAULT_INPUT_TOPIC.to_owned(),
            output_topic: DEFAULT_OUTPUT_TOPIC.to_owned(),
            max_attempts: DEFAULT_CONNECT_ATTEMPTS,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl ConnectionConfig {
    /// Create a new config with the defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the inbound topic.
    pub fn input_topic(mut self, topic: impl Into<String>) -> Self {
        self.input_topic = topic.into();
        self
    }

    /// Set the outbound topic.
    pub fn output_topic(mut self, topic: impl Into<String>) -> Self {
        self.output_topic = topic.into();
        self
    }

    /// Set the attempts per connect sequence.
    pub fn max_attempts(mut self, n: u32) -> Self {
        self.max_attempts = n;
        self
    }

    /// Set the pause between attempts.
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }
}

/// Where the manager is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    ShutDown,
}

/// Owns a [`Transport`] and drives requests through a [`MessageHandler`].
pub struct ConnectionManager<T, H> {
    transport: T,
    handler: H,
    config: ConnectionConfig,
    state: watch::Sender<ConnectionState>,
}

impl<T: Transport, H: MessageHandler> ConnectionManager<T, H> {
    pub fn new(transport: T, handler: H, config: ConnectionConfig) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            transport,
            handler,
            config,
            state,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Observe state changes.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Connect and subscribe, retrying with a fixed delay.
    ///
    /// Makes at most `max_attempts` attempts. Exhausting them leaves the
    /// manager `Disconnected` and returns [`MarkovError::Connect`].
    pub async fn connect(&mut self) -> Result<()> {
        let max_attempts = self.config.max_attempts.max(1);
        self.set_state(ConnectionState::Connecting);

        let mut last_err = None;
        for attempt in 1..=max_attempts {
            metrics::counter!(telemetry::CONNECT_ATTEMPTS_TOTAL).increment(1);
            match self.try_connect().await {
                Ok(()) => {
                    info!(attempt, topic = %self.config.input_topic, "connected to broker");
                    self.set_state(ConnectionState::Connected);
                    return Ok(());
                }
                Err(e) => {
                    if attempt < max_attempts {
                        warn!(
                            attempt,
                            max_attempts,
                            delay_ms = self.config.retry_delay.as_millis() as u64,
                            error = %e,
                            "connect failed, retrying"
                        );
                        tokio::time::sleep(self.config.retry_delay).await;
                    }
                    last_err = Some(e);
                }
            }
        }

        self.set_state(ConnectionState::Disconnected);
        let reason = last_err.map(|e| e.to_string()).unwrap_or_default();
        error!(attempts = max_attempts, %reason, "giving up on broker");
        Err(MarkovError::Connect {
            attempts: max_attempts,
            reason,
        })
    }

    /// Serve until `shutdown` resolves or a connect sequence is exhausted.
    ///
    /// Transport errors while serving lead back to [`connect`](Self::connect).
    /// On shutdown the session is closed and the state becomes `ShutDown`.
    pub async fn run<F>(&mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            let connected = tokio::select! {
                _ = &mut shutdown => None,
                result = self.connect() => Some(result),
            };
            match connected {
                Some(result) => result?,
                None => {
                    self.close().await;
                    return Ok(());
                }
            }

            let failure = tokio::select! {
                _ = &mut shutdown => None,
                err = self.serve() => Some(err),
            };
            match failure {
                Some(e) => {
                    metrics::counter!(telemetry::RECONNECTS_TOTAL).increment(1);
                    warn!(error = %e, "lost broker connection, reconnecting");
                    self.set_state(ConnectionState::Disconnected);
                }
                None => {
                    self.close().await;
                    return Ok(());
                }
            }
        }
    }

    async fn try_connect(&mut self) -> Result<()> {
        self.transport.connect().await?;
        self.transport.subscribe(&self.config.input_topic).await
    }

    /// Receive loop; only returns on a transport error.
    async fn serve(&mut self) -> MarkovError {
        loop {
            let payload = match self.transport.recv().await {
                Ok(payload) => payload,
                Err(e) => return e,
            };

            let Some(reply) = self.handler.handle(&payload).await else {
                continue;
            };

            // Replies are fire-and-forget; a dead session shows up on recv.
            if let Err(e) = self
                .transport
                .publish(&self.config.output_topic, reply)
                .await
            {
                warn!(error = %e, topic = %self.config.output_topic, "could not publish reply");
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.transport.disconnect().await {
            debug!(error = %e, "disconnect failed");
        }
        self.set_state(ConnectionState::ShutDown);
        info!("connection closed");
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!(from = ?previous, to = ?state, "connection state changed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_config_defaults() {
        let config = ConnectionConfig::default();
        assert_eq!(config.input_topic, "/gowon/input");
        assert_eq!(config.output_topic, "/gowon/output");
        assert_eq!(config.max_attempts, 12);
        assert_eq!(config.retry_delay, Duration::from_secs(5));
    }
}
