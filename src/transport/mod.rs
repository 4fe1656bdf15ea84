//! Broker transport and the connection lifecycle around it.
//!
//! [`Transport`] is the narrow seam over a publish/subscribe client;
//! [`ConnectionManager`] owns one, keeps it connected and feeds every
//! inbound payload to a [`MessageHandler`](crate::router::MessageHandler).

pub mod connection;
#[cfg(feature = "mqtt")]
pub mod mqtt;

pub use connection::{ConnectionConfig, ConnectionManager, ConnectionState};
#[cfg(feature = "mqtt")]
pub use mqtt::MqttTransport;

use async_trait::async_trait;

use crate::Result;

/// A publish/subscribe session with a broker.
///
/// `connect` may be called again after any error to start a fresh
/// session; subscriptions do not survive it.
#[async_trait]
pub trait Transport: Send {
    /// Open a session. Fails with [`MarkovError::Transport`](crate::MarkovError::Transport)
    /// when the broker cannot be reached or refuses the session.
    async fn connect(&mut self) -> Result<()>;

    /// Subscribe the current session to `topic`.
    async fn subscribe(&mut self, topic: &str) -> Result<()>;

    /// Publish `payload` to `topic`, at most once.
    async fn publish(&mut self, topic: &str, payload: Vec<u8>) -> Result<()>;

    /// Wait for the next inbound payload.
    async fn recv(&mut self) -> Result<Vec<u8>>;

    /// Close the session, best effort.
    async fn disconnect(&mut self) -> Result<()>;
}
