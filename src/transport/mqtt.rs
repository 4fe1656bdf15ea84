//! MQTT transport over `rumqttc`.
//!
//! Every [`connect`](Transport::connect) builds a fresh client and event
//! loop, so a failed session is never reused. All traffic is QoS 0.

use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Packet, QoS};
use tracing::debug;

use super::Transport;
use crate::{MarkovError, Result};

/// Capacity of the request channel between client and event loop.
const REQUEST_CAPACITY: usize = 16;

/// How long a disconnect waits for the DISCONNECT packet to go out.
const DISCONNECT_TIMEOUT: Duration = Duration::from_secs(1);

/// Default keep-alive interval.
pub const DEFAULT_KEEP_ALIVE: Duration = Duration::from_secs(30);

struct Session {
    client: AsyncClient,
    eventloop: EventLoop,
}

/// [`Transport`] implementation for an MQTT broker.
pub struct MqttTransport {
    options: MqttOptions,
    session: Option<Session>,
}

impl MqttTransport {
    /// Create a transport for `host:port` with the default keep-alive.
    pub fn new(client_id: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        let mut options = MqttOptions::new(client_id, host, port);
        options.set_keep_alive(DEFAULT_KEEP_ALIVE);
        Self::with_options(options)
    }

    /// Create a transport from fully specified options.
    pub fn with_options(options: MqttOptions) -> Self {
        Self {
            options,
            session: None,
        }
    }

    /// Set the keep-alive interval for future sessions.
    pub fn keep_alive(mut self, interval: Duration) -> Self {
        self.options.set_keep_alive(interval);
        self
    }

    /// Whether a session is open.
    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    fn session(&mut self) -> Result<&mut Session> {
        self.session
            .as_mut()
            .ok_or_else(|| MarkovError::Transport("not connected".into()))
    }
}

#[async_trait]
impl Transport for MqttTransport {
    async fn connect(&mut self) -> Result<()> {
        self.session = None;
        let (client, mut eventloop) = AsyncClient::new(self.options.clone(), REQUEST_CAPACITY);

        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                    if ack.code != ConnectReturnCode::Success {
                        return Err(MarkovError::Transport(format!(
                            "broker refused connection: {:?}",
                            ack.code
                        )));
                    }
                    break;
                }
                Ok(event) => debug!(?event, "event before connack"),
                Err(e) => return Err(MarkovError::Transport(e.to_string())),
            }
        }

        self.session = Some(Session { client, eventloop });
        Ok(())
    }

    async fn subscribe(&mut self, topic: &str) -> Result<()> {
        let session = self.session()?;
        session
            .client
            .subscribe(topic, QoS::AtMostOnce)
            .await
            .map_err(|e| MarkovError::Transport(e.to_string()))
    }

    async fn publish(&mut self, topic: &str, payload: Vec<u8>) -> Result<()> {
        let session = self.session()?;
        session
            .client
            .try_publish(topic, QoS::AtMostOnce, false, payload)
            .map_err(|e| MarkovError::Transport(e.to_string()))
    }

    async fn recv(&mut self) -> Result<Vec<u8>> {
        loop {
            let session = self.session()?;
            match session.eventloop.poll().await {
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    return Ok(publish.payload.to_vec());
                }
                Ok(_) => {}
                Err(e) => {
                    self.session = None;
                    return Err(MarkovError::Transport(e.to_string()));
                }
            }
        }
    }

    async fn disconnect(&mut self) -> Result<()> {
        let Some(mut session) = self.session.take() else {
            return Ok(());
        };
        session
            .client
            .try_disconnect()
            .map_err(|e| MarkovError::Transport(e.to_string()))?;
        // The DISCONNECT packet is only written while the loop is polled.
        let _ = tokio::time::timeout(DISCONNECT_TIMEOUT, session.eventloop.poll()).await;
        Ok(())
    }
}
