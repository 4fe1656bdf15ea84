//! Tests for [`ConnectionManager`]: bounded connect retry, receive loop,
//! reconnect and shutdown, against an in-memory transport.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use gowon_markov::router::MessageHandler;
use gowon_markov::transport::{ConnectionConfig, ConnectionManager, ConnectionState, Transport};
use gowon_markov::{MarkovError, Result};

// ============================================================================
// Mock transport
// ============================================================================

#[derive(Default)]
struct FakeState {
    connect_failures: u32,
    connect_calls: u32,
    subscriptions: Vec<String>,
    inbox: VecDeque<Result<Vec<u8>>>,
    published: Vec<(String, Vec<u8>)>,
    disconnects: u32,
}

/// Transport whose behaviour is scripted through shared state.
#[derive(Clone, Default)]
struct FakeTransport {
    state: Arc<Mutex<FakeState>>,
}

impl FakeTransport {
    fn failing(connect_failures: u32) -> Self {
        let transport = Self::default();
        transport.state.lock().unwrap().connect_failures = connect_failures;
        transport
    }

    fn push(&self, item: Result<Vec<u8>>) {
        self.state.lock().unwrap().inbox.push_back(item);
    }

    fn connect_calls(&self) -> u32 {
        self.state.lock().unwrap().connect_calls
    }

    fn subscriptions(&self) -> Vec<String> {
        self.state.lock().unwrap().subscriptions.clone()
    }

    fn published(&self) -> Vec<(String, Vec<u8>)> {
        self.state.lock().unwrap().published.clone()
    }

    fn disconnects(&self) -> u32 {
        self.state.lock().unwrap().disconnects
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn connect(&mut self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.connect_calls += 1;
        if state.connect_failures > 0 {
            state.connect_failures -= 1;
            return Err(MarkovError::Transport("connection refused".into()));
        }
        Ok(())
    }

    async fn subscribe(&mut self, topic: &str) -> Result<()> {
        self.state.lock().unwrap().subscriptions.push(topic.to_owned());
        Ok(())
    }

    async fn publish(&mut self, topic: &str, payload: Vec<u8>) -> Result<()> {
        self.state
            .lock()
            .unwrap()
            .published
            .push((topic.to_owned(), payload));
        Ok(())
    }

    async fn recv(&mut self) -> Result<Vec<u8>> {
        let next = self.state.lock().unwrap().inbox.pop_front();
        match next {
            Some(item) => item,
            // Nothing scripted: behave like an idle broker.
            None => std::future::pending().await,
        }
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.state.lock().unwrap().disconnects += 1;
        Ok(())
    }
}

/// Replies with the payload upper-cased; payloads starting with `!` get
/// no reply.
struct ShoutHandler;

#[async_trait]
impl MessageHandler for ShoutHandler {
    async fn handle(&self, payload: &[u8]) -> Option<Vec<u8>> {
        if payload.starts_with(b"!") {
            return None;
        }
        Some(payload.to_ascii_uppercase())
    }
}

fn config(max_attempts: u32) -> ConnectionConfig {
    ConnectionConfig::new()
        .max_attempts(max_attempts)
        .retry_delay(Duration::from_secs(5))
}

fn shutdown_after(secs: u64) -> impl std::future::Future<Output = ()> {
    tokio::time::sleep(Duration::from_secs(secs))
}

// ============================================================================
// Connect sequence
// ============================================================================

#[tokio::test(start_paused = true)]
async fn connects_after_transient_failures() {
    let transport = FakeTransport::failing(3);
    let mut manager = ConnectionManager::new(transport.clone(), ShoutHandler, config(12));
    assert_eq!(manager.state(), ConnectionState::Disconnected);

    manager.connect().await.unwrap();

    assert_eq!(transport.connect_calls(), 4); // 3 failures + 1 success
    assert_eq!(manager.state(), ConnectionState::Connected);
    assert_eq!(transport.subscriptions(), vec!["/gowon/input".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn waits_fixed_delay_between_attempts() {
    let transport = FakeTransport::failing(2);
    let mut manager = ConnectionManager::new(transport.clone(), ShoutHandler, config(12));

    let start = tokio::time::Instant::now();
    manager.connect().await.unwrap();

    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_secs(10), "elapsed {elapsed:?}");
    assert!(elapsed < Duration::from_secs(11), "elapsed {elapsed:?}");
}

#[tokio::test(start_paused = true)]
async fn gives_up_after_max_attempts() {
    let transport = FakeTransport::failing(100);
    let mut manager = ConnectionManager::new(transport.clone(), ShoutHandler, config(5));

    let err = manager.connect().await.unwrap_err();

    assert!(matches!(err, MarkovError::Connect { attempts: 5, .. }));
    assert!(err.is_fatal());
    assert_eq!(transport.connect_calls(), 5);
    assert_eq!(manager.state(), ConnectionState::Disconnected);
    assert!(transport.subscriptions().is_empty());
}

#[tokio::test(start_paused = true)]
async fn run_fails_when_broker_never_comes_up() {
    let transport = FakeTransport::failing(100);
    let mut manager = ConnectionManager::new(transport.clone(), ShoutHandler, config(3));

    let result = manager.run(std::future::pending()).await;

    assert!(matches!(result, Err(MarkovError::Connect { .. })));
    assert_eq!(transport.connect_calls(), 3);
}

// ============================================================================
// Receive loop
// ============================================================================

#[tokio::test(start_paused = true)]
async fn replies_in_request_order() {
    let transport = FakeTransport::default();
    transport.push(Ok(b"first".to_vec()));
    transport.push(Ok(b"!ignored".to_vec()));
    transport.push(Ok(b"second".to_vec()));
    let mut manager = ConnectionManager::new(transport.clone(), ShoutHandler, config(12));

    manager.run(shutdown_after(1)).await.unwrap();

    let published = transport.published();
    assert_eq!(published.len(), 2);
    assert_eq!(published[0], ("/gowon/output".to_string(), b"FIRST".to_vec()));
    assert_eq!(published[1], ("/gowon/output".to_string(), b"SECOND".to_vec()));
}

#[tokio::test(start_paused = true)]
async fn reconnects_after_transport_error() {
    let transport = FakeTransport::default();
    transport.push(Ok(b"before".to_vec()));
    transport.push(Err(MarkovError::Transport("connection reset".into())));
    transport.push(Ok(b"after".to_vec()));
    let mut manager = ConnectionManager::new(transport.clone(), ShoutHandler, config(12));

    manager.run(shutdown_after(1)).await.unwrap();

    assert_eq!(transport.connect_calls(), 2);
    assert_eq!(transport.subscriptions().len(), 2);
    let replies: Vec<Vec<u8>> = transport.published().into_iter().map(|(_, p)| p).collect();
    assert_eq!(replies, vec![b"BEFORE".to_vec(), b"AFTER".to_vec()]);
}

#[tokio::test(start_paused = true)]
async fn shutdown_closes_connection() {
    let transport = FakeTransport::default();
    let mut manager = ConnectionManager::new(transport.clone(), ShoutHandler, config(12));
    let mut states = manager.watch_state();

    manager.run(shutdown_after(1)).await.unwrap();

    assert_eq!(manager.state(), ConnectionState::ShutDown);
    assert_eq!(*states.borrow_and_update(), ConnectionState::ShutDown);
    assert_eq!(transport.disconnects(), 1);
}

#[tokio::test(start_paused = true)]
async fn shutdown_interrupts_connect_retries() {
    let transport = FakeTransport::failing(100);
    let mut manager = ConnectionManager::new(transport.clone(), ShoutHandler, config(12));

    // Attempts at t=0 and t=5, then shutdown at t=7.
    manager.run(shutdown_after(7)).await.unwrap();

    assert_eq!(transport.connect_calls(), 2);
    assert_eq!(manager.state(), ConnectionState::ShutDown);
}
