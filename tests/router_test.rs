//! Tests for [`Router`]: command matching, fallback roll, reply shape.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use gowon_markov::router::{MessageHandler, Router, RouterConfig};
use gowon_markov::types::MODULE_NAME;
use gowon_markov::{
    CacheConfig, MarkovError, ModelCache, ModelLoader, Request, Response, Result, SentenceModel,
};

// ============================================================================
// Mock models
// ============================================================================

/// Says the name of the file it was loaded from; files named `mute*`
/// never produce a sentence.
struct NamedModel {
    name: String,
}

impl SentenceModel for NamedModel {
    fn generate_sentence(&self, _max_attempts: usize) -> Option<String> {
        if self.name.starts_with("mute") {
            None
        } else {
            Some(format!("hello from {}", self.name))
        }
    }
}

#[derive(Default)]
struct NamedLoader {
    calls: AtomicUsize,
}

impl ModelLoader for NamedLoader {
    type Model = NamedModel;

    fn load(&self, path: &Path) -> Result<NamedModel> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_owned();
        if name.starts_with("missing") {
            return Err(MarkovError::Load {
                path: path.to_path_buf(),
                reason: "no such file".into(),
            });
        }
        Ok(NamedModel { name })
    }
}

fn router(bindings: &[(&str, &str)], config: RouterConfig) -> Router<NamedLoader> {
    let mut cache = ModelCache::new(NamedLoader::default(), CacheConfig::new().max_entries(8));
    for (command, path) in bindings {
        cache.add_binding(*command, *path).unwrap();
    }
    Router::new(Arc::new(cache), config)
}

fn command_request(command: &str) -> Request {
    Request::new("alice", "#chan")
        .command(command)
        .args(["one", "two"])
}

// ============================================================================
// Command matches
// ============================================================================

#[tokio::test]
async fn matched_command_echoes_request_fields() {
    let router = router(&[("quote", "quotes.txt")], RouterConfig::default());
    let request = command_request("quote");

    let response = router.route(&request).await.expect("expected a reply");

    assert_eq!(response.module, MODULE_NAME);
    assert_eq!(response.msg.as_deref(), Some("hello from quotes"));
    assert_eq!(response.nick, request.nick);
    assert_eq!(response.dest, request.dest);
    assert_eq!(response.command, request.command);
    assert_eq!(response.args, request.args);
}

#[tokio::test]
async fn unknown_command_without_fallback_is_dropped() {
    let router = router(&[("quote", "quotes.txt")], RouterConfig::default());

    assert!(router.route(&command_request("nope")).await.is_none());
    assert_eq!(router.cache().loader().calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn plain_message_without_fallback_is_dropped() {
    let router = router(
        &[("quote", "quotes.txt")],
        RouterConfig::new().msg_chance(1.0),
    );

    assert!(router.route(&Request::new("alice", "#chan")).await.is_none());
}

#[tokio::test]
async fn load_failure_drops_reply() {
    let router = router(&[("gone", "missing.txt")], RouterConfig::default());

    assert!(router.route(&command_request("gone")).await.is_none());
    // The failure is not cached; the next request loads again.
    assert!(router.route(&command_request("gone")).await.is_none());
    assert_eq!(router.cache().loader().calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn missing_sentence_still_replies() {
    let router = router(&[("shh", "mute.txt")], RouterConfig::default());

    let response = router
        .route(&command_request("shh"))
        .await
        .expect("expected a reply");

    assert_eq!(response.msg, None);
    assert_eq!(response.command.as_deref(), Some("shh"));
}

// ============================================================================
// Fallback
// ============================================================================

#[tokio::test]
async fn fallback_always_answers_at_full_chance() {
    let router = router(
        &[("quote", "quotes.txt"), ("chat", "chatter.txt")],
        RouterConfig::new().default_command("chat").msg_chance(1.0),
    );

    for _ in 0..20 {
        let response = router
            .route(&Request::new("bob", "#chan"))
            .await
            .expect("fallback should answer");
        assert_eq!(response.msg.as_deref(), Some("hello from chatter"));
        assert_eq!(response.command, None);
        assert_eq!(response.args, None);
    }
}

#[tokio::test]
async fn fallback_answers_unknown_command_without_echo() {
    let router = router(
        &[("chat", "chatter.txt")],
        RouterConfig::new().default_command("chat").msg_chance(1.0),
    );

    let response = router
        .route(&command_request("unknown"))
        .await
        .expect("fallback should answer");

    assert_eq!(response.nick, "alice");
    assert_eq!(response.command, None);
    assert_eq!(response.args, None);
}

#[tokio::test]
async fn fallback_never_answers_at_zero_chance() {
    let router = router(
        &[("chat", "chatter.txt")],
        RouterConfig::new().default_command("chat").msg_chance(0.0),
    );

    for _ in 0..20 {
        assert!(router.route(&Request::new("bob", "#chan")).await.is_none());
    }
    assert_eq!(router.cache().loader().calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn explicit_command_ignores_fallback_roll() {
    let router = router(
        &[("quote", "quotes.txt"), ("chat", "chatter.txt")],
        RouterConfig::new().default_command("chat").msg_chance(0.0),
    );

    let response = router.route(&command_request("quote")).await.unwrap();
    assert_eq!(response.msg.as_deref(), Some("hello from quotes"));
}

// ============================================================================
// Raw payload handling
// ============================================================================

#[tokio::test]
async fn handle_round_trips_json() {
    let router = router(&[("quote", "quotes.txt")], RouterConfig::default());
    let payload = br##"{"command":"quote","nick":"alice","dest":"#chan","args":["x"]}"##;

    let reply = router.handle(payload).await.expect("expected a reply");
    let response: Response = serde_json::from_slice(&reply).unwrap();

    assert_eq!(response.module, "markov");
    assert_eq!(response.msg.as_deref(), Some("hello from quotes"));
    assert_eq!(response.command.as_deref(), Some("quote"));
    assert_eq!(response.args, Some(vec!["x".to_string()]));
}

#[tokio::test]
async fn handle_drops_malformed_payloads() {
    let router = router(&[("quote", "quotes.txt")], RouterConfig::default());

    assert!(router.handle(b"not json").await.is_none());
    assert!(router.handle(&[0xff, 0xfe, 0x00]).await.is_none());
    assert!(router.handle(br#"{"command":"quote"}"#).await.is_none());

    // The router keeps working afterwards.
    let payload = br##"{"command":"quote","nick":"a","dest":"#c","args":[]}"##;
    assert!(router.handle(payload).await.is_some());
}

#[tokio::test]
async fn handle_serializes_null_msg() {
    let router = router(&[("shh", "mute.txt")], RouterConfig::default());
    let payload = br##"{"command":"shh","nick":"a","dest":"#c","args":[]}"##;

    let reply = router.handle(payload).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&reply).unwrap();

    assert!(json["msg"].is_null());
    assert_eq!(json["command"], "shh");
}
