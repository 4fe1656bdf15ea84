//! Request routing: command lookup, fallback roll, sentence generation.
//!
//! A request whose command has a binding is answered from that model and
//! the reply echoes the command and arguments. Any other request may
//! still be answered from the fallback model, with probability
//! [`RouterConfig::msg_chance`]; such replies carry no echo.

use std::sync::Arc;

use async_trait::async_trait;
use rand::Rng;
use tracing::{debug, error};

use crate::cache::ModelCache;
use crate::model::{ModelLoader, SentenceModel};
use crate::telemetry;
use crate::types::{Request, Response};
use crate::MarkovError;

/// Default number of generation attempts per request.
pub const DEFAULT_MAX_TRIES: usize = 100;

/// Turns a raw inbound payload into an optional raw reply.
///
/// Implementations never fail: anything that goes wrong is logged and
/// results in no reply.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, payload: &[u8]) -> Option<Vec<u8>>;
}

/// Routing behaviour.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Command whose model answers unmatched requests. Default: none.
    pub default_command: Option<String>,
    /// Probability in `[0, 1]` that an unmatched request is answered by
    /// the fallback model. Default: 0.0.
    pub msg_chance: f64,
    /// Generation attempts per request. Default: 100.
    pub max_tries: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            default_command: None,
            msg_chance: 0.0,
            max_tries: DEFAULT_MAX_TRIES,
        }
    }
}

impl RouterConfig {
    /// Create a new config with the defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the fallback command.
    pub fn default_command(mut self, command: impl Into<String>) -> Self {
        self.default_command = Some(command.into());
        self
    }

    /// Set the fallback probability.
    pub fn msg_chance(mut self, chance: f64) -> Self {
        self.msg_chance = chance;
        self
    }

    /// Set the generation attempts per request.
    pub fn max_tries(mut self, tries: usize) -> Self {
        self.max_tries = tries;
        self
    }
}

/// Resolves requests to models and builds replies.
pub struct Router<L: ModelLoader> {
    cache: Arc<ModelCache<L>>,
    config: RouterConfig,
}

impl<L: ModelLoader> Router<L> {
    pub fn new(cache: Arc<ModelCache<L>>, config: RouterConfig) -> Self {
        Self { cache, config }
    }

    /// The shared model cache.
    pub fn cache(&self) -> &Arc<ModelCache<L>> {
        &self.cache
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// Answer a request, or decide to stay silent.
    ///
    /// A reply is still produced when the model cannot make a sentence;
    /// its `msg` is then `None`.
    pub async fn route(&self, request: &Request) -> Option<Response> {
        let (command, echo) = self.resolve(request)?;

        let model = match self.cache.get(command).await {
            Ok(Some(model)) => model,
            Ok(None) => {
                debug!(command, "no corpus found");
                return None;
            }
            Err(e) => {
                error!(command, error = %e, "could not load model");
                return None;
            }
        };

        let msg = model.generate_sentence(self.config.max_tries);
        if msg.is_none() {
            let e = MarkovError::Generation {
                attempts: self.config.max_tries,
            };
            error!(command, error = %e, "could not create sentence");
        }

        Some(if echo {
            Response::reply(request, msg)
        } else {
            Response::unprompted(request, msg)
        })
    }

    /// Pick the command to answer with and whether to echo it.
    fn resolve<'a>(&'a self, request: &'a Request) -> Option<(&'a str, bool)> {
        if let Some(command) = request.command.as_deref() {
            if self.cache.has_binding(command) {
                return Some((command, true));
            }
        }

        let Some(default) = self.config.default_command.as_deref() else {
            debug!(command = ?request.command, "no corpus found");
            return None;
        };
        let roll: f64 = rand::thread_rng().r#gen();
        if roll < self.config.msg_chance {
            Some((default, false))
        } else {
            None
        }
    }
}

#[async_trait]
impl<L: ModelLoader> MessageHandler for Router<L> {
    async fn handle(&self, payload: &[u8]) -> Option<Vec<u8>> {
        let request = match Request::from_slice(payload) {
            Ok(request) => request,
            Err(e) => {
                metrics::counter!(telemetry::MESSAGES_TOTAL, "outcome" => "parse_error")
                    .increment(1);
                error!(error = %e, "error parsing message json");
                return None;
            }
        };

        let Some(response) = self.route(&request).await else {
            metrics::counter!(telemetry::MESSAGES_TOTAL, "outcome" => "dropped").increment(1);
            return None;
        };

        match response.to_vec() {
            Ok(bytes) => {
                metrics::counter!(telemetry::MESSAGES_TOTAL, "outcome" => "replied").increment(1);
                Some(bytes)
            }
            Err(e) => {
                error!(error = %e, "could not encode reply");
                None
            }
        }
    }
}
