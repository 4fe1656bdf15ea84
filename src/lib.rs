//! gowon-markov - a gowon module replying with markov chain sentences
//!
//! The bot listens for command requests on a broker topic, looks up the
//! model bound to the command, generates a sentence and publishes a
//! reply. Models are loaded lazily through [`ModelCache`], which keeps
//! at most a configured number of them for a configured time and never
//! loads the same model twice concurrently.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use gowon_markov::{
//!     CacheConfig, ConnectionConfig, ConnectionManager, MarkovLoader, ModelCache, MqttTransport,
//!     Router, RouterConfig,
//! };
//!
//! #[tokio::main]
//! async fn main() -> gowon_markov::Result<()> {
//!     let mut cache = ModelCache::new(MarkovLoader::default(), CacheConfig::default());
//!     cache.add_binding("quote", "/data/quotes.txt")?;
//!     let router = Router::new(Arc::new(cache), RouterConfig::default());
//!
//!     let transport = MqttTransport::new("gowon_markov", "localhost", 1883);
//!     let mut manager = ConnectionManager::new(transport, router, ConnectionConfig::default());
//!     manager
//!         .run(async {
//!             let _ = tokio::signal::ctrl_c().await;
//!         })
//!         .await
//! }
//! ```

pub mod cache;
pub mod config;
pub mod corpus;
pub mod error;
pub mod model;
pub mod router;
pub mod telemetry;
pub mod transport;
pub mod types;
mod version;

pub use cache::{CacheConfig, ModelCache, SweepHandle, spawn_sweeper};
pub use config::{Config, CorpusBinding, parse_bindings};
pub use error::{MarkovError, Result};
pub use model::{MarkovChain, MarkovLoader, ModelLoader, SentenceModel};
pub use router::{MessageHandler, Router, RouterConfig};
pub use transport::{ConnectionConfig, ConnectionManager, ConnectionState, Transport};
#[cfg(feature = "mqtt")]
pub use transport::MqttTransport;
pub use types::{Request, Response};
pub use version::{PKG_NAME, PKG_VERSION, version_string};
