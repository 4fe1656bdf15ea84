//! gowon-markov: markov chain reply module for gowon.
//!
//! Subscribes to the gowon input topic and answers bound commands with
//! generated sentences.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use gowon_markov::{
    Config, ConnectionManager, MarkovLoader, ModelCache, MqttTransport, Router,
    spawn_sweeper,
};

/// gowon markov module.
#[derive(Parser)]
#[command(name = "gowon-markov")]
#[command(version = gowon_markov::PKG_VERSION)]
#[command(about = "Reply to gowon commands with markov chain sentences")]
struct Args {
    /// Path to a TOML configuration file.
    #[arg(short, long, env = "GOWON_MARKOV_CONFIG")]
    config: Option<PathBuf>,

    /// Broker host.
    #[arg(short = 'H', long, env = "GOWON_BROKER_HOST")]
    broker_host: Option<String>,

    /// Broker port.
    #[arg(short = 'P', long, env = "GOWON_BROKER_PORT")]
    broker_port: Option<u16>,

    /// Comma-separated command:file pairs.
    #[arg(short = 'C', long, env = "GOWON_MARKOV_CORPUS")]
    corpus: Option<String>,

    /// Directory corpus files are resolved against.
    #[arg(short, long, env = "GOWON_MARKOV_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Command whose model answers unmatched messages.
    #[arg(long, env = "GOWON_MARKOV_DEFAULT")]
    default_command: Option<String>,

    /// Chance (0 to 1) of answering an unmatched message.
    #[arg(long, env = "GOWON_MARKOV_MSG_CHANCE")]
    msg_chance: Option<f64>,

    /// Maximum number of models kept loaded.
    #[arg(long, env = "GOWON_MARKOV_CACHE_SIZE")]
    cache_size: Option<usize>,

    /// Seconds a loaded model is kept.
    #[arg(long, env = "GOWON_MARKOV_CACHE_TTL")]
    cache_ttl: Option<u64>,

    /// Seconds between cache expiry sweeps.
    #[arg(long, env = "GOWON_MARKOV_SWEEP_INTERVAL")]
    sweep_interval: Option<u64>,

    /// Log filter used when RUST_LOG is unset.
    #[arg(short = 'L', long, env = "GOWON_MARKOV_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

impl Args {
    /// Overlay command line values on a loaded configuration.
    fn apply(self, mut config: Config) -> Config {
        if let Some(host) = self.broker_host {
            config.broker.host = host;
        }
        if let Some(port) = self.broker_port {
            config.broker.port = port;
        }
        if let Some(corpus) = self.corpus {
            config.corpus.bindings = corpus;
        }
        if let Some(dir) = self.data_dir {
            config.corpus.data_dir = dir;
        }
        if let Some(command) = self.default_command {
            config.corpus.default_command = Some(command);
        }
        if let Some(chance) = self.msg_chance {
            config.corpus.msg_chance = chance;
        }
        if let Some(size) = self.cache_size {
            config.cache.max_entries = size;
        }
        if let Some(ttl) = self.cache_ttl {
            config.cache.ttl_secs = ttl;
        }
        if let Some(interval) = self.sweep_interval {
            config.cache.sweep_interval_secs = interval;
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // Load configuration
    let config = match args.config.as_deref() {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    let config = args.apply(config);
    config.validate()?;

    // Build the model cache from the corpus bindings
    let mut cache = ModelCache::new(
        MarkovLoader::new(config.corpus.state_size),
        config.cache_config(),
    );
    let bindings = config.bindings()?;
    if bindings.is_empty() {
        warn!("no corpus bindings configured, no request will be answered");
    }
    for binding in bindings {
        info!(command = %binding.command, path = %binding.path.display(), "corpus bound");
        cache.add_binding(binding.command, binding.path)?;
    }
    let cache = Arc::new(cache);
    let sweeper = spawn_sweeper(Arc::clone(&cache), cache.config().sweep_interval);

    let router = Router::new(cache, config.router_config());

    let transport = MqttTransport::new(
        config.broker.client_id.clone(),
        config.broker.host.clone(),
        config.broker.port,
    )
    .keep_alive(Duration::from_secs(config.broker.keep_alive_secs));

    info!(
        version = %gowon_markov::version_string(),
        host = %config.broker.host,
        port = config.broker.port,
        "gowon-markov starting"
    );

    let mut manager = ConnectionManager::new(transport, router, config.connection_config());
    let result = manager
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "could not listen for ctrl-c");
                std::future::pending::<()>().await;
            }
        })
        .await;

    sweeper.stop().await;
    result?;

    Ok(())
}
