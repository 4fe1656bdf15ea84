//! `markov-train`: convert an IRCCloud log into a serialized model.
//!
//! The output is read back by gowon-markov when a binding points at it.

use std::fs;
use std::path::PathBuf;

use clap::Parser;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use gowon_markov::MarkovChain;
use gowon_markov::corpus::{LogFilter, parse_timestamp};
use gowon_markov::model::markov::DEFAULT_STATE_SIZE;
use gowon_markov::{MarkovError, Result};

#[derive(Parser)]
#[command(
    name = "markov-train",
    about = "convert irccloud logs to markov model json files"
)]
struct Args {
    /// input log file
    #[arg(short, long)]
    file: PathBuf,

    /// output json model file
    #[arg(short, long)]
    output: PathBuf,

    /// filter by user
    #[arg(short, long)]
    user: Option<String>,

    /// only use last n lines
    #[arg(short, long)]
    lines: Option<usize>,

    /// filter messages to after datetime (%Y-%m-%d %H:%M:%S)
    #[arg(short = 'T', long)]
    datetime: Option<String>,

    /// words per chain state
    #[arg(short, long, default_value_t = DEFAULT_STATE_SIZE)]
    state_size: usize,

    /// log level
    #[arg(short = 'L', long, default_value = "warn")]
    loglevel: String,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.loglevel));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if !args.file.exists() {
        return Err(MarkovError::Configuration(format!(
            "{} does not exist",
            args.file.display()
        )));
    }

    let mut log_filter = LogFilter::new();
    if let Some(user) = &args.user {
        info!(user, "filtering log to only lines by user");
        log_filter = log_filter.user(user.clone());
    }
    if let Some(n) = args.lines {
        info!(lines = n, "filtering log to last lines");
        log_filter = log_filter.last_lines(n);
    }
    if let Some(datetime) = &args.datetime {
        info!(after = %datetime, "filtering log to lines after datetime");
        log_filter = log_filter.after(parse_timestamp(datetime)?);
    }

    debug!(file = %args.file.display(), "opening log file");
    let log = fs::read_to_string(&args.file)?;
    let lines = log_filter.apply(log.lines());
    info!(lines = lines.len(), "using lines for model");

    info!("creating model from selected lines");
    let chain = MarkovChain::from_text(&lines.join("\n"), args.state_size)
        .map_err(|e| MarkovError::Configuration(e.to_string()))?;
    let json = chain
        .to_json()
        .map_err(|e| MarkovError::Configuration(e.to_string()))?;

    info!(output = %args.output.display(), "writing json model");
    fs::write(&args.output, json)?;

    Ok(())
}
