use std::{path::PathBuf, time::Duration};

use chrono::{DateTime, Utc};
use clap::Parser;

use crate::{
    config::{RunConfig, RunMode},
    keys::DEFAULT_KEY_COUNT,
    Address,
};

#[derive(Parser, Debug, Clone)]
pub struct Options {
    /// Service to load, as tcp://host:port or udp://host:port.
    #[clap(long, value_parser = Address::try_from_str, default_value = "tcp://127.0.0.1:11211")]
    pub target: Address,

    /// Number of clients (connections) to create.
    #[clap(long, default_value = "1")]
    pub clients: usize,

    /// Number of requests each client performs.
    #[clap(long, conflicts_with = "duration")]
    pub runs: Option<u64>,

    /// Run for this many seconds instead of a fixed number of requests.
    #[clap(long)]
    pub duration: Option<u64>,

    /// Probability that a request is a set.
    #[clap(long, default_value = "0.1")]
    pub set_probability: f64,

    /// Length of each value, in bytes.
    #[clap(long, default_value = "32")]
    pub value_length: usize,

    /// Zipf skew for key selection, 0 for round-robin.
    #[clap(long, default_value = "0.0")]
    pub zipf_skew: f64,

    /// Sets per scan batch, 0 to issue single sampled requests.
    #[clap(long, default_value = "0")]
    pub scan_count: usize,

    /// Read with pattern-match requests and write values carrying the marker.
    #[clap(long)]
    pub pattern_match: bool,

    /// Probability that a set carries the marker in pattern-match mode.
    #[clap(long, default_value = "0.0")]
    pub match_probability: f64,

    /// Number of distinct keys.
    #[clap(long, default_value_t = DEFAULT_KEY_COUNT)]
    pub keys: usize,

    /// Time given to clients to set up before starting, in milliseconds.
    #[clap(long, default_value = "3000")]
    pub warmup_ms: u64,

    /// Seed for every client's random sources, derived from the clock if unset.
    #[clap(long)]
    pub seed: Option<u64>,

    /// The timeout to apply to requests, in milliseconds
    #[clap(long, default_value = "5000")]
    pub timeout: u64,

    /// Start at rfc3339 encoded datetime, useful for synchronising multiple benchers
    #[clap(long)]
    pub start_at: Option<DateTime<Utc>>,

    /// Write per-client statistics to this CSV file.
    #[clap(short, long)]
    pub out_file: Option<PathBuf>,

    /// Print the report as JSON.
    #[clap(long)]
    pub json: bool,

    /// Filter logs using this string, rather than the `RUST_LOG` environment variable.
    #[clap(long)]
    pub log_filter: Option<String>,

    /// Don't print logs with colour.
    #[clap(long)]
    pub no_colour: bool,
}

impl Options {
    pub fn run_config(&self) -> RunConfig {
        let mode = match self.duration {
            Some(seconds) => RunMode::Duration(Duration::from_secs(seconds)),
            None => RunMode::Count(self.runs.unwrap_or(1)),
        };
        RunConfig {
            target: self.target.clone(),
            clients: self.clients,
            mode,
            set_probability: self.set_probability,
            value_length: self.value_length,
            zipf_skew: self.zipf_skew,
            scan_count: self.scan_count,
            pattern_match: self.pattern_match,
            match_probability: self.match_probability,
            key_count: self.keys,
            warmup: Duration::from_millis(self.warmup_ms),
            seed: self.seed,
            timeout: Duration::from_millis(self.timeout),
        }
    }
}
