use std::time::Duration;

use crate::{
    address::Address,
    error::ConfigError,
    keys::{KeyUniverse, DEFAULT_KEY_COUNT},
    value::MIN_VALUE_LENGTH,
};

/// How long each worker keeps issuing requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Every worker performs exactly this many iterations then stops itself.
    Count(u64),
    /// Workers run until the coordinator broadcasts stop after this long.
    Duration(Duration),
}

/// Immutable snapshot of a run, shared read-only by all workers.
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub target: Address,
    pub clients: usize,
    pub mode: RunMode,
    /// Probability that a request is a write.
    pub set_probability: f64,
    pub value_length: usize,
    /// 0 selects round-robin key access, otherwise must be > 1.
    pub zipf_skew: f64,
    /// Nonzero switches workers to batches of this many sets followed by one scan.
    pub scan_count: usize,
    /// Reads become pattern-match reads and some writes carry the marker.
    pub pattern_match: bool,
    /// Probability that a write in pattern-match mode carries the marker.
    pub match_probability: f64,
    pub key_count: usize,
    /// Pause between spawning workers and broadcasting the start signal.
    pub warmup: Duration,
    /// Fixed seed for every worker's random sources, wall-clock derived if unset.
    pub seed: Option<u64>,
    /// Upper bound on a single request/response exchange.
    pub timeout: Duration,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            target: Address::default(),
            clients: 1,
            mode: RunMode::Count(1),
            set_probability: 0.1,
            value_length: MIN_VALUE_LENGTH,
            zipf_skew: 0.0,
            scan_count: 0,
            pattern_match: false,
            match_probability: 0.0,
            key_count: DEFAULT_KEY_COUNT,
            warmup: Duration::from_secs(3),
            seed: None,
            timeout: Duration::from_millis(5000),
        }
    }
}

impl RunConfig {
    /// Check every constraint that would otherwise surface after workers started.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.clients == 0 {
            return Err(ConfigError::NoClients);
        }
        if self.value_length < MIN_VALUE_LENGTH {
            return Err(ConfigError::ValueTooShort {
                length: self.value_length,
                minimum: MIN_VALUE_LENGTH,
            });
        }
        if self.zipf_skew != 0.0 && (self.zipf_skew.is_nan() || self.zipf_skew <= 1.0) {
            return Err(ConfigError::InvalidZipfSkew(self.zipf_skew));
        }
        check_probability("set probability", self.set_probability)?;
        check_probability("match probability", self.match_probability)?;

        let maximum = KeyUniverse::max_keys();
        if self.key_count == 0 || self.key_count > maximum {
            return Err(ConfigError::InvalidKeyCount {
                count: self.key_count,
                maximum,
            });
        }
        if self.scan_count > self.key_count {
            return Err(ConfigError::ScanCountTooLarge {
                scan_count: self.scan_count,
                key_count: self.key_count,
            });
        }
        Ok(())
    }

    pub fn uses_zipf(&self) -> bool {
        self.zipf_skew != 0.0
    }
}

fn check_probability(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::InvalidProbability { name, value })
    }
}
