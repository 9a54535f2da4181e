use rand::{rngs::StdRng, Rng, SeedableRng};
use rand_distr::{Distribution, Zipf};

use crate::{config::RunConfig, error::ConfigError, value::ValueKind};

/// What a single request does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Read,
    Write(ValueKind),
}

enum KeyAccess {
    RoundRobin,
    Zipf { dist: Zipf<f64>, rng: StdRng },
}

/// Per-worker source of key indices and operation kinds.
///
/// Key selection, the read/write choice and the value variant each draw from
/// their own random source, so changing one probability never shifts the
/// sequence produced by the others.
pub struct AccessSampler {
    key_count: usize,
    counter: u64,
    access: KeyAccess,
    op_rng: StdRng,
    set_probability: f64,
    match_rng: StdRng,
    match_probability: Option<f64>,
}

impl AccessSampler {
    /// Build a sampler for one worker from the shared run config.
    pub fn new(config: &RunConfig, seed: u64) -> Result<Self, ConfigError> {
        let mut seeder = StdRng::seed_from_u64(seed);
        let key_rng = StdRng::seed_from_u64(seeder.gen());
        let op_rng = StdRng::seed_from_u64(seeder.gen());
        let match_rng = StdRng::seed_from_u64(seeder.gen());

        let access = if config.uses_zipf() {
            if config.zipf_skew.is_nan() || config.zipf_skew <= 1.0 {
                return Err(ConfigError::InvalidZipfSkew(config.zipf_skew));
            }
            let dist = Zipf::new(config.key_count as u64, config.zipf_skew)
                .map_err(|_| ConfigError::InvalidZipfSkew(config.zipf_skew))?;
            KeyAccess::Zipf { dist, rng: key_rng }
        } else {
            KeyAccess::RoundRobin
        };

        Ok(Self {
            key_count: config.key_count,
            counter: 0,
            access,
            op_rng,
            set_probability: config.set_probability,
            match_rng,
            match_probability: config.pattern_match.then_some(config.match_probability),
        })
    }

    /// Next key index in `[0, key_count)`.
    pub fn next_key_index(&mut self) -> usize {
        let index = match &mut self.access {
            KeyAccess::RoundRobin => (self.counter % self.key_count as u64) as usize,
            KeyAccess::Zipf { dist, rng } => {
                // zipf samples lie in [1, n]
                let rank = dist.sample(rng) as usize;
                rank.saturating_sub(1).min(self.key_count - 1)
            }
        };
        self.counter += 1;
        index
    }

    pub fn next_operation(&mut self) -> Operation {
        if self.op_rng.gen::<f64>() < self.set_probability {
            Operation::Write(self.next_value_kind())
        } else {
            Operation::Read
        }
    }

    /// Value variant for a write, always filler outside pattern-match mode.
    pub fn next_value_kind(&mut self) -> ValueKind {
        match self.match_probability {
            Some(p) if self.match_rng.gen::<f64>() < p => ValueKind::Matching,
            _ => ValueKind::Filler,
        }
    }

    pub fn requests_sampled(&self) -> u64 {
        self.counter
    }
}
