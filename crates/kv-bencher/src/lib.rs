mod address;
pub mod client;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod keys;
pub mod memcache;
mod options;
pub mod output;
pub mod sampler;
pub mod stats;
pub mod value;
pub mod worker;

pub use address::{Address, Error as AddressError, Scheme};
pub use client::{ClientGenerator, KvClient};
pub use config::{RunConfig, RunMode};
pub use coordinator::{launch, run, RunHandle};
pub use error::{ConfigError, Error, ProtocolError, RequestError};
pub use keys::KeyUniverse;
pub use options::Options;
pub use stats::{AggregateStatistics, Report, Statistics, WorkerReport};
pub use value::ValueFactory;
