use std::io;

use thiserror::Error;

/// Problems with the run configuration, detected before any worker starts.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("value length {length} too short, must be at least {minimum}")]
    ValueTooShort { length: usize, minimum: usize },
    #[error("zipf skew must be >1 or 0.0, got {0}")]
    InvalidZipfSkew(f64),
    #[error("key {index} has length {length}, expected {expected}")]
    InvalidKeyLength {
        index: usize,
        length: usize,
        expected: usize,
    },
    #[error("key count {count} outside supported range 1..={maximum}")]
    InvalidKeyCount { count: usize, maximum: usize },
    #[error("scan count {scan_count} larger than key count {key_count}")]
    ScanCountTooLarge { scan_count: usize, key_count: usize },
    #[error("{name} must be within [0, 1], got {value}")]
    InvalidProbability { name: &'static str, value: f64 },
    #[error("at least one client is required")]
    NoClients,
}

/// Violations of the start/stop handshake or of snapshot collection.
///
/// These indicate a defect in the harness, so no throughput should be reported.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("worker {worker} received stop before start")]
    UnexpectedSignal { worker: usize },
    #[error("signal channel closed before worker {worker} was started")]
    SignalChannelClosed { worker: usize },
    #[error("no workers were listening for the start signal")]
    NoWorkersListening,
    #[error("collector went away before worker {worker} delivered its statistics")]
    CollectorGone { worker: usize },
    #[error("expected {expected} statistics snapshots, received {received}")]
    SnapshotCount { expected: usize, received: usize },
    #[error("worker {worker} delivered more than one statistics snapshot")]
    DuplicateSnapshot { worker: usize },
    #[error("worker task failed: {0}")]
    WorkerFailed(String),
}

/// A single request to the key-value service failed.
///
/// Request errors are counted by the worker and never escalate.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("request timed out")]
    Timeout,
    #[error("server replied with error: {0}")]
    Server(String),
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}
