use std::sync::Arc;

use tokio::sync::{
    broadcast::{
        self,
        error::{RecvError, TryRecvError},
    },
    mpsc,
};
use tracing::{debug, trace, warn};

use crate::{
    client::KvClient,
    config::{RunConfig, RunMode},
    error::ProtocolError,
    keys::KeyUniverse,
    sampler::{AccessSampler, Operation},
    stats::{RequestOutcome, Statistics, WorkerReport},
    value::{ValueFactory, ValueKind},
};

/// Iterations between voluntary yields, so a client that never pends cannot
/// starve the runtime.
const YIELD_INTERVAL: u64 = 128;

/// Broadcast from the coordinator to every worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Go,
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Created,
    AwaitingStart,
    Running,
    Stopping,
    Terminated,
}

/// What a worker does per iteration and when it stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerBehavior {
    /// Sampled single requests, stopping after the given number.
    FixedCount(u64),
    /// Sampled single requests until the coordinator says stop.
    FixedDuration,
    /// `scan_count` sets over a sliding window followed by one scan.
    ///
    /// Stops after `runs` batches, or on the stop signal when unset.
    ScanBatch { scan_count: usize, runs: Option<u64> },
}

impl WorkerBehavior {
    pub fn from_config(config: &RunConfig) -> Self {
        let runs = match config.mode {
            RunMode::Count(runs) => Some(runs),
            RunMode::Duration(_) => None,
        };
        match (config.scan_count, runs) {
            (0, Some(runs)) => Self::FixedCount(runs),
            (0, None) => Self::FixedDuration,
            (scan_count, runs) => Self::ScanBatch { scan_count, runs },
        }
    }

    fn runs(&self) -> Option<u64> {
        match self {
            Self::FixedCount(runs) => Some(*runs),
            Self::FixedDuration => None,
            Self::ScanBatch { runs, .. } => *runs,
        }
    }
}

/// A single simulated client.
pub struct Worker<C> {
    id: usize,
    client: C,
    sampler: AccessSampler,
    keys: Arc<KeyUniverse>,
    values: Arc<ValueFactory>,
    config: Arc<RunConfig>,
    behavior: WorkerBehavior,
    stats: Statistics,
    state: WorkerState,
    window: usize,
}

impl<C: KvClient> Worker<C> {
    pub fn new(
        id: usize,
        client: C,
        sampler: AccessSampler,
        keys: Arc<KeyUniverse>,
        values: Arc<ValueFactory>,
        config: Arc<RunConfig>,
    ) -> Self {
        let behavior = WorkerBehavior::from_config(&config);
        Self {
            id,
            client,
            sampler,
            keys,
            values,
            config,
            behavior,
            stats: Statistics::default(),
            state: WorkerState::Created,
            window: 0,
        }
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    /// Drive the worker through its whole lifecycle, delivering its statistics
    /// to `results` exactly once on a clean finish.
    pub async fn run(
        mut self,
        mut signals: broadcast::Receiver<Signal>,
        results: mpsc::Sender<WorkerReport>,
    ) -> Result<(), ProtocolError> {
        if let Err(error) = self.client.prepare().await {
            warn!(worker = self.id, %error, "Failed to prepare client");
        }

        self.transition(WorkerState::AwaitingStart);
        self.await_start(&mut signals).await?;

        self.transition(WorkerState::Running);
        let limit = self.behavior.runs();
        let mut iterations = 0;
        loop {
            let proceed = match limit {
                Some(runs) => iterations < runs,
                None => !self.stop_requested(&mut signals),
            };
            if !proceed {
                break;
            }

            let stopped = match self.behavior {
                WorkerBehavior::ScanBatch { scan_count, runs } => {
                    let watch = runs.is_none().then_some(&mut signals);
                    self.scan_batch(scan_count, watch).await
                }
                WorkerBehavior::FixedCount(_) | WorkerBehavior::FixedDuration => {
                    self.request().await;
                    false
                }
            };

            iterations += 1;
            if stopped {
                break;
            }
            if iterations % YIELD_INTERVAL == 0 {
                tokio::task::yield_now().await;
            }
        }

        self.transition(WorkerState::Stopping);
        debug!(worker = self.id, iterations, requests = self.stats.requests, "Worker finished");
        let report = WorkerReport {
            worker: self.id,
            stats: self.stats,
        };
        results
            .send(report)
            .await
            .map_err(|_| ProtocolError::CollectorGone { worker: self.id })?;

        self.transition(WorkerState::Terminated);
        Ok(())
    }

    fn transition(&mut self, next: WorkerState) {
        trace!(worker = self.id, from = ?self.state, to = ?next, "Worker transition");
        self.state = next;
    }

    async fn await_start(
        &mut self,
        signals: &mut broadcast::Receiver<Signal>,
    ) -> Result<(), ProtocolError> {
        match signals.recv().await {
            Ok(Signal::Go) => Ok(()),
            Ok(Signal::Stop) | Err(RecvError::Lagged(_)) => {
                Err(ProtocolError::UnexpectedSignal { worker: self.id })
            }
            Err(RecvError::Closed) => Err(ProtocolError::SignalChannelClosed { worker: self.id }),
        }
    }

    /// Never blocks; a vanished coordinator counts as a stop.
    fn stop_requested(&self, signals: &mut broadcast::Receiver<Signal>) -> bool {
        match signals.try_recv() {
            Ok(Signal::Stop) | Err(TryRecvError::Closed) => true,
            Ok(Signal::Go) | Err(TryRecvError::Empty) | Err(TryRecvError::Lagged(_)) => false,
        }
    }

    async fn request(&mut self) {
        let index = self.sampler.next_key_index();
        let outcome = match self.sampler.next_operation() {
            Operation::Write(kind) => self.set(index, kind).await,
            Operation::Read if self.config.pattern_match => self.ret(index, 1).await,
            Operation::Read => self.get(index).await,
        };
        self.stats.record(outcome);
    }

    /// One window of sets and its scan. With `signals` given, a pending stop
    /// is honoured before every request after the first and `true` returned.
    async fn scan_batch(
        &mut self,
        scan_count: usize,
        mut signals: Option<&mut broadcast::Receiver<Signal>>,
    ) -> bool {
        let start = self.window;
        for offset in 0..=scan_count {
            if offset > 0 {
                if let Some(signals) = signals.as_deref_mut() {
                    if self.stop_requested(signals) {
                        return true;
                    }
                }
            }
            let outcome = if offset < scan_count {
                let kind = if offset % 2 == 0 {
                    ValueKind::Filler
                } else {
                    ValueKind::Matching
                };
                self.set(start + offset, kind).await
            } else {
                self.ret(start, scan_count).await
            };
            self.stats.record(outcome);
        }
        self.window = (start + scan_count) % self.keys.len();
        false
    }

    async fn set(&mut self, index: usize, kind: ValueKind) -> RequestOutcome {
        match self
            .client
            .set(self.keys.key(index), self.values.value(kind))
            .await
        {
            Ok(()) => RequestOutcome::SetOk,
            Err(error) => {
                debug!(worker = self.id, %error, "Set failed");
                RequestOutcome::SetError
            }
        }
    }

    async fn get(&mut self, index: usize) -> RequestOutcome {
        match self.client.get(self.keys.key(index)).await {
            Ok(Some(_)) => RequestOutcome::GetHit,
            Ok(None) => RequestOutcome::GetMiss,
            Err(error) => {
                debug!(worker = self.id, %error, "Get failed");
                RequestOutcome::GetError
            }
        }
    }

    async fn ret(&mut self, index: usize, scan_count: usize) -> RequestOutcome {
        match self
            .client
            .ret(self.keys.key(index), self.values.pattern(), scan_count)
            .await
        {
            Ok(Some(_)) => RequestOutcome::GetHit,
            Ok(None) => RequestOutcome::GetMiss,
            Err(error) => {
                debug!(worker = self.id, %error, "Ret failed");
                RequestOutcome::GetError
            }
        }
    }
}
