use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use tokio::{
    sync::{broadcast, mpsc},
    task::JoinHandle,
    time::{sleep, sleep_until, Instant},
};
use tracing::{debug, info};

use crate::{
    client::ClientGenerator,
    config::{RunConfig, RunMode},
    error::{Error, ProtocolError},
    keys::KeyUniverse,
    sampler::AccessSampler,
    stats::{AggregateStatistics, Report, WorkerReport},
    value::ValueFactory,
    worker::{Signal, Worker},
};

/// Go and Stop are the only signals ever sent.
const SIGNAL_CAPACITY: usize = 2;

/// A launched run whose workers have been told to start.
pub struct RunHandle {
    config: Arc<RunConfig>,
    signals: broadcast::Sender<Signal>,
    results: mpsc::Receiver<WorkerReport>,
    workers: Vec<JoinHandle<Result<(), ProtocolError>>>,
    started: Instant,
    started_at: DateTime<Utc>,
}

/// Validate the config, spawn one worker per client and broadcast the start signal.
///
/// Everything fallible happens before the first worker is spawned, so a bad
/// config never results in traffic.
pub async fn launch<G: ClientGenerator>(config: RunConfig, mut clients: G) -> Result<RunHandle, Error> {
    config.validate()?;
    let config = Arc::new(config);
    let keys = Arc::new(KeyUniverse::generate(config.key_count)?);
    let values = Arc::new(ValueFactory::new(config.value_length)?);

    let base_seed = config.seed.unwrap_or_else(wall_clock_seed);
    let samplers = (0..config.clients)
        .map(|id| AccessSampler::new(&config, worker_seed(base_seed, id)))
        .collect::<Result<Vec<_>, _>>()?;

    let workers = samplers
        .into_iter()
        .enumerate()
        .map(|(id, sampler)| {
            Worker::new(
                id,
                clients.generate(id),
                sampler,
                Arc::clone(&keys),
                Arc::clone(&values),
                Arc::clone(&config),
            )
        })
        .collect::<Vec<_>>();

    let (signals, _) = broadcast::channel(SIGNAL_CAPACITY);
    let (report_sender, results) = mpsc::channel(config.clients);
    let workers = workers
        .into_iter()
        .map(|worker| {
            // subscribe before spawning so no worker can miss the start signal
            let receiver = signals.subscribe();
            tokio::spawn(worker.run(receiver, report_sender.clone()))
        })
        .collect::<Vec<_>>();
    drop(report_sender);

    info!(clients = config.clients, warmup = ?config.warmup, "Waiting for clients to set up");
    sleep(config.warmup).await;

    info!("Start...");
    signals
        .send(Signal::Go)
        .map_err(|_| ProtocolError::NoWorkersListening)?;
    let started = Instant::now();
    let started_at = Utc::now();

    Ok(RunHandle {
        config,
        signals,
        results,
        workers,
        started,
        started_at,
    })
}

/// Launch a run and wait for its report.
pub async fn run<G: ClientGenerator>(config: RunConfig, clients: G) -> Result<Report, Error> {
    launch(config, clients).await?.report().await
}

impl RunHandle {
    /// Wait for the run to end and merge every worker's statistics.
    pub async fn report(mut self) -> Result<Report, Error> {
        if let RunMode::Duration(duration) = self.config.mode {
            sleep_until(self.started + duration).await;
            info!("Stopping clients");
            // workers that already exited are accounted for when draining
            let _ = self.signals.send(Signal::Stop);
        }

        info!(clients = self.config.clients, "Waiting on clients to finish");
        let mut snapshots = Vec::with_capacity(self.config.clients);
        while let Some(snapshot) = self.results.recv().await {
            debug!(worker = snapshot.worker, requests = snapshot.stats.requests, "Collected statistics");
            snapshots.push(snapshot);
        }
        let elapsed = self.started.elapsed();

        for outcome in join_all(self.workers).await {
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(error)) => return Err(error.into()),
                Err(error) => return Err(ProtocolError::WorkerFailed(error.to_string()).into()),
            }
        }

        let statistics = AggregateStatistics::from_snapshots(self.config.clients, snapshots)?;
        info!(
            clients = self.config.clients,
            requests = statistics.totals.requests,
            elapsed = ?elapsed,
            "Finished generating load"
        );

        Ok(Report {
            started_at: self.started_at,
            elapsed,
            clients: self.config.clients,
            statistics,
        })
    }
}

/// Nanoseconds since the epoch, reinterpreted as unsigned.
fn wall_clock_seed() -> u64 {
    Utc::now()
        .timestamp_nanos_opt()
        .map_or(0, |nanos| nanos as u64)
}

fn worker_seed(base: u64, worker: usize) -> u64 {
    base.wrapping_add(worker as u64)
}
