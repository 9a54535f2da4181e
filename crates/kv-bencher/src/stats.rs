use std::{ops::AddAssign, time::Duration};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::ProtocolError;

/// Result of one request as seen by the harness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    SetOk,
    SetError,
    GetHit,
    GetMiss,
    GetError,
}

/// Request counters owned by a single worker.
///
/// `gets` counts every read that completed, `misses` the subset of those that
/// found nothing.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Statistics {
    pub requests: u64,
    pub sets: u64,
    pub gets: u64,
    pub misses: u64,
    pub set_errors: u64,
    pub get_errors: u64,
}

impl Statistics {
    pub fn record(&mut self, outcome: RequestOutcome) {
        self.requests += 1;
        match outcome {
            RequestOutcome::SetOk => self.sets += 1,
            RequestOutcome::SetError => self.set_errors += 1,
            RequestOutcome::GetHit => self.gets += 1,
            RequestOutcome::GetMiss => {
                self.gets += 1;
                self.misses += 1;
            }
            RequestOutcome::GetError => self.get_errors += 1,
        }
    }

    pub fn errors(&self) -> u64 {
        self.set_errors + self.get_errors
    }

    /// Every request landed in exactly one of the outcome counters.
    pub fn is_consistent(&self) -> bool {
        self.requests == self.sets + self.gets + self.set_errors + self.get_errors
            && self.misses <= self.gets
    }
}

impl AddAssign for Statistics {
    fn add_assign(&mut self, other: Self) {
        self.requests += other.requests;
        self.sets += other.sets;
        self.gets += other.gets;
        self.misses += other.misses;
        self.set_errors += other.set_errors;
        self.get_errors += other.get_errors;
    }
}

/// Terminal snapshot a worker hands to the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WorkerReport {
    pub worker: usize,
    pub stats: Statistics,
}

/// Field-wise sum of exactly one snapshot per worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AggregateStatistics {
    pub totals: Statistics,
    pub workers: Vec<WorkerReport>,
}

impl AggregateStatistics {
    pub fn from_snapshots(
        expected: usize,
        mut snapshots: Vec<WorkerReport>,
    ) -> Result<Self, ProtocolError> {
        snapshots.sort_by_key(|s| s.worker);
        if let Some(pair) = snapshots.windows(2).find(|w| w[0].worker == w[1].worker) {
            return Err(ProtocolError::DuplicateSnapshot {
                worker: pair[0].worker,
            });
        }
        if snapshots.len() != expected {
            return Err(ProtocolError::SnapshotCount {
                expected,
                received: snapshots.len(),
            });
        }

        let mut totals = Statistics::default();
        for snapshot in &snapshots {
            totals += snapshot.stats;
        }
        Ok(Self {
            totals,
            workers: snapshots,
        })
    }
}

/// Outcome of a whole run.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub started_at: DateTime<Utc>,
    pub elapsed: Duration,
    pub clients: usize,
    #[serde(flatten)]
    pub statistics: AggregateStatistics,
}

impl Report {
    pub fn totals(&self) -> &Statistics {
        &self.statistics.totals
    }

    /// Requests per second over the measured window.
    pub fn throughput(&self) -> f64 {
        let seconds = self.elapsed.as_secs_f64();
        if seconds == 0.0 {
            0.0
        } else {
            self.statistics.totals.requests as f64 / seconds
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn snapshot(worker: usize, outcomes: &[RequestOutcome]) -> WorkerReport {
        let mut stats = Statistics::default();
        for outcome in outcomes {
            stats.record(*outcome);
        }
        WorkerReport { worker, stats }
    }

    #[test]
    fn record_keeps_accounting_identity() {
        let report = snapshot(
            0,
            &[
                RequestOutcome::SetOk,
                RequestOutcome::SetError,
                RequestOutcome::GetHit,
                RequestOutcome::GetMiss,
                RequestOutcome::GetMiss,
                RequestOutcome::GetError,
            ],
        );
        assert_eq!(
            report.stats,
            Statistics {
                requests: 6,
                sets: 1,
                gets: 3,
                misses: 2,
                set_errors: 1,
                get_errors: 1,
            }
        );
        assert!(report.stats.is_consistent());
        assert_eq!(report.stats.errors(), 2);
    }

    #[test]
    fn aggregates_field_wise() {
        let snapshots = vec![
            snapshot(1, &[RequestOutcome::SetOk, RequestOutcome::GetMiss]),
            snapshot(0, &[RequestOutcome::GetHit, RequestOutcome::GetError]),
        ];
        let aggregate = AggregateStatistics::from_snapshots(2, snapshots).unwrap();
        assert_eq!(
            aggregate.totals,
            Statistics {
                requests: 4,
                sets: 1,
                gets: 2,
                misses: 1,
                set_errors: 0,
                get_errors: 1,
            }
        );
        assert!(aggregate.totals.is_consistent());
        assert_eq!(
            aggregate.workers.iter().map(|w| w.worker).collect::<Vec<_>>(),
            vec![0, 1]
        );
    }

    #[test]
    fn rejects_wrong_snapshot_count() {
        let snapshots = vec![snapshot(0, &[RequestOutcome::SetOk])];
        assert_eq!(
            AggregateStatistics::from_snapshots(2, snapshots.clone()),
            Err(ProtocolError::SnapshotCount {
                expected: 2,
                received: 1
            })
        );
        assert_eq!(
            AggregateStatistics::from_snapshots(0, snapshots),
            Err(ProtocolError::SnapshotCount {
                expected: 0,
                received: 1
            })
        );
    }

    #[test]
    fn rejects_duplicate_snapshots() {
        let snapshots = vec![
            snapshot(3, &[RequestOutcome::SetOk]),
            snapshot(3, &[RequestOutcome::SetOk]),
        ];
        assert_eq!(
            AggregateStatistics::from_snapshots(2, snapshots),
            Err(ProtocolError::DuplicateSnapshot { worker: 3 })
        );
    }

    #[test]
    fn throughput_uses_elapsed_seconds() {
        let statistics = AggregateStatistics::from_snapshots(
            1,
            vec![snapshot(0, &[RequestOutcome::SetOk; 10])],
        )
        .unwrap();
        let report = Report {
            started_at: Utc::now(),
            elapsed: Duration::from_millis(500),
            clients: 1,
            statistics,
        };
        assert_eq!(report.throughput(), 20.0);
    }
}
