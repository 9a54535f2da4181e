use std::{io, path::Path};

use serde::Serialize;

use crate::stats::{Report, WorkerReport};

/// One CSV row per client.
#[derive(Debug, Serialize)]
struct WorkerRow {
    worker: usize,
    requests: u64,
    sets: u64,
    gets: u64,
    misses: u64,
    set_errors: u64,
    get_errors: u64,
}

impl From<&WorkerReport> for WorkerRow {
    fn from(report: &WorkerReport) -> Self {
        let stats = report.stats;
        Self {
            worker: report.worker,
            requests: stats.requests,
            sets: stats.sets,
            gets: stats.gets,
            misses: stats.misses,
            set_errors: stats.set_errors,
            get_errors: stats.get_errors,
        }
    }
}

pub fn write_csv<W: io::Write>(writer: W, report: &Report) -> csv::Result<()> {
    let mut writer = csv::Writer::from_writer(writer);
    for worker in &report.statistics.workers {
        writer.serialize(WorkerRow::from(worker))?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_csv_file(path: &Path, report: &Report) -> csv::Result<()> {
    let file = std::fs::File::create(path)?;
    write_csv(file, report)
}

pub fn print_json(report: &Report) -> serde_json::Result<()> {
    println!("{}", serde_json::to_string_pretty(report)?);
    Ok(())
}

pub fn print_report(report: &Report) {
    let totals = report.totals();
    let throughput = report.throughput();
    println!();
    println!("Clients: {}", report.clients);
    println!("Throughput[KReq/s]: {:.2}", throughput / 1000.);
    println!("Throughput (r/s): {:.2}", throughput);
    println!("Duration[ms]: {:.2}", report.elapsed.as_secs_f64() * 1000.);
    println!("Total requests: {}", totals.requests);
    println!("Sets: {}", totals.sets);
    println!("Gets: {} ({} misses)", totals.gets, totals.misses);
    println!("Set errors: {}", totals.set_errors);
    println!("Get errors: {}", totals.get_errors);
    if totals.requests > 0 {
        println!(
            "Error rate: {:.2}%",
            100. * totals.errors() as f64 / totals.requests as f64
        );
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::Utc;

    use super::*;
    use crate::stats::{AggregateStatistics, Statistics};

    #[test]
    fn csv_has_one_row_per_worker() {
        let workers = (0..2)
            .map(|worker| WorkerReport {
                worker,
                stats: Statistics {
                    requests: 3,
                    sets: 1,
                    gets: 2,
                    misses: 1,
                    set_errors: 0,
                    get_errors: 0,
                },
            })
            .collect();
        let report = Report {
            started_at: Utc::now(),
            elapsed: Duration::from_secs(1),
            clients: 2,
            statistics: AggregateStatistics::from_snapshots(2, workers).unwrap(),
        };

        let mut out = Vec::new();
        write_csv(&mut out, &report).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(
            text,
            "worker,requests,sets,gets,misses,set_errors,get_errors\n0,3,1,2,1,0,0\n1,3,1,2,1,0,0\n"
        );
    }
}
