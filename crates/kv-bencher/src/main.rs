use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use kv_bencher::{memcache::MemcacheClient, output, Options};
use tokio::time::sleep;
use tracing::{info, metadata::LevelFilter};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    let options = Options::parse();

    let log_filter = if let Some(log_filter) = &options.log_filter {
        EnvFilter::new(log_filter)
    } else {
        EnvFilter::builder()
            .with_default_directive(LevelFilter::INFO.into())
            .from_env_lossy()
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_ansi(!options.no_colour))
        .with(log_filter)
        .init();

    if let Some(start_at) = options.start_at {
        let duration = (start_at - Utc::now())
            .to_std()
            .context("Failed to create start-at duration, maybe it was in the past?")?;

        info!("Starting in {:?}", duration);

        sleep(duration).await
    }

    let config = options.run_config();
    let target = config.target.clone();
    let timeout = config.timeout;

    info!(address = %target, clients = config.clients, mode = ?config.mode, "generating load");
    let report = kv_bencher::run(config, move |_: usize| MemcacheClient::new(&target, timeout))
        .await
        .context("Load generation aborted")?;
    info!("generated load");

    if let Some(out_file) = &options.out_file {
        output::write_csv_file(out_file, &report)
            .with_context(|| format!("Failed to write {}", out_file.display()))?;
    }

    if options.json {
        output::print_json(&report)?;
    } else {
        output::print_report(&report);
    }

    Ok(())
}
