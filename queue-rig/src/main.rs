//! QueueLoop Generator - floods a queue with random messages.
//!
//! Launches a pool of publishers against one queue and prints the publish
//! rate once per second. Runs until SIGINT/SIGTERM, or for `--duration-secs`.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;

use queueloop::config::amqp_url_from_env;
use queueloop::telemetry::{init_tracing, shutdown_signal};
use queueloop::{run_generator, AmqpQueueClient, GeneratorConfig};

#[derive(Debug, Parser)]
#[command(name = "queueloop-generator")]
#[command(about = "Publish random messages to a queue as fast as possible")]
struct Args {
    /// Queue name
    #[arg(short, long, env = "QUEUE")]
    queue: String,

    /// Number of concurrent publishers (0 means 1000)
    #[arg(short, long, env = "THREADS", default_value_t = 0)]
    threads: usize,

    /// Stop after this many seconds instead of waiting for a signal
    #[arg(long)]
    duration_secs: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let args = Args::parse();
    let config = GeneratorConfig::new(args.queue, args.threads).context("configuration error")?;

    info!(
        queue = %config.queue_name,
        threads = config.threads,
        duration_secs = ?args.duration_secs,
        "config_loaded"
    );

    let client = AmqpQueueClient::new(amqp_url_from_env());

    let cancel = CancellationToken::new();
    let stopper = {
        let cancel = cancel.clone();
        let duration = args.duration_secs.map(Duration::from_secs);
        async move {
            match duration {
                Some(duration) => {
                    tokio::select! {
                        _ = shutdown_signal() => {}
                        _ = tokio::time::sleep(duration) => info!("run_duration_elapsed"),
                    }
                }
                None => shutdown_signal().await,
            }
            cancel.cancel();
        }
    };
    tokio::spawn(stopper);

    let report = run_generator(Arc::new(client.clone()), &config, cancel, |sample| {
        println!("{}", sample)
    })
    .await
    .context("getting URL error")?;

    client.close().await;

    info!(
        posted = report.posted,
        failed_workers = report.pool.failed,
        "generator_shutdown_complete"
    );

    Ok(())
}
