use clap::Parser;
use lanequeue_worker::{SimulatedWork, Worker, WorkerConfig};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "lq-worker")]
#[command(about = "Consumes the single and batch task lanes", long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "worker.yaml")]
    config: String,

    /// Broker address (host:port)
    #[arg(short, long)]
    broker: Option<String>,

    /// Unacknowledged deliveries per lane
    #[arg(long)]
    prefetch: Option<u16>,

    /// Requeue messages whose execution failed
    #[arg(long)]
    requeue_failed: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config_found = std::path::Path::new(&args.config).exists();
    let mut config = if config_found {
        WorkerConfig::from_file(&args.config)?
    } else {
        WorkerConfig::default()
    };

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    if !config_found {
        tracing::warn!("Config file {} not found, using defaults", args.config);
    }

    // Override with CLI args
    if let Some(broker) = args.broker {
        config.broker.address = broker;
    }
    if let Some(prefetch) = args.prefetch {
        config.prefetch = prefetch;
    }
    if args.requeue_failed {
        config.requeue_failed = true;
    }

    tracing::info!("Starting worker with config: {:?}", config);

    let handler = Arc::new(SimulatedWork::new(config.simulated_work_max_delay_secs));
    let worker = Worker::new(config, handler);

    // Handle shutdown signals
    let shutdown = worker.shutdown_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Received shutdown signal");
            shutdown.cancel();
        }
    });

    worker.run().await?;

    Ok(())
}
