use clap::Parser;
use lanequeue_client::{Connection, ReconnectingPublisher};
use lanequeue_core::{PriorityPolicy, SubmissionValidator};
use lanequeue_producer::{create_router, AppState, Dispatcher, ProducerConfig};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "lq-producer")]
#[command(about = "HTTP ingress publishing tasks to the priority lanes", long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "producer.yaml")]
    config: String,

    /// Broker address (host:port)
    #[arg(short, long)]
    broker: Option<String>,

    /// HTTP listen port
    #[arg(short, long)]
    port: Option<u16>,

    /// Reject single tasks with an unknown priority instead of publishing
    /// them with priority 0
    #[arg(long)]
    strict: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config_found = std::path::Path::new(&args.config).exists();
    let mut config = if config_found {
        ProducerConfig::from_file(&args.config)?
    } else {
        ProducerConfig::default()
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
    if let Some(port) = args.port {
        config.http.port = port;
    }
    if args.strict {
        config.validation.single_task_priority = PriorityPolicy::Strict;
    }

    tracing::info!("Starting producer with config: {:?}", config);

    let connection =
        Connection::connect(config.broker.address.clone(), config.broker.connect_retry.clone())
            .await?;
    let publisher = Arc::new(ReconnectingPublisher::new(connection));

    let dispatcher = Arc::new(Dispatcher::new(publisher.clone()));
    dispatcher.declare_lanes().await?;

    let validator = SubmissionValidator::new(config.validation.single_task_priority);
    let app = create_router(AppState::new(dispatcher, validator));

    let addr = config.http_address();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("API server running on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("HTTP server stopped, closing broker channel");
    publisher.close().await;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Received shutdown signal");
}
