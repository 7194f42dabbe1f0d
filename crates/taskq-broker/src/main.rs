use clap::Parser;
use std::sync::Arc;
use taskq_broker::api::{create_metrics_api, create_rest_api};
use taskq_broker::{Broker, BrokerConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "taskq-broker")]
#[command(about = "Task queue broker and result backend", long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "broker.yaml")]
    config: String,

    /// Broker host
    #[arg(long)]
    host: Option<String>,

    /// Broker port
    #[arg(long)]
    port: Option<u16>,

    /// REST API port
    #[arg(long)]
    rest_port: Option<u16>,

    /// Data directory for the RocksDB store
    #[arg(long)]
    data_dir: Option<std::path::PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config_missing = !std::path::Path::new(&args.config).exists();
    // Load configuration
    let mut config = if config_missing {
        BrokerConfig::default()
    } else {
        BrokerConfig::from_file(&args.config)?
    };

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.monitoring.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    if config_missing {
        tracing::warn!("Config file {} not found, using defaults", args.config);
    }

    // Override with CLI args
    if let Some(host) = args.host {
        config.broker.host = host;
    }
    if let Some(port) = args.port {
        config.broker.port = port;
    }
    if let Some(rest_port) = args.rest_port {
        config.api.rest_port = rest_port;
    }
    if let Some(data_dir) = args.data_dir {
        config.persistence.data_dir = data_dir;
    }

    tracing::info!("Starting broker with config: {:?}", config);

    // Create broker
    let broker = Arc::new(Broker::new(config.clone())?);

    // Start REST API
    let rest_app = create_rest_api(broker.clone());
    let rest_port = config.api.rest_port;
    tokio::spawn(async move {
        if let Err(e) = serve_http(rest_app, rest_port, "REST API").await {
            tracing::error!("REST API error: {}", e);
        }
    });

    // Start metrics server
    let metrics_app = create_metrics_api(broker.clone());
    let metrics_port = config.monitoring.prometheus_port;
    tokio::spawn(async move {
        if let Err(e) = serve_http(metrics_app, metrics_port, "Metrics server").await {
            tracing::error!("Metrics server error: {}", e);
        }
    });

    let shutdown_broker = broker.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Received shutdown signal");
            shutdown_broker.shutdown();
        }
    });

    // Run broker
    broker.run().await?;

    Ok(())
}

async fn serve_http(app: axum::Router, port: u16, name: &str) -> anyhow::Result<()> {
    let addr = format!("0.0.0.0:{}", port);
    tracing::info!("{} listening on {}", name, addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
