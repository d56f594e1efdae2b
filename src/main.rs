//! Logpump Binary Entry Point
//!
//! Parses configuration from environment variables (or the equivalent CLI
//! flags), connects to the backing datastore and runs the forwarding loop
//! until an external stop signal arrives.

use std::time::Duration;

use clap::Parser;
use logpump::{
    config::{AppConfig, StoreConfig},
    CycleController, Forwarder, MongoStore, PostgresStore, StoreClient, StoreKind,
};
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Logpump - periodic datastore sampling and log forwarding
#[derive(Parser, Debug)]
#[command(name = "logpump", version, about, long_about = None)]
struct Cli {
    /// Datastore family to sample
    #[arg(long, env = "LOGPUMP_STORE", value_enum, default_value_t = StoreKind::Mongodb)]
    store: StoreKind,

    /// Datastore host
    #[arg(long, env = "LOGPUMP_DB_HOST", default_value = "localhost")]
    db_host: String,

    /// Datastore port (default: 27017 or 5432 per family)
    #[arg(long, env = "LOGPUMP_DB_PORT")]
    db_port: Option<u16>,

    /// Database name (default: dbA or db_a per family)
    #[arg(long, env = "LOGPUMP_DB_NAME")]
    db_name: Option<String>,

    /// Database user
    #[arg(long, env = "LOGPUMP_DB_USER")]
    db_user: Option<String>,

    /// Database password
    #[arg(long, env = "LOGPUMP_DB_PASSWORD")]
    db_password: Option<String>,

    /// Source tag carried on every envelope
    #[arg(long, env = "LOGPUMP_SOURCE")]
    source: Option<String>,

    /// Replica-set name; set for a multi-node replicated topology
    #[arg(long, env = "LOGPUMP_REPLICA_SET")]
    replica_set: Option<String>,

    /// Downstream ingestion endpoint URL
    #[arg(long, env = "LOGPUMP_ENDPOINT", default_value = "http://127.0.0.1:8080")]
    endpoint: String,

    /// Cluster tag (default: cluster2 or cluster1 per family)
    #[arg(long, env = "LOGPUMP_CLUSTER")]
    cluster: Option<String>,

    /// Polling interval between iterations
    #[arg(long, env = "LOGPUMP_INTERVAL", default_value = "60s", value_parser = humantime::parse_duration)]
    interval: Duration,

    /// Delay before re-probing after a failed iteration
    #[arg(long, env = "LOGPUMP_RETRY_DELAY", default_value = "5s", value_parser = humantime::parse_duration)]
    retry_delay: Duration,
}

impl Cli {
    fn into_config(self) -> AppConfig {
        let kind = self.store;
        AppConfig {
            store: StoreConfig::new(
                kind,
                self.db_host,
                self.db_port,
                self.db_name,
                self.db_user,
                self.db_password,
                self.source,
                self.replica_set,
            ),
            endpoint: self.endpoint,
            cluster: self
                .cluster
                .unwrap_or_else(|| AppConfig::default_cluster(kind).to_string()),
            interval: self.interval,
            retry_delay: self.retry_delay,
        }
        .clamp_interval()
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,logpump=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = cli.into_config();
    config.validate()?;

    tracing::info!("Logpump - datastore sampling and log forwarding");
    tracing::info!(
        store = %config.store.kind,
        host = %config.store.host,
        port = config.store.port,
        db = %config.store.db_name,
        source = %config.store.source,
        endpoint = %config.endpoint,
        interval = ?config.interval,
        "Configuration loaded"
    );

    let forwarder = Forwarder::new(&config.endpoint)?;
    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(shutdown_signal(stop_tx));

    match config.store.kind {
        StoreKind::Mongodb => {
            let store = MongoStore::new(config.store.clone());
            run_daemon(store, forwarder, config, stop_rx).await?;
        }
        StoreKind::Postgresql => {
            let store = PostgresStore::new(config.store.clone());
            run_daemon(store, forwarder, config, stop_rx).await?;
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Connect once (fatal on failure) and run the loop until stopped.
async fn run_daemon<S: StoreClient>(
    mut store: S,
    forwarder: Forwarder,
    config: AppConfig,
    stop_rx: watch::Receiver<bool>,
) -> Result<(), Box<dyn std::error::Error>> {
    if let Err(e) = store.connect().await {
        tracing::error!(error = %e, "Initial connect failed");
        return Err(e.into());
    }

    let controller = CycleController::new(store, forwarder, config);
    controller.run(stop_rx).await;
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM and flip the stop signal.
async fn shutdown_signal(stop_tx: watch::Sender<bool>) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal");
        }
    }

    let _ = stop_tx.send(true);
}
