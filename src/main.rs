//! Bootstrap configuration-sync service.
//!
//! Runs the provisioning HTTP API, an optional gRPC health endpoint and the
//! things-stream consumer under a [`ServiceMonitor`].

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tonic::transport::Server;

use devicehub::config::{load_or_default, ServiceConfig};
use devicehub::events::{ConsumerSettings, EventDispatcher, RedisEventLog, StreamConsumer};
use devicehub::lifecycle::{ErrorSink, GracefulListener, MonitorExit, ServiceMonitor, SignalSet};
use devicehub::net::{tls, GrpcListener, HttpListener};
use devicehub::observability::{init_logging, init_metrics};
use devicehub::provision::{api, ConfigStore};
use devicehub::resilience::BackoffPolicy;

#[derive(Debug, Parser)]
#[command(name = "devicehub", version, about = "Bootstrap configuration-sync service")]
struct Cli {
    /// Path to the TOML configuration file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Validate the configuration and exit.
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_or_default(cli.config.as_deref())?;
    if cli.check {
        println!("configuration OK");
        return Ok(());
    }

    init_logging(&config.observability)?;
    tls::install_crypto_provider();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        service = %config.service.name,
        "devicehub starting"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => {
                if let Err(e) = init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to start metrics exporter");
                }
            }
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let signals = SignalSet::parse(&config.service.signals)?;
    let stop_timeout = Duration::from_secs(config.service.stop_timeout_secs);
    let (errs, err_rx) = ErrorSink::channel();

    let store = ConfigStore::new();
    let listeners = start_listeners(&config, &store, &errs).await?;
    drop(errs);

    let monitor = ServiceMonitor::new(signals).with_stop_timeout(stop_timeout);
    match monitor.run(err_rx, &listeners).await {
        MonitorExit::Signalled { stopped, failed } => {
            tracing::info!(stopped, failed, "Shutdown complete");
            Ok(())
        }
        MonitorExit::Fatal(error) => {
            tracing::error!(error = %error, "Terminated by fatal listener error");
            std::process::exit(1);
        }
    }
}

/// Start every listener and return them in stop order.
async fn start_listeners(
    config: &ServiceConfig,
    store: &ConfigStore,
    errs: &ErrorSink,
) -> Result<Vec<Arc<dyn GracefulListener>>, Box<dyn std::error::Error>> {
    let mut listeners: Vec<Arc<dyn GracefulListener>> = Vec::new();

    let http_addr: SocketAddr = config.http.bind_address.parse()?;
    let http = Arc::new(
        HttpListener::new(
            "bootstrap-http",
            http_addr,
            api::router(store.clone(), config.api.api_key.clone()),
        )
        .with_tls(config.http.tls.clone())
        .with_request_timeout(Duration::from_secs(config.http.request_timeout_secs)),
    );
    http.start(errs.clone());
    listeners.push(http);

    if let Some(grpc_config) = &config.grpc {
        let grpc_addr: SocketAddr = grpc_config.bind_address.parse()?;
        let grpc = Arc::new(GrpcListener::new("bootstrap-grpc", grpc_addr).with_tls(grpc_config.tls.clone()));
        let (_reporter, health) = tonic_health::server::health_reporter();
        grpc.start(
            errs.clone(),
            Some(Box::new(move |server: &mut Server| server.add_service(health))),
        );
        listeners.push(grpc);
    }

    let stream = &config.stream;
    let log = RedisEventLog::connect(&stream.redis_url).await?;
    let member = stream
        .consumer
        .clone()
        .unwrap_or_else(|| config.service.name.clone());
    let settings = ConsumerSettings::new(stream.group.clone(), member)
        .with_batch_size(stream.batch_size)
        .with_block(Duration::from_millis(stream.block_ms))
        .with_backoff(BackoffPolicy::new(stream.backoff_base_ms, stream.backoff_max_ms))
        .with_failure_policy(stream.failure_policy);
    let consumer = Arc::new(StreamConsumer::new(
        "things-consumer",
        Arc::new(log),
        EventDispatcher::new(Arc::new(store.clone())),
        settings,
    ));
    consumer.start(stream.stream.clone(), errs.clone());
    listeners.push(consumer);

    Ok(listeners)
}
