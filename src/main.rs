use anyhow::{Context, Result};
use std::sync::Arc;
use telemetry::aggregator::AggregationLoop;
use telemetry::analyzer::{default_handlers, HubEventDispatcher, HubEventLoop, SqliteHubRegistry};
use telemetry::api::{create_router, AppState};
use telemetry::codec::AvroCodec;
use telemetry::config::{load_from_env, LogBackend};
use telemetry::log::{EventLog, EventPublisher, JetStreamLog, MemoryLog, NatsClient, StartPosition};
use telemetry::supervisor::LoopSupervisor;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "telemetry=info".into()),
        )
        .init();

    info!("Telemetry pipeline starting...");

    let config = load_from_env().context("Failed to load configuration")?;
    info!(
        backend = ?config.log.backend,
        sensors_topic = %config.topics.sensors,
        hubs_topic = %config.topics.hubs,
        snapshots_topic = %config.topics.snapshots,
        "Configuration loaded"
    );

    let codec = Arc::new(AvroCodec::new().context("Failed to parse Avro schemas")?);

    let event_log: Arc<dyn EventLog> = match config.log.backend {
        LogBackend::Nats => {
            let client = NatsClient::connect(config.log.nats.clone()).await?;
            Arc::new(JetStreamLog::new(client))
        }
        LogBackend::Memory => Arc::new(MemoryLog::new()),
    };

    let publisher = EventPublisher::new(
        Arc::clone(&event_log),
        Arc::clone(&codec),
        config.topics.clone(),
    );

    let mut supervisor = LoopSupervisor::new();

    if config.aggregator.enabled {
        let start = if config.aggregator.replay_on_start {
            StartPosition::Beginning
        } else {
            StartPosition::Committed
        };
        let consumer = event_log
            .subscribe(&config.topics.sensors, &config.aggregator.consumer_name, start)
            .await
            .context("Failed to subscribe to sensor events")?;
        let aggregator = AggregationLoop::new(
            consumer,
            Arc::clone(&codec),
            publisher.clone(),
            &config.aggregator,
        );
        supervisor.spawn("aggregator", aggregator.run(supervisor.shutdown_signal()));
    }

    if config.analyzer.enabled {
        let registry = Arc::new(
            SqliteHubRegistry::new(&config.analyzer.database_path)
                .context("Failed to open hub registry")?,
        );
        info!(database = %config.analyzer.database_path, "Hub registry initialized");

        let dispatcher = HubEventDispatcher::with_handlers(default_handlers(registry));
        let consumer = event_log
            .subscribe(
                &config.topics.hubs,
                &config.analyzer.consumer_name,
                StartPosition::Committed,
            )
            .await
            .context("Failed to subscribe to hub events")?;
        let analyzer =
            HubEventLoop::new(consumer, Arc::clone(&codec), dispatcher, &config.analyzer);
        supervisor.spawn("analyzer", analyzer.run(supervisor.shutdown_signal()));
    }

    let server_handle = if config.collector.enabled {
        let router = create_router(AppState {
            event_publisher: publisher.clone(),
        })
        .layer(CorsLayer::permissive());
        let listener = tokio::net::TcpListener::bind(&config.collector.bind_address)
            .await
            .context("Failed to bind collector address")?;
        info!(address = %config.collector.bind_address, "Collector API listening");

        let mut server_shutdown = supervisor.shutdown_signal();
        Some(tokio::spawn(async move {
            let stopped = async move {
                let _ = server_shutdown.wait_for(|stop| *stop).await;
            };
            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(stopped)
                .await
            {
                error!(error = %e, "Collector API server error");
            }
        }))
    } else {
        None
    };

    // Run until ctrl-c, or until a consumption loop dies
    let result = supervisor
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for ctrl_c signal");
            }
        })
        .await;

    if let Some(handle) = server_handle {
        let _ = handle.await;
    }

    if let Err(e) = event_log.close().await {
        error!(error = %format!("{:#}", e), "Failed to close event log");
    }

    match &result {
        Ok(()) => info!("Telemetry pipeline stopped"),
        Err(e) => error!(error = %format!("{:#}", e), "Telemetry pipeline stopped with error"),
    }
    result
}
