//! Credit Score Service - Main Entry Point
//!
//! Answers prediction requests arriving over NATS request-reply. Requests are
//! handled in parallel up to the configured worker count.

use anyhow::{Context, Result};
use credit_score_service::{
    audit::{FsObjectStore, MemoryObjectStore, ObjectStore},
    config::{AppConfig, LoggingConfig, MetricsSinkKind, StorageBackend},
    consumer::{decode_request, RequestConsumer},
    emitter::{LogMetricsSink, MemoryMetricsSink, MetricsSink},
    error::RequestError,
    metrics::{MetricsReporter, PipelineMetrics},
    models::{ModelLoader, OnnxScoreModel, ScoreModel},
    producer::{NatsMetricsSink, ResponsePublisher},
    service::PredictionService,
    types::Response,
};
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{error, info, info_span, warn, Instrument};

fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(format!("credit_score_service={}", logging.level).parse()?);
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match logging.format.as_str() {
        "json" => builder.json().init(),
        _ => builder.pretty().init(),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = AppConfig::load()?;

    // Initialize logging
    init_tracing(&config.logging)?;
    info!("Starting Credit Score Service");

    // Model and metadata load once; failure ends the process
    let loader = ModelLoader::with_threads(config.model.onnx_threads)?;
    let (model, metadata) = loader
        .load(&config.model)
        .context("Failed to load model artifacts")?;
    let model: Arc<dyn ScoreModel> = Arc::new(OnnxScoreModel::new(model));
    info!(model = %model.name(), version = %metadata.version, "Model ready");

    // Connect to NATS
    let client = async_nats::connect(&config.nats.url).await?;
    info!("Connected to NATS at {}", config.nats.url);

    let store: Arc<dyn ObjectStore> = match config.audit.backend {
        StorageBackend::Filesystem => Arc::new(FsObjectStore::new(config.audit.root_dir.clone())),
        StorageBackend::Memory => Arc::new(MemoryObjectStore::new()),
    };
    let sink: Arc<dyn MetricsSink> = match config.metrics.sink {
        MetricsSinkKind::Log => Arc::new(LogMetricsSink),
        MetricsSinkKind::Nats => Arc::new(NatsMetricsSink::new(
            client.clone(),
            &config.nats.metrics_subject,
            tokio::runtime::Handle::current(),
        )),
        MetricsSinkKind::Memory => Arc::new(MemoryMetricsSink::new()),
    };
    info!(
        backend = ?config.audit.backend,
        strategy = ?config.audit.strategy,
        corrupt_log_policy = ?config.audit.corrupt_log_policy,
        metrics_sink = ?config.metrics.sink,
        "Side effects configured"
    );

    // Initialize metrics
    let metrics = Arc::new(PipelineMetrics::new());
    let service = Arc::new(
        PredictionService::from_config(&config, model, metadata, store, sink)
            .context("Invalid feature order")?
            .with_pipeline_metrics(metrics.clone()),
    );
    info!(
        "Feature normalizer initialized ({} features)",
        service.feature_spec().feature_count()
    );

    // Start metrics reporter
    if config.metrics.report_interval_secs > 0 {
        let reporter = MetricsReporter::new(metrics.clone(), config.metrics.report_interval_secs);
        tokio::spawn(reporter.start());
    }

    let consumer = RequestConsumer::new(
        client.clone(),
        &config.nats.request_subject,
        &config.nats.queue_group,
    );
    let publisher = ResponsePublisher::new(client.clone());

    let num_workers = config.pipeline.workers.max(1);
    info!(
        "Starting request loop with {} parallel workers on {}",
        num_workers,
        consumer.subject()
    );

    // Semaphore to limit concurrent processing
    let semaphore = Arc::new(Semaphore::new(num_workers));
    let mut subscription = consumer.subscribe().await?;

    loop {
        let message = tokio::select! {
            message = subscription.next() => match message {
                Some(message) => message,
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
        };

        // Acquire permit (limits concurrent tasks)
        let permit = semaphore.clone().acquire_owned().await?;

        let service = service.clone();
        let publisher = publisher.clone();
        let span = info_span!("request", request_id = %uuid::Uuid::new_v4());

        tokio::spawn(
            async move {
                let response = match decode_request(&message.payload) {
                    Ok(event) => {
                        let blocking_span = tracing::Span::current();
                        let service = service.clone();
                        tokio::task::spawn_blocking(move || {
                            blocking_span.in_scope(|| service.handle(&event))
                        })
                        .await
                        .unwrap_or_else(|e| {
                            error!(error = %e, "Request handler failed");
                            Response::failure(&RequestError::Internal(e.to_string()))
                        })
                    }
                    Err(e) => {
                        warn!(error = %e, "Failed to decode request");
                        Response::failure(&RequestError::from(e))
                    }
                };

                match message.reply {
                    Some(reply) => {
                        if let Err(e) = publisher.publish(reply, &response).await {
                            error!(error = %e, "Failed to publish response");
                        }
                    }
                    None => warn!(status = response.status_code, "Request had no reply subject"),
                }

                // Release permit when done
                drop(permit);
            }
            .instrument(span),
        );
    }

    // Print final summary
    info!("Service shutting down...");
    service.pipeline_metrics().print_summary();

    Ok(())
}
