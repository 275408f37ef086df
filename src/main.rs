// Main entry point - Dependency injection and server setup
mod application;
mod domain;
mod infrastructure;
mod presentation;

use anyhow::Context;
use axum::{
    Router,
    routing::{delete, get, post},
};
use std::{net::SocketAddr, sync::Arc};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use crate::application::analysis_service::AnalysisEngine;
use crate::application::ingestion_pipeline::IngestionPipeline;
use crate::application::persistence_gateway::PersistenceGateway;
use crate::infrastructure::config::load_config;
use crate::infrastructure::influx_gateway::InfluxGateway;
use crate::infrastructure::log_gateway::LogGateway;
use crate::infrastructure::mqtt_subscriber::MqttSubscriber;
use crate::presentation::app_state::AppState;
use crate::presentation::handlers::{
    clear_anomaly, health_check, latest_bundle, pipeline_stats, reset_anomalies, stream_bundles,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("robot_monitor=info,tower_http=info")),
        )
        .init();

    let config = load_config().context("Failed to load configuration")?;

    // Persistence (infrastructure layer)
    let gateway: Arc<dyn PersistenceGateway> = if config.influx.enabled {
        tracing::info!("Persisting to InfluxDB at {}", config.influx.host);
        Arc::new(InfluxGateway::new(&config.influx))
    } else {
        tracing::info!("InfluxDB disabled, persistence is log-only");
        Arc::new(LogGateway::default())
    };

    // Analysis and ingestion (application layer)
    let analysis = &config.analysis;
    let engine = AnalysisEngine::new(
        analysis.thresholds.clone(),
        analysis.escalation.clone(),
        analysis.trend.clone(),
        config.pipeline.resolve_after_absent_frames,
    );
    let pipeline = IngestionPipeline::spawn(engine, gateway, &config.pipeline);

    let subscriber = MqttSubscriber::new(&config.mqtt);
    let mqtt_task = tokio::spawn(subscriber.run(pipeline.handle()));

    let state = Arc::new(AppState {
        pipeline: pipeline.handle(),
    });

    // Build router (presentation layer)
    let router = Router::new()
        .route("/healthz", get(health_check))
        .route("/robot/latest", get(latest_bundle))
        .route("/robot/stats", get(pipeline_stats))
        .route("/robot/stream", get(stream_bundles))
        .route("/robot/anomalies/reset", post(reset_anomalies))
        .route("/robot/anomalies/:kind", delete(clear_anomaly))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr: SocketAddr = config
        .http
        .bind
        .parse()
        .with_context(|| format!("Invalid http.bind address {}", config.http.bind))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("Starting robot-monitor service on {}", addr);

    // Draining the pipeline closes the event stream, which lets open
    // /robot/stream connections finish so the server can stop.
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
            }
            tracing::info!("Shutdown requested");
            mqtt_task.abort();
            if let Err(e) = pipeline.shutdown().await {
                tracing::error!("Pipeline shutdown failed: {:#}", e);
            }
        })
        .await?;

    Ok(())
}
