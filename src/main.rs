use std::time::Duration;

use anyhow::{Result, anyhow};
use api_clients::{HttpFleetApi, MapboxDirections};
use background_services::TripMonitor;
use clap::Parser;
use config::Config;
use dotenvy::dotenv;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::{SpanExporter, WithExportConfig};
use opentelemetry_sdk::{Resource, trace::SdkTracerProvider};
use tokio::{select, signal, spawn, sync::broadcast::error::RecvError};
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry};

mod api_clients;
mod background_services;
mod config;
mod model;
mod status_api;
#[cfg(test)]
mod test_support;
mod tracking;
mod utils;

const SERVICE_NAME: &str = "fleet_trip_monitor";

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    _ = dotenv();
    let config = Config::parse();
    config.validate()?;

    let (tracer_provider, _guard) = init_tracing(&config)?;

    let api = HttpFleetApi::new(&config.api_url, config.request_timeout())?;
    let directions = MapboxDirections::new(
        &config.directions_url,
        config.directions_token.clone(),
        config.request_timeout(),
    )?;

    let mut monitor = TripMonitor::new(
        config.trip_id.clone(),
        api,
        directions,
        config.monitor_settings(),
    )
    .spawn();

    let mut notices = monitor.subscribe();
    let notice_forwarder = spawn(async move {
        loop {
            match notices.recv().await {
                Ok(notice) => warn!(kind = ?notice.kind, "{}", notice.message),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "missed trip notices"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let status_server = config.listen.map(|addr| {
        let store = monitor.snapshot_store();
        spawn(async move {
            if let Err(e) = status_api::serve(addr, store).await {
                error!("status endpoint stopped: {e:?}");
            }
        })
    });

    let finished = select! {
        snapshot = monitor.finished() => snapshot,
        res = signal::ctrl_c() => {
            res?;
            info!("interrupted, stopping trip monitor");
            None
        },
    };
    monitor.cancel();
    notice_forwarder.abort();
    if let Some(server) = status_server {
        server.abort();
    }

    let res = match finished {
        Some(snapshot) => match snapshot.load_error {
            Some(load_error) => Err(anyhow!(
                "trip {} could not be loaded: {load_error}",
                snapshot.trip_id
            )),
            None => {
                info!(
                    state = ?snapshot.state,
                    completion = ?snapshot.completion,
                    performed = snapshot.performed.len(),
                    stops = snapshot.stops_total,
                    "trip monitor finished"
                );
                Ok(())
            }
        },
        None => Ok(()),
    };

    if let Some(provider) = tracer_provider {
        if let Err(e) = provider.shutdown() {
            error!("failed to flush spans: {e}");
        }
    }

    res
}

/// Stdout, daily rolling file and, when an OTLP endpoint is configured, span export
fn init_tracing(config: &Config) -> Result<(Option<SdkTracerProvider>, WorkerGuard)> {
    let tracer_provider = config
        .otlp_endpoint
        .as_ref()
        .map(|endpoint| {
            let exporter = SpanExporter::builder()
                .with_tonic()
                .with_endpoint(endpoint)
                .with_timeout(Duration::from_millis(1000))
                .build()?;

            anyhow::Ok(
                SdkTracerProvider::builder()
                    .with_batch_exporter(exporter)
                    .with_resource(Resource::builder().with_service_name(SERVICE_NAME).build())
                    .build(),
            )
        })
        .transpose()?;

    let telemetry_layer = tracer_provider
        .as_ref()
        .map(|provider| tracing_opentelemetry::layer().with_tracer(provider.tracer(SERVICE_NAME)));

    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    let appender = tracing_appender::rolling::daily(&config.log_dir, "fleet_trip_monitor.log");
    let (non_blocking_appender, guard) = tracing_appender::non_blocking(appender);

    // A layer that logs events to rolling files.
    let file_log = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking_appender)
        .with_ansi(false)
        .pretty();

    Registry::default()
        .with(telemetry_layer)
        .with(file_log)
        .with(tracing_subscriber::fmt::layer())
        .with(env_filter)
        .init();

    if let Some(endpoint) = &config.otlp_endpoint {
        info!("exporting spans to {endpoint}");
    }

    Ok((tracer_provider, guard))
}
