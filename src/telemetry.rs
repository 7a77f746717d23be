use std::sync::OnceLock;
use std::time::Duration;

use anyhow::{Context, Result};
use opentelemetry::trace::TracerProvider as _;
use opentelemetry::{global, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::metrics::{PeriodicReader, SdkMeterProvider};
use opentelemetry_sdk::propagation::TraceContextPropagator;
use opentelemetry_sdk::trace::{Tracer, TracerProvider};
use opentelemetry_sdk::{runtime, Resource};
use opentelemetry_semantic_conventions::resource::{SERVICE_NAME, SERVICE_VERSION};
use tracing_opentelemetry::{MetricsLayer, OpenTelemetryLayer};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Registry;

static METER_PROVIDER: OnceLock<SdkMeterProvider> = OnceLock::new();

/// Installs the global subscriber.
///
/// Console logs always go to stderr since stdout carries the line protocol. With an
/// OTLP endpoint, traces and metrics are exported and the console layer is only kept
/// when `console` is set.
pub fn init_telemetry(service_name: &'static str, endpoint: Option<&str>, console: bool) -> Result<()> {
    let service_resource = Resource::new(vec![
        KeyValue::new(SERVICE_NAME, service_name),
        KeyValue::new(SERVICE_VERSION, env!("CARGO_PKG_VERSION")),
    ]);

    let (trace_layer, metrics_layer) = match endpoint {
        Some(endpoint) => {
            let tracer = init_traces(service_name, endpoint, service_resource.clone())?;
            let meter_provider = init_metrics(endpoint, service_resource)?;
            global::set_meter_provider(meter_provider.clone());
            METER_PROVIDER.set(meter_provider.clone()).ok();
            (
                Some(OpenTelemetryLayer::new(tracer)),
                Some(MetricsLayer::new(meter_provider)),
            )
        }
        None => (None, None),
    };
    let console_layer = (endpoint.is_none() || console)
        .then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr));

    global::set_text_map_propagator(TraceContextPropagator::new());
    Registry::default()
        .with(EnvFilter::try_from_default_env().unwrap_or(EnvFilter::new("INFO")))
        .with(console_layer)
        .with(trace_layer)
        .with(metrics_layer)
        .try_init()
        .context("Failed to install the tracing subscriber")
}

/// Flushes pending spans and metrics.
pub fn shutdown_telemetry() {
    global::shutdown_tracer_provider();
    if let Some(meter_provider) = METER_PROVIDER.get() {
        meter_provider.shutdown().ok();
    }
}

fn init_traces(service_name: &'static str, endpoint: &str, resource: Resource) -> Result<Tracer> {
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .with_timeout(Duration::from_secs(15))
        .build()
        .context("Failed to build span exporter")?;

    let tracer_provider = TracerProvider::builder()
        .with_batch_exporter(exporter, runtime::Tokio)
        .with_resource(resource)
        .build();
    let tracer = tracer_provider.tracer(service_name);
    global::set_tracer_provider(tracer_provider);
    Ok(tracer)
}

fn init_metrics(endpoint: &str, resource: Resource) -> Result<SdkMeterProvider> {
    let exporter = opentelemetry_otlp::MetricExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .with_timeout(Duration::from_secs(15))
        .build()
        .context("Failed to build metric exporter")?;

    let reader = PeriodicReader::builder(exporter, runtime::Tokio)
        .with_interval(Duration::from_secs(30))
        .build();
    Ok(SdkMeterProvider::builder()
        .with_reader(reader)
        .with_resource(resource)
        .build())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shutdown_before_init_is_a_no_op() {
        shutdown_telemetry();
        shutdown_telemetry();
        assert!(METER_PROVIDER.get().is_none());
    }
}
