//! # Telemetry
//!
//! Console logging through `tracing-subscriber` is always installed, as
//! human-readable multi-line records or as one JSON object per line (see
//! [`LogFormat`]). The filter comes from `RUST_LOG` and defaults to `info`,
//! which includes the per-request events of the logging middleware.
//!
//! OpenTelemetry export is opt-in via cargo features:
//!
//! - `otel-tracing`: spans from `#[tracing::instrument]` on the handler and
//!   repository.
//! - `otel-metrics`: request and error counters, request duration and
//!   children-per-request histograms.
//! - `stdout` / `honeycomb`: where the above are exported to. Honeycomb reads
//!   `HONEYCOMB_ENDPOINT`, `HONEYCOMB_API_KEY`, `HONEYCOMB_DATASET` and
//!   `HONEYCOMB_COMPRESSION` from the environment.
//!
//! ```bash
//! cargo run --bin agent-tree-server --features otel-tracing,stdout -- --database-url ...
//! ```

#[cfg(all(
    any(feature = "honeycomb", feature = "stdout"),
    not(any(feature = "otel-tracing", feature = "otel-metrics"))
))]
compile_error!(
    "The 'honeycomb' and 'stdout' exporters require 'otel-tracing' or 'otel-metrics' to be enabled."
);

use crate::server::config::LogFormat;
use tracing_subscriber::{
    EnvFilter, Layer, fmt::time::ChronoLocal, layer::SubscriberExt, registry::LookupSpan,
    util::SubscriberInitExt,
};

#[cfg(all(feature = "honeycomb", any(feature = "otel-metrics", feature = "otel-tracing")))]
use opentelemetry_otlp::{Compression, Protocol, WithExportConfig, WithTonicConfig};
#[cfg(all(feature = "honeycomb", any(feature = "otel-metrics", feature = "otel-tracing")))]
use tonic::{metadata::MetadataMap, transport::ClientTlsConfig};

#[cfg(any(feature = "otel-metrics", feature = "otel-tracing"))]
use opentelemetry::{InstrumentationScope, KeyValue};
#[cfg(any(feature = "otel-metrics", feature = "otel-tracing"))]
use opentelemetry_sdk::Resource;
#[cfg(any(feature = "otel-metrics", feature = "otel-tracing"))]
use opentelemetry_semantic_conventions as semconv;

#[cfg(feature = "otel-metrics")]
use opentelemetry::metrics::{Counter, Histogram, Meter};
#[cfg(feature = "otel-metrics")]
use opentelemetry_sdk::metrics as sdkmetrics;
#[cfg(feature = "otel-metrics")]
use std::sync::OnceLock;

#[cfg(feature = "otel-tracing")]
use opentelemetry::trace::TracerProvider;
#[cfg(feature = "otel-tracing")]
use opentelemetry_sdk::{propagation::TraceContextPropagator, trace as sdktrace};

#[cfg(any(feature = "otel-metrics", feature = "otel-tracing"))]
const SERVICE_NAME: &str = "agent-tree";
#[cfg(any(feature = "stdout", feature = "honeycomb"))]
const EXPORT_INTERVAL: core::time::Duration = core::time::Duration::from_secs(5);
#[cfg(feature = "honeycomb")]
const EXPORT_TIMEOUT: core::time::Duration = core::time::Duration::from_secs(10);
#[cfg(all(feature = "otel-tracing", any(feature = "stdout", feature = "honeycomb")))]
const MAX_QUEUED_SPANS: usize = 2048;

/// Exporter handles kept alive for the lifetime of the process.
///
/// Without any `otel-*` feature this is an empty struct.
pub struct TelemetryProviders {
    #[cfg(feature = "otel-tracing")]
    tracer_provider: sdktrace::SdkTracerProvider,
    #[cfg(feature = "otel-metrics")]
    meter_provider: sdkmetrics::SdkMeterProvider,
}

impl TelemetryProviders {
    /// Flushes buffered spans and metrics, then stops the exporters.
    ///
    /// Failures go to stderr because the subscriber may already be torn down.
    pub fn shutdown(self) {
        #[cfg(feature = "otel-tracing")]
        report_flush(
            "traces",
            self.tracer_provider
                .force_flush()
                .and_then(|()| self.tracer_provider.shutdown()),
        );

        #[cfg(feature = "otel-metrics")]
        report_flush(
            "metrics",
            self.meter_provider
                .force_flush()
                .and_then(|()| self.meter_provider.shutdown()),
        );
    }
}

#[cfg(any(feature = "otel-metrics", feature = "otel-tracing"))]
fn report_flush<E: core::fmt::Debug>(signal: &str, res: Result<(), E>) {
    if let Err(err) = res {
        eprintln!("Error flushing {signal}: {err:?}");
    }
}

/// Installs the global subscriber. Fails if one is already installed.
pub fn init_telemetry(format: LogFormat) -> anyhow::Result<TelemetryProviders> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry()
        .with(filter)
        .with(console_layer(format));

    #[cfg(feature = "otel-tracing")]
    let (registry, tracer_provider) = {
        opentelemetry::global::set_text_map_propagator(TraceContextPropagator::new());
        let provider = init_tracer()?;
        opentelemetry::global::set_tracer_provider(provider.clone());
        let layer = tracing_opentelemetry::layer()
            .with_tracer(provider.tracer_with_scope(scope()))
            .with_error_records_to_exceptions(true);
        (registry.with(layer), provider)
    };

    #[cfg(feature = "otel-metrics")]
    let (registry, meter_provider) = {
        let provider = init_meter()?;
        opentelemetry::global::set_meter_provider(provider.clone());
        let _ = METRICS.set(Metrics::new(&opentelemetry::global::meter_with_scope(
            scope(),
        )));
        let layer = tracing_opentelemetry::MetricsLayer::new(provider.clone());
        (registry.with(layer), provider)
    };

    registry.try_init()?;

    Ok(TelemetryProviders {
        #[cfg(feature = "otel-tracing")]
        tracer_provider,
        #[cfg(feature = "otel-metrics")]
        meter_provider,
    })
}

fn console_layer<S>(format: LogFormat) -> Box<dyn Layer<S> + Send + Sync + 'static>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    let layer = tracing_subscriber::fmt::layer()
        .with_timer(ChronoLocal::rfc_3339())
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_target(false);

    match format {
        LogFormat::Pretty => layer.pretty().boxed(),
        LogFormat::Json => layer.json().boxed(),
    }
}

#[cfg(any(feature = "otel-metrics", feature = "otel-tracing"))]
fn scope() -> InstrumentationScope {
    InstrumentationScope::builder(SERVICE_NAME)
        .with_version(env!("CARGO_PKG_VERSION"))
        .with_schema_url(semconv::SCHEMA_URL)
        .build()
}

#[cfg(any(feature = "otel-metrics", feature = "otel-tracing"))]
fn resource() -> Resource {
    Resource::builder()
        .with_service_name(SERVICE_NAME)
        .with_schema_url(
            [KeyValue::new(
                semconv::resource::SERVICE_VERSION,
                env!("CARGO_PKG_VERSION"),
            )],
            semconv::SCHEMA_URL,
        )
        .build()
}

/// OTLP-over-gRPC settings for Honeycomb, read from the environment.
#[cfg(all(feature = "honeycomb", any(feature = "otel-metrics", feature = "otel-tracing")))]
struct Honeycomb {
    endpoint: String,
    compression: Compression,
    metadata: MetadataMap,
}

#[cfg(all(feature = "honeycomb", any(feature = "otel-metrics", feature = "otel-tracing")))]
impl Honeycomb {
    fn from_env() -> anyhow::Result<Self> {
        use anyhow::Context;
        use std::str::FromStr;

        let var = |key: &str| std::env::var(key).with_context(|| format!("missing `{key}`"));

        let mut metadata = MetadataMap::new();
        metadata.insert(
            "x-honeycomb-team",
            var("HONEYCOMB_API_KEY")?
                .parse()
                .context("invalid `HONEYCOMB_API_KEY`")?,
        );
        metadata.insert(
            "x-honeycomb-dataset",
            var("HONEYCOMB_DATASET")?
                .parse()
                .context("invalid `HONEYCOMB_DATASET`")?,
        );

        let compression =
            Compression::from_str(&var("HONEYCOMB_COMPRESSION")?.to_ascii_lowercase())?;

        Ok(Self {
            endpoint: var("HONEYCOMB_ENDPOINT")?,
            compression,
            metadata,
        })
    }
}

#[cfg(all(feature = "otel-tracing", any(feature = "stdout", feature = "honeycomb")))]
fn batched<E>(exporter: E) -> sdktrace::BatchSpanProcessor
where
    E: sdktrace::SpanExporter + 'static,
{
    sdktrace::BatchSpanProcessor::builder(exporter)
        .with_batch_config(
            sdktrace::BatchConfigBuilder::default()
                .with_scheduled_delay(EXPORT_INTERVAL)
                .with_max_queue_size(MAX_QUEUED_SPANS)
                .build(),
        )
        .build()
}

#[cfg(feature = "otel-tracing")]
fn init_tracer() -> anyhow::Result<sdktrace::SdkTracerProvider> {
    let builder = sdktrace::SdkTracerProvider::builder().with_resource(resource());

    #[cfg(feature = "stdout")]
    let builder = builder.with_span_processor(batched(opentelemetry_stdout::SpanExporter::default()));

    #[cfg(feature = "honeycomb")]
    let builder = {
        use anyhow::Context;

        let hc = Honeycomb::from_env()?;
        let exporter = opentelemetry_otlp::SpanExporter::builder()
            .with_tonic()
            .with_tls_config(ClientTlsConfig::new().with_native_roots())
            .with_metadata(hc.metadata)
            .with_timeout(EXPORT_TIMEOUT)
            .with_compression(hc.compression)
            .with_endpoint(hc.endpoint)
            .with_protocol(Protocol::Grpc)
            .build()
            .context("failed to build span exporter")?;
        builder.with_span_processor(batched(exporter))
    };

    Ok(builder.build())
}

#[cfg(feature = "otel-metrics")]
fn init_meter() -> anyhow::Result<sdkmetrics::SdkMeterProvider> {
    let builder = sdkmetrics::SdkMeterProvider::builder().with_resource(resource());

    #[cfg(feature = "stdout")]
    let builder = builder.with_reader(
        sdkmetrics::PeriodicReader::builder(opentelemetry_stdout::MetricExporter::default())
            .with_interval(EXPORT_INTERVAL)
            .build(),
    );

    #[cfg(feature = "honeycomb")]
    let builder = {
        use anyhow::Context;

        let hc = Honeycomb::from_env()?;
        let exporter = opentelemetry_otlp::MetricExporter::builder()
            .with_tonic()
            .with_tls_config(ClientTlsConfig::new().with_native_roots())
            .with_metadata(hc.metadata)
            .with_timeout(EXPORT_TIMEOUT)
            .with_compression(hc.compression)
            .with_endpoint(hc.endpoint)
            .with_protocol(Protocol::Grpc)
            .with_temporality(sdkmetrics::Temporality::Delta)
            .build()
            .context("failed to build metric exporter")?;
        builder.with_reader(
            sdkmetrics::PeriodicReader::builder(exporter)
                .with_interval(EXPORT_INTERVAL)
                .build(),
        )
    };

    Ok(builder.build())
}

#[cfg(feature = "otel-metrics")]
struct Metrics {
    requests: Counter<u64>,
    errors: Counter<u64>,
    duration_ms: Histogram<f64>,
    children: Histogram<f64>,
}

#[cfg(feature = "otel-metrics")]
static METRICS: OnceLock<Metrics> = OnceLock::new();

#[cfg(feature = "otel-metrics")]
impl Metrics {
    fn new(meter: &Meter) -> Self {
        Self {
            requests: meter
                .u64_counter("agent_tree.requests")
                .with_description("Child-agent lookups received")
                .build(),
            errors: meter
                .u64_counter("agent_tree.errors")
                .with_description("Lookups answered with an error status")
                .build(),
            duration_ms: meter
                .f64_histogram("agent_tree.request_duration")
                .with_unit("ms")
                .with_description("Time spent in the endpoint per lookup")
                .build(),
            children: meter
                .f64_histogram("agent_tree.children_per_request")
                .with_description("Child ids returned per successful lookup")
                .build(),
        }
    }
}

#[cfg(feature = "otel-metrics")]
fn with_metrics(f: impl FnOnce(&Metrics)) {
    if let Some(metrics) = METRICS.get() {
        f(metrics);
    }
}

// The recorders below are no-ops unless `otel-metrics` is enabled.

pub fn increment_requests() {
    #[cfg(feature = "otel-metrics")]
    with_metrics(|m| m.requests.add(1, &[]));
}

pub fn increment_request_errors() {
    #[cfg(feature = "otel-metrics")]
    with_metrics(|m| m.errors.add(1, &[]));
}

#[cfg_attr(not(feature = "otel-metrics"), allow(unused_variables))]
pub fn record_request_duration(duration_ms: f64) {
    #[cfg(feature = "otel-metrics")]
    with_metrics(|m| m.duration_ms.record(duration_ms, &[]));
}

#[cfg_attr(not(feature = "otel-metrics"), allow(unused_variables))]
pub fn record_children_per_request(count: f64) {
    #[cfg(feature = "otel-metrics")]
    with_metrics(|m| m.children.record(count, &[]));
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::Registry;

    #[test]
    fn recorders_are_safe_before_init() {
        increment_requests();
        increment_request_errors();
        record_request_duration(1.5);
        record_children_per_request(4.0);
    }

    #[test]
    fn console_layer_builds_for_every_format() {
        for format in [LogFormat::Pretty, LogFormat::Json] {
            let _layer = console_layer::<Registry>(format);
        }
    }
}
