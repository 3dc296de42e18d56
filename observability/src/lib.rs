//! # Logging and OpenTelemetry helpers
//!
//! Every binary in the workspace calls [init_opentelemetry] once at startup.

mod compact_fmt;
mod request;

use std::borrow::Cow;
use std::time::Duration;

use error_stack::{Result, ResultExt};
use opentelemetry::trace::TracerProvider as _;
use opentelemetry::{global, InstrumentationScope};
use opentelemetry_otlp::{MetricExporter, SpanExporter};
use opentelemetry_sdk::metrics::{MeterProviderBuilder, PeriodicReader, SdkMeterProvider};
use opentelemetry_sdk::resource::{ResourceDetector, SdkProvidedResourceDetector};
use opentelemetry_sdk::trace::TracerProvider;
use opentelemetry_sdk::Resource;
use tracing::Subscriber;
use tracing_opentelemetry::MetricsLayer;
use tracing_subscriber::{prelude::*, registry::LookupSpan, EnvFilter, Layer};

pub use opentelemetry::metrics::{Counter, Histogram, Meter};
pub use opentelemetry::KeyValue;

pub use self::request::{RecordRequest, RecordedRequest, RequestMetrics};

const OTEL_SDK_DISABLED: &str = "OTEL_SDK_DISABLED";
const LOG_FORMAT: &str = "RUST_LOG_FORMAT";
const DEFAULT_FILTER: &str = "info";
const METRICS_EXPORT_INTERVAL: Duration = Duration::from_secs(10);

pub type BoxedLayer<S> = Box<dyn Layer<S> + Send + Sync>;

#[derive(Debug)]
pub struct OpenTelemetryInitError;

impl error_stack::Context for OpenTelemetryInitError {}

impl std::fmt::Display for OpenTelemetryInitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("failed to initialize opentelemetry")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Single-line colored output.
    Compact,
    /// One json object per line.
    Json,
}

/// Telemetry settings read from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// Export traces and metrics over OTLP.
    pub export: bool,
    pub log_format: LogFormat,
}

impl TelemetryConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Export stays off unless `OTEL_SDK_DISABLED=false`.
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let export = lookup(OTEL_SDK_DISABLED).is_some_and(|value| value == "false");
        let log_format = match lookup(LOG_FORMAT).as_deref() {
            Some("json") => LogFormat::Json,
            _ => LogFormat::Compact,
        };

        Self { export, log_format }
    }
}

pub fn meter(name: &'static str) -> Meter {
    global::meter(name)
}

/// Install the global tracing subscriber.
///
/// Logs go to stdout, filtered by `RUST_LOG` (default `info`), in the compact
/// format or as json lines with `RUST_LOG_FORMAT=json`. Traces and metrics are
/// exported over OTLP only with `OTEL_SDK_DISABLED=false`.
///
/// ```rs
/// use header_ledger_observability::init_opentelemetry;
///
/// init_opentelemetry(env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")).unwrap();
/// ```
pub fn init_opentelemetry(
    package_name: impl Into<Cow<'static, str>>,
    package_version: impl Into<Cow<'static, str>>,
) -> Result<(), OpenTelemetryInitError> {
    let config = TelemetryConfig::from_env();

    let mut layers = vec![log_layer(config.log_format)];
    if config.export {
        let scope = InstrumentationScope::builder(package_name.into())
            .with_version(package_version.into())
            .build();
        layers.push(export_layer(scope)?);
    }

    tracing_subscriber::registry()
        .with(layers)
        .try_init()
        .change_context(OpenTelemetryInitError)
        .attach_printable("failed to install global subscriber")
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

fn log_layer<S>(format: LogFormat) -> BoxedLayer<S>
where
    S: Subscriber,
    for<'a> S: LookupSpan<'a>,
{
    match format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_target(true)
            .json()
            .with_filter(env_filter())
            .boxed(),
        LogFormat::Compact => tracing_subscriber::fmt::layer()
            .with_ansi(true)
            .event_format(compact_fmt::CompactFormat::default())
            .fmt_fields(compact_fmt::CompactFormat::default())
            .with_filter(env_filter())
            .boxed(),
    }
}

fn export_layer<S>(scope: InstrumentationScope) -> Result<BoxedLayer<S>, OpenTelemetryInitError>
where
    S: Subscriber + Send + Sync,
    for<'a> S: LookupSpan<'a>,
{
    let resource = SdkProvidedResourceDetector.detect(Duration::from_secs(1));

    let tracer = tracer_provider(resource.clone())?.tracer_with_scope(scope);
    let meter_provider = meter_provider(resource)?;
    global::set_meter_provider(meter_provider.clone());

    Ok(tracing_opentelemetry::layer()
        .with_tracer(tracer)
        .and_then(MetricsLayer::new(meter_provider))
        .and_then(env_filter())
        .boxed())
}

fn tracer_provider(resource: Resource) -> Result<TracerProvider, OpenTelemetryInitError> {
    let exporter = SpanExporter::builder()
        .with_tonic()
        .build()
        .change_context(OpenTelemetryInitError)
        .attach_printable("failed to create span exporter")?;

    Ok(TracerProvider::builder()
        .with_resource(resource)
        .with_batch_exporter(exporter, opentelemetry_sdk::runtime::Tokio)
        .build())
}

fn meter_provider(resource: Resource) -> Result<SdkMeterProvider, OpenTelemetryInitError> {
    let exporter = MetricExporter::builder()
        .with_tonic()
        .build()
        .change_context(OpenTelemetryInitError)
        .attach_printable("failed to create metrics exporter")?;

    let reader = PeriodicReader::builder(exporter, opentelemetry_sdk::runtime::Tokio)
        .with_interval(METRICS_EXPORT_INTERVAL)
        .build();

    Ok(MeterProviderBuilder::default()
        .with_resource(resource)
        .with_reader(reader)
        .build())
}
