//! Logging and OpenTelemetry initialization.
//!
//! Installs a tracing-subscriber registry with an env filter and a fmt layer
//! (compact or JSON) on stdout. A configured log directory gets a second fmt
//! layer writing `beaver.log`. If an OTLP endpoint is configured, traces,
//! metrics and logs are exported there as well.

pub mod job;
pub mod metrics;

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::Subscriber;
use tracing_subscriber::Layer;
use tracing_subscriber::registry::LookupSpan;

/// File name written inside the configured log directory.
pub const LOG_FILE_NAME: &str = "beaver.log";

/// Log line encoding for the fmt layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable compact lines.
    #[default]
    Console,
    /// One JSON object per line.
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "console" => Ok(LogFormat::Console),
            "json" => Ok(LogFormat::Json),
            other => Err(Error::Config(format!(
                "logging encoding must be either json or console, got {other:?}"
            ))),
        }
    }
}

/// Configuration for telemetry initialization.
pub struct TelemetryConfig {
    /// Optional OTLP endpoint (e.g. "http://localhost:4317").
    /// When `None`, only the fmt layers are installed.
    pub endpoint: Option<String>,
    /// The service name reported in telemetry signals.
    pub service_name: String,
    /// Default filter directive when `RUST_LOG` is unset (e.g. "info").
    pub level: String,
    pub format: LogFormat,
    /// Directory for `beaver.log`, written in addition to stdout.
    pub path: Option<PathBuf>,
}

/// Map a configured level onto a filter directive. `fatal` has no tracing
/// counterpart and filters like `error`.
pub fn filter_level(level: &str) -> String {
    let level = level.to_ascii_lowercase();
    if level == "fatal" {
        "error".to_string()
    } else {
        level
    }
}

/// Root span carrying the fixed `hostname` and `pid` fields.
///
/// Work spawned while it is entered (the worker pool included) nests under
/// it, so every line logged there carries both fields.
pub fn process_span() -> tracing::Span {
    tracing::info_span!("process", hostname = %hostname(), pid = std::process::id())
}

fn hostname() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .or_else(|| std::fs::read_to_string("/etc/hostname").ok())
        .map(|h| h.trim().to_string())
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Open `<dir>/beaver.log` for appending, creating the directory if needed.
pub fn open_log_file(dir: &Path) -> Result<File> {
    std::fs::create_dir_all(dir)?;
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(dir.join(LOG_FILE_NAME))?;
    Ok(file)
}

/// A fmt layer writing to `<dir>/beaver.log` in the given encoding, without
/// ANSI colours.
pub fn file_layer<S>(dir: &Path, format: LogFormat) -> Result<Box<dyn Layer<S> + Send + Sync>>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    let writer = Mutex::new(open_log_file(dir)?);
    let layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(writer);
    Ok(match format {
        LogFormat::Console => layer.compact().boxed(),
        LogFormat::Json => layer.json().boxed(),
    })
}

/// OTel providers behind the OTLP export pipelines.
struct OtlpProviders {
    tracer: opentelemetry_sdk::trace::SdkTracerProvider,
    meter: opentelemetry_sdk::metrics::SdkMeterProvider,
    logger: opentelemetry_sdk::logs::SdkLoggerProvider,
}

impl OtlpProviders {
    /// Build span, metric and log exporters against one endpoint and install
    /// the meter provider globally.
    fn connect(endpoint: &str, service_name: &str) -> Result<Self> {
        use opentelemetry_otlp::WithExportConfig as _;

        let resource = opentelemetry_sdk::Resource::builder()
            .with_service_name(service_name.to_string())
            .build();
        let exporter_error =
            |signal: &str, e: opentelemetry_otlp::ExporterBuildError| {
                Error::Other(format!("failed to create OTLP {signal} exporter: {e}"))
            };

        let spans = opentelemetry_otlp::SpanExporter::builder()
            .with_tonic()
            .with_endpoint(endpoint)
            .build()
            .map_err(|e| exporter_error("span", e))?;
        let metrics = opentelemetry_otlp::MetricExporter::builder()
            .with_tonic()
            .with_endpoint(endpoint)
            .build()
            .map_err(|e| exporter_error("metric", e))?;
        let logs = opentelemetry_otlp::LogExporter::builder()
            .with_tonic()
            .with_endpoint(endpoint)
            .build()
            .map_err(|e| exporter_error("log", e))?;

        let providers = Self {
            tracer: opentelemetry_sdk::trace::SdkTracerProvider::builder()
                .with_batch_exporter(spans)
                .with_resource(resource.clone())
                .build(),
            meter: opentelemetry_sdk::metrics::SdkMeterProvider::builder()
                .with_periodic_exporter(metrics)
                .with_resource(resource.clone())
                .build(),
            logger: opentelemetry_sdk::logs::SdkLoggerProvider::builder()
                .with_batch_exporter(logs)
                .with_resource(resource)
                .build(),
        };
        opentelemetry::global::set_meter_provider(providers.meter.clone());
        Ok(providers)
    }
}

/// Guard that shuts down OTel providers on drop.
///
/// Must be held for the lifetime of the application.
pub struct TelemetryGuard {
    providers: Option<OtlpProviders>,
}

impl TelemetryGuard {
    /// Force-flush all telemetry pipelines.
    pub fn force_flush(&self) {
        if let Some(ref p) = self.providers {
            let _ = p.tracer.force_flush();
            let _ = p.meter.force_flush();
            let _ = p.logger.force_flush();
        }
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if let Some(p) = self.providers.take() {
            let _ = p.logger.shutdown();
            let _ = p.meter.shutdown();
            let _ = p.tracer.shutdown();
        }
    }
}

/// Initialize logging, and OTLP export when an endpoint is set.
///
/// # Errors
///
/// Returns an error if the log file cannot be opened, an OTLP exporter fails
/// to build, or a global subscriber is already installed.
pub fn init_telemetry(config: TelemetryConfig) -> Result<TelemetryGuard> {
    use opentelemetry::trace::TracerProvider as _;
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::layer::SubscriberExt as _;
    use tracing_subscriber::util::SubscriberInitExt as _;

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_level(&config.level)));

    let stdout_layer = match config.format {
        LogFormat::Console => tracing_subscriber::fmt::layer().compact().boxed(),
        LogFormat::Json => tracing_subscriber::fmt::layer().json().boxed(),
    };
    let log_file_layer = config
        .path
        .as_deref()
        .map(|dir| file_layer(dir, config.format))
        .transpose()?;

    let providers = config
        .endpoint
        .as_deref()
        .map(|endpoint| OtlpProviders::connect(endpoint, &config.service_name))
        .transpose()?;
    let otel_trace_layer = providers
        .as_ref()
        .map(|p| tracing_opentelemetry::layer().with_tracer(p.tracer.tracer("beaver-rs")));
    let otel_log_layer = providers.as_ref().map(|p| {
        opentelemetry_appender_tracing::layer::OpenTelemetryTracingBridge::new(&p.logger)
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(log_file_layer)
        .with(otel_trace_layer)
        .with(otel_log_layer)
        .try_init()
        .map_err(|e| Error::Other(format!("failed to init tracing subscriber: {e}")))?;

    Ok(TelemetryGuard { providers })
}
