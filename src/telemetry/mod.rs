//! Logging and OpenTelemetry setup.
//!
//! Log lines always go to stderr through the fmt layer. With an OTLP
//! endpoint the submission spans, queue metrics and log records are also
//! exported over gRPC.

pub mod metrics;
pub mod submit;

use opentelemetry_sdk::Resource;
use opentelemetry_sdk::logs::SdkLoggerProvider;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use opentelemetry_sdk::trace::SdkTracerProvider;
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::error::{Error, Result};

const TRACER_NAME: &str = "didlist";

/// Configuration for telemetry initialization.
pub struct TelemetryConfig {
    /// OTLP gRPC endpoint, e.g. "http://localhost:4317".
    pub endpoint: Option<String>,
    pub service_name: String,
    /// Filter used when `RUST_LOG` is unset (e.g. "info", "didlist=debug").
    pub log_level: String,
}

impl TelemetryConfig {
    pub fn from_config(config: &Config, service_name: impl Into<String>) -> Self {
        Self {
            endpoint: config.otel_endpoint.clone(),
            service_name: service_name.into(),
            log_level: config.log_level.clone(),
        }
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&self.log_level))
            .unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

/// The three OTLP providers, built together from one endpoint.
struct Exporters {
    tracer: SdkTracerProvider,
    meter: SdkMeterProvider,
    logger: SdkLoggerProvider,
}

impl Exporters {
    fn build(endpoint: &str, service_name: String) -> Result<Self> {
        use opentelemetry_otlp::{LogExporter, MetricExporter, SpanExporter, WithExportConfig as _};

        let resource = Resource::builder().with_service_name(service_name).build();

        let spans = SpanExporter::builder()
            .with_tonic()
            .with_endpoint(endpoint)
            .build()
            .map_err(|e| exporter_error("span", e))?;
        let tracer = SdkTracerProvider::builder()
            .with_batch_exporter(spans)
            .with_resource(resource.clone())
            .build();

        let metrics = MetricExporter::builder()
            .with_tonic()
            .with_endpoint(endpoint)
            .build()
            .map_err(|e| exporter_error("metric", e))?;
        let meter = SdkMeterProvider::builder()
            .with_periodic_exporter(metrics)
            .with_resource(resource.clone())
            .build();

        let logs = LogExporter::builder()
            .with_tonic()
            .with_endpoint(endpoint)
            .build()
            .map_err(|e| exporter_error("log", e))?;
        let logger = SdkLoggerProvider::builder()
            .with_batch_exporter(logs)
            .with_resource(resource)
            .build();

        Ok(Self {
            tracer,
            meter,
            logger,
        })
    }

    fn flush(&self) {
        let _ = self.tracer.force_flush();
        let _ = self.meter.force_flush();
        let _ = self.logger.force_flush();
    }

    /// Loggers first so records emitted while shutting down spans still go out.
    fn shutdown(self) {
        let _ = self.logger.shutdown();
        let _ = self.meter.shutdown();
        let _ = self.tracer.shutdown();
    }
}

fn exporter_error(signal: &str, e: impl std::fmt::Display) -> Error {
    Error::Other(format!("failed to create OTLP {signal} exporter: {e}"))
}

/// Keeps the OTLP pipelines alive. Hold it until the process exits; dropping
/// it flushes and shuts them down.
pub struct TelemetryGuard {
    exporters: Option<Exporters>,
}

impl TelemetryGuard {
    /// Whether an OTLP endpoint is receiving telemetry.
    pub fn is_exporting(&self) -> bool {
        self.exporters.is_some()
    }

    /// Push out everything buffered so far. Called after the final save.
    pub fn force_flush(&self) {
        if let Some(exporters) = &self.exporters {
            exporters.flush();
        }
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if let Some(exporters) = self.exporters.take() {
            exporters.shutdown();
        }
    }
}

/// Install the global subscriber (and meter provider when exporting).
///
/// # Errors
///
/// Fails when an exporter cannot be built or a global subscriber is
/// already installed.
pub fn init_telemetry(config: TelemetryConfig) -> Result<TelemetryGuard> {
    use opentelemetry::trace::TracerProvider as _;
    use tracing_subscriber::layer::SubscriberExt as _;
    use tracing_subscriber::util::SubscriberInitExt as _;

    let filter = config.filter();
    let fmt = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let Some(endpoint) = config.endpoint else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt)
            .try_init()
            .map_err(|e| Error::Other(format!("failed to init tracing subscriber: {e}")))?;
        return Ok(TelemetryGuard { exporters: None });
    };

    let exporters = Exporters::build(&endpoint, config.service_name)?;
    opentelemetry::global::set_meter_provider(exporters.meter.clone());

    let traces = tracing_opentelemetry::layer().with_tracer(exporters.tracer.tracer(TRACER_NAME));
    let logs =
        opentelemetry_appender_tracing::layer::OpenTelemetryTracingBridge::new(&exporters.logger);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt.compact())
        .with(traces)
        .with(logs)
        .try_init()
        .map_err(|e| Error::Other(format!("failed to init tracing subscriber: {e}")))?;

    Ok(TelemetryGuard {
        exporters: Some(exporters),
    })
}
