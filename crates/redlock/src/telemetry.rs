use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::{Error, Result};

/// Output format of the log layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Full,
    Compact,
}

/// Configuration for the telemetry subsystem.
///
/// Installs a global `tracing` subscriber with an `EnvFilter` and a fmt layer.
/// With the `otlp` feature and an endpoint set, spans are also exported over
/// OTLP/gRPC.
#[derive(Debug)]
pub struct TelemetryConfig {
    service_name: String,
    otlp_endpoint: Option<String>,
    log_level: String,
    format: LogFormat,
}

impl TelemetryConfig {
    /// Creates a new configuration builder with default settings.
    pub fn builder() -> TelemetryConfigBuilder {
        TelemetryConfigBuilder::default()
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    /// Initializes the telemetry subsystem with this configuration.
    ///
    /// # Errors
    /// [`Error::Telemetry`] if the filter does not parse, the exporter cannot
    /// be built, or a global subscriber is already set.
    pub fn init(self) -> Result<()> {
        let filter = EnvFilter::try_new(&self.log_level)
            .map_err(|e| Error::Telemetry(format!("invalid log level '{}': {e}", self.log_level)))?;

        let (full, compact) = match self.format {
            LogFormat::Full => (Some(tracing_subscriber::fmt::layer()), None),
            LogFormat::Compact => (None, Some(tracing_subscriber::fmt::layer().compact())),
        };

        let registry = tracing_subscriber::registry()
            .with(filter)
            .with(full)
            .with(compact);

        #[cfg(feature = "otlp")]
        let registry = registry.with(self.otlp_layer()?);

        registry
            .try_init()
            .map_err(|e| Error::Telemetry(e.to_string()))
    }

    #[cfg(feature = "otlp")]
    fn otlp_layer<S>(
        &self,
    ) -> Result<Option<tracing_opentelemetry::OpenTelemetryLayer<S, opentelemetry_sdk::trace::Tracer>>>
    where
        S: tracing::Subscriber + for<'span> tracing_subscriber::registry::LookupSpan<'span>,
    {
        use opentelemetry_otlp::WithExportConfig;
        use opentelemetry_sdk::propagation::TraceContextPropagator;

        let Some(endpoint) = self.otlp_endpoint.clone() else {
            return Ok(None);
        };

        opentelemetry::global::set_text_map_propagator(TraceContextPropagator::new());

        let exporter = opentelemetry_otlp::new_exporter()
            .tonic()
            .with_endpoint(endpoint);

        let tracer = opentelemetry_otlp::new_pipeline()
            .tracing()
            .with_exporter(exporter)
            .with_trace_config(opentelemetry_sdk::trace::config().with_resource(
                opentelemetry_sdk::Resource::new(vec![opentelemetry::KeyValue::new(
                    "service.name",
                    self.service_name.clone(),
                )]),
            ))
            .install_batch(opentelemetry_sdk::runtime::Tokio)
            .map_err(|e| Error::Telemetry(e.to_string()))?;

        Ok(Some(tracing_opentelemetry::layer().with_tracer(tracer)))
    }
}

/// Builder for `TelemetryConfig`.
#[derive(Default)]
pub struct TelemetryConfigBuilder {
    service_name: Option<String>,
    otlp_endpoint: Option<String>,
    log_level: Option<String>,
    format: Option<LogFormat>,
}

impl TelemetryConfigBuilder {
    /// Sets the service name.
    pub fn service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = Some(name.into());
        self
    }

    /// Sets the OTLP endpoint URL. Only used with the `otlp` feature.
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.otlp_endpoint = Some(endpoint.into());
        self
    }

    /// Sets the filter directive (default: "info").
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = Some(level.into());
        self
    }

    /// Sets the log format (default: Full).
    pub fn format(mut self, format: LogFormat) -> Self {
        self.format = Some(format);
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> TelemetryConfig {
        TelemetryConfig {
            service_name: self
                .service_name
                .unwrap_or_else(|| "redlock-unknown".to_string()),
            otlp_endpoint: self.otlp_endpoint,
            log_level: self.log_level.unwrap_or_else(|| "info".to_string()),
            format: self.format.unwrap_or(LogFormat::Full),
        }
    }
}

/// Shuts down the OTLP exporter, flushing pending spans.
#[cfg(feature = "otlp")]
pub fn shutdown_tracing() {
    opentelemetry::global::shutdown_tracer_provider();
}
