use anyhow::{Context, Result};
use opentelemetry::{global, trace::TracerProvider, KeyValue};
use opentelemetry_otlp::{SpanExporter, WithExportConfig};
use opentelemetry_sdk::{
    trace::{SdkTracerProvider, TracerProviderBuilder},
    Resource,
};
use tracing::error;
use tracing_subscriber::{filter::LevelFilter, layer::SubscriberExt, EnvFilter, Layer};

use crate::config::ServerConfig;

/// RUST_LOG when set, otherwise `telemetry.log_filter`, otherwise INFO.
pub fn get_env_filter(config: &ServerConfig) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    configured_filter(config.telemetry.log_filter.as_deref())
}

fn configured_filter(directives: Option<&str>) -> Result<EnvFilter> {
    match directives {
        Some(directives) => EnvFilter::try_new(directives)
            .with_context(|| format!("invalid log_filter directives: {directives}")),
        None => Ok(EnvFilter::default().add_directive(LevelFilter::INFO.into())),
    }
}

pub fn get_log_layer<S>(config: &ServerConfig) -> Box<dyn Layer<S> + Send + Sync>
where
    S: for<'a> tracing_subscriber::registry::LookupSpan<'a>,
    S: tracing::Subscriber,
{
    if config.structured_logging() {
        return Box::new(
            tracing_subscriber::fmt::layer()
                .json()
                .with_span_list(false)
                .flatten_event(true)
                .with_current_span(true),
        );
    }

    Box::new(tracing_subscriber::fmt::layer().compact())
}

// Identifies exported spans the same way the meter provider labels metrics.
fn span_resource(config: &ServerConfig) -> Resource {
    Resource::builder()
        .with_service_name(config.telemetry.service_name.clone())
        .with_attribute(KeyValue::new("service.version", env!("CARGO_PKG_VERSION")))
        .with_attribute(KeyValue::new(
            "offer_matcher.instance.id",
            config.instance_id(),
        ))
        .with_attribute(KeyValue::new("deployment.environment", config.env.clone()))
        .build()
}

pub fn setup_tracing(config: &ServerConfig) -> Result<Option<SdkTracerProvider>> {
    let env_filter_layer = get_env_filter(config)?;
    let log_layer = get_log_layer(config);
    let subscriber =
        tracing_subscriber::Registry::default().with(log_layer.with_filter(env_filter_layer));

    if !config.telemetry.enable_tracing {
        if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
            error!("logger was already initiated, continuing: {:?}", e);
        }
        return Ok(None);
    }

    let mut span_exporter = SpanExporter::builder().with_tonic();
    if let Some(endpoint) = &config.telemetry.endpoint {
        span_exporter = span_exporter.with_endpoint(endpoint.clone());
    }
    let span_exporter = span_exporter.build()?;

    let tracer_provider = TracerProviderBuilder::default()
        .with_resource(span_resource(config))
        .with_simple_exporter(span_exporter)
        .build();
    global::set_tracer_provider(tracer_provider.clone());

    let otel_layer = tracing_opentelemetry::layer()
        .with_tracer(tracer_provider.tracer(config.telemetry.service_name.clone()));
    if let Err(e) = tracing::subscriber::set_global_default(subscriber.with(otel_layer)) {
        error!("logger was already initiated, continuing: {:?}", e);
    }

    Ok(Some(tracer_provider))
}
