use std::{fmt::Debug, time::Duration};

use anyhow::Result;
use figment::{
    providers::{Format, Yaml},
    Figment,
};
use processor::offer_matcher::OfferMatcherConfig;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const LOCAL_ENV: &str = "local";

fn default_env() -> String {
    LOCAL_ENV.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_env")]
    pub env: String,
    #[serde(default)]
    pub offer_matcher: OfferMatcherConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            env: default_env(),
            offer_matcher: Default::default(),
            telemetry: Default::default(),
        }
    }
}

impl ServerConfig {
    pub fn from_path(path: &str) -> Result<ServerConfig> {
        let config_str = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&config_str)
    }

    fn from_yaml_str(config_str: &str) -> Result<ServerConfig> {
        let config: ServerConfig = Figment::new().merge(Yaml::string(config_str)).extract()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.offer_matcher.validate()?;
        if self.telemetry.metrics_interval.is_zero() {
            return Err(anyhow::anyhow!("metrics_interval must be at least 1 second"));
        }
        if self.telemetry.service_name.trim().is_empty() {
            return Err(anyhow::anyhow!("telemetry service_name must not be empty"));
        }
        Ok(())
    }

    pub fn structured_logging(&self) -> bool {
        self.env != LOCAL_ENV
    }

    pub fn instance_id(&self) -> String {
        self.telemetry
            .instance_id
            .clone()
            .unwrap_or_else(|| format!("{}-{}", self.env, Uuid::new_v4()))
    }
}

fn default_metrics_interval() -> Duration {
    Duration::from_secs(10)
}

fn default_service_name() -> String {
    "offer-matcher".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    // Enable metrics.
    #[serde(default)]
    pub enable_metrics: bool,
    // OpenTelemetry collector grpc endpoint for both traces and metrics.
    // Falls back to OTEL_EXPORTER_OTLP_ENDPOINT or localhost:4317 if empty.
    #[serde(default)]
    pub endpoint: Option<String>,
    // Export spans to the collector.
    #[serde(default)]
    pub enable_tracing: bool,
    // Metrics export interval in seconds.
    #[serde(with = "duration_serde", default = "default_metrics_interval")]
    pub metrics_interval: Duration,
    // Used as the metric attribute "offer_matcher.instance.id".
    #[serde(default)]
    pub instance_id: Option<String>,
    // Reported as "service.name" on exported spans and metrics.
    #[serde(default = "default_service_name")]
    pub service_name: String,
    // EnvFilter directives, e.g. "info,processor=debug". RUST_LOG wins when set.
    #[serde(default)]
    pub log_filter: Option<String>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enable_metrics: false,
            endpoint: None,
            enable_tracing: false,
            metrics_interval: default_metrics_interval(),
            instance_id: None,
            service_name: default_service_name(),
            log_filter: None,
        }
    }
}

mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let seconds = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(seconds))
    }
}
