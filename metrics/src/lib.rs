use std::time::{Duration, Instant};

use anyhow::Result;
use opentelemetry::{metrics::Histogram, KeyValue};
use opentelemetry_otlp::{MetricExporter, WithExportConfig};
use opentelemetry_sdk::{
    metrics::{PeriodicReader, SdkMeterProvider},
    Resource,
};
use tracing::info;

pub fn low_latency_boundaries() -> Vec<f64> {
    vec![
        0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 25.0, 50.0, 75.0, 100.0, 250.0,
        500.0, 750.0, 1000.0, 2500.0, 5000.0, 7500.0, 10000.0,
    ]
}

pub fn init_provider(
    enable_metrics: bool,
    endpoint: Option<&String>,
    interval: Duration,
    service_name: &str,
    instance_id: &str,
    service_version: &str,
) -> Result<Option<SdkMeterProvider>> {
    if !enable_metrics {
        return Ok(None);
    }

    let resource = Resource::builder()
        .with_attribute(KeyValue::new("service.namespace", "offer-matcher"))
        .with_attribute(KeyValue::new("service.name", service_name.to_string()))
        .with_attribute(KeyValue::new(
            "service.version",
            service_version.to_string(),
        ))
        .with_attribute(KeyValue::new(
            "offer_matcher.instance.id",
            instance_id.to_string(),
        ))
        .build();

    let mut exporter = MetricExporter::builder().with_tonic();
    if let Some(endpoint) = endpoint {
        exporter = exporter.with_endpoint(endpoint.to_owned());
    }
    let exporter = exporter.build()?;

    let reader = PeriodicReader::builder(exporter)
        .with_interval(interval)
        .build();

    let provider = SdkMeterProvider::builder()
        .with_resource(resource)
        .with_reader(reader)
        .build();

    opentelemetry::global::set_meter_provider(provider.clone());
    info!(interval_secs = interval.as_secs(), "metrics exporter started");
    Ok(Some(provider))
}

pub trait TimerUpdate {
    fn add(&self, duration: Duration, labels: &[KeyValue]);
}

impl TimerUpdate for Histogram<f64> {
    fn add(&self, duration: Duration, labels: &[KeyValue]) {
        self.record(duration.as_secs_f64(), labels);
    }
}

/// Records the time between `start` and drop into `metric`.
pub struct Timer<'a, T: TimerUpdate + Sync> {
    start: Instant,
    metric: &'a T,
}

impl<'a, T: TimerUpdate + Sync> Timer<'a, T> {
    pub fn start(metric: &'a T) -> Self {
        Self {
            start: Instant::now(),
            metric,
        }
    }
}

impl<'a, T: TimerUpdate + Sync> Drop for Timer<'a, T> {
    fn drop(&mut self) {
        self.metric.add(self.start.elapsed(), &[]);
    }
}

pub mod offer_matcher {
    use opentelemetry::metrics::{Counter, Histogram};

    use crate::low_latency_boundaries;

    #[derive(Debug, Clone)]
    pub struct Metrics {
        pub tasks_launched: Counter<u64>,
        pub tasks_launched_per_offer: Histogram<u64>,
        pub offers_used: Counter<u64>,
        pub offers_declined: Counter<u64>,
        pub offer_match_errors: Counter<u64>,
        pub match_offers_duration: Histogram<f64>,
        pub commit_duration: Histogram<f64>,
    }

    impl Default for Metrics {
        fn default() -> Self {
            Self::new()
        }
    }

    impl Metrics {
        pub fn new() -> Metrics {
            let meter = opentelemetry::global::meter("offer-matcher");

            let tasks_launched = meter
                .u64_counter("offer_matcher.tasks_launched")
                .with_description("number of tasks launched onto offers")
                .build();

            let tasks_launched_per_offer = meter
                .u64_histogram("offer_matcher.tasks_launched_per_offer")
                .with_boundaries(vec![1.0, 2.0, 3.0, 5.0, 8.0, 13.0, 21.0, 50.0, 100.0])
                .with_description("number of tasks packed onto a single used offer")
                .build();

            let offers_used = meter
                .u64_counter("offer_matcher.offers_used")
                .with_description("number of offers that received at least one task")
                .build();

            let offers_declined = meter
                .u64_counter("offer_matcher.offers_declined")
                .with_description("number of offers declined without tasks")
                .build();

            let offer_match_errors = meter
                .u64_counter("offer_matcher.offer_match_errors")
                .with_description("number of offers exhausted because matching failed")
                .build();

            let match_offers_duration = meter
                .f64_histogram("offer_matcher.match_offers_duration")
                .with_unit("s")
                .with_boundaries(low_latency_boundaries())
                .with_description("time spent packing tasks onto a batch of offers in seconds")
                .build();

            let commit_duration = meter
                .f64_histogram("offer_matcher.commit_duration")
                .with_unit("s")
                .with_boundaries(low_latency_boundaries())
                .with_description("time spent issuing launch and decline commands in seconds")
                .build();

            Metrics {
                tasks_launched,
                tasks_launched_per_offer,
                offers_used,
                offers_declined,
                offer_match_errors,
                match_offers_duration,
                commit_duration,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct RecordedDurations(Mutex<Vec<(Duration, usize)>>);

    impl TimerUpdate for RecordedDurations {
        fn add(&self, duration: Duration, labels: &[KeyValue]) {
            self.0.lock().unwrap().push((duration, labels.len()));
        }
    }

    #[test]
    fn test_timer_records_on_drop() {
        let recorded = RecordedDurations::default();
        {
            let _timer = Timer::start(&recorded);
            std::thread::sleep(Duration::from_millis(2));
            assert!(recorded.0.lock().unwrap().is_empty());
        }
        let values = recorded.0.lock().unwrap();
        assert_eq!(values.len(), 1);
        assert!(values[0].0 >= Duration::from_millis(2));
        assert_eq!(values[0].1, 0);
    }

    #[test]
    fn test_disabled_provider_is_noop() {
        let provider = init_provider(
            false,
            None,
            Duration::from_secs(10),
            "offer-matcher",
            "test",
            "0.0.0",
        ).unwrap();
        assert!(provider.is_none());
        // instruments still work against the global no-op provider
        let metrics = offer_matcher::Metrics::new();
        metrics.tasks_launched.add(1, &[]);
    }
}
