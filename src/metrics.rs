//! Prometheus metrics for executed statements.
//!
//! Counters and the duration histogram are created on an OpenTelemetry
//! meter provider whose reader is a Prometheus exporter bound to
//! [`QueryMetrics::registry`]. [`QueryMetrics::render`] produces the text
//! exposition format for a scrape endpoint.

use once_cell::sync::Lazy;
use opentelemetry::metrics::{Counter, Histogram, MeterProvider as _};
use opentelemetry_sdk::metrics::SdkMeterProvider;
use prometheus::{Encoder, Registry, TextEncoder};
use std::time::Duration;

pub static METRICS: Lazy<QueryMetrics> = Lazy::new(QueryMetrics::init);

pub struct QueryMetrics {
    registry: Registry,
    // keeps the reader alive for as long as the instruments are used
    _provider: SdkMeterProvider,
    pub queries_total: Counter<u64>,
    pub query_errors_total: Counter<u64>,
    pub query_duration: Histogram<f64>,
}

impl QueryMetrics {
    pub fn init() -> Self {
        let registry = Registry::new();
        let provider = match opentelemetry_prometheus::exporter()
            .with_registry(registry.clone())
            .build()
        {
            Ok(exporter) => SdkMeterProvider::builder().with_reader(exporter).build(),
            Err(e) => {
                log::warn!("prometheus exporter unavailable, metrics are not exported: {e}");
                SdkMeterProvider::builder().build()
            }
        };
        let meter = provider.meter("rowkeeper");

        let queries_total = meter
            .u64_counter("rowkeeper_queries_total")
            .with_description("Total statements executed")
            .build();

        let query_errors_total = meter
            .u64_counter("rowkeeper_query_errors_total")
            .with_description("Statements that failed")
            .build();

        let query_duration = meter
            .f64_histogram("rowkeeper_query_duration_seconds")
            .with_description("Duration of statements")
            .build();

        Self {
            registry,
            _provider: provider,
            queries_total,
            query_errors_total,
            query_duration,
        }
    }

    pub fn record_query(&self, elapsed: Duration) {
        self.queries_total.add(1, &[]);
        self.query_duration.record(elapsed.as_secs_f64(), &[]);
    }

    pub fn record_query_error(&self) {
        self.query_errors_total.add(1, &[]);
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Current values in the Prometheus text format
    pub fn render(&self) -> String {
        let mut buffer = Vec::new();
        if let Err(e) = TextEncoder::new().encode(&self.registry.gather(), &mut buffer) {
            log::warn!("failed to encode metrics: {e}");
        }
        String::from_utf8_lossy(&buffer).into_owned()
    }
}
