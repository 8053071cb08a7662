//! Process-local metrics exposed on `/metrics`.
//!
//! Three series in Prometheus text format:
//! - `api_requests_total` (counter)
//! - `api_uptime_seconds` (gauge)
//! - `api_health_status` (gauge, always 1 while serving)

use std::time::Instant;

use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};

pub struct Metrics {
    registry: Registry,
    requests_total: IntCounter,
    uptime_seconds: IntGauge,
    health_status: IntGauge,
    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let requests_total = IntCounter::new("api_requests_total", "Total API requests")?;
        let uptime_seconds = IntGauge::new("api_uptime_seconds", "API uptime in seconds")?;
        let health_status = IntGauge::new(
            "api_health_status",
            "API health status (1=healthy, 0=unhealthy)",
        )?;

        registry.register(Box::new(requests_total.clone()))?;
        registry.register(Box::new(uptime_seconds.clone()))?;
        registry.register(Box::new(health_status.clone()))?;

        health_status.set(1);

        Ok(Self {
            registry,
            requests_total,
            uptime_seconds,
            health_status,
            start_time: Instant::now(),
        })
    }

    /// Count one inbound request. Lock-free and safe from any thread.
    pub fn record_request(&self) {
        self.requests_total.inc();
    }

    pub fn request_count(&self) -> u64 {
        self.requests_total.get()
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    pub fn content_type(&self) -> String {
        TextEncoder::new().format_type().to_string()
    }

    /// Render all series in the text exposition format.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        self.uptime_seconds.set(self.uptime_seconds() as i64);
        self.health_status.set(1);

        let mut buf = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buf)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}
