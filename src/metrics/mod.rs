//! Poll loop metrics
//!
//! Collectors live in a private [`Registry`] rather than the process-global
//! default one, so several monitors (or tests) can coexist.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts,
    Registry, TextEncoder,
};

use crate::error::Result;

const NAMESPACE: &str = "nvme_monitor";

/// Prometheus collectors for the poll scheduler.
pub struct MonitorMetrics {
    registry: Registry,
    passes_total: IntCounter,
    pass_duration: Histogram,
    drives_present: IntGauge,
    sensor_value: IntGaugeVec,
    telemetry_failures: IntCounterVec,
    signal_failures: IntCounterVec,
    led_write_failures: IntCounterVec,
    ready: AtomicBool,
}

impl MonitorMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let passes_total = IntCounter::with_opts(
            Opts::new("passes_total", "Completed reconciliation passes").namespace(NAMESPACE),
        )?;
        let pass_duration = Histogram::with_opts(
            HistogramOpts::new("pass_duration_seconds", "Duration of a reconciliation pass")
                .namespace(NAMESPACE)
                .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
        )?;
        let drives_present = IntGauge::with_opts(
            Opts::new("drives_present", "Slots with a drive entity").namespace(NAMESPACE),
        )?;
        let sensor_value = IntGaugeVec::new(
            Opts::new("sensor_value", "Last sensor value reported by a drive").namespace(NAMESPACE),
            &["slot"],
        )?;
        let telemetry_failures = IntCounterVec::new(
            Opts::new("telemetry_failures_total", "Failed telemetry reads").namespace(NAMESPACE),
            &["slot"],
        )?;
        let signal_failures = IntCounterVec::new(
            Opts::new("signal_failures_total", "Signal reads that exhausted their retries")
                .namespace(NAMESPACE),
            &["slot"],
        )?;
        let led_write_failures = IntCounterVec::new(
            Opts::new("led_write_failures_total", "Rejected LED writes").namespace(NAMESPACE),
            &["slot"],
        )?;

        registry.register(Box::new(passes_total.clone()))?;
        registry.register(Box::new(pass_duration.clone()))?;
        registry.register(Box::new(drives_present.clone()))?;
        registry.register(Box::new(sensor_value.clone()))?;
        registry.register(Box::new(telemetry_failures.clone()))?;
        registry.register(Box::new(signal_failures.clone()))?;
        registry.register(Box::new(led_write_failures.clone()))?;

        Ok(Self {
            registry,
            passes_total,
            pass_duration,
            drives_present,
            sensor_value,
            telemetry_failures,
            signal_failures,
            led_write_failures,
            ready: AtomicBool::new(false),
        })
    }

    /// Record a finished pass. The first call marks the monitor ready.
    pub fn observe_pass(&self, duration: Duration, drives_present: usize) {
        self.passes_total.inc();
        self.pass_duration.observe(duration.as_secs_f64());
        self.drives_present.set(drives_present as i64);
        self.ready.store(true, Ordering::Release);
    }

    /// Set or clear the sensor gauge of a slot.
    pub fn set_sensor_value(&self, slot: u8, value: Option<u64>) {
        let label = slot.to_string();
        match value {
            Some(v) => self
                .sensor_value
                .with_label_values(&[label.as_str()])
                .set(i64::try_from(v).unwrap_or(i64::MAX)),
            None => {
                // Absent label is fine
                let _ = self.sensor_value.remove_label_values(&[label.as_str()]);
            }
        }
    }

    pub fn inc_telemetry_failure(&self, slot: u8) {
        self.telemetry_failures
            .with_label_values(&[slot.to_string().as_str()])
            .inc();
    }

    pub fn inc_signal_failure(&self, slot: u8) {
        self.signal_failures
            .with_label_values(&[slot.to_string().as_str()])
            .inc();
    }

    pub fn add_led_failures(&self, slot: u8, count: u32) {
        if count > 0 {
            self.led_write_failures
                .with_label_values(&[slot.to_string().as_str()])
                .inc_by(u64::from(count));
        }
    }

    /// True once at least one pass has completed.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    pub fn passes(&self) -> u64 {
        self.passes_total.get()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Render every collector in the text exposition format.
    pub fn encode(&self) -> Result<(String, Vec<u8>)> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok((encoder.format_type().to_string(), buffer))
    }
}

impl std::fmt::Debug for MonitorMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MonitorMetrics")
            .field("passes", &self.passes_total.get())
            .field("ready", &self.is_ready())
            .finish()
    }
}
