//! Poll Scheduler
//!
//! Drives one reconciliation pass per tick across every configured slot.
//! Slots are polled strictly in order and each one runs to completion
//! (signals, telemetry, registry, LEDs) before the next starts. A pass that
//! overruns the interval delays the next tick; there is no catch-up.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, instrument, warn};

use super::led::{LedArbitrator, LedSummary};
use super::registry::{DriveRegistry, Observation, Reconciliation, Transition};
use super::signal::SignalReader;
use super::telemetry::TelemetryClient;
use crate::config::SlotConfig;
use crate::domain::{DomainEvent, EventPublisher, SlotState};
use crate::error::Error;
use crate::metrics::MonitorMetrics;

/// Shortest accepted delay between passes.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Result of polling one slot.
#[derive(Debug, Clone)]
pub struct SlotOutcome {
    pub reconciliation: Reconciliation,
    pub led: LedSummary,
    pub events: usize,
}

/// Aggregate of one pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassSummary {
    pub slots: usize,
    pub healthy: usize,
    pub degraded: usize,
    pub led_failures: u32,
    pub duration: Duration,
}

impl PassSummary {
    pub fn present(&self) -> usize {
        self.healthy + self.degraded
    }
}

pub struct PollScheduler {
    slots: Arc<[SlotConfig]>,
    signals: SignalReader,
    telemetry: TelemetryClient,
    leds: LedArbitrator,
    registry: DriveRegistry,
    events: Arc<dyn EventPublisher>,
    metrics: Option<Arc<MonitorMetrics>>,
    interval: Duration,
}

impl PollScheduler {
    pub fn new(
        slots: Vec<SlotConfig>,
        signals: SignalReader,
        telemetry: TelemetryClient,
        leds: LedArbitrator,
        registry: DriveRegistry,
        events: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            slots: slots.into(),
            signals,
            telemetry,
            leds,
            registry,
            events,
            metrics: None,
            interval: Duration::from_secs(1),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<MonitorMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Set the delay between passes, never shorter than [`MIN_POLL_INTERVAL`].
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval.max(MIN_POLL_INTERVAL);
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn slots(&self) -> &[SlotConfig] {
        &self.slots
    }

    pub fn registry(&self) -> &DriveRegistry {
        &self.registry
    }

    /// Announce every configured slot to the inventory, once.
    pub async fn announce_all(&self) {
        for slot in self.slots.iter() {
            self.registry.announce(slot.index).await;
        }
    }

    /// Run passes until `shutdown` resolves. The first tick fires
    /// immediately and establishes the baseline from an empty registry.
    pub async fn run<F>(&mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        info!(
            slots = self.slots.len(),
            interval_ms = self.interval.as_millis() as u64,
            "Starting poll scheduler"
        );

        if self.slots.is_empty() {
            warn!("No drive slots configured, polling is a no-op");
        }

        self.announce_all().await;

        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Poll scheduler stopping");
                    break;
                }
                _ = ticker.tick() => {
                    self.poll_once().await;
                }
            }
        }
    }

    /// One full pass over all slots.
    #[instrument(skip(self), fields(slots = self.slots.len()))]
    pub async fn poll_once(&mut self) -> PassSummary {
        let started = Instant::now();
        let slots = Arc::clone(&self.slots);
        let mut summary = PassSummary {
            slots: slots.len(),
            ..Default::default()
        };

        for slot in slots.iter() {
            let outcome = self.poll_slot(slot).await;
            match outcome.reconciliation.current {
                SlotState::PresentHealthy => summary.healthy += 1,
                SlotState::PresentDegraded => summary.degraded += 1,
                SlotState::Absent => {}
            }
            summary.led_failures += outcome.led.failed;
        }

        summary.duration = started.elapsed();

        if let Some(metrics) = &self.metrics {
            metrics.observe_pass(summary.duration, self.registry.len());
        }

        debug!(
            healthy = summary.healthy,
            degraded = summary.degraded,
            elapsed_ms = summary.duration.as_millis() as u64,
            "Poll pass complete"
        );

        summary
    }

    /// Poll a single slot: observe, reconcile, then drive its LEDs.
    #[instrument(skip(self, slot), fields(slot = slot.index))]
    pub async fn poll_slot(&mut self, slot: &SlotConfig) -> SlotOutcome {
        let mut events = Vec::new();
        let observation = self.observe(slot, &mut events).await;

        let reconciliation = self.registry.reconcile(slot, &observation).await;
        events.extend(transition_events(&reconciliation, &observation, &self.registry));

        let led = self.leds.apply_policy(slot, observation.led_condition()).await;

        if let Some(metrics) = &self.metrics {
            metrics.add_led_failures(slot.index, led.failed);
            metrics.set_sensor_value(
                slot.index,
                self.registry.get(slot.index).and_then(|d| d.sensor_value),
            );
        }

        let published = events.len();
        if !events.is_empty() {
            if let Err(e) = self.events.publish_all(events).await {
                warn!(slot = slot.index, "Can not publish events: {}", e);
            }
        }

        SlotOutcome {
            reconciliation,
            led,
            events: published,
        }
    }

    async fn observe(&self, slot: &SlotConfig, events: &mut Vec<DomainEvent>) -> Observation {
        let present = match self.signals.read_presence(slot).await {
            Ok(present) => present,
            Err(e) => return self.signal_failure(slot, e, events),
        };
        if !present {
            return Observation::Absent;
        }

        let power_good = match self.signals.read_power_good(slot).await {
            Ok(power_good) => power_good,
            Err(e) => return self.signal_failure(slot, e, events),
        };
        if !power_good {
            return Observation::PowerFault;
        }

        match self.telemetry.read(slot.bus).await {
            Ok(sample) => Observation::Reporting(sample),
            Err(e) => {
                if let Some(metrics) = &self.metrics {
                    metrics.inc_telemetry_failure(slot.index);
                }
                Observation::Unreachable {
                    reason: e.to_string(),
                }
            }
        }
    }

    /// A signal that exhausted its retries leaves the slot degraded.
    fn signal_failure(
        &self,
        slot: &SlotConfig,
        error: Error,
        events: &mut Vec<DomainEvent>,
    ) -> Observation {
        warn!(slot = slot.index, "Slot signals unreadable, marking degraded: {}", error);

        if let Some(metrics) = &self.metrics {
            metrics.inc_signal_failure(slot.index);
        }

        if let Error::SignalAccess { signal, attempts } = &error {
            events.push(DomainEvent::signal_read_failed(slot.index, signal.clone(), *attempts));
        }

        Observation::Unreachable {
            reason: error.to_string(),
        }
    }
}

fn transition_events(
    rec: &Reconciliation,
    observation: &Observation,
    registry: &DriveRegistry,
) -> Vec<DomainEvent> {
    let mut events = Vec::new();
    let degraded_reason = match observation {
        Observation::Unreachable { reason } => reason.as_str(),
        _ => "",
    };

    match rec.transition {
        Transition::Created => {
            if let Some(drive) = registry.get(rec.slot) {
                events.push(DomainEvent::drive_plugged(
                    rec.slot,
                    drive.vendor.clone(),
                    drive.serial_number.clone(),
                ));
            }
            if rec.current == SlotState::PresentDegraded {
                events.push(DomainEvent::drive_degraded(rec.slot, degraded_reason));
            }
        }
        Transition::Updated => match (rec.previous, rec.current) {
            (SlotState::PresentHealthy, SlotState::PresentDegraded) => {
                events.push(DomainEvent::drive_degraded(rec.slot, degraded_reason));
            }
            (SlotState::PresentDegraded, SlotState::PresentHealthy) => {
                events.push(DomainEvent::drive_recovered(rec.slot));
            }
            _ => {}
        },
        Transition::Removed(reason) => events.push(DomainEvent::drive_removed(rec.slot, reason)),
        Transition::Unchanged => {}
    }

    if let (Some(alarms), Observation::Reporting(sample)) = (rec.alarms_changed, observation) {
        events.push(DomainEvent::threshold_alarm_changed(
            rec.slot,
            sample.sensor_value,
            alarms,
        ));
    }

    events
}

impl std::fmt::Debug for PollScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollScheduler")
            .field("slots", &self.slots.len())
            .field("interval", &self.interval)
            .field("registry", &self.registry)
            .finish()
    }
}
