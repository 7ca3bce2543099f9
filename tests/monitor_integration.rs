//! Whole-pass tests of the reconciliation engine through the public API.

use std::sync::Arc;

use nvme_monitor::adapters::{
    InMemoryBus, InMemoryEventCollector, InMemoryLedService, InMemoryPublisher, PublishedCall,
    SysfsGpioSource,
};
use nvme_monitor::config::{parse_slot_configs, SlotConfig};
use nvme_monitor::domain::{DomainEvent, LedGroupId, LedOp, LedState, RemovalReason, SignalSource};
use nvme_monitor::monitor::telemetry::{CMD_IDENTITY, CMD_STATUS, IDENTITY_LEN};
use nvme_monitor::monitor::{
    DriveRegistry, LedArbitrator, PollScheduler, RetryPolicy, SignalReader, TelemetryClient,
};
use nvme_monitor::{MonitorMetrics, SlotState};

const CONFIG: &str = r#"{
    "config": [
        {
            "NvmeDriveIndex": 0,
            "NVMeDriveBusID": 6,
            "NVMeDriveFaultLEDGroupPath": "/led/groups/fault0",
            "NVMeDriveLocateLEDGroupPath": "/led/groups/locate0",
            "NVMeDrivePresentPin": 148,
            "NVMeDrivePwrGoodPin": 161,
            "NVMeDriveLocateLEDControllerBusName": "led.controller0",
            "NVMeDriveLocateLEDControllerPath": "/led/physical/locate0"
        },
        {
            "NvmeDriveIndex": 2,
            "NVMeDriveBusID": 8,
            "NVMeDriveFaultLEDGroupPath": "/led/groups/fault2",
            "NVMeDriveLocateLEDGroupPath": "/led/groups/locate2",
            "NVMeDrivePresentPin": 150,
            "NVMeDrivePwrGoodPin": 163,
            "NVMeDriveLocateLEDControllerBusName": "led.controller2",
            "NVMeDriveLocateLEDControllerPath": "/led/physical/locate2"
        }
    ],
    "threshold": [
        {
            "criticalHigh": 80,
            "criticalLow": 0,
            "warningHigh": 70,
            "warningLow": 0,
            "maxValue": 127,
            "minValue": 0
        }
    ]
}"#;

/// A chassis backed by a temporary sysfs GPIO tree and scripted buses.
struct Chassis {
    gpio: tempfile::TempDir,
    slots: Vec<SlotConfig>,
    bus: Arc<InMemoryBus>,
    leds: Arc<InMemoryLedService>,
    publisher: Arc<InMemoryPublisher>,
    events: Arc<InMemoryEventCollector>,
    metrics: Arc<MonitorMetrics>,
}

impl Chassis {
    fn new() -> Self {
        let chassis = Self {
            gpio: tempfile::tempdir().unwrap(),
            slots: parse_slot_configs(CONFIG).unwrap(),
            bus: Arc::new(InMemoryBus::new()),
            leds: Arc::new(InMemoryLedService::new()),
            publisher: Arc::new(InMemoryPublisher::new()),
            events: Arc::new(InMemoryEventCollector::new()),
            metrics: Arc::new(MonitorMetrics::new().unwrap()),
        };
        for index in [0, 2] {
            chassis.eject(index);
        }
        chassis
    }

    fn slot(&self, index: u8) -> &SlotConfig {
        self.slots.iter().find(|s| s.index == index).unwrap()
    }

    fn write_pin(&self, pin: u16, value: &str) {
        let dir = self.gpio.path().join(format!("gpio{}", pin));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("value"), format!("{}\n", value)).unwrap();
    }

    fn signals(&self, index: u8, present: bool, power_good: bool) {
        let slot = self.slot(index).clone();
        self.write_pin(slot.present_pin.0, if present { "0" } else { "1" });
        self.write_pin(slot.power_good_pin.0, if power_good { "1" } else { "0" });
    }

    fn insert(&self, index: u8, value: u8, smart: u8, serial: &str) {
        let bus = self.slot(index).bus;
        self.bus
            .set_response(bus, CMD_STATUS, vec![0, 0xbf, smart, value, 7, 0, 0, 0]);
        let mut identity = vec![0u8; IDENTITY_LEN];
        identity[1] = 0x14;
        identity[2] = 0x4d;
        identity[3..3 + serial.len()].copy_from_slice(serial.as_bytes());
        self.bus.set_response(bus, CMD_IDENTITY, identity);
        self.signals(index, true, true);
    }

    fn eject(&self, index: u8) {
        self.bus.clear_responses(self.slot(index).bus);
        self.signals(index, false, false);
    }

    fn scheduler(&self) -> PollScheduler {
        let source: Arc<dyn SignalSource> = Arc::new(SysfsGpioSource::new(self.gpio.path()));
        PollScheduler::new(
            self.slots.clone(),
            SignalReader::new(source, RetryPolicy::immediate(3)),
            TelemetryClient::new(self.bus.clone()),
            LedArbitrator::new(self.leds.clone()),
            DriveRegistry::new(self.publisher.clone()),
            self.events.clone(),
        )
        .with_metrics(self.metrics.clone())
    }

    fn fault_asserted(&self, index: u8) -> bool {
        self.leds
            .group_asserted(&LedGroupId::new(format!("/led/groups/fault{}", index)))
    }

    fn power_led(&self, index: u8) -> Option<LedState> {
        self.leds
            .controller_state(&self.slot(index).locate_led_controller)
    }
}

#[tokio::test]
async fn cold_start_establishes_baseline() {
    let chassis = Chassis::new();
    chassis.insert(0, 35, 0xff, "SN-A");

    let mut scheduler = chassis.scheduler();
    let summary = scheduler.poll_once().await;

    assert_eq!(summary.slots, 2);
    assert_eq!(summary.healthy, 1);
    assert_eq!(scheduler.registry().state(0), SlotState::PresentHealthy);
    assert_eq!(scheduler.registry().state(2), SlotState::Absent);
    assert_eq!(chassis.publisher.creates(), 1);
    assert_eq!(chassis.power_led(0), Some(LedState::On));
    assert_eq!(chassis.power_led(2), Some(LedState::Off));
    assert!(!chassis.fault_asserted(2));
    assert!(chassis.metrics.is_ready());
}

#[tokio::test]
async fn warning_band_on_slot_two() {
    let chassis = Chassis::new();
    chassis.insert(2, 75, 0xff, "SN-B");

    let mut scheduler = chassis.scheduler();
    scheduler.poll_once().await;

    let drive = scheduler.registry().get(2).unwrap();
    assert!(drive.alarms.warning_high);
    assert!(!drive.alarms.critical_high);
    assert_eq!(drive.sensor_value, Some(75));
    assert_eq!(drive.vendor, "14 4d");
    assert_eq!(drive.serial_number, "SN-B");

    let published = chassis.publisher.published(2).unwrap();
    assert_eq!(&published, drive);

    let alarms = chassis.events.events_of_type("ThresholdAlarmChanged");
    assert_eq!(alarms.len(), 1);
    assert!(matches!(alarms[0], DomainEvent::ThresholdAlarmChanged { slot: 2, value: 75, .. }));
}

#[tokio::test]
async fn power_fault_destroys_entity_and_forces_leds() {
    let chassis = Chassis::new();
    chassis.insert(0, 35, 0xff, "SN-A");

    let mut scheduler = chassis.scheduler();
    scheduler.poll_once().await;

    chassis.signals(0, true, false);
    scheduler.poll_once().await;

    assert_eq!(scheduler.registry().state(0), SlotState::Absent);
    assert!(chassis.fault_asserted(0));
    assert_eq!(chassis.power_led(0), Some(LedState::Off));
    assert_eq!(
        chassis.publisher.calls().last(),
        Some(&PublishedCall::Withdraw(0))
    );

    let removed = chassis.events.events_of_type("DriveRemoved");
    assert!(matches!(
        removed[..],
        [DomainEvent::DriveRemoved { slot: 0, reason: RemovalReason::PowerFault, .. }]
    ));
}

#[tokio::test]
async fn flicker_recreates_fresh_entity() {
    let chassis = Chassis::new();
    let mut scheduler = chassis.scheduler();

    chassis.insert(0, 90, 0x00, "SN-OLD");
    scheduler.poll_once().await;
    let old = scheduler.registry().get(0).unwrap().clone();
    assert!(old.faults.any());
    assert!(old.alarms.critical_high);
    assert!(chassis.fault_asserted(0));

    chassis.eject(0);
    scheduler.poll_once().await;
    assert!(!chassis.fault_asserted(0));

    chassis.insert(0, 30, 0xff, "SN-NEW");
    scheduler.poll_once().await;

    let fresh = scheduler.registry().get(0).unwrap();
    assert_ne!(fresh.instance, old.instance);
    assert_eq!(fresh.serial_number, "SN-NEW");
    assert!(!fresh.faults.any());
    assert!(!fresh.alarms.any());
    assert!(!chassis.fault_asserted(0));

    assert_eq!(chassis.publisher.creates(), 2);
    assert_eq!(chassis.publisher.withdraws(), 1);
}

#[tokio::test]
async fn unreachable_drive_is_degraded_not_absent() {
    let chassis = Chassis::new();
    chassis.signals(2, true, true);

    let mut scheduler = chassis.scheduler();
    let summary = scheduler.poll_once().await;

    assert_eq!(summary.degraded, 1);
    let drive = scheduler.registry().get(2).unwrap();
    assert!(drive.present);
    assert_eq!(drive.sensor_value, None);
    assert!(chassis.fault_asserted(2));
    assert_eq!(chassis.power_led(2), Some(LedState::Off));
    assert_eq!(chassis.bus.opens(), chassis.bus.closes());
}

#[tokio::test]
async fn locate_mode_blocks_all_writes() {
    let chassis = Chassis::new();
    chassis.insert(0, 35, 0x00, "SN-A");
    chassis
        .leds
        .set_group(LedGroupId::new("/led/groups/locate0"), true);

    let mut scheduler = chassis.scheduler();
    scheduler.poll_once().await;

    let slot0_writes: Vec<LedOp> = chassis
        .leds
        .ops()
        .into_iter()
        .filter(|op| match op {
            LedOp::SetAsserted { group, .. } => group.as_str().ends_with("fault0"),
            LedOp::SetControllerState { controller, .. } => controller.path.ends_with("locate0"),
        })
        .collect();
    assert!(slot0_writes.is_empty());

    // Entity bookkeeping is unaffected by locate mode
    assert_eq!(scheduler.registry().state(0), SlotState::PresentHealthy);
}

#[tokio::test]
async fn repeated_input_is_idempotent() {
    let chassis = Chassis::new();
    chassis.insert(0, 72, 0x1e, "SN-A");

    let mut scheduler = chassis.scheduler();
    scheduler.poll_once().await;
    let entity = scheduler.registry().get(0).cloned();
    let ops = chassis.leds.ops();
    chassis.leds.clear_ops();

    scheduler.poll_once().await;

    assert_eq!(scheduler.registry().get(0).cloned(), entity);
    assert_eq!(chassis.leds.ops(), ops);
    assert_eq!(chassis.events.events_of_type("DrivePlugged").len(), 1);
}

#[tokio::test]
async fn missing_gpio_degrades_after_retries() {
    let chassis = Chassis::new();
    std::fs::remove_dir_all(chassis.gpio.path().join("gpio150")).unwrap();

    let mut scheduler = chassis.scheduler();
    let summary = scheduler.poll_once().await;

    assert_eq!(summary.degraded, 1);
    assert_eq!(scheduler.registry().state(2), SlotState::PresentDegraded);
    assert!(matches!(
        chassis.events.events_of_type("SignalReadFailed")[..],
        [DomainEvent::SignalReadFailed { slot: 2, attempts: 3, .. }]
    ));
}
