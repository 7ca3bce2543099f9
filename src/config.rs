//! Slot configuration and runtime tunables
//!
//! Slots are described by a JSON file with a `config` array (one record per
//! bay) and a `threshold` array supplying default sensor bounds:
//!
//! ```json
//! {
//!   "config": [{
//!     "NvmeDriveIndex": 0,
//!     "NVMeDriveBusID": 6,
//!     "NVMeDriveFaultLEDGroupPath": "/xyz/openbmc_project/led/groups/led_u2_0_fault",
//!     "NVMeDriveLocateLEDGroupPath": "/xyz/openbmc_project/led/groups/led_u2_0_locate",
//!     "NVMeDrivePresentPin": 148,
//!     "NVMeDrivePwrGoodPin": 161,
//!     "NVMeDriveLocateLEDControllerBusName": "xyz.openbmc_project.LedController.led_u2_0_locate",
//!     "NVMeDriveLocateLEDControllerPath": "/xyz/openbmc_project/led/physical/led_u2_0_locate"
//!   }],
//!   "threshold": [{
//!     "criticalHigh": 70, "criticalLow": 0,
//!     "warningHigh": 68, "warningLow": 0,
//!     "maxValue": 127, "minValue": 0
//!   }]
//! }
//! ```
//!
//! A slot record may carry its own `NVMeDriveThreshold` object with the same
//! keys as a `threshold` record to override the defaults.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::{error, info, warn};

use crate::domain::{LedControllerRef, LedGroupId, SignalRef, Thresholds};
use crate::error::{Error, Result};
use crate::monitor::RetryPolicy;

/// Default location of the slot configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/nvme/nvme_config.json";

/// Management address of the drive's basic-management endpoint.
pub const DEFAULT_DRIVE_ADDRESS: u8 = 0x6a;

// =============================================================================
// Slot Configuration
// =============================================================================

/// Immutable description of one physical drive bay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotConfig {
    /// Slot index (unique key)
    pub index: u8,
    /// Management bus number
    pub bus: u8,
    /// Presence line
    pub present_pin: SignalRef,
    /// Power-good line
    pub power_good_pin: SignalRef,
    pub fault_led_group: LedGroupId,
    pub locate_led_group: LedGroupId,
    /// Physical indicator driven while the drive is healthy
    pub locate_led_controller: LedControllerRef,
    pub thresholds: Thresholds,
}

impl SlotConfig {
    /// Minimal slot with no LED wiring, mostly useful in tests.
    pub fn new(index: u8, bus: u8, present_pin: u16, power_good_pin: u16) -> Self {
        Self {
            index,
            bus,
            present_pin: SignalRef(present_pin),
            power_good_pin: SignalRef(power_good_pin),
            fault_led_group: LedGroupId::default(),
            locate_led_group: LedGroupId::default(),
            locate_led_controller: LedControllerRef::default(),
            thresholds: Thresholds::default(),
        }
    }

    pub fn with_leds(
        mut self,
        fault_group: impl Into<String>,
        locate_group: impl Into<String>,
        controller: LedControllerRef,
    ) -> Self {
        self.fault_led_group = LedGroupId::new(fault_group);
        self.locate_led_group = LedGroupId::new(locate_group);
        self.locate_led_controller = controller;
        self
    }

    pub fn with_thresholds(mut self, thresholds: Thresholds) -> Self {
        self.thresholds = thresholds;
        self
    }
}

/// Records are kept as raw values so one malformed record is skipped on its
/// own instead of rejecting the whole file.
#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    config: Vec<serde_json::Value>,
    #[serde(default)]
    threshold: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct SlotRecord {
    #[serde(rename = "NvmeDriveIndex", default)]
    index: u8,
    #[serde(rename = "NVMeDriveBusID", default)]
    bus: u8,
    #[serde(rename = "NVMeDriveFaultLEDGroupPath", default)]
    fault_led_group: String,
    #[serde(rename = "NVMeDriveLocateLEDGroupPath", default)]
    locate_led_group: String,
    #[serde(rename = "NVMeDrivePresentPin", default)]
    present_pin: u16,
    #[serde(rename = "NVMeDrivePwrGoodPin", default)]
    power_good_pin: u16,
    #[serde(rename = "NVMeDriveLocateLEDControllerBusName", default)]
    locate_led_bus_name: String,
    #[serde(rename = "NVMeDriveLocateLEDControllerPath", default)]
    locate_led_path: String,
    #[serde(rename = "NVMeDriveThreshold", default)]
    threshold: Option<Thresholds>,
}

impl SlotRecord {
    fn into_slot(self, defaults: Thresholds) -> SlotConfig {
        SlotConfig {
            index: self.index,
            bus: self.bus,
            present_pin: SignalRef(self.present_pin),
            power_good_pin: SignalRef(self.power_good_pin),
            fault_led_group: LedGroupId(self.fault_led_group),
            locate_led_group: LedGroupId(self.locate_led_group),
            locate_led_controller: LedControllerRef {
                bus_name: self.locate_led_bus_name,
                path: self.locate_led_path,
            },
            thresholds: self.threshold.unwrap_or(defaults),
        }
    }
}

/// Parse slot configuration from JSON text.
///
/// Fails when the text is not valid JSON or has no usable slot records.
/// Individual malformed slot or threshold records are skipped with a warning.
pub fn parse_slot_configs(json: &str) -> Result<Vec<SlotConfig>> {
    let file: ConfigFile = serde_json::from_str(json)?;

    if file.config.is_empty() {
        return Err(Error::Config("config array missing or empty".to_string()));
    }

    // Later threshold records override earlier ones
    let defaults = file
        .threshold
        .into_iter()
        .enumerate()
        .filter_map(|(position, value)| match serde_json::from_value::<Thresholds>(value) {
            Ok(t) => Some(t),
            Err(e) => {
                warn!(position, "Skipping malformed threshold record: {}", e);
                None
            }
        })
        .last()
        .unwrap_or_else(|| {
            warn!("No threshold records in configuration, bounds default to zero");
            Thresholds::default()
        });

    let mut seen = HashSet::new();
    let mut slots = Vec::with_capacity(file.config.len());

    for (position, value) in file.config.into_iter().enumerate() {
        let record: SlotRecord = match serde_json::from_value(value) {
            Ok(record) => record,
            Err(e) => {
                warn!(position, "Skipping malformed slot record: {}", e);
                continue;
            }
        };
        if !seen.insert(record.index) {
            warn!(slot = record.index, "Duplicate slot index in configuration, ignoring");
            continue;
        }
        slots.push(record.into_slot(defaults));
    }

    if slots.is_empty() {
        return Err(Error::Config("no usable slot records".to_string()));
    }

    Ok(slots)
}

/// Load slot configuration from a file.
///
/// Never fails: a missing or malformed file yields an empty slot list and a
/// single error log, and the monitor then polls nothing.
pub fn load_slot_configs(path: &Path) -> Vec<SlotConfig> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) => {
            error!(path = %path.display(), "NVMe config file unreadable: {}", e);
            return Vec::new();
        }
    };

    match parse_slot_configs(&text) {
        Ok(slots) => {
            info!(path = %path.display(), slots = slots.len(), "Loaded NVMe slot configuration");
            slots
        }
        Err(e) => {
            error!(path = %path.display(), "Invalid NVMe config file: {}", e);
            Vec::new()
        }
    }
}

// =============================================================================
// Runtime Tunables
// =============================================================================

/// Runtime settings not carried by the slot configuration file.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Slot configuration file
    pub config_path: PathBuf,
    /// Delay between poll passes
    pub poll_interval: Duration,
    /// Retry budget for presence and power-good reads
    pub signal_retry: RetryPolicy,
    /// Root of the sysfs GPIO tree
    pub gpio_base: PathBuf,
    /// Device node prefix for management buses
    pub i2c_prefix: String,
    /// Drive management address on each bus
    pub drive_address: u8,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            config_path: PathBuf::from(DEFAULT_CONFIG_PATH),
            poll_interval: Duration::from_secs(1),
            signal_retry: RetryPolicy::default(),
            gpio_base: PathBuf::from("/sys/class/gpio"),
            i2c_prefix: "/dev/i2c-".to_string(),
            drive_address: DEFAULT_DRIVE_ADDRESS,
        }
    }
}
