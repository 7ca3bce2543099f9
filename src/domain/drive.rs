//! Drive value objects and the published drive entity.

use std::fmt;

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize};

// =============================================================================
// Thresholds
// =============================================================================

/// Sensor bounds for one slot.
///
/// Field names follow the `threshold` records of the configuration file.
/// Bounds accept any JSON number: fractions truncate and negatives clamp to 0.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Thresholds {
    #[serde(deserialize_with = "lenient_bound")]
    pub critical_high: u64,
    #[serde(deserialize_with = "lenient_bound")]
    pub critical_low: u64,
    #[serde(deserialize_with = "lenient_bound")]
    pub warning_high: u64,
    #[serde(deserialize_with = "lenient_bound")]
    pub warning_low: u64,
    #[serde(deserialize_with = "lenient_bound")]
    pub max_value: u64,
    #[serde(deserialize_with = "lenient_bound")]
    pub min_value: u64,
}

fn lenient_bound<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    struct BoundVisitor;

    impl Visitor<'_> for BoundVisitor {
        type Value = u64;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a numeric sensor bound")
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<u64, E> {
            Ok(v)
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<u64, E> {
            Ok(u64::try_from(v).unwrap_or(0))
        }

        fn visit_f64<E: de::Error>(self, v: f64) -> Result<u64, E> {
            // `as` saturates and maps NaN to 0
            Ok(v as u64)
        }
    }

    deserializer.deserialize_any(BoundVisitor)
}

/// Alarm flags derived from a sensor value and its [`Thresholds`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThresholdAlarms {
    pub critical_high: bool,
    pub critical_low: bool,
    pub warning_high: bool,
    pub warning_low: bool,
}

impl ThresholdAlarms {
    pub fn any(&self) -> bool {
        self.critical_high || self.critical_low || self.warning_high || self.warning_low
    }

    pub fn any_critical(&self) -> bool {
        self.critical_high || self.critical_low
    }
}

// =============================================================================
// SMART Fault Categories
// =============================================================================

/// Per-category fault flags decoded from the SMART warning byte.
///
/// The drive reports a category as faulted by clearing its bit, so a flag is
/// true when the corresponding bit is 0.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultFlags {
    pub capacity: bool,
    pub temperature: bool,
    pub degraded: bool,
    pub media: bool,
    pub backup_device: bool,
}

impl FaultFlags {
    /// Decode bits 0..=4 of the warning byte.
    pub fn from_smart_warnings(byte: u8) -> Self {
        let fault = |bit: u8| (byte >> bit) & 1 == 0;
        Self {
            capacity: fault(0),
            temperature: fault(1),
            degraded: fault(2),
            media: fault(3),
            backup_device: fault(4),
        }
    }

    /// Decode a hex-encoded warning byte. An empty or malformed string
    /// carries no fault information.
    pub fn from_hex(hex: &str) -> Option<Self> {
        u8::from_str_radix(hex, 16).ok().map(Self::from_smart_warnings)
    }

    pub fn any(&self) -> bool {
        self.capacity || self.temperature || self.degraded || self.media || self.backup_device
    }
}

// =============================================================================
// Slot State
// =============================================================================

/// Reconciliation state of one slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlotState {
    /// No entity exists.
    Absent,
    /// Entity exists and the last telemetry read succeeded.
    PresentHealthy,
    /// Entity exists but the drive could not be read.
    PresentDegraded,
}

impl SlotState {
    pub fn is_present(&self) -> bool {
        !matches!(self, SlotState::Absent)
    }
}

impl std::fmt::Display for SlotState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SlotState::Absent => write!(f, "absent"),
            SlotState::PresentHealthy => write!(f, "present-healthy"),
            SlotState::PresentDegraded => write!(f, "present-degraded"),
        }
    }
}

// =============================================================================
// Drive Entity
// =============================================================================

/// Externally visible representation of a present drive.
///
/// Only the drive registry creates or destroys these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriveEntity {
    /// Slot the drive sits in
    pub slot: u8,
    /// Registry-assigned creation number; a re-inserted drive gets a new one
    pub instance: u64,
    pub present: bool,
    /// Last sensor reading, `None` while the drive is unreachable
    pub sensor_value: Option<u64>,
    pub vendor: String,
    pub serial_number: String,
    pub smart_warnings: String,
    pub status_flags: String,
    pub drive_life_used: String,
    pub faults: FaultFlags,
    pub alarms: ThresholdAlarms,
    pub thresholds: Thresholds,
}

impl DriveEntity {
    /// A present entity with no telemetry fields populated.
    pub fn new(slot: u8, instance: u64, thresholds: Thresholds) -> Self {
        Self {
            slot,
            instance,
            present: true,
            sensor_value: None,
            vendor: String::new(),
            serial_number: String::new(),
            smart_warnings: String::new(),
            status_flags: String::new(),
            drive_life_used: String::new(),
            faults: FaultFlags::default(),
            alarms: ThresholdAlarms::default(),
            thresholds,
        }
    }

    /// Drop every telemetry-derived field, keeping identity and presence.
    pub fn clear_telemetry(&mut self) {
        self.sensor_value = None;
        self.vendor.clear();
        self.serial_number.clear();
        self.smart_warnings.clear();
        self.status_flags.clear();
        self.drive_life_used.clear();
        self.faults = FaultFlags::default();
        self.alarms = ThresholdAlarms::default();
    }

    pub fn is_reporting(&self) -> bool {
        self.sensor_value.is_some()
    }

    pub fn state(&self) -> SlotState {
        if self.is_reporting() {
            SlotState::PresentHealthy
        } else {
            SlotState::PresentDegraded
        }
    }
}
