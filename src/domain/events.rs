//! Domain Events
//!
//! Immutable records of drive lifecycle transitions. The scheduler emits one
//! event per state change (not per poll), so the stream stays quiet while the
//! chassis is stable.
//!
//! # Example
//!
//! ```ignore
//! let event = DomainEvent::drive_plugged(3, "14 4d", "S4EWNX0R123456");
//! event_publisher.publish(event).await?;
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::drive::ThresholdAlarms;

/// Why a drive entity was withdrawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RemovalReason {
    /// Presence line reports the bay empty.
    NotPresent,
    /// Presence line asserted but power-good is not.
    PowerFault,
}

impl std::fmt::Display for RemovalReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RemovalReason::NotPresent => write!(f, "not-present"),
            RemovalReason::PowerFault => write!(f, "power-fault"),
        }
    }
}

/// Domain event representing a drive state change.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DomainEvent {
    /// A drive entity was created.
    DrivePlugged {
        slot: u8,
        vendor: String,
        serial_number: String,
        timestamp: DateTime<Utc>,
    },

    /// A drive entity was withdrawn.
    DriveRemoved {
        slot: u8,
        reason: RemovalReason,
        timestamp: DateTime<Utc>,
    },

    /// A present drive stopped answering telemetry reads.
    DriveDegraded {
        slot: u8,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// A degraded drive answered again.
    DriveRecovered { slot: u8, timestamp: DateTime<Utc> },

    /// The threshold alarm set of a drive changed.
    ThresholdAlarmChanged {
        slot: u8,
        value: u64,
        alarms: ThresholdAlarms,
        timestamp: DateTime<Utc>,
    },

    /// A presence or power-good line exhausted its retry budget.
    SignalReadFailed {
        slot: u8,
        signal: String,
        attempts: u32,
        timestamp: DateTime<Utc>,
    },
}

impl DomainEvent {
    /// Get the timestamp of the event.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            DomainEvent::DrivePlugged { timestamp, .. } => *timestamp,
            DomainEvent::DriveRemoved { timestamp, .. } => *timestamp,
            DomainEvent::DriveDegraded { timestamp, .. } => *timestamp,
            DomainEvent::DriveRecovered { timestamp, .. } => *timestamp,
            DomainEvent::ThresholdAlarmChanged { timestamp, .. } => *timestamp,
            DomainEvent::SignalReadFailed { timestamp, .. } => *timestamp,
        }
    }

    /// Get the event type name.
    pub fn event_type(&self) -> &'static str {
        match self {
            DomainEvent::DrivePlugged { .. } => "DrivePlugged",
            DomainEvent::DriveRemoved { .. } => "DriveRemoved",
            DomainEvent::DriveDegraded { .. } => "DriveDegraded",
            DomainEvent::DriveRecovered { .. } => "DriveRecovered",
            DomainEvent::ThresholdAlarmChanged { .. } => "ThresholdAlarmChanged",
            DomainEvent::SignalReadFailed { .. } => "SignalReadFailed",
        }
    }

    /// Get the slot the event concerns.
    pub fn slot(&self) -> u8 {
        match self {
            DomainEvent::DrivePlugged { slot, .. }
            | DomainEvent::DriveRemoved { slot, .. }
            | DomainEvent::DriveDegraded { slot, .. }
            | DomainEvent::DriveRecovered { slot, .. }
            | DomainEvent::ThresholdAlarmChanged { slot, .. }
            | DomainEvent::SignalReadFailed { slot, .. } => *slot,
        }
    }
}

// =============================================================================
// Event Builders
// =============================================================================

impl DomainEvent {
    pub fn drive_plugged(
        slot: u8,
        vendor: impl Into<String>,
        serial_number: impl Into<String>,
    ) -> Self {
        DomainEvent::DrivePlugged {
            slot,
            vendor: vendor.into(),
            serial_number: serial_number.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn drive_removed(slot: u8, reason: RemovalReason) -> Self {
        DomainEvent::DriveRemoved {
            slot,
            reason,
            timestamp: Utc::now(),
        }
    }

    pub fn drive_degraded(slot: u8, reason: impl Into<String>) -> Self {
        DomainEvent::DriveDegraded {
            slot,
            reason: reason.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn drive_recovered(slot: u8) -> Self {
        DomainEvent::DriveRecovered {
            slot,
            timestamp: Utc::now(),
        }
    }

    pub fn threshold_alarm_changed(slot: u8, value: u64, alarms: ThresholdAlarms) -> Self {
        DomainEvent::ThresholdAlarmChanged {
            slot,
            value,
            alarms,
            timestamp: Utc::now(),
        }
    }

    pub fn signal_read_failed(slot: u8, signal: impl Into<String>, attempts: u32) -> Self {
        DomainEvent::SignalReadFailed {
            slot,
            signal: signal.into(),
            attempts,
            timestamp: Utc::now(),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = DomainEvent::drive_plugged(3, "14 4d", "S4EWNX0R123456");

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("DrivePlugged"));
        assert!(json.contains("S4EWNX0R123456"));

        let deserialized: DomainEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized.event_type(), "DrivePlugged");
        assert_eq!(deserialized.slot(), 3);
    }

    #[test]
    fn test_removal_reason_serialized() {
        let event = DomainEvent::drive_removed(1, RemovalReason::PowerFault);
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("PowerFault"));
        assert_eq!(event.event_type(), "DriveRemoved");
    }

    #[test]
    fn test_timestamp() {
        let before = Utc::now();
        let event = DomainEvent::drive_recovered(0);
        let after = Utc::now();

        assert!(event.timestamp() >= before);
        assert!(event.timestamp() <= after);
    }

    #[test]
    fn test_alarm_event_carries_flags() {
        let alarms = ThresholdAlarms {
            warning_high: true,
            ..Default::default()
        };
        let event = DomainEvent::threshold_alarm_changed(2, 75, alarms);
        match event {
            DomainEvent::ThresholdAlarmChanged { value, alarms, .. } => {
                assert_eq!(value, 75);
                assert!(alarms.warning_high);
                assert!(!alarms.critical_high);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }
}
