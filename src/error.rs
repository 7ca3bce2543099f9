//! Error types for the NVMe drive-health monitor

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the drive-health monitor
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    // =========================================================================
    // Hardware Errors
    // =========================================================================
    /// Signal line could not be read within the retry budget
    #[error("Signal {signal} unreadable after {attempts} attempts")]
    SignalAccess { signal: String, attempts: u32 },

    /// Bus could not be opened
    #[error("Bus {bus} unavailable: {reason}")]
    Bus { bus: u8, reason: String },

    /// Block command did not complete
    #[error("Command 0x{command:02x} on bus {bus} failed: {reason}")]
    BusCommand { bus: u8, command: u8, reason: String },

    // =========================================================================
    // External Service Errors
    // =========================================================================
    /// LED service call failed
    #[error("LED service error: {0}")]
    Led(String),

    /// Publication call failed
    #[error("Publication error: {0}")]
    Publication(String),

    /// D-Bus transport error
    #[cfg(feature = "dbus")]
    #[error("D-Bus error: {0}")]
    Dbus(#[from] zbus::Error),

    /// Metrics registry error
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True for failures of the drive itself rather than of the host side.
    pub fn is_drive_unreachable(&self) -> bool {
        matches!(self, Error::Bus { .. } | Error::BusCommand { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bus_command_display() {
        let err = Error::BusCommand {
            bus: 6,
            command: 8,
            reason: "nack".to_string(),
        };
        assert_eq!(err.to_string(), "Command 0x08 on bus 6 failed: nack");
        assert!(err.is_drive_unreachable());
    }

    #[test]
    fn test_signal_access_display() {
        let err = Error::SignalAccess {
            signal: "gpio148".to_string(),
            attempts: 3,
        };
        assert_eq!(err.to_string(), "Signal gpio148 unreadable after 3 attempts");
        assert!(!err.is_drive_unreachable());
    }
}
