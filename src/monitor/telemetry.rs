//! Telemetry Client
//!
//! Reads the drive's basic-management data with two fixed block commands:
//!
//! | Command | Response | Fields used                                          |
//! |---------|----------|------------------------------------------------------|
//! | `0x00`  | 8 bytes  | 1 = status, 2 = SMART warnings, 3 = sensor, 4 = life |
//! | `0x08`  | 24 bytes | 1..=2 = vendor id, 3..=22 = serial number (ASCII)    |
//!
//! No retry at this layer: a failed read is reported once per poll.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::domain::{BusTransport, FaultFlags};
use crate::error::{Error, Result};

/// Status block command.
pub const CMD_STATUS: u8 = 0x00;
/// Status block length.
pub const STATUS_LEN: usize = 8;
/// Identity block command.
pub const CMD_IDENTITY: u8 = 0x08;
/// Identity block length.
pub const IDENTITY_LEN: usize = 24;

/// SMART warning value reporting no fault in any category.
pub const SMART_NO_FAULT: &str = "ff";

// =============================================================================
// Telemetry Sample
// =============================================================================

/// One decoded telemetry read. Hex fields are unpadded lower-case.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetrySample {
    pub present: bool,
    pub vendor: String,
    pub serial_number: String,
    pub smart_warnings: String,
    pub status_flags: String,
    pub drive_life_used: String,
    pub sensor_value: u64,
}

impl TelemetrySample {
    /// Decode the two response blocks.
    pub fn decode(status: &[u8; STATUS_LEN], identity: &[u8; IDENTITY_LEN]) -> Self {
        let serial_number = decode_serial(&identity[3..23]);

        Self {
            present: true,
            vendor: format!("{:x} {:x}", identity[1], identity[2]),
            serial_number,
            smart_warnings: format!("{:x}", status[2]),
            status_flags: format!("{:x}", status[1]),
            drive_life_used: format!("{:x}", status[4]),
            sensor_value: u64::from(status[3]),
        }
    }

    pub fn fault_flags(&self) -> Option<FaultFlags> {
        FaultFlags::from_hex(&self.smart_warnings)
    }
}

/// The serial ends at the first NUL. Bytes outside printable ASCII become `?`
/// so the result is always a valid bus string.
fn decode_serial(field: &[u8]) -> String {
    let serial: String = field
        .iter()
        .take_while(|&&b| b != 0)
        .map(|&b| if b.is_ascii_graphic() || b == b' ' { b as char } else { '?' })
        .collect();
    serial.trim_end().to_string()
}

// =============================================================================
// Blocking Read
// =============================================================================

/// Perform both block reads on `bus`. The handle is dropped, and therefore
/// the bus closed, on every return path.
pub fn read_blocking(transport: &dyn BusTransport, bus: u8) -> Result<TelemetrySample> {
    let mut handle = transport.open(bus).map_err(|e| match e {
        e @ Error::Bus { .. } => e,
        other => Error::Bus {
            bus,
            reason: other.to_string(),
        },
    })?;

    let mut status = [0u8; STATUS_LEN];
    handle
        .block_command(CMD_STATUS, &mut status)
        .map_err(|e| command_error(bus, CMD_STATUS, e))?;

    let mut identity = [0u8; IDENTITY_LEN];
    handle
        .block_command(CMD_IDENTITY, &mut identity)
        .map_err(|e| command_error(bus, CMD_IDENTITY, e))?;

    Ok(TelemetrySample::decode(&status, &identity))
}

fn command_error(bus: u8, command: u8, e: Error) -> Error {
    match e {
        e @ Error::BusCommand { .. } => e,
        other => Error::BusCommand {
            bus,
            command,
            reason: other.to_string(),
        },
    }
}

// =============================================================================
// Telemetry Client
// =============================================================================

/// Async front for [`read_blocking`]; bus I/O runs on the blocking pool and
/// is awaited, so callers stay sequential.
#[derive(Clone)]
pub struct TelemetryClient {
    transport: Arc<dyn BusTransport>,
}

impl TelemetryClient {
    pub fn new(transport: Arc<dyn BusTransport>) -> Self {
        Self { transport }
    }

    #[instrument(skip(self))]
    pub async fn read(&self, bus: u8) -> Result<TelemetrySample> {
        let transport = Arc::clone(&self.transport);
        let result = tokio::task::spawn_blocking(move || read_blocking(transport.as_ref(), bus))
            .await
            .map_err(|e| Error::Internal(format!("Telemetry task failed: {}", e)))?;

        match &result {
            Ok(sample) => debug!(
                bus,
                vendor = %sample.vendor,
                smart_warnings = %sample.smart_warnings,
                sensor_value = sample.sensor_value,
                "Telemetry read"
            ),
            Err(e) => warn!(bus, "Telemetry read failed: {}", e),
        }

        result
    }
}

impl std::fmt::Debug for TelemetryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryClient").finish_non_exhaustive()
    }
}
