//! Logging adapters
//!
//! Stand-ins for the LED manager and the publication interface on hosts
//! without a system bus. Every call becomes one log line; the LED stand-in
//! remembers group state so locate queries answer consistently.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::info;

use crate::domain::{DriveEntity, DrivePublisher, LedGroupId, LedOp, LedService};
use crate::error::Result;

/// LED service that logs writes and keeps group state locally.
#[derive(Debug, Default)]
pub struct LoggingLedService {
    groups: RwLock<HashMap<LedGroupId, bool>>,
}

impl LoggingLedService {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LedService for LoggingLedService {
    async fn is_asserted(&self, group: &LedGroupId) -> Result<bool> {
        Ok(self.groups.read().get(group).copied().unwrap_or(false))
    }

    async fn apply(&self, op: &LedOp) -> Result<()> {
        if let LedOp::SetAsserted { group, asserted } = op {
            let previous = self.groups.write().insert(group.clone(), *asserted);
            if previous == Some(*asserted) {
                return Ok(());
            }
        }
        info!(%op, "LED");
        Ok(())
    }
}

/// Publisher that logs drive entities instead of exporting them.
#[derive(Debug, Clone, Default)]
pub struct LoggingDrivePublisher;

impl LoggingDrivePublisher {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DrivePublisher for LoggingDrivePublisher {
    async fn announce(&self, slot: u8) -> Result<()> {
        info!(slot, "Drive slot announced");
        Ok(())
    }

    async fn create(&self, drive: &DriveEntity) -> Result<()> {
        let json = serde_json::to_string(drive)?;
        info!(slot = drive.slot, instance = drive.instance, drive = %json, "Drive published");
        Ok(())
    }

    async fn update(&self, drive: &DriveEntity) -> Result<()> {
        tracing::debug!(
            slot = drive.slot,
            state = %drive.state(),
            sensor_value = ?drive.sensor_value,
            "Drive updated"
        );
        Ok(())
    }

    async fn withdraw(&self, slot: u8) -> Result<()> {
        info!(slot, "Drive withdrawn");
        Ok(())
    }
}
