//! Drive Registry
//!
//! Sole owner of drive entity lifetime. Per slot the registry runs a three
//! state machine:
//!
//! ```text
//!                 reporting / unreachable
//!   ┌────────┐ ───────────────────────────▶ ┌──────────────────┐
//!   │ Absent │                              │ Present-Healthy  │
//!   └────────┘ ◀─────────────────────────── │ Present-Degraded │
//!               absent / power fault        └──────────────────┘
//! ```
//!
//! An entity is updated in place while the slot stays present, so its
//! published identity is stable; a drive that leaves and comes back gets a
//! brand-new entity with a new instance number.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{info, warn};

use super::led::LedCondition;
use super::telemetry::TelemetrySample;
use super::threshold;
use crate::config::SlotConfig;
use crate::domain::{DriveEntity, DrivePublisher, RemovalReason, SlotState, ThresholdAlarms};

/// What one poll learned about a slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    /// Presence line deasserted.
    Absent,
    /// Presence asserted, power-good deasserted.
    PowerFault,
    /// Drive should be there but could not be read.
    Unreachable { reason: String },
    /// Telemetry read succeeded.
    Reporting(TelemetrySample),
}

impl Observation {
    /// The LED condition this observation implies.
    pub fn led_condition(&self) -> LedCondition<'_> {
        match self {
            Observation::Absent => LedCondition::Absent,
            Observation::PowerFault => LedCondition::PowerFault,
            Observation::Unreachable { .. } => LedCondition::Unreachable,
            Observation::Reporting(sample) => LedCondition::Reporting {
                smart_warnings: &sample.smart_warnings,
            },
        }
    }
}

/// Effect of a reconciliation on the entity set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// A new entity was created and published.
    Created,
    /// The existing entity was updated in place.
    Updated,
    /// The entity was destroyed and withdrawn.
    Removed(RemovalReason),
    /// Slot was absent and stays absent.
    Unchanged,
}

/// Result of reconciling one slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    pub slot: u8,
    pub transition: Transition,
    pub previous: SlotState,
    pub current: SlotState,
    /// New alarm set when a reporting poll changed it
    pub alarms_changed: Option<ThresholdAlarms>,
}

/// Owns the slot → entity mapping.
pub struct DriveRegistry {
    drives: BTreeMap<u8, DriveEntity>,
    publisher: Arc<dyn DrivePublisher>,
    next_instance: u64,
}

impl DriveRegistry {
    pub fn new(publisher: Arc<dyn DrivePublisher>) -> Self {
        Self {
            drives: BTreeMap::new(),
            publisher,
            next_instance: 0,
        }
    }

    pub fn get(&self, slot: u8) -> Option<&DriveEntity> {
        self.drives.get(&slot)
    }

    pub fn state(&self, slot: u8) -> SlotState {
        self.drives
            .get(&slot)
            .map(DriveEntity::state)
            .unwrap_or(SlotState::Absent)
    }

    pub fn drives(&self) -> impl Iterator<Item = &DriveEntity> {
        self.drives.values()
    }

    pub fn len(&self) -> usize {
        self.drives.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drives.is_empty()
    }

    /// One-shot inventory notification for a configured slot.
    pub async fn announce(&self, slot: u8) {
        if let Err(e) = self.publisher.announce(slot).await {
            warn!(slot, "Can not announce drive slot: {}", e);
        }
    }

    /// Apply one observation to a slot. Publication failures are logged and
    /// do not affect the registry's own state.
    pub async fn reconcile(
        &mut self,
        slot: &SlotConfig,
        observation: &Observation,
    ) -> Reconciliation {
        let previous = self.state(slot.index);

        let (transition, alarms_changed) = match observation {
            Observation::Absent => (self.remove(slot, RemovalReason::NotPresent).await, None),
            Observation::PowerFault => (self.remove(slot, RemovalReason::PowerFault).await, None),
            Observation::Unreachable { .. } | Observation::Reporting(_) => {
                self.upsert(slot, observation).await
            }
        };

        Reconciliation {
            slot: slot.index,
            transition,
            previous,
            current: self.state(slot.index),
            alarms_changed,
        }
    }

    async fn remove(&mut self, slot: &SlotConfig, reason: RemovalReason) -> Transition {
        if self.drives.remove(&slot.index).is_none() {
            return Transition::Unchanged;
        }

        info!(slot = slot.index, %reason, "Erase SSD from registry");

        if let Err(e) = self.publisher.withdraw(slot.index).await {
            warn!(slot = slot.index, "Can not withdraw drive: {}", e);
        }

        Transition::Removed(reason)
    }

    async fn upsert(
        &mut self,
        slot: &SlotConfig,
        observation: &Observation,
    ) -> (Transition, Option<ThresholdAlarms>) {
        let instance = self.next_instance + 1;

        let (entity, created) = match self.drives.entry(slot.index) {
            Entry::Occupied(e) => (e.into_mut(), false),
            Entry::Vacant(e) => (
                e.insert(DriveEntity::new(slot.index, instance, slot.thresholds)),
                true,
            ),
        };

        let previous_alarms = entity.alarms;
        entity.present = true;
        entity.thresholds = slot.thresholds;

        let alarms_changed = match observation {
            Observation::Reporting(sample) => {
                apply_sample(entity, slot, sample);
                (entity.alarms != previous_alarms).then_some(entity.alarms)
            }
            _ => {
                entity.clear_telemetry();
                None
            }
        };

        let snapshot = entity.clone();

        let (transition, published) = if created {
            self.next_instance = instance;
            info!(slot = slot.index, instance, "SSD plug");
            (Transition::Created, self.publisher.create(&snapshot).await)
        } else {
            (Transition::Updated, self.publisher.update(&snapshot).await)
        };

        if let Err(e) = published {
            warn!(slot = slot.index, "Can not publish drive: {}", e);
        }

        (transition, alarms_changed)
    }
}

fn apply_sample(entity: &mut DriveEntity, slot: &SlotConfig, sample: &TelemetrySample) {
    entity.sensor_value = Some(sample.sensor_value);
    entity.vendor.clone_from(&sample.vendor);
    entity.serial_number.clone_from(&sample.serial_number);
    entity.smart_warnings.clone_from(&sample.smart_warnings);
    entity.status_flags.clone_from(&sample.status_flags);
    entity.drive_life_used.clone_from(&sample.drive_life_used);
    entity.faults = sample.fault_flags().unwrap_or_default();
    entity.alarms = threshold::evaluate(sample.sensor_value, &slot.thresholds);
}

impl std::fmt::Debug for DriveRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriveRegistry")
            .field("drives", &self.drives.len())
            .field("next_instance", &self.next_instance)
            .finish()
    }
}
