//! D-Bus adapters
//!
//! LED groups and physical LEDs are driven through
//! `org.freedesktop.DBus.Properties` on the LED manager and LED controllers.
//! Drive inventory is pushed to the inventory manager with `Notify`, and
//! each present drive gets a temperature sensor object hosted on our own
//! connection.

use std::collections::HashMap;

use async_trait::async_trait;
use tracing::{debug, info};
use zbus::zvariant::{ObjectPath, OwnedValue, Value};
use zbus::{interface, Connection};

use crate::domain::{DriveEntity, DrivePublisher, LedGroupId, LedOp, LedService, LedState};
use crate::error::{Error, Result};

const PROPERTIES_IFACE: &str = "org.freedesktop.DBus.Properties";

const LED_GROUP_BUSNAME: &str = "xyz.openbmc_project.LED.GroupManager";
const LED_GROUP_IFACE: &str = "xyz.openbmc_project.Led.Group";
const LED_PHYSICAL_IFACE: &str = "xyz.openbmc_project.Led.Physical";

const INVENTORY_BUSNAME: &str = "xyz.openbmc_project.Inventory.Manager";
const INVENTORY_PATH: &str = "/xyz/openbmc_project/inventory";
const INVENTORY_MANAGER_IFACE: &str = "xyz.openbmc_project.Inventory.Manager";
const ITEM_IFACE: &str = "xyz.openbmc_project.Inventory.Item";
const ASSET_IFACE: &str = "xyz.openbmc_project.Inventory.Decorator.Asset";
const NVME_STATUS_IFACE: &str = "xyz.openbmc_project.Nvme.Status";

const SENSOR_PATH_PREFIX: &str = "/xyz/openbmc_project/sensors/temperature/nvme";

fn physical_action(state: LedState) -> &'static str {
    match state {
        LedState::On => "xyz.openbmc_project.Led.Physical.Action.On",
        LedState::Off => "xyz.openbmc_project.Led.Physical.Action.Off",
    }
}

/// Inventory object path of a slot, relative to the inventory namespace.
pub fn inventory_path(slot: u8) -> String {
    format!("/system/chassis/motherboard/nvme{}", slot)
}

/// Sensor object hosted for a present drive.
pub fn sensor_path(slot: u8) -> String {
    format!("{}{}", SENSOR_PATH_PREFIX, slot)
}

// =============================================================================
// LED Service
// =============================================================================

/// LED manager and physical LED controllers reached over the system bus.
#[derive(Debug, Clone)]
pub struct DbusLedService {
    connection: Connection,
}

impl DbusLedService {
    pub fn new(connection: Connection) -> Self {
        Self { connection }
    }

    async fn set_property(
        &self,
        destination: &str,
        path: &str,
        interface: &str,
        property: &str,
        value: Value<'_>,
    ) -> Result<()> {
        self.connection
            .call_method(
                Some(destination),
                path,
                Some(PROPERTIES_IFACE),
                "Set",
                &(interface, property, value),
            )
            .await?;
        Ok(())
    }
}

#[async_trait]
impl LedService for DbusLedService {
    async fn is_asserted(&self, group: &LedGroupId) -> Result<bool> {
        let reply = self
            .connection
            .call_method(
                Some(LED_GROUP_BUSNAME),
                group.as_str(),
                Some(PROPERTIES_IFACE),
                "Get",
                &(LED_GROUP_IFACE, "Asserted"),
            )
            .await?;

        let value: OwnedValue = reply.body().deserialize()?;
        bool::try_from(value)
            .map_err(|e| Error::Led(format!("{}: unexpected Asserted value: {}", group, e)))
    }

    async fn apply(&self, op: &LedOp) -> Result<()> {
        match op {
            LedOp::SetAsserted { group, asserted } => {
                self.set_property(
                    LED_GROUP_BUSNAME,
                    group.as_str(),
                    LED_GROUP_IFACE,
                    "Asserted",
                    Value::from(*asserted),
                )
                .await
            }
            LedOp::SetControllerState { controller, state } => {
                self.set_property(
                    &controller.bus_name,
                    &controller.path,
                    LED_PHYSICAL_IFACE,
                    "State",
                    Value::from(physical_action(*state)),
                )
                .await
            }
        }
    }
}

// =============================================================================
// Sensor objects
// =============================================================================

struct SensorValue {
    value: f64,
    max_value: f64,
    min_value: f64,
}

#[interface(name = "xyz.openbmc_project.Sensor.Value")]
impl SensorValue {
    #[zbus(property)]
    fn value(&self) -> f64 {
        self.value
    }

    #[zbus(property)]
    fn max_value(&self) -> f64 {
        self.max_value
    }

    #[zbus(property)]
    fn min_value(&self) -> f64 {
        self.min_value
    }
}

struct CriticalThreshold {
    high: f64,
    low: f64,
    alarm_high: bool,
    alarm_low: bool,
}

#[interface(name = "xyz.openbmc_project.Sensor.Threshold.Critical")]
impl CriticalThreshold {
    #[zbus(property)]
    fn critical_high(&self) -> f64 {
        self.high
    }

    #[zbus(property)]
    fn critical_low(&self) -> f64 {
        self.low
    }

    #[zbus(property)]
    fn critical_alarm_high(&self) -> bool {
        self.alarm_high
    }

    #[zbus(property)]
    fn critical_alarm_low(&self) -> bool {
        self.alarm_low
    }
}

struct WarningThreshold {
    high: f64,
    low: f64,
    alarm_high: bool,
    alarm_low: bool,
}

#[interface(name = "xyz.openbmc_project.Sensor.Threshold.Warning")]
impl WarningThreshold {
    #[zbus(property)]
    fn warning_high(&self) -> f64 {
        self.high
    }

    #[zbus(property)]
    fn warning_low(&self) -> f64 {
        self.low
    }

    #[zbus(property)]
    fn warning_alarm_high(&self) -> bool {
        self.alarm_high
    }

    #[zbus(property)]
    fn warning_alarm_low(&self) -> bool {
        self.alarm_low
    }
}

// =============================================================================
// Inventory Publisher
// =============================================================================

type PropertyMap = HashMap<&'static str, Value<'static>>;

/// Publishes drives to the inventory manager and hosts their sensors.
#[derive(Debug, Clone)]
pub struct DbusInventoryPublisher {
    connection: Connection,
}

impl DbusInventoryPublisher {
    pub fn new(connection: Connection) -> Self {
        Self { connection }
    }

    async fn notify(&self, slot: u8, interfaces: HashMap<&'static str, PropertyMap>) -> Result<()> {
        let path = ObjectPath::try_from(inventory_path(slot)).map_err(zbus::Error::from)?;
        let mut objects = HashMap::new();
        objects.insert(path, interfaces);

        self.connection
            .call_method(
                Some(INVENTORY_BUSNAME),
                INVENTORY_PATH,
                Some(INVENTORY_MANAGER_IFACE),
                "Notify",
                &(objects,),
            )
            .await?;
        Ok(())
    }

    async fn host_sensor(&self, drive: &DriveEntity) -> Result<()> {
        let path = sensor_path(drive.slot);
        let server = self.connection.object_server();

        // Drop whatever a previous drive in this slot left behind
        self.remove_sensor(drive.slot).await?;

        let t = &drive.thresholds;
        server
            .at(
                path.as_str(),
                SensorValue {
                    value: drive.sensor_value.unwrap_or_default() as f64,
                    max_value: t.max_value as f64,
                    min_value: t.min_value as f64,
                },
            )
            .await?;
        server
            .at(
                path.as_str(),
                CriticalThreshold {
                    high: t.critical_high as f64,
                    low: t.critical_low as f64,
                    alarm_high: drive.alarms.critical_high,
                    alarm_low: drive.alarms.critical_low,
                },
            )
            .await?;
        server
            .at(
                path.as_str(),
                WarningThreshold {
                    high: t.warning_high as f64,
                    low: t.warning_low as f64,
                    alarm_high: drive.alarms.warning_high,
                    alarm_low: drive.alarms.warning_low,
                },
            )
            .await?;

        debug!(slot = drive.slot, %path, "Sensor object hosted");
        Ok(())
    }

    async fn refresh_sensor(&self, drive: &DriveEntity) -> Result<()> {
        let path = sensor_path(drive.slot);
        let server = self.connection.object_server();

        let value_ref = match server.interface::<_, SensorValue>(path.as_str()).await {
            Ok(iface) => iface,
            Err(_) => return self.host_sensor(drive).await,
        };
        {
            let mut iface = value_ref.get_mut().await;
            let value = drive.sensor_value.unwrap_or_default() as f64;
            if iface.value != value {
                iface.value = value;
                iface.value_changed(value_ref.signal_emitter()).await?;
            }
        }

        let critical_ref = server.interface::<_, CriticalThreshold>(path.as_str()).await?;
        {
            let mut iface = critical_ref.get_mut().await;
            if iface.alarm_high != drive.alarms.critical_high {
                iface.alarm_high = drive.alarms.critical_high;
                iface.critical_alarm_high_changed(critical_ref.signal_emitter()).await?;
            }
            if iface.alarm_low != drive.alarms.critical_low {
                iface.alarm_low = drive.alarms.critical_low;
                iface.critical_alarm_low_changed(critical_ref.signal_emitter()).await?;
            }
        }

        let warning_ref = server.interface::<_, WarningThreshold>(path.as_str()).await?;
        {
            let mut iface = warning_ref.get_mut().await;
            if iface.alarm_high != drive.alarms.warning_high {
                iface.alarm_high = drive.alarms.warning_high;
                iface.warning_alarm_high_changed(warning_ref.signal_emitter()).await?;
            }
            if iface.alarm_low != drive.alarms.warning_low {
                iface.alarm_low = drive.alarms.warning_low;
                iface.warning_alarm_low_changed(warning_ref.signal_emitter()).await?;
            }
        }

        Ok(())
    }

    async fn remove_sensor(&self, slot: u8) -> Result<()> {
        let path = sensor_path(slot);
        let server = self.connection.object_server();
        let _ = server.remove::<SensorValue, _>(path.as_str()).await;
        let _ = server.remove::<CriticalThreshold, _>(path.as_str()).await;
        let _ = server.remove::<WarningThreshold, _>(path.as_str()).await;
        Ok(())
    }
}

/// Inventory interfaces and properties describing `drive`.
fn inventory_properties(drive: &DriveEntity) -> HashMap<&'static str, PropertyMap> {
    let mut item = PropertyMap::new();
    item.insert("Present", Value::from(drive.present));

    let mut asset = PropertyMap::new();
    asset.insert("Manufacturer", Value::from(drive.vendor.clone()));
    asset.insert("SerialNumber", Value::from(drive.serial_number.clone()));

    let mut status = PropertyMap::new();
    status.insert("SmartWarnings", Value::from(drive.smart_warnings.clone()));
    status.insert("StatusFlags", Value::from(drive.status_flags.clone()));
    status.insert("DriveLifeUsed", Value::from(drive.drive_life_used.clone()));
    status.insert("CapacityFault", Value::from(drive.faults.capacity));
    status.insert("TemperatureFault", Value::from(drive.faults.temperature));
    status.insert("DegradesFault", Value::from(drive.faults.degraded));
    status.insert("MediaFault", Value::from(drive.faults.media));
    status.insert("BackupDeviceFault", Value::from(drive.faults.backup_device));

    HashMap::from([
        (ITEM_IFACE, item),
        (ASSET_IFACE, asset),
        (NVME_STATUS_IFACE, status),
    ])
}

/// Properties of a withdrawn slot: not present, empty strings, no faults.
fn withdrawn_properties(slot: u8) -> HashMap<&'static str, PropertyMap> {
    let mut drive = DriveEntity::new(slot, 0, Default::default());
    drive.present = false;
    inventory_properties(&drive)
}

#[async_trait]
impl DrivePublisher for DbusInventoryPublisher {
    async fn announce(&self, slot: u8) -> Result<()> {
        let interfaces = HashMap::from([
            (ITEM_IFACE, PropertyMap::new()),
            (ASSET_IFACE, PropertyMap::new()),
            (NVME_STATUS_IFACE, PropertyMap::new()),
        ]);
        self.notify(slot, interfaces).await?;
        info!(slot, path = %inventory_path(slot), "Inventory item announced");
        Ok(())
    }

    async fn create(&self, drive: &DriveEntity) -> Result<()> {
        self.notify(drive.slot, inventory_properties(drive)).await?;
        self.host_sensor(drive).await
    }

    async fn update(&self, drive: &DriveEntity) -> Result<()> {
        self.notify(drive.slot, inventory_properties(drive)).await?;
        self.refresh_sensor(drive).await
    }

    async fn withdraw(&self, slot: u8) -> Result<()> {
        self.remove_sensor(slot).await?;
        self.notify(slot, withdrawn_properties(slot)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Thresholds;

    #[test]
    fn test_paths() {
        assert_eq!(inventory_path(3), "/system/chassis/motherboard/nvme3");
        assert_eq!(sensor_path(3), "/xyz/openbmc_project/sensors/temperature/nvme3");
    }

    #[test]
    fn test_physical_action() {
        assert_eq!(physical_action(LedState::On), "xyz.openbmc_project.Led.Physical.Action.On");
        assert_eq!(physical_action(LedState::Off), "xyz.openbmc_project.Led.Physical.Action.Off");
    }

    #[test]
    fn test_inventory_properties() {
        let mut drive = DriveEntity::new(1, 1, Thresholds::default());
        drive.vendor = "14 4d".to_string();
        drive.faults.media = true;

        let props = inventory_properties(&drive);
        assert_eq!(props[ITEM_IFACE]["Present"], Value::from(true));
        assert_eq!(props[ASSET_IFACE]["Manufacturer"], Value::from("14 4d"));
        assert_eq!(props[NVME_STATUS_IFACE]["MediaFault"], Value::from(true));
        assert_eq!(props[NVME_STATUS_IFACE].len(), 8);
    }

    #[test]
    fn test_withdrawn_properties_cleared() {
        let props = withdrawn_properties(2);
        assert_eq!(props[ITEM_IFACE]["Present"], Value::from(false));
        assert_eq!(props[ASSET_IFACE]["SerialNumber"], Value::from(""));
        assert_eq!(props[NVME_STATUS_IFACE]["CapacityFault"], Value::from(false));
    }
}
