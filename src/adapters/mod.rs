//! Infrastructure Adapters
//!
//! Adapter implementations of the domain ports.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Domain Layer                             │
//! │  ┌───────────────────────────────────────────────────────────┐  │
//! │  │                    Ports (Traits)                         │  │
//! │  │  SignalSource │ BusTransport │ LedService │ DrivePublisher│  │
//! │  └───────────────────────────────────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     Adapters (This Module)                      │
//! │  ┌───────────────────────────────────────────────────────────┐  │
//! │  │ SysfsGpioSource │ I2cDevTransport │ DbusLedService        │  │
//! │  │ DbusInventoryPublisher │ Logging* │ InMemory*             │  │
//! │  └───────────────────────────────────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

#[cfg(feature = "dbus")]
mod dbus;
mod event_publisher;
mod i2c;
mod logging;
mod memory;
mod sysfs_gpio;

#[cfg(feature = "dbus")]
pub use dbus::{inventory_path, sensor_path, DbusInventoryPublisher, DbusLedService};
pub use event_publisher::{InMemoryEventCollector, LoggingEventPublisher};
pub use i2c::I2cDevTransport;
pub use logging::{LoggingDrivePublisher, LoggingLedService};
pub use memory::{
    InMemoryBus, InMemoryLedService, InMemoryPublisher, InMemorySignals, PublishedCall,
};
pub use sysfs_gpio::SysfsGpioSource;
