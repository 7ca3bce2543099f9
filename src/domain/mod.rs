//! Domain Layer
//!
//! Value objects, the published drive entity, lifecycle events and the port
//! traits through which the monitor reaches its external collaborators.
//!
//! - **Drive** (`drive.rs`) - Thresholds, fault flags, slot state, `DriveEntity`
//! - **Ports** (`ports.rs`) - Trait abstractions for external dependencies
//! - **Events** (`events.rs`) - Lifecycle events for audit and decoupling

pub mod drive;
pub mod events;
pub mod ports;

pub use drive::{DriveEntity, FaultFlags, SlotState, ThresholdAlarms, Thresholds};
pub use events::{DomainEvent, RemovalReason};
pub use ports::{
    BusHandle, BusTransport, DrivePublisher, EventPublisher, LedControllerRef, LedGroupId, LedOp,
    LedService, LedState, SignalRef, SignalSource,
};
