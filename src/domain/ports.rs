//! Domain Ports (Port/Adapter Pattern)
//!
//! This module defines the abstractions the monitor depends on. Everything
//! outside the reconciliation engine (GPIO lines, the management bus, the
//! LED manager, the publication mechanism) is reached through one of these
//! traits, and adapters in [`crate::adapters`] implement them.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Domain Layer                            │
//! │  ┌─────────────────────────────────────────────────────┐    │
//! │  │                    Ports (Traits)                    │    │
//! │  │  SignalSource │ BusTransport │ LedService │ ...     │    │
//! │  └─────────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Infrastructure Layer                       │
//! │  ┌─────────────────────────────────────────────────────┐    │
//! │  │                  Adapters (Impls)                    │    │
//! │  │  SysfsGpioSource │ I2cDevTransport │ DbusLedService │    │
//! │  └─────────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::drive::DriveEntity;
use super::events::DomainEvent;
use crate::error::Result;

// =============================================================================
// Value Objects
// =============================================================================

/// A binary hardware line, identified by its GPIO number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SignalRef(pub u16);

impl std::fmt::Display for SignalRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "gpio{}", self.0)
    }
}

/// LED group identifier (an object path on the LED manager).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LedGroupId(pub String);

impl LedGroupId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for LedGroupId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Address of a physical LED controller: service name plus object path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LedControllerRef {
    pub bus_name: String,
    pub path: String,
}

impl LedControllerRef {
    pub fn new(bus_name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            bus_name: bus_name.into(),
            path: path.into(),
        }
    }

    /// A controller reference is usable only when both parts are set.
    pub fn is_empty(&self) -> bool {
        self.bus_name.is_empty() || self.path.is_empty()
    }
}

impl std::fmt::Display for LedControllerRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.bus_name, self.path)
    }
}

/// Physical LED state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LedState {
    On,
    Off,
}

impl LedState {
    pub fn from_on(on: bool) -> Self {
        if on {
            LedState::On
        } else {
            LedState::Off
        }
    }
}

impl std::fmt::Display for LedState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LedState::On => write!(f, "on"),
            LedState::Off => write!(f, "off"),
        }
    }
}

/// A single write against the LED service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LedOp {
    /// Assert or deassert an LED group.
    SetAsserted { group: LedGroupId, asserted: bool },
    /// Drive a physical LED controller on or off.
    SetControllerState {
        controller: LedControllerRef,
        state: LedState,
    },
}

impl std::fmt::Display for LedOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LedOp::SetAsserted { group, asserted } => {
                write!(f, "set-asserted {} = {}", group, asserted)
            }
            LedOp::SetControllerState { controller, state } => {
                write!(f, "set-state {} = {}", controller, state)
            }
        }
    }
}

// =============================================================================
// Hardware Signal Port
// =============================================================================

/// Port for reading raw binary hardware lines.
///
/// Returns the raw textual content of the line; interpretation (which value
/// means "asserted") belongs to the signal reader.
#[async_trait]
pub trait SignalSource: Send + Sync {
    /// Read the current content of a signal line.
    async fn read(&self, signal: SignalRef) -> Result<String>;
}

// =============================================================================
// Bus Transport Port
// =============================================================================

/// Port for opening the per-slot management bus.
///
/// Bus access is blocking; callers run it off the async executor.
pub trait BusTransport: Send + Sync {
    /// Open the bus with the given number.
    fn open(&self, bus: u8) -> Result<Box<dyn BusHandle>>;
}

/// An open bus. Dropping the handle closes the bus.
pub trait BusHandle: Send {
    /// Send a single-byte command and fill `response` with the block read back.
    fn block_command(&mut self, command: u8, response: &mut [u8]) -> Result<()>;
}

// =============================================================================
// LED Service Port
// =============================================================================

/// Port for the external LED manager.
#[async_trait]
pub trait LedService: Send + Sync {
    /// Query whether an LED group is currently asserted.
    async fn is_asserted(&self, group: &LedGroupId) -> Result<bool>;

    /// Apply a single LED operation.
    async fn apply(&self, op: &LedOp) -> Result<()>;
}

// =============================================================================
// Publication Port
// =============================================================================

/// Port for exposing drive state to the rest of the platform.
#[async_trait]
pub trait DrivePublisher: Send + Sync {
    /// One-shot inventory notification for a configured slot.
    async fn announce(&self, slot: u8) -> Result<()>;

    /// Publish a newly created drive entity.
    async fn create(&self, drive: &DriveEntity) -> Result<()>;

    /// Refresh the published representation of an existing entity.
    async fn update(&self, drive: &DriveEntity) -> Result<()>;

    /// Withdraw the published representation of a slot's entity.
    async fn withdraw(&self, slot: u8) -> Result<()>;
}

// =============================================================================
// Event Publisher Port
// =============================================================================

/// Port for publishing domain events.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish a domain event.
    async fn publish(&self, event: DomainEvent) -> Result<()>;

    /// Publish multiple events.
    async fn publish_all(&self, events: Vec<DomainEvent>) -> Result<()> {
        for event in events {
            self.publish(event).await?;
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
