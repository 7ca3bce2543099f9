//! NVMe drive-health monitor
//!
//! Periodically samples NVMe slot presence and power-good lines and the
//! drives' basic-management telemetry, keeps one published entity per
//! present drive, evaluates sensor thresholds and drives the fault and
//! locate/power LEDs with locate-mode precedence.
//!
//! # Architecture
//!
//! ```text
//! Signal Reader → Telemetry Client → Drive Registry → LED Arbitrator
//!        ▲                                  │
//!        └────────── Poll Scheduler ────────┘
//! ```
//!
//! # Modules
//!
//! - [`adapters`] - Hardware, LED, publication and event adapters
//! - [`config`] - Slot configuration and runtime tunables
//! - [`domain`] - Drive model, ports and events
//! - [`error`] - Error types
//! - [`metrics`] - Prometheus collectors for the poll loop
//! - [`monitor`] - The reconciliation engine

pub mod adapters;
pub mod config;
pub mod domain;
pub mod error;
pub mod metrics;
pub mod monitor;

pub use config::{load_slot_configs, parse_slot_configs, MonitorConfig, SlotConfig};
pub use domain::{DomainEvent, DriveEntity, SlotState, Thresholds};
pub use error::{Error, Result};
pub use metrics::MonitorMetrics;
pub use monitor::{DriveRegistry, LedArbitrator, PollScheduler, SignalReader, TelemetryClient};
