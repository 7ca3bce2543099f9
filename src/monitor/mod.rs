//! Drive-state reconciliation engine
//!
//! ```text
//!                 ┌──────────────────┐
//!   tick ───────▶ │  Poll Scheduler  │
//!                 └────────┬─────────┘
//!                          │ per slot, in order
//!     ┌────────────────────┼──────────────────────┐
//!     ▼                    ▼                      ▼
//! ┌──────────┐     ┌───────────────┐     ┌────────────────┐
//! │  Signal  │────▶│   Telemetry   │────▶│ Drive Registry │──▶ publisher
//! │  Reader  │     │    Client     │     │  (+ Threshold) │
//! └──────────┘     └───────────────┘     └───────┬────────┘
//!                                                ▼
//!                                        ┌────────────────┐
//!                                        │ LED Arbitrator │──▶ LED service
//!                                        └────────────────┘
//! ```

pub mod led;
pub mod registry;
pub mod scheduler;
pub mod signal;
pub mod telemetry;
pub mod threshold;

pub use led::{fault_request, LedArbitrator, LedCondition, LedSummary};
pub use registry::{DriveRegistry, Observation, Reconciliation, Transition};
pub use scheduler::{PassSummary, PollScheduler, SlotOutcome};
pub use signal::{RetryPolicy, SignalReader, POWER_GOOD_ACTIVE, PRESENT_ACTIVE};
pub use telemetry::{TelemetryClient, TelemetrySample};
pub use threshold::evaluate;
