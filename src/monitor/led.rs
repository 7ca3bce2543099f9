//! LED Arbitrator
//!
//! Turns a slot's condition into fault-LED and power-LED writes.
//!
//! | Condition                      | Fault LED      | Power LED |
//! |--------------------------------|----------------|-----------|
//! | absent                         | deasserted     | off       |
//! | present, power-good low        | asserted       | off       |
//! | present, telemetry unreachable | asserted       | off       |
//! | reporting, warnings `ff`       | deasserted     | on        |
//! | reporting, any other warnings  | asserted       | off       |
//! | reporting, empty warnings      | (no write)     | (no write)|
//!
//! Locate mode wins: the locate group is queried before every write and,
//! while it is asserted, neither LED is touched. Writes are fire-and-forget;
//! failures are logged and counted, never retried.

use std::sync::Arc;

use tracing::{debug, warn};

use super::telemetry::SMART_NO_FAULT;
use crate::config::SlotConfig;
use crate::domain::{LedOp, LedService, LedState};

/// Fault request derived from hex-encoded SMART warnings.
///
/// `None` means no sample was obtained and no fault decision can be made.
pub fn fault_request(smart_warnings: &str) -> Option<bool> {
    if smart_warnings.is_empty() {
        None
    } else {
        Some(smart_warnings != SMART_NO_FAULT)
    }
}

/// What the arbitrator knows about a slot this poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedCondition<'a> {
    /// Presence line deasserted.
    Absent,
    /// Present but power-good deasserted.
    PowerFault,
    /// Powered but telemetry could not be read.
    Unreachable,
    /// Telemetry read with these SMART warnings.
    Reporting { smart_warnings: &'a str },
}

impl<'a> LedCondition<'a> {
    /// Classify raw signals plus the warnings of a sample, if one was read.
    pub fn from_signals(present: bool, power_good: bool, smart_warnings: Option<&'a str>) -> Self {
        match (present, power_good, smart_warnings) {
            (false, _, _) => LedCondition::Absent,
            (true, false, _) => LedCondition::PowerFault,
            (true, true, None) => LedCondition::Unreachable,
            (true, true, Some(smart_warnings)) => LedCondition::Reporting { smart_warnings },
        }
    }

    /// Desired (fault asserted, power LED on), or `None` for "leave alone".
    pub fn intent(&self) -> Option<(bool, bool)> {
        match self {
            LedCondition::Absent => Some((false, false)),
            LedCondition::PowerFault | LedCondition::Unreachable => Some((true, false)),
            LedCondition::Reporting { smart_warnings } => {
                fault_request(smart_warnings).map(|request| (request, !request))
            }
        }
    }
}

/// Outcome counters for one arbitration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LedSummary {
    /// Writes accepted by the LED service
    pub written: u32,
    /// Writes withheld because locate mode is (or may be) active
    pub suppressed: u32,
    /// Writes rejected by the LED service
    pub failed: u32,
    /// Writes skipped because the slot has no LED wiring
    pub skipped: u32,
}

/// Issues idempotent LED writes for a slot, honouring locate precedence.
#[derive(Clone)]
pub struct LedArbitrator {
    service: Arc<dyn LedService>,
}

impl LedArbitrator {
    pub fn new(service: Arc<dyn LedService>) -> Self {
        Self { service }
    }

    /// Apply the LED policy for `condition`.
    pub async fn apply_policy(&self, slot: &SlotConfig, condition: LedCondition<'_>) -> LedSummary {
        let mut summary = LedSummary::default();

        let Some((fault, power_on)) = condition.intent() else {
            debug!(slot = slot.index, "No SMART warnings, leaving LEDs untouched");
            return summary;
        };

        self.set_fault(slot, fault, &mut summary).await;
        self.set_power(slot, power_on, &mut summary).await;

        summary
    }

    /// Assert or deassert the fault group unless locate mode is active.
    pub async fn set_fault(&self, slot: &SlotConfig, asserted: bool, summary: &mut LedSummary) {
        if slot.locate_led_group.is_empty() || slot.fault_led_group.is_empty() {
            summary.skipped += 1;
            return;
        }

        if self.locate_active(slot).await {
            summary.suppressed += 1;
            return;
        }

        let op = LedOp::SetAsserted {
            group: slot.fault_led_group.clone(),
            asserted,
        };
        self.write(slot, op, summary).await;
    }

    /// Drive the power/locate controller unless locate mode is active.
    pub async fn set_power(&self, slot: &SlotConfig, on: bool, summary: &mut LedSummary) {
        if slot.locate_led_group.is_empty() || slot.locate_led_controller.is_empty() {
            summary.skipped += 1;
            return;
        }

        if self.locate_active(slot).await {
            summary.suppressed += 1;
            return;
        }

        let op = LedOp::SetControllerState {
            controller: slot.locate_led_controller.clone(),
            state: LedState::from_on(on),
        };
        self.write(slot, op, summary).await;
    }

    /// Query the locate group. An unanswerable query counts as active.
    async fn locate_active(&self, slot: &SlotConfig) -> bool {
        match self.service.is_asserted(&slot.locate_led_group).await {
            Ok(active) => {
                if active {
                    debug!(slot = slot.index, "Locate mode active, LED write suppressed");
                }
                active
            }
            Err(e) => {
                warn!(
                    slot = slot.index,
                    group = %slot.locate_led_group,
                    "Can not read locate group state, LED write suppressed: {}",
                    e
                );
                true
            }
        }
    }

    async fn write(&self, slot: &SlotConfig, op: LedOp, summary: &mut LedSummary) {
        match self.service.apply(&op).await {
            Ok(()) => {
                debug!(slot = slot.index, %op, "LED write");
                summary.written += 1;
            }
            Err(e) => {
                warn!(slot = slot.index, %op, "LED write failed: {}", e);
                summary.failed += 1;
            }
        }
    }
}

impl std::fmt::Debug for LedArbitrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedArbitrator").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::InMemoryLedService;
    use crate::domain::{LedControllerRef, LedGroupId};
    use proptest::prelude::*;

    fn slot() -> SlotConfig {
        SlotConfig::new(0, 6, 148, 161).with_leds(
            "/led/groups/fault0",
            "/led/groups/locate0",
            LedControllerRef::new("led.svc", "/led/physical/locate0"),
        )
    }

    fn fault_op(asserted: bool) -> LedOp {
        LedOp::SetAsserted {
            group: LedGroupId::new("/led/groups/fault0"),
            asserted,
        }
    }

    fn power_op(state: LedState) -> LedOp {
        LedOp::SetControllerState {
            controller: LedControllerRef::new("led.svc", "/led/physical/locate0"),
            state,
        }
    }

    fn block_on<F: std::future::Future>(f: F) -> F::Output {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap()
            .block_on(f)
    }

    #[test]
    fn test_fault_request() {
        assert_eq!(fault_request("ff"), Some(false));
        assert_eq!(fault_request("0"), Some(true));
        assert_eq!(fault_request("1f"), Some(true));
        assert_eq!(fault_request(""), None);
    }

    #[test]
    fn test_condition_from_signals() {
        assert_eq!(LedCondition::from_signals(false, true, Some("ff")), LedCondition::Absent);
        assert_eq!(LedCondition::from_signals(true, false, None), LedCondition::PowerFault);
        assert_eq!(LedCondition::from_signals(true, true, None), LedCondition::Unreachable);
        assert_eq!(
            LedCondition::from_signals(true, true, Some("ff")),
            LedCondition::Reporting { smart_warnings: "ff" }
        );
    }

    #[tokio::test]
    async fn test_healthy_drive() {
        let leds = Arc::new(InMemoryLedService::new());
        let arbitrator = LedArbitrator::new(leds.clone());

        let summary = arbitrator
            .apply_policy(&slot(), LedCondition::Reporting { smart_warnings: "ff" })
            .await;

        assert_eq!(summary.written, 2);
        assert_eq!(leds.ops(), vec![fault_op(false), power_op(LedState::On)]);
    }

    #[tokio::test]
    async fn test_faulted_drive() {
        let leds = Arc::new(InMemoryLedService::new());
        let arbitrator = LedArbitrator::new(leds.clone());

        arbitrator
            .apply_policy(&slot(), LedCondition::Reporting { smart_warnings: "0" })
            .await;

        assert_eq!(leds.ops(), vec![fault_op(true), power_op(LedState::Off)]);
    }

    #[tokio::test]
    async fn test_forced_states() {
        let leds = Arc::new(InMemoryLedService::new());
        let arbitrator = LedArbitrator::new(leds.clone());

        arbitrator.apply_policy(&slot(), LedCondition::PowerFault).await;
        assert_eq!(leds.ops(), vec![fault_op(true), power_op(LedState::Off)]);

        leds.clear_ops();
        arbitrator.apply_policy(&slot(), LedCondition::Unreachable).await;
        assert_eq!(leds.ops(), vec![fault_op(true), power_op(LedState::Off)]);

        leds.clear_ops();
        arbitrator.apply_policy(&slot(), LedCondition::Absent).await;
        assert_eq!(leds.ops(), vec![fault_op(false), power_op(LedState::Off)]);
    }

    #[tokio::test]
    async fn test_empty_warnings_write_nothing() {
        let leds = Arc::new(InMemoryLedService::new());
        let arbitrator = LedArbitrator::new(leds.clone());

        let summary = arbitrator
            .apply_policy(&slot(), LedCondition::Reporting { smart_warnings: "" })
            .await;

        assert_eq!(summary, LedSummary::default());
        assert!(leds.ops().is_empty());
        assert_eq!(leds.queries(), 0);
    }

    #[tokio::test]
    async fn test_locate_queried_before_every_write() {
        let leds = Arc::new(InMemoryLedService::new());
        let arbitrator = LedArbitrator::new(leds.clone());

        arbitrator.apply_policy(&slot(), LedCondition::Absent).await;
        assert_eq!(leds.queries(), 2);
    }

    #[tokio::test]
    async fn test_locate_query_failure_suppresses() {
        let leds = Arc::new(InMemoryLedService::new());
        leds.fail_queries(true);
        let arbitrator = LedArbitrator::new(leds.clone());

        let summary = arbitrator.apply_policy(&slot(), LedCondition::PowerFault).await;
        assert_eq!(summary.suppressed, 2);
        assert!(leds.ops().is_empty());
    }

    #[tokio::test]
    async fn test_write_failure_counted_not_retried() {
        let leds = Arc::new(InMemoryLedService::new());
        leds.fail_writes(true);
        let arbitrator = LedArbitrator::new(leds.clone());

        let summary = arbitrator.apply_policy(&slot(), LedCondition::Absent).await;
        assert_eq!(summary.failed, 2);
        assert_eq!(summary.written, 0);
        assert_eq!(leds.attempted_writes(), 2);
    }

    #[tokio::test]
    async fn test_unwired_slot_skipped() {
        let leds = Arc::new(InMemoryLedService::new());
        let arbitrator = LedArbitrator::new(leds.clone());

        let summary = arbitrator
            .apply_policy(&SlotConfig::new(1, 7, 1, 2), LedCondition::PowerFault)
            .await;
        assert_eq!(summary.skipped, 2);
        assert_eq!(leds.queries(), 0);
    }

    #[tokio::test]
    async fn test_idempotent_writes() {
        let leds = Arc::new(InMemoryLedService::new());
        let arbitrator = LedArbitrator::new(leds.clone());
        let condition = LedCondition::Reporting { smart_warnings: "1f" };

        arbitrator.apply_policy(&slot(), condition).await;
        let first = leds.ops();
        leds.clear_ops();
        arbitrator.apply_policy(&slot(), condition).await;

        assert_eq!(leds.ops(), first);
        assert!(leds.group_asserted(&LedGroupId::new("/led/groups/fault0")));
    }

    proptest! {
        #[test]
        fn prop_fault_request_only_ff_is_healthy(v in any::<u8>()) {
            let hex = format!("{:x}", v);
            prop_assert_eq!(fault_request(&hex), Some(v != 0xff));
        }

        #[test]
        fn prop_locate_precedence(present in any::<bool>(), power in any::<bool>(),
                                  warnings in proptest::option::of(any::<u8>())) {
            let hex = warnings.map(|v| format!("{:x}", v));
            let condition = LedCondition::from_signals(present, power, hex.as_deref());

            let leds = Arc::new(InMemoryLedService::new());
            leds.set_group(LedGroupId::new("/led/groups/locate0"), true);
            let arbitrator = LedArbitrator::new(leds.clone());

            block_on(arbitrator.apply_policy(&slot(), condition));
            prop_assert!(leds.ops().is_empty());
        }
    }
}
