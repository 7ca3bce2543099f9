//! In-memory adapters
//!
//! Scriptable fakes of the hardware and service ports, used by the unit and
//! integration tests.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::domain::{
    BusHandle, BusTransport, DriveEntity, DrivePublisher, LedControllerRef, LedGroupId, LedOp,
    LedService, LedState, SignalRef, SignalSource,
};
use crate::error::{Error, Result};

// =============================================================================
// Signals
// =============================================================================

#[derive(Debug, Default)]
struct SignalTable {
    values: HashMap<SignalRef, String>,
    pending_failures: HashMap<SignalRef, u32>,
    reads: HashMap<SignalRef, u32>,
}

/// Signal lines held in a map. Unknown lines fail to read.
#[derive(Debug, Default)]
pub struct InMemorySignals {
    table: Mutex<SignalTable>,
}

impl InMemorySignals {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, signal: SignalRef, value: &str) {
        self.table.lock().values.insert(signal, value.to_string());
    }

    /// Make the next `count` reads of `signal` fail.
    pub fn fail_next(&self, signal: SignalRef, count: u32) {
        self.table.lock().pending_failures.insert(signal, count);
    }

    /// Read attempts so far, failed ones included.
    pub fn read_count(&self, signal: SignalRef) -> u32 {
        self.table.lock().reads.get(&signal).copied().unwrap_or(0)
    }
}

#[async_trait]
impl SignalSource for InMemorySignals {
    async fn read(&self, signal: SignalRef) -> Result<String> {
        let mut table = self.table.lock();
        *table.reads.entry(signal).or_insert(0) += 1;

        if let Some(remaining) = table.pending_failures.get_mut(&signal) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(Error::Io(std::io::Error::new(
                    std::io::ErrorKind::WouldBlock,
                    format!("{} busy", signal),
                )));
            }
        }

        table.values.get(&signal).cloned().ok_or_else(|| {
            Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} not exported", signal),
            ))
        })
    }
}

// =============================================================================
// Bus
// =============================================================================

#[derive(Debug, Default)]
struct BusTable {
    responses: HashMap<(u8, u8), Vec<u8>>,
    failing: HashSet<u8>,
    commands: HashMap<u8, Vec<u8>>,
    opens: u32,
    closes: u32,
}

/// Management buses answering canned block responses.
#[derive(Debug, Default)]
pub struct InMemoryBus {
    table: Arc<Mutex<BusTable>>,
}

impl InMemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_response(&self, bus: u8, command: u8, response: Vec<u8>) {
        self.table.lock().responses.insert((bus, command), response);
    }

    pub fn clear_responses(&self, bus: u8) {
        self.table.lock().responses.retain(|(b, _), _| *b != bus);
    }

    pub fn fail_open(&self, bus: u8) {
        self.table.lock().failing.insert(bus);
    }

    pub fn opens(&self) -> u32 {
        self.table.lock().opens
    }

    pub fn closes(&self) -> u32 {
        self.table.lock().closes
    }

    /// Commands sent on `bus`, in order.
    pub fn commands(&self, bus: u8) -> Vec<u8> {
        self.table.lock().commands.get(&bus).cloned().unwrap_or_default()
    }
}

impl BusTransport for InMemoryBus {
    fn open(&self, bus: u8) -> Result<Box<dyn BusHandle>> {
        let mut table = self.table.lock();
        if table.failing.contains(&bus) {
            return Err(Error::Bus {
                bus,
                reason: "no such device".to_string(),
            });
        }
        table.opens += 1;

        Ok(Box::new(InMemoryBusHandle {
            bus,
            table: Arc::clone(&self.table),
        }))
    }
}

struct InMemoryBusHandle {
    bus: u8,
    table: Arc<Mutex<BusTable>>,
}

impl BusHandle for InMemoryBusHandle {
    fn block_command(&mut self, command: u8, response: &mut [u8]) -> Result<()> {
        let mut table = self.table.lock();
        table.commands.entry(self.bus).or_default().push(command);

        let data = table
            .responses
            .get(&(self.bus, command))
            .ok_or_else(|| Error::BusCommand {
                bus: self.bus,
                command,
                reason: "no response".to_string(),
            })?;

        if data.len() < response.len() {
            return Err(Error::BusCommand {
                bus: self.bus,
                command,
                reason: format!("short read: {} of {} bytes", data.len(), response.len()),
            });
        }

        response.copy_from_slice(&data[..response.len()]);
        Ok(())
    }
}

impl Drop for InMemoryBusHandle {
    fn drop(&mut self) {
        self.table.lock().closes += 1;
    }
}

// =============================================================================
// LED Service
// =============================================================================

#[derive(Debug, Default)]
struct LedTable {
    groups: HashMap<LedGroupId, bool>,
    controllers: HashMap<LedControllerRef, LedState>,
    ops: Vec<LedOp>,
    queries: u32,
    attempted: u32,
    fail_queries: bool,
    fail_writes: bool,
}

/// LED manager keeping group and controller state in memory.
#[derive(Debug, Default)]
pub struct InMemoryLedService {
    table: Mutex<LedTable>,
}

impl InMemoryLedService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Successful writes, in order.
    pub fn ops(&self) -> Vec<LedOp> {
        self.table.lock().ops.clone()
    }

    pub fn clear_ops(&self) {
        self.table.lock().ops.clear();
    }

    pub fn queries(&self) -> u32 {
        self.table.lock().queries
    }

    pub fn attempted_writes(&self) -> u32 {
        self.table.lock().attempted
    }

    pub fn fail_queries(&self, fail: bool) {
        self.table.lock().fail_queries = fail;
    }

    pub fn fail_writes(&self, fail: bool) {
        self.table.lock().fail_writes = fail;
    }

    /// Set a group directly, as an operator would.
    pub fn set_group(&self, group: LedGroupId, asserted: bool) {
        self.table.lock().groups.insert(group, asserted);
    }

    pub fn group_asserted(&self, group: &LedGroupId) -> bool {
        self.table.lock().groups.get(group).copied().unwrap_or(false)
    }

    pub fn controller_state(&self, controller: &LedControllerRef) -> Option<LedState> {
        self.table.lock().controllers.get(controller).copied()
    }
}

#[async_trait]
impl LedService for InMemoryLedService {
    async fn is_asserted(&self, group: &LedGroupId) -> Result<bool> {
        let mut table = self.table.lock();
        table.queries += 1;
        if table.fail_queries {
            return Err(Error::Led(format!("{} unavailable", group)));
        }
        Ok(table.groups.get(group).copied().unwrap_or(false))
    }

    async fn apply(&self, op: &LedOp) -> Result<()> {
        let mut table = self.table.lock();
        table.attempted += 1;
        if table.fail_writes {
            return Err(Error::Led(format!("{} rejected", op)));
        }

        match op {
            LedOp::SetAsserted { group, asserted } => {
                table.groups.insert(group.clone(), *asserted);
            }
            LedOp::SetControllerState { controller, state } => {
                table.controllers.insert(controller.clone(), *state);
            }
        }
        table.ops.push(op.clone());
        Ok(())
    }
}

// =============================================================================
// Drive Publisher
// =============================================================================

/// A call received by [`InMemoryPublisher`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishedCall {
    Announce(u8),
    Create(u8),
    Update(u8),
    Withdraw(u8),
}

#[derive(Debug, Default)]
struct PublisherTable {
    calls: Vec<PublishedCall>,
    published: HashMap<u8, DriveEntity>,
    fail: bool,
}

/// Records publication calls and keeps the last published entity per slot.
#[derive(Debug, Default)]
pub struct InMemoryPublisher {
    table: Mutex<PublisherTable>,
}

impl InMemoryPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<PublishedCall> {
        self.table.lock().calls.clone()
    }

    /// Make every call fail after recording it.
    pub fn fail_calls(&self, fail: bool) {
        self.table.lock().fail = fail;
    }

    pub fn published(&self, slot: u8) -> Option<DriveEntity> {
        self.table.lock().published.get(&slot).cloned()
    }

    pub fn announces(&self) -> usize {
        self.count(|c| matches!(c, PublishedCall::Announce(_)))
    }

    pub fn creates(&self) -> usize {
        self.count(|c| matches!(c, PublishedCall::Create(_)))
    }

    pub fn updates(&self) -> usize {
        self.count(|c| matches!(c, PublishedCall::Update(_)))
    }

    pub fn withdraws(&self) -> usize {
        self.count(|c| matches!(c, PublishedCall::Withdraw(_)))
    }

    fn count(&self, f: impl Fn(&PublishedCall) -> bool) -> usize {
        self.table.lock().calls.iter().filter(|c| f(c)).count()
    }

    fn record(&self, call: PublishedCall, entity: Option<&DriveEntity>) -> Result<()> {
        let mut table = self.table.lock();
        table.calls.push(call.clone());
        if table.fail {
            return Err(Error::Publication(format!("{:?} rejected", call)));
        }

        match (call, entity) {
            (PublishedCall::Withdraw(slot), _) => {
                table.published.remove(&slot);
            }
            (_, Some(entity)) => {
                table.published.insert(entity.slot, entity.clone());
            }
            _ => {}
        }
        Ok(())
    }
}

#[async_trait]
impl DrivePublisher for InMemoryPublisher {
    async fn announce(&self, slot: u8) -> Result<()> {
        self.record(PublishedCall::Announce(slot), None)
    }

    async fn create(&self, entity: &DriveEntity) -> Result<()> {
        self.record(PublishedCall::Create(entity.slot), Some(entity))
    }

    async fn update(&self, entity: &DriveEntity) -> Result<()> {
        self.record(PublishedCall::Update(entity.slot), Some(entity))
    }

    async fn withdraw(&self, slot: u8) -> Result<()> {
        self.record(PublishedCall::Withdraw(slot), None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Thresholds;
    use assert_matches::assert_matches;

    #[tokio::test]
    async fn test_signals_fail_then_recover() {
        let signals = InMemorySignals::new();
        signals.set(SignalRef(1), "1");
        signals.fail_next(SignalRef(1), 1);

        assert!(signals.read(SignalRef(1)).await.is_err());
        assert_eq!(signals.read(SignalRef(1)).await.unwrap(), "1");
        assert_eq!(signals.read_count(SignalRef(1)), 2);
    }

    #[test]
    fn test_bus_short_response() {
        let bus = InMemoryBus::new();
        bus.set_response(3, 0x00, vec![1, 2]);

        let mut handle = bus.open(3).unwrap();
        let mut buf = [0u8; 8];
        assert_matches!(
            handle.block_command(0x00, &mut buf),
            Err(Error::BusCommand { bus: 3, command: 0, .. })
        );
        drop(handle);
        assert_eq!(bus.closes(), 1);
    }

    #[tokio::test]
    async fn test_led_controller_state_tracked() {
        let leds = InMemoryLedService::new();
        let controller = LedControllerRef::new("svc", "/p");
        leds.apply(&LedOp::SetControllerState {
            controller: controller.clone(),
            state: LedState::On,
        })
        .await
        .unwrap();

        assert_eq!(leds.controller_state(&controller), Some(LedState::On));
    }

    #[tokio::test]
    async fn test_publisher_tracks_published_entity() {
        let publisher = InMemoryPublisher::new();
        let entity = DriveEntity::new(4, 1, Thresholds::default());

        publisher.create(&entity).await.unwrap();
        assert_eq!(publisher.published(4), Some(entity));

        publisher.withdraw(4).await.unwrap();
        assert_eq!(publisher.published(4), None);
        assert_eq!(
            publisher.calls(),
            vec![PublishedCall::Create(4), PublishedCall::Withdraw(4)]
        );
    }
}
