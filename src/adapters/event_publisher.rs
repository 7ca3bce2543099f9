//! Event Publisher Adapter
//!
//! Implements the `EventPublisher` port with a log sink and a test collector.

use async_trait::async_trait;
use tracing::{debug, info};

use crate::domain::events::DomainEvent;
use crate::domain::ports::EventPublisher;
use crate::error::Result;

/// Writes each drive event to the log as a JSON document.
#[derive(Debug, Clone, Default)]
pub struct LoggingEventPublisher {
    /// Whether to log events at info level (true) or debug level (false)
    info_level: bool,
}

impl LoggingEventPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn info_level() -> Self {
        Self { info_level: true }
    }

    pub fn debug_level() -> Self {
        Self { info_level: false }
    }
}

#[async_trait]
impl EventPublisher for LoggingEventPublisher {
    async fn publish(&self, event: DomainEvent) -> Result<()> {
        let event_type = event.event_type();
        let slot = event.slot();
        let json = serde_json::to_string(&event).unwrap_or_else(|_| format!("{:?}", event));

        if self.info_level {
            info!(event_type, slot, event = %json, "Drive event");
        } else {
            debug!(event_type, slot, event = %json, "Drive event");
        }

        Ok(())
    }
}

/// In-memory event collector for testing.
#[derive(Debug, Default)]
pub struct InMemoryEventCollector {
    events: parking_lot::RwLock<Vec<DomainEvent>>,
}

impl InMemoryEventCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<DomainEvent> {
        self.events.read().clone()
    }

    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    pub fn clear(&self) {
        self.events.write().clear();
    }

    /// Events whose `event_type()` matches.
    pub fn events_of_type(&self, event_type: &str) -> Vec<DomainEvent> {
        self.events
            .read()
            .iter()
            .filter(|e| e.event_type() == event_type)
            .cloned()
            .collect()
    }

    /// Events concerning one slot, in publication order.
    pub fn events_for_slot(&self, slot: u8) -> Vec<DomainEvent> {
        self.events
            .read()
            .iter()
            .filter(|e| e.slot() == slot)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl EventPublisher for InMemoryEventCollector {
    async fn publish(&self, event: DomainEvent) -> Result<()> {
        self.events.write().push(event);
        Ok(())
    }

    async fn publish_all(&self, events: Vec<DomainEvent>) -> Result<()> {
        self.events.write().extend(events);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::RemovalReason;

    #[tokio::test]
    async fn test_logging_publisher() {
        let publisher = LoggingEventPublisher::info_level();
        let event = DomainEvent::drive_plugged(0, "14 4d", "SN-0");

        publisher.publish(event).await.unwrap();
        publisher
            .publish_all(vec![DomainEvent::drive_recovered(0)])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_in_memory_collector() {
        let collector = InMemoryEventCollector::new();
        assert!(collector.is_empty());

        collector
            .publish(DomainEvent::drive_plugged(1, "14 4d", "SN-1"))
            .await
            .unwrap();
        collector
            .publish_all(vec![
                DomainEvent::drive_plugged(2, "14 4d", "SN-2"),
                DomainEvent::drive_removed(1, RemovalReason::NotPresent),
            ])
            .await
            .unwrap();

        assert_eq!(collector.len(), 3);
        assert_eq!(collector.events_of_type("DrivePlugged").len(), 2);
        assert_eq!(collector.events_for_slot(1).len(), 2);

        collector.clear();
        assert!(collector.is_empty());
    }
}
