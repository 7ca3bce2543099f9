//! Signal Reader
//!
//! Reads the presence and power-good lines of a slot with a bounded retry
//! budget. The budget is authoritative: once it is spent the read fails with
//! [`Error::SignalAccess`] and the caller decides what the slot becomes.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, warn};

use crate::config::SlotConfig;
use crate::domain::{SignalRef, SignalSource};
use crate::error::{Error, Result};

/// Presence line value meaning "drive inserted" (active low).
pub const PRESENT_ACTIVE: &str = "0";

/// Power-good line value meaning "power stable" (active high).
pub const POWER_GOOD_ACTIVE: &str = "1";

// =============================================================================
// Retry Policy
// =============================================================================

/// How often, and how far apart, a failing signal read is attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first (at least 1)
    pub max_attempts: u32,
    /// Pause between consecutive attempts
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// Retry without pausing.
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::ZERO)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_millis(100),
        }
    }
}

// =============================================================================
// Signal Reader
// =============================================================================

/// Reads binary hardware lines through a [`SignalSource`].
#[derive(Clone)]
pub struct SignalReader {
    source: Arc<dyn SignalSource>,
    policy: RetryPolicy,
}

impl SignalReader {
    pub fn new(source: Arc<dyn SignalSource>, policy: RetryPolicy) -> Self {
        Self { source, policy }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Read the raw content of a line, retrying transient failures.
    pub async fn read_raw(&self, signal: SignalRef) -> Result<String> {
        let mut attempt = 0;

        loop {
            attempt += 1;

            match self.source.read(signal).await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.policy.max_attempts => {
                    warn!(%signal, attempt, "Can not read signal, retrying: {}", e);
                    if !self.policy.delay.is_zero() {
                        sleep(self.policy.delay).await;
                    }
                }
                Err(e) => {
                    warn!(%signal, attempt, "Giving up on signal: {}", e);
                    return Err(Error::SignalAccess {
                        signal: signal.to_string(),
                        attempts: attempt,
                    });
                }
            }
        }
    }

    /// Read a line and compare it with its active value. Any content other
    /// than the active value counts as "not asserted".
    pub async fn is_asserted(&self, signal: SignalRef, active: &str) -> Result<bool> {
        let raw = self.read_raw(signal).await?;
        let asserted = raw.trim() == active;
        debug!(%signal, value = %raw.trim(), asserted, "Signal read");
        Ok(asserted)
    }

    pub async fn read_presence(&self, slot: &SlotConfig) -> Result<bool> {
        self.is_asserted(slot.present_pin, PRESENT_ACTIVE).await
    }

    pub async fn read_power_good(&self, slot: &SlotConfig) -> Result<bool> {
        self.is_asserted(slot.power_good_pin, POWER_GOOD_ACTIVE).await
    }
}

impl std::fmt::Debug for SignalReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalReader")
            .field("policy", &self.policy)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::InMemorySignals;
    use assert_matches::assert_matches;

    fn reader(signals: &Arc<InMemorySignals>, attempts: u32) -> SignalReader {
        SignalReader::new(signals.clone(), RetryPolicy::immediate(attempts))
    }

    #[tokio::test]
    async fn test_presence_active_low() {
        let signals = Arc::new(InMemorySignals::new());
        let slot = SlotConfig::new(0, 6, 148, 161);
        let reader = reader(&signals, 3);

        signals.set(SignalRef(148), "0");
        assert!(reader.read_presence(&slot).await.unwrap());

        signals.set(SignalRef(148), "1");
        assert!(!reader.read_presence(&slot).await.unwrap());
    }

    #[tokio::test]
    async fn test_power_good_active_high() {
        let signals = Arc::new(InMemorySignals::new());
        let slot = SlotConfig::new(0, 6, 148, 161);
        let reader = reader(&signals, 3);

        signals.set(SignalRef(161), "1\n");
        assert!(reader.read_power_good(&slot).await.unwrap());

        signals.set(SignalRef(161), "0");
        assert!(!reader.read_power_good(&slot).await.unwrap());
    }

    #[tokio::test]
    async fn test_unexpected_content_not_asserted() {
        let signals = Arc::new(InMemorySignals::new());
        let reader = reader(&signals, 3);

        signals.set(SignalRef(7), "garbage");
        assert!(!reader.is_asserted(SignalRef(7), "1").await.unwrap());

        signals.set(SignalRef(7), "");
        assert!(!reader.is_asserted(SignalRef(7), "0").await.unwrap());
    }

    #[tokio::test]
    async fn test_transient_failure_recovers_within_budget() {
        let signals = Arc::new(InMemorySignals::new());
        signals.set(SignalRef(148), "0");
        signals.fail_next(SignalRef(148), 2);

        let reader = reader(&signals, 3);
        assert_eq!(reader.read_raw(SignalRef(148)).await.unwrap(), "0");
        assert_eq!(signals.read_count(SignalRef(148)), 3);
    }

    #[tokio::test]
    async fn test_retry_ceiling_is_authoritative() {
        let signals = Arc::new(InMemorySignals::new());
        signals.set(SignalRef(148), "0");
        signals.fail_next(SignalRef(148), 10);

        let reader = reader(&signals, 3);
        let err = reader.read_raw(SignalRef(148)).await.unwrap_err();

        assert_matches!(err, Error::SignalAccess { attempts: 3, .. });
        assert_eq!(signals.read_count(SignalRef(148)), 3);
    }

    #[tokio::test]
    async fn test_unknown_signal_fails() {
        let signals = Arc::new(InMemorySignals::new());
        let reader = reader(&signals, 2);
        assert_matches!(
            reader.read_raw(SignalRef(99)).await,
            Err(Error::SignalAccess { attempts: 2, .. })
        );
    }

    #[test]
    fn test_retry_policy_floor() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts, 1);
        assert_eq!(RetryPolicy::default().delay, Duration::from_millis(100));
    }
}
