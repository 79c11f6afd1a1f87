//! Operation cycle tracker
//!
//! Keeps one monotonic, wrapping counter per configured operation cycle.
//! All cycle-relative statistics are computed as modular distances between
//! a stored counter value and the current one.

use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;

use tracing::debug;

use crate::config::{CycleKind, DemConfig};
use crate::error::{DemError, DemResult, RangeError};
use crate::runtime_check::RuntimeCheck;
use crate::types::CycleStamp;

/// Distance at which a stored cycle stamp is latched
pub const LATCH_DISTANCE: u16 = 0xFF;

/// Modular distance from `from` forward to `to`
///
/// Wraps safely across counter rollover: `distance(0xFFFF, 1) == 2`.
pub fn cycle_distance(from: u16, to: u16) -> u16 {
    to.wrapping_sub(from)
}

/// Report value of a stored cycle stamp relative to `current`
pub fn stamp_report(stamp: CycleStamp, current: u16) -> u8 {
    match stamp {
        CycleStamp::Invalid => 0,
        CycleStamp::Latched => 0xFF,
        CycleStamp::At(cycle) => u8::try_from(cycle_distance(cycle, current)).unwrap_or(0xFF),
    }
}

/// Latch a stamp whose distance no longer fits the report width
pub fn latch_stamp(stamp: CycleStamp, current: u16) -> CycleStamp {
    match stamp {
        CycleStamp::At(cycle) if cycle_distance(cycle, current) >= LATCH_DISTANCE => {
            CycleStamp::Latched
        }
        other => other,
    }
}

#[derive(Debug)]
struct CycleSlot {
    id: u8,
    kind: CycleKind,
    counter: AtomicU16,
}

/// Per-cycle counters
#[derive(Debug)]
pub struct OperationCycleTracker {
    slots: Vec<CycleSlot>,
    checks: Arc<RuntimeCheck>,
}

impl OperationCycleTracker {
    pub fn new(config: &DemConfig, checks: Arc<RuntimeCheck>) -> Self {
        let slots = config
            .operation_cycles
            .iter()
            .map(|def| CycleSlot {
                id: def.id,
                kind: def.kind,
                counter: AtomicU16::new(0),
            })
            .collect();
        Self { slots, checks }
    }

    fn slot(&self, id: u8) -> DemResult<&CycleSlot> {
        self.slots
            .iter()
            .find(|s| s.id == id)
            .ok_or(DemError::InvalidCycle(id))
    }

    /// Current counter of a cycle; unknown ids read as 0 after a runtime check
    pub fn count(&self, id: u8) -> u16 {
        match self.slot(id) {
            Ok(slot) => slot.counter.load(Ordering::Acquire),
            Err(_) => {
                self.checks.report(RangeError {
                    what: "operation cycle",
                    index: id as usize,
                    len: self.slots.len(),
                });
                0
            }
        }
    }

    /// Stamp of the current cycle
    pub fn stamp(&self, id: u8) -> CycleStamp {
        CycleStamp::At(self.count(id))
    }

    /// Kind of a configured cycle
    pub fn kind(&self, id: u8) -> DemResult<CycleKind> {
        Ok(self.slot(id)?.kind)
    }

    /// End the current cycle and begin the next; returns the new counter
    pub fn advance(&self, id: u8) -> DemResult<u16> {
        let slot = self.slot(id)?;
        let next = slot.counter.fetch_add(1, Ordering::AcqRel).wrapping_add(1);
        debug!(cycle = id, counter = next, "Operation cycle advanced");
        Ok(next)
    }

    /// Restore a counter from persisted state
    pub fn restore(&self, id: u8, counter: u16) -> DemResult<()> {
        self.slot(id)?.counter.store(counter, Ordering::Release);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OperationCycleDef;

    fn tracker() -> OperationCycleTracker {
        let mut config = DemConfig::default();
        config.operation_cycles.push(OperationCycleDef {
            id: 4,
            name: "warmup".to_string(),
            kind: CycleKind::WarmUp,
        });
        OperationCycleTracker::new(&config, Arc::new(RuntimeCheck::new()))
    }

    #[test]
    fn test_distance_wraps() {
        assert_eq!(cycle_distance(5, 5), 0);
        assert_eq!(cycle_distance(5, 9), 4);
        assert_eq!(cycle_distance(0xFFFF, 1), 2);
        assert_eq!(cycle_distance(0xFFF0, 0x0010), 0x20);
    }

    #[test]
    fn test_stamp_report_sentinels() {
        assert_eq!(stamp_report(CycleStamp::Invalid, 100), 0);
        assert_eq!(stamp_report(CycleStamp::Latched, 100), 0xFF);
        assert_eq!(stamp_report(CycleStamp::At(90), 100), 10);
        assert_eq!(stamp_report(CycleStamp::At(0xFFFE), 3), 5);
    }

    #[test]
    fn test_latch_stamp() {
        assert_eq!(latch_stamp(CycleStamp::At(0), 0xFE), CycleStamp::At(0));
        assert_eq!(latch_stamp(CycleStamp::At(0), 0xFF), CycleStamp::Latched);
        assert_eq!(latch_stamp(CycleStamp::Invalid, 0xFFFF), CycleStamp::Invalid);
    }

    #[test]
    fn test_advance_and_kind() {
        let tracker = tracker();
        assert_eq!(tracker.count(4), 0);
        assert_eq!(tracker.advance(4).unwrap(), 1);
        assert_eq!(tracker.advance(4).unwrap(), 2);
        assert_eq!(tracker.count(0), 0);
        assert_eq!(tracker.kind(4).unwrap(), CycleKind::WarmUp);
    }

    #[test]
    fn test_advance_wraps_counter() {
        let tracker = tracker();
        tracker.restore(0, u16::MAX).unwrap();
        assert_eq!(tracker.advance(0).unwrap(), 0);
    }

    #[test]
    fn test_unknown_cycle_fails_soft() {
        let checks = Arc::new(RuntimeCheck::new());
        let tracker = OperationCycleTracker::new(&DemConfig::default(), checks.clone());
        assert_eq!(tracker.count(42), 0);
        assert_eq!(checks.violations(), 1);
        assert!(matches!(tracker.advance(42), Err(DemError::InvalidCycle(42))));
    }
}
