//! Memory-independent per-event counters
//!
//! Trip (fault-pending), failed-cycle and healing counters plus the fault
//! detection counter are kept per event, outside any memory entry, so events
//! that are not (yet) stored still qualify and heal.

use std::sync::atomic::{AtomicI8, AtomicU8, Ordering};
use std::sync::Arc;

use crate::runtime_check::RuntimeCheck;
use crate::types::EventId;

/// Saturating increment of an atomic counter; returns the new value
fn saturating_increment(cell: &AtomicU8) -> u8 {
    match cell.fetch_update(Ordering::AcqRel, Ordering::Acquire, |v| v.checked_add(1)) {
        Ok(previous) => previous + 1,
        Err(saturated) => saturated,
    }
}

/// Counter table indexed by event id
#[derive(Debug)]
pub struct EventCounters {
    fault_pending: Vec<AtomicU8>,
    failed_cycles: Vec<AtomicU8>,
    healing: Vec<AtomicU8>,
    fdc: Vec<AtomicI8>,
    max_fdc: Vec<AtomicI8>,
    checks: Arc<RuntimeCheck>,
}

impl EventCounters {
    pub fn new(event_count: usize, checks: Arc<RuntimeCheck>) -> Self {
        Self {
            fault_pending: (0..event_count).map(|_| AtomicU8::new(0)).collect(),
            failed_cycles: (0..event_count).map(|_| AtomicU8::new(0)).collect(),
            healing: (0..event_count).map(|_| AtomicU8::new(0)).collect(),
            fdc: (0..event_count).map(|_| AtomicI8::new(0)).collect(),
            max_fdc: (0..event_count).map(|_| AtomicI8::new(0)).collect(),
            checks,
        }
    }

    fn slot(&self, id: EventId) -> usize {
        self.checks
            .index_or_default("event counters", id.index(), self.fault_pending.len())
    }

    /// Failed cycles since the pending bit was last set (trip counter)
    pub fn fault_pending(&self, id: EventId) -> u8 {
        self.fault_pending[self.slot(id)].load(Ordering::Acquire)
    }

    pub fn increment_fault_pending(&self, id: EventId) -> u8 {
        saturating_increment(&self.fault_pending[self.slot(id)])
    }

    pub fn reset_fault_pending(&self, id: EventId) {
        self.fault_pending[self.slot(id)].store(0, Ordering::Release);
    }

    /// Cycles with at least one failure since last clear
    pub fn failed_cycles(&self, id: EventId) -> u8 {
        self.failed_cycles[self.slot(id)].load(Ordering::Acquire)
    }

    pub fn increment_failed_cycles(&self, id: EventId) -> u8 {
        saturating_increment(&self.failed_cycles[self.slot(id)])
    }

    /// Consecutive passed cycles since the last failure
    pub fn healing(&self, id: EventId) -> u8 {
        self.healing[self.slot(id)].load(Ordering::Acquire)
    }

    pub fn increment_healing(&self, id: EventId) -> u8 {
        saturating_increment(&self.healing[self.slot(id)])
    }

    pub fn reset_healing(&self, id: EventId) {
        self.healing[self.slot(id)].store(0, Ordering::Release);
    }

    /// Most recently reported fault detection counter
    pub fn fdc(&self, id: EventId) -> i8 {
        self.fdc[self.slot(id)].load(Ordering::Acquire)
    }

    /// Maximum fault detection counter since last clear
    pub fn max_fdc(&self, id: EventId) -> i8 {
        self.max_fdc[self.slot(id)].load(Ordering::Acquire)
    }

    /// Record a monitor FDC; returns the maximum since last clear
    pub fn report_fdc(&self, id: EventId, value: i8) -> i8 {
        let slot = self.slot(id);
        self.fdc[slot].store(value, Ordering::Release);
        self.max_fdc[slot].fetch_max(value, Ordering::AcqRel).max(value)
    }

    /// Reset the current FDC (new cycle or qualified result)
    pub fn reset_fdc(&self, id: EventId) {
        self.fdc[self.slot(id)].store(0, Ordering::Release);
    }

    /// Reset every counter of one event
    pub fn reset(&self, id: EventId) {
        let slot = self.slot(id);
        self.fault_pending[slot].store(0, Ordering::Release);
        self.failed_cycles[slot].store(0, Ordering::Release);
        self.healing[slot].store(0, Ordering::Release);
        self.fdc[slot].store(0, Ordering::Release);
        self.max_fdc[slot].store(0, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counters() -> EventCounters {
        EventCounters::new(4, Arc::new(RuntimeCheck::new()))
    }

    #[test]
    fn test_increments_saturate() {
        let counters = counters();
        for _ in 0..300 {
            counters.increment_failed_cycles(EventId(1));
        }
        assert_eq!(counters.failed_cycles(EventId(1)), u8::MAX);
        assert_eq!(counters.increment_failed_cycles(EventId(1)), u8::MAX);
    }

    #[test]
    fn test_max_fdc_tracks_peak() {
        let counters = counters();
        assert_eq!(counters.report_fdc(EventId(2), 40), 40);
        assert_eq!(counters.report_fdc(EventId(2), -20), 40);
        assert_eq!(counters.fdc(EventId(2)), -20);
        assert_eq!(counters.report_fdc(EventId(2), 127), 127);
        assert_eq!(counters.max_fdc(EventId(2)), 127);
    }

    #[test]
    fn test_reset_clears_all() {
        let counters = counters();
        counters.increment_fault_pending(EventId(3));
        counters.increment_healing(EventId(3));
        counters.report_fdc(EventId(3), 10);
        counters.reset(EventId(3));
        assert_eq!(counters.fault_pending(EventId(3)), 0);
        assert_eq!(counters.healing(EventId(3)), 0);
        assert_eq!(counters.max_fdc(EventId(3)), 0);
    }

    #[test]
    fn test_events_are_independent() {
        let counters = counters();
        counters.increment_healing(EventId(1));
        assert_eq!(counters.healing(EventId(2)), 0);
    }
}
