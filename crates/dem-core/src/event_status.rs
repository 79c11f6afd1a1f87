//! Event status store
//!
//! One atomic status byte per event for the internal UDS status and one for
//! the extended status. Different events never share a lock; updates of the
//! same event are serialized by the caller.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

use crate::config::DemConfig;
use crate::runtime_check::RuntimeCheck;
use crate::status::{ExtendedBit, ExtendedStatus, StatusBit, UdsStatus};
use crate::types::EventId;

/// Per-event status bytes and visibility flags
#[derive(Debug)]
pub struct EventStatusStore {
    internal: Vec<AtomicU8>,
    extended: Vec<AtomicU8>,
    available: Vec<AtomicBool>,
    suppressed: Vec<AtomicBool>,
    availability_mask: u8,
    checks: Arc<RuntimeCheck>,
}

impl EventStatusStore {
    /// Build the store with every event in the cleared state
    pub fn new(config: &DemConfig, checks: Arc<RuntimeCheck>) -> Self {
        let count = config.event_count();
        let available = (0..count)
            .map(|index| {
                let initially = config
                    .event(EventId(index as u16))
                    .map(|e| e.available)
                    .unwrap_or(false);
                AtomicBool::new(initially)
            })
            .collect();
        Self {
            internal: (0..count)
                .map(|_| AtomicU8::new(UdsStatus::CLEARED.bits()))
                .collect(),
            extended: (0..count).map(|_| AtomicU8::new(0)).collect(),
            available,
            suppressed: (0..count).map(|_| AtomicBool::new(false)).collect(),
            availability_mask: config.general.status_availability_mask,
            checks,
        }
    }

    fn slot(&self, id: EventId) -> usize {
        self.checks
            .index_or_default("event status", id.index(), self.internal.len())
    }

    /// Number of slots including the reserved slot 0
    pub fn len(&self) -> usize {
        self.internal.len()
    }

    pub fn is_empty(&self) -> bool {
        self.internal.len() <= 1
    }

    pub fn internal_status(&self, id: EventId) -> UdsStatus {
        UdsStatus::from_bits(self.internal[self.slot(id)].load(Ordering::Acquire))
    }

    pub fn set_internal_status(&self, id: EventId, status: UdsStatus) {
        self.internal[self.slot(id)].store(status.bits(), Ordering::Release);
    }

    /// Apply `f` atomically, returning `(old, new)`
    pub fn update_internal(
        &self,
        id: EventId,
        f: impl Fn(UdsStatus) -> UdsStatus,
    ) -> (UdsStatus, UdsStatus) {
        let cell = &self.internal[self.slot(id)];
        let mut current = cell.load(Ordering::Acquire);
        loop {
            let next = f(UdsStatus::from_bits(current)).bits();
            match cell.compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Acquire) {
                Ok(_) => {
                    return (UdsStatus::from_bits(current), UdsStatus::from_bits(next));
                }
                Err(actual) => current = actual,
            }
        }
    }

    pub fn set_status_bit(&self, id: EventId, bit: StatusBit) {
        self.internal[self.slot(id)].fetch_or(bit.mask(), Ordering::AcqRel);
    }

    pub fn reset_status_bit(&self, id: EventId, bit: StatusBit) {
        self.internal[self.slot(id)].fetch_and(!bit.mask(), Ordering::AcqRel);
    }

    pub fn test_status_bit(&self, id: EventId, bit: StatusBit) -> bool {
        self.internal_status(id).test(bit)
    }

    pub fn extended_status(&self, id: EventId) -> ExtendedStatus {
        ExtendedStatus::from_bits(self.extended[self.slot(id)].load(Ordering::Acquire))
    }

    pub fn set_extended_bit(&self, id: EventId, bit: ExtendedBit) {
        self.extended[self.slot(id)].fetch_or(bit.mask(), Ordering::AcqRel);
    }

    pub fn reset_extended_bit(&self, id: EventId, bit: ExtendedBit) {
        self.extended[self.slot(id)].fetch_and(!bit.mask(), Ordering::AcqRel);
    }

    pub fn test_extended_bit(&self, id: EventId, bit: ExtendedBit) -> bool {
        self.extended_status(id).test(bit)
    }

    pub fn is_available(&self, id: EventId) -> bool {
        self.available[self.slot(id)].load(Ordering::Acquire)
    }

    /// Change availability, returning the previous value
    pub fn set_available(&self, id: EventId, available: bool) -> bool {
        self.available[self.slot(id)].swap(available, Ordering::AcqRel)
    }

    pub fn is_suppressed(&self, id: EventId) -> bool {
        self.suppressed[self.slot(id)].load(Ordering::Acquire)
    }

    /// Change DTC suppression, returning the previous value
    pub fn set_suppressed(&self, id: EventId, suppressed: bool) -> bool {
        self.suppressed[self.slot(id)].swap(suppressed, Ordering::AcqRel)
    }

    /// Status as seen by an external client
    ///
    /// Derived on every call from `internal` and the current visibility
    /// flags: unavailable or suppressed events report 0, everything else is
    /// masked with the status availability mask.
    pub fn external_status(&self, id: EventId, internal: UdsStatus) -> UdsStatus {
        if !self.is_available(id) || self.is_suppressed(id) {
            return UdsStatus::default();
        }
        UdsStatus::from_bits(internal.bits() & self.availability_mask)
    }

    /// External status of the event's current internal status
    pub fn current_external_status(&self, id: EventId) -> UdsStatus {
        self.external_status(id, self.internal_status(id))
    }

    /// Aggregated DTC status over the members of a combined group
    pub fn dtc_status(&self, members: &[EventId]) -> UdsStatus {
        UdsStatus::combine(
            members
                .iter()
                .filter(|id| self.is_available(**id))
                .map(|id| self.current_external_status(*id)),
        )
    }

    /// Reset an event to the cleared state
    pub fn reset(&self, id: EventId) {
        let slot = self.slot(id);
        self.internal[slot].store(UdsStatus::CLEARED.bits(), Ordering::Release);
        self.extended[slot].store(0, Ordering::Release);
    }
}
