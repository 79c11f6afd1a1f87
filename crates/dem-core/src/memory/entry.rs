//! Fault memory entry and its aging state machine

use serde::Serialize;

use crate::status::UdsStatus;
use crate::types::{CycleStamp, EventId};

/// Aging state of a stored entry
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AgingStatus {
    /// Stored, failing or not yet eligible for aging
    #[default]
    None,
    /// Counting clean cycles towards the aging target
    Ageing,
    /// Can never age
    Latched,
    /// Aging target reached
    Aged,
}

impl AgingStatus {
    /// `Aged` and `Latched` bypass the cycle-distance formula
    pub fn is_terminal(self) -> bool {
        matches!(self, AgingStatus::Aged | AgingStatus::Latched)
    }
}

/// One slot of a bounded fault memory
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemoryEntry {
    /// Owning event, `INVALID` when the slot is free
    pub event_id: EventId,
    /// Chronological order inside the pool
    pub timestamp: u32,
    /// Number of qualified failures while stored
    pub occurrence_counter: u16,
    /// Operation cycles with at least one failure while stored
    pub failed_cycle_counter: u8,
    /// Failed cycles since the pending bit was last set
    pub fault_pending_counter: u8,
    /// Aging state
    pub aging_status: AgingStatus,
    /// Aging cycle counter value at which aging completes
    pub aging_target_cycle: u16,
    /// Operation cycle of the first failure
    pub first_failed: CycleStamp,
    /// Operation cycle of the most recent failure
    pub last_failed: CycleStamp,
    /// Warm-up cycle of the most recent failure
    pub warmup_last_failed: CycleStamp,
    /// Highest fault detection counter while stored
    pub max_fdc: i8,
    /// Freeze frame captured on allocation, see [`freeze_frame`]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<Vec<u8>>,
}

impl Default for MemoryEntry {
    fn default() -> Self {
        Self::free()
    }
}

impl MemoryEntry {
    /// An unoccupied slot
    pub fn free() -> Self {
        Self {
            event_id: EventId::INVALID,
            timestamp: 0,
            occurrence_counter: 0,
            failed_cycle_counter: 0,
            fault_pending_counter: 0,
            aging_status: AgingStatus::None,
            aging_target_cycle: 0,
            first_failed: CycleStamp::Invalid,
            last_failed: CycleStamp::Invalid,
            warmup_last_failed: CycleStamp::Invalid,
            max_fdc: 0,
            snapshot: None,
        }
    }

    /// A freshly allocated slot for `event_id`
    pub fn occupied(event_id: EventId, timestamp: u32, latched: bool) -> Self {
        Self {
            event_id,
            timestamp,
            aging_status: if latched {
                AgingStatus::Latched
            } else {
                AgingStatus::None
            },
            ..Self::free()
        }
    }

    pub fn is_free(&self) -> bool {
        !self.event_id.is_valid()
    }

    /// Record a qualified failure
    ///
    /// Counters saturate at their storage width. A failure stops any aging
    /// in progress; `Latched` stays latched.
    pub fn record_failure(&mut self, new_failed_cycle: bool, stamp: CycleStamp, warmup: CycleStamp) {
        self.occurrence_counter = self.occurrence_counter.saturating_add(1);
        if new_failed_cycle {
            self.failed_cycle_counter = self.failed_cycle_counter.saturating_add(1);
            self.fault_pending_counter = self.fault_pending_counter.saturating_add(1);
        }
        if self.first_failed == CycleStamp::Invalid {
            self.first_failed = stamp;
        }
        self.last_failed = stamp;
        self.warmup_last_failed = warmup;
        if self.aging_status != AgingStatus::Latched {
            self.aging_status = AgingStatus::None;
        }
    }

    /// Begin counting clean cycles; returns true if aging started
    pub fn start_aging(&mut self, target_cycle: u16) -> bool {
        if self.aging_status != AgingStatus::None {
            return false;
        }
        self.aging_status = AgingStatus::Ageing;
        self.aging_target_cycle = target_cycle;
        true
    }

    /// Shift the aging target by one cycle (cycle did not count)
    pub fn postpone_aging(&mut self) {
        if self.aging_status == AgingStatus::Ageing {
            self.aging_target_cycle = self.aging_target_cycle.wrapping_add(1);
        }
    }

    /// Check completion against the current aging cycle counter
    pub fn complete_aging_if_due(&mut self, current_cycle: u16) -> bool {
        if self.aging_status == AgingStatus::Ageing && self.aging_target_cycle == current_cycle {
            self.aging_status = AgingStatus::Aged;
            return true;
        }
        false
    }
}

/// Freeze frame bytes: `[status, fdc, cycle_hi, cycle_lo]`
pub fn freeze_frame(status: UdsStatus, fdc: i8, cycle: u16) -> Vec<u8> {
    let [high, low] = cycle.to_be_bytes();
    vec![status.bits(), fdc as u8, high, low]
}
