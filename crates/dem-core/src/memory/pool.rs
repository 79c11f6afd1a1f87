//! Bounded pool of memory entries
//!
//! Allocation and free are atomic per pool (one `parking_lot::Mutex`).
//! Free slots are found by a linear scan at allocation time.

use std::cmp::Reverse;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::entry::MemoryEntry;
use crate::config::{DisplacementStrategy, MemoryDef, MemoryKind};
use crate::error::RangeError;
use crate::runtime_check::RuntimeCheck;
use crate::types::EventId;

/// Result of asking a pool for an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocationOutcome {
    /// The event already owned this entry
    Existing(usize),
    /// A free slot was taken
    Allocated(usize),
    /// A lower-ranked entry was evicted to make room
    Displaced { index: usize, displaced: EventId },
    /// Pool full and nothing may be displaced
    Rejected,
}

impl AllocationOutcome {
    /// Index of the entry now owned by the event
    pub fn index(self) -> Option<usize> {
        match self {
            AllocationOutcome::Existing(index)
            | AllocationOutcome::Allocated(index)
            | AllocationOutcome::Displaced { index, .. } => Some(index),
            AllocationOutcome::Rejected => None,
        }
    }

    /// Whether the event was newly stored
    pub fn is_new(self) -> bool {
        matches!(
            self,
            AllocationOutcome::Allocated(_) | AllocationOutcome::Displaced { .. }
        )
    }
}

/// What the displacement policy needs to know about stored events
pub trait DisplacementInfo {
    /// Priority of an event (1 is highest)
    fn priority(&self, event: EventId) -> u8;
    /// Whether the event is currently not failing
    fn is_passive(&self, event: EventId) -> bool;
}

/// Pick the entry to evict for a new event of `priority`
///
/// `Priority` evicts only strictly lower-priority entries; `Full` also
/// evicts passive entries of equal priority. Among eligible entries the
/// lowest priority wins, then passive over active, then the oldest.
pub fn select_victim(
    entries: &[MemoryEntry],
    priority: u8,
    strategy: DisplacementStrategy,
    info: &dyn DisplacementInfo,
) -> Option<usize> {
    if strategy == DisplacementStrategy::None {
        return None;
    }
    entries
        .iter()
        .enumerate()
        .filter(|(_, entry)| !entry.is_free())
        .filter(|(_, entry)| {
            let stored = info.priority(entry.event_id);
            stored > priority
                || (strategy == DisplacementStrategy::Full
                    && stored == priority
                    && info.is_passive(entry.event_id))
        })
        .min_by_key(|(_, entry)| {
            (
                Reverse(info.priority(entry.event_id)),
                !info.is_passive(entry.event_id),
                entry.timestamp,
            )
        })
        .map(|(index, _)| index)
}

#[derive(Debug)]
struct PoolState {
    entries: Vec<MemoryEntry>,
    dirty: Vec<bool>,
    next_timestamp: u32,
    aged_count: u16,
}

/// One event memory (primary, user-defined or mirror)
#[derive(Debug)]
pub struct MemoryPool {
    name: String,
    kind: MemoryKind,
    nv_block_base: u16,
    state: Mutex<PoolState>,
    checks: Arc<RuntimeCheck>,
}

impl MemoryPool {
    pub fn new(def: &MemoryDef, checks: Arc<RuntimeCheck>) -> Self {
        Self {
            name: def.name.clone(),
            kind: def.kind,
            nv_block_base: def.nv_block_base,
            state: Mutex::new(PoolState {
                entries: vec![MemoryEntry::free(); def.size],
                dirty: vec![false; def.size],
                next_timestamp: 0,
                aged_count: 0,
            }),
            checks,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> MemoryKind {
        self.kind
    }

    /// Configured number of entries
    pub fn size(&self) -> usize {
        self.state.lock().entries.len()
    }

    /// Number of occupied entries
    pub fn used(&self) -> usize {
        self.state
            .lock()
            .entries
            .iter()
            .filter(|e| !e.is_free())
            .count()
    }

    /// Index of the entry owned by `event`
    pub fn find(&self, event: EventId) -> Option<usize> {
        if !event.is_valid() {
            return None;
        }
        self.state
            .lock()
            .entries
            .iter()
            .position(|e| e.event_id == event)
    }

    /// Copy of an entry, or a range error
    pub fn entry(&self, index: usize) -> Result<MemoryEntry, RangeError> {
        let state = self.state.lock();
        let index = self
            .checks
            .check_index("memory entry", index, state.entries.len())?;
        Ok(state.entries[index].clone())
    }

    /// Copy of an entry; out-of-range indices read entry 0
    pub fn entry_safe(&self, index: usize) -> MemoryEntry {
        let state = self.state.lock();
        if state.entries.is_empty() {
            return MemoryEntry::free();
        }
        let index = self
            .checks
            .index_or_default("memory entry", index, state.entries.len());
        state.entries[index].clone()
    }

    /// Copy of the entry owned by `event`
    pub fn entry_for(&self, event: EventId) -> Option<(usize, MemoryEntry)> {
        if !event.is_valid() {
            return None;
        }
        let state = self.state.lock();
        state
            .entries
            .iter()
            .position(|e| e.event_id == event)
            .map(|index| (index, state.entries[index].clone()))
    }

    /// Occupied entries with their indices
    pub fn occupied(&self) -> Vec<(usize, MemoryEntry)> {
        self.state
            .lock()
            .entries
            .iter()
            .enumerate()
            .filter(|(_, e)| !e.is_free())
            .map(|(index, e)| (index, e.clone()))
            .collect()
    }

    /// Find or allocate the entry for `event`
    pub fn allocate(
        &self,
        event: EventId,
        latched: bool,
        strategy: DisplacementStrategy,
        ranking: &dyn DisplacementInfo,
    ) -> AllocationOutcome {
        if !event.is_valid() {
            return AllocationOutcome::Rejected;
        }
        let mut state = self.state.lock();

        if let Some(index) = state.entries.iter().position(|e| e.event_id == event) {
            return AllocationOutcome::Existing(index);
        }

        let timestamp = state.next_timestamp;
        let outcome = match state.entries.iter().position(MemoryEntry::is_free) {
            Some(index) => AllocationOutcome::Allocated(index),
            None => match select_victim(&state.entries, ranking.priority(event), strategy, ranking) {
                Some(index) => AllocationOutcome::Displaced {
                    index,
                    displaced: state.entries[index].event_id,
                },
                None => {
                    warn!(memory = %self.name, event = %event, "Memory full, event not stored");
                    return AllocationOutcome::Rejected;
                }
            },
        };

        let Some(index) = outcome.index() else {
            return outcome;
        };
        state.entries[index] = MemoryEntry::occupied(event, timestamp, latched);
        state.dirty[index] = true;
        state.next_timestamp = timestamp.wrapping_add(1);

        match outcome {
            AllocationOutcome::Displaced { displaced, .. } => info!(
                memory = %self.name,
                event = %event,
                displaced = %displaced,
                index,
                "Entry displaced"
            ),
            _ => debug!(memory = %self.name, event = %event, index, "Entry allocated"),
        }
        outcome
    }

    /// Mutate an entry in place; out-of-range indices touch entry 0
    pub fn update<R>(&self, index: usize, f: impl FnOnce(&mut MemoryEntry) -> R) -> Option<R> {
        let mut state = self.state.lock();
        if state.entries.is_empty() {
            return None;
        }
        let index = self
            .checks
            .index_or_default("memory entry", index, state.entries.len());
        state.dirty[index] = true;
        Some(f(&mut state.entries[index]))
    }

    /// Mutate the entry owned by `event`, if any
    pub fn update_event<R>(&self, event: EventId, f: impl FnOnce(&mut MemoryEntry) -> R) -> Option<R> {
        if !event.is_valid() {
            return None;
        }
        let mut state = self.state.lock();
        let index = state.entries.iter().position(|e| e.event_id == event)?;
        state.dirty[index] = true;
        Some(f(&mut state.entries[index]))
    }

    /// Visit every occupied entry; `f` returns true if it changed the entry
    pub fn for_each_occupied(&self, mut f: impl FnMut(usize, &mut MemoryEntry) -> bool) {
        let mut state = self.state.lock();
        let PoolState { entries, dirty, .. } = &mut *state;
        for (index, entry) in entries.iter_mut().enumerate() {
            if !entry.is_free() && f(index, entry) {
                dirty[index] = true;
            }
        }
    }

    /// Release an entry
    pub fn free(&self, index: usize) {
        let mut state = self.state.lock();
        if state.entries.is_empty() {
            return;
        }
        let index = self
            .checks
            .index_or_default("memory entry", index, state.entries.len());
        let owner = state.entries[index].event_id;
        state.entries[index] = MemoryEntry::free();
        state.dirty[index] = true;
        debug!(memory = %self.name, event = %owner, index, "Entry freed");
    }

    /// Release the entry owned by `event`; returns true if one existed
    pub fn free_event(&self, event: EventId) -> bool {
        match self.find(event) {
            Some(index) => {
                self.free(index);
                true
            }
            None => false,
        }
    }

    /// Record that an entry completed aging
    pub fn note_aged(&self) {
        let mut state = self.state.lock();
        state.aged_count = state.aged_count.saturating_add(1);
    }

    /// Number of entries that completed aging since start-up
    pub fn aged_count(&self) -> u16 {
        self.state.lock().aged_count
    }

    /// NV block backing an entry
    pub fn nv_block_index(&self, index: usize) -> Result<u16, RangeError> {
        let len = self.size();
        let index = self.checks.check_index("memory entry", index, len)?;
        super::nv_block(self.nv_block_base, index).ok_or_else(|| {
            let err = super::nv_block_overflow(self.nv_block_base, index);
            self.checks.report(err);
            err
        })
    }

    /// Drain the NV blocks modified since the last call
    pub fn take_dirty_blocks(&self) -> Vec<u16> {
        let mut state = self.state.lock();
        let base = self.nv_block_base;
        state
            .dirty
            .iter_mut()
            .enumerate()
            .filter_map(|(index, dirty)| {
                if !std::mem::take(dirty) {
                    return None;
                }
                let block = super::nv_block(base, index);
                if block.is_none() {
                    self.checks.report(super::nv_block_overflow(base, index));
                }
                block
            })
            .collect()
    }
}
