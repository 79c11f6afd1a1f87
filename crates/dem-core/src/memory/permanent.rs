//! Permanent DTC memory

use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info};

use crate::config::PermanentConfig;
use crate::runtime_check::RuntimeCheck;
use crate::types::EventId;

/// State of a permanent entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PermanentState {
    /// Stored while the fault is present
    Active,
    /// Fault gone, erased at the end of the next qualified driving cycle
    Passive,
}

/// One occupied permanent slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PermanentEntry {
    pub event_id: EventId,
    pub state: PermanentState,
}

#[derive(Debug)]
struct PermanentSlots {
    entries: Vec<Option<PermanentEntry>>,
    dirty: Vec<bool>,
}

/// Bounded permanent memory keyed by master event
#[derive(Debug)]
pub struct PermanentMemory {
    nv_block_base: u16,
    slots: Mutex<PermanentSlots>,
    checks: Arc<RuntimeCheck>,
}

impl PermanentMemory {
    pub fn new(config: &PermanentConfig, checks: Arc<RuntimeCheck>) -> Self {
        Self {
            nv_block_base: config.nv_block_base,
            slots: Mutex::new(PermanentSlots {
                entries: vec![None; config.size],
                dirty: vec![false; config.size],
            }),
            checks,
        }
    }

    pub fn size(&self) -> usize {
        self.slots.lock().entries.len()
    }

    pub fn is_full(&self) -> bool {
        self.slots.lock().entries.iter().all(Option::is_some)
    }

    /// Slot and state of the entry for `event`
    pub fn find(&self, event: EventId) -> Option<(usize, PermanentState)> {
        self.slots
            .lock()
            .entries
            .iter()
            .enumerate()
            .find_map(|(index, slot)| match slot {
                Some(entry) if entry.event_id == event => Some((index, entry.state)),
                _ => None,
            })
    }

    /// Store `event` as active; returns its slot, or `None` if full
    ///
    /// A passive entry of `event` becomes active again.
    pub fn add(&self, event: EventId) -> Option<usize> {
        let mut slots = self.slots.lock();
        let PermanentSlots { entries, dirty } = &mut *slots;
        if let Some((index, entry)) = entries
            .iter_mut()
            .enumerate()
            .find_map(|(index, slot)| {
                slot.as_mut()
                    .filter(|entry| entry.event_id == event)
                    .map(|entry| (index, entry))
            })
        {
            if entry.state == PermanentState::Passive {
                entry.state = PermanentState::Active;
                dirty[index] = true;
                debug!(event = %event, index, "Permanent DTC active again");
            }
            return Some(index);
        }
        let index = entries.iter().position(Option::is_none)?;
        entries[index] = Some(PermanentEntry {
            event_id: event,
            state: PermanentState::Active,
        });
        dirty[index] = true;
        info!(event = %event, index, "Permanent DTC stored");
        Some(index)
    }

    pub fn set_state(&self, index: usize, state: PermanentState) {
        let mut slots = self.slots.lock();
        let PermanentSlots { entries, dirty } = &mut *slots;
        if let Some(Some(entry)) = entries.get_mut(index) {
            if entry.state != state {
                entry.state = state;
                dirty[index] = true;
            }
        }
    }

    pub fn free(&self, index: usize) {
        let mut slots = self.slots.lock();
        if let Some(slot) = slots.entries.get_mut(index) {
            if let Some(entry) = slot.take() {
                debug!(event = %entry.event_id, index, "Permanent DTC erased");
                slots.dirty[index] = true;
            }
        }
    }

    /// Occupied entries with their slots
    pub fn entries(&self) -> Vec<(usize, PermanentEntry)> {
        self.slots
            .lock()
            .entries
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.map(|entry| (index, entry)))
            .collect()
    }

    pub fn nv_block_index(&self, index: usize) -> Option<u16> {
        if index >= self.size() {
            return None;
        }
        let block = super::nv_block(self.nv_block_base, index);
        if block.is_none() {
            self.checks.report(super::nv_block_overflow(self.nv_block_base, index));
        }
        block
    }

    pub fn take_dirty_blocks(&self) -> Vec<u16> {
        let mut slots = self.slots.lock();
        let base = self.nv_block_base;
        slots
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
