//! Diagnostic test result (DTR) store

use parking_lot::Mutex;
use serde::Serialize;
use tracing::debug;

use crate::config::DemConfig;
use crate::error::{DemError, DemResult};
use crate::types::EventId;

/// Last reported value of one DTR
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DtrValue {
    pub test_value: i32,
    pub lower_limit: i32,
    pub upper_limit: i32,
}

impl DtrValue {
    pub fn in_limits(&self) -> bool {
        self.lower_limit <= self.test_value && self.test_value <= self.upper_limit
    }
}

#[derive(Debug)]
struct DtrSlot {
    id: u16,
    event: EventId,
    defaults: DtrValue,
    value: Mutex<DtrValue>,
}

/// Test result records tied to events
#[derive(Debug)]
pub struct DtrStore {
    slots: Vec<DtrSlot>,
}

impl DtrStore {
    pub fn new(config: &DemConfig) -> Self {
        let slots = config
            .dtrs
            .iter()
            .map(|def| {
                let defaults = DtrValue {
                    test_value: 0,
                    lower_limit: def.lower_limit,
                    upper_limit: def.upper_limit,
                };
                DtrSlot {
                    id: def.id,
                    event: EventId(def.event),
                    defaults,
                    value: Mutex::new(defaults),
                }
            })
            .collect();
        Self { slots }
    }

    fn slot(&self, id: u16) -> DemResult<&DtrSlot> {
        self.slots
            .iter()
            .find(|s| s.id == id)
            .ok_or(DemError::UnknownDtr(id))
    }

    /// Store a monitor's test value and limits
    pub fn report(&self, id: u16, value: DtrValue) -> DemResult<()> {
        let slot = self.slot(id)?;
        *slot.value.lock() = value;
        Ok(())
    }

    pub fn get(&self, id: u16) -> DemResult<DtrValue> {
        Ok(*self.slot(id)?.value.lock())
    }

    /// Reset every DTR owned by `event` to its configured limits
    pub fn reset_for_event(&self, event: EventId) {
        for slot in self.slots.iter().filter(|s| s.event == event) {
            *slot.value.lock() = slot.defaults;
            debug!(dtr = slot.id, event = %event, "DTR reset");
        }
    }
}
