//! OBD readiness-group bookkeeping
//!
//! The dispatcher forwards every event outcome to a [`ReadinessProcessing`]
//! implementation. [`ReadinessTracker`] is the default one; integrators with
//! their own readiness state machine plug in a different implementation.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::DemConfig;
use crate::processed_set::CombinedGroupSet;
use crate::status::{EventEffects, UdsStatus};
use crate::types::EventId;

/// OBD readiness groups (SAE J1979 monitor groups)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadinessGroup {
    Misfire,
    FuelSystem,
    Comprehensive,
    Catalyst,
    HeatedCatalyst,
    Evap,
    SecondaryAir,
    AcRefrigerant,
    O2Sensor,
    O2SensorHeater,
    Egr,
    BoostPressure,
    NoxAftertreatment,
    PmFilter,
}

impl ReadinessGroup {
    pub const ALL: [ReadinessGroup; 14] = [
        ReadinessGroup::Misfire,
        ReadinessGroup::FuelSystem,
        ReadinessGroup::Comprehensive,
        ReadinessGroup::Catalyst,
        ReadinessGroup::HeatedCatalyst,
        ReadinessGroup::Evap,
        ReadinessGroup::SecondaryAir,
        ReadinessGroup::AcRefrigerant,
        ReadinessGroup::O2Sensor,
        ReadinessGroup::O2SensorHeater,
        ReadinessGroup::Egr,
        ReadinessGroup::BoostPressure,
        ReadinessGroup::NoxAftertreatment,
        ReadinessGroup::PmFilter,
    ];

    fn index(self) -> usize {
        self as usize
    }
}

/// Readiness collaborator of the diagnostic observer
#[cfg_attr(test, mockall::automock)]
pub trait ReadinessProcessing: Send + Sync {
    fn event_failed(&self, event: EventId, effects: EventEffects);
    fn event_passed(&self, event: EventId, effects: EventEffects);
    /// `old_status` is the status captured before the clear reset any bit
    fn event_cleared(&self, event: EventId, old_status: UdsStatus);
    fn pdtc_disabled(&self, event: EventId);
    fn event_healed(&self, event: EventId);
    /// Effects deferred to the next main function call
    fn availability_changed_async(&self, event: EventId, available: bool);
    /// Effects applied within the availability call
    fn availability_changed_sync(&self, event: EventId, available: bool);
    fn dcy_qualified(&self, event: EventId);
    fn driving_cycle_end(&self);
    fn warmup_cycle_end(&self);
    fn cycle_restart(&self);
}

/// Bookkeeping state of one readiness group
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GroupStatus {
    /// Every monitor of the group has completed since last clear
    pub completed: bool,
    /// A monitor of the group is disabled this cycle
    pub disabled: bool,
    /// A monitor of the group reported a failure since last clear
    pub failed: bool,
    /// A monitor of the group has a pending fault
    pub pending: bool,
    /// Driving cycle qualified for this group
    pub dcy_qualified: bool,
}

#[derive(Debug, Default)]
struct TrackerState {
    groups: Vec<GroupStatus>,
    tested: Vec<bool>,
    warmup_cycles: u16,
}

/// Default readiness bookkeeping
#[derive(Debug)]
pub struct ReadinessTracker {
    groups: Vec<Option<ReadinessGroup>>,
    state: Mutex<TrackerState>,
}

impl ReadinessTracker {
    pub fn new(config: &DemConfig) -> Self {
        let mut groups = vec![None; config.event_count()];
        for event in &config.events {
            if let Some(slot) = groups.get_mut(event.id as usize) {
                *slot = event.readiness_group;
            }
        }
        let count = groups.len();
        Self {
            groups,
            state: Mutex::new(TrackerState {
                groups: vec![GroupStatus::default(); ReadinessGroup::ALL.len()],
                tested: vec![false; count],
                warmup_cycles: 0,
            }),
        }
    }

    fn group_of(&self, event: EventId) -> Option<ReadinessGroup> {
        self.groups.get(event.index()).copied().flatten()
    }

    /// Apply `f` to the group of `event`, then recompute completion
    fn with_group(&self, event: EventId, f: impl FnOnce(&mut GroupStatus, &mut [bool])) {
        let Some(group) = self.group_of(event) else {
            return;
        };
        let mut state = self.state.lock();
        let TrackerState { groups, tested, .. } = &mut *state;
        f(&mut groups[group.index()], tested);
        groups[group.index()].completed = self
            .groups
            .iter()
            .enumerate()
            .filter(|(_, g)| **g == Some(group))
            .all(|(index, _)| tested[index]);
    }

    pub fn group_status(&self, group: ReadinessGroup) -> GroupStatus {
        self.state.lock().groups[group.index()]
    }

    /// Status of every group that has at least one configured event
    pub fn summary(&self) -> Vec<(ReadinessGroup, GroupStatus)> {
        let state = self.state.lock();
        ReadinessGroup::ALL
            .iter()
            .filter(|group| self.groups.contains(&Some(**group)))
            .map(|group| (*group, state.groups[group.index()]))
            .collect()
    }

    pub fn warmup_cycles(&self) -> u16 {
        self.state.lock().warmup_cycles
    }
}

impl ReadinessProcessing for ReadinessTracker {
    fn event_failed(&self, event: EventId, effects: EventEffects) {
        let index = event.index();
        self.with_group(event, |group, tested| {
            tested[index] = true;
            group.failed = true;
            if effects.contains(EventEffects::PENDING) {
                group.pending = true;
            }
        });
    }

    fn event_passed(&self, event: EventId, _effects: EventEffects) {
        let index = event.index();
        self.with_group(event, |_, tested| tested[index] = true);
    }

    fn event_cleared(&self, event: EventId, old_status: UdsStatus) {
        let index = event.index();
        self.with_group(event, |group, tested| {
            tested[index] = false;
            group.failed = false;
            group.pending = false;
        });
        debug!(event = %event, old_status = %old_status, "Readiness cleared");
    }

    fn pdtc_disabled(&self, event: EventId) {
        self.with_group(event, |group, _| group.pending = false);
    }

    fn event_healed(&self, event: EventId) {
        self.with_group(event, |group, _| group.failed = false);
    }

    fn availability_changed_async(&self, event: EventId, available: bool) {
        // An unavailable monitor cannot block completion
        let index = event.index();
        if !available {
            self.with_group(event, |_, tested| tested[index] = true);
        }
    }

    fn availability_changed_sync(&self, event: EventId, available: bool) {
        self.with_group(event, |group, _| {
            if !available {
                group.disabled = true;
            }
        });
    }

    fn dcy_qualified(&self, event: EventId) {
        self.with_group(event, |group, _| group.dcy_qualified = true);
    }

    fn driving_cycle_end(&self) {
        let mut state = self.state.lock();
        for group in &mut state.groups {
            group.dcy_qualified = false;
        }
    }

    fn warmup_cycle_end(&self) {
        let mut state = self.state.lock();
        state.warmup_cycles = state.warmup_cycles.saturating_add(1);
    }

    fn cycle_restart(&self) {
        let mut state = self.state.lock();
        for group in &mut state.groups {
            group.disabled = false;
        }
    }
}

/// Iterates the DTC-bearing events of one readiness group
///
/// Events come in ascending id order. Events sharing a combined DTC group
/// are reported once, through the first (master) member.
#[derive(Debug, Clone)]
pub struct ReadinessGroupFilter<'a> {
    config: &'a DemConfig,
    group: ReadinessGroup,
    next: usize,
    processed: CombinedGroupSet,
}

impl<'a> ReadinessGroupFilter<'a> {
    pub fn new(config: &'a DemConfig, group: ReadinessGroup) -> Self {
        Self {
            config,
            group,
            next: 0,
            processed: CombinedGroupSet::new(),
        }
    }

    /// Restart the pass, optionally for another group
    pub fn reinit(&mut self, group: ReadinessGroup) {
        self.group = group;
        self.next = 0;
        self.processed.clear();
    }
}

impl Iterator for ReadinessGroupFilter<'_> {
    type Item = EventId;

    fn next(&mut self) -> Option<EventId> {
        while let Some(event) = self.config.events.get(self.next) {
            self.next += 1;
            if event.readiness_group != Some(self.group) || event.dtc.is_none() {
                continue;
            }
            if let Some(combined) = event.combined_group {
                if !self.processed.insert(combined) {
                    continue;
                }
            }
            return Some(event.event_id());
        }
        None
    }
}
