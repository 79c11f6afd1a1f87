//! Diagnostic event manager facade
//!
//! Owns one instance of every store and exposes the monitor-reporting
//! surface. Each call evaluates the status triggers, updates the memories
//! and hands the resulting [`EventContext`] to the observer.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::chronology::{ChronologySnapshot, FailureChronology};
use crate::config::{AgingPolicy, DemConfig, EventDef, MemoryKind, StorageTrigger};
use crate::counters::EventCounters;
use crate::cycle::{latch_stamp, OperationCycleTracker};
use crate::dtr::{DtrStore, DtrValue};
use crate::error::{DemError, DemResult};
use crate::event_status::EventStatusStore;
use crate::memory::{
    freeze_frame, AllocationOutcome, DirtyBlock, DisplacementInfo, MemoryEntry, MemoryManager,
    MemoryPool, PermanentEntry,
};
use crate::obd::{ActivationMode, ObdState};
use crate::observer::{DiagnosticObserver, EventContext};
use crate::readiness::{ReadinessGroup, ReadinessGroupFilter, ReadinessProcessing, ReadinessTracker};
use crate::runtime_check::RuntimeCheck;
use crate::statistics::{CopyInfo, EventStatistics, StatisticsEngine};
use crate::status::{EventEffects, ExtendedBit, ExtendedStatus, StatusBit, UdsStatus};
use crate::types::{CycleStamp, DtcNumber, EventId, MonitorStatus};

/// Events addressed by a clear request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum DtcSelection {
    /// Every configured event
    All,
    /// Events reporting one DTC number
    Dtc(u32),
    /// Events stored in one memory
    Memory(String),
}

/// Displacement ranking backed by configuration and live status
struct Ranking<'a> {
    config: &'a DemConfig,
    status: &'a EventStatusStore,
}

impl DisplacementInfo for Ranking<'_> {
    fn priority(&self, event: EventId) -> u8 {
        self.config.event(event).map(|e| e.priority).unwrap_or(u8::MAX)
    }

    fn is_passive(&self, event: EventId) -> bool {
        !self.status.test_status_bit(event, StatusBit::TestFailed)
    }
}

/// Diagnostic event manager instance
pub struct Dem {
    config: DemConfig,
    checks: Arc<RuntimeCheck>,
    cycles: OperationCycleTracker,
    status: EventStatusStore,
    counters: EventCounters,
    memories: MemoryManager,
    obd: ObdState,
    dtrs: DtrStore,
    chronology: FailureChronology,
    readiness: Arc<dyn ReadinessProcessing>,
    pending_availability: Mutex<VecDeque<(EventId, bool)>>,
}

impl std::fmt::Debug for Dem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dem")
            .field("events", &self.config.events.len())
            .field("memories", &self.memories)
            .field("violations", &self.checks.violations())
            .finish_non_exhaustive()
    }
}

impl Dem {
    /// Create an instance with the default readiness bookkeeping
    pub fn new(config: DemConfig) -> DemResult<Self> {
        let readiness = Arc::new(ReadinessTracker::new(&config));
        Self::with_readiness(config, readiness)
    }

    /// Create an instance with a custom readiness collaborator
    pub fn with_readiness(
        mut config: DemConfig,
        readiness: Arc<dyn ReadinessProcessing>,
    ) -> DemResult<Self> {
        config.validate()?;
        let checks = Arc::new(RuntimeCheck::new());
        let primary_range = config
            .primary_slot()
            .and_then(|slot| config.memory_event_range(slot));

        info!(
            events = config.events.len(),
            memories = config.memories.len(),
            legislation = ?config.general.legislation,
            "Diagnostic event manager initialized"
        );

        Ok(Self {
            cycles: OperationCycleTracker::new(&config, checks.clone()),
            status: EventStatusStore::new(&config, checks.clone()),
            counters: EventCounters::new(config.event_count(), checks.clone()),
            memories: MemoryManager::new(&config, checks.clone()),
            obd: ObdState::new(),
            dtrs: DtrStore::new(&config),
            chronology: FailureChronology::new(primary_range),
            readiness,
            pending_availability: Mutex::new(VecDeque::new()),
            checks,
            config,
        })
    }

    pub fn config(&self) -> &DemConfig {
        &self.config
    }

    fn observer(&self) -> DiagnosticObserver<'_> {
        DiagnosticObserver {
            config: &self.config,
            status: &self.status,
            memories: &self.memories,
            obd: &self.obd,
            dtrs: &self.dtrs,
            chronology: &self.chronology,
            readiness: self.readiness.as_ref(),
        }
    }

    fn statistics_engine(&self) -> StatisticsEngine<'_> {
        StatisticsEngine {
            config: &self.config,
            cycles: &self.cycles,
            status: &self.status,
            counters: &self.counters,
        }
    }

    fn event_def(&self, id: EventId) -> DemResult<&EventDef> {
        self.config.event(id).ok_or(DemError::InvalidEvent(id))
    }

    // =========================================================================
    // Monitor reporting
    // =========================================================================

    /// Report a qualified monitor result
    pub fn set_event_status(&self, id: EventId, result: MonitorStatus) -> DemResult<()> {
        let event = self.event_def(id)?;
        if !self.status.is_available(id) {
            debug!(event = %id, "Result of unavailable event ignored");
            return Ok(());
        }
        match result {
            MonitorStatus::Failed => self.event_failed(event),
            MonitorStatus::Passed => self.event_passed(event),
        }
        Ok(())
    }

    fn event_failed(&self, event: &EventDef) {
        let id = event.event_id();
        let (old, _) = self.status.update_internal(id, |s| {
            s.set(StatusBit::TestFailed)
                .set(StatusBit::TestFailedThisOperationCycle)
                .set(StatusBit::TestFailedSinceLastClear)
                .reset(StatusBit::TestNotCompletedThisOperationCycle)
                .reset(StatusBit::TestNotCompletedSinceLastClear)
        });

        let mut effects = EventEffects::NONE;
        if !old.test(StatusBit::TestFailed) {
            effects.insert(EventEffects::FAILED);
        }
        let new_failed_cycle = !old.test(StatusBit::TestFailedThisOperationCycle);
        let mut trip = self.counters.fault_pending(id);
        if new_failed_cycle {
            effects.insert(EventEffects::FAILED_THIS_CYCLE);
            self.counters.increment_failed_cycles(id);
            trip = self.counters.increment_fault_pending(id);
        }
        self.counters.reset_healing(id);

        let confirm = trip >= event.trip_target.max(1);
        let (_, new) = self.status.update_internal(id, |s| {
            let mut next = s.set(StatusBit::PendingDtc);
            if confirm {
                next = next.set(StatusBit::ConfirmedDtc);
            }
            if event.warning_indicator && next.test(StatusBit::ConfirmedDtc) {
                next = next.set(StatusBit::WarningIndicatorRequested);
            }
            next
        });
        if !old.test(StatusBit::PendingDtc) && new.test(StatusBit::PendingDtc) {
            effects.insert(EventEffects::PENDING);
        }
        if !old.test(StatusBit::ConfirmedDtc) && new.test(StatusBit::ConfirmedDtc) {
            effects.insert(EventEffects::CONFIRMED);
        }
        if !old.test(StatusBit::WarningIndicatorRequested)
            && new.test(StatusBit::WarningIndicatorRequested)
        {
            effects.insert(EventEffects::WIR);
        }

        let store = match self.config.general.storage_trigger {
            StorageTrigger::Failed => true,
            StorageTrigger::Pending => new.test(StatusBit::PendingDtc),
            StorageTrigger::Confirmed => new.test(StatusBit::ConfirmedDtc),
        };
        if store {
            self.store_failure(event, new_failed_cycle);
        }

        debug!(event = %id, old = %old, new = %new, effects = effects.bits(), "Event failed");
        self.observer().process_event_failed(&EventContext {
            event_id: id,
            effects,
            old_status: old,
            new_status: new,
        });
    }

    /// Allocate or update the memory entries of a failed event
    fn store_failure(&self, event: &EventDef, new_failed_cycle: bool) {
        let id = event.event_id();
        let stamp = self.cycles.stamp(event.operation_cycle);
        let warmup = self
            .config
            .general
            .obd_warmup_cycle
            .map(|cycle| self.cycles.stamp(cycle))
            .unwrap_or(CycleStamp::Invalid);
        let latched = event.aging == AgingPolicy::Latched;

        let pools = std::iter::once(event.memory_slot())
            .chain(event.mirror_slot())
            .map(|slot| self.memories.pool_safe(slot));
        for pool in pools {
            let Some(index) = self.allocate(pool, id, latched) else {
                continue;
            };
            let trip = self.counters.fault_pending(id);
            let max_fdc = self.counters.max_fdc(id);
            let snapshot = index.1.then(|| {
                freeze_frame(
                    self.status.internal_status(id),
                    self.counters.fdc(id),
                    self.cycles.count(event.operation_cycle),
                )
            });
            pool.update(index.0, |entry| {
                if snapshot.is_some() {
                    entry.snapshot = snapshot;
                }
                entry.record_failure(new_failed_cycle || index.1, stamp, warmup);
                entry.fault_pending_counter = trip;
                entry.max_fdc = entry.max_fdc.max(max_fdc);
            });
            self.status
                .set_extended_bit(id, ExtendedBit::StoredSinceLastClear);
        }
    }

    /// Entry index and whether it was newly allocated
    fn allocate(&self, pool: &MemoryPool, id: EventId, latched: bool) -> Option<(usize, bool)> {
        let ranking = Ranking {
            config: &self.config,
            status: &self.status,
        };
        let outcome = pool.allocate(id, latched, self.config.general.displacement, &ranking);
        if let AllocationOutcome::Displaced { displaced, .. } = outcome {
            self.status
                .reset_extended_bit(displaced, ExtendedBit::StoredSinceLastClear);
        }
        outcome.index().map(|index| (index, outcome.is_new()))
    }

    fn event_passed(&self, event: &EventDef) {
        let id = event.event_id();
        let (old, new) = self.status.update_internal(id, |s| {
            s.reset(StatusBit::TestFailed)
                .reset(StatusBit::TestNotCompletedThisOperationCycle)
                .reset(StatusBit::TestNotCompletedSinceLastClear)
        });
        self.status
            .set_extended_bit(id, ExtendedBit::TestPassedSinceLastClear);
        self.status
            .set_extended_bit(id, ExtendedBit::TestPassedThisOperationCycle);

        let mut effects = EventEffects::NONE;
        if old.test(StatusBit::TestFailed)
            || old.test(StatusBit::TestNotCompletedThisOperationCycle)
        {
            effects.insert(EventEffects::PASSED);
        }

        if old.test(StatusBit::TestFailed) && event.aging == AgingPolicy::Cycle && event.is_ageable() {
            // A cycle that saw a failure does not count towards aging
            let offset = u16::from(event.aging_target)
                + u16::from(new.test(StatusBit::TestFailedThisOperationCycle));
            let target = self.cycles.count(event.aging_cycle()).wrapping_add(offset);
            let pool = self.memories.pool_safe(event.memory_slot());
            if let Some(true) = pool.update_event(id, |entry| entry.start_aging(target)) {
                debug!(event = %id, target_cycle = target, "Aging started");
            }
        }

        debug!(event = %id, old = %old, new = %new, "Event passed");
        self.observer().process_event_passed(&EventContext {
            event_id: id,
            effects,
            old_status: old,
            new_status: new,
        });
    }

    /// Track the monitor's fault detection counter
    pub fn report_fault_detection_counter(&self, id: EventId, fdc: i8) -> DemResult<()> {
        let event = self.event_def(id)?;
        let max = self.counters.report_fdc(id, fdc);
        let pool = self.memories.pool_safe(event.memory_slot());
        if let Some((index, entry)) = pool.entry_for(id) {
            if entry.max_fdc < max {
                pool.update(index, |entry| entry.max_fdc = max);
            }
        }
        Ok(())
    }

    // =========================================================================
    // Availability and suppression
    // =========================================================================

    /// Connect or disconnect an event
    ///
    /// Synchronous effects apply before returning; asynchronous ones are
    /// queued for the next [`Dem::main_function`].
    pub fn set_event_available(&self, id: EventId, available: bool) -> DemResult<()> {
        self.event_def(id)?;
        if self.status.set_available(id, available) == available {
            return Ok(());
        }
        if !available {
            self.status
                .set_extended_bit(id, ExtendedBit::MonitorDisabledThisOperationCycle);
        }
        self.observer()
            .process_sync_effects_of_event_availability_change(id, available);
        self.pending_availability.lock().push_back((id, available));
        info!(event = %id, available, "Event availability changed");
        Ok(())
    }

    /// Suppress or release the DTC of an event (all combined members)
    pub fn set_dtc_suppressed(&self, id: EventId, suppressed: bool) -> DemResult<()> {
        self.event_def(id)?;
        for member in self.config.combined_members(id) {
            self.status.set_suppressed(member, suppressed);
        }
        debug!(event = %id, suppressed, "DTC suppression changed");
        Ok(())
    }

    /// Periodic processing: applies deferred availability effects
    pub fn main_function(&self) {
        let queued: Vec<_> = self.pending_availability.lock().drain(..).collect();
        let observer = self.observer();
        for (id, available) in queued {
            observer.process_async_effects_of_event_availability_change(id, available);
        }
    }

    // =========================================================================
    // Operation cycles
    // =========================================================================

    /// End the current instance of `cycle` and start the next
    pub fn restart_operation_cycle(&self, cycle: u8) -> DemResult<()> {
        self.cycles.kind(cycle)?;
        let before: Vec<UdsStatus> = (0..self.config.event_count())
            .map(|index| self.status.internal_status(EventId(index as u16)))
            .collect();
        let counter = self.cycles.advance(cycle)?;

        let aged = self.process_aging(cycle, counter, &before);
        let observer = self.observer();

        for event in self.config.events.iter().filter(|e| e.operation_cycle == cycle) {
            let id = event.event_id();
            let status = before[id.index()];
            let tested = !status.test(StatusBit::TestNotCompletedThisOperationCycle);
            let failed = status.test(StatusBit::TestFailedThisOperationCycle);

            if tested && !failed {
                if status.test(StatusBit::PendingDtc) {
                    self.status.reset_status_bit(id, StatusBit::PendingDtc);
                    self.counters.reset_fault_pending(id);
                    self.memories
                        .pool_safe(event.memory_slot())
                        .update_event(id, |entry| entry.fault_pending_counter = 0);
                    observer.process_event_pdtc_disabled(id);
                }
                if status.test(StatusBit::WarningIndicatorRequested)
                    && self.counters.increment_healing(id) >= event.healing_target
                {
                    self.status
                        .reset_status_bit(id, StatusBit::WarningIndicatorRequested);
                    info!(event = %id, "Warning indicator healed");
                    observer.process_event_healed(id);
                }
            }

            self.status.update_internal(id, |s| {
                s.reset(StatusBit::TestFailedThisOperationCycle)
                    .set(StatusBit::TestNotCompletedThisOperationCycle)
            });
            self.status
                .reset_extended_bit(id, ExtendedBit::TestPassedThisOperationCycle);
            self.status
                .reset_extended_bit(id, ExtendedBit::MonitorDisabledThisOperationCycle);
            self.counters.reset_fdc(id);
        }

        if self.config.general.legislation.is_obd() {
            observer.process_obd_cycle_end(cycle);
            observer.process_obd_cycle_restart();
        }
        info!(cycle, counter, aged, "Operation cycle restarted");
        Ok(())
    }

    /// Aging and stamp latching for a restarted cycle; returns aged entries
    fn process_aging(&self, cycle: u8, counter: u16, before: &[UdsStatus]) -> usize {
        let general = &self.config.general;
        let warmup = general.obd_warmup_cycle == Some(cycle);
        let mut aged_total = 0;

        for pool in self.memories.pools() {
            // Mirror entries never age
            let ages = pool.kind() != MemoryKind::Mirror;
            let mut aged = Vec::new();
            pool.for_each_occupied(|index, entry| {
                let Some(event) = self.config.event(entry.event_id) else {
                    return false;
                };
                let mut changed = false;
                if event.operation_cycle == cycle {
                    let first = latch_stamp(entry.first_failed, counter);
                    let last = latch_stamp(entry.last_failed, counter);
                    changed |= first != entry.first_failed || last != entry.last_failed;
                    entry.first_failed = first;
                    entry.last_failed = last;
                }
                if warmup {
                    let latched = latch_stamp(entry.warmup_last_failed, counter);
                    changed |= latched != entry.warmup_last_failed;
                    entry.warmup_last_failed = latched;
                }
                if ages && event.aging_cycle() == cycle {
                    let untested = before
                        .get(event.id as usize)
                        .is_some_and(|s| s.test(StatusBit::TestNotCompletedThisOperationCycle));
                    if untested && general.aging_requires_tested_cycle {
                        entry.postpone_aging();
                        changed = true;
                    } else if entry.complete_aging_if_due(counter) {
                        aged.push((index, entry.event_id));
                        changed = true;
                    }
                }
                changed
            });

            for (index, id) in aged {
                self.status.reset_status_bit(id, StatusBit::ConfirmedDtc);
                pool.note_aged();
                if !general.retain_aged_entries {
                    pool.free(index);
                }
                info!(memory = pool.name(), event = %id, "Entry aged");
                aged_total += 1;
            }
        }
        aged_total
    }

    // =========================================================================
    // Clear
    // =========================================================================

    /// Clear the selected events; returns how many were cleared
    pub fn clear_dtc(&self, selection: &DtcSelection) -> DemResult<usize> {
        let events: Vec<EventId> = match selection {
            DtcSelection::All => self.config.event_ids().collect(),
            DtcSelection::Dtc(dtc) => {
                let events = self.config.events_with_dtc(DtcNumber(*dtc));
                if events.is_empty() {
                    return Err(DemError::UnknownDtc(*dtc));
                }
                events
            }
            DtcSelection::Memory(name) => {
                let slot = self
                    .config
                    .memory_slot(name)
                    .ok_or_else(|| DemError::InvalidMemory(name.clone()))?;
                let pool = self.memories.pool(slot)?;
                if pool.kind() == MemoryKind::Mirror {
                    // Mirror copies go; status and primary entries stay
                    let cleared = self
                        .config
                        .events
                        .iter()
                        .filter(|e| e.mirror_slot() == Some(slot))
                        .filter(|e| pool.free_event(e.event_id()))
                        .count();
                    info!(memory = %name, cleared, "Mirror memory cleared");
                    return Ok(cleared);
                }
                self.config
                    .events
                    .iter()
                    .filter(|e| e.memory_slot() == slot || e.mirror_slot() == Some(slot))
                    .map(EventDef::event_id)
                    .collect()
            }
        };

        let observer = self.observer();
        for &id in &events {
            let Some(event) = self.config.event(id) else {
                continue;
            };
            // Observers see the status as it was before any bit is reset
            let old_status = self.status.internal_status(id);
            observer.process_event_cleared(id, old_status);

            self.status.reset(id);
            self.counters.reset(id);
            for slot in std::iter::once(event.memory_slot()).chain(event.mirror_slot()) {
                self.memories.pool_safe(slot).free_event(id);
            }
        }
        if *selection == DtcSelection::All {
            self.chronology.reset();
        }
        info!(selection = ?selection, cleared = events.len(), "DTCs cleared");
        Ok(events.len())
    }

    // =========================================================================
    // OBD
    // =========================================================================

    /// Mark the OBD driving cycle qualified
    pub fn qualify_driving_cycle(&self) -> DemResult<()> {
        if self.config.general.obd_driving_cycle.is_none() {
            return Err(DemError::Config("no OBD driving cycle configured".to_string()));
        }
        if !self.obd.qualify_dcy() {
            return Ok(());
        }
        info!("Driving cycle qualified");
        let observer = self.observer();
        for event in self.config.events.iter().filter(|e| e.obd_related) {
            let id = event.event_id();
            let status = self.status.internal_status(id);
            let mut effects = EventEffects::NONE;
            if status.test(StatusBit::ConfirmedDtc) {
                effects.insert(EventEffects::CONFIRMED);
            }
            if status.test(StatusBit::WarningIndicatorRequested) {
                effects.insert(EventEffects::WIR);
            }
            observer.process_dcy_of_event_qualified(&EventContext {
                event_id: id,
                effects,
                old_status: status,
                new_status: status,
            });
        }
        Ok(())
    }

    pub fn set_permanent_memory_enabled(&self, enabled: bool) {
        self.obd.set_permanent_memory_enabled(enabled);
        if enabled {
            self.observer().fill_up_permanent();
        }
    }

    pub fn set_activation_mode(&self, mode: ActivationMode) {
        self.obd.set_activation_mode(mode);
        if mode == ActivationMode::Mode4 {
            self.observer().fill_up_permanent();
        }
    }

    pub fn obd(&self) -> &ObdState {
        &self.obd
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// External UDS status of an event
    pub fn event_status(&self, id: EventId) -> DemResult<UdsStatus> {
        self.event_def(id)?;
        Ok(self.status.current_external_status(id))
    }

    pub fn internal_status(&self, id: EventId) -> DemResult<UdsStatus> {
        self.event_def(id)?;
        Ok(self.status.internal_status(id))
    }

    pub fn extended_status(&self, id: EventId) -> DemResult<ExtendedStatus> {
        self.event_def(id)?;
        Ok(self.status.extended_status(id))
    }

    /// Aggregated status of a DTC over its combined events
    pub fn dtc_status(&self, dtc: u32) -> DemResult<UdsStatus> {
        let events = self.config.events_with_dtc(DtcNumber(dtc));
        if events.is_empty() {
            return Err(DemError::UnknownDtc(dtc));
        }
        Ok(self.status.dtc_status(&events))
    }

    /// All statistics of an event, read from its own memory
    pub fn event_statistics(&self, id: EventId) -> DemResult<EventStatistics> {
        let event = self.event_def(id)?;
        let entry = self.memories.pool_safe(event.memory_slot()).entry_for(id);
        let info = match &entry {
            Some((index, entry)) => CopyInfo::with_entry(id, *index, entry),
            None => CopyInfo::event(id),
        };
        Ok(self.statistics_engine().collect(&info))
    }

    /// Occupied entries of a memory
    pub fn stored_entries(&self, memory: &str) -> DemResult<Vec<(usize, MemoryEntry)>> {
        self.memories
            .pool_by_name(memory)
            .map(MemoryPool::occupied)
            .ok_or_else(|| DemError::InvalidMemory(memory.to_string()))
    }

    /// Number of entries of a memory that completed aging
    pub fn aged_count(&self, memory: &str) -> DemResult<u16> {
        self.memories
            .pool_by_name(memory)
            .map(MemoryPool::aged_count)
            .ok_or_else(|| DemError::InvalidMemory(memory.to_string()))
    }

    pub fn permanent_entries(&self) -> Vec<(usize, PermanentEntry)> {
        self.memories.permanent().entries()
    }

    pub fn chronology(&self) -> ChronologySnapshot {
        self.chronology.snapshot()
    }

    pub fn cycle_count(&self, cycle: u8) -> DemResult<u16> {
        self.cycles.kind(cycle)?;
        Ok(self.cycles.count(cycle))
    }

    /// DTC-bearing events of a readiness group, each combined DTC once
    pub fn readiness_filter(&self, group: ReadinessGroup) -> ReadinessGroupFilter<'_> {
        ReadinessGroupFilter::new(&self.config, group)
    }

    pub fn report_dtr(&self, id: u16, value: DtrValue) -> DemResult<()> {
        self.dtrs.report(id, value)
    }

    pub fn dtr(&self, id: u16) -> DemResult<DtrValue> {
        self.dtrs.get(id)
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    /// NV block backing entry `index` of `memory`
    pub fn nv_block_index(&self, memory: &str, index: usize) -> DemResult<u16> {
        let slot = self
            .config
            .memory_slot(memory)
            .ok_or_else(|| DemError::InvalidMemory(memory.to_string()))?;
        Ok(self.memories.entry_index_to_nv_block_index(slot, index)?)
    }

    /// Drain the NV blocks modified since the last call
    pub fn take_dirty_nv_blocks(&self) -> Vec<DirtyBlock> {
        let blocks = self.memories.take_dirty_blocks();
        if !blocks.is_empty() {
            debug!(count = blocks.len(), "Dirty NV blocks taken");
        }
        blocks
    }

    /// Restore a persisted cycle counter before the first report
    pub fn restore_cycle_counter(&self, cycle: u8, counter: u16) -> DemResult<()> {
        self.cycles.restore(cycle, counter)
    }

    /// Runtime check violations seen so far
    pub fn runtime_violations(&self) -> u32 {
        let violations = self.checks.violations();
        if violations > 0 {
            warn!(violations, "Runtime check violations recorded");
        }
        violations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DisplacementStrategy, MemoryDef};
    use crate::memory::AgingStatus;
    use pretty_assertions::assert_eq;

    fn config(events: Vec<EventDef>) -> DemConfig {
        let mut config = DemConfig::default();
        config.events = events;
        config
    }

    fn single(event: EventDef) -> Dem {
        Dem::new(config(vec![event])).unwrap()
    }

    #[test]
    fn test_first_failure_confirms_with_trip_target_one() {
        let dem = single(EventDef::new(1).with_dtc(0x010100));
        dem.set_event_status(EventId(1), MonitorStatus::Failed).unwrap();

        let status = dem.event_status(EventId(1)).unwrap();
        assert_eq!(status.bits(), 0x2F);
        let entries = dem.stored_entries("primary").unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].1.occurrence_counter, 1);
        assert!(dem
            .extended_status(EventId(1))
            .unwrap()
            .test(ExtendedBit::StoredSinceLastClear));
    }

    #[test]
    fn test_trip_target_requires_failed_cycles() {
        let dem = single(EventDef {
            trip_target: 2,
            ..EventDef::new(1)
        });
        dem.set_event_status(EventId(1), MonitorStatus::Failed).unwrap();
        dem.set_event_status(EventId(1), MonitorStatus::Failed).unwrap();
        let status = dem.internal_status(EventId(1)).unwrap();
        assert!(status.test(StatusBit::PendingDtc));
        assert!(!status.test(StatusBit::ConfirmedDtc));
        assert!(dem.stored_entries("primary").unwrap().is_empty());

        dem.restart_operation_cycle(0).unwrap();
        dem.set_event_status(EventId(1), MonitorStatus::Failed).unwrap();
        assert!(dem
            .internal_status(EventId(1))
            .unwrap()
            .test(StatusBit::ConfirmedDtc));
    }

    #[test]
    fn test_passed_resets_tf_and_starts_aging() {
        let dem = single(EventDef {
            aging_target: 2,
            ..EventDef::new(1)
        });
        dem.set_event_status(EventId(1), MonitorStatus::Failed).unwrap();
        dem.set_event_status(EventId(1), MonitorStatus::Passed).unwrap();
        let status = dem.internal_status(EventId(1)).unwrap();
        assert!(!status.test(StatusBit::TestFailed));

        let entry = &dem.stored_entries("primary").unwrap()[0].1;
        assert_eq!(entry.aging_status, AgingStatus::Ageing);
        // Failed in the current cycle: cycle 0 does not count
        assert_eq!(entry.aging_target_cycle, 3);
    }

    #[test]
    fn test_pending_reset_and_healing() {
        let dem = single(EventDef {
            warning_indicator: true,
            healing_target: 2,
            aging_target: 10,
            ..EventDef::new(1)
        });
        dem.set_event_status(EventId(1), MonitorStatus::Failed).unwrap();
        assert!(dem
            .internal_status(EventId(1))
            .unwrap()
            .test(StatusBit::WarningIndicatorRequested));
        dem.restart_operation_cycle(0).unwrap();

        for _ in 0..2 {
            dem.set_event_status(EventId(1), MonitorStatus::Passed).unwrap();
            dem.restart_operation_cycle(0).unwrap();
        }
        let status = dem.internal_status(EventId(1)).unwrap();
        assert!(!status.test(StatusBit::PendingDtc));
        assert!(!status.test(StatusBit::WarningIndicatorRequested));
        assert!(status.test(StatusBit::ConfirmedDtc));
    }

    #[test]
    fn test_aging_frees_entry_and_resets_confirmed() {
        let dem = single(EventDef {
            aging_target: 2,
            ..EventDef::new(1)
        });
        dem.set_event_status(EventId(1), MonitorStatus::Failed).unwrap();
        dem.set_event_status(EventId(1), MonitorStatus::Passed).unwrap();
        for _ in 0..2 {
            dem.restart_operation_cycle(0).unwrap();
            dem.set_event_status(EventId(1), MonitorStatus::Passed).unwrap();
        }
        assert_eq!(dem.stored_entries("primary").unwrap().len(), 1);
        dem.restart_operation_cycle(0).unwrap();

        assert!(dem.stored_entries("primary").unwrap().is_empty());
        assert_eq!(dem.aged_count("primary").unwrap(), 1);
        assert!(!dem
            .internal_status(EventId(1))
            .unwrap()
            .test(StatusBit::ConfirmedDtc));
    }

    #[test]
    fn test_untested_cycle_postpones_aging() {
        let dem = single(EventDef {
            aging_target: 1,
            ..EventDef::new(1)
        });
        dem.set_event_status(EventId(1), MonitorStatus::Failed).unwrap();
        dem.set_event_status(EventId(1), MonitorStatus::Passed).unwrap();
        dem.restart_operation_cycle(0).unwrap();
        dem.restart_operation_cycle(0).unwrap();
        assert_eq!(dem.stored_entries("primary").unwrap().len(), 1);

        dem.set_event_status(EventId(1), MonitorStatus::Passed).unwrap();
        dem.restart_operation_cycle(0).unwrap();
        assert!(dem.stored_entries("primary").unwrap().is_empty());
    }

    #[test]
    fn test_clear_all_restores_cleared_state() {
        let dem = Dem::new(config(vec![EventDef::new(1), EventDef::new(2)])).unwrap();
        dem.set_event_status(EventId(1), MonitorStatus::Failed).unwrap();
        dem.report_fault_detection_counter(EventId(1), 100).unwrap();

        assert_eq!(dem.clear_dtc(&DtcSelection::All).unwrap(), 2);
        assert_eq!(dem.internal_status(EventId(1)).unwrap(), UdsStatus::CLEARED);
        assert!(dem.stored_entries("primary").unwrap().is_empty());
        assert_eq!(dem.event_statistics(EventId(1)).unwrap().max_fdc, 0);
        assert_eq!(dem.chronology(), ChronologySnapshot::default());
    }

    #[test]
    fn test_clear_unknown_selection() {
        let dem = single(EventDef::new(1).with_dtc(0x0100));
        assert!(matches!(
            dem.clear_dtc(&DtcSelection::Dtc(0x0200)),
            Err(DemError::UnknownDtc(0x0200))
        ));
        assert!(matches!(
            dem.clear_dtc(&DtcSelection::Memory("nope".into())),
            Err(DemError::InvalidMemory(_))
        ));
    }

    #[test]
    fn test_unavailable_event_ignores_results() {
        let dem = single(EventDef::new(1));
        dem.set_event_available(EventId(1), false).unwrap();
        dem.set_event_status(EventId(1), MonitorStatus::Failed).unwrap();
        assert_eq!(dem.internal_status(EventId(1)).unwrap(), UdsStatus::CLEARED);
        assert_eq!(dem.event_status(EventId(1)).unwrap().bits(), 0);
        dem.main_function();
    }

    #[test]
    fn test_invalid_event_is_rejected() {
        let dem = single(EventDef::new(1));
        assert!(matches!(
            dem.set_event_status(EventId(2), MonitorStatus::Failed),
            Err(DemError::InvalidEvent(EventId(2)))
        ));
        assert!(dem.set_event_status(EventId::INVALID, MonitorStatus::Failed).is_err());
    }

    #[test]
    fn test_displacement_of_lower_priority_entry() {
        let mut config = config(vec![
            EventDef {
                priority: 5,
                ..EventDef::new(1)
            },
            EventDef {
                priority: 1,
                ..EventDef::new(2)
            },
        ]);
        config.memories = vec![MemoryDef {
            name: "primary".into(),
            kind: MemoryKind::Primary,
            size: 1,
            first_event: None,
            last_event: None,
            nv_block_base: 0,
        }];
        config.general.displacement = DisplacementStrategy::Priority;
        let dem = Dem::new(config).unwrap();

        dem.set_event_status(EventId(1), MonitorStatus::Failed).unwrap();
        dem.set_event_status(EventId(2), MonitorStatus::Failed).unwrap();
        let entries = dem.stored_entries("primary").unwrap();
        assert_eq!(entries[0].1.event_id, EventId(2));
        assert!(!dem
            .extended_status(EventId(1))
            .unwrap()
            .test(ExtendedBit::StoredSinceLastClear));
    }

    #[test]
    fn test_dirty_blocks_after_storage() {
        let dem = single(EventDef::new(1));
        dem.set_event_status(EventId(1), MonitorStatus::Failed).unwrap();
        assert_eq!(
            dem.take_dirty_nv_blocks(),
            vec![DirtyBlock {
                memory: "primary".into(),
                block: 0
            }]
        );
        assert!(dem.take_dirty_nv_blocks().is_empty());
        assert_eq!(dem.nv_block_index("primary", 3).unwrap(), 3);
        assert!(dem.nv_block_index("primary", 8).is_err());
    }
}
