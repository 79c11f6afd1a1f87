//! Statistics engine
//!
//! Pure derivations of the reportable counters. Nothing here is stored:
//! every value is computed from the event status, the memory entry and the
//! operation cycle counters at read time.
//!
//! | Statistic                     | Source                                   |
//! |-------------------------------|------------------------------------------|
//! | Aging counter (up/down)       | entry aging state + aging cycle counter  |
//! | Occurrence counter            | entry, clamped to the report width       |
//! | Cycles since first/last fail  | entry cycle stamps                       |
//! | Healing counter (up/inverted) | event counters, gated on status bits     |
//! | Fault pending / failed cycles | entry or independent table, per config   |
//! | Max FDC since clear           | event counters                           |

use serde::Serialize;

use crate::config::{CounterSource, DemConfig, ReportWidth, StatisticsConfig};
use crate::counters::EventCounters;
use crate::cycle::{cycle_distance, stamp_report, OperationCycleTracker};
use crate::event_status::EventStatusStore;
use crate::memory::{AgingStatus, MemoryEntry};
use crate::status::{StatusBit, UdsStatus};
use crate::types::{CycleStamp, EventId};

/// Aging state of one entry as seen by the counter derivations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgingInputs {
    pub status: AgingStatus,
    pub ageable: bool,
    pub target: u8,
    pub current_cycle: u16,
    pub target_cycle: u16,
}

/// Upward aging counter: 0 at aging start, `target` when aged
pub fn aging_counter_upward(inputs: AgingInputs, options: &StatisticsConfig) -> u8 {
    if !inputs.ageable {
        return 0;
    }
    match inputs.status {
        AgingStatus::None => 0,
        AgingStatus::Latched => inputs.target,
        AgingStatus::Aged => {
            if options.report_aged_as_zero {
                0
            } else {
                inputs.target
            }
        }
        AgingStatus::Ageing => {
            let remaining = cycle_distance(inputs.current_cycle, inputs.target_cycle);
            let remaining = u8::try_from(remaining).unwrap_or(u8::MAX);
            let value = inputs.target.saturating_sub(remaining);
            if options.aging_counter_min_one && value == 0 {
                1
            } else {
                value
            }
        }
    }
}

/// Downward aging counter: `target` at aging start, 0 when aged
pub fn aging_counter_downward(inputs: AgingInputs, options: &StatisticsConfig) -> u8 {
    if inputs.ageable && inputs.status.is_terminal() {
        return 0;
    }
    inputs
        .target
        .saturating_sub(aging_counter_upward(inputs, options))
}

/// Occurrence counter clamped to the configured report width
pub fn occurrence_report(counter: u16, width: ReportWidth) -> u16 {
    match width {
        ReportWidth::OneByte => counter.min(u8::MAX as u16),
        ReportWidth::TwoByte => counter,
    }
}

/// Healing counters are meaningful only after a failure and once the event
/// is no longer pending
pub fn healing_readable(status: UdsStatus) -> bool {
    status.test(StatusBit::TestFailedSinceLastClear) && !status.test(StatusBit::PendingDtc)
}

pub fn healing_report(status: UdsStatus, counter: u8, target: u8) -> u8 {
    if healing_readable(status) {
        counter.min(target)
    } else {
        0
    }
}

pub fn inverted_healing_report(status: UdsStatus, counter: u8, target: u8) -> u8 {
    if healing_readable(status) {
        target.saturating_sub(counter)
    } else {
        target
    }
}

/// Trip-related counters latch one past the trip target
pub fn latch_trip_counter(value: u8, trip_target: u8) -> u8 {
    value.min(trip_target.saturating_add(1))
}

/// Event and (optionally) its memory entry, shared by report builders
#[derive(Debug, Clone, Copy)]
pub struct CopyInfo<'a> {
    pub event_id: EventId,
    pub entry: Option<(usize, &'a MemoryEntry)>,
}

impl<'a> CopyInfo<'a> {
    pub fn event(event_id: EventId) -> Self {
        Self {
            event_id,
            entry: None,
        }
    }

    pub fn with_entry(event_id: EventId, index: usize, entry: &'a MemoryEntry) -> Self {
        Self {
            event_id,
            entry: Some((index, entry)),
        }
    }

    fn memory_entry(&self) -> Option<&'a MemoryEntry> {
        self.entry.map(|(_, entry)| entry)
    }
}

/// Snapshot of every statistic of one event
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventStatistics {
    pub event_id: EventId,
    pub status: UdsStatus,
    pub occurrence_counter: u16,
    pub aging_counter: u8,
    pub aging_counter_inverted: u8,
    pub cycles_since_first_failed: u8,
    pub cycles_since_last_failed: u8,
    pub warmup_cycles_since_last_failed: u8,
    pub healing_counter: u8,
    pub healing_counter_inverted: u8,
    pub fault_pending_counter: u8,
    pub failed_cycle_counter: u8,
    pub max_fdc: i8,
    pub significance: u8,
}

/// Read-only view over the state needed to derive statistics
#[derive(Debug, Clone, Copy)]
pub struct StatisticsEngine<'a> {
    pub config: &'a DemConfig,
    pub cycles: &'a OperationCycleTracker,
    pub status: &'a EventStatusStore,
    pub counters: &'a EventCounters,
}

impl<'a> StatisticsEngine<'a> {
    fn options(&self) -> &StatisticsConfig {
        &self.config.general.statistics
    }

    fn aging_inputs(&self, info: &CopyInfo<'_>) -> Option<AgingInputs> {
        let event = self.config.event(info.event_id)?;
        let entry = info.memory_entry()?;
        Some(AgingInputs {
            status: entry.aging_status,
            ageable: event.is_ageable(),
            target: event.aging_target,
            current_cycle: self.cycles.count(event.aging_cycle()),
            target_cycle: entry.aging_target_cycle,
        })
    }

    pub fn aging_counter_upward(&self, info: &CopyInfo<'_>) -> u8 {
        self.aging_inputs(info)
            .map(|inputs| aging_counter_upward(inputs, self.options()))
            .unwrap_or(0)
    }

    pub fn aging_counter_downward(&self, info: &CopyInfo<'_>) -> u8 {
        match self.aging_inputs(info) {
            Some(inputs) => aging_counter_downward(inputs, self.options()),
            None => self
                .config
                .event(info.event_id)
                .map(|e| e.aging_target)
                .unwrap_or(0),
        }
    }

    pub fn occurrence_counter(&self, info: &CopyInfo<'_>) -> u16 {
        info.memory_entry()
            .map(|e| occurrence_report(e.occurrence_counter, self.options().occurrence_width))
            .unwrap_or(0)
    }

    fn operation_cycle_count(&self, event: EventId) -> u16 {
        self.config
            .event(event)
            .map(|e| self.cycles.count(e.operation_cycle))
            .unwrap_or(0)
    }

    pub fn cycles_since_first_failed(&self, info: &CopyInfo<'_>) -> u8 {
        let stamp = info
            .memory_entry()
            .map(|e| e.first_failed)
            .unwrap_or(CycleStamp::Invalid);
        stamp_report(stamp, self.operation_cycle_count(info.event_id))
    }

    pub fn cycles_since_last_failed(&self, info: &CopyInfo<'_>) -> u8 {
        let stamp = info
            .memory_entry()
            .map(|e| e.last_failed)
            .unwrap_or(CycleStamp::Invalid);
        stamp_report(stamp, self.operation_cycle_count(info.event_id))
    }

    pub fn warmup_cycles_since_last_failed(&self, info: &CopyInfo<'_>) -> u8 {
        let Some(warmup) = self.config.general.obd_warmup_cycle else {
            return 0;
        };
        let stamp = info
            .memory_entry()
            .map(|e| e.warmup_last_failed)
            .unwrap_or(CycleStamp::Invalid);
        stamp_report(stamp, self.cycles.count(warmup))
    }

    fn healing_target(&self, event: EventId) -> u8 {
        self.config
            .event(event)
            .map(|e| e.healing_target)
            .unwrap_or(0)
    }

    pub fn healing_counter(&self, event: EventId) -> u8 {
        healing_report(
            self.status.internal_status(event),
            self.counters.healing(event),
            self.healing_target(event),
        )
    }

    pub fn inverted_healing_counter(&self, event: EventId) -> u8 {
        inverted_healing_report(
            self.status.internal_status(event),
            self.counters.healing(event),
            self.healing_target(event),
        )
    }

    fn trip_target(&self, event: EventId) -> u8 {
        self.config.event(event).map(|e| e.trip_target).unwrap_or(0)
    }

    pub fn fault_pending_counter(&self, info: &CopyInfo<'_>) -> u8 {
        let value = match self.config.general.failed_cycle_counter_source {
            CounterSource::Independent => self.counters.fault_pending(info.event_id),
            CounterSource::MemoryEntry => info
                .memory_entry()
                .map(|e| e.fault_pending_counter)
                .unwrap_or(0),
        };
        latch_trip_counter(value, self.trip_target(info.event_id))
    }

    pub fn failed_cycle_counter(&self, info: &CopyInfo<'_>) -> u8 {
        let value = match self.config.general.failed_cycle_counter_source {
            CounterSource::Independent => self.counters.failed_cycles(info.event_id),
            CounterSource::MemoryEntry => info
                .memory_entry()
                .map(|e| e.failed_cycle_counter)
                .unwrap_or(0),
        };
        latch_trip_counter(value, self.trip_target(info.event_id))
    }

    pub fn max_fdc(&self, event: EventId) -> i8 {
        self.counters.max_fdc(event)
    }

    pub fn significance(&self, event: EventId) -> u8 {
        self.config
            .event(event)
            .map(|e| e.significance.as_byte())
            .unwrap_or(0)
    }

    /// Every statistic of the event in `info`
    pub fn collect(&self, info: &CopyInfo<'_>) -> EventStatistics {
        EventStatistics {
            event_id: info.event_id,
            status: self.status.current_external_status(info.event_id),
            occurrence_counter: self.occurrence_counter(info),
            aging_counter: self.aging_counter_upward(info),
            aging_counter_inverted: self.aging_counter_downward(info),
            cycles_since_first_failed: self.cycles_since_first_failed(info),
            cycles_since_last_failed: self.cycles_since_last_failed(info),
            warmup_cycles_since_last_failed: self.warmup_cycles_since_last_failed(info),
            healing_counter: self.healing_counter(info.event_id),
            healing_counter_inverted: self.inverted_healing_counter(info.event_id),
            fault_pending_counter: self.fault_pending_counter(info),
            failed_cycle_counter: self.failed_cycle_counter(info),
            max_fdc: self.max_fdc(info.event_id),
            significance: self.significance(info.event_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn ageing(current: u16, target_cycle: u16) -> AgingInputs {
        AgingInputs {
            status: AgingStatus::Ageing,
            ageable: true,
            target: 10,
            current_cycle: current,
            target_cycle,
        }
    }

    #[rstest]
    #[case(100, 110, 0)]
    #[case(104, 110, 4)]
    #[case(110, 110, 10)]
    #[case(0xFFFE, 4, 4)]
    fn test_upward_aging(#[case] current: u16, #[case] target_cycle: u16, #[case] expected: u8) {
        let options = StatisticsConfig::default();
        let inputs = ageing(current, target_cycle);
        assert_eq!(aging_counter_upward(inputs, &options), expected);
        assert_eq!(aging_counter_downward(inputs, &options), 10 - expected);
    }

    #[test]
    fn test_aging_min_one() {
        let options = StatisticsConfig {
            aging_counter_min_one: true,
            ..StatisticsConfig::default()
        };
        assert_eq!(aging_counter_upward(ageing(100, 110), &options), 1);
    }

    #[rstest]
    #[case(AgingStatus::None, true, 0)]
    #[case(AgingStatus::Latched, true, 10)]
    #[case(AgingStatus::Aged, true, 0)]
    #[case(AgingStatus::Aged, false, 10)]
    fn test_aging_short_circuits(
        #[case] status: AgingStatus,
        #[case] aged_as_zero: bool,
        #[case] expected: u8,
    ) {
        let options = StatisticsConfig {
            report_aged_as_zero: aged_as_zero,
            ..StatisticsConfig::default()
        };
        let inputs = AgingInputs {
            status,
            ..ageing(0, 0)
        };
        assert_eq!(aging_counter_upward(inputs, &options), expected);
    }

    #[test]
    fn test_non_ageable_reports_zero() {
        let inputs = AgingInputs {
            ageable: false,
            ..ageing(104, 110)
        };
        let options = StatisticsConfig::default();
        assert_eq!(aging_counter_upward(inputs, &options), 0);
        assert_eq!(aging_counter_downward(inputs, &options), 10);
    }

    #[test]
    fn test_occurrence_saturates_at_one_byte() {
        let mut counter = 0u16;
        for _ in 0..300 {
            counter = counter.saturating_add(1);
        }
        assert_eq!(occurrence_report(counter, ReportWidth::OneByte), 255);
        assert_eq!(occurrence_report(counter, ReportWidth::TwoByte), 300);
    }

    #[rstest]
    #[case(0x20, true)]
    #[case(0x24, false)]
    #[case(0x00, false)]
    fn test_healing_gating(#[case] bits: u8, #[case] readable: bool) {
        let status = UdsStatus::from_bits(bits);
        assert_eq!(healing_readable(status), readable);
        let expected = if readable { (2, 1) } else { (0, 3) };
        assert_eq!(
            (
                healing_report(status, 2, 3),
                inverted_healing_report(status, 2, 3)
            ),
            expected
        );
    }

    #[test]
    fn test_trip_counter_latches() {
        assert_eq!(latch_trip_counter(9, 2), 3);
        assert_eq!(latch_trip_counter(1, 2), 1);
        assert_eq!(latch_trip_counter(255, 255), 255);
    }
}
