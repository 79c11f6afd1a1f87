//! Property tests for the cycle arithmetic and counter derivations.

use dem_core::config::{ReportWidth, StatisticsConfig};
use dem_core::cycle::{cycle_distance, latch_stamp, stamp_report, LATCH_DISTANCE};
use dem_core::statistics::{
    aging_counter_downward, aging_counter_upward, healing_report, inverted_healing_report,
    latch_trip_counter, occurrence_report, AgingInputs,
};
use dem_core::{AgingStatus, CycleStamp, StatusBit, UdsStatus};
use proptest::prelude::*;

fn ageing(target: u8, current: u16, remaining: u8) -> AgingInputs {
    AgingInputs {
        status: AgingStatus::Ageing,
        ageable: true,
        target,
        current_cycle: current,
        target_cycle: current.wrapping_add(remaining as u16),
    }
}

proptest! {
    #[test]
    fn test_distance_inverts_wrapping_add(start in any::<u16>(), distance in any::<u16>()) {
        prop_assert_eq!(cycle_distance(start, start.wrapping_add(distance)), distance);
    }

    #[test]
    fn test_stamp_report_saturates(start in any::<u16>(), distance in any::<u16>()) {
        let current = start.wrapping_add(distance);
        let expected = if distance < 0xFF { distance as u8 } else { 0xFF };
        prop_assert_eq!(stamp_report(CycleStamp::At(start), current), expected);
    }

    #[test]
    fn test_latched_stamp_reports_ff(start in any::<u16>(), distance in LATCH_DISTANCE..=u16::MAX) {
        let current = start.wrapping_add(distance);
        let latched = latch_stamp(CycleStamp::At(start), current);
        prop_assert_eq!(latched, CycleStamp::Latched);
        prop_assert_eq!(stamp_report(latched, current.wrapping_add(1000)), 0xFF);
    }

    #[test]
    fn test_aging_counters_sum_to_target(
        target in 1u8..=u8::MAX,
        current in any::<u16>(),
        remaining in 0u8..=u8::MAX,
    ) {
        prop_assume!(remaining <= target);
        let options = StatisticsConfig::default();
        let inputs = ageing(target, current, remaining);
        let up = aging_counter_upward(inputs, &options);
        let down = aging_counter_downward(inputs, &options);
        prop_assert_eq!(up as u16 + down as u16, target as u16);
        prop_assert_eq!(up, target - remaining);
    }

    #[test]
    fn test_occurrence_one_byte_saturates(counter in any::<u16>()) {
        let report = occurrence_report(counter, ReportWidth::OneByte);
        prop_assert!(report <= 0xFF);
        prop_assert_eq!(report, counter.min(0xFF));
        prop_assert_eq!(occurrence_report(counter, ReportWidth::TwoByte), counter);
    }

    #[test]
    fn test_healing_reports_complement(counter in 0u8..=10, target in 0u8..=10) {
        let healing = UdsStatus::from_bits(0).set(StatusBit::TestFailedSinceLastClear);
        let up = healing_report(healing, counter, target);
        let down = inverted_healing_report(healing, counter, target);
        prop_assert_eq!(up + down, target);
        prop_assert!(up <= target);
    }

    #[test]
    fn test_trip_counter_latches(value in any::<u8>(), trip_target in any::<u8>()) {
        let latched = latch_trip_counter(value, trip_target);
        prop_assert!(latched <= trip_target.saturating_add(1));
        prop_assert!(latched <= value);
    }
}
