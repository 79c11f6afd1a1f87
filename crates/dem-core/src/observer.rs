//! Diagnostic observer dispatcher
//!
//! Reacts to event outcome transitions computed by the monitor-reporting
//! surface and fans them out to the secondary effects: permanent DTC
//! storage, readiness bookkeeping, DTR reset and the failure chronology.
//!
//! None of the operations return errors. Event ids are validated by the
//! caller; anything that still slips through is absorbed by the fail-soft
//! accessors of the stores.

use tracing::{debug, info};

use crate::chronology::FailureChronology;
use crate::config::{DemConfig, Legislation};
use crate::dtr::DtrStore;
use crate::event_status::EventStatusStore;
use crate::memory::{MemoryManager, PermanentState};
use crate::obd::ObdState;
use crate::readiness::ReadinessProcessing;
use crate::status::{EventEffects, StatusBit, UdsStatus};
use crate::types::EventId;

/// One status transition of an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventContext {
    pub event_id: EventId,
    /// Triggers that became active with this transition
    pub effects: EventEffects,
    pub old_status: UdsStatus,
    pub new_status: UdsStatus,
}

impl EventContext {
    pub fn new(event_id: EventId, effects: EventEffects) -> Self {
        Self {
            event_id,
            effects,
            old_status: UdsStatus::default(),
            new_status: UdsStatus::default(),
        }
    }
}

/// Borrowed view over everything the dispatcher touches
#[derive(Clone, Copy)]
pub struct DiagnosticObserver<'a> {
    pub config: &'a DemConfig,
    pub status: &'a EventStatusStore,
    pub memories: &'a MemoryManager,
    pub obd: &'a ObdState,
    pub dtrs: &'a DtrStore,
    pub chronology: &'a FailureChronology,
    pub readiness: &'a dyn ReadinessProcessing,
}

impl<'a> DiagnosticObserver<'a> {
    pub fn process_event_failed(&self, ctx: &EventContext) {
        if ctx.effects.intersects(EventEffects::FAILURE_TRIGGERS) {
            self.reactivate_permanent(ctx.event_id);
            self.trigger_permanent_storage(ctx);
            self.readiness.event_failed(ctx.event_id, ctx.effects);
        }
        self.chronology.record_failed(ctx.event_id);
        if ctx.effects.contains(EventEffects::CONFIRMED) {
            self.chronology.record_confirmed(ctx.event_id);
        }
    }

    pub fn process_event_passed(&self, ctx: &EventContext) {
        self.readiness.event_passed(ctx.event_id, ctx.effects);

        let legislation = self.config.general.legislation;
        if !legislation.is_obd() || !ctx.effects.contains(EventEffects::PASSED) {
            return;
        }
        let Some(event) = self.config.event(ctx.event_id) else {
            return;
        };
        if !event.permanent_dtc {
            return;
        }
        let members = self.config.combined_members(ctx.event_id);
        let dtc_status = UdsStatus::combine(members.iter().map(|id| self.status.internal_status(*id)));
        if dtc_status.test(StatusBit::TestFailed) {
            return;
        }

        let master = self.config.master_event(ctx.event_id);
        let permanent = self.memories.permanent();
        let Some((index, PermanentState::Active)) = permanent.find(master) else {
            return;
        };
        if legislation == Legislation::WwhObd {
            permanent.free(index);
            self.fill_up_permanent();
        } else {
            permanent.set_state(index, PermanentState::Passive);
            debug!(event = %master, "Permanent DTC passive");
        }
    }

    /// `old_status` must be captured before the clear resets any bit
    pub fn process_event_cleared(&self, event: EventId, old_status: UdsStatus) {
        self.dtrs.reset_for_event(event);
        self.readiness.event_cleared(event, old_status);
    }

    pub fn process_event_pdtc_disabled(&self, event: EventId) {
        self.readiness.pdtc_disabled(event);
    }

    pub fn process_event_healed(&self, event: EventId) {
        self.readiness.event_healed(event);
    }

    pub fn process_async_effects_of_event_availability_change(&self, event: EventId, available: bool) {
        self.readiness.availability_changed_async(event, available);
    }

    pub fn process_sync_effects_of_event_availability_change(&self, event: EventId, available: bool) {
        self.readiness.availability_changed_sync(event, available);
    }

    pub fn process_dcy_of_event_qualified(&self, ctx: &EventContext) {
        self.readiness.dcy_qualified(ctx.event_id);
        // Stored entries keep their state until the event fails again
        let master = self.config.master_event(ctx.event_id);
        if self.memories.permanent().find(master).is_none() {
            self.trigger_permanent_storage(ctx);
        }
    }

    /// Route the end of an operation cycle to the matching OBD handler
    pub fn process_obd_cycle_end(&self, cycle: u8) {
        let general = &self.config.general;
        match Some(cycle) {
            id if id == general.obd_driving_cycle => self.driving_cycle_end(),
            id if id == general.obd_warmup_cycle => self.readiness.warmup_cycle_end(),
            // Not an OBD cycle
            _ => {}
        }
    }

    pub fn process_obd_cycle_restart(&self) {
        self.readiness.cycle_restart();
    }

    fn driving_cycle_end(&self) {
        self.readiness.driving_cycle_end();
        let qualified = self.obd.end_dcy();
        if self.config.general.legislation != Legislation::Obd || !qualified {
            return;
        }
        let permanent = self.memories.permanent();
        let mut freed = 0usize;
        for (index, entry) in permanent.entries() {
            if entry.state == PermanentState::Passive {
                permanent.free(index);
                freed += 1;
            }
        }
        if freed > 0 {
            info!(freed, "Passive permanent DTCs erased");
            self.fill_up_permanent();
        }
    }

    /// Legislative gate for adding permanent DTCs
    fn permanent_storage_allowed(&self) -> bool {
        match self.config.general.legislation {
            Legislation::WwhObd => self.obd.is_mode4_active(),
            Legislation::Obd => self.obd.permanent_memory_enabled(),
            Legislation::None => false,
        }
    }

    /// A failing event turns its passive permanent entry active again
    fn reactivate_permanent(&self, event: EventId) {
        let master = self.config.master_event(event);
        let permanent = self.memories.permanent();
        if let Some((_, PermanentState::Passive)) = permanent.find(master) {
            permanent.add(master);
        }
    }

    fn trigger_permanent_storage(&self, ctx: &EventContext) {
        if !ctx.effects.contains(EventEffects::WIR) {
            return;
        }
        let Some(event) = self.config.event(ctx.event_id) else {
            return;
        };
        if !event.permanent_dtc || !self.permanent_storage_allowed() {
            return;
        }
        let master = self.config.master_event(ctx.event_id);
        if self.memories.permanent().add(master).is_none() {
            debug!(event = %master, "Permanent memory full");
        }
    }

    /// Promote eligible events into free permanent slots, lowest id first
    pub fn fill_up_permanent(&self) {
        if !self.permanent_storage_allowed() {
            return;
        }
        let permanent = self.memories.permanent();
        for event in &self.config.events {
            if permanent.is_full() {
                break;
            }
            let id = event.event_id();
            if !event.permanent_dtc || self.config.master_event(id) != id {
                continue;
            }
            if permanent.find(id).is_some() {
                continue;
            }
            let members = self.config.combined_members(id);
            let dtc_status =
                UdsStatus::combine(members.iter().map(|member| self.status.internal_status(*member)));
            if dtc_status.test(StatusBit::ConfirmedDtc)
                && dtc_status.test(StatusBit::WarningIndicatorRequested)
            {
                permanent.add(id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::{EventDef, PermanentConfig};
    use crate::readiness::MockReadinessProcessing;
    use crate::runtime_check::RuntimeCheck;
    use mockall::predicate::eq;

    struct Fixture {
        config: DemConfig,
        status: EventStatusStore,
        memories: MemoryManager,
        obd: ObdState,
        dtrs: DtrStore,
        chronology: FailureChronology,
    }

    impl Fixture {
        fn new(legislation: Legislation) -> Self {
            let mut config = DemConfig::default();
            config.general.legislation = legislation;
            config.general.obd_driving_cycle = Some(0);
            config.permanent = PermanentConfig {
                size: 2,
                nv_block_base: 100,
            };
            config.events = (1..=5)
                .map(|id| EventDef {
                    permanent_dtc: id != 4,
                    warning_indicator: true,
                    ..EventDef::new(id).with_dtc(0x100 * id as u32)
                })
                .collect();
            config.dtrs = vec![crate::config::DtrDef {
                id: 0,
                event: 1,
                lower_limit: 0,
                upper_limit: 10,
            }];
            config.validate().unwrap();
            let checks = Arc::new(RuntimeCheck::new());
            Self {
                status: EventStatusStore::new(&config, checks.clone()),
                memories: MemoryManager::new(&config, checks),
                obd: ObdState::new(),
                dtrs: DtrStore::new(&config),
                chronology: FailureChronology::new(config.memory_event_range(0)),
                config,
            }
        }

        fn observer<'a>(&'a self, readiness: &'a dyn ReadinessProcessing) -> DiagnosticObserver<'a> {
            DiagnosticObserver {
                config: &self.config,
                status: &self.status,
                memories: &self.memories,
                obd: &self.obd,
                dtrs: &self.dtrs,
                chronology: &self.chronology,
                readiness,
            }
        }

        fn confirm(&self, id: u16) {
            self.status.set_internal_status(
                EventId(id),
                UdsStatus::from_bits(0xAF),
            );
        }
    }

    fn wir_failure(id: u16) -> EventContext {
        EventContext::new(
            EventId(id),
            EventEffects::FAILED | EventEffects::CONFIRMED | EventEffects::WIR,
        )
    }

    fn quiet_readiness() -> MockReadinessProcessing {
        let mut readiness = MockReadinessProcessing::new();
        readiness.expect_event_failed().return_const(());
        readiness.expect_event_passed().return_const(());
        readiness.expect_dcy_qualified().return_const(());
        readiness.expect_driving_cycle_end().return_const(());
        readiness
    }

    #[test]
    fn test_legacy_permanent_storage_follows_global_switch() {
        let fixture = Fixture::new(Legislation::Obd);
        let readiness = quiet_readiness();
        let observer = fixture.observer(&readiness);

        fixture.obd.set_permanent_memory_enabled(false);
        observer.process_event_failed(&wir_failure(1));
        assert_eq!(fixture.memories.permanent().find(EventId(1)), None);

        fixture.obd.set_permanent_memory_enabled(true);
        observer.process_event_failed(&wir_failure(1));
        assert_eq!(
            fixture.memories.permanent().find(EventId(1)),
            Some((0, PermanentState::Active))
        );
    }

    #[test]
    fn test_wwh_permanent_storage_requires_mode4() {
        let fixture = Fixture::new(Legislation::WwhObd);
        let readiness = quiet_readiness();
        let observer = fixture.observer(&readiness);

        observer.process_event_failed(&wir_failure(2));
        assert_eq!(fixture.memories.permanent().find(EventId(2)), None);

        fixture.obd.set_permanent_memory_enabled(false);
        fixture.obd.set_activation_mode(crate::obd::ActivationMode::Mode4);
        observer.process_event_failed(&wir_failure(2));
        assert!(fixture.memories.permanent().find(EventId(2)).is_some());
    }

    #[test]
    fn test_failure_without_wir_or_capability_is_not_permanent() {
        let fixture = Fixture::new(Legislation::Obd);
        let readiness = quiet_readiness();
        let observer = fixture.observer(&readiness);

        observer.process_event_failed(&EventContext::new(EventId(1), EventEffects::CONFIRMED));
        observer.process_event_failed(&wir_failure(4));
        assert!(fixture.memories.permanent().entries().is_empty());
    }

    #[test]
    fn test_effectless_failure_skips_readiness_but_records_chronology() {
        let fixture = Fixture::new(Legislation::Obd);
        let mut readiness = MockReadinessProcessing::new();
        readiness.expect_event_failed().never();
        let observer = fixture.observer(&readiness);

        observer.process_event_failed(&EventContext::new(EventId(3), EventEffects::NONE));
        assert_eq!(fixture.chronology.snapshot().first_failed, EventId(3));
    }

    #[test]
    fn test_wwh_pass_frees_and_fills_up() {
        let fixture = Fixture::new(Legislation::WwhObd);
        let readiness = quiet_readiness();
        let observer = fixture.observer(&readiness);
        fixture.obd.set_activation_mode(crate::obd::ActivationMode::Mode4);

        for id in [1, 2, 3] {
            fixture.confirm(id);
        }
        observer.process_event_failed(&wir_failure(1));
        observer.process_event_failed(&wir_failure(2));
        observer.process_event_failed(&wir_failure(3));
        assert_eq!(fixture.memories.permanent().find(EventId(3)), None);

        fixture
            .status
            .set_internal_status(EventId(1), UdsStatus::from_bits(0x28));
        let mut ctx = EventContext::new(EventId(1), EventEffects::PASSED);
        ctx.new_status = UdsStatus::from_bits(0x28);
        observer.process_event_passed(&ctx);

        assert_eq!(fixture.memories.permanent().find(EventId(1)), None);
        assert_eq!(
            fixture.memories.permanent().find(EventId(3)),
            Some((0, PermanentState::Active))
        );
    }

    #[test]
    fn test_legacy_pass_marks_passive_until_qualified_dcy_end() {
        let fixture = Fixture::new(Legislation::Obd);
        let readiness = quiet_readiness();
        let observer = fixture.observer(&readiness);

        observer.process_event_failed(&wir_failure(1));
        fixture
            .status
            .set_internal_status(EventId(1), UdsStatus::from_bits(0x28));
        observer.process_event_passed(&EventContext::new(EventId(1), EventEffects::PASSED));
        assert_eq!(
            fixture.memories.permanent().find(EventId(1)),
            Some((0, PermanentState::Passive))
        );

        observer.process_obd_cycle_end(0);
        assert!(fixture.memories.permanent().find(EventId(1)).is_some());

        fixture.obd.qualify_dcy();
        observer.process_obd_cycle_end(0);
        assert_eq!(fixture.memories.permanent().find(EventId(1)), None);
    }

    #[test]
    fn test_refailure_reactivates_passive_permanent_entry() {
        let fixture = Fixture::new(Legislation::Obd);
        let readiness = quiet_readiness();
        let observer = fixture.observer(&readiness);

        observer.process_event_failed(&wir_failure(1));
        fixture
            .status
            .set_internal_status(EventId(1), UdsStatus::from_bits(0x28));
        observer.process_event_passed(&EventContext::new(EventId(1), EventEffects::PASSED));
        assert_eq!(
            fixture.memories.permanent().find(EventId(1)),
            Some((0, PermanentState::Passive))
        );

        fixture.confirm(1);
        observer.process_event_failed(&EventContext::new(
            EventId(1),
            EventEffects::FAILED | EventEffects::FAILED_THIS_CYCLE,
        ));
        assert_eq!(
            fixture.memories.permanent().find(EventId(1)),
            Some((0, PermanentState::Active))
        );

        fixture.obd.qualify_dcy();
        observer.process_obd_cycle_end(0);
        assert!(fixture.memories.permanent().find(EventId(1)).is_some());
    }

    #[test]
    fn test_dcy_qualification_keeps_passive_entry_passive() {
        let fixture = Fixture::new(Legislation::Obd);
        let readiness = quiet_readiness();
        let observer = fixture.observer(&readiness);

        observer.process_event_failed(&wir_failure(1));
        fixture
            .status
            .set_internal_status(EventId(1), UdsStatus::from_bits(0x28));
        observer.process_event_passed(&EventContext::new(EventId(1), EventEffects::PASSED));

        observer.process_dcy_of_event_qualified(&EventContext::new(EventId(1), EventEffects::WIR));
        assert_eq!(
            fixture.memories.permanent().find(EventId(1)),
            Some((0, PermanentState::Passive))
        );
    }

    #[test]
    fn test_cleared_resets_dtr_and_forwards_old_status() {
        let fixture = Fixture::new(Legislation::None);
        let old_status = UdsStatus::from_bits(0x2F);
        fixture
            .dtrs
            .report(
                0,
                crate::dtr::DtrValue {
                    test_value: 42,
                    lower_limit: 0,
                    upper_limit: 10,
                },
            )
            .unwrap();

        let mut readiness = MockReadinessProcessing::new();
        readiness
            .expect_event_cleared()
            .with(eq(EventId(1)), eq(old_status))
            .times(1)
            .return_const(());
        let observer = fixture.observer(&readiness);

        observer.process_event_cleared(EventId(1), old_status);
        assert_eq!(fixture.dtrs.get(0).unwrap().test_value, 0);
    }

    #[test]
    fn test_cycle_end_routing() {
        let mut fixture = Fixture::new(Legislation::Obd);
        fixture.config.general.obd_warmup_cycle = Some(7);

        let mut readiness = MockReadinessProcessing::new();
        readiness.expect_driving_cycle_end().times(1).return_const(());
        readiness.expect_warmup_cycle_end().times(1).return_const(());
        let observer = fixture.observer(&readiness);

        observer.process_obd_cycle_end(0);
        observer.process_obd_cycle_end(7);
        observer.process_obd_cycle_end(3);
    }

    #[test]
    fn test_forwarders() {
        let fixture = Fixture::new(Legislation::None);
        let mut readiness = MockReadinessProcessing::new();
        readiness
            .expect_pdtc_disabled()
            .with(eq(EventId(2)))
            .times(1)
            .return_const(());
        readiness
            .expect_event_healed()
            .with(eq(EventId(2)))
            .times(1)
            .return_const(());
        readiness
            .expect_availability_changed_sync()
            .with(eq(EventId(3)), eq(false))
            .times(1)
            .return_const(());
        readiness
            .expect_availability_changed_async()
            .with(eq(EventId(3)), eq(false))
            .times(1)
            .return_const(());
        readiness.expect_cycle_restart().times(1).return_const(());
        let observer = fixture.observer(&readiness);

        observer.process_event_pdtc_disabled(EventId(2));
        observer.process_event_healed(EventId(2));
        observer.process_sync_effects_of_event_availability_change(EventId(3), false);
        observer.process_async_effects_of_event_availability_change(EventId(3), false);
        observer.process_obd_cycle_restart();
    }

    #[test]
    fn test_dcy_qualification_reevaluates_permanent_storage() {
        let fixture = Fixture::new(Legislation::Obd);
        let mut readiness = MockReadinessProcessing::new();
        readiness
            .expect_dcy_qualified()
            .with(eq(EventId(5)))
            .times(1)
            .return_const(());
        let observer = fixture.observer(&readiness);

        observer.process_dcy_of_event_qualified(&EventContext::new(EventId(5), EventEffects::WIR));
        assert!(fixture.memories.permanent().find(EventId(5)).is_some());
    }
}
