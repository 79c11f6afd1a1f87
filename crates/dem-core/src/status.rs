//! UDS status byte, extended status and trigger effects
//!
//! Bit layout follows ISO 14229-1. Each byte is a plain `u8` newtype with
//! enum-indexed accessors so the storage layout stays explicit.

use serde::{Deserialize, Serialize};

/// Bits of the UDS DTC status byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum StatusBit {
    /// Bit 0: test failed at time of request
    TestFailed = 0,
    /// Bit 1: test failed during current operation cycle
    TestFailedThisOperationCycle = 1,
    /// Bit 2: pending DTC
    PendingDtc = 2,
    /// Bit 3: confirmed DTC
    ConfirmedDtc = 3,
    /// Bit 4: test not completed since last clear
    TestNotCompletedSinceLastClear = 4,
    /// Bit 5: test failed since last clear
    TestFailedSinceLastClear = 5,
    /// Bit 6: test not completed this operation cycle
    TestNotCompletedThisOperationCycle = 6,
    /// Bit 7: warning indicator requested
    WarningIndicatorRequested = 7,
}

impl StatusBit {
    /// Mask of this bit inside the status byte
    pub const fn mask(self) -> u8 {
        1 << (self as u8)
    }
}

/// UDS status byte of an event or DTC
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UdsStatus(u8);

impl UdsStatus {
    /// Status after a clear: both "not completed" bits set
    pub const CLEARED: UdsStatus = UdsStatus(
        StatusBit::TestNotCompletedSinceLastClear.mask()
            | StatusBit::TestNotCompletedThisOperationCycle.mask(),
    );

    pub const fn from_bits(bits: u8) -> Self {
        UdsStatus(bits)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub fn test(self, bit: StatusBit) -> bool {
        self.0 & bit.mask() != 0
    }

    #[must_use]
    pub fn set(self, bit: StatusBit) -> Self {
        UdsStatus(self.0 | bit.mask())
    }

    #[must_use]
    pub fn reset(self, bit: StatusBit) -> Self {
        UdsStatus(self.0 & !bit.mask())
    }

    /// Combine member statuses of a combined DTC group
    ///
    /// All bits are OR-ed except the two "not completed" bits: a group is
    /// only "not completed" if some member is not completed and no member
    /// failed in the corresponding scope.
    pub fn combine(statuses: impl IntoIterator<Item = UdsStatus>) -> UdsStatus {
        let mut or = 0u8;
        for status in statuses {
            or |= status.0;
        }
        let mut combined = UdsStatus(or);
        if combined.test(StatusBit::TestFailedSinceLastClear) {
            combined = combined.reset(StatusBit::TestNotCompletedSinceLastClear);
        }
        if combined.test(StatusBit::TestFailedThisOperationCycle) {
            combined = combined.reset(StatusBit::TestNotCompletedThisOperationCycle);
        }
        combined
    }
}

impl std::fmt::Display for UdsStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{:02X}", self.0)
    }
}

/// Vendor status bits kept alongside the UDS byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ExtendedBit {
    /// Tested and passed since last clear
    TestPassedSinceLastClear = 0,
    /// Tested and passed this operation cycle
    TestPassedThisOperationCycle = 1,
    /// Monitor was disabled during this operation cycle
    MonitorDisabledThisOperationCycle = 2,
    /// Event has been stored in a memory since last clear
    StoredSinceLastClear = 3,
}

impl ExtendedBit {
    pub const fn mask(self) -> u8 {
        1 << (self as u8)
    }
}

/// Extended status byte
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExtendedStatus(u8);

impl ExtendedStatus {
    pub const fn from_bits(bits: u8) -> Self {
        ExtendedStatus(bits)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub fn test(self, bit: ExtendedBit) -> bool {
        self.0 & bit.mask() != 0
    }

    #[must_use]
    pub fn set(self, bit: ExtendedBit) -> Self {
        ExtendedStatus(self.0 | bit.mask())
    }

    #[must_use]
    pub fn reset(self, bit: ExtendedBit) -> Self {
        ExtendedStatus(self.0 & !bit.mask())
    }
}

/// Newly active triggers of a status update
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventEffects(u8);

impl EventEffects {
    pub const NONE: EventEffects = EventEffects(0);
    /// TestFailed went 0 -> 1
    pub const FAILED: EventEffects = EventEffects(0x01);
    /// TestFailedThisOperationCycle went 0 -> 1
    pub const FAILED_THIS_CYCLE: EventEffects = EventEffects(0x02);
    /// PendingDtc went 0 -> 1
    pub const PENDING: EventEffects = EventEffects(0x04);
    /// ConfirmedDtc went 0 -> 1
    pub const CONFIRMED: EventEffects = EventEffects(0x08);
    /// WarningIndicatorRequested went 0 -> 1
    pub const WIR: EventEffects = EventEffects(0x10);
    /// TestFailed went 1 -> 0, or first pass this cycle
    pub const PASSED: EventEffects = EventEffects(0x20);

    /// Triggers that make a failed report relevant to the observer
    pub const FAILURE_TRIGGERS: EventEffects = EventEffects(
        Self::FAILED.0 | Self::FAILED_THIS_CYCLE.0 | Self::PENDING.0 | Self::CONFIRMED.0 | Self::WIR.0,
    );

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub fn contains(self, other: EventEffects) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn intersects(self, other: EventEffects) -> bool {
        self.0 & other.0 != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn insert(&mut self, other: EventEffects) {
        self.0 |= other.0;
    }
}

impl std::ops::BitOr for EventEffects {
    type Output = EventEffects;

    fn bitor(self, rhs: Self) -> Self::Output {
        EventEffects(self.0 | rhs.0)
    }
}
