//! Shared handle and value types

use serde::{Deserialize, Serialize};

/// Dense event handle in `[1, event_count)`; 0 is reserved as invalid
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct EventId(pub u16);

impl EventId {
    /// The reserved "no event" handle
    pub const INVALID: EventId = EventId(0);

    /// Whether this handle refers to an event at all
    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }

    /// Table index for this handle
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl From<u16> for EventId {
    fn from(id: u16) -> Self {
        EventId(id)
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 24-bit DTC number as stored in configuration and reported over UDS
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DtcNumber(pub u32);

impl DtcNumber {
    /// Build from the three UDS bytes (high, mid, low)
    pub fn from_bytes(bytes: [u8; 3]) -> Self {
        DtcNumber(((bytes[0] as u32) << 16) | ((bytes[1] as u32) << 8) | (bytes[2] as u32))
    }

    /// The three UDS bytes (high, mid, low)
    pub fn to_bytes(self) -> [u8; 3] {
        [(self.0 >> 16) as u8, (self.0 >> 8) as u8, self.0 as u8]
    }
}

impl std::fmt::Display for DtcNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:06X}", self.0)
    }
}

/// Qualified monitor result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorStatus {
    /// Test completed without fault
    Passed,
    /// Test completed with fault
    Failed,
}

/// Event significance reported in extended data
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Significance {
    /// Informational occurrence
    Occurrence,
    /// Real fault
    #[default]
    Fault,
}

impl Significance {
    /// Reported byte value
    pub fn as_byte(self) -> u8 {
        match self {
            Significance::Occurrence => 0,
            Significance::Fault => 1,
        }
    }
}

/// Stored "operation cycle of the last event" with its two sentinels
///
/// `Invalid` means the event never failed since the counter was reset,
/// `Latched` means the distance to the current cycle no longer fits the
/// report width.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "state", content = "cycle")]
pub enum CycleStamp {
    /// Never recorded
    #[default]
    Invalid,
    /// Too far in the past to report
    Latched,
    /// Value of the cycle counter when recorded
    At(u16),
}
