//! Error types for the diagnostic event manager

use thiserror::Error;

use crate::types::EventId;

/// Result type for event manager operations
pub type DemResult<T> = Result<T, DemError>;

/// Errors surfaced at the public boundary of the event manager
///
/// Status and statistics queries never fail; only configuration loading and
/// the operations that take caller-supplied handles return these.
#[derive(Debug, Error)]
pub enum DemError {
    /// Event id outside `[1, event_count)`
    #[error("invalid event id: {0}")]
    InvalidEvent(EventId),

    /// Operation cycle id not configured
    #[error("unknown operation cycle: {0}")]
    InvalidCycle(u8),

    /// Memory id not configured
    #[error("unknown memory: {0}")]
    InvalidMemory(String),

    /// DTC number not configured for any event
    #[error("unknown DTC: 0x{0:06X}")]
    UnknownDtc(u32),

    /// DTR id not configured
    #[error("unknown DTR: {0}")]
    UnknownDtr(u16),

    /// Index outside a bounded table
    #[error(transparent)]
    Range(#[from] RangeError),

    /// Configuration failed validation
    #[error("configuration error: {0}")]
    Config(String),

    /// TOML parsing error
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// An index into a bounded table was outside its configured size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{what} index {index} out of range (size {len})")]
pub struct RangeError {
    /// Name of the table that was indexed
    pub what: &'static str,
    /// Offending index
    pub index: usize,
    /// Configured size of the table
    pub len: usize,
}
