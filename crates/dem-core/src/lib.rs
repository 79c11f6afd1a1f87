//! dem-core - Diagnostic event manager core
//!
//! Turns monitor test results into UDS status bytes, fault memory entries,
//! aging/healing counters and OBD permanent DTCs. The crate performs no I/O:
//! it decides what has to be persisted and exposes the NV block mapping.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                           Dem                               │
//! │  set_event_status / restart_operation_cycle / clear_dtc     │
//! │                            │                                │
//! │                  ┌─────────┴──────────┐                     │
//! │                  │ DiagnosticObserver │──► ReadinessProcessing
//! │                  └─────────┬──────────┘                     │
//! │        ┌──────────────┬────┴─────────┬──────────────┐       │
//! │  ┌─────┴───────┐ ┌────┴──────┐ ┌─────┴──────┐ ┌─────┴─────┐ │
//! │  │EventStatus  │ │ Memory    │ │ Operation  │ │ DtrStore  │ │
//! │  │Store        │ │ Manager   │ │ Cycles     │ │           │ │
//! │  └─────────────┘ └───────────┘ └────────────┘ └───────────┘ │
//! │                            │                                │
//! │                   ┌────────┴─────────┐                      │
//! │                   │ StatisticsEngine │ (read side)          │
//! │                   └──────────────────┘                      │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod chronology;
pub mod config;
pub mod counters;
pub mod cycle;
pub mod dem;
pub mod dtr;
pub mod error;
pub mod event_status;
pub mod memory;
pub mod obd;
pub mod observer;
pub mod processed_set;
pub mod readiness;
pub mod runtime_check;
pub mod statistics;
pub mod status;
pub mod types;

pub use chronology::ChronologySnapshot;
pub use config::{DemConfig, EventDef, Legislation};
pub use dem::{Dem, DtcSelection};
pub use dtr::DtrValue;
pub use error::{DemError, DemResult, RangeError};
pub use memory::{AgingStatus, DirtyBlock, MemoryEntry, PermanentEntry, PermanentState};
pub use obd::ActivationMode;
pub use observer::{DiagnosticObserver, EventContext};
pub use readiness::{ReadinessGroup, ReadinessGroupFilter, ReadinessProcessing, ReadinessTracker};
pub use statistics::EventStatistics;
pub use status::{EventEffects, ExtendedBit, ExtendedStatus, StatusBit, UdsStatus};
pub use types::{CycleStamp, DtcNumber, EventId, MonitorStatus, Significance};
