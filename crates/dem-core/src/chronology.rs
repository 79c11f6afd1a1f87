//! First and most recent failed/confirmed events

use std::sync::atomic::{AtomicU16, Ordering};

use serde::Serialize;

use crate::types::EventId;

/// Snapshot of the chronology records
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ChronologySnapshot {
    pub first_failed: EventId,
    pub most_recent_failed: EventId,
    pub first_confirmed: EventId,
    pub most_recent_confirmed: EventId,
}

/// Global failure chronology, scoped to the primary memory's event range
///
/// "First" records are claimed once with a compare-and-swap from
/// `INVALID`; "most recent" records are overwritten on every report.
#[derive(Debug)]
pub struct FailureChronology {
    range: Option<(EventId, EventId)>,
    first_failed: AtomicU16,
    most_recent_failed: AtomicU16,
    first_confirmed: AtomicU16,
    most_recent_confirmed: AtomicU16,
}

impl FailureChronology {
    pub fn new(range: Option<(EventId, EventId)>) -> Self {
        Self {
            range,
            first_failed: AtomicU16::new(EventId::INVALID.0),
            most_recent_failed: AtomicU16::new(EventId::INVALID.0),
            first_confirmed: AtomicU16::new(EventId::INVALID.0),
            most_recent_confirmed: AtomicU16::new(EventId::INVALID.0),
        }
    }

    fn in_scope(&self, event: EventId) -> bool {
        match self.range {
            Some((first, last)) => event.is_valid() && first <= event && event <= last,
            None => false,
        }
    }

    fn record(first: &AtomicU16, most_recent: &AtomicU16, event: EventId) {
        let _ = first.compare_exchange(
            EventId::INVALID.0,
            event.0,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        most_recent.store(event.0, Ordering::Release);
    }

    /// Record a failure; events outside the primary range are ignored
    pub fn record_failed(&self, event: EventId) {
        if self.in_scope(event) {
            Self::record(&self.first_failed, &self.most_recent_failed, event);
        }
    }

    /// Record a confirmation; events outside the primary range are ignored
    pub fn record_confirmed(&self, event: EventId) {
        if self.in_scope(event) {
            Self::record(&self.first_confirmed, &self.most_recent_confirmed, event);
        }
    }

    pub fn snapshot(&self) -> ChronologySnapshot {
        ChronologySnapshot {
            first_failed: EventId(self.first_failed.load(Ordering::Acquire)),
            most_recent_failed: EventId(self.most_recent_failed.load(Ordering::Acquire)),
            first_confirmed: EventId(self.first_confirmed.load(Ordering::Acquire)),
            most_recent_confirmed: EventId(self.most_recent_confirmed.load(Ordering::Acquire)),
        }
    }

    pub fn reset(&self) {
        for cell in [
            &self.first_failed,
            &self.most_recent_failed,
            &self.first_confirmed,
            &self.most_recent_confirmed,
        ] {
            cell.store(EventId::INVALID.0, Ordering::Release);
        }
    }
}
