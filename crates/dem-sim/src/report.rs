//! Final state of the event manager after a scenario, flattened into rows

use dem_core::{Dem, DemResult, EventId, ReadinessTracker};
use serde::Serialize;
use tabled::Tabled;

/// Per-event status and statistics
#[derive(Debug, Tabled, Serialize)]
pub struct EventRow {
    #[tabled(rename = "Event")]
    pub event: u16,
    #[tabled(rename = "Name")]
    pub name: String,
    #[tabled(rename = "DTC")]
    pub dtc: String,
    #[tabled(rename = "Status")]
    pub status: String,
    #[tabled(rename = "Occurrence")]
    pub occurrence: u16,
    #[tabled(rename = "Aging")]
    pub aging: u8,
    #[tabled(rename = "Healing")]
    pub healing: u8,
    #[tabled(rename = "Pending")]
    pub fault_pending: u8,
    #[tabled(rename = "Max FDC")]
    pub max_fdc: i8,
}

/// Occupied slot of an event memory
#[derive(Debug, Tabled, Serialize)]
pub struct EntryRow {
    #[tabled(rename = "Memory")]
    pub memory: String,
    #[tabled(rename = "Slot")]
    pub slot: usize,
    #[tabled(rename = "NV Block")]
    pub nv_block: u16,
    #[tabled(rename = "Event")]
    pub event: u16,
    #[tabled(rename = "Aging")]
    pub aging: String,
    #[tabled(rename = "Occurrence")]
    pub occurrence: u16,
}

#[derive(Debug, Tabled, Serialize)]
pub struct PermanentRow {
    #[tabled(rename = "Slot")]
    pub slot: usize,
    #[tabled(rename = "Event")]
    pub event: u16,
    #[tabled(rename = "State")]
    pub state: String,
}

#[derive(Debug, Tabled, Serialize)]
pub struct ReadinessRow {
    #[tabled(rename = "Group")]
    pub group: String,
    #[tabled(rename = "Completed")]
    pub completed: bool,
    #[tabled(rename = "Failed")]
    pub failed: bool,
    #[tabled(rename = "Pending")]
    pub pending: bool,
    #[tabled(rename = "Disabled")]
    pub disabled: bool,
}

#[derive(Debug, Serialize)]
pub struct Report {
    pub events: Vec<EventRow>,
    pub entries: Vec<EntryRow>,
    pub permanent: Vec<PermanentRow>,
    pub readiness: Vec<ReadinessRow>,
}

impl Report {
    pub fn collect(dem: &Dem, readiness: &ReadinessTracker) -> DemResult<Self> {
        let config = dem.config();

        let events = config
            .events
            .iter()
            .map(|event| {
                let stats = dem.event_statistics(EventId(event.id))?;
                Ok(EventRow {
                    event: event.id,
                    name: event.name.clone(),
                    dtc: event
                        .dtc
                        .map(|dtc| dtc.to_string())
                        .unwrap_or_else(|| "-".to_string()),
                    status: format!("0x{:02X}", stats.status.bits()),
                    occurrence: stats.occurrence_counter,
                    aging: stats.aging_counter,
                    healing: stats.healing_counter,
                    fault_pending: stats.fault_pending_counter,
                    max_fdc: stats.max_fdc,
                })
            })
            .collect::<DemResult<Vec<_>>>()?;

        let mut entries = Vec::new();
        for memory in &config.memories {
            for (slot, entry) in dem.stored_entries(&memory.name)? {
                entries.push(EntryRow {
                    memory: memory.name.clone(),
                    slot,
                    nv_block: dem.nv_block_index(&memory.name, slot)?,
                    event: entry.event_id.0,
                    aging: format!("{:?}", entry.aging_status),
                    occurrence: entry.occurrence_counter,
                });
            }
        }

        let permanent = dem
            .permanent_entries()
            .into_iter()
            .map(|(slot, entry)| PermanentRow {
                slot,
                event: entry.event_id.0,
                state: format!("{:?}", entry.state),
            })
            .collect();

        let readiness = readiness
            .summary()
            .into_iter()
            .map(|(group, status)| ReadinessRow {
                group: format!("{:?}", group),
                completed: status.completed,
                failed: status.failed,
                pending: status.pending,
                disabled: status.disabled,
            })
            .collect();

        Ok(Self {
            events,
            entries,
            permanent,
            readiness,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dem_core::{DemConfig, MonitorStatus};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    const CONFIG: &str = r#"
[[operation_cycles]]
id = 0

[[memories]]
name = "primary"
size = 4
nv_block_base = 10

[[events]]
id = 1
name = "o2_sensor"
dtc = "013000"
readiness_group = "o2_sensor"

[[events]]
id = 2
name = "internal"
"#;

    #[test]
    fn test_collect_rows() {
        let config = DemConfig::from_toml(CONFIG).unwrap();
        let tracker = Arc::new(ReadinessTracker::new(&config));
        let dem = Dem::with_readiness(config, tracker.clone()).unwrap();
        dem.set_event_status(EventId(1), MonitorStatus::Failed)
            .unwrap();

        let report = Report::collect(&dem, &tracker).unwrap();
        assert_eq!(report.events.len(), 2);
        assert_eq!(report.events[0].status, "0x2F");
        assert_eq!(report.events[1].dtc, "-");

        assert_eq!(report.entries.len(), 1);
        assert_eq!(report.entries[0].event, 1);
        assert_eq!(report.entries[0].nv_block, 10);
        assert!(report.permanent.is_empty());

        assert_eq!(report.readiness.len(), 1);
        assert!(report.readiness[0].failed);
    }
}
