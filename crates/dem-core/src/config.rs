//! Static event and memory configuration
//!
//! Loaded once from TOML, validated, then used as a read-only lookup by all
//! other components. Nothing in here changes after [`crate::Dem::new`].

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{DemError, DemResult};
use crate::processed_set::CombinedGroupSet;
use crate::readiness::ReadinessGroup;
use crate::types::{DtcNumber, EventId, Significance};

/// Complete event manager configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DemConfig {
    /// Global behavior switches
    #[serde(default)]
    pub general: GeneralConfig,

    /// Operation cycle definitions
    #[serde(default = "default_operation_cycles")]
    pub operation_cycles: Vec<OperationCycleDef>,

    /// Event memories (primary, user-defined, mirror)
    #[serde(default = "default_memories")]
    pub memories: Vec<MemoryDef>,

    /// Permanent memory
    #[serde(default)]
    pub permanent: PermanentConfig,

    /// Event definitions, ids dense from 1
    #[serde(default)]
    pub events: Vec<EventDef>,

    /// Diagnostic test result definitions
    #[serde(default)]
    pub dtrs: Vec<DtrDef>,
}

impl Default for DemConfig {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            operation_cycles: default_operation_cycles(),
            memories: default_memories(),
            permanent: PermanentConfig::default(),
            events: Vec::new(),
            dtrs: Vec::new(),
        }
    }
}

fn default_operation_cycles() -> Vec<OperationCycleDef> {
    vec![OperationCycleDef {
        id: 0,
        name: "power".to_string(),
        kind: CycleKind::Power,
    }]
}

fn default_memories() -> Vec<MemoryDef> {
    vec![MemoryDef {
        name: PRIMARY_MEMORY.to_string(),
        kind: MemoryKind::Primary,
        size: default_memory_size(),
        first_event: None,
        last_event: None,
        nv_block_base: 0,
    }]
}

/// Name of the default primary memory
pub const PRIMARY_MEMORY: &str = "primary";

// =============================================================================
// General Configuration
// =============================================================================

/// Global behavior switches
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// OBD legislation variant
    #[serde(default)]
    pub legislation: Legislation,

    /// Status bits this ECU supports
    #[serde(
        default = "default_availability_mask",
        deserialize_with = "deserialize_hex_u8"
    )]
    pub status_availability_mask: u8,

    /// Operation cycle id used as OBD driving cycle
    #[serde(default)]
    pub obd_driving_cycle: Option<u8>,

    /// Operation cycle id used as OBD warm-up cycle
    #[serde(default)]
    pub obd_warmup_cycle: Option<u8>,

    /// What happens when a memory is full
    #[serde(default)]
    pub displacement: DisplacementStrategy,

    /// Which status transition stores an event in its memory
    #[serde(default)]
    pub storage_trigger: StorageTrigger,

    /// Where fault-pending and failed-cycle counters live
    #[serde(default)]
    pub failed_cycle_counter_source: CounterSource,

    /// Only count aging cycles in which the event was tested
    #[serde(default = "default_true")]
    pub aging_requires_tested_cycle: bool,

    /// Keep entries in memory after aging completes
    #[serde(default)]
    pub retain_aged_entries: bool,

    /// Reporting options for statistics
    #[serde(default)]
    pub statistics: StatisticsConfig,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            legislation: Legislation::default(),
            status_availability_mask: default_availability_mask(),
            obd_driving_cycle: None,
            obd_warmup_cycle: None,
            displacement: DisplacementStrategy::default(),
            storage_trigger: StorageTrigger::default(),
            failed_cycle_counter_source: CounterSource::default(),
            aging_requires_tested_cycle: true,
            retain_aged_entries: false,
            statistics: StatisticsConfig::default(),
        }
    }
}

fn default_availability_mask() -> u8 {
    0xFF
}

fn default_true() -> bool {
    true
}

/// OBD legislation variant
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Legislation {
    /// No OBD support
    #[default]
    None,
    /// Legacy OBD-II
    Obd,
    /// World-wide harmonized OBD
    WwhObd,
}

impl Legislation {
    pub fn is_obd(self) -> bool {
        self != Legislation::None
    }
}

/// Policy when an event must be stored but its memory is full
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplacementStrategy {
    /// Insert fails, the new event stays unstored
    #[default]
    None,
    /// Evict the oldest entry with strictly lower priority
    Priority,
    /// Like `Priority`, and also evict passive entries of equal priority
    Full,
}

/// Status transition that stores an event in memory
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageTrigger {
    /// First failed report
    Failed,
    /// Pending bit set
    Pending,
    /// Confirmed bit set
    #[default]
    Confirmed,
}

/// Storage of fault-pending and failed-cycle counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CounterSource {
    /// Counters live in the memory entry
    #[default]
    MemoryEntry,
    /// Counters live in a table independent of memory entries
    Independent,
}

/// Statistics reporting options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatisticsConfig {
    /// Report 0 instead of the aging target for aged entries
    #[serde(default = "default_true")]
    pub report_aged_as_zero: bool,

    /// Never report an upward aging counter of exactly 0 for ageing entries
    #[serde(default)]
    pub aging_counter_min_one: bool,

    /// Width of the occurrence counter report field
    #[serde(default)]
    pub occurrence_width: ReportWidth,
}

impl Default for StatisticsConfig {
    fn default() -> Self {
        Self {
            report_aged_as_zero: true,
            aging_counter_min_one: false,
            occurrence_width: ReportWidth::default(),
        }
    }
}

/// Width of a counter report field
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportWidth {
    #[default]
    OneByte,
    TwoByte,
}

// =============================================================================
// Operation Cycles
// =============================================================================

/// Operation cycle definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationCycleDef {
    /// Cycle identifier
    pub id: u8,

    /// Human-readable name
    #[serde(default)]
    pub name: String,

    /// Kind of cycle
    #[serde(default)]
    pub kind: CycleKind,
}

/// Kind of operation cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleKind {
    #[default]
    Power,
    Ignition,
    DrivingCycle,
    WarmUp,
    Custom,
}

// =============================================================================
// Memories
// =============================================================================

/// Event memory definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryDef {
    /// Memory name referenced by events
    pub name: String,

    /// Kind of memory
    #[serde(default)]
    pub kind: MemoryKind,

    /// Number of entries
    #[serde(default = "default_memory_size")]
    pub size: usize,

    /// First event id belonging to this memory (derived when omitted)
    #[serde(default)]
    pub first_event: Option<u16>,

    /// Last event id belonging to this memory (derived when omitted)
    #[serde(default)]
    pub last_event: Option<u16>,

    /// NV block backing entry 0
    #[serde(default)]
    pub nv_block_base: u16,
}

fn default_memory_size() -> usize {
    8
}

/// Kind of event memory
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryKind {
    #[default]
    Primary,
    /// Custom-trigger memory selected per event
    UserDefined,
    /// Copies of entries stored elsewhere, cleared only explicitly
    Mirror,
}

/// Permanent memory definition
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PermanentConfig {
    /// Number of permanent entries (0 disables permanent storage)
    #[serde(default)]
    pub size: usize,

    /// NV block backing entry 0
    #[serde(default)]
    pub nv_block_base: u16,
}

// =============================================================================
// Events
// =============================================================================

/// Event definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventDef {
    /// Event id (dense, starting at 1)
    pub id: u16,

    /// Human-readable name
    #[serde(default)]
    pub name: String,

    /// DTC number - hex string "010100", integer, or byte array
    #[serde(default, deserialize_with = "deserialize_optional_dtc")]
    pub dtc: Option<DtcNumber>,

    /// Combined DTC group shared with other events
    #[serde(default)]
    pub combined_group: Option<u8>,

    /// Operation cycle driving status bits
    #[serde(default)]
    pub operation_cycle: u8,

    /// Operation cycle driving aging (defaults to `operation_cycle`)
    #[serde(default)]
    pub aging_cycle: Option<u8>,

    /// Failed cycles until the event is confirmed
    #[serde(default = "default_trip_target")]
    pub trip_target: u8,

    /// Clean cycles until a stored entry ages out
    #[serde(default = "default_aging_target")]
    pub aging_target: u8,

    /// Aging policy
    #[serde(default)]
    pub aging: AgingPolicy,

    /// Passed cycles until the warning indicator is released
    #[serde(default = "default_healing_target")]
    pub healing_target: u8,

    /// Displacement priority (1 is highest)
    #[serde(default = "default_priority")]
    pub priority: u8,

    /// Fault or occurrence
    #[serde(default)]
    pub significance: Significance,

    /// Event is emission related
    #[serde(default)]
    pub obd_related: bool,

    /// Event stores a permanent DTC
    #[serde(default)]
    pub permanent_dtc: bool,

    /// Event requests a warning indicator when confirmed
    #[serde(default)]
    pub warning_indicator: bool,

    /// OBD readiness group
    #[serde(default)]
    pub readiness_group: Option<ReadinessGroup>,

    /// Memory the event is stored in
    #[serde(default = "default_memory_name")]
    pub memory: String,

    /// Also store the event in the mirror memory
    #[serde(default)]
    pub mirror: bool,

    /// Initial availability
    #[serde(default = "default_true")]
    pub available: bool,

    #[serde(skip)]
    pub(crate) memory_slot: usize,

    #[serde(skip)]
    pub(crate) mirror_slot: Option<usize>,
}

fn default_trip_target() -> u8 {
    1
}

fn default_aging_target() -> u8 {
    40
}

fn default_healing_target() -> u8 {
    3
}

fn default_priority() -> u8 {
    2
}

fn default_memory_name() -> String {
    PRIMARY_MEMORY.to_string()
}

impl EventDef {
    /// Minimal definition used by tests and programmatic setups
    pub fn new(id: u16) -> Self {
        Self {
            id,
            name: String::new(),
            dtc: None,
            combined_group: None,
            operation_cycle: 0,
            aging_cycle: None,
            trip_target: default_trip_target(),
            aging_target: default_aging_target(),
            aging: AgingPolicy::default(),
            healing_target: default_healing_target(),
            priority: default_priority(),
            significance: Significance::default(),
            obd_related: false,
            permanent_dtc: false,
            warning_indicator: false,
            readiness_group: None,
            memory: default_memory_name(),
            mirror: false,
            available: true,
            memory_slot: 0,
            mirror_slot: None,
        }
    }

    pub fn with_dtc(mut self, dtc: u32) -> Self {
        self.dtc = Some(DtcNumber(dtc));
        self
    }

    pub fn event_id(&self) -> EventId {
        EventId(self.id)
    }

    /// Cycle whose restarts drive aging
    pub fn aging_cycle(&self) -> u8 {
        self.aging_cycle.unwrap_or(self.operation_cycle)
    }

    /// Whether a stored entry of this event can ever age
    pub fn is_ageable(&self) -> bool {
        self.aging != AgingPolicy::Disabled && self.aging_target > 0
    }

    /// Index of the memory this event is stored in
    pub fn memory_slot(&self) -> usize {
        self.memory_slot
    }

    /// Index of the mirror memory, if mirrored
    pub fn mirror_slot(&self) -> Option<usize> {
        self.mirror_slot
    }
}

/// Aging policy of an event
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgingPolicy {
    /// Age after `aging_target` clean cycles
    #[default]
    Cycle,
    /// Once failed, never age
    Latched,
    /// Not ageable
    Disabled,
}

/// Diagnostic test result definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DtrDef {
    /// DTR identifier
    pub id: u16,
    /// Owning event
    pub event: u16,
    /// Lower limit
    #[serde(default)]
    pub lower_limit: i32,
    /// Upper limit
    #[serde(default)]
    pub upper_limit: i32,
}

// =============================================================================
// Loading and Validation
// =============================================================================

impl DemConfig {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> DemResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse and validate configuration from a TOML string
    pub fn from_toml(content: &str) -> DemResult<Self> {
        let mut config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate references and resolve memory names
    pub fn validate(&mut self) -> DemResult<()> {
        for (index, event) in self.events.iter().enumerate() {
            if event.id as usize != index + 1 {
                return Err(DemError::Config(format!(
                    "event ids must be dense from 1: position {} has id {}",
                    index + 1,
                    event.id
                )));
            }
        }

        let mut cycle_ids = HashSet::new();
        for cycle in &self.operation_cycles {
            if !cycle_ids.insert(cycle.id) {
                return Err(DemError::Config(format!(
                    "duplicate operation cycle {}",
                    cycle.id
                )));
            }
        }
        for cycle in [self.general.obd_driving_cycle, self.general.obd_warmup_cycle]
            .into_iter()
            .flatten()
        {
            if !cycle_ids.contains(&cycle) {
                return Err(DemError::InvalidCycle(cycle));
            }
        }
        if self.general.legislation.is_obd() && self.general.obd_driving_cycle.is_none() {
            return Err(DemError::Config(
                "OBD legislation requires obd_driving_cycle".to_string(),
            ));
        }

        if self.memories.is_empty() {
            return Err(DemError::Config("at least one memory is required".to_string()));
        }
        let mirror_slot = self
            .memories
            .iter()
            .position(|m| m.kind == MemoryKind::Mirror);

        let mut group_dtcs: BTreeMap<u8, Option<DtcNumber>> = BTreeMap::new();
        for event in &mut self.events {
            for cycle in [event.operation_cycle, event.aging_cycle()] {
                if !cycle_ids.contains(&cycle) {
                    return Err(DemError::InvalidCycle(cycle));
                }
            }

            event.memory_slot = self
                .memories
                .iter()
                .position(|m| m.name == event.memory && m.kind != MemoryKind::Mirror)
                .ok_or_else(|| DemError::InvalidMemory(event.memory.clone()))?;

            event.mirror_slot = if event.mirror {
                Some(mirror_slot.ok_or_else(|| {
                    DemError::Config(format!("event {} is mirrored but no mirror memory exists", event.id))
                })?)
            } else {
                None
            };

            if let Some(group) = event.combined_group {
                if group as usize >= CombinedGroupSet::CAPACITY {
                    return Err(DemError::Config(format!(
                        "combined group {} exceeds {}",
                        group,
                        CombinedGroupSet::CAPACITY
                    )));
                }
                if event.dtc.is_none() {
                    return Err(DemError::Config(format!(
                        "event {} is in combined group {} without a DTC",
                        event.id, group
                    )));
                }
                match group_dtcs.get(&group) {
                    Some(dtc) if *dtc != event.dtc => {
                        return Err(DemError::Config(format!(
                            "combined group {} mixes DTC numbers",
                            group
                        )));
                    }
                    Some(_) => {}
                    None => {
                        group_dtcs.insert(group, event.dtc);
                    }
                }
            }
        }

        for dtr in &self.dtrs {
            if dtr.event == 0 || dtr.event as usize > self.events.len() {
                return Err(DemError::Config(format!(
                    "DTR {} references unknown event {}",
                    dtr.id, dtr.event
                )));
            }
        }

        let mut blocks: Vec<(u16, usize, String)> = self
            .memories
            .iter()
            .map(|m| (m.nv_block_base, m.size, m.name.clone()))
            .collect();
        if self.permanent.size > 0 {
            blocks.push((
                self.permanent.nv_block_base,
                self.permanent.size,
                "permanent".to_string(),
            ));
        }
        for (base, size, name) in &blocks {
            if *base as usize + size > u16::MAX as usize + 1 {
                return Err(DemError::Config(format!(
                    "NV blocks of {} exceed the block range ({} + {})",
                    name, base, size
                )));
            }
        }
        blocks.sort_by_key(|(base, _, _)| *base);
        for pair in blocks.windows(2) {
            let (base, size, ref name) = pair[0];
            if base as usize + size > pair[1].0 as usize {
                return Err(DemError::Config(format!(
                    "NV blocks of {} overlap {}",
                    name, pair[1].2
                )));
            }
        }

        Ok(())
    }

    /// Number of event slots including the reserved slot 0
    pub fn event_count(&self) -> usize {
        self.events.len() + 1
    }

    /// Look up an event definition
    pub fn event(&self, id: EventId) -> Option<&EventDef> {
        if !id.is_valid() {
            return None;
        }
        self.events.get(id.index() - 1)
    }

    /// Iterate all configured event ids in ascending order
    pub fn event_ids(&self) -> impl Iterator<Item = EventId> + '_ {
        self.events.iter().map(EventDef::event_id)
    }

    /// Look up an operation cycle definition
    pub fn cycle(&self, id: u8) -> Option<&OperationCycleDef> {
        self.operation_cycles.iter().find(|c| c.id == id)
    }

    /// Index of a memory by name
    pub fn memory_slot(&self, name: &str) -> Option<usize> {
        self.memories.iter().position(|m| m.name == name)
    }

    /// Event-id range `[first, last]` of a memory
    pub fn memory_event_range(&self, slot: usize) -> Option<(EventId, EventId)> {
        let memory = self.memories.get(slot)?;
        let members = self
            .events
            .iter()
            .filter(|e| e.memory_slot == slot || e.mirror_slot == Some(slot))
            .map(|e| e.id);
        let first = memory.first_event.or_else(|| members.clone().min())?;
        let last = memory.last_event.or_else(|| members.max())?;
        Some((EventId(first), EventId(last)))
    }

    /// Slot of the first primary memory
    pub fn primary_slot(&self) -> Option<usize> {
        self.memories.iter().position(|m| m.kind == MemoryKind::Primary)
    }

    /// Representative event of a combined group (lowest id), or the event itself
    pub fn master_event(&self, id: EventId) -> EventId {
        match self.event(id).and_then(|e| e.combined_group) {
            Some(group) => self
                .events
                .iter()
                .find(|e| e.combined_group == Some(group))
                .map(EventDef::event_id)
                .unwrap_or(id),
            None => id,
        }
    }

    /// All events sharing the DTC of `id` (just `id` when not combined)
    pub fn combined_members(&self, id: EventId) -> Vec<EventId> {
        match self.event(id).and_then(|e| e.combined_group) {
            Some(group) => self
                .events
                .iter()
                .filter(|e| e.combined_group == Some(group))
                .map(EventDef::event_id)
                .collect(),
            None => vec![id],
        }
    }

    /// Events reporting the given DTC number
    pub fn events_with_dtc(&self, dtc: DtcNumber) -> Vec<EventId> {
        self.events
            .iter()
            .filter(|e| e.dtc == Some(dtc))
            .map(EventDef::event_id)
            .collect()
    }
}

// =============================================================================
// Hex Parsing Helpers
// =============================================================================

/// Parse hex string to bytes (supports "DEADBEEF" or "0xDEADBEEF")
fn parse_hex_bytes(s: &str) -> Option<Vec<u8>> {
    let s = s.trim();
    let s = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    hex::decode(s).ok()
}

/// Deserialize a hex u8 (supports "0x09" or 9)
fn deserialize_hex_u8<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum HexOrInt {
        Hex(String),
        Int(u8),
    }

    match HexOrInt::deserialize(deserializer)? {
        HexOrInt::Int(n) => Ok(n),
        HexOrInt::Hex(s) => {
            let s = s.trim();
            let s = s
                .strip_prefix("0x")
                .or_else(|| s.strip_prefix("0X"))
                .unwrap_or(s);
            u8::from_str_radix(s, 16).map_err(|e| D::Error::custom(e.to_string()))
        }
    }
}

/// Deserialize an optional DTC (supports "010100", 65792 or [1, 1, 0])
fn deserialize_optional_dtc<'de, D>(deserializer: D) -> Result<Option<DtcNumber>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum DtcRepr {
        Hex(String),
        Int(u32),
        Array(Vec<u8>),
    }

    let bytes = match Option::<DtcRepr>::deserialize(deserializer)? {
        None => return Ok(None),
        Some(DtcRepr::Int(n)) if n <= 0x00FF_FFFF => return Ok(Some(DtcNumber(n))),
        Some(DtcRepr::Int(n)) => {
            return Err(D::Error::custom(format!("DTC 0x{:X} exceeds 24 bits", n)))
        }
        Some(DtcRepr::Array(arr)) => arr,
        Some(DtcRepr::Hex(s)) => parse_hex_bytes(&s)
            .ok_or_else(|| D::Error::custom("Invalid hex string for DTC bytes"))?,
    };

    if bytes.len() != 3 {
        return Err(D::Error::custom("DTC bytes must be exactly 3 bytes"));
    }
    Ok(Some(DtcNumber::from_bytes([bytes[0], bytes[1], bytes[2]])))
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    const SAMPLE: &str = r#"
[general]
legislation = "obd"
status_availability_mask = "0x7F"
obd_driving_cycle = 1
obd_warmup_cycle = 2
displacement = "priority"

[[operation_cycles]]
id = 0
name = "power"

[[operation_cycles]]
id = 1
name = "dcy"
kind = "driving_cycle"

[[operation_cycles]]
id = 2
name = "warmup"
kind = "warm_up"

[[memories]]
name = "primary"
size = 4

[[memories]]
name = "mirror"
kind = "mirror"
size = 2
nv_block_base = 10

[permanent]
size = 2
nv_block_base = 20

[[events]]
id = 1
name = "coolant_sensor"
dtc = "010100"
operation_cycle = 1
combined_group = 3
permanent_dtc = true

[[events]]
id = 2
dtc = 65792
operation_cycle = 1
combined_group = 3
mirror = true

[[events]]
id = 3
dtc = [0x44, 0x20, 0x00]
aging = "latched"

[[dtrs]]
id = 0
event = 1
lower_limit = -10
upper_limit = 10
"#;

    #[test]
    fn test_parse_sample() {
        let config = DemConfig::from_toml(SAMPLE).unwrap();
        assert_eq!(config.general.legislation, Legislation::Obd);
        assert_eq!(config.general.status_availability_mask, 0x7F);
        assert_eq!(config.event_count(), 4);
        assert_eq!(config.event(EventId(1)).unwrap().dtc, Some(DtcNumber(0x010100)));
        assert_eq!(config.event(EventId(2)).unwrap().dtc, Some(DtcNumber(0x010100)));
        assert_eq!(config.event(EventId(3)).unwrap().dtc, Some(DtcNumber(0x442000)));
        assert_eq!(config.event(EventId(2)).unwrap().mirror_slot(), Some(1));
        assert_eq!(config.event(EventId(3)).unwrap().aging, AgingPolicy::Latched);
        assert!(config.event(EventId(0)).is_none());
        assert!(config.event(EventId(4)).is_none());
    }

    #[test]
    fn test_master_and_members() {
        let config = DemConfig::from_toml(SAMPLE).unwrap();
        assert_eq!(config.master_event(EventId(2)), EventId(1));
        assert_eq!(config.master_event(EventId(3)), EventId(3));
        assert_eq!(
            config.combined_members(EventId(2)),
            vec![EventId(1), EventId(2)]
        );
        assert_eq!(
            config.events_with_dtc(DtcNumber(0x010100)),
            vec![EventId(1), EventId(2)]
        );
    }

    #[test]
    fn test_memory_event_range_derived() {
        let config = DemConfig::from_toml(SAMPLE).unwrap();
        assert_eq!(
            config.memory_event_range(0),
            Some((EventId(1), EventId(3)))
        );
        assert_eq!(
            config.memory_event_range(1),
            Some((EventId(2), EventId(2)))
        );
    }

    #[test]
    fn test_rejects_sparse_ids() {
        let toml = r#"
[[events]]
id = 2
"#;
        let err = DemConfig::from_toml(toml).unwrap_err();
        assert!(matches!(err, DemError::Config(_)));
    }

    #[test]
    fn test_rejects_unknown_cycle() {
        let toml = r#"
[[events]]
id = 1
operation_cycle = 9
"#;
        let err = DemConfig::from_toml(toml).unwrap_err();
        assert!(matches!(err, DemError::InvalidCycle(9)));
    }

    #[test]
    fn test_rejects_unknown_memory() {
        let toml = r#"
[[events]]
id = 1
memory = "nowhere"
"#;
        let err = DemConfig::from_toml(toml).unwrap_err();
        assert!(matches!(err, DemError::InvalidMemory(_)));
    }

    #[test]
    fn test_rejects_mixed_group_dtcs() {
        let toml = r#"
[[events]]
id = 1
dtc = "010100"
combined_group = 1

[[events]]
id = 2
dtc = "010200"
combined_group = 1
"#;
        assert!(DemConfig::from_toml(toml).is_err());
    }

    #[test]
    fn test_rejects_overlapping_nv_blocks() {
        let toml = r#"
[[memories]]
name = "primary"
size = 8

[permanent]
size = 2
nv_block_base = 4
"#;
        assert!(DemConfig::from_toml(toml).is_err());
    }

    #[rstest]
    #[case("[[memories]]\nname = \"primary\"\nsize = 2\nnv_block_base = 65535\n")]
    #[case("[permanent]\nsize = 4\nnv_block_base = 65534\n")]
    fn test_rejects_nv_blocks_past_block_range(#[case] toml: &str) {
        let err = DemConfig::from_toml(toml).unwrap_err();
        assert!(err.to_string().contains("exceed the block range"));
    }

    #[test]
    fn test_accepts_nv_blocks_ending_at_last_block() {
        let toml = r#"
[[memories]]
name = "primary"
size = 2
nv_block_base = 65534
"#;
        assert!(DemConfig::from_toml(toml).is_ok());
    }

    #[test]
    fn test_obd_requires_driving_cycle() {
        let toml = r#"
[general]
legislation = "wwh_obd"
"#;
        assert!(DemConfig::from_toml(toml).is_err());
    }

    #[test]
    fn test_event_def_yaml() {
        let yaml = r#"
id: 1
dtc: "0x010100"
trip_target: 2
"#;
        let def: EventDef = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(def.dtc, Some(DtcNumber(0x010100)));
        assert_eq!(def.trip_target, 2);
        assert_eq!(def.aging_target, 40);
        assert!(def.available);
    }
}
