//! Scenario files
//!
//! A scenario is an ordered list of steps replayed against one event
//! manager instance:
//!
//! ```toml
//! name = "misfire confirms"
//!
//! [[steps]]
//! action = "fail"
//! event = 4
//!
//! [[steps]]
//! action = "restart_cycle"
//! cycle = 1
//! times = 3
//! ```

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use dem_core::{ActivationMode, Dem, DtcSelection, DtrValue, EventId, MonitorStatus};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub steps: Vec<Step>,
}

impl Scenario {
    /// Load a scenario from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read scenario {}", path.display()))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| anyhow!("Invalid scenario: {}", e))
    }
}

/// One scenario action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    /// Qualified failed result
    Fail { event: u16 },
    /// Qualified passed result
    Pass { event: u16 },
    /// Fault detection counter from a debouncing monitor
    Fdc { event: u16, value: i8 },
    RestartCycle {
        cycle: u8,
        #[serde(default = "default_times")]
        times: u16,
    },
    /// Clear everything, one DTC (hex) or one memory
    Clear {
        #[serde(default)]
        dtc: Option<String>,
        #[serde(default)]
        memory: Option<String>,
    },
    Available { event: u16, available: bool },
    Suppress { event: u16, suppressed: bool },
    QualifyDcy,
    PermanentMemory { enabled: bool },
    ActivationMode { mode: ActivationMode },
    Dtr {
        id: u16,
        value: i32,
        lower: i32,
        upper: i32,
    },
    MainFunction,
}

fn default_times() -> u16 {
    1
}

impl Step {
    fn apply(&self, dem: &Dem) -> Result<()> {
        match self {
            Step::Fail { event } => dem.set_event_status(EventId(*event), MonitorStatus::Failed)?,
            Step::Pass { event } => dem.set_event_status(EventId(*event), MonitorStatus::Passed)?,
            Step::Fdc { event, value } => {
                dem.report_fault_detection_counter(EventId(*event), *value)?
            }
            Step::RestartCycle { cycle, times } => {
                for _ in 0..*times {
                    dem.restart_operation_cycle(*cycle)?;
                }
            }
            Step::Clear { dtc, memory } => {
                let selection = selection(dtc.as_deref(), memory.as_deref())?;
                let cleared = dem.clear_dtc(&selection)?;
                info!(selection = ?selection, cleared, "Cleared diagnostic information");
            }
            Step::Available { event, available } => {
                dem.set_event_available(EventId(*event), *available)?
            }
            Step::Suppress { event, suppressed } => {
                dem.set_dtc_suppressed(EventId(*event), *suppressed)?
            }
            Step::QualifyDcy => dem.qualify_driving_cycle()?,
            Step::PermanentMemory { enabled } => dem.set_permanent_memory_enabled(*enabled),
            Step::ActivationMode { mode } => dem.set_activation_mode(*mode),
            Step::Dtr {
                id,
                value,
                lower,
                upper,
            } => dem.report_dtr(
                *id,
                DtrValue {
                    test_value: *value,
                    lower_limit: *lower,
                    upper_limit: *upper,
                },
            )?,
            Step::MainFunction => dem.main_function(),
        }
        Ok(())
    }
}

fn selection(dtc: Option<&str>, memory: Option<&str>) -> Result<DtcSelection> {
    match (dtc, memory) {
        (None, None) => Ok(DtcSelection::All),
        (Some(dtc), None) => Ok(DtcSelection::Dtc(parse_dtc(dtc)?)),
        (None, Some(memory)) => Ok(DtcSelection::Memory(memory.to_string())),
        (Some(_), Some(_)) => Err(anyhow!("clear takes either dtc or memory, not both")),
    }
}

/// Parse a DTC given as hex, with or without `0x` prefix
fn parse_dtc(s: &str) -> Result<u32> {
    let s = s.trim_start_matches("0x").trim_start_matches("0X");
    u32::from_str_radix(s, 16).map_err(|e| anyhow!("Invalid DTC '{}': {}", s, e))
}

/// Replay every step; returns the number of steps applied
pub fn run(dem: &Dem, scenario: &Scenario) -> Result<usize> {
    info!(name = %scenario.name, steps = scenario.steps.len(), "Running scenario");
    for (index, step) in scenario.steps.iter().enumerate() {
        debug!(step = index + 1, ?step, "Applying step");
        step.apply(dem)
            .with_context(|| format!("step {} ({:?}) failed", index + 1, step))?;
    }
    Ok(scenario.steps.len())
}
