//! OBD global state: permanent memory switch, WWH-OBD activation mode and
//! driving cycle qualification

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use serde::{Deserialize, Serialize};
use tracing::info;

/// WWH-OBD activation mode of the malfunction indicator
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum ActivationMode {
    #[default]
    Mode1 = 1,
    Mode2 = 2,
    Mode3 = 3,
    /// Continuous MI: permanent DTCs are stored
    Mode4 = 4,
}

impl ActivationMode {
    fn from_u8(value: u8) -> Self {
        match value {
            2 => ActivationMode::Mode2,
            3 => ActivationMode::Mode3,
            4 => ActivationMode::Mode4,
            _ => ActivationMode::Mode1,
        }
    }
}

#[derive(Debug)]
pub struct ObdState {
    permanent_memory_enabled: AtomicBool,
    activation_mode: AtomicU8,
    dcy_qualified: AtomicBool,
}

impl Default for ObdState {
    fn default() -> Self {
        Self {
            permanent_memory_enabled: AtomicBool::new(true),
            activation_mode: AtomicU8::new(ActivationMode::Mode1 as u8),
            dcy_qualified: AtomicBool::new(false),
        }
    }
}

impl ObdState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Global permanent memory switch (legacy OBD)
    pub fn permanent_memory_enabled(&self) -> bool {
        self.permanent_memory_enabled.load(Ordering::Acquire)
    }

    pub fn set_permanent_memory_enabled(&self, enabled: bool) {
        if self.permanent_memory_enabled.swap(enabled, Ordering::AcqRel) != enabled {
            info!(enabled, "Permanent memory switched");
        }
    }

    pub fn activation_mode(&self) -> ActivationMode {
        ActivationMode::from_u8(self.activation_mode.load(Ordering::Acquire))
    }

    pub fn set_activation_mode(&self, mode: ActivationMode) {
        let previous = self.activation_mode.swap(mode as u8, Ordering::AcqRel);
        if previous != mode as u8 {
            info!(mode = ?mode, "Activation mode changed");
        }
    }

    /// WWH-OBD gate for permanent storage
    pub fn is_mode4_active(&self) -> bool {
        self.activation_mode() == ActivationMode::Mode4
    }

    pub fn is_dcy_qualified(&self) -> bool {
        self.dcy_qualified.load(Ordering::Acquire)
    }

    /// Mark the driving cycle qualified; returns false if it already was
    pub fn qualify_dcy(&self) -> bool {
        !self.dcy_qualified.swap(true, Ordering::AcqRel)
    }

    /// Driving cycle ended; the next one starts unqualified
    pub fn end_dcy(&self) -> bool {
        self.dcy_qualified.swap(false, Ordering::AcqRel)
    }
}
