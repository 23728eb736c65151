use std::fmt;

use serde::Serialize;

/// Sensor-gated checkpoints along the filament path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Checkpoint {
    /// The filament-detect endstop partway down the feed path.
    Finda,
    /// The filament-presence switch at the extruder.
    Extruder,
}

impl fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Checkpoint::Finda => write!(f, "FINDA"),
            Checkpoint::Extruder => write!(f, "extruder"),
        }
    }
}

/// Session state of the feed unit.
///
/// Created unhomed/unpaused at startup and mutated by every transport
/// operation for the life of the process. `current_filament` may be set while
/// `current_tool` is unset (filament parked at FINDA with no axis engaged)
/// but never the reverse.
#[derive(Debug, Clone, Serialize)]
pub struct UnitState {
    pub is_homed: bool,
    pub is_paused: bool,
    pub current_tool: Option<usize>,
    pub current_filament: Option<usize>,
    /// Hotend temperature captured when the unit paused.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paused_temperature: Option<f64>,
    pub material_changes: u32,
    pub successful_changes: u32,
    pub failed_changes: u32,
}

impl UnitState {
    pub fn new() -> Self {
        Self {
            is_homed: false,
            is_paused: false,
            current_tool: None,
            current_filament: None,
            paused_temperature: None,
            material_changes: 0,
            successful_changes: 0,
            failed_changes: 0,
        }
    }
}

impl Default for UnitState {
    fn default() -> Self {
        Self::new()
    }
}

/// Format an optional tool id the way it appears in status messages.
pub fn tool_label(tool: Option<usize>) -> String {
    match tool {
        Some(id) => format!("T{id}"),
        None => "T?".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_state_defaults() {
        let state = UnitState::new();
        assert!(!state.is_homed);
        assert!(!state.is_paused);
        assert_eq!(state.current_tool, None);
        assert_eq!(state.current_filament, None);
        assert_eq!(state.material_changes, 0);
    }

    #[test]
    fn tool_labels() {
        assert_eq!(tool_label(Some(3)), "T3");
        assert_eq!(tool_label(None), "T?");
    }

    #[test]
    fn checkpoint_display() {
        assert_eq!(Checkpoint::Finda.to_string(), "FINDA");
        assert_eq!(Checkpoint::Extruder.to_string(), "extruder");
    }
}
