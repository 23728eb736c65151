//! Builders for the opaque host scripts.
//!
//! Operations this engine does not implement itself (saving/restoring motion
//! state, halting and resuming the print, ramming, cutting in the extruder,
//! stepper driver overrides) are delegated to the host as multi-line textual
//! scripts fired through [`ScriptPort`](crate::hardware::ScriptPort). The
//! host treats them as black-box side effects; the engine only guarantees
//! their order.

/// Halt sequence fired on pause: save motion state, extend the idle-shutdown
/// timeout, halt the print and beep three times.
pub fn pause_sequence(timeout_pause: u32) -> String {
    format!(
        "SAVE_GCODE_STATE NAME=PAUSE_MMU_state\n\
         SET_IDLE_TIMEOUT TIMEOUT={timeout_pause}\n\
         M118 Start PAUSE\n\
         PAUSE\n\
         G90\n\
         M300\n\
         M300\n\
         M300"
    )
}

/// Continuation sequence fired on resume: restore motion state and continue.
pub fn resume_sequence() -> String {
    "M118 End PAUSE\n\
     RESTORE_GCODE_STATE NAME=PAUSE_MMU_state\n\
     RESUME"
        .to_string()
}

/// The slicer-defined ramming pattern that clears molten filament from the
/// nozzle before an unload.
pub fn ramming() -> String {
    "RAMMING_SLICER".to_string()
}

/// Cut the filament inside the extruder (filament-cutter rigs only).
pub fn cut_in_extruder() -> String {
    "CUT_FILAMENT_IN_EXTRUDER".to_string()
}

/// Override the stall threshold and run current of a stepper driver. Also
/// used to restore the nominal values after a forced cut traversal.
pub fn stepper_current_override(stepper: &str, stall_threshold: u32, current: f64) -> String {
    format!(
        "SET_TMC_FIELD STEPPER={stepper} FIELD=SGTHRS VALUE={stall_threshold}\n\
         SET_TMC_CURRENT STEPPER={stepper} CURRENT={current:.3}"
    )
}

/// Show a message on the printer's status panel.
pub fn status_panel(msg: &str) -> String {
    format!("M117 {msg}")
}
