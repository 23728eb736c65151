//! External-interface boundary of the feed unit.
//!
//! The engine never talks to steppers, sensors, the heater or the host
//! directly; everything goes through these traits. Production wires them to
//! the printer firmware, tests and the demo backend wire them to
//! [`SimRig`](super::SimRig). All calls are synchronous: one blocking
//! actuator or sensor call at a time, yielding only at the explicit wait
//! points.

use crate::prompt::Prompt;

/// The three independently addressable actuators of the unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxisKind {
    Selector,
    Idler,
    Pulley,
}

/// One linear/rotary actuator. Offsets are relative to the most recent
/// [`Axis::zero_position`]; physical position is only meaningful relative to
/// the immediately preceding homing reference.
pub trait Axis {
    fn zero_position(&mut self);

    /// Queue a move to `offset`. With `wait` the call blocks until the motion
    /// has flushed.
    fn move_to(&mut self, offset: f64, speed: f64, accel: f64, wait: bool);

    /// Homing-style move of up to `offset`: stops early when the axis
    /// endstop reaches the requested trigger state.
    fn homing_move(
        &mut self,
        offset: f64,
        speed: f64,
        accel: f64,
        trigger_on_endstop: bool,
        direction_positive: bool,
    );

    fn set_enabled(&mut self, enabled: bool);

    /// Block until all queued motion on this axis has completed.
    fn wait_for_completion(&mut self);
}

/// Read-only filament sensing plus the enable/disable switches the scoped
/// guards flip around intentional moves.
pub trait FilamentSensors {
    /// The presence switch at the extruder.
    fn extruder_filament_present(&self) -> bool;

    /// The filament-detect endstop partway down the feed path.
    fn finda_triggered(&self) -> bool;

    /// Whether a motion/encoder sensor is fitted at all.
    fn has_motion_sensor(&self) -> bool;

    fn switch_sensor_enabled(&self) -> bool;
    fn set_switch_sensor_enabled(&mut self, enabled: bool);

    fn motion_sensor_enabled(&self) -> bool;
    fn set_motion_sensor_enabled(&mut self, enabled: bool);

    /// Feed the motion sensor a synthetic event so an intentional retraction
    /// is not mistaken for a runout.
    fn notify_motion_event(&mut self, timestamp: f64);
}

pub trait Heater {
    fn current_temperature(&self) -> f64;

    /// Fire-and-forget target request; the control loop lives elsewhere.
    fn set_target_temperature(&mut self, target: f64);
}

/// The extruder drive gear, fed synchronized with the pulley. Negative
/// lengths retract.
pub trait Extruder {
    fn feed(&mut self, length: f64, speed: f64);
}

/// Opaque multi-line host scripts (see [`crate::scripts`]). Side effects
/// only; no return value.
pub trait ScriptPort {
    fn run(&mut self, script: &str);
}

pub trait Timer {
    /// Monotonic clock in seconds.
    fn monotonic(&self) -> f64;

    fn sleep_until(&mut self, deadline: f64);
}

/// Renders the interactive recovery dialog. Invoked only on unrecoverable
/// tool-change failure.
pub trait PromptScreen {
    fn show(&mut self, prompt: &Prompt);
}

/// Everything the engine drives, bundled.
pub struct MmuIo {
    pub selector: Box<dyn Axis>,
    pub idler: Box<dyn Axis>,
    pub pulley: Box<dyn Axis>,
    pub sensors: Box<dyn FilamentSensors>,
    pub heater: Box<dyn Heater>,
    pub extruder: Box<dyn Extruder>,
    pub scripts: Box<dyn ScriptPort>,
    pub timer: Box<dyn Timer>,
    pub prompts: Box<dyn PromptScreen>,
}
