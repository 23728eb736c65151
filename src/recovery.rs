//! Pause/unlock plumbing and the scoped sensor guards.
//!
//! Pausing hands control to a human: the hotend temperature is captured,
//! the pause flag set, and the host asked to save its motion state, extend
//! the idle timeout and halt. `unlock` is the cheap counterpart for
//! idler-stall-only situations: clear the flag and re-home just the idler.
//! The resume flow (including failed-command replay) lives in
//! [`crate::dispatch`], next to the failure record it consumes.

use crate::dispatch::MmuCommand;
use crate::error::MultifeedError;
use crate::scripts;
use crate::unit::Mmu;

/// The last failed top-level command, kept so `resume` can re-attempt it
/// exactly once. Cleared on success, or when the failed command was `resume`
/// itself (no recursive replay).
#[derive(Debug, Clone, PartialEq)]
pub struct FailureRecord {
    pub command: MmuCommand,
    pub error: String,
}

impl Mmu {
    /// Halt the unit and the surrounding print. Idempotent on the state
    /// flags, but the halt sequence is re-issued on every call.
    pub fn pause(&mut self) {
        self.state.paused_temperature = Some(self.io.heater.current_temperature());
        self.state.is_paused = true;
        self.reporter.blocking("MMU paused, manual intervention needed");
        let script = scripts::pause_sequence(self.cfg.timeout_pause);
        self.io.scripts.run(&script);
    }

    /// Clear the pause flag and re-home only the idler, leaving the selector
    /// position and the tool/filament bookkeeping untouched.
    pub fn unlock(&mut self) -> Result<(), MultifeedError> {
        self.status_msg("Resume print");
        self.state.is_paused = false;
        self.home_idler();
        Ok(())
    }

    /// Run `f` with the extruder runout switch disabled, restoring its prior
    /// enabled state on every exit path.
    pub(crate) fn with_switch_suppressed<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        let initial = self.io.sensors.switch_sensor_enabled();
        self.reporter.debug("Disabling filament runout sensor!");
        self.io.sensors.set_switch_sensor_enabled(false);

        let out = f(self);

        self.reporter.debug(if initial {
            "Re-enabling filament runout sensor!"
        } else {
            "Re-disabling filament runout sensor!"
        });
        self.io.sensors.set_switch_sensor_enabled(initial);
        out
    }

    /// Run `f` with both the runout switch and the motion sensor disabled.
    /// On restore the motion sensor is fed a synthetic event first, so the
    /// retraction that just happened is not mistaken for a runout.
    pub(crate) fn with_sensors_suppressed<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        let switch_initial = self.io.sensors.switch_sensor_enabled();
        let motion_initial = self.io.sensors.motion_sensor_enabled();
        self.reporter.debug("Disabling filament runout sensor!");
        self.io.sensors.set_switch_sensor_enabled(false);
        self.reporter.debug("Disabling filament motion sensor!");
        self.io.sensors.set_motion_sensor_enabled(false);

        let out = f(self);

        let now = self.io.timer.monotonic();
        self.io.sensors.notify_motion_event(now);
        self.io.sensors.set_motion_sensor_enabled(motion_initial);
        self.io.sensors.set_switch_sensor_enabled(switch_initial);
        self.reporter.debug("Restored filament sensors");
        out
    }
}
