//! The feed unit itself: owned state plus the tool/session operations.
//!
//! [`Mmu`] owns the configuration, the [`UnitState`] bookkeeping and the I/O
//! bundle; every operation takes it by exclusive reference, so there is no
//! ambient mutability anywhere. The transport stages live in
//! [`crate::transport`], pause/resume plumbing in [`crate::recovery`]; this
//! module drives the top-level procedures: homing, selection, load/unload
//! and the tool change.

use serde::Serialize;

use crate::config::MmuConfig;
use crate::error::MultifeedError;
use crate::hardware::{Axis, AxisKind, MmuIo};
use crate::prompt::{Prompt, PromptButton};
use crate::scripts;
use crate::state::{Checkpoint, UnitState, tool_label};
use crate::ui::Reporter;

pub struct Mmu {
    pub cfg: MmuConfig,
    pub state: UnitState,
    pub io: MmuIo,
    pub reporter: Reporter,
}

/// Point-in-time view of the unit for the status command.
#[derive(Debug, Serialize)]
pub struct StatusSnapshot {
    pub unit: UnitState,
    pub finda_triggered: bool,
    pub extruder_filament_present: bool,
    pub hotend_temperature: f64,
}

impl Mmu {
    pub fn new(cfg: MmuConfig, io: MmuIo, reporter: Reporter) -> Self {
        Self {
            cfg,
            state: UnitState::new(),
            io,
            reporter,
        }
    }

    /// Console message mirrored onto the printer's status panel.
    pub(crate) fn status_msg(&mut self, msg: &str) {
        self.reporter.info(msg);
        let script = scripts::status_panel(msg);
        self.io.scripts.run(&script);
    }

    pub(crate) fn ensure_not_paused(&self) -> Result<(), MultifeedError> {
        if self.state.is_paused {
            Err(MultifeedError::Paused)
        } else {
            Ok(())
        }
    }

    pub(crate) fn validate_hotend_hot(&mut self) -> Result<(), MultifeedError> {
        self.reporter.debug("Checking hotend temperature");
        let actual = self.io.heater.current_temperature();
        let min = self.cfg.min_temp_extruder;
        if actual < min {
            self.status_msg("Hotend is cold!");
            return Err(MultifeedError::HotendTooCold { actual, min });
        }
        Ok(())
    }

    pub(crate) fn validate_filament_in_extruder(&mut self) -> Result<(), MultifeedError> {
        self.reporter.debug("Checking if filament in extruder");
        if !self.io.sensors.extruder_filament_present() {
            self.status_msg("Filament not in extruder");
            return Err(MultifeedError::FilamentMissing(Checkpoint::Extruder));
        }
        self.reporter.debug("Filament in extruder");
        Ok(())
    }

    pub(crate) fn validate_filament_not_stuck_in_extruder(&mut self) -> Result<(), MultifeedError> {
        self.reporter.debug("Checking if filament stuck in extruder");
        if self.io.sensors.extruder_filament_present() {
            self.status_msg("Filament stuck in extruder");
            return Err(MultifeedError::FilamentStuck(Checkpoint::Extruder));
        }
        self.reporter.debug("Filament not stuck in extruder");
        Ok(())
    }

    pub(crate) fn validate_filament_not_stuck_in_finda(&mut self) -> Result<(), MultifeedError> {
        self.reporter.debug("Checking if filament stuck in FINDA");
        if self.io.sensors.finda_triggered() {
            self.status_msg("Filament stuck in FINDA");
            return Err(MultifeedError::FilamentStuck(Checkpoint::Finda));
        }
        self.reporter.debug("Filament not stuck in FINDA");
        Ok(())
    }

    /// Sleep for `seconds` on the host timer.
    pub(crate) fn dwell(&mut self, seconds: f64) {
        let deadline = self.io.timer.monotonic() + seconds;
        self.io.timer.sleep_until(deadline);
    }

    fn axis_mut(&mut self, kind: AxisKind) -> &mut dyn Axis {
        match kind {
            AxisKind::Selector => self.io.selector.as_mut(),
            AxisKind::Idler => self.io.idler.as_mut(),
            AxisKind::Pulley => self.io.pulley.as_mut(),
        }
    }

    /// Disable all three steppers, with the configured settling pauses
    /// around each disable.
    pub fn disable_steppers(&mut self) {
        let before = self.cfg.pause_before_disabling_steppers_ms as f64 / 1000.0;
        let after = self.cfg.pause_after_disabling_steppers_ms as f64 / 1000.0;
        for kind in [AxisKind::Pulley, AxisKind::Selector, AxisKind::Idler] {
            self.axis_mut(kind).wait_for_completion();
            self.dwell(before);
            self.axis_mut(kind).set_enabled(false);
            self.dwell(after);
        }
    }

    /// Home the idler: back off in case it already rests on the endstop,
    /// run the full travel into the endstop, zero there, park.
    pub fn home_idler(&mut self) {
        self.reporter.debug("Homing idler");
        let backoff = self.cfg.idler_homing_move_lengths[0];
        let full_travel = self.cfg.idler_homing_move_lengths[1];
        self.io.idler.zero_position();
        self.io.idler.move_to(
            backoff,
            self.cfg.idler_homing_speed,
            self.cfg.idler_homing_accel,
            true,
        );
        self.io.idler.move_to(
            full_travel,
            self.cfg.idler_homing_speed,
            self.cfg.idler_homing_accel,
            true,
        );
        // The endstop is the zero reference.
        self.io.idler.zero_position();
        self.io.idler.move_to(
            self.cfg.idler_park(),
            self.cfg.idler_speed,
            self.cfg.idler_accel,
            false,
        );
    }

    /// Eject any loaded filament, then home every axis.
    pub fn home(&mut self) -> Result<(), MultifeedError> {
        self.ensure_not_paused()?;
        self.with_switch_suppressed(|mmu| {
            // The ejection path may need to re-select the tracked tool,
            // which requires the homed flag before the axes are re-homed.
            mmu.state.is_homed = true;
            mmu.reporter.debug("Homing MMU ...");
            mmu.eject_before_home()?;
            mmu.home_only()
        })
    }

    /// Home the axes without ejecting first: idler, then (unless running a
    /// single shared feed path) a fast selector pass followed by a slow
    /// confirmatory pass.
    pub fn home_only(&mut self) -> Result<(), MultifeedError> {
        if self.state.is_paused {
            self.status_msg("Homing MMU failed, MMU is paused, unlock it ...");
            return Err(MultifeedError::Paused);
        }

        self.home_idler();

        if !self.cfg.enable_no_selector_mode {
            self.reporter.debug("Homing selector");
            let travel = -self.cfg.selector_homing_move_length.abs();
            self.io.selector.zero_position();
            self.io.selector.homing_move(
                travel,
                self.cfg.selector_homing_speed,
                self.cfg.selector_accel,
                true,
                true,
            );
            self.io.selector.wait_for_completion();
            self.io.selector.zero_position();
            // Nudge off the endstop so the slow pass re-approaches it.
            self.io.selector.move_to(
                3.0,
                self.cfg.selector_speed,
                self.cfg.selector_accel,
                true,
            );
            self.io.selector.zero_position();
            self.io.selector.wait_for_completion();
            self.io.selector.homing_move(
                travel,
                self.cfg.selector_homing_speed_slow,
                self.cfg.selector_accel,
                true,
                true,
            );
            self.io.selector.wait_for_completion();
            self.io.selector.zero_position();
        }

        self.state.current_tool = None;
        self.state.current_filament = None;
        self.state.is_homed = true;
        self.unselect_tool()?;
        self.reporter.debug("Homing MMU ended ...");
        self.disable_steppers();
        Ok(())
    }

    /// Align the idler (and selector, unless running a single shared feed
    /// path) with the tool's entry in the position tables.
    pub fn select_tool(&mut self, tool: usize) -> Result<(), MultifeedError> {
        self.ensure_not_paused()?;
        if !self.state.is_homed {
            self.status_msg("Could not select tool, MMU is not homed");
            return Err(MultifeedError::NotHomed);
        }
        if tool >= self.cfg.number_of_tools {
            self.status_msg(&format!("Invalid tool id: {tool}"));
            return Err(MultifeedError::InvalidTool(tool));
        }

        self.reporter.debug(&format!("Select Tool {tool} ..."));
        self.io.idler.move_to(
            self.cfg.idler_positions[tool],
            self.cfg.idler_speed,
            self.cfg.idler_accel,
            false,
        );
        if !self.cfg.enable_no_selector_mode {
            self.io.selector.move_to(
                self.cfg.selector_positions[tool],
                self.cfg.selector_speed,
                self.cfg.selector_accel,
                true,
            );
        }
        self.state.current_tool = Some(tool);
        self.reporter.debug(&format!("Tool {tool} Enabled"));
        Ok(())
    }

    /// Park the idler at the sentinel entry. The parking move is issued even
    /// when no tool is selected.
    pub fn unselect_tool(&mut self) -> Result<(), MultifeedError> {
        self.ensure_not_paused()?;
        if !self.state.is_homed {
            self.status_msg("Could not unselect tool, MMU is not homed");
            return Err(MultifeedError::NotHomed);
        }

        match self.state.current_tool {
            Some(tool) => self.reporter.debug(&format!("Unselecting Tool T{tool}")),
            None => self
                .reporter
                .debug("Unselecting tool while no tool is selected"),
        }

        self.io.idler.move_to(
            self.cfg.idler_park(),
            self.cfg.idler_speed,
            self.cfg.idler_accel,
            false,
        );
        self.state.current_tool = None;
        self.reporter.debug("Unselect Tool is complete!");
        Ok(())
    }

    /// Load filament from the unit to the nozzle: select, FINDA, bowden,
    /// hotend, in that fixed order. The first failing stage aborts the rest.
    pub fn load_tool(&mut self, tool: usize) -> Result<(), MultifeedError> {
        self.ensure_not_paused()?;
        self.validate_hotend_hot()?;
        self.reporter.debug(&format!("LT {tool}"));
        self.select_tool(tool)?;
        self.load_to_extruder()?;
        self.load_to_hotend()
    }

    /// Unload filament from the nozzle back into the unit.
    ///
    /// When no filament is tracked, the bookkeeping is reconciled against
    /// the FINDA sensor instead of unconditionally failing: a triggered
    /// FINDA with a selected tool means stale state, and the selected tool
    /// is adopted as the loaded filament.
    pub fn unload_tool(&mut self) -> Result<(), MultifeedError> {
        self.ensure_not_paused()?;

        let filament = match self.state.current_filament {
            Some(filament) => filament,
            None => {
                self.reporter.debug("No filament tracked as loaded");
                if self.io.sensors.finda_triggered() {
                    self.reporter.debug("But FINDA reports filament");
                    let Some(tool) = self.state.current_tool else {
                        self.reporter
                            .debug("No tool selected either, cancelling unload");
                        return Err(MultifeedError::NoToolSelected);
                    };
                    self.reporter
                        .debug(&format!("Adopting selected tool T{tool} as loaded filament"));
                    self.state.current_filament = Some(tool);
                    return Ok(());
                }
                self.reporter.debug("FINDA clear, nothing to unload");
                return Ok(());
            }
        };

        if self.cfg.enable_filament_cutter && self.io.sensors.extruder_filament_present() {
            self.reporter.debug(&format!("Cut T{filament}"));
            let script = scripts::cut_in_extruder();
            self.io.scripts.run(&script);
        }

        self.reporter.debug(&format!("UT {filament}"));
        self.unload_from_hotend()?;
        self.select_tool(filament)?;
        self.unload_from_extruder()
    }

    /// The top-level tool change.
    ///
    /// No-ops when the requested tool already matches the tracked filament.
    /// Otherwise retries the unload+load pair up to the configured ceiling
    /// with both filament sensors suppressed, forcing a full re-home before
    /// the final attempt, and on exhaustion disables the steppers and
    /// renders the recovery prompt.
    pub fn change_tool(&mut self, tool: usize) -> Result<(), MultifeedError> {
        self.ensure_not_paused()?;
        if tool >= self.cfg.number_of_tools {
            self.status_msg(&format!("Invalid tool id: {tool}"));
            return Err(MultifeedError::InvalidTool(tool));
        }

        let previous = self.state.current_filament;
        self.status_msg(&format!("{} => T{tool}", tool_label(previous)));
        if previous == Some(tool) {
            return Ok(());
        }

        self.state.material_changes += 1;
        let retries = self.cfg.tool_change_retry;
        let outcome = self.with_sensors_suppressed(|mmu| {
            for attempt in 0..retries {
                mmu.status_msg(&format!("T{tool} ({attempt})..."));
                if let Err(err) = mmu.unload_tool() {
                    mmu.reporter.debug(&format!(
                        "Unload {} failed: {err}",
                        tool_label(mmu.state.current_filament)
                    ));
                    continue;
                }
                // Last resort before the final attempt: full re-home.
                if attempt == retries - 1
                    && let Err(err) = mmu.home()
                {
                    mmu.reporter
                        .debug(&format!("Recovery homing failed: {err}"));
                }
                if let Err(err) = mmu.load_tool(tool) {
                    mmu.reporter.debug(&format!("Load T{tool} failed: {err}"));
                    continue;
                }
                return Ok(());
            }
            Err(MultifeedError::ToolChangeFailed {
                tool,
                attempts: retries,
            })
        });

        match outcome {
            Ok(()) => {
                self.state.successful_changes += 1;
                self.status_msg(&format!("Done {} => T{tool}", tool_label(previous)));
                self.disable_steppers();
                Ok(())
            }
            Err(err) => {
                self.state.failed_changes += 1;
                let message = match previous {
                    Some(prev) => format!("T{prev} => T{tool} failed!"),
                    None => format!("T{tool} failed!"),
                };
                self.status_msg(&message);
                self.disable_steppers();

                let prompt = Prompt::new("MMU Error", message)
                    .with_group(vec![
                        PromptButton::new("Unlock MMU", "unlock"),
                        PromptButton::new("Home MMU", "home"),
                    ])
                    .with_group(vec![PromptButton::new(
                        format!("Retry T{tool}"),
                        format!("change {tool}"),
                    )])
                    .with_footer(PromptButton::new("Resume", "resume"));
                self.io.prompts.show(&prompt);
                self.disable_steppers();
                Err(err)
            }
        }
    }

    /// Unload and unselect everything, leaving the unit empty.
    pub fn eject_tool(&mut self) -> Result<(), MultifeedError> {
        self.ensure_not_paused()?;
        self.unload_tool()?;
        if !self.cfg.enable_no_selector_mode {
            if self.io.sensors.finda_triggered() {
                self.status_msg("Eject failed, filament still in FINDA");
                return Err(MultifeedError::FilamentStuck(Checkpoint::Finda));
            }
            self.unselect_tool()?;
        } else {
            self.unselect_tool()?;
            self.state.current_filament = None;
        }
        self.status_msg("Eject ok ...");
        Ok(())
    }

    /// Print the raw sensor readings.
    pub fn report_sensors(&mut self) {
        let extruder = self.io.sensors.extruder_filament_present();
        let finda = self.io.sensors.finda_triggered();
        let switch_enabled = self.io.sensors.switch_sensor_enabled();
        self.reporter.info("Sensor status");
        self.reporter.info("=============");
        self.reporter.info(&format!("Extruder : {extruder}"));
        self.reporter.info(&format!("FINDA    : {finda}"));
        self.reporter
            .info(&format!("Runout sensor enabled : {switch_enabled}"));
    }

    pub fn status_snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            unit: self.state.clone(),
            finda_triggered: self.io.sensors.finda_triggered(),
            extruder_filament_present: self.io.sensors.extruder_filament_present(),
            hotend_temperature: self.io.heater.current_temperature(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::{AxisKind, MoveKind, SensorBehavior, SimRig};

    fn make_mmu(rig: &SimRig) -> Mmu {
        Mmu::new(MmuConfig::default(), rig.io(), Reporter::new(false))
    }

    fn homed_mmu(rig: &SimRig) -> Mmu {
        let mut mmu = make_mmu(rig);
        mmu.home().unwrap();
        rig.clear_moves();
        mmu
    }

    #[test]
    fn select_rejects_out_of_range_tool_without_mutation() {
        let rig = SimRig::new();
        let mut mmu = homed_mmu(&rig);

        let err = mmu.select_tool(5).unwrap_err();
        assert_eq!(err, MultifeedError::InvalidTool(5));
        assert_eq!(mmu.state.current_tool, None);
        assert!(rig.moves().is_empty());

        mmu.select_tool(2).unwrap();
        assert_eq!(mmu.state.current_tool, Some(2));
        let err = mmu.select_tool(17).unwrap_err();
        assert_eq!(err, MultifeedError::InvalidTool(17));
        // A rejected id leaves the previous selection in place.
        assert_eq!(mmu.state.current_tool, Some(2));
    }

    #[test]
    fn select_requires_homing() {
        let rig = SimRig::new();
        let mut mmu = make_mmu(&rig);
        assert_eq!(mmu.select_tool(0).unwrap_err(), MultifeedError::NotHomed);
        assert!(rig.moves().is_empty());
    }

    #[test]
    fn select_moves_idler_and_selector_to_table_entries() {
        let rig = SimRig::new();
        let mut mmu = homed_mmu(&rig);
        mmu.select_tool(3).unwrap();

        let idler = rig.moves_for(AxisKind::Idler);
        assert_eq!(idler.len(), 1);
        assert_eq!(idler[0].target, 50.0);

        let selector = rig.moves_for(AxisKind::Selector);
        assert_eq!(selector.len(), 1);
        assert_eq!(selector[0].target, 31.125);
    }

    #[test]
    fn no_selector_mode_never_moves_selector() {
        let rig = SimRig::new();
        let mut mmu = make_mmu(&rig);
        mmu.cfg.enable_no_selector_mode = true;
        mmu.home().unwrap();
        rig.clear_moves();

        mmu.select_tool(1).unwrap();
        assert!(rig.moves_for(AxisKind::Selector).is_empty());
        assert_eq!(rig.moves_for(AxisKind::Idler).len(), 1);
    }

    #[test]
    fn unselect_twice_is_idempotent_but_still_parks() {
        let rig = SimRig::new();
        let mut mmu = homed_mmu(&rig);
        mmu.select_tool(1).unwrap();
        rig.clear_moves();

        mmu.unselect_tool().unwrap();
        assert_eq!(mmu.state.current_tool, None);
        assert_eq!(rig.moves_for(AxisKind::Idler).len(), 1);
        assert_eq!(rig.moves_for(AxisKind::Idler)[0].target, 85.0);

        // Second call: state unchanged, parking move issued again.
        mmu.unselect_tool().unwrap();
        assert_eq!(mmu.state.current_tool, None);
        assert_eq!(rig.moves_for(AxisKind::Idler).len(), 2);
    }

    #[test]
    fn home_fresh_unit() {
        let rig = SimRig::new();
        let mut mmu = make_mmu(&rig);

        mmu.home().unwrap();
        assert!(mmu.state.is_homed);
        assert_eq!(mmu.state.current_tool, None);
        assert_eq!(mmu.state.current_filament, None);

        // Idler homed: back-off then full travel into the endstop.
        let idler = rig.moves_for(AxisKind::Idler);
        assert_eq!(idler[0].target, 7.0);
        assert_eq!(idler[1].target, -95.0);

        // Selector homed with a fast then a slow pass.
        let selector: Vec<_> = rig
            .moves_for(AxisKind::Selector)
            .into_iter()
            .filter(|m| m.kind == MoveKind::Homing)
            .collect();
        assert_eq!(selector.len(), 2);
        assert_eq!(selector[0].speed, 20.0);
        assert_eq!(selector[1].speed, 5.0);

        // Everything parked and disabled at the end.
        assert!(!rig.axis_enabled(AxisKind::Pulley));
        assert!(!rig.axis_enabled(AxisKind::Selector));
        assert!(!rig.axis_enabled(AxisKind::Idler));
    }

    #[test]
    fn home_restores_switch_sensor_state() {
        let rig = SimRig::new();
        let mut mmu = make_mmu(&rig);
        mmu.home().unwrap();
        assert!(rig.switch_sensor_enabled());
    }

    #[test]
    fn pause_gates_every_mutating_operation() {
        let rig = SimRig::new();
        let mut mmu = homed_mmu(&rig);
        mmu.state.is_paused = true;

        assert_eq!(mmu.select_tool(1).unwrap_err(), MultifeedError::Paused);
        assert_eq!(mmu.unselect_tool().unwrap_err(), MultifeedError::Paused);
        assert_eq!(mmu.load_tool(1).unwrap_err(), MultifeedError::Paused);
        assert_eq!(mmu.unload_tool().unwrap_err(), MultifeedError::Paused);
        assert_eq!(mmu.change_tool(1).unwrap_err(), MultifeedError::Paused);
        assert_eq!(mmu.home().unwrap_err(), MultifeedError::Paused);
        assert_eq!(mmu.home_only().unwrap_err(), MultifeedError::Paused);
        assert_eq!(mmu.eject_tool().unwrap_err(), MultifeedError::Paused);

        assert!(rig.moves().is_empty());
    }

    #[test]
    fn load_then_unload_round_trip_leaves_unit_homed() {
        let rig = SimRig::new();
        let mut mmu = homed_mmu(&rig);

        mmu.load_tool(3).unwrap();
        assert_eq!(mmu.state.current_filament, Some(3));
        // The load ends with the tool unselected and the filament held by
        // the extruder alone.
        assert_eq!(mmu.state.current_tool, None);

        mmu.unload_tool().unwrap();
        assert_eq!(mmu.state.current_tool, None);
        assert_eq!(mmu.state.current_filament, None);
        assert!(mmu.state.is_homed);
        assert!(!mmu.state.is_paused);
    }

    #[test]
    fn unload_adopts_selected_tool_when_finda_disagrees() {
        let rig = SimRig::new();
        let mut mmu = homed_mmu(&rig);
        mmu.select_tool(2).unwrap();
        rig.set_finda(SensorBehavior::Stuck(true));
        mmu.state.current_filament = None;

        mmu.unload_tool().unwrap();
        assert_eq!(mmu.state.current_filament, Some(2));
    }

    #[test]
    fn unload_fails_when_finda_disagrees_and_nothing_selected() {
        let rig = SimRig::new();
        let mut mmu = homed_mmu(&rig);
        rig.set_finda(SensorBehavior::Stuck(true));

        assert_eq!(
            mmu.unload_tool().unwrap_err(),
            MultifeedError::NoToolSelected
        );
    }

    #[test]
    fn unload_without_filament_is_a_no_op() {
        let rig = SimRig::new();
        let mut mmu = homed_mmu(&rig);
        mmu.unload_tool().unwrap();
        assert!(rig.moves().is_empty());
    }

    #[test]
    fn change_tool_happy_path() {
        let rig = SimRig::new();
        let mut mmu = make_mmu(&rig);
        mmu.home().unwrap();

        mmu.change_tool(2).unwrap();

        assert_eq!(mmu.state.current_filament, Some(2));
        assert!(!mmu.state.is_paused);
        assert!(!rig.axis_enabled(AxisKind::Pulley));
        assert!(!rig.axis_enabled(AxisKind::Selector));
        assert!(!rig.axis_enabled(AxisKind::Idler));
        assert_eq!(mmu.state.material_changes, 1);
        assert_eq!(mmu.state.successful_changes, 1);
        // Sensors restored after the guarded section.
        assert!(rig.switch_sensor_enabled());
        assert!(rig.motion_sensor_enabled());
    }

    #[test]
    fn change_tool_to_same_filament_is_a_no_op() {
        let rig = SimRig::new();
        let mut mmu = make_mmu(&rig);
        mmu.home().unwrap();
        mmu.change_tool(2).unwrap();
        rig.clear_moves();

        mmu.change_tool(2).unwrap();
        assert!(rig.moves().is_empty());
        assert_eq!(mmu.state.material_changes, 1);
    }

    #[test]
    fn change_tool_exhaustion_renders_recovery_prompt() {
        let rig = SimRig::new();
        let mut mmu = make_mmu(&rig);
        mmu.home().unwrap();
        rig.set_finda(SensorBehavior::Stuck(false));

        let err = mmu.change_tool(1).unwrap_err();
        assert_eq!(
            err,
            MultifeedError::ToolChangeFailed {
                tool: 1,
                attempts: 5
            }
        );

        let prompts = rig.prompts();
        assert_eq!(prompts.len(), 1);
        assert_eq!(prompts[0].headline, "MMU Error");
        assert!(prompts[0].has_button("Retry T1"));
        assert!(prompts[0].has_button("Unlock MMU"));
        assert!(prompts[0].has_button("Resume"));

        assert!(!rig.axis_enabled(AxisKind::Pulley));
        assert_eq!(mmu.state.failed_changes, 1);
        // Sensors restored even on the failure path.
        assert!(rig.switch_sensor_enabled());
        assert!(rig.motion_sensor_enabled());
    }

    #[test]
    fn eject_tool_clears_everything() {
        let rig = SimRig::new();
        let mut mmu = make_mmu(&rig);
        mmu.home().unwrap();
        mmu.change_tool(0).unwrap();

        mmu.eject_tool().unwrap();
        assert_eq!(mmu.state.current_tool, None);
        assert_eq!(mmu.state.current_filament, None);
    }

    #[test]
    fn invalid_change_tool_id_is_rejected() {
        let rig = SimRig::new();
        let mut mmu = make_mmu(&rig);
        mmu.home().unwrap();
        rig.clear_moves();

        let err = mmu.change_tool(9).unwrap_err();
        assert_eq!(err, MultifeedError::InvalidTool(9));
        assert!(rig.moves().is_empty());
        assert_eq!(mmu.state.material_changes, 0);
    }

    #[test]
    fn status_snapshot_reflects_state_and_sensors() {
        let rig = SimRig::new();
        let mut mmu = make_mmu(&rig);
        mmu.home().unwrap();
        mmu.change_tool(1).unwrap();

        let snapshot = mmu.status_snapshot();
        assert!(snapshot.unit.is_homed);
        assert_eq!(snapshot.unit.current_filament, Some(1));
        assert!(snapshot.extruder_filament_present);
        assert_eq!(snapshot.hotend_temperature, 215.0);
    }
}
