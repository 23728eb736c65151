//! Transport engine: moves filament between the path checkpoints with
//! bounded retries and sensor verification.
//!
//! Every stage re-zeroes the pulley's logical position before (and usually
//! after) its moves, since physical position is only meaningful relative to
//! the immediately preceding homing reference. Failures are ordinary
//! [`MultifeedError`] values; callers decide whether to retry, escalate or
//! propagate.

use crate::error::MultifeedError;
use crate::scripts;
use crate::state::Checkpoint;
use crate::unit::Mmu;

/// Goal state of the FINDA for a bounded feed loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedGoal {
    /// Feed forward until the sensor detects filament.
    Detect,
    /// Pull back until the sensor reports clear.
    Clear,
}

/// Retract increment and feed rate used at the extruder side. The host runs
/// the extruder at 6000 mm/min for these moves.
const EXTRUDER_RETRACT_LENGTH: f64 = 50.0;
const EXTRUDER_FAST_FEED_SPEED: f64 = 100.0;

/// Settling time after the first hotend retract before re-reading the
/// presence switch.
const RETRACT_SETTLE_SECONDS: f64 = 1.0;

/// How long the calibration pause gives the operator to mark the filament.
const CALIBRATION_MARK_SECONDS: f64 = 10.0;

const SELECTOR_STEPPER: &str = "selector_stepper";
const NOMINAL_STALL_THRESHOLD: u32 = 96;
const NOMINAL_RUN_CURRENT: f64 = 0.580;

impl Mmu {
    /// Shared bounded feed loop: re-zero, issue a homing-style move, wait,
    /// check the FINDA against the goal. Exits on the first match; returns
    /// the sensor-mismatch error after `retries` attempts.
    pub fn feed_until_sensor(
        &mut self,
        goal: FeedGoal,
        length: f64,
        speed: f64,
        accel: f64,
        retries: u32,
    ) -> Result<(), MultifeedError> {
        for attempt in 1..=retries {
            self.io.pulley.zero_position();
            match goal {
                FeedGoal::Detect => self.io.pulley.homing_move(length, speed, accel, true, true),
                FeedGoal::Clear => self.io.pulley.homing_move(-length, speed, accel, false, false),
            }
            self.io.pulley.wait_for_completion();

            let triggered = self.io.sensors.finda_triggered();
            let satisfied = match goal {
                FeedGoal::Detect => triggered,
                FeedGoal::Clear => !triggered,
            };
            if satisfied {
                self.reporter
                    .debug("FINDA endstop reached the goal state, exiting feed loop");
                return Ok(());
            }
            self.reporter
                .retry(attempt, retries, "FINDA endstop not in goal state");
        }

        match goal {
            FeedGoal::Detect => {
                self.status_msg(&format!(
                    "Couldn't load filament to FINDA after {retries} tries!"
                ));
                Err(MultifeedError::FeedNotDetected {
                    checkpoint: Checkpoint::Finda,
                    attempts: retries,
                })
            }
            FeedGoal::Clear => {
                self.status_msg(&format!(
                    "Couldn't unload filament from FINDA after {retries} tries!"
                ));
                Err(MultifeedError::FeedStillDetected {
                    checkpoint: Checkpoint::Finda,
                    attempts: retries,
                })
            }
        }
    }

    /// Feed from the selected slot until the FINDA detects filament, then
    /// record that slot as the loaded filament.
    pub fn load_to_finda(&mut self) -> Result<(), MultifeedError> {
        self.ensure_not_paused()?;
        if self.state.current_tool.is_none() {
            self.status_msg("Cannot load to FINDA, tool not selected !!");
            return Err(MultifeedError::NoToolSelected);
        }

        self.reporter.debug("Loading filament to FINDA ...");
        let result = self.feed_until_sensor(
            FeedGoal::Detect,
            self.cfg.finda_load_length,
            self.cfg.finda_load_speed,
            self.cfg.finda_load_accel,
            self.cfg.finda_load_retry,
        );
        self.io.pulley.zero_position();
        result?;

        self.state.current_filament = self.state.current_tool;
        self.reporter.debug("Loading done to FINDA");
        Ok(())
    }

    /// Bowden transfer from the FINDA to the extruder gear: a fast bulk move
    /// then a slow creep move.
    pub fn load_finda_to_extruder(&mut self) -> Result<(), MultifeedError> {
        self.ensure_not_paused()?;
        if self.state.current_tool.is_none() {
            self.status_msg("Cannot load to extruder, tool not selected !!");
            return Err(MultifeedError::NoToolSelected);
        }

        self.reporter
            .debug("Loading filament from FINDA to extruder ...");
        self.io.pulley.zero_position();
        self.io.pulley.move_to(
            self.cfg.bowden_load_length1,
            self.cfg.bowden_load_speed1,
            self.cfg.bowden_load_accel1,
            true,
        );
        self.io.pulley.zero_position();
        self.io.pulley.move_to(
            self.cfg.bowden_load_length2,
            self.cfg.bowden_load_speed2,
            self.cfg.bowden_load_accel2,
            false,
        );
        self.reporter.debug("Loading done from FINDA to extruder");
        Ok(())
    }

    /// Unit-to-extruder-gear transfer: FINDA stage (skipped on a single
    /// shared feed path) then the bowden transfer.
    pub fn load_to_extruder(&mut self) -> Result<(), MultifeedError> {
        self.ensure_not_paused()?;
        if self.state.current_tool.is_none() {
            self.status_msg("Cannot load to extruder, tool not selected !!");
            return Err(MultifeedError::NoToolSelected);
        }

        self.reporter.debug("Loading filament from MMU to extruder ...");
        if self.cfg.enable_no_selector_mode {
            // No FINDA gate on a shared path, but the bookkeeping still
            // tracks which filament went in.
            self.state.current_filament = self.state.current_tool;
        } else {
            self.load_to_finda()?;
        }
        self.load_finda_to_extruder()?;
        self.reporter.debug("Loading done from MMU to extruder");
        Ok(())
    }

    /// Push a small increment with a synchronized extruder feed, then verify
    /// the presence switch, retrying up to the configured ceiling.
    pub fn load_to_hotend(&mut self) -> Result<(), MultifeedError> {
        self.ensure_not_paused()?;
        self.validate_hotend_hot()?;

        self.reporter.debug("Loading Filament To Hotend...");
        self.io.pulley.zero_position();
        self.io.pulley.move_to(
            self.cfg.bowden_load_length3,
            self.cfg.pulley_load_to_extruder_speed,
            self.cfg.pulley_accel,
            false,
        );
        self.io.extruder.feed(
            self.cfg.bowden_load_length3,
            self.cfg.pulley_load_to_extruder_speed,
        );
        self.io.pulley.zero_position();

        if !self.io.sensors.extruder_filament_present() {
            for _ in 0..self.cfg.load_retry {
                let _ = self.retry_load_to_hotend();
            }
        }

        self.unselect_tool()?;
        self.validate_filament_in_extruder()?;

        if self.cfg.enable_filament_cutter && self.cfg.extra_load_length > 0.0 {
            self.io
                .extruder
                .feed(self.cfg.extra_load_length, EXTRUDER_FAST_FEED_SPEED);
        }

        if self.io.sensors.has_motion_sensor() {
            self.io.sensors.set_switch_sensor_enabled(true);
        }
        self.reporter.debug("Load Complete");
        Ok(())
    }

    /// One hotend insertion attempt. No re-homing between attempts: the
    /// cumulative creep toward the gear is what overcomes misalignment.
    pub fn retry_load_to_hotend(&mut self) -> Result<(), MultifeedError> {
        if self.io.sensors.extruder_filament_present() {
            return Ok(());
        }

        self.reporter.debug("Retry loading ...");
        if self.state.is_paused {
            self.status_msg("Printer is paused ...");
            return Err(MultifeedError::Paused);
        }
        self.validate_hotend_hot()?;

        self.reporter.debug("Loading Filament...");
        self.io.pulley.zero_position();
        self.io.pulley.move_to(
            self.cfg.bowden_load_length3,
            self.cfg.pulley_load_to_extruder_speed,
            0.0,
            false,
        );
        self.io.extruder.feed(
            self.cfg.bowden_load_length3,
            self.cfg.pulley_load_to_extruder_speed,
        );
        self.io.pulley.zero_position();
        Ok(())
    }

    /// Retract from the nozzle to outside the extruder gear, with a settling
    /// delay and bounded retries while the presence switch still triggers.
    pub fn unload_from_hotend(&mut self) -> Result<(), MultifeedError> {
        self.ensure_not_paused()?;

        if !self.io.sensors.extruder_filament_present() {
            self.reporter.debug("No filament in extruder");
            return Ok(());
        }

        if let Some(tool) = self.state.current_tool {
            self.reporter
                .debug(&format!("Tool T{tool} selected, auto unselecting it"));
            self.unselect_tool()?;
        }

        self.validate_hotend_hot()?;

        // The runout logic would misfire on an intentional retraction; the
        // next successful load re-enables the switch.
        self.io.sensors.set_switch_sensor_enabled(false);

        self.reporter.debug("Unloading Filament...");
        self.io
            .extruder
            .feed(-EXTRUDER_RETRACT_LENGTH, EXTRUDER_FAST_FEED_SPEED);
        self.dwell(RETRACT_SETTLE_SECONDS);

        if self.io.sensors.extruder_filament_present() {
            for _ in 0..self.cfg.unload_retry {
                let _ = self.retry_unload_from_hotend();
            }
        }

        self.validate_filament_not_stuck_in_extruder()?;
        self.reporter.debug("Filament removed");
        Ok(())
    }

    /// One extra retract attempt, to correct drive-gear misalignment.
    pub fn retry_unload_from_hotend(&mut self) -> Result<(), MultifeedError> {
        if !self.io.sensors.extruder_filament_present() {
            return Ok(());
        }

        self.reporter.debug("Retry unloading ....");
        if self.state.is_paused {
            self.status_msg("MMU is paused");
            return Err(MultifeedError::Paused);
        }
        self.validate_hotend_hot()?;

        self.reporter.debug("Unloading Filament...");
        self.io
            .extruder
            .feed(-EXTRUDER_RETRACT_LENGTH, EXTRUDER_FAST_FEED_SPEED);
        Ok(())
    }

    /// Fire the slicer's ramming pattern.
    pub fn ramming(&mut self) {
        let script = scripts::ramming();
        self.io.scripts.run(&script);
    }

    /// Clear the nozzle (ramming, or the extruder cutter when fitted), then
    /// retract out of the hotend.
    pub fn unload_with_ramming(&mut self) -> Result<(), MultifeedError> {
        self.ensure_not_paused()?;
        self.validate_hotend_hot()?;

        if let Some(tool) = self.state.current_tool {
            self.reporter
                .debug(&format!("Tool T{tool} selected, auto unselecting it"));
            self.unselect_tool()?;
        }

        self.reporter.debug("Ramming and Unloading Filament...");
        if self.cfg.enable_filament_cutter {
            let script = scripts::cut_in_extruder();
            self.io.scripts.run(&script);
        } else {
            self.ramming();
        }

        self.unload_from_hotend()?;
        self.reporter.debug("Filament rammed and removed");
        Ok(())
    }

    /// Preheat to the eject temperature if needed, then unload with ramming.
    pub fn eject_from_extruder(&mut self) -> Result<(), MultifeedError> {
        self.ensure_not_paused()?;

        if !self.io.sensors.extruder_filament_present() {
            self.reporter.debug("Filament not in extruder");
            return Ok(());
        }

        self.reporter
            .debug("Filament in hotend, trying to eject it ...");
        self.reporter.debug("Preheat Nozzle");
        let target = self
            .io
            .heater
            .current_temperature()
            .max(self.cfg.extruder_eject_temp);
        self.io.heater.set_target_temperature(target);

        self.unload_with_ramming()
    }

    /// Clear the whole path before homing: hotend first, then the feed tube.
    pub fn eject_before_home(&mut self) -> Result<(), MultifeedError> {
        self.reporter.debug("Eject Filament if loaded ...");
        if self.io.sensors.extruder_filament_present() {
            self.eject_from_extruder()?;
            self.validate_filament_not_stuck_in_extruder()?;
        }

        if self.cfg.enable_no_selector_mode {
            self.reporter.debug("Filament already ejected !");
            return Ok(());
        }

        if self.io.sensors.finda_triggered() {
            self.unload_from_extruder()?;
            self.validate_filament_not_stuck_in_finda()?;
            self.reporter.debug("Filament ejected !");
        } else {
            self.reporter.debug("Filament already ejected !");
        }
        Ok(())
    }

    /// Pull the filament back through the bowden to the FINDA, entering the
    /// bounded unload loop if the sensor still triggers afterwards.
    pub fn unload_extruder_to_finda(&mut self) -> Result<(), MultifeedError> {
        self.ensure_not_paused()?;
        self.ensure_unload_tool_selected("extruder to FINDA")?;

        self.reporter
            .debug("Unloading filament from extruder to FINDA ...");
        self.io.pulley.zero_position();
        if self.cfg.enable_no_selector_mode {
            self.io.pulley.move_to(
                -self.cfg.bowden_unload_length,
                self.cfg.bowden_unload_speed,
                self.cfg.bowden_unload_accel,
                true,
            );
        } else {
            self.io.pulley.homing_move(
                -self.cfg.bowden_unload_length,
                self.cfg.bowden_unload_speed,
                self.cfg.bowden_unload_accel,
                false,
                false,
            );

            if self.io.sensors.finda_triggered() {
                self.feed_until_sensor(
                    FeedGoal::Clear,
                    self.cfg.finda_unload_length,
                    self.cfg.finda_unload_speed,
                    self.cfg.finda_unload_accel,
                    self.cfg.finda_unload_retry,
                )?;
            }
            self.validate_filament_not_stuck_in_finda()?;
        }
        self.reporter.debug("Done unloading from FINDA!");
        Ok(())
    }

    /// Retract past the FINDA into the unit-internal park and clear the
    /// loaded-filament bookkeeping.
    pub fn unload_from_finda(&mut self) -> Result<(), MultifeedError> {
        self.ensure_not_paused()?;
        self.ensure_unload_tool_selected("FINDA")?;

        self.reporter.debug("Unloading filament from FINDA ...");
        self.io.pulley.zero_position();
        self.io.pulley.move_to(
            -self.cfg.finda_unload_length,
            self.cfg.finda_unload_speed,
            self.cfg.finda_unload_accel,
            true,
        );
        self.io.pulley.zero_position();
        self.validate_filament_not_stuck_in_finda()?;

        self.state.current_filament = None;
        self.reporter.debug("Unloading done from FINDA");
        Ok(())
    }

    /// Extruder-gear-out back into the unit. On a single shared feed path
    /// the transfer stops at extruder-gear-out.
    pub fn unload_from_extruder(&mut self) -> Result<(), MultifeedError> {
        self.ensure_not_paused()?;
        self.ensure_unload_tool_selected("extruder to MMU")?;

        self.reporter
            .debug("Unloading filament from extruder to MMU ...");
        self.unload_extruder_to_finda()?;
        if !self.cfg.enable_no_selector_mode {
            self.unload_from_finda()?;
        }
        self.reporter.debug("Unloading done from extruder to MMU");
        Ok(())
    }

    /// Cut the filament tip at the given tool's slot.
    ///
    /// The stall-threshold/current override and its restore are a paired
    /// scope: once the override is issued, the restore runs no matter how
    /// the forced traversal goes.
    pub fn cut_at_tool(&mut self, tool: usize) -> Result<(), MultifeedError> {
        if self.cfg.number_of_tools > 5 {
            self.status_msg("Filament cut not supported with more than five tools!");
            return Err(MultifeedError::CutUnsupported("more than five tools"));
        }
        self.ensure_not_paused()?;
        if self.cfg.enable_no_selector_mode {
            self.status_msg("Filament cut not supported in no-selector mode!");
            return Err(MultifeedError::CutUnsupported("no-selector mode"));
        }

        self.reporter.debug(&format!("Cutting filament T{tool} ..."));

        if let Err(err) = self.unload_tool() {
            self.status_msg("Unload before cut failed!");
            return Err(err);
        }
        self.select_tool(tool)?;
        self.load_to_finda()?;
        self.unload_from_finda()?;

        // Pin the filament with the idler and bring the blade carrier close
        // to its start position.
        self.io.idler.move_to(
            self.cfg.idler_positions[tool],
            self.cfg.idler_homing_speed,
            self.cfg.idler_homing_accel,
            true,
        );
        self.io.selector.move_to(
            5.0,
            self.cfg.selector_speed,
            self.cfg.selector_accel,
            true,
        );

        // Push the filament across the blade path.
        self.io.pulley.zero_position();
        self.io.pulley.move_to(
            self.cfg.cut_filament_length + self.cfg.cutting_edge_retract,
            self.cfg.pulley_speed,
            self.cfg.pulley_accel,
            true,
        );

        // Forced traversal through the filament.
        let cut_target = self.cfg.selector_positions[tool];
        let cut_speed = self.cfg.selector_homing_speed;
        self.with_cut_current(|mmu| {
            mmu.io.selector.move_to(cut_target, cut_speed, 0.0, true);
        });

        // Pull the stub back from the cutting edge.
        self.io.pulley.zero_position();
        self.io.pulley.move_to(
            -self.cfg.cutting_edge_retract,
            self.cfg.pulley_speed,
            self.cfg.pulley_accel,
            true,
        );

        self.home()?;
        self.reporter.debug(&format!("Done cutting T{tool}!"));
        Ok(())
    }

    /// Scoped stall-threshold/current override around the forced cut move.
    pub(crate) fn with_cut_current<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        let override_script =
            scripts::stepper_current_override(SELECTOR_STEPPER, 0, self.cfg.cut_stepper_current);
        self.io.scripts.run(&override_script);

        let out = f(self);

        // TODO: read the nominal driver values back from the host instead
        // of assuming the factory defaults here.
        let restore_script = scripts::stepper_current_override(
            SELECTOR_STEPPER,
            NOMINAL_STALL_THRESHOLD,
            NOMINAL_RUN_CURRENT,
        );
        self.io.scripts.run(&restore_script);
        out
    }

    /// Rotation-distance calibration: load to the FINDA, give the operator
    /// time to mark the filament, then pull exactly 100 mm.
    pub fn calibrate_pulley(&mut self) -> Result<(), MultifeedError> {
        self.reporter.debug("Load to FINDA");
        self.load_to_finda()?;

        self.reporter.debug("Mark the filament");
        self.dwell(CALIBRATION_MARK_SECONDS);

        self.reporter.debug("Loading 100 mm");
        self.io.pulley.zero_position();
        self.io.pulley.move_to(
            100.0,
            self.cfg.bowden_load_speed1,
            self.cfg.bowden_load_accel1,
            true,
        );
        Ok(())
    }

    /// Unload stages accept a cleared selection as long as a filament is
    /// tracked: the tracked tool is re-selected automatically.
    fn ensure_unload_tool_selected(&mut self, context: &str) -> Result<(), MultifeedError> {
        if self.state.current_tool.is_some() {
            return Ok(());
        }
        match self.state.current_filament {
            Some(filament) => self.select_tool(filament),
            None => {
                self.status_msg(&format!("Cannot unload from {context}, tool not selected !!"));
                Err(MultifeedError::NoToolSelected)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MmuConfig;
    use crate::hardware::{AxisKind, MoveKind, SensorBehavior, SimRig};
    use crate::ui::Reporter;

    fn homed_mmu(rig: &SimRig) -> Mmu {
        let mut mmu = Mmu::new(MmuConfig::default(), rig.io(), Reporter::new(false));
        mmu.home().unwrap();
        rig.clear_moves();
        mmu
    }

    fn pulley_homing_moves(rig: &SimRig) -> usize {
        rig.moves_for(AxisKind::Pulley)
            .iter()
            .filter(|m| m.kind == MoveKind::Homing)
            .count()
    }

    #[test]
    fn feed_loop_succeeds_after_exactly_k_attempts() {
        let rig = SimRig::new();
        let mut mmu = homed_mmu(&rig);
        // Two ignored transitions, then the trigger: success on attempt 3.
        rig.set_finda(SensorBehavior::Responsive { delay: 2 });

        mmu.feed_until_sensor(FeedGoal::Detect, 120.0, 20.0, 50.0, 20)
            .unwrap();
        assert_eq!(pulley_homing_moves(&rig), 3);
    }

    #[test]
    fn feed_loop_fails_after_exhausting_retries() {
        let rig = SimRig::new();
        let mut mmu = homed_mmu(&rig);
        rig.set_finda(SensorBehavior::Stuck(false));

        let err = mmu
            .feed_until_sensor(FeedGoal::Detect, 120.0, 20.0, 50.0, 4)
            .unwrap_err();
        assert_eq!(
            err,
            MultifeedError::FeedNotDetected {
                checkpoint: crate::state::Checkpoint::Finda,
                attempts: 4
            }
        );
        // Exactly the budgeted number of moves, no extras.
        assert_eq!(pulley_homing_moves(&rig), 4);
    }

    #[test]
    fn load_to_finda_requires_selected_tool() {
        let rig = SimRig::new();
        let mut mmu = homed_mmu(&rig);
        assert_eq!(
            mmu.load_to_finda().unwrap_err(),
            MultifeedError::NoToolSelected
        );
        assert!(rig.moves().is_empty());
    }

    #[test]
    fn load_to_finda_records_loaded_filament() {
        let rig = SimRig::new();
        let mut mmu = homed_mmu(&rig);
        mmu.select_tool(4).unwrap();

        mmu.load_to_finda().unwrap();
        assert_eq!(mmu.state.current_filament, Some(4));
    }

    #[test]
    fn bowden_transfer_is_fast_then_creep() {
        let rig = SimRig::new();
        let mut mmu = homed_mmu(&rig);
        mmu.select_tool(0).unwrap();
        rig.clear_moves();

        mmu.load_finda_to_extruder().unwrap();
        let moves = rig.moves_for(AxisKind::Pulley);
        assert_eq!(moves.len(), 2);
        assert_eq!(moves[0].target, 450.0);
        assert_eq!(moves[0].speed, 120.0);
        assert_eq!(moves[0].accel, 80.0);
        assert_eq!(moves[1].target, 20.0);
        assert_eq!(moves[1].speed, 60.0);
    }

    #[test]
    fn hotend_load_retries_until_switch_confirms() {
        let rig = SimRig::new();
        let mut mmu = homed_mmu(&rig);
        mmu.select_tool(1).unwrap();
        mmu.load_to_extruder().unwrap();
        // First feed ignored twice, confirmed on the third.
        rig.set_extruder_switch(SensorBehavior::Responsive { delay: 2 });

        mmu.load_to_hotend().unwrap();
        assert_eq!(rig.extruder_feeds().len(), 3);
        // Every insertion attempt feeds the same increment.
        assert!(rig.extruder_feeds().iter().all(|&(len, _)| len == 20.0));
    }

    #[test]
    fn hotend_load_gives_up_when_switch_never_confirms() {
        let rig = SimRig::new();
        let mut mmu = homed_mmu(&rig);
        mmu.select_tool(1).unwrap();
        mmu.load_to_extruder().unwrap();
        rig.set_extruder_switch(SensorBehavior::Stuck(false));

        let err = mmu.load_to_hotend().unwrap_err();
        assert_eq!(
            err,
            MultifeedError::FilamentMissing(crate::state::Checkpoint::Extruder)
        );
        // The initial feed plus the full retry budget.
        assert_eq!(rig.extruder_feeds().len(), 1 + 5);
    }

    #[test]
    fn hotend_load_requires_hot_hotend() {
        let rig = SimRig::new();
        let mut mmu = homed_mmu(&rig);
        mmu.select_tool(1).unwrap();
        rig.set_temperature(150.0);

        let err = mmu.load_to_hotend().unwrap_err();
        assert_eq!(
            err,
            MultifeedError::HotendTooCold {
                actual: 150.0,
                min: 180.0
            }
        );
    }

    #[test]
    fn hotend_unload_retracts_and_settles() {
        let rig = SimRig::new();
        let mut mmu = homed_mmu(&rig);
        rig.set_extruder_switch(SensorBehavior::Responsive { delay: 0 });
        let mut io = rig.io();
        io.extruder.feed(20.0, 10.0);
        let clock_before = rig.clock();

        mmu.unload_from_hotend().unwrap();
        // Settling delay observed on the host timer.
        assert!(rig.clock() >= clock_before + 1.0);
        // The retraction disabled the runout switch for the duration.
        assert!(!rig.switch_sensor_enabled());
    }

    #[test]
    fn hotend_unload_fails_when_filament_stuck() {
        let rig = SimRig::new();
        let mut mmu = homed_mmu(&rig);
        rig.set_extruder_switch(SensorBehavior::Stuck(true));

        let err = mmu.unload_from_hotend().unwrap_err();
        assert_eq!(
            err,
            MultifeedError::FilamentStuck(crate::state::Checkpoint::Extruder)
        );
        // Initial retract plus the retry budget, all at the fixed increment.
        let feeds = rig.extruder_feeds();
        assert_eq!(feeds.len(), 1 + 5);
        assert!(feeds.iter().all(|&(len, _)| len == -50.0));
    }

    #[test]
    fn unload_auto_selects_tracked_filament() {
        let rig = SimRig::new();
        let mut mmu = homed_mmu(&rig);
        mmu.select_tool(3).unwrap();
        mmu.load_to_finda().unwrap();
        mmu.unselect_tool().unwrap();
        rig.clear_moves();

        mmu.unload_from_finda().unwrap();
        // The tracked tool was re-selected before the retract.
        let idler = rig.moves_for(AxisKind::Idler);
        assert_eq!(idler[0].target, 50.0);
        assert_eq!(mmu.state.current_filament, None);
    }

    #[test]
    fn unload_without_tool_or_filament_fails() {
        let rig = SimRig::new();
        let mut mmu = homed_mmu(&rig);
        assert_eq!(
            mmu.unload_from_finda().unwrap_err(),
            MultifeedError::NoToolSelected
        );
    }

    #[test]
    fn bowden_unload_enters_loop_when_finda_stays_triggered() {
        let rig = SimRig::new();
        let mut mmu = homed_mmu(&rig);
        mmu.select_tool(0).unwrap();
        mmu.load_to_finda().unwrap();
        rig.set_finda(SensorBehavior::Stuck(true));
        rig.clear_moves();

        let err = mmu.unload_extruder_to_finda().unwrap_err();
        assert_eq!(
            err,
            MultifeedError::FeedStillDetected {
                checkpoint: crate::state::Checkpoint::Finda,
                attempts: 10
            }
        );
        // The bowden pull plus the full unload loop.
        assert_eq!(pulley_homing_moves(&rig), 1 + 10);
    }

    #[test]
    fn no_selector_bowden_unload_is_a_plain_move() {
        let rig = SimRig::new();
        let mut mmu = Mmu::new(MmuConfig::default(), rig.io(), Reporter::new(false));
        mmu.cfg.enable_no_selector_mode = true;
        mmu.home().unwrap();
        mmu.select_tool(0).unwrap();
        mmu.state.current_filament = Some(0);
        rig.clear_moves();

        mmu.unload_extruder_to_finda().unwrap();
        let moves = rig.moves_for(AxisKind::Pulley);
        assert_eq!(moves.len(), 1);
        assert_eq!(moves[0].kind, MoveKind::Absolute);
        assert_eq!(moves[0].target, -830.0);
    }

    #[test]
    fn cut_pairs_current_override_with_restore() {
        let rig = SimRig::new();
        let mut mmu = homed_mmu(&rig);

        mmu.cut_at_tool(2).unwrap();

        let scripts: Vec<String> = rig
            .scripts()
            .into_iter()
            .filter(|s| s.contains("SET_TMC_CURRENT"))
            .collect();
        assert_eq!(scripts.len(), 2);
        assert!(scripts[0].contains("FIELD=SGTHRS VALUE=0"));
        assert!(scripts[0].contains("CURRENT=1.000"));
        assert!(scripts[1].contains("FIELD=SGTHRS VALUE=96"));
        assert!(scripts[1].contains("CURRENT=0.580"));

        // The cut ends with a full re-home.
        assert!(mmu.state.is_homed);
        assert_eq!(mmu.state.current_tool, None);
    }

    #[test]
    fn cut_rejected_in_no_selector_mode() {
        let rig = SimRig::new();
        let mut mmu = Mmu::new(MmuConfig::default(), rig.io(), Reporter::new(false));
        mmu.cfg.enable_no_selector_mode = true;
        mmu.home().unwrap();

        let err = mmu.cut_at_tool(0).unwrap_err();
        assert_eq!(err, MultifeedError::CutUnsupported("no-selector mode"));
    }

    #[test]
    fn calibration_pauses_for_marking_then_pulls_100mm() {
        let rig = SimRig::new();
        let mut mmu = homed_mmu(&rig);
        mmu.select_tool(0).unwrap();
        let clock_before = rig.clock();

        mmu.calibrate_pulley().unwrap();
        assert!(rig.clock() >= clock_before + 10.0);

        let last = rig.moves_for(AxisKind::Pulley).pop().unwrap();
        assert_eq!(last.kind, MoveKind::Absolute);
        assert_eq!(last.target, 100.0);
    }

    #[test]
    fn eject_before_home_clears_hotend_and_tube() {
        let rig = SimRig::new();
        let mut mmu = homed_mmu(&rig);
        mmu.select_tool(1).unwrap();
        mmu.load_to_finda().unwrap();
        let mut io = rig.io();
        io.extruder.feed(20.0, 10.0);

        mmu.eject_before_home().unwrap();
        assert!(!io.sensors.extruder_filament_present());
        assert!(!io.sensors.finda_triggered());
        // Ramming fired before the hotend retract, at the eject temperature.
        assert!(rig.scripts().iter().any(|s| s == "RAMMING_SLICER"));
        assert_eq!(rig.target_temperature(), Some(215.0));
    }
}
