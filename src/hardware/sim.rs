//! Simulated feed-unit hardware.
//!
//! [`SimRig`] implements every I/O trait against one shared state cell: axis
//! positions and enable flags, scriptable sensor behavior, a virtual
//! monotonic clock, and logs of every move, script and prompt. It backs the
//! binary when no real printer is attached and every test in the crate.
//! Single-threaded by design, so a plain `Rc<RefCell<..>>` is all the
//! sharing needed.

use std::cell::RefCell;
use std::rc::Rc;

use super::io::{
    Axis, AxisKind, Extruder, FilamentSensors, Heater, MmuIo, PromptScreen, ScriptPort, Timer,
};
use crate::prompt::Prompt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveKind {
    Absolute,
    Homing,
}

#[derive(Debug, Clone, PartialEq)]
#[allow(dead_code)] // fields are inspected by the test suite
pub struct MoveRecord {
    pub axis: AxisKind,
    pub kind: MoveKind,
    pub target: f64,
    pub speed: f64,
    pub accel: f64,
}

/// How a simulated sensor reacts to commanded motion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SensorBehavior {
    /// Follows the filament: a move toward the sensor trips it, a move away
    /// clears it, after `delay` ignored transitions (0 = immediately).
    Responsive { delay: u32 },
    /// Always reads the given value regardless of motion.
    Stuck(bool),
}

#[derive(Debug)]
struct SensorSim {
    behavior: SensorBehavior,
    current: bool,
}

impl SensorSim {
    fn new() -> Self {
        Self {
            behavior: SensorBehavior::Responsive { delay: 0 },
            current: false,
        }
    }

    fn read(&self) -> bool {
        match self.behavior {
            SensorBehavior::Stuck(value) => value,
            SensorBehavior::Responsive { .. } => self.current,
        }
    }

    fn advance(&mut self, toward: bool) {
        if let SensorBehavior::Responsive { ref mut delay } = self.behavior {
            if self.current == toward {
                return;
            }
            if *delay > 0 {
                *delay -= 1;
            } else {
                self.current = toward;
            }
        }
    }
}

#[derive(Debug)]
struct AxisState {
    position: f64,
    enabled: bool,
}

struct RigState {
    axes: [AxisState; 3],
    moves: Vec<MoveRecord>,
    finda: SensorSim,
    extruder_switch: SensorSim,
    has_motion_sensor: bool,
    switch_enabled: bool,
    motion_enabled: bool,
    motion_events: Vec<f64>,
    temperature: f64,
    target_temperature: Option<f64>,
    extruder_feeds: Vec<(f64, f64)>,
    scripts: Vec<String>,
    prompts: Vec<Prompt>,
    clock: f64,
}

impl RigState {
    fn new() -> Self {
        Self {
            axes: [
                AxisState {
                    position: 0.0,
                    enabled: true,
                },
                AxisState {
                    position: 0.0,
                    enabled: true,
                },
                AxisState {
                    position: 0.0,
                    enabled: true,
                },
            ],
            moves: Vec::new(),
            finda: SensorSim::new(),
            extruder_switch: SensorSim::new(),
            has_motion_sensor: true,
            switch_enabled: true,
            motion_enabled: true,
            motion_events: Vec::new(),
            temperature: 215.0,
            target_temperature: None,
            extruder_feeds: Vec::new(),
            scripts: Vec::new(),
            prompts: Vec::new(),
            clock: 0.0,
        }
    }

    fn record_move(&mut self, axis: AxisKind, kind: MoveKind, target: f64, speed: f64, accel: f64) {
        // The FINDA sits on the pulley's feed path: homing toward it trips
        // it, pulling back clears it.
        if axis == AxisKind::Pulley {
            match kind {
                MoveKind::Homing if target > 0.0 => self.finda.advance(true),
                MoveKind::Homing => self.finda.advance(false),
                MoveKind::Absolute if target < 0.0 => self.finda.advance(false),
                MoveKind::Absolute => {}
            }
        }
        self.axes[axis_index(axis)].position = target;
        self.moves.push(MoveRecord {
            axis,
            kind,
            target,
            speed,
            accel,
        });
    }
}

fn axis_index(axis: AxisKind) -> usize {
    match axis {
        AxisKind::Selector => 0,
        AxisKind::Idler => 1,
        AxisKind::Pulley => 2,
    }
}

/// Handle to the shared simulated rig. Clones observe the same state.
#[derive(Clone)]
pub struct SimRig {
    state: Rc<RefCell<RigState>>,
}

#[allow(dead_code)] // the inspection helpers are exercised by the test suite
impl SimRig {
    pub fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(RigState::new())),
        }
    }

    /// Build the I/O bundle the engine drives. All parts share this rig.
    pub fn io(&self) -> MmuIo {
        MmuIo {
            selector: Box::new(SimAxis {
                state: self.state.clone(),
                kind: AxisKind::Selector,
            }),
            idler: Box::new(SimAxis {
                state: self.state.clone(),
                kind: AxisKind::Idler,
            }),
            pulley: Box::new(SimAxis {
                state: self.state.clone(),
                kind: AxisKind::Pulley,
            }),
            sensors: Box::new(SimSensors {
                state: self.state.clone(),
            }),
            heater: Box::new(SimHeater {
                state: self.state.clone(),
            }),
            extruder: Box::new(SimExtruder {
                state: self.state.clone(),
            }),
            scripts: Box::new(SimScripts {
                state: self.state.clone(),
            }),
            timer: Box::new(SimTimer {
                state: self.state.clone(),
            }),
            prompts: Box::new(SimPrompts {
                state: self.state.clone(),
            }),
        }
    }

    pub fn set_finda(&self, behavior: SensorBehavior) {
        self.state.borrow_mut().finda.behavior = behavior;
    }

    pub fn set_extruder_switch(&self, behavior: SensorBehavior) {
        self.state.borrow_mut().extruder_switch.behavior = behavior;
    }

    pub fn set_temperature(&self, temperature: f64) {
        self.state.borrow_mut().temperature = temperature;
    }

    pub fn set_has_motion_sensor(&self, fitted: bool) {
        self.state.borrow_mut().has_motion_sensor = fitted;
    }

    pub fn moves(&self) -> Vec<MoveRecord> {
        self.state.borrow().moves.clone()
    }

    pub fn moves_for(&self, axis: AxisKind) -> Vec<MoveRecord> {
        self.state
            .borrow()
            .moves
            .iter()
            .filter(|m| m.axis == axis)
            .cloned()
            .collect()
    }

    pub fn clear_moves(&self) {
        self.state.borrow_mut().moves.clear();
    }

    pub fn axis_enabled(&self, axis: AxisKind) -> bool {
        self.state.borrow().axes[axis_index(axis)].enabled
    }

    pub fn scripts(&self) -> Vec<String> {
        self.state.borrow().scripts.clone()
    }

    pub fn prompts(&self) -> Vec<Prompt> {
        self.state.borrow().prompts.clone()
    }

    pub fn extruder_feeds(&self) -> Vec<(f64, f64)> {
        self.state.borrow().extruder_feeds.clone()
    }

    pub fn motion_events(&self) -> Vec<f64> {
        self.state.borrow().motion_events.clone()
    }

    pub fn switch_sensor_enabled(&self) -> bool {
        self.state.borrow().switch_enabled
    }

    pub fn motion_sensor_enabled(&self) -> bool {
        self.state.borrow().motion_enabled
    }

    pub fn target_temperature(&self) -> Option<f64> {
        self.state.borrow().target_temperature
    }

    pub fn clock(&self) -> f64 {
        self.state.borrow().clock
    }
}

impl Default for SimRig {
    fn default() -> Self {
        Self::new()
    }
}

struct SimAxis {
    state: Rc<RefCell<RigState>>,
    kind: AxisKind,
}

impl Axis for SimAxis {
    fn zero_position(&mut self) {
        self.state.borrow_mut().axes[axis_index(self.kind)].position = 0.0;
    }

    fn move_to(&mut self, offset: f64, speed: f64, accel: f64, _wait: bool) {
        self.state
            .borrow_mut()
            .record_move(self.kind, MoveKind::Absolute, offset, speed, accel);
    }

    fn homing_move(
        &mut self,
        offset: f64,
        speed: f64,
        accel: f64,
        _trigger_on_endstop: bool,
        _direction_positive: bool,
    ) {
        self.state
            .borrow_mut()
            .record_move(self.kind, MoveKind::Homing, offset, speed, accel);
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.state.borrow_mut().axes[axis_index(self.kind)].enabled = enabled;
    }

    fn wait_for_completion(&mut self) {}
}

struct SimSensors {
    state: Rc<RefCell<RigState>>,
}

impl FilamentSensors for SimSensors {
    fn extruder_filament_present(&self) -> bool {
        self.state.borrow().extruder_switch.read()
    }

    fn finda_triggered(&self) -> bool {
        self.state.borrow().finda.read()
    }

    fn has_motion_sensor(&self) -> bool {
        self.state.borrow().has_motion_sensor
    }

    fn switch_sensor_enabled(&self) -> bool {
        self.state.borrow().switch_enabled
    }

    fn set_switch_sensor_enabled(&mut self, enabled: bool) {
        self.state.borrow_mut().switch_enabled = enabled;
    }

    fn motion_sensor_enabled(&self) -> bool {
        self.state.borrow().motion_enabled
    }

    fn set_motion_sensor_enabled(&mut self, enabled: bool) {
        self.state.borrow_mut().motion_enabled = enabled;
    }

    fn notify_motion_event(&mut self, timestamp: f64) {
        let mut state = self.state.borrow_mut();
        if state.has_motion_sensor {
            state.motion_events.push(timestamp);
        }
    }
}

struct SimHeater {
    state: Rc<RefCell<RigState>>,
}

impl Heater for SimHeater {
    fn current_temperature(&self) -> f64 {
        self.state.borrow().temperature
    }

    fn set_target_temperature(&mut self, target: f64) {
        let mut state = self.state.borrow_mut();
        state.target_temperature = Some(target);
        // The sim heats instantly.
        state.temperature = target;
    }
}

struct SimExtruder {
    state: Rc<RefCell<RigState>>,
}

impl Extruder for SimExtruder {
    fn feed(&mut self, length: f64, speed: f64) {
        let mut state = self.state.borrow_mut();
        state.extruder_switch.advance(length > 0.0);
        state.extruder_feeds.push((length, speed));
    }
}

struct SimScripts {
    state: Rc<RefCell<RigState>>,
}

impl ScriptPort for SimScripts {
    fn run(&mut self, script: &str) {
        self.state.borrow_mut().scripts.push(script.to_string());
    }
}

struct SimTimer {
    state: Rc<RefCell<RigState>>,
}

impl Timer for SimTimer {
    fn monotonic(&self) -> f64 {
        self.state.borrow().clock
    }

    fn sleep_until(&mut self, deadline: f64) {
        let mut state = self.state.borrow_mut();
        if deadline > state.clock {
            state.clock = deadline;
        }
    }
}

struct SimPrompts {
    state: Rc<RefCell<RigState>>,
}

impl PromptScreen for SimPrompts {
    fn show(&mut self, prompt: &Prompt) {
        self.state.borrow_mut().prompts.push(prompt.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn responsive_finda_follows_pulley_homing_moves() {
        let rig = SimRig::new();
        let mut io = rig.io();
        assert!(!io.sensors.finda_triggered());

        io.pulley.homing_move(120.0, 20.0, 50.0, true, true);
        assert!(io.sensors.finda_triggered());

        io.pulley.homing_move(-30.0, 20.0, 50.0, false, false);
        assert!(!io.sensors.finda_triggered());
    }

    #[test]
    fn responsive_delay_counts_transitions() {
        let rig = SimRig::new();
        rig.set_finda(SensorBehavior::Responsive { delay: 2 });
        let mut io = rig.io();

        io.pulley.homing_move(120.0, 20.0, 50.0, true, true);
        assert!(!io.sensors.finda_triggered());
        io.pulley.homing_move(120.0, 20.0, 50.0, true, true);
        assert!(!io.sensors.finda_triggered());
        io.pulley.homing_move(120.0, 20.0, 50.0, true, true);
        assert!(io.sensors.finda_triggered());
    }

    #[test]
    fn stuck_sensor_ignores_motion() {
        let rig = SimRig::new();
        rig.set_finda(SensorBehavior::Stuck(false));
        let mut io = rig.io();
        io.pulley.homing_move(120.0, 20.0, 50.0, true, true);
        assert!(!io.sensors.finda_triggered());
    }

    #[test]
    fn extruder_feed_drives_switch_sensor() {
        let rig = SimRig::new();
        let mut io = rig.io();
        assert!(!io.sensors.extruder_filament_present());

        io.extruder.feed(20.0, 10.0);
        assert!(io.sensors.extruder_filament_present());

        io.extruder.feed(-50.0, 100.0);
        assert!(!io.sensors.extruder_filament_present());
        assert_eq!(rig.extruder_feeds().len(), 2);
    }

    #[test]
    fn selector_moves_do_not_touch_finda() {
        let rig = SimRig::new();
        let mut io = rig.io();
        io.selector.homing_move(76.0, 20.0, 200.0, true, true);
        assert!(!io.sensors.finda_triggered());
    }

    #[test]
    fn clock_only_moves_forward() {
        let rig = SimRig::new();
        let mut io = rig.io();
        io.timer.sleep_until(10.0);
        assert_eq!(io.timer.monotonic(), 10.0);
        io.timer.sleep_until(5.0);
        assert_eq!(io.timer.monotonic(), 10.0);
    }

    #[test]
    fn motion_events_only_logged_when_fitted() {
        let rig = SimRig::new();
        rig.set_has_motion_sensor(false);
        let mut io = rig.io();
        io.sensors.notify_motion_event(1.0);
        assert!(rig.motion_events().is_empty());
    }
}
