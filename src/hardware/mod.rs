mod io;
mod sim;

pub use io::{
    Axis, AxisKind, Extruder, FilamentSensors, Heater, MmuIo, PromptScreen, ScriptPort, Timer,
};
pub use sim::{MoveKind, MoveRecord, SensorBehavior, SimRig};
