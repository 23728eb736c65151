//! Command-line interface, one subcommand per top-level unit operation.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// multifeed — multi-material filament-feed unit control.
#[derive(Debug, Parser)]
#[command(name = "multifeed", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Path to the configuration file (defaults to multifeed.toml).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Emit per-stage debug lines and retry messages.
    #[arg(long, short, global = true, default_value_t = false)]
    pub debug: bool,

    /// Hotend temperature reported by the simulated rig.
    #[arg(long, global = true)]
    pub hotend_temp: Option<f64>,

    /// Simulate a FINDA that never triggers (exercises the failure paths).
    #[arg(long, global = true, default_value_t = false)]
    pub dead_finda: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Eject any loaded filament, then home every axis.
    Home,
    /// Home the axes without ejecting first.
    HomeOnly,
    /// Re-home only the idler.
    HomeIdler,
    /// Align the idler (and selector) with a tool's feed path.
    Select { tool: usize },
    /// Park the idler without touching the selector.
    Unselect,
    /// Load filament from the unit all the way to the nozzle.
    Load { tool: usize },
    /// Unload filament from the nozzle back into the unit.
    Unload,
    /// Full tool change: unload the current filament, load the new one.
    Change { tool: usize },
    /// Cut the filament tip at the given tool's slot.
    Cut { tool: usize },
    /// Unload and unselect everything, leaving the unit empty.
    Eject,
    /// Pulley rotation-distance calibration helper.
    Calibrate,
    /// Print the unit state as JSON.
    Status,
    /// Print the raw sensor readings.
    Sensors,
    /// Halt the unit and the surrounding print.
    Pause,
    /// Resume after an intervention, replaying the failed command once.
    Resume,
    /// Clear the pause flag and re-home only the idler.
    Unlock,
    /// Read a single configuration parameter.
    Get { param: String },
    /// Override a configuration parameter for this session.
    Set { param: String, value: String },
    /// Run a scripted tool-change session against the simulated rig.
    Demo,
}
