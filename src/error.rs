use thiserror::Error;

use crate::state::Checkpoint;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum MultifeedError {
    #[error("MMU is paused, unlock or resume it first")]
    Paused,

    #[error("MMU is not homed")]
    NotHomed,

    #[error("invalid tool id: {0}")]
    InvalidTool(usize),

    #[error("no tool selected")]
    NoToolSelected,

    #[error("hotend is too cold: {actual:.1}C < {min:.1}C")]
    HotendTooCold { actual: f64, min: f64 },

    #[error("filament not detected at {checkpoint} after {attempts} attempts")]
    FeedNotDetected { checkpoint: Checkpoint, attempts: u32 },

    #[error("filament still detected at {checkpoint} after {attempts} attempts")]
    FeedStillDetected { checkpoint: Checkpoint, attempts: u32 },

    #[error("filament stuck at {0}")]
    FilamentStuck(Checkpoint),

    #[error("filament missing at {0}")]
    FilamentMissing(Checkpoint),

    #[error("tool change to T{tool} failed after {attempts} attempts")]
    ToolChangeFailed { tool: usize, attempts: u32 },

    #[error("filament cut is not supported: {0}")]
    CutUnsupported(&'static str),

    #[error("unknown parameter: {0}")]
    UnknownParam(String),

    #[error("invalid value for parameter {param}: {value}")]
    InvalidParamValue { param: String, value: String },

    #[error("config error: {0}")]
    Config(String),
}
