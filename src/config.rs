//! Configuration loaded from `multifeed.toml`.
//!
//! [`MmuConfig`] carries every tunable of the feed unit: stage lengths,
//! speeds and accelerations, retry ceilings, position tables and mode flags.
//! Values missing from the file fall back to sensible defaults. The whole
//! set is validated once at startup; afterwards individual parameters can be
//! inspected and adjusted through the enumerated [`MmuConfig::get_param`] /
//! [`MmuConfig::set_param`] accessors, which reject unknown names at the
//! boundary.

use std::fmt;
use std::path::Path;

use anyhow::Result;
use serde::Deserialize;

use crate::error::MultifeedError;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MmuConfig {
    /// Emit per-stage debug lines and retry messages.
    pub debug: bool,
    pub number_of_tools: usize,

    /// Idle-shutdown timeout (seconds) requested from the host while paused.
    pub timeout_pause: u32,
    /// Delay (seconds) before the heater is dropped during a pause.
    pub disable_heater: u32,

    // Bowden load: fast bulk move, slow creep move, hotend increment.
    pub bowden_load_length1: f64,
    pub bowden_load_length2: f64,
    pub bowden_load_length3: f64,
    pub bowden_load_speed1: f64,
    pub bowden_load_speed2: f64,
    pub bowden_load_accel1: f64,
    pub bowden_load_accel2: f64,

    pub bowden_unload_length: f64,
    pub bowden_unload_speed: f64,
    pub bowden_unload_accel: f64,

    pub finda_load_retry: u32,
    pub finda_load_length: f64,
    pub finda_unload_retry: u32,
    pub finda_unload_length: f64,
    pub finda_load_speed: f64,
    pub finda_unload_speed: f64,
    pub finda_load_accel: f64,
    pub finda_unload_accel: f64,

    // Filament cutter (in-unit blade driven by the selector).
    pub cut_filament_length: f64,
    pub cutting_edge_retract: f64,
    pub cut_stepper_current: f64,
    /// Cutter at the extruder side; also enables the extra load push.
    pub enable_filament_cutter: bool,
    pub extra_load_length: f64,

    pub selector_speed: f64,
    pub selector_homing_speed: f64,
    pub selector_homing_speed_slow: f64,
    pub selector_homing_move_length: f64,
    pub selector_accel: f64,
    /// One entry per tool plus the parked sentinel at the end.
    pub selector_positions: Vec<f64>,

    /// One entry per tool plus the parked sentinel at the end.
    pub idler_positions: Vec<f64>,
    /// Back-off move then full-travel-into-endstop move.
    pub idler_homing_move_lengths: Vec<f64>,
    pub idler_homing_speed: f64,
    pub idler_homing_accel: f64,
    pub idler_speed: f64,
    pub idler_accel: f64,

    /// Nominal pulley motion parameters, used where no stage-specific value
    /// applies (cut push, stub retract).
    pub pulley_speed: f64,
    pub pulley_accel: f64,
    pub pulley_load_to_extruder_speed: f64,

    pub pause_before_disabling_steppers_ms: u64,
    pub pause_after_disabling_steppers_ms: u64,

    pub min_temp_extruder: f64,
    pub extruder_eject_temp: f64,

    /// Single shared feed path; the selector axis is never moved.
    pub enable_no_selector_mode: bool,

    pub load_retry: u32,
    pub unload_retry: u32,
    pub tool_change_retry: u32,
}

impl Default for MmuConfig {
    fn default() -> Self {
        Self {
            debug: false,
            number_of_tools: 5,
            timeout_pause: 36000,
            disable_heater: 600,
            bowden_load_length1: 450.0,
            bowden_load_length2: 20.0,
            bowden_load_length3: 20.0,
            bowden_load_speed1: 120.0,
            bowden_load_speed2: 60.0,
            bowden_load_accel1: 80.0,
            bowden_load_accel2: 80.0,
            bowden_unload_length: 830.0,
            bowden_unload_speed: 120.0,
            bowden_unload_accel: 120.0,
            finda_load_retry: 20,
            finda_load_length: 120.0,
            finda_unload_retry: 10,
            finda_unload_length: 30.0,
            finda_load_speed: 20.0,
            finda_unload_speed: 20.0,
            finda_load_accel: 50.0,
            finda_unload_accel: 50.0,
            cut_filament_length: 20.0,
            cutting_edge_retract: 5.0,
            cut_stepper_current: 1.0,
            enable_filament_cutter: false,
            extra_load_length: 0.0,
            selector_speed: 35.0,
            selector_homing_speed: 20.0,
            selector_homing_speed_slow: 5.0,
            selector_homing_move_length: -76.0,
            selector_accel: 200.0,
            selector_positions: vec![73.5, 59.375, 45.25, 31.125, 17.0, 0.0],
            idler_positions: vec![5.0, 20.0, 35.0, 50.0, 65.0, 85.0],
            idler_homing_move_lengths: vec![7.0, -95.0],
            idler_homing_speed: 100.0,
            idler_homing_accel: 80.0,
            idler_speed: 100.0,
            idler_accel: 80.0,
            pulley_speed: 40.0,
            pulley_accel: 80.0,
            pulley_load_to_extruder_speed: 10.0,
            pause_before_disabling_steppers_ms: 100,
            pause_after_disabling_steppers_ms: 250,
            min_temp_extruder: 180.0,
            extruder_eject_temp: 200.0,
            enable_no_selector_mode: false,
            load_retry: 5,
            unload_retry: 5,
            tool_change_retry: 5,
        }
    }
}

const CONFIG_FILE: &str = "multifeed.toml";

impl MmuConfig {
    /// Load the configuration from the given path, or from `multifeed.toml`
    /// in the current directory. A missing file means defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path.unwrap_or_else(|| Path::new(CONFIG_FILE));
        let config = if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            toml::from_str::<MmuConfig>(&contents)?
        } else {
            Self::default()
        };
        Ok(config)
    }

    /// Validate the whole parameter set once at startup.
    pub fn validate(&self) -> Result<(), MultifeedError> {
        if self.number_of_tools == 0 {
            return Err(MultifeedError::Config(
                "number_of_tools must be at least 1".to_string(),
            ));
        }
        let want = self.number_of_tools + 1;
        if self.idler_positions.len() != want {
            return Err(MultifeedError::Config(format!(
                "idler_positions must have {} entries (tools + parked), got {}",
                want,
                self.idler_positions.len()
            )));
        }
        if self.selector_positions.len() != want {
            return Err(MultifeedError::Config(format!(
                "selector_positions must have {} entries (tools + parked), got {}",
                want,
                self.selector_positions.len()
            )));
        }
        if self.idler_homing_move_lengths.len() != 2 {
            return Err(MultifeedError::Config(
                "idler_homing_move_lengths must have exactly 2 entries".to_string(),
            ));
        }
        for (name, value) in [
            ("finda_load_retry", self.finda_load_retry),
            ("finda_unload_retry", self.finda_unload_retry),
            ("load_retry", self.load_retry),
            ("unload_retry", self.unload_retry),
            ("tool_change_retry", self.tool_change_retry),
        ] {
            if value == 0 {
                return Err(MultifeedError::Config(format!("{name} must be at least 1")));
            }
        }
        for (name, value) in [
            ("bowden_load_speed1", self.bowden_load_speed1),
            ("bowden_load_speed2", self.bowden_load_speed2),
            ("bowden_unload_speed", self.bowden_unload_speed),
            ("finda_load_speed", self.finda_load_speed),
            ("finda_unload_speed", self.finda_unload_speed),
            ("selector_speed", self.selector_speed),
            ("idler_speed", self.idler_speed),
            ("pulley_speed", self.pulley_speed),
            (
                "pulley_load_to_extruder_speed",
                self.pulley_load_to_extruder_speed,
            ),
        ] {
            if value <= 0.0 {
                return Err(MultifeedError::Config(format!(
                    "{name} must be positive, got {value}"
                )));
            }
        }
        Ok(())
    }

    /// Idler parking offset (the sentinel entry of the table).
    pub fn idler_park(&self) -> f64 {
        self.idler_positions.last().copied().unwrap_or(0.0)
    }

    /// Look up a parameter by its config name.
    pub fn get_param(&self, name: &str) -> Result<ParamValue, MultifeedError> {
        use ParamValue::*;
        let value = match name {
            "debug" => Bool(self.debug),
            "number_of_tools" => Int(self.number_of_tools as u64),
            "timeout_pause" => Int(self.timeout_pause as u64),
            "disable_heater" => Int(self.disable_heater as u64),
            "bowden_load_length1" => Float(self.bowden_load_length1),
            "bowden_load_length2" => Float(self.bowden_load_length2),
            "bowden_load_length3" => Float(self.bowden_load_length3),
            "bowden_load_speed1" => Float(self.bowden_load_speed1),
            "bowden_load_speed2" => Float(self.bowden_load_speed2),
            "bowden_load_accel1" => Float(self.bowden_load_accel1),
            "bowden_load_accel2" => Float(self.bowden_load_accel2),
            "bowden_unload_length" => Float(self.bowden_unload_length),
            "bowden_unload_speed" => Float(self.bowden_unload_speed),
            "bowden_unload_accel" => Float(self.bowden_unload_accel),
            "finda_load_retry" => Int(self.finda_load_retry as u64),
            "finda_load_length" => Float(self.finda_load_length),
            "finda_unload_retry" => Int(self.finda_unload_retry as u64),
            "finda_unload_length" => Float(self.finda_unload_length),
            "finda_load_speed" => Float(self.finda_load_speed),
            "finda_unload_speed" => Float(self.finda_unload_speed),
            "finda_load_accel" => Float(self.finda_load_accel),
            "finda_unload_accel" => Float(self.finda_unload_accel),
            "cut_filament_length" => Float(self.cut_filament_length),
            "cutting_edge_retract" => Float(self.cutting_edge_retract),
            "cut_stepper_current" => Float(self.cut_stepper_current),
            "enable_filament_cutter" => Bool(self.enable_filament_cutter),
            "extra_load_length" => Float(self.extra_load_length),
            "selector_speed" => Float(self.selector_speed),
            "selector_homing_speed" => Float(self.selector_homing_speed),
            "selector_homing_speed_slow" => Float(self.selector_homing_speed_slow),
            "selector_homing_move_length" => Float(self.selector_homing_move_length),
            "selector_accel" => Float(self.selector_accel),
            "selector_positions" => FloatList(self.selector_positions.clone()),
            "idler_positions" => FloatList(self.idler_positions.clone()),
            "idler_homing_move_lengths" => FloatList(self.idler_homing_move_lengths.clone()),
            "idler_homing_speed" => Float(self.idler_homing_speed),
            "idler_homing_accel" => Float(self.idler_homing_accel),
            "idler_speed" => Float(self.idler_speed),
            "idler_accel" => Float(self.idler_accel),
            "pulley_speed" => Float(self.pulley_speed),
            "pulley_accel" => Float(self.pulley_accel),
            "pulley_load_to_extruder_speed" => Float(self.pulley_load_to_extruder_speed),
            "pause_before_disabling_steppers_ms" => Int(self.pause_before_disabling_steppers_ms),
            "pause_after_disabling_steppers_ms" => Int(self.pause_after_disabling_steppers_ms),
            "min_temp_extruder" => Float(self.min_temp_extruder),
            "extruder_eject_temp" => Float(self.extruder_eject_temp),
            "enable_no_selector_mode" => Bool(self.enable_no_selector_mode),
            "load_retry" => Int(self.load_retry as u64),
            "unload_retry" => Int(self.unload_retry as u64),
            "tool_change_retry" => Int(self.tool_change_retry as u64),
            _ => return Err(MultifeedError::UnknownParam(name.to_string())),
        };
        Ok(value)
    }

    /// Set a parameter from its textual representation. Unknown names and
    /// unparsable values are rejected; no partial update happens.
    pub fn set_param(&mut self, name: &str, raw: &str) -> Result<(), MultifeedError> {
        match name {
            "debug" => self.debug = parse_bool(name, raw)?,
            "number_of_tools" => self.number_of_tools = parse_int(name, raw)? as usize,
            "timeout_pause" => self.timeout_pause = parse_int(name, raw)? as u32,
            "disable_heater" => self.disable_heater = parse_int(name, raw)? as u32,
            "bowden_load_length1" => self.bowden_load_length1 = parse_float(name, raw)?,
            "bowden_load_length2" => self.bowden_load_length2 = parse_float(name, raw)?,
            "bowden_load_length3" => self.bowden_load_length3 = parse_float(name, raw)?,
            "bowden_load_speed1" => self.bowden_load_speed1 = parse_float(name, raw)?,
            "bowden_load_speed2" => self.bowden_load_speed2 = parse_float(name, raw)?,
            "bowden_load_accel1" => self.bowden_load_accel1 = parse_float(name, raw)?,
            "bowden_load_accel2" => self.bowden_load_accel2 = parse_float(name, raw)?,
            "bowden_unload_length" => self.bowden_unload_length = parse_float(name, raw)?,
            "bowden_unload_speed" => self.bowden_unload_speed = parse_float(name, raw)?,
            "bowden_unload_accel" => self.bowden_unload_accel = parse_float(name, raw)?,
            "finda_load_retry" => self.finda_load_retry = parse_int(name, raw)? as u32,
            "finda_load_length" => self.finda_load_length = parse_float(name, raw)?,
            "finda_unload_retry" => self.finda_unload_retry = parse_int(name, raw)? as u32,
            "finda_unload_length" => self.finda_unload_length = parse_float(name, raw)?,
            "finda_load_speed" => self.finda_load_speed = parse_float(name, raw)?,
            "finda_unload_speed" => self.finda_unload_speed = parse_float(name, raw)?,
            "finda_load_accel" => self.finda_load_accel = parse_float(name, raw)?,
            "finda_unload_accel" => self.finda_unload_accel = parse_float(name, raw)?,
            "cut_filament_length" => self.cut_filament_length = parse_float(name, raw)?,
            "cutting_edge_retract" => self.cutting_edge_retract = parse_float(name, raw)?,
            "cut_stepper_current" => self.cut_stepper_current = parse_float(name, raw)?,
            "enable_filament_cutter" => self.enable_filament_cutter = parse_bool(name, raw)?,
            "extra_load_length" => self.extra_load_length = parse_float(name, raw)?,
            "selector_speed" => self.selector_speed = parse_float(name, raw)?,
            "selector_homing_speed" => self.selector_homing_speed = parse_float(name, raw)?,
            "selector_homing_speed_slow" => {
                self.selector_homing_speed_slow = parse_float(name, raw)?
            }
            "selector_homing_move_length" => {
                self.selector_homing_move_length = parse_float(name, raw)?
            }
            "selector_accel" => self.selector_accel = parse_float(name, raw)?,
            "selector_positions" => self.selector_positions = parse_float_list(name, raw)?,
            "idler_positions" => self.idler_positions = parse_float_list(name, raw)?,
            "idler_homing_move_lengths" => {
                self.idler_homing_move_lengths = parse_float_list(name, raw)?
            }
            "idler_homing_speed" => self.idler_homing_speed = parse_float(name, raw)?,
            "idler_homing_accel" => self.idler_homing_accel = parse_float(name, raw)?,
            "idler_speed" => self.idler_speed = parse_float(name, raw)?,
            "idler_accel" => self.idler_accel = parse_float(name, raw)?,
            "pulley_speed" => self.pulley_speed = parse_float(name, raw)?,
            "pulley_accel" => self.pulley_accel = parse_float(name, raw)?,
            "pulley_load_to_extruder_speed" => {
                self.pulley_load_to_extruder_speed = parse_float(name, raw)?
            }
            "pause_before_disabling_steppers_ms" => {
                self.pause_before_disabling_steppers_ms = parse_int(name, raw)?
            }
            "pause_after_disabling_steppers_ms" => {
                self.pause_after_disabling_steppers_ms = parse_int(name, raw)?
            }
            "min_temp_extruder" => self.min_temp_extruder = parse_float(name, raw)?,
            "extruder_eject_temp" => self.extruder_eject_temp = parse_float(name, raw)?,
            "enable_no_selector_mode" => self.enable_no_selector_mode = parse_bool(name, raw)?,
            "load_retry" => self.load_retry = parse_int(name, raw)? as u32,
            "unload_retry" => self.unload_retry = parse_int(name, raw)? as u32,
            "tool_change_retry" => self.tool_change_retry = parse_int(name, raw)? as u32,
            _ => return Err(MultifeedError::UnknownParam(name.to_string())),
        }
        Ok(())
    }
}

/// A typed view of a single configuration parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Bool(bool),
    Int(u64),
    Float(f64),
    FloatList(Vec<f64>),
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Bool(v) => write!(f, "{v}"),
            ParamValue::Int(v) => write!(f, "{v}"),
            ParamValue::Float(v) => write!(f, "{v}"),
            ParamValue::FloatList(vs) => {
                let joined = vs
                    .iter()
                    .map(|v| v.to_string())
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "{joined}")
            }
        }
    }
}

fn invalid(name: &str, raw: &str) -> MultifeedError {
    MultifeedError::InvalidParamValue {
        param: name.to_string(),
        value: raw.to_string(),
    }
}

fn parse_bool(name: &str, raw: &str) -> Result<bool, MultifeedError> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        _ => Err(invalid(name, raw)),
    }
}

fn parse_int(name: &str, raw: &str) -> Result<u64, MultifeedError> {
    raw.trim().parse::<u64>().map_err(|_| invalid(name, raw))
}

fn parse_float(name: &str, raw: &str) -> Result<f64, MultifeedError> {
    raw.trim().parse::<f64>().map_err(|_| invalid(name, raw))
}

fn parse_float_list(name: &str, raw: &str) -> Result<Vec<f64>, MultifeedError> {
    raw.split(',')
        .map(|part| part.trim().parse::<f64>().map_err(|_| invalid(name, raw)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_is_valid() {
        let config = MmuConfig::default();
        assert_eq!(config.number_of_tools, 5);
        assert_eq!(config.idler_positions.len(), 6);
        assert_eq!(config.finda_load_retry, 20);
        config.validate().unwrap();
    }

    #[test]
    fn deserialize_partial_toml() {
        let toml_str = r#"
            number_of_tools = 5
            finda_load_retry = 12
            enable_no_selector_mode = true
        "#;
        let config: MmuConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.finda_load_retry, 12);
        assert!(config.enable_no_selector_mode);
        // Untouched values keep their defaults.
        assert_eq!(config.bowden_unload_length, 830.0);
        assert_eq!(config.tool_change_retry, 5);
    }

    #[test]
    fn load_from_file_and_fallback() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "bowden_load_length1 = 500.0").unwrap();
        let config = MmuConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.bowden_load_length1, 500.0);

        let config = MmuConfig::load(Some(std::path::Path::new("/nonexistent/multifeed.toml")))
            .unwrap();
        assert_eq!(config.bowden_load_length1, 450.0);
    }

    #[test]
    fn validate_rejects_short_position_table() {
        let mut config = MmuConfig::default();
        config.idler_positions = vec![5.0, 20.0, 35.0];
        let err = config.validate().unwrap_err();
        assert!(matches!(err, MultifeedError::Config(_)));
    }

    #[test]
    fn validate_rejects_zero_retry() {
        let mut config = MmuConfig::default();
        config.tool_change_retry = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_nonpositive_speed() {
        let mut config = MmuConfig::default();
        config.selector_speed = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn param_roundtrip() {
        let mut config = MmuConfig::default();
        config.set_param("finda_load_length", "150.5").unwrap();
        assert_eq!(
            config.get_param("finda_load_length").unwrap(),
            ParamValue::Float(150.5)
        );

        config.set_param("debug", "true").unwrap();
        assert_eq!(config.get_param("debug").unwrap(), ParamValue::Bool(true));

        config
            .set_param("idler_positions", "1, 2, 3, 4, 5, 6")
            .unwrap();
        assert_eq!(
            config.get_param("idler_positions").unwrap(),
            ParamValue::FloatList(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0])
        );
    }

    #[test]
    fn unknown_param_is_rejected() {
        let mut config = MmuConfig::default();
        assert_eq!(
            config.get_param("warp_speed").unwrap_err(),
            MultifeedError::UnknownParam("warp_speed".to_string())
        );
        assert!(config.set_param("warp_speed", "9").is_err());
    }

    #[test]
    fn bad_param_value_is_rejected() {
        let mut config = MmuConfig::default();
        let err = config.set_param("load_retry", "many").unwrap_err();
        assert!(matches!(err, MultifeedError::InvalidParamValue { .. }));
        // Value unchanged on rejection.
        assert_eq!(config.load_retry, 5);
    }

    #[test]
    fn param_value_display() {
        assert_eq!(ParamValue::Float(12.5).to_string(), "12.5");
        assert_eq!(ParamValue::Bool(false).to_string(), "false");
        assert_eq!(
            ParamValue::FloatList(vec![1.0, 2.5]).to_string(),
            "1, 2.5"
        );
    }
}
