// Timeouts, topics, motor configuration and arm tuning
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::arm::{ArmGeometry, DirectionTuning, JointTuning, MoveController};

// Runtime loop frequency
pub const LOOP_HZ: u64 = 50;

// Moves still in progress after this long are halted by the watchdog
pub const MOVE_TIMEOUT: Duration = Duration::from_secs(20);

// Zenoh topics
pub const TOPIC_CMD_MOVE: &str = "arm/cmd/move"; // move requests
pub const TOPIC_STATE_MOVE: &str = "arm/state/move"; // move progress
pub const TOPIC_HEALTH: &str = "arm/state/health"; // health status

// Serial port for the Feetech joint drives
pub const MOTOR_PORT: &str = "/dev/ttyUSB0";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Cannot read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cannot parse config file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Arm geometry, per-joint tuning and settle pacing, loadable from JSON.
/// Missing sections fall back to the defaults.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArmConfig {
    pub geometry: ArmGeometry,
    pub lower: JointTuning,
    pub upper: JointTuning,
    /// Wait between commanding a drive and re-reading its sensor
    pub settle_ms: u64,
}

impl Default for ArmConfig {
    fn default() -> Self {
        Self {
            geometry: ArmGeometry::default(),
            lower: JointTuning::lower_default(),
            upper: JointTuning::upper_default(),
            settle_ms: 5,
        }
    }
}

impl ArmConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let config: ArmConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let g = &self.geometry;
        let positive = [
            ("lower_length", g.lower_length),
            ("upper_length", g.upper_length),
            ("lower_gear_reduction", g.lower_gear_reduction),
            ("upper_gear_reduction", g.upper_gear_reduction),
            ("lower_chain_reduction", g.lower_chain_reduction),
            ("counts_per_rev", g.counts_per_rev),
            ("lower.deadband", self.lower.deadband),
            ("upper.deadband", self.upper.deadband),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::Invalid(format!("{} must be positive, got {}", name, value)));
            }
        }
        if !g.pivot_height.is_finite() {
            return Err(ConfigError::Invalid("pivot_height must be finite".into()));
        }

        let bands = [
            ("lower.increase", &self.lower.increase),
            ("lower.decrease", &self.lower.decrease),
            ("upper.increase", &self.upper.increase),
            ("upper.decrease", &self.upper.decrease),
        ];
        for (name, band) in bands {
            check_band(name, band)?;
        }
        Ok(())
    }

    pub fn build_controller(&self) -> MoveController {
        MoveController::new(self.geometry, self.lower, self.upper, self.settle())
    }
}

fn check_band(name: &str, band: &DirectionTuning) -> Result<(), ConfigError> {
    let in_unit = |v: f64| v.is_finite() && (0.0..=1.0).contains(&v);
    if !(in_unit(band.max_output) && in_unit(band.floor_output) && in_unit(band.floor_threshold)) {
        return Err(ConfigError::Invalid(format!("{}: output band must lie in [0, 1]", name)));
    }
    if band.floor_output <= 0.0 {
        return Err(ConfigError::Invalid(format!("{}: floor_output must be non-zero", name)));
    }
    if band.floor_threshold > band.max_output || band.floor_output > band.max_output {
        return Err(ConfigError::Invalid(format!("{}: floor above max_output", name)));
    }
    let g = band.gains;
    if !(g.kp.is_finite() && g.ki.is_finite() && g.kd.is_finite()) {
        return Err(ConfigError::Invalid(format!("{}: gains must be finite", name)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        ArmConfig::default().validate().unwrap();
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let json = r#"{ "settle_ms": 0, "geometry": { "counts_per_rev": 4096.0 } }"#;
        let config: ArmConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.settle(), Duration::ZERO);
        assert_eq!(config.geometry.counts_per_rev, 4096.0);
        assert_eq!(config.geometry.lower_length, 34.625);
        assert_eq!(config.upper, JointTuning::upper_default());
    }

    #[test]
    fn test_round_trips_through_json() {
        let config = ArmConfig::default();
        let json = serde_json::to_string_pretty(&config).unwrap();
        let back: ArmConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_rejects_zero_deadband() {
        let mut config = ArmConfig::default();
        config.lower.deadband = 0.0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_rejects_inverted_band() {
        let mut config = ArmConfig::default();
        config.upper.increase.floor_output = 0.9;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file() {
        let path = std::env::temp_dir().join(format!("arm-config-{}.json", std::process::id()));
        std::fs::write(&path, r#"{ "settle_ms": 2 }"#).unwrap();
        let config = ArmConfig::from_file(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(config.settle_ms, 2);

        assert!(matches!(
            ArmConfig::from_file("/nonexistent/arm.json"),
            Err(ConfigError::Io(_))
        ));
    }
}
