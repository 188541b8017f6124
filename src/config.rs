// src/config.rs - machine configuration

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::motion::joint::Joint;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Machine configuration: one `[[joint]]` table per axis plus the step
/// generator settings.
///
/// ```toml
/// [[joint]]
/// v_max = 5000.0
/// a_max = 50000.0
///
/// [[joint]]
/// v_max = 5000.0
/// a_max = 50000.0
///
/// [stepper]
/// period_us = 5.0
/// ```
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub joint: Vec<JointConfig>,
    #[serde(default)]
    pub stepper: StepperConfig,
}

/// Per-axis limits, steps/s and steps/s².
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct JointConfig {
    pub v_max: f64,
    pub a_max: f64,
}

/// Step generator settings.
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct StepperConfig {
    /// Pulse period in microseconds. Must stay below the fastest joint's
    /// minimum step interval.
    #[serde(default = "default_period_us")]
    pub period_us: f64,
}

impl Default for StepperConfig {
    fn default() -> Self {
        Self {
            period_us: default_period_us(),
        }
    }
}

fn default_period_us() -> f64 {
    5.0
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.joint.is_empty() {
            return Err(ConfigError::Invalid("no joints configured".to_string()));
        }
        for (i, j) in self.joint.iter().enumerate() {
            if j.v_max <= 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "joint {i}: v_max must be > 0, got {}",
                    j.v_max
                )));
            }
            if j.a_max <= 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "joint {i}: a_max must be > 0, got {}",
                    j.a_max
                )));
            }
        }
        if self.stepper.period_us <= 0.0 {
            return Err(ConfigError::Invalid(
                "stepper period_us must be > 0".to_string(),
            ));
        }
        let dt = self.stepper.period_us / 1e6;
        for (i, j) in self.joint.iter().enumerate() {
            if dt >= 1.0 / j.v_max {
                return Err(ConfigError::Invalid(format!(
                    "joint {i}: pulse period {} µs cannot keep up with v_max {}",
                    self.stepper.period_us, j.v_max
                )));
            }
        }
        Ok(())
    }

    pub fn joints(&self) -> Vec<Joint> {
        self.joint
            .iter()
            .enumerate()
            .map(|(i, j)| Joint::new(i, j.v_max, j.a_max))
            .collect()
    }

    /// Pulse period in seconds.
    pub fn period(&self) -> f64 {
        self.stepper.period_us / 1e6
    }
}

/// Load and validate a configuration from a TOML file.
pub fn load_config(path: &str) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
        tracing::error!("Failed to read config file '{}': {}", path, e);
        ConfigError::Io(e)
    })?;
    let config: Config = toml::from_str(&contents).map_err(|e| {
        tracing::error!("Failed to parse config TOML: {}", e);
        ConfigError::Toml(e)
    })?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    fn two_joint_config() -> Config {
        Config {
            joint: vec![
                JointConfig {
                    v_max: 5_000.0,
                    a_max: 50_000.0,
                },
                JointConfig {
                    v_max: 5_000.0,
                    a_max: 50_000.0,
                },
            ],
            stepper: StepperConfig::default(),
        }
    }

    #[test]
    fn valid_config_passes() {
        assert!(two_joint_config().validate().is_ok());
    }

    #[test]
    fn zero_velocity_is_rejected() {
        let mut c = two_joint_config();
        c.joint[1].v_max = 0.0;
        assert!(matches!(c.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn negative_acceleration_is_rejected() {
        let mut c = two_joint_config();
        c.joint[0].a_max = -1.0;
        assert!(matches!(c.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn period_slower_than_step_rate_is_rejected() {
        let mut c = two_joint_config();
        // 5000 steps/s needs a period under 200 µs.
        c.stepper.period_us = 300.0;
        assert!(matches!(c.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn joints_are_indexed_in_order() {
        let joints = two_joint_config().joints();
        assert_eq!(joints[0].n, 0);
        assert_eq!(joints[1].n, 1);
        assert_eq!(joints[0].small_x, 250.0);
    }

    #[test]
    fn load_config_from_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("machine.toml");
        let mut f = File::create(&path).unwrap();
        writeln!(
            f,
            "[[joint]]\nv_max = 1000.0\na_max = 10000.0\n\n[stepper]\nperiod_us = 10.0"
        )
        .unwrap();
        f.flush().unwrap();

        let c = load_config(path.to_str().unwrap()).unwrap();
        assert_eq!(c.joint.len(), 1);
        assert_eq!(c.stepper.period_us, 10.0);
    }

    #[test]
    fn load_config_missing_file() {
        assert!(matches!(
            load_config("does_not_exist.toml"),
            Err(ConfigError::Io(_))
        ));
    }

    #[test]
    fn load_config_invalid_toml() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        let mut f = File::create(&path).unwrap();
        writeln!(f, "not valid toml at all [").unwrap();
        f.flush().unwrap();

        assert!(matches!(
            load_config(path.to_str().unwrap()),
            Err(ConfigError::Toml(_))
        ));
    }
}
