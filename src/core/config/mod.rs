//! 运行配置：JSON5 文件，所有字段可省略

pub mod error;

use std::fs;
use std::path::Path;

use log::info;
use serde::Deserialize;

pub use error::ConfigError;

use crate::core::devices::{ActivationProfile, GpioConfig, MachinesConfig, SensorConfig};
use crate::core::scheduler::{AnalysisConfig, LiveConfig};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EnvironmentConfig {
    pub gpio: GpioConfig,
    pub sensor: SensorConfig,
    pub machines: MachinesConfig,
    pub analysis: AnalysisConfig,
    pub live: LiveConfig,
    pub activation: ActivationProfile,
}

impl EnvironmentConfig {
    pub fn from_json5(text: &str) -> Result<Self, ConfigError> {
        let config: Self = json5::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let config = Self::from_json5(&fs::read_to_string(path)?)?;
        info!("⚙️ Loaded config from {:?}", path);
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(fps) = self.analysis.fps_override {
            if !(fps.is_finite() && fps > 0.0) {
                return Err(invalid(format!("analysis.fps_override must be positive, got {}", fps)));
            }
        }
        if !(self.live.tick_hz.is_finite() && self.live.tick_hz > 0.0) {
            return Err(invalid(format!("live.tick_hz must be positive, got {}", self.live.tick_hz)));
        }
        if !(self.live.time_scale > 0.0) {
            return Err(invalid("live.time_scale must be positive".to_string()));
        }
        if self.machines.red_light.pins.is_empty() {
            return Err(invalid("machines.red_light.pins is empty".to_string()));
        }

        let temperature = &self.machines.temperature;
        if !(temperature.tolerance >= 0.0) {
            return Err(invalid("machines.temperature.tolerance is negative".to_string()));
        }
        if temperature.reading_interval_ms == 0 {
            return Err(invalid("machines.temperature.reading_interval_ms is zero".to_string()));
        }

        if let SensorConfig::Mock(mock) = &self.sensor {
            if !mock.has_valid_range() {
                return Err(invalid(format!(
                    "sensor range must be finite with min <= max, got {}..={} (initial {})",
                    mock.min, mock.max, mock.initial
                )));
            }
            if !(0.0..=1.0).contains(&mock.error_rate) {
                return Err(invalid("sensor.error_rate must be within 0..=1".to_string()));
            }
        }
        Ok(())
    }
}

fn invalid(message: String) -> ConfigError {
    ConfigError::Invalid(message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_uses_wiring_defaults() {
        let config = EnvironmentConfig::from_json5("{}").unwrap();

        assert_eq!(config.gpio, GpioConfig::Mock);
        assert_eq!(config.machines.ac.peltier_pin, 18);
        assert_eq!(config.machines.ac.fan_pin, 23);
        assert_eq!(config.machines.mist.pin, 24);
        assert_eq!(config.machines.humidifier.ultrasonic_pin, 25);
        assert_eq!(config.machines.red_light.pins, vec![12, 16, 20]);
        assert_eq!(config.machines.fan.pin, 21);
        assert_eq!(config.machines.temperature.target_temp, 45.0);
        assert_eq!(config.analysis.progress_interval, 30);
        assert_eq!(config.live.tick_hz, 30.0);
        assert!(config.live.loop_video);
        assert_eq!(config.activation, ActivationProfile::desert());
    }

    #[test]
    fn test_json5_overrides() {
        let text = r#"
        {
            // 实机：sysfs + DS18B20
            gpio: { kind: "sysfs", chip: 2 },
            sensor: { kind: "w1", device: "/tmp/w1_slave" },
            machines: {
                mist: { pin: 5, water_level_pin: 6 },
                temperature: { target_temp: 40, tolerance: 1.0 },
            },
            analysis: { fps_override: 24, progress_interval: 10 },
            live: { loop_video: false },
        }
        "#;
        let config = EnvironmentConfig::from_json5(text).unwrap();

        assert!(matches!(config.gpio, GpioConfig::Sysfs { chip: 2, .. }));
        assert!(matches!(config.sensor, SensorConfig::W1(ref w1) if w1.device.is_some()));
        assert_eq!(config.machines.mist.pin, 5);
        assert_eq!(config.machines.mist.water_level_pin, Some(6));
        assert_eq!(config.machines.mist.frequency_hz, 400);
        assert_eq!(config.machines.temperature.target_temp, 40.0);
        assert_eq!(config.analysis.fps_override, Some(24.0));
        assert!(!config.live.loop_video);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = EnvironmentConfig::from_json5("{ live: { tick_hz: 0 } }").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err = EnvironmentConfig::from_json5(
            "{ sensor: { kind: 'mock', min: 40, max: 20 } }",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err =
            EnvironmentConfig::from_json5("{ sensor: { kind: 'mock', min: NaN } }").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err = EnvironmentConfig::from_json5("{ sensor: { kind: 'mock', max: Infinity } }")
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err = EnvironmentConfig::from_json5("{ gpio: ").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("env.json5");
        fs::write(&path, "{ activation: { fan: 70 } }").unwrap();

        let config = EnvironmentConfig::from_file(&path).unwrap();
        assert_eq!(config.activation.fan, 70.0);
        assert_eq!(config.activation.mist, 20.0);

        assert!(matches!(
            EnvironmentConfig::from_file(dir.path().join("missing.json5")),
            Err(ConfigError::Io(_))
        ));
    }
}
