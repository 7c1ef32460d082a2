//! 温度传感器：模拟热敏电阻与 DS18B20 (1-Wire sysfs)

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use log::info;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;

use super::error::DeviceError;
use super::port::SensorPort;

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct MockSensorConfig {
    pub initial: f64,
    pub min: f64,
    pub max: f64,
    pub seed: Option<u64>,
    /// Probability of a simulated read failure.
    pub error_rate: f64,
}

impl Default for MockSensorConfig {
    fn default() -> Self {
        Self {
            initial: 25.0,
            min: 15.0,
            max: 35.0,
            seed: None,
            error_rate: 0.0,
        }
    }
}

impl MockSensorConfig {
    /// Finite bounds with `min <= max` and a finite starting value.
    pub fn has_valid_range(&self) -> bool {
        self.min.is_finite()
            && self.max.is_finite()
            && self.initial.is_finite()
            && self.min <= self.max
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct W1SensorConfig {
    /// Explicit `w1_slave` file; discovered under `devices_root` when absent.
    pub device: Option<PathBuf>,
    pub devices_root: PathBuf,
}

impl Default for W1SensorConfig {
    fn default() -> Self {
        Self {
            device: None,
            devices_root: PathBuf::from("/sys/bus/w1/devices"),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SensorConfig {
    Mock(MockSensorConfig),
    W1(W1SensorConfig),
}

impl Default for SensorConfig {
    fn default() -> Self {
        SensorConfig::Mock(MockSensorConfig::default())
    }
}

impl SensorConfig {
    pub fn open(&self) -> Result<Box<dyn SensorPort>, DeviceError> {
        match self {
            SensorConfig::Mock(config) => {
                if !config.has_valid_range() {
                    return Err(DeviceError::Parse(format!(
                        "mock sensor range {}..={} (initial {})",
                        config.min, config.max, config.initial
                    )));
                }
                info!("🌡️ Using mock temperature sensor");
                Ok(Box::new(MockThermSensor::new(config)))
            }
            SensorConfig::W1(config) => {
                let path = match &config.device {
                    Some(path) => path.clone(),
                    None => W1ThermSensor::discover(&config.devices_root)?,
                };
                info!("🌡️ Using DS18B20 sensor at {:?}", path);
                Ok(Box::new(W1ThermSensor::new(path)))
            }
        }
    }
}

/// Random walk with a slowly reversing trend, bounded to [min, max].
pub struct MockThermSensor {
    current: f64,
    min: f64,
    max: f64,
    error_rate: f64,
    rng: StdRng,
    trend_direction: f64,
    trend_duration: f64,
    trend_elapsed: f64,
    last_update: Instant,
}

impl MockThermSensor {
    pub fn new(config: &MockSensorConfig) -> Self {
        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let trend_direction = if rng.random_bool(0.5) { 1.0 } else { -1.0 };
        let trend_duration = rng.random_range(30.0..60.0);

        Self {
            current: config.initial,
            min: config.min,
            max: config.max,
            error_rate: config.error_rate,
            rng,
            trend_direction,
            trend_duration,
            trend_elapsed: 0.0,
            last_update: Instant::now(),
        }
    }

    /// Advances the simulation by `dt_secs` and returns the new reading.
    pub fn sample_after(&mut self, dt_secs: f64) -> f64 {
        self.trend_elapsed += dt_secs;
        if self.trend_elapsed > self.trend_duration {
            self.trend_direction = -self.trend_direction;
            self.trend_duration = self.rng.random_range(30.0..60.0);
            self.trend_elapsed = 0.0;
        }

        let noise = self.rng.random_range(-0.1..0.1);
        let trend = self.trend_direction * 0.05 * dt_secs;
        self.current = (self.current + noise + trend).clamp(self.min, self.max);

        (self.current * 100.0).round() / 100.0
    }
}

impl SensorPort for MockThermSensor {
    fn name(&self) -> &str {
        "mock-thermistor"
    }

    fn read(&mut self) -> Result<f64, DeviceError> {
        if self.error_rate > 0.0 && self.rng.random::<f64>() < self.error_rate {
            return Err(DeviceError::SensorRead("Mock sensor reading error".to_string()));
        }

        let now = Instant::now();
        let dt = now.duration_since(self.last_update).as_secs_f64();
        self.last_update = now;
        Ok(self.sample_after(dt))
    }
}

/// DS18B20 through the kernel's w1-therm driver.
pub struct W1ThermSensor {
    path: PathBuf,
}

impl W1ThermSensor {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// First `28-*` family device under `devices_root`.
    pub fn discover(devices_root: &Path) -> Result<PathBuf, DeviceError> {
        let mut candidates: Vec<PathBuf> = fs::read_dir(devices_root)?
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_name().to_string_lossy().starts_with("28-"))
            .map(|entry| entry.path().join("w1_slave"))
            .collect();
        candidates.sort();
        candidates
            .into_iter()
            .next()
            .ok_or_else(|| DeviceError::SensorRead(format!("no DS18B20 under {:?}", devices_root)))
    }

    pub fn parse(contents: &str) -> Result<f64, DeviceError> {
        let mut lines = contents.lines();
        let crc_line = lines.next().unwrap_or_default();
        if !crc_line.trim_end().ends_with("YES") {
            return Err(DeviceError::SensorRead("CRC check failed".to_string()));
        }

        let data_line = lines.next().unwrap_or_default();
        let raw = data_line
            .split("t=")
            .nth(1)
            .ok_or_else(|| DeviceError::Parse(format!("missing t= in {:?}", data_line)))?;
        let millidegrees: i64 = raw
            .trim()
            .parse()
            .map_err(|e| DeviceError::Parse(format!("bad temperature {:?}: {}", raw, e)))?;
        Ok(millidegrees as f64 / 1000.0)
    }
}

impl SensorPort for W1ThermSensor {
    fn name(&self) -> &str {
        "ds18b20"
    }

    fn read(&mut self) -> Result<f64, DeviceError> {
        let contents = fs::read_to_string(&self.path)?;
        Self::parse(&contents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const W1_OK: &str = "72 01 4b 46 7f ff 0e 10 57 : crc=57 YES\n72 01 4b 46 7f ff 0e 10 57 t=23125\n";

    fn seeded(initial: f64) -> MockThermSensor {
        MockThermSensor::new(&MockSensorConfig {
            initial,
            seed: Some(7),
            ..Default::default()
        })
    }

    #[test]
    fn test_mock_stays_in_bounds() {
        let mut sensor = seeded(34.9);
        for _ in 0..2_000 {
            let t = sensor.sample_after(1.0);
            assert!((15.0..=35.0).contains(&t));
        }
    }

    #[test]
    fn test_mock_is_deterministic_with_seed() {
        let mut a = seeded(25.0);
        let mut b = seeded(25.0);
        for _ in 0..50 {
            assert_eq!(a.sample_after(0.5), b.sample_after(0.5));
        }
    }

    #[test]
    fn test_mock_simulated_errors() {
        let mut sensor = MockThermSensor::new(&MockSensorConfig {
            seed: Some(1),
            error_rate: 1.0,
            ..Default::default()
        });
        assert!(matches!(sensor.read(), Err(DeviceError::SensorRead(_))));
    }

    #[test]
    fn test_w1_parse() {
        assert_eq!(W1ThermSensor::parse(W1_OK).unwrap(), 23.125);
        let negative = "aa : crc=aa YES\naa t=-1250\n";
        assert_eq!(W1ThermSensor::parse(negative).unwrap(), -1.25);
    }

    #[test]
    fn test_w1_crc_failure() {
        let bad = "72 01 4b 46 7f ff 0e 10 57 : crc=57 NO\n72 01 t=23125\n";
        assert!(matches!(
            W1ThermSensor::parse(bad),
            Err(DeviceError::SensorRead(_))
        ));
    }

    #[test]
    fn test_w1_discover_and_read() {
        let root = tempfile::tempdir().unwrap();
        let device = root.path().join("28-0316a2793aff");
        fs::create_dir_all(&device).unwrap();
        fs::create_dir_all(root.path().join("w1_bus_master1")).unwrap();
        fs::write(device.join("w1_slave"), W1_OK).unwrap();

        let config = SensorConfig::W1(W1SensorConfig {
            device: None,
            devices_root: root.path().to_path_buf(),
        });
        let mut sensor = config.open().unwrap();
        assert_eq!(sensor.read().unwrap(), 23.125);
    }

    #[test]
    fn test_mock_rejects_nan_range() {
        let config = SensorConfig::Mock(MockSensorConfig {
            min: f64::NAN,
            ..Default::default()
        });
        assert!(matches!(config.open(), Err(DeviceError::Parse(_))));

        let inverted = SensorConfig::Mock(MockSensorConfig {
            min: 40.0,
            max: 20.0,
            ..Default::default()
        });
        assert!(inverted.open().is_err());
        assert!(SensorConfig::default().open().is_ok());
    }
}
