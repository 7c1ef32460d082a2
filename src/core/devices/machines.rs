//! 机器集合：一次会话内所有执行器的唯一所有者

use log::{debug, info, warn};
use serde::Deserialize;

use super::ac_unit::{AcConfig, AcUnit};
use super::error::DeviceError;
use super::gpio::Gpio;
use super::port::ActuatorPort;
use super::pwm_device::{FanConfig, HumidifierConfig, MistMakerConfig, PwmDevice, RedLightConfig};
use super::sensors::SensorConfig;
use super::speaker::{Speaker, SpeakerConfig};
use super::thermal::{TempControllerConfig, TemperatureController};
use crate::core::control::{device_ids, ActuatorSetpoint};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MachinesConfig {
    pub ac: AcConfig,
    pub mist: MistMakerConfig,
    pub humidifier: HumidifierConfig,
    pub red_light: RedLightConfig,
    pub fan: FanConfig,
    pub speaker: SpeakerConfig,
    pub temperature: TempControllerConfig,
}

/// Levels the machines start at before a live session.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ActivationProfile {
    pub ac_cooling_power: f64,
    pub ac_fan_speed: f64,
    pub mist: f64,
    pub humidifier: f64,
    pub red_light: f64,
    pub fan: f64,
    pub speaker_volume: f64,
    pub temperature_monitoring: bool,
}

impl Default for ActivationProfile {
    fn default() -> Self {
        Self::desert()
    }
}

impl ActivationProfile {
    /// 沙漠预设：空调只开散热风扇，少量水雾
    pub fn desert() -> Self {
        Self {
            ac_cooling_power: 0.0,
            ac_fan_speed: 100.0,
            mist: 20.0,
            humidifier: 10.0,
            red_light: 0.0,
            fan: 50.0,
            speaker_volume: 100.0,
            temperature_monitoring: true,
        }
    }
}

#[derive(Debug, Default)]
pub struct ApplyReport {
    pub applied: usize,
    /// Setpoints addressed to devices this set does not hold.
    pub skipped: usize,
    pub failed: Vec<(String, DeviceError)>,
}

impl ApplyReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Default)]
pub struct MachineSet {
    ports: Vec<Box<dyn ActuatorPort>>,
    ac: Option<AcUnit>,
    thermal: Option<TemperatureController>,
}

impl MachineSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(
        config: &MachinesConfig,
        gpio: &Gpio,
        sensor: &SensorConfig,
    ) -> Result<Self, DeviceError> {
        let mut set = Self::new();
        set.ac = Some(AcUnit::new(&config.ac, gpio)?);
        set.insert(Box::new(PwmDevice::mist_maker(&config.mist, gpio)?));
        set.insert(Box::new(PwmDevice::humidifier(&config.humidifier, gpio)?));
        set.insert(Box::new(PwmDevice::red_light(&config.red_light, gpio)?));
        set.insert(Box::new(PwmDevice::fan(&config.fan, gpio)?));
        set.insert(Box::new(Speaker::new(config.speaker.clone())));
        set.thermal = Some(TemperatureController::new(
            config.temperature.clone(),
            sensor.open()?,
        ));

        info!("✅ Machines ready: {}", set.ids().join(", "));
        Ok(set)
    }

    /// Adds a port, replacing any existing port with the same id.
    pub fn insert(&mut self, port: Box<dyn ActuatorPort>) {
        self.ports.retain(|p| p.id() != port.id());
        self.ports.push(port);
    }

    pub fn with_ac(mut self, ac: AcUnit) -> Self {
        self.ac = Some(ac);
        self
    }

    pub fn with_thermal(mut self, thermal: TemperatureController) -> Self {
        self.thermal = Some(thermal);
        self
    }

    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = Vec::with_capacity(self.ports.len() + 2);
        if self.ac.is_some() {
            ids.push(device_ids::AC);
        }
        if self.thermal.is_some() {
            ids.push(device_ids::TEMP_CONTROLLER);
        }
        ids.extend(self.ports.iter().map(|p| p.id()));
        ids
    }

    pub fn port_mut(&mut self, id: &str) -> Option<&mut (dyn ActuatorPort + 'static)> {
        if id == device_ids::AC {
            return self
                .ac
                .as_mut()
                .map(|ac| ac as &mut (dyn ActuatorPort + 'static));
        }
        if id == device_ids::TEMP_CONTROLLER {
            return self
                .thermal
                .as_mut()
                .map(|t| t as &mut (dyn ActuatorPort + 'static));
        }
        self.ports.iter_mut().find(|p| p.id() == id).map(|p| p.as_mut())
    }

    pub fn ac_mut(&mut self) -> Option<&mut AcUnit> {
        self.ac.as_mut()
    }

    pub fn thermal(&self) -> Option<&TemperatureController> {
        self.thermal.as_ref()
    }

    pub fn thermal_mut(&mut self) -> Option<&mut TemperatureController> {
        self.thermal.as_mut()
    }

    /// Best-effort: a failing device is logged and skipped, the rest still apply.
    pub fn apply(&mut self, setpoints: &[ActuatorSetpoint]) -> ApplyReport {
        let mut report = ApplyReport::default();

        for setpoint in setpoints {
            let Some(port) = self.port_mut(&setpoint.device_id) else {
                debug!("no device {} in this set, skipping", setpoint.device_id);
                report.skipped += 1;
                continue;
            };

            let result = if port.channel() != setpoint.channel {
                Err(DeviceError::ChannelMismatch {
                    device: setpoint.device_id.clone(),
                    expected: port.channel(),
                    got: setpoint.channel,
                })
            } else {
                port.set_intensity(setpoint.value)
            };

            match result {
                Ok(()) => report.applied += 1,
                Err(e) => {
                    warn!("⚠️ Failed to apply {} = {:.1}: {}", setpoint.device_id, setpoint.value, e);
                    report.failed.push((setpoint.device_id.clone(), e));
                }
            }
        }

        report
    }

    /// Drives the AC's cooling power from the latest temperature reading.
    /// Returns the commanded power when a change was needed.
    pub fn regulate_temperature(&mut self) -> Option<f64> {
        let demand = self.thermal.as_ref()?.cooling_demand()?;
        let ac = self.ac.as_mut()?;
        if ac.level() == Some(demand) {
            return None;
        }

        match ac.set_intensity(demand) {
            Ok(()) => {
                debug!("ac cooling -> {:.0}%", demand);
                Some(demand)
            }
            Err(e) => {
                warn!("⚠️ Temperature regulation failed: {}", e);
                None
            }
        }
    }

    /// Starts every held device at the profile's levels.
    pub fn activate(&mut self, profile: &ActivationProfile) -> ApplyReport {
        info!("🏜️ Activating machines");
        let mut report = ApplyReport::default();
        let mut record = |id: &str, result: Result<(), DeviceError>| match result {
            Ok(()) => report.applied += 1,
            Err(e) => {
                warn!("⚠️ Failed to start {}: {}", id, e);
                report.failed.push((id.to_string(), e));
            }
        };

        if let Some(ac) = self.ac.as_mut() {
            record(
                device_ids::AC,
                ac.start_with(profile.ac_cooling_power, profile.ac_fan_speed),
            );
        }

        let levels = [
            (device_ids::MIST, profile.mist),
            (device_ids::HUMIDIFIER, profile.humidifier),
            (device_ids::RED_LIGHT, profile.red_light),
            (device_ids::FAN, profile.fan),
            (device_ids::SPEAKER, profile.speaker_volume),
        ];
        for (id, level) in levels {
            if let Some(port) = self.ports.iter_mut().find(|p| p.id() == id) {
                record(id, port.start(Some(level)));
            }
        }

        if profile.temperature_monitoring {
            if let Some(thermal) = self.thermal.as_mut() {
                record(device_ids::TEMP_CONTROLLER, thermal.start_monitoring());
            }
        }

        report
    }

    /// (id, last commanded level) for every held device.
    pub fn status(&self) -> Vec<(String, Option<f64>)> {
        let mut status = Vec::with_capacity(self.ports.len() + 2);
        if let Some(ac) = &self.ac {
            status.push((device_ids::AC.to_string(), ac.level()));
        }
        if let Some(thermal) = &self.thermal {
            status.push((device_ids::TEMP_CONTROLLER.to_string(), thermal.level()));
        }
        status.extend(self.ports.iter().map(|p| (p.id().to_string(), p.level())));
        status
    }

    /// Cleans every device; failures are logged and collected, never short-circuit.
    pub fn cleanup_all(&mut self) -> Vec<(String, DeviceError)> {
        let mut failures = Vec::new();

        if let Some(thermal) = self.thermal.as_mut() {
            if let Err(e) = thermal.cleanup() {
                failures.push((device_ids::TEMP_CONTROLLER.to_string(), e));
            }
        }
        if let Some(ac) = self.ac.as_mut() {
            if let Err(e) = ac.cleanup() {
                failures.push((device_ids::AC.to_string(), e));
            }
        }
        for port in self.ports.iter_mut() {
            if let Err(e) = port.cleanup() {
                failures.push((port.id().to_string(), e));
            }
        }

        for (id, e) in &failures {
            warn!("⚠️ Cleanup of {} failed: {}", id, e);
        }
        info!("🧹 Machines cleaned up ({} failures)", failures.len());
        failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::control::Channel;
    use crate::core::devices::gpio::MockGpio;
    use crate::core::devices::sensors::MockSensorConfig;

    fn create_machines(config: &MachinesConfig) -> (MachineSet, MockGpio) {
        let mock = MockGpio::new();
        let sensor = SensorConfig::Mock(MockSensorConfig {
            seed: Some(3),
            ..Default::default()
        });
        let set = MachineSet::from_config(config, &Gpio::Mock(mock.clone()), &sensor).unwrap();
        (set, mock)
    }

    #[test]
    fn test_from_config_holds_every_device() {
        let (set, _) = create_machines(&MachinesConfig::default());
        let ids = set.ids();
        for id in [
            device_ids::AC,
            device_ids::TEMP_CONTROLLER,
            device_ids::MIST,
            device_ids::HUMIDIFIER,
            device_ids::RED_LIGHT,
            device_ids::FAN,
            device_ids::SPEAKER,
        ] {
            assert!(ids.contains(&id), "missing {}", id);
        }
    }

    #[test]
    fn test_activation_profile_levels() {
        let (mut set, mock) = create_machines(&MachinesConfig::default());
        let profile = ActivationProfile {
            temperature_monitoring: false,
            ..ActivationProfile::desert()
        };

        let report = set.activate(&profile);
        assert!(report.is_clean());
        assert_eq!(mock.duty_cycle(18), Some(0.0));
        assert_eq!(mock.duty_cycle(23), Some(100.0));
        assert_eq!(mock.duty_cycle(24), Some(20.0));
        assert_eq!(mock.duty_cycle(25), Some(10.0));
        assert_eq!(mock.duty_cycle(12), Some(0.0));
        assert_eq!(mock.duty_cycle(21), Some(50.0));
    }

    #[test]
    fn test_apply_skips_failures_and_continues() {
        let config = MachinesConfig {
            mist: MistMakerConfig {
                water_level_pin: Some(5),
                ..Default::default()
            },
            ..Default::default()
        };
        let (mut set, mock) = create_machines(&config);
        mock.set_input(5, false);

        let setpoints = vec![
            ActuatorSetpoint::new(device_ids::MIST, Channel::Intensity, 60.0),
            ActuatorSetpoint::new(device_ids::FAN, Channel::Speed, 70.0),
            ActuatorSetpoint::new(device_ids::RED_LIGHT, Channel::Speed, 10.0),
            ActuatorSetpoint::new("volcano", Channel::Intensity, 10.0),
        ];
        let report = set.apply(&setpoints);

        assert_eq!(report.applied, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.failed.len(), 2);
        assert!(matches!(report.failed[1].1, DeviceError::ChannelMismatch { .. }));
        assert_eq!(mock.duty_cycle(21), Some(70.0));
    }

    #[test]
    fn test_regulate_temperature_drives_ac() {
        let (mut set, mock) = create_machines(&MachinesConfig::default());
        // Mock sensor stays within 15..=35, well below the 45 °C target.
        set.thermal_mut().unwrap().read_now().unwrap();
        set.ac_mut().unwrap().set_intensity(80.0).unwrap();

        assert_eq!(set.regulate_temperature(), Some(0.0));
        assert_eq!(mock.duty_cycle(18), Some(0.0));
        assert_eq!(set.regulate_temperature(), None);
    }

    #[test]
    fn test_cleanup_all_releases_everything() {
        let (mut set, mock) = create_machines(&MachinesConfig::default());
        set.activate(&ActivationProfile::desert());

        let failures = set.cleanup_all();
        assert!(failures.is_empty());
        for pin in [18, 23, 24, 25, 12, 16, 20, 21] {
            assert!(mock.pwm_state(pin).unwrap().released, "pin {}", pin);
        }
        assert!(set.cleanup_all().is_empty());
    }
}
