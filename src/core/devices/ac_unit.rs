//! 帕尔贴空调单元：制冷片 + 散热风扇

use log::{info, warn};
use serde::Deserialize;

use super::error::DeviceError;
use super::gpio::{DigitalInput, Gpio, PwmOutput};
use super::port::ActuatorPort;
use crate::core::control::{device_ids, Channel};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AcConfig {
    pub peltier_pin: u32,
    pub fan_pin: u32,
    /// Reads high when the heatsink is over temperature.
    pub heatsink_temp_pin: Option<u32>,
    pub peltier_frequency_hz: u32,
    pub fan_frequency_hz: u32,
    pub cooling_power: f64,
    pub fan_speed: f64,
}

impl Default for AcConfig {
    fn default() -> Self {
        Self {
            peltier_pin: 18,
            fan_pin: 23,
            heatsink_temp_pin: None,
            peltier_frequency_hz: 1000,
            fan_frequency_hz: 25_000,
            cooling_power: 100.0,
            fan_speed: 100.0,
        }
    }
}

pub struct AcUnit {
    peltier: Box<dyn PwmOutput>,
    fan: Box<dyn PwmOutput>,
    heatsink: Option<Box<dyn DigitalInput>>,
    default_power: f64,
    default_fan_speed: f64,
    power: Option<f64>,
    fan_speed: Option<f64>,
    released: bool,
}

impl AcUnit {
    pub fn new(config: &AcConfig, gpio: &Gpio) -> Result<Self, DeviceError> {
        let mut peltier = gpio.open_pwm(config.peltier_pin, config.peltier_frequency_hz)?;
        let mut fan = gpio.open_pwm(config.fan_pin, config.fan_frequency_hz)?;
        peltier.start(0.0)?;
        fan.start(0.0)?;

        let heatsink = config
            .heatsink_temp_pin
            .map(|pin| gpio.open_input(pin))
            .transpose()?;

        Ok(Self {
            peltier,
            fan,
            heatsink,
            default_power: config.cooling_power,
            default_fan_speed: config.fan_speed,
            power: Some(0.0),
            fan_speed: Some(0.0),
            released: false,
        })
    }

    pub fn is_heatsink_safe(&self) -> Result<bool, DeviceError> {
        match &self.heatsink {
            Some(input) => Ok(!input.is_high()?),
            None => Ok(true),
        }
    }

    pub fn set_fan_speed(&mut self, speed: f64) -> Result<(), DeviceError> {
        self.ensure_not_released()?;
        let speed = Channel::Speed.clamp(speed);
        self.fan.change_duty_cycle(speed)?;
        self.fan_speed = Some(speed);
        Ok(())
    }

    pub fn fan_speed(&self) -> Option<f64> {
        self.fan_speed
    }

    /// Starts with explicit cooling power and fan speed.
    pub fn start_with(&mut self, cooling_power: f64, fan_speed: f64) -> Result<(), DeviceError> {
        self.ensure_not_released()?;
        self.ensure_heatsink_safe()?;
        let power = Channel::Power.clamp(cooling_power);
        let speed = Channel::Speed.clamp(fan_speed);
        self.peltier.change_duty_cycle(power)?;
        self.fan.change_duty_cycle(speed)?;
        self.power = Some(power);
        self.fan_speed = Some(speed);
        info!("▶️ ac started: cooling {:.0}%, fan {:.0}%", power, speed);
        Ok(())
    }

    fn ensure_not_released(&self) -> Result<(), DeviceError> {
        if self.released {
            Err(DeviceError::Released(device_ids::AC.to_string()))
        } else {
            Ok(())
        }
    }

    fn ensure_heatsink_safe(&self) -> Result<(), DeviceError> {
        if self.is_heatsink_safe()? {
            Ok(())
        } else {
            Err(DeviceError::Interlock {
                device: device_ids::AC.to_string(),
                reason: "heatsink over temperature".to_string(),
            })
        }
    }
}

impl ActuatorPort for AcUnit {
    fn id(&self) -> &str {
        device_ids::AC
    }

    fn channel(&self) -> Channel {
        Channel::Power
    }

    /// Cooling power of the Peltier element.
    fn set_intensity(&mut self, value: f64) -> Result<(), DeviceError> {
        self.ensure_not_released()?;
        self.ensure_heatsink_safe()?;
        let power = Channel::Power.clamp(value);
        self.peltier.change_duty_cycle(power)?;
        self.power = Some(power);
        Ok(())
    }

    fn start(&mut self, initial: Option<f64>) -> Result<(), DeviceError> {
        let power = initial.unwrap_or(self.default_power);
        self.start_with(power, self.default_fan_speed)
    }

    fn stop(&mut self) -> Result<(), DeviceError> {
        if self.released {
            return Ok(());
        }
        self.peltier.stop()?;
        self.fan.stop()?;
        Ok(())
    }

    fn cleanup(&mut self) -> Result<(), DeviceError> {
        if self.released {
            return Ok(());
        }
        self.stop()?;
        let peltier = self.peltier.release();
        let fan = self.fan.release();
        self.released = true;
        if let Err(e) = &fan {
            warn!("⚠️ ac: failed to release fan pin: {}", e);
        }
        peltier.and(fan)
    }

    fn level(&self) -> Option<f64> {
        self.power
    }
}
