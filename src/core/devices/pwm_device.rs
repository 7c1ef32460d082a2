//! 单通道 PWM 执行器：风扇、雾化器、加湿器、红光 LED 阵列

use log::{debug, info, warn};
use serde::Deserialize;

use super::error::DeviceError;
use super::gpio::{DigitalInput, Gpio, PwmOutput};
use super::port::ActuatorPort;
use crate::core::control::{device_ids, Channel};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FanConfig {
    pub pin: u32,
    pub frequency_hz: u32,
    pub initial_speed: f64,
}

impl Default for FanConfig {
    fn default() -> Self {
        Self {
            pin: 21,
            frequency_hz: 25_000,
            initial_speed: 0.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MistMakerConfig {
    pub pin: u32,
    pub water_level_pin: Option<u32>,
    pub frequency_hz: u32,
    pub duty_cycle: f64,
}

impl Default for MistMakerConfig {
    fn default() -> Self {
        Self {
            pin: 24,
            water_level_pin: None,
            frequency_hz: 400,
            duty_cycle: 50.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HumidifierConfig {
    pub ultrasonic_pin: u32,
    pub water_level_pin: Option<u32>,
    pub frequency_hz: u32,
    pub output_level: f64,
}

impl Default for HumidifierConfig {
    fn default() -> Self {
        Self {
            ultrasonic_pin: 25,
            water_level_pin: None,
            frequency_hz: 400,
            output_level: 100.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RedLightConfig {
    pub pins: Vec<u32>,
    pub frequency_hz: u32,
    pub initial_intensity: f64,
}

impl Default for RedLightConfig {
    fn default() -> Self {
        Self {
            pins: vec![12, 16, 20],
            frequency_hz: 1000,
            initial_intensity: 100.0,
        }
    }
}

/// One or more PWM outputs driven in lockstep.
pub struct PwmDevice {
    id: String,
    channel: Channel,
    outputs: Vec<Box<dyn PwmOutput>>,
    water_level: Option<Box<dyn DigitalInput>>,
    default_level: f64,
    level: Option<f64>,
    running: bool,
    released: bool,
}

impl PwmDevice {
    pub fn new(
        id: impl Into<String>,
        channel: Channel,
        outputs: Vec<Box<dyn PwmOutput>>,
        default_level: f64,
    ) -> Self {
        Self {
            id: id.into(),
            channel,
            outputs,
            water_level: None,
            default_level,
            level: None,
            running: false,
            released: false,
        }
    }

    /// Refuses to run while this input reads low.
    pub fn with_water_level(mut self, input: Box<dyn DigitalInput>) -> Self {
        self.water_level = Some(input);
        self
    }

    pub fn fan(config: &FanConfig, gpio: &Gpio) -> Result<Self, DeviceError> {
        let pwm = gpio.open_pwm(config.pin, config.frequency_hz)?;
        let mut fan = Self::new(device_ids::FAN, Channel::Speed, vec![pwm], config.initial_speed);
        // Fans idle at 0% from setup so speed changes apply immediately.
        fan.start(Some(0.0))?;
        Ok(fan)
    }

    pub fn mist_maker(config: &MistMakerConfig, gpio: &Gpio) -> Result<Self, DeviceError> {
        let pwm = gpio.open_pwm(config.pin, config.frequency_hz)?;
        let device = Self::new(device_ids::MIST, Channel::Intensity, vec![pwm], config.duty_cycle);
        match config.water_level_pin {
            Some(pin) => Ok(device.with_water_level(gpio.open_input(pin)?)),
            None => Ok(device),
        }
    }

    pub fn humidifier(config: &HumidifierConfig, gpio: &Gpio) -> Result<Self, DeviceError> {
        let pwm = gpio.open_pwm(config.ultrasonic_pin, config.frequency_hz)?;
        let device = Self::new(
            device_ids::HUMIDIFIER,
            Channel::Intensity,
            vec![pwm],
            config.output_level,
        );
        match config.water_level_pin {
            Some(pin) => Ok(device.with_water_level(gpio.open_input(pin)?)),
            None => Ok(device),
        }
    }

    pub fn red_light(config: &RedLightConfig, gpio: &Gpio) -> Result<Self, DeviceError> {
        let outputs = config
            .pins
            .iter()
            .map(|&pin| gpio.open_pwm(pin, config.frequency_hz))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(
            device_ids::RED_LIGHT,
            Channel::Intensity,
            outputs,
            config.initial_intensity,
        ))
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    fn ensure_usable(&self) -> Result<(), DeviceError> {
        if self.released {
            return Err(DeviceError::Released(self.id.clone()));
        }
        if let Some(input) = &self.water_level {
            if !input.is_high()? {
                return Err(DeviceError::Interlock {
                    device: self.id.clone(),
                    reason: format!("water level low on pin {}", input.pin()),
                });
            }
        }
        Ok(())
    }
}

impl ActuatorPort for PwmDevice {
    fn id(&self) -> &str {
        &self.id
    }

    fn channel(&self) -> Channel {
        self.channel
    }

    fn set_intensity(&mut self, value: f64) -> Result<(), DeviceError> {
        self.ensure_usable()?;
        let value = self.channel.clamp(value);

        for pwm in self.outputs.iter_mut() {
            if self.running {
                pwm.change_duty_cycle(value)?;
            } else {
                pwm.start(value)?;
            }
        }
        self.running = true;
        self.level = Some(value);
        debug!("{} -> {:.1}", self.id, value);
        Ok(())
    }

    fn start(&mut self, initial: Option<f64>) -> Result<(), DeviceError> {
        self.ensure_usable()?;
        let value = self.channel.clamp(initial.unwrap_or(self.default_level));
        for pwm in self.outputs.iter_mut() {
            pwm.start(value)?;
        }
        self.running = true;
        self.level = Some(value);
        info!("▶️ {} started at {:.1}", self.id, value);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), DeviceError> {
        if !self.running {
            return Ok(());
        }
        for pwm in self.outputs.iter_mut() {
            pwm.stop()?;
        }
        self.running = false;
        Ok(())
    }

    fn cleanup(&mut self) -> Result<(), DeviceError> {
        if self.released {
            return Ok(());
        }
        self.stop()?;

        let mut first_error = None;
        for pwm in self.outputs.iter_mut() {
            if let Err(e) = pwm.release() {
                warn!("⚠️ {}: failed to release pin {}: {}", self.id, pwm.pin(), e);
                first_error.get_or_insert(e);
            }
        }
        self.released = true;
        first_error.map_or(Ok(()), Err)
    }

    fn level(&self) -> Option<f64> {
        self.level
    }
}
