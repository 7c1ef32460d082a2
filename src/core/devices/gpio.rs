//! GPIO 能力接口：PWM 输出与数字输入，Mock 与 Linux sysfs 两种实现

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use log::{debug, info};
use serde::Deserialize;

use super::error::DeviceError;

pub trait PwmOutput: Send {
    fn pin(&self) -> u32;
    /// Enables the output at `duty` percent.
    fn start(&mut self, duty: f64) -> Result<(), DeviceError>;
    fn change_duty_cycle(&mut self, duty: f64) -> Result<(), DeviceError>;
    fn stop(&mut self) -> Result<(), DeviceError>;
    /// Returns the pin to the system.
    fn release(&mut self) -> Result<(), DeviceError>;
}

pub trait DigitalInput: Send {
    fn pin(&self) -> u32;
    fn is_high(&self) -> Result<bool, DeviceError>;
}

fn clamp_duty(duty: f64) -> f64 {
    if duty.is_nan() {
        0.0
    } else {
        duty.clamp(0.0, 100.0)
    }
}

/// Which GPIO implementation to drive, chosen at startup.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GpioConfig {
    #[default]
    Mock,
    Sysfs {
        #[serde(default = "default_pwm_root")]
        pwm_root: PathBuf,
        #[serde(default = "default_gpio_root")]
        gpio_root: PathBuf,
        #[serde(default)]
        chip: u32,
    },
}

fn default_pwm_root() -> PathBuf {
    PathBuf::from("/sys/class/pwm")
}

fn default_gpio_root() -> PathBuf {
    PathBuf::from("/sys/class/gpio")
}

#[derive(Clone)]
pub enum Gpio {
    Mock(MockGpio),
    Sysfs(SysfsGpio),
}

impl Gpio {
    pub fn from_config(config: &GpioConfig) -> Self {
        match config {
            GpioConfig::Mock => {
                info!("🔌 Using mock GPIO for development");
                Gpio::Mock(MockGpio::new())
            }
            GpioConfig::Sysfs {
                pwm_root,
                gpio_root,
                chip,
            } => {
                info!("🔌 Using sysfs GPIO (pwmchip{})", chip);
                Gpio::Sysfs(SysfsGpio {
                    pwm_root: pwm_root.clone(),
                    gpio_root: gpio_root.clone(),
                    chip: *chip,
                })
            }
        }
    }

    pub fn open_pwm(&self, pin: u32, frequency_hz: u32) -> Result<Box<dyn PwmOutput>, DeviceError> {
        match self {
            Gpio::Mock(mock) => Ok(Box::new(mock.pwm(pin, frequency_hz))),
            Gpio::Sysfs(sysfs) => Ok(Box::new(sysfs.open_pwm(pin, frequency_hz)?)),
        }
    }

    pub fn open_input(&self, pin: u32) -> Result<Box<dyn DigitalInput>, DeviceError> {
        match self {
            Gpio::Mock(mock) => Ok(Box::new(mock.input(pin))),
            Gpio::Sysfs(sysfs) => Ok(Box::new(sysfs.open_input(pin)?)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MockPwmState {
    pub frequency_hz: u32,
    pub duty_cycle: f64,
    pub running: bool,
    pub released: bool,
}

#[derive(Default)]
struct MockPins {
    pwm: HashMap<u32, MockPwmState>,
    inputs: HashMap<u32, bool>,
}

/// 内存中的 GPIO，克隆共享同一份引脚状态，便于测试观察
#[derive(Clone, Default)]
pub struct MockGpio {
    pins: Arc<Mutex<MockPins>>,
}

impl MockGpio {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pwm(&self, pin: u32, frequency_hz: u32) -> MockPwm {
        if let Ok(mut pins) = self.pins.lock() {
            pins.pwm.insert(
                pin,
                MockPwmState {
                    frequency_hz,
                    ..Default::default()
                },
            );
        }
        MockPwm {
            pin,
            pins: Arc::clone(&self.pins),
        }
    }

    /// Inputs read high unless set otherwise.
    pub fn input(&self, pin: u32) -> MockInput {
        if let Ok(mut pins) = self.pins.lock() {
            pins.inputs.entry(pin).or_insert(true);
        }
        MockInput {
            pin,
            pins: Arc::clone(&self.pins),
        }
    }

    pub fn set_input(&self, pin: u32, high: bool) {
        if let Ok(mut pins) = self.pins.lock() {
            pins.inputs.insert(pin, high);
        }
    }

    pub fn pwm_state(&self, pin: u32) -> Option<MockPwmState> {
        self.pins.lock().ok().and_then(|pins| pins.pwm.get(&pin).copied())
    }

    pub fn duty_cycle(&self, pin: u32) -> Option<f64> {
        self.pwm_state(pin).map(|state| state.duty_cycle)
    }
}

pub struct MockPwm {
    pin: u32,
    pins: Arc<Mutex<MockPins>>,
}

impl MockPwm {
    fn update(&self, f: impl FnOnce(&mut MockPwmState)) -> Result<(), DeviceError> {
        let mut pins = self
            .pins
            .lock()
            .map_err(|_| DeviceError::Io(std::io::Error::other("mock GPIO lock poisoned")))?;
        let state = pins.pwm.entry(self.pin).or_default();
        f(state);
        Ok(())
    }
}

impl PwmOutput for MockPwm {
    fn pin(&self) -> u32 {
        self.pin
    }

    fn start(&mut self, duty: f64) -> Result<(), DeviceError> {
        let duty = clamp_duty(duty);
        debug!("PWM started on pin {} with duty cycle {:.1}", self.pin, duty);
        self.update(|s| {
            s.duty_cycle = duty;
            s.running = true;
        })
    }

    fn change_duty_cycle(&mut self, duty: f64) -> Result<(), DeviceError> {
        let duty = clamp_duty(duty);
        debug!("Changed duty cycle on pin {} to {:.1}", self.pin, duty);
        self.update(|s| s.duty_cycle = duty)
    }

    fn stop(&mut self) -> Result<(), DeviceError> {
        debug!("PWM stopped on pin {}", self.pin);
        self.update(|s| s.running = false)
    }

    fn release(&mut self) -> Result<(), DeviceError> {
        self.update(|s| {
            s.running = false;
            s.released = true;
        })
    }
}

pub struct MockInput {
    pin: u32,
    pins: Arc<Mutex<MockPins>>,
}

impl DigitalInput for MockInput {
    fn pin(&self) -> u32 {
        self.pin
    }

    fn is_high(&self) -> Result<bool, DeviceError> {
        let pins = self
            .pins
            .lock()
            .map_err(|_| DeviceError::Io(std::io::Error::other("mock GPIO lock poisoned")))?;
        Ok(pins.inputs.get(&self.pin).copied().unwrap_or(false))
    }
}

/// Linux sysfs PWM/GPIO. PWM channels are addressed by pin number on the
/// configured `pwmchip`.
#[derive(Debug, Clone)]
pub struct SysfsGpio {
    pub pwm_root: PathBuf,
    pub gpio_root: PathBuf,
    pub chip: u32,
}

impl SysfsGpio {
    pub fn open_pwm(&self, pin: u32, frequency_hz: u32) -> Result<SysfsPwm, DeviceError> {
        let chip_dir = self.pwm_root.join(format!("pwmchip{}", self.chip));
        let channel_dir = chip_dir.join(format!("pwm{}", pin));
        if !channel_dir.exists() {
            fs::write(chip_dir.join("export"), pin.to_string())?;
        }

        let period_ns = 1_000_000_000u64 / frequency_hz.max(1) as u64;
        write_attr(&channel_dir, "period", period_ns)?;

        Ok(SysfsPwm {
            pin,
            chip_dir,
            channel_dir,
            period_ns,
        })
    }

    pub fn open_input(&self, pin: u32) -> Result<SysfsInput, DeviceError> {
        let pin_dir = self.gpio_root.join(format!("gpio{}", pin));
        if !pin_dir.exists() {
            fs::write(self.gpio_root.join("export"), pin.to_string())?;
        }
        fs::write(pin_dir.join("direction"), "in")?;
        Ok(SysfsInput { pin, pin_dir })
    }
}

fn write_attr(dir: &Path, name: &str, value: impl ToString) -> Result<(), DeviceError> {
    fs::write(dir.join(name), value.to_string())?;
    Ok(())
}

pub struct SysfsPwm {
    pin: u32,
    chip_dir: PathBuf,
    channel_dir: PathBuf,
    period_ns: u64,
}

impl SysfsPwm {
    fn duty_ns(&self, duty: f64) -> u64 {
        (self.period_ns as f64 * clamp_duty(duty) / 100.0).round() as u64
    }
}

impl PwmOutput for SysfsPwm {
    fn pin(&self) -> u32 {
        self.pin
    }

    fn start(&mut self, duty: f64) -> Result<(), DeviceError> {
        write_attr(&self.channel_dir, "duty_cycle", self.duty_ns(duty))?;
        write_attr(&self.channel_dir, "enable", 1)
    }

    fn change_duty_cycle(&mut self, duty: f64) -> Result<(), DeviceError> {
        write_attr(&self.channel_dir, "duty_cycle", self.duty_ns(duty))
    }

    fn stop(&mut self) -> Result<(), DeviceError> {
        write_attr(&self.channel_dir, "enable", 0)
    }

    fn release(&mut self) -> Result<(), DeviceError> {
        self.stop()?;
        write_attr(&self.chip_dir, "unexport", self.pin)
    }
}

pub struct SysfsInput {
    pin: u32,
    pin_dir: PathBuf,
}

impl DigitalInput for SysfsInput {
    fn pin(&self) -> u32 {
        self.pin
    }

    fn is_high(&self) -> Result<bool, DeviceError> {
        let value = fs::read_to_string(self.pin_dir.join("value"))?;
        Ok(value.trim() == "1")
    }
}
