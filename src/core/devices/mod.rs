pub mod ac_unit;
pub mod error;
pub mod gpio;
pub mod machines;
pub mod port;
pub mod pwm_device;
pub mod sensors;
pub mod speaker;
pub mod thermal;

pub use ac_unit::{AcConfig, AcUnit};
pub use error::DeviceError;
pub use gpio::{DigitalInput, Gpio, GpioConfig, MockGpio, PwmOutput};
pub use machines::{ActivationProfile, ApplyReport, MachineSet, MachinesConfig};
pub use port::{ActuatorPort, SensorPort};
pub use pwm_device::{FanConfig, HumidifierConfig, MistMakerConfig, PwmDevice, RedLightConfig};
pub use sensors::{MockSensorConfig, MockThermSensor, SensorConfig, W1SensorConfig, W1ThermSensor};
pub use speaker::{Speaker, SpeakerConfig};
pub use thermal::{SensorMonitor, TempControllerConfig, TemperatureController};
