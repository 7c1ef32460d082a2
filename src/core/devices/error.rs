use thiserror::Error;

use crate::core::control::Channel;

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Device {0} has been released")]
    Released(String),
    #[error("Device {device} interlock: {reason}")]
    Interlock { device: String, reason: String },
    #[error("Sensor read failed: {0}")]
    SensorRead(String),
    #[error("Device {device} drives {expected:?}, got a {got:?} setpoint")]
    ChannelMismatch {
        device: String,
        expected: Channel,
        got: Channel,
    },
    #[error("Parse error: {0}")]
    Parse(String),
}
