use crate::core::control::Channel;

use super::error::DeviceError;

/// 单个执行器通道的统一接口
pub trait ActuatorPort: Send {
    fn id(&self) -> &str;

    fn channel(&self) -> Channel;

    /// Capability bounds of the output.
    fn bounds(&self) -> (f64, f64) {
        self.channel().bounds()
    }

    /// Sets the output level; implementations clamp into [`ActuatorPort::bounds`].
    fn set_intensity(&mut self, value: f64) -> Result<(), DeviceError>;

    /// Starts the device, at `initial` or its configured default level.
    fn start(&mut self, initial: Option<f64>) -> Result<(), DeviceError>;

    fn stop(&mut self) -> Result<(), DeviceError>;

    /// Releases the underlying resource. Idempotent and safe on a device
    /// that was never started.
    fn cleanup(&mut self) -> Result<(), DeviceError>;

    /// Last commanded level.
    fn level(&self) -> Option<f64>;
}

/// 标量传感器（温度）
pub trait SensorPort: Send {
    fn name(&self) -> &str;

    fn read(&mut self) -> Result<f64, DeviceError>;
}
