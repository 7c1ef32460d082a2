use serde::{Deserialize, Serialize};

/// Device identifiers used by setpoints and the machine registry.
pub mod device_ids {
    pub const FAN: &str = "fan";
    pub const MIST: &str = "mist";
    pub const RED_LIGHT: &str = "red_light";
    pub const HUMIDIFIER: &str = "humidifier";
    pub const TEMP_CONTROLLER: &str = "temp_controller";
    pub const AC: &str = "ac";
    pub const SPEAKER: &str = "speaker";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Intensity,
    Power,
    Speed,
    Temperature,
}

impl Channel {
    /// Inclusive output range of the channel.
    pub fn bounds(self) -> (f64, f64) {
        match self {
            Channel::Intensity | Channel::Power | Channel::Speed => (0.0, 100.0),
            // °C, within what the Peltier rig can reach
            Channel::Temperature => (0.0, 100.0),
        }
    }

    pub fn clamp(self, value: f64) -> f64 {
        let (lo, hi) = self.bounds();
        if value.is_nan() {
            return lo;
        }
        value.clamp(lo, hi)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActuatorSetpoint {
    pub device_id: String,
    pub channel: Channel,
    pub value: f64,
}

impl ActuatorSetpoint {
    /// The value is clamped into the channel's bounds.
    pub fn new(device_id: impl Into<String>, channel: Channel, value: f64) -> Self {
        Self {
            device_id: device_id.into(),
            channel,
            value: channel.clamp(value),
        }
    }
}

/// 一帧的机器控制量（导出文件中 `machine_controls` 的一行）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MachineControls {
    pub timestamp: f64,
    pub fan_speed: f64,
    pub mist_intensity: f64,
    pub red_light_intensity: f64,
    pub temperature: f64,
    pub humidifier: f64,
}

impl MachineControls {
    pub fn setpoints(&self) -> Vec<ActuatorSetpoint> {
        vec![
            ActuatorSetpoint::new(device_ids::FAN, Channel::Speed, self.fan_speed),
            ActuatorSetpoint::new(device_ids::MIST, Channel::Intensity, self.mist_intensity),
            ActuatorSetpoint::new(
                device_ids::RED_LIGHT,
                Channel::Intensity,
                self.red_light_intensity,
            ),
            ActuatorSetpoint::new(
                device_ids::TEMP_CONTROLLER,
                Channel::Temperature,
                self.temperature,
            ),
            ActuatorSetpoint::new(device_ids::HUMIDIFIER, Channel::Intensity, self.humidifier),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setpoint_is_clamped() {
        assert_eq!(ActuatorSetpoint::new("fan", Channel::Speed, 140.0).value, 100.0);
        assert_eq!(ActuatorSetpoint::new("fan", Channel::Speed, -3.0).value, 0.0);
        assert_eq!(ActuatorSetpoint::new("fan", Channel::Speed, f64::NAN).value, 0.0);
    }

    #[test]
    fn test_controls_fan_out() {
        let controls = MachineControls {
            timestamp: 1.0,
            fan_speed: 12.0,
            mist_intensity: 3.0,
            red_light_intensity: 40.0,
            temperature: 42.5,
            humidifier: 55.0,
        };
        let setpoints = controls.setpoints();

        assert_eq!(setpoints.len(), 5);
        assert_eq!(setpoints[0].device_id, device_ids::FAN);
        assert_eq!(setpoints[3].channel, Channel::Temperature);
        assert_eq!(setpoints[3].value, 42.5);
    }

    #[test]
    fn test_channel_serializes_snake_case() {
        let json = serde_json::to_string(&Channel::Temperature).unwrap();
        assert_eq!(json, "\"temperature\"");
    }
}
