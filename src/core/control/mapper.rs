use crate::core::analysis::MetricsRecord;

use super::setpoint::MachineControls;

/// 指标 -> 机器控制量（分析器使用的连续映射）
#[derive(Debug, Clone, Copy)]
pub struct ContinuousMapper {
    pub temperature_base: f64,
    pub temperature_span: f64,
    pub humidity_floor: f64,
}

impl Default for ContinuousMapper {
    fn default() -> Self {
        Self {
            temperature_base: 35.0,
            temperature_span: 15.0,
            humidity_floor: 10.0,
        }
    }
}

impl ContinuousMapper {
    /// Temperature rises and humidity falls with `temperature_factor`.
    /// Outputs are not clamped here; the actuator boundary clamps.
    pub fn map(&self, metrics: &MetricsRecord) -> MachineControls {
        let factor = metrics.temperature_factor;
        MachineControls {
            timestamp: metrics.timestamp,
            fan_speed: metrics.wind_speed,
            mist_intensity: metrics.dust_level,
            red_light_intensity: metrics.red_intensity,
            temperature: self.temperature_base + factor * self.temperature_span,
            humidifier: (100.0 - factor * 90.0).max(self.humidity_floor),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics_with_factor(factor: f64) -> MetricsRecord {
        MetricsRecord {
            timestamp: 2.0,
            motion_intensity: 10.0,
            dust_level: 20.0,
            red_intensity: 30.0,
            brightness: 0.5,
            temperature_factor: factor,
            wind_speed: 12.0,
        }
    }

    #[test]
    fn test_pass_through_channels() {
        let controls = ContinuousMapper::default().map(&metrics_with_factor(0.2));
        assert_eq!(controls.timestamp, 2.0);
        assert_eq!(controls.fan_speed, 12.0);
        assert_eq!(controls.mist_intensity, 20.0);
        assert_eq!(controls.red_light_intensity, 30.0);
    }

    #[test]
    fn test_half_factor() {
        let controls = ContinuousMapper::default().map(&metrics_with_factor(0.5));
        assert!((controls.temperature - 42.5).abs() < 1e-9);
        assert!((controls.humidifier - 55.0).abs() < 1e-9);
    }

    #[test]
    fn test_full_factor_reaches_floor() {
        let controls = ContinuousMapper::default().map(&metrics_with_factor(1.0));
        assert!((controls.temperature - 50.0).abs() < 1e-9);
        assert!((controls.humidifier - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_factor_above_one_is_unclamped() {
        let controls = ContinuousMapper::default().map(&metrics_with_factor(1.2));
        assert!((controls.temperature - 53.0).abs() < 1e-9);
        assert_eq!(controls.humidifier, 10.0);
    }
}
