use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::core::analysis::MetricsRecord;
use crate::core::control::MachineControls;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleMetadata {
    pub source: String,
    pub generated_at: DateTime<Local>,
    pub frame_count: usize,
}

/// 逐帧指标与控制量，两个序列按帧下标一一对应
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlSchedule {
    pub metadata: ScheduleMetadata,
    frame_metrics: Vec<MetricsRecord>,
    machine_controls: Vec<MachineControls>,
}

impl ControlSchedule {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            metadata: ScheduleMetadata {
                source: source.into(),
                generated_at: Local::now(),
                frame_count: 0,
            },
            frame_metrics: Vec::new(),
            machine_controls: Vec::new(),
        }
    }

    /// Records one processed frame.
    pub fn push(&mut self, metrics: MetricsRecord, controls: MachineControls) {
        self.frame_metrics.push(metrics);
        self.machine_controls.push(controls);
        self.metadata.frame_count = self.frame_metrics.len();
    }

    /// Stamps the generation time; called once the run has ended.
    pub fn finish(&mut self) {
        self.metadata.generated_at = Local::now();
    }

    pub fn frame_metrics(&self) -> &[MetricsRecord] {
        &self.frame_metrics
    }

    pub fn machine_controls(&self) -> &[MachineControls] {
        &self.machine_controls
    }

    pub fn len(&self) -> usize {
        self.frame_metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frame_metrics.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&MetricsRecord, &MachineControls)> {
        self.frame_metrics.iter().zip(self.machine_controls.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::control::ContinuousMapper;

    fn create_test_metrics(timestamp: f64) -> MetricsRecord {
        MetricsRecord {
            timestamp,
            motion_intensity: 10.0,
            dust_level: 5.0,
            red_intensity: 40.0,
            brightness: 0.5,
            temperature_factor: 0.47,
            wind_speed: 9.0,
        }
    }

    #[test]
    fn test_push_keeps_sequences_aligned() {
        let mapper = ContinuousMapper::default();
        let mut schedule = ControlSchedule::new("synthetic");
        for i in 0..3 {
            let metrics = create_test_metrics(i as f64 / 30.0);
            schedule.push(metrics, mapper.map(&metrics));
        }

        assert_eq!(schedule.len(), 3);
        assert_eq!(schedule.metadata.frame_count, 3);
        assert_eq!(schedule.frame_metrics().len(), schedule.machine_controls().len());
        for (metrics, controls) in schedule.iter() {
            assert_eq!(metrics.timestamp, controls.timestamp);
        }
    }

    #[test]
    fn test_json_layout() {
        let mut schedule = ControlSchedule::new("clip.mp4");
        let metrics = create_test_metrics(0.0);
        schedule.push(metrics, ContinuousMapper::default().map(&metrics));

        let value = serde_json::to_value(&schedule).unwrap();
        assert_eq!(value["metadata"]["source"], "clip.mp4");
        assert_eq!(value["metadata"]["frame_count"], 1);
        assert!(value["metadata"]["generated_at"].is_string());
        assert_eq!(value["frame_metrics"][0]["wind_speed"], 9.0);
        assert_eq!(value["machine_controls"][0]["fan_speed"], 9.0);
        assert!(value["machine_controls"][0]["humidifier"].is_number());
    }
}
