//! 视频文件分析：逐帧提取指标并映射为机器控制量

use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use serde::Deserialize;

use super::error::SchedulerError;
use super::events::{EventSink, StatusEvent, StopFlag};
use crate::core::analysis::FrameMetricExtractor;
use crate::core::control::ContinuousMapper;
use crate::core::devices::MachineSet;
use crate::core::export::ControlSchedule;
use crate::core::video::source::validate_fps;
use crate::core::video::FrameSource;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Emit a progress event every this many frames; 0 disables.
    pub progress_interval: usize,
    /// Replaces the source's own frame rate when set.
    pub fps_override: Option<f64>,
    /// Hold each frame until its timestamp, as during playback.
    pub pace_to_fps: bool,
    /// Worker threads for per-frame image work.
    pub threads: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            progress_interval: 30,
            fps_override: None,
            pace_to_fps: false,
            threads: num_cpus::get().min(4),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Source reached its end (or failed to decode mid-run).
    Completed,
    /// The stop flag was observed.
    Stopped,
}

#[derive(Debug)]
pub struct AnalysisReport {
    pub schedule: ControlSchedule,
    pub outcome: RunOutcome,
    /// Decode failure that ended the run early, if any.
    pub decode_error: Option<String>,
}

pub struct AnalysisScheduler {
    config: AnalysisConfig,
    extractor: FrameMetricExtractor,
    mapper: ContinuousMapper,
    pool: rayon::ThreadPool,
}

impl AnalysisScheduler {
    pub fn new(config: AnalysisConfig) -> Result<Self, SchedulerError> {
        if let Some(fps) = config.fps_override {
            validate_fps(fps)?;
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.threads.max(1))
            .thread_name(|i| format!("analysis-{}", i))
            .build()?;

        Ok(Self {
            config,
            extractor: FrameMetricExtractor::new(),
            mapper: ContinuousMapper::default(),
            pool,
        })
    }

    pub fn with_mapper(mut self, mapper: ContinuousMapper) -> Self {
        self.mapper = mapper;
        self
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Frame rate used for timestamps: the override, else the source's own.
    pub fn frame_rate(&self, source: &dyn FrameSource) -> Result<f64, SchedulerError> {
        let fps = self.config.fps_override.unwrap_or_else(|| source.fps());
        Ok(validate_fps(fps)?)
    }

    /// Processes frames in order until the source ends or `stop` is set.
    /// Setpoints go to `machines` best-effort; the returned schedule always
    /// holds one metrics record and one controls row per processed frame.
    /// An unusable frame rate fails before any frame is read.
    pub fn run(
        &mut self,
        source: &mut dyn FrameSource,
        machines: Option<&mut MachineSet>,
        stop: &StopFlag,
        events: &EventSink,
    ) -> Result<AnalysisReport, SchedulerError> {
        let fps = self.frame_rate(&*source)?;
        Ok(self.run_at(fps, source, machines, stop, events))
    }

    /// `fps` must already have passed [`Self::frame_rate`].
    pub(crate) fn run_at(
        &mut self,
        fps: f64,
        source: &mut dyn FrameSource,
        mut machines: Option<&mut MachineSet>,
        stop: &StopFlag,
        events: &EventSink,
    ) -> AnalysisReport {
        let total = source.frame_count_hint();
        let descriptor = source.descriptor();

        info!("🎬 Analysis started: {} ({:.2} fps, {:?} frames)", descriptor, fps, total);
        events.emit(StatusEvent::Started {
            source: descriptor.clone(),
            total_frames: total,
        });

        self.extractor.reset();
        let mut schedule = ControlSchedule::new(descriptor);
        let mut decode_error = None;
        let started_at = Instant::now();

        let outcome = loop {
            if stop.is_stop_requested() {
                break RunOutcome::Stopped;
            }

            let mut frame = match source.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => break RunOutcome::Completed,
                Err(e) => {
                    warn!(
                        "⚠️ Decode failed at frame {}, ending run: {}",
                        schedule.len(),
                        e
                    );
                    decode_error = Some(e.to_string());
                    break RunOutcome::Completed;
                }
            };

            let index = schedule.len();
            let timestamp = index as f64 / fps;
            frame.timestamp = Duration::from_secs_f64(timestamp);

            if self.config.pace_to_fps {
                let due = Duration::from_secs_f64(timestamp);
                if let Some(wait) = due.checked_sub(started_at.elapsed()) {
                    thread::sleep(wait);
                }
            }

            let extractor = &mut self.extractor;
            let metrics = self.pool.install(|| extractor.extract(&frame));
            let controls = self.mapper.map(&metrics);

            if let Some(machines) = machines.as_deref_mut() {
                machines.apply(&controls.setpoints());
                machines.regulate_temperature();
            }

            debug!(
                "frame {} @ {:.3}s: wind {:.1}, dust {:.1}, temp {:.1}",
                index, timestamp, controls.fan_speed, controls.mist_intensity, controls.temperature
            );
            schedule.push(metrics, controls);

            let processed = schedule.len();
            if self.config.progress_interval > 0 && processed % self.config.progress_interval == 0 {
                info!("📊 Processed {} frames", processed);
                events.emit(StatusEvent::Progress {
                    frames: processed,
                    total_frames: total,
                });
            }
        };

        schedule.finish();
        info!(
            "✅ Analysis {:?} after {} frames in {:.2}s",
            outcome,
            schedule.len(),
            started_at.elapsed().as_secs_f64()
        );

        AnalysisReport {
            schedule,
            outcome,
            decode_error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::devices::{Gpio, MachinesConfig, MockGpio, MockSensorConfig, SensorConfig};
    use crate::core::video::{Frame, MemorySource, VideoError};
    use std::sync::mpsc;

    fn create_scheduler() -> AnalysisScheduler {
        AnalysisScheduler::new(AnalysisConfig {
            threads: 2,
            ..Default::default()
        })
        .unwrap()
    }

    /// Sets the stop flag once `after` frames have been handed out.
    struct StoppingSource {
        inner: MemorySource,
        served: usize,
        after: usize,
        stop: StopFlag,
    }

    impl FrameSource for StoppingSource {
        fn fps(&self) -> f64 {
            self.inner.fps()
        }

        fn frame_count_hint(&self) -> Option<usize> {
            self.inner.frame_count_hint()
        }

        fn next_frame(&mut self) -> Result<Option<Frame>, VideoError> {
            let frame = self.inner.next_frame()?;
            self.served += 1;
            if self.served == self.after {
                self.stop.request_stop();
            }
            Ok(frame)
        }

        fn rewind(&mut self) -> Result<(), VideoError> {
            self.inner.rewind()
        }

        fn descriptor(&self) -> String {
            self.inner.descriptor()
        }
    }

    #[test]
    fn test_black_video_end_to_end() {
        let mut source = MemorySource::solid(16, 16, [0, 0, 0], 5, 30.0).unwrap();
        let report = create_scheduler()
            .run(&mut source, None, &StopFlag::new(), &EventSink::none())
            .unwrap();

        assert_eq!(report.outcome, RunOutcome::Completed);
        assert_eq!(report.schedule.metadata.frame_count, 5);
        assert_eq!(report.schedule.machine_controls().len(), 5);
        for (i, metrics) in report.schedule.frame_metrics().iter().enumerate() {
            assert!((metrics.timestamp - i as f64 / 30.0).abs() < 1e-9);
            assert_eq!(metrics.motion_intensity, 0.0);
            assert_eq!(metrics.dust_level, 0.0);
            assert_eq!(metrics.brightness, 0.0);
            assert_eq!(metrics.red_intensity, 0.0);
        }
    }

    #[test]
    fn test_stop_flag_halts_before_next_frame() {
        let stop = StopFlag::new();
        let mut source = StoppingSource {
            inner: MemorySource::solid(8, 8, [10, 20, 30], 50, 30.0).unwrap(),
            served: 0,
            after: 7,
            stop: stop.clone(),
        };

        let report = create_scheduler()
            .run(&mut source, None, &stop, &EventSink::none())
            .unwrap();

        assert_eq!(report.outcome, RunOutcome::Stopped);
        assert_eq!(report.schedule.len(), 7);
        assert_eq!(source.served, 7);
    }

    #[test]
    fn test_decode_failure_is_end_of_stream() {
        let mut source = MemorySource::solid(8, 8, [255, 0, 0], 10, 25.0)
            .unwrap()
            .with_failure_at(4);

        let report = create_scheduler()
            .run(&mut source, None, &StopFlag::new(), &EventSink::none())
            .unwrap();

        assert_eq!(report.outcome, RunOutcome::Completed);
        assert_eq!(report.schedule.len(), 4);
        assert!(report.decode_error.is_some());
        assert_eq!(report.schedule.frame_metrics()[0].red_intensity, 100.0);
    }

    #[test]
    fn test_progress_events_and_fps_override() {
        let (tx, rx) = mpsc::channel();
        let mut scheduler = AnalysisScheduler::new(AnalysisConfig {
            progress_interval: 2,
            fps_override: Some(10.0),
            threads: 1,
            ..Default::default()
        })
        .unwrap();
        let mut source = MemorySource::solid(4, 4, [9, 9, 9], 5, 30.0).unwrap();

        let report = scheduler
            .run(&mut source, None, &StopFlag::new(), &EventSink::new(tx))
            .unwrap();
        let events: Vec<StatusEvent> = rx.try_iter().collect();

        assert!(matches!(events[0], StatusEvent::Started { total_frames: Some(5), .. }));
        let progress = events
            .iter()
            .filter(|e| matches!(e, StatusEvent::Progress { .. }))
            .count();
        assert_eq!(progress, 2);
        assert!((report.schedule.frame_metrics()[4].timestamp - 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_setpoints_reach_machines() {
        let mock = MockGpio::new();
        let sensor = SensorConfig::Mock(MockSensorConfig {
            seed: Some(11),
            ..Default::default()
        });
        let mut machines =
            MachineSet::from_config(&MachinesConfig::default(), &Gpio::Mock(mock.clone()), &sensor)
                .unwrap();
        let mut source = MemorySource::solid(8, 8, [255, 0, 0], 3, 30.0).unwrap();

        let report = create_scheduler().run(
            &mut source,
            Some(&mut machines),
            &StopFlag::new(),
            &EventSink::none(),
        )
        .unwrap();

        assert_eq!(report.schedule.len(), 3);
        // Red LEDs follow the frame's red channel.
        for pin in [12, 16, 20] {
            assert_eq!(mock.duty_cycle(pin), Some(100.0));
        }
        // Solid frames have no texture.
        assert_eq!(mock.duty_cycle(24), Some(0.0));
        machines.cleanup_all();
    }

    /// Reports a fixed frame rate, whatever the frames say.
    struct FixedRateSource {
        inner: MemorySource,
        fps: f64,
    }

    impl FrameSource for FixedRateSource {
        fn fps(&self) -> f64 {
            self.fps
        }

        fn frame_count_hint(&self) -> Option<usize> {
            self.inner.frame_count_hint()
        }

        fn next_frame(&mut self) -> Result<Option<Frame>, VideoError> {
            self.inner.next_frame()
        }

        fn rewind(&mut self) -> Result<(), VideoError> {
            self.inner.rewind()
        }

        fn descriptor(&self) -> String {
            self.inner.descriptor()
        }
    }

    #[test]
    fn test_zero_fps_override_is_rejected() {
        let result = AnalysisScheduler::new(AnalysisConfig {
            fps_override: Some(0.0),
            threads: 1,
            ..Default::default()
        });
        assert!(matches!(
            result,
            Err(SchedulerError::Initialization(VideoError::InvalidFrameRate(_)))
        ));
    }

    #[test]
    fn test_bad_source_fps_fails_before_first_frame() {
        for fps in [0.0, f64::NAN, f64::INFINITY] {
            let (tx, rx) = mpsc::channel();
            let mut source = FixedRateSource {
                inner: MemorySource::solid(4, 4, [1, 1, 1], 3, 30.0).unwrap(),
                fps,
            };

            let result =
                create_scheduler().run(&mut source, None, &StopFlag::new(), &EventSink::new(tx));

            assert!(matches!(
                result,
                Err(SchedulerError::Initialization(VideoError::InvalidFrameRate(_)))
            ));
            assert!(rx.try_iter().next().is_none());
            // Nothing was consumed.
            assert_eq!(source.next_frame().unwrap().unwrap().frame_number, 0);
        }
    }
}
