//! 专用工作线程：宿主线程只通过 StopFlag 与状态通道交互

use std::path::PathBuf;
use std::thread::{self, JoinHandle};

use log::error;

use super::analysis::{AnalysisReport, AnalysisScheduler, RunOutcome};
use super::error::SchedulerError;
use super::events::{EventSink, StatusEvent, StopFlag};
use super::live::{LivePlayback, LiveReport};
use crate::core::devices::MachineSet;
use crate::core::export::{ExportError, ScheduleExporter};
use crate::core::video::FrameSource;

pub struct WorkerHandle<T> {
    handle: JoinHandle<T>,
    stop: StopFlag,
}

impl<T> WorkerHandle<T> {
    pub fn stop_flag(&self) -> &StopFlag {
        &self.stop
    }

    pub fn request_stop(&self) {
        self.stop.request_stop();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub fn join(self) -> Result<T, SchedulerError> {
        self.handle.join().map_err(|_| SchedulerError::WorkerPanicked)
    }
}

pub struct AnalysisOutcome {
    pub report: AnalysisReport,
    /// Where the schedule was written, or why writing failed.
    pub export: Option<Result<PathBuf, ExportError>>,
    pub machines: Option<MachineSet>,
}

pub struct LiveOutcome {
    pub report: LiveReport,
    pub machines: MachineSet,
}

/// Runs an analysis on its own thread and exports the schedule to `output`
/// once the loop ends. A bad frame rate is reported here, before the thread starts.
pub fn spawn_analysis(
    mut scheduler: AnalysisScheduler,
    mut source: Box<dyn FrameSource>,
    mut machines: Option<MachineSet>,
    output: Option<PathBuf>,
    events: EventSink,
) -> Result<WorkerHandle<AnalysisOutcome>, SchedulerError> {
    let fps = scheduler.frame_rate(&*source)?;
    let stop = StopFlag::new();
    let worker_stop = stop.clone();

    let handle = thread::Builder::new()
        .name("analysis-worker".to_string())
        .spawn(move || {
            let report =
                scheduler.run_at(fps, source.as_mut(), machines.as_mut(), &worker_stop, &events);
            let frames = report.schedule.len();

            let export = output.map(|path| {
                ScheduleExporter::default()
                    .write(&report.schedule, &path)
                    .map(|()| path)
            });

            match (&export, report.outcome) {
                (Some(Err(e)), _) => {
                    error!("❌ Export failed: {}", e);
                    events.emit(StatusEvent::Failed {
                        message: e.to_string(),
                    });
                }
                (_, RunOutcome::Stopped) => events.emit(StatusEvent::Stopped { frames }),
                (written, RunOutcome::Completed) => events.emit(StatusEvent::Completed {
                    frames,
                    output: written.as_ref().and_then(|r| r.as_ref().ok().cloned()),
                }),
            }

            AnalysisOutcome {
                report,
                export,
                machines,
            }
        })?;

    Ok(WorkerHandle { handle, stop })
}

/// Runs live timeline playback on its own thread; the machines come back on join.
pub fn spawn_live(
    mut playback: LivePlayback,
    mut source: Option<Box<dyn FrameSource>>,
    mut machines: MachineSet,
    events: EventSink,
) -> Result<WorkerHandle<LiveOutcome>, SchedulerError> {
    let stop = StopFlag::new();
    let worker_stop = stop.clone();

    let handle = thread::Builder::new()
        .name("live-playback".to_string())
        .spawn(move || {
            let report = match source.as_mut() {
                Some(src) => playback.run(Some(src.as_mut()), &mut machines, &worker_stop, &events),
                None => playback.run(None, &mut machines, &worker_stop, &events),
            };
            LiveOutcome { report, machines }
        })?;

    Ok(WorkerHandle { handle, stop })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::scheduler::{AnalysisConfig, LiveConfig};
    use crate::core::devices::{Gpio, MachinesConfig, MockGpio, MockSensorConfig, SensorConfig};
    use crate::core::video::{Frame, MemorySource, VideoError};
    use std::sync::mpsc;

    fn create_scheduler() -> AnalysisScheduler {
        AnalysisScheduler::new(AnalysisConfig {
            threads: 1,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_analysis_worker_exports_schedule() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("black_controls.json");
        let source = MemorySource::solid(8, 8, [0, 0, 0], 5, 30.0).unwrap();
        let (tx, rx) = mpsc::channel();

        let worker = spawn_analysis(
            create_scheduler(),
            Box::new(source),
            None,
            Some(output.clone()),
            EventSink::new(tx),
        )
        .unwrap();
        let outcome = worker.join().unwrap();

        assert!(matches!(outcome.export, Some(Ok(_))));
        let schedule = ScheduleExporter::read(&output).unwrap();
        assert_eq!(schedule.metadata.frame_count, 5);
        assert_eq!(schedule.frame_metrics().len(), schedule.machine_controls().len());

        let last = rx.try_iter().last().unwrap();
        assert_eq!(
            last,
            StatusEvent::Completed {
                frames: 5,
                output: Some(output)
            }
        );
    }

    #[test]
    fn test_analysis_worker_reports_export_failure() {
        let dir = tempfile::tempdir().unwrap();
        let source = MemorySource::solid(4, 4, [0, 0, 0], 2, 30.0).unwrap();
        let (tx, rx) = mpsc::channel();

        let worker = spawn_analysis(
            create_scheduler(),
            Box::new(source),
            None,
            Some(dir.path().to_path_buf()),
            EventSink::new(tx),
        )
        .unwrap();
        let outcome = worker.join().unwrap();

        assert_eq!(outcome.report.schedule.len(), 2);
        assert!(matches!(outcome.export, Some(Err(ExportError::Io(_)))));
        assert!(matches!(rx.try_iter().last(), Some(StatusEvent::Failed { .. })));
    }

    #[test]
    fn test_live_worker_returns_machines() {
        let mock = MockGpio::new();
        let sensor = SensorConfig::Mock(MockSensorConfig {
            seed: Some(9),
            ..Default::default()
        });
        let machines =
            MachineSet::from_config(&MachinesConfig::default(), &Gpio::Mock(mock.clone()), &sensor)
                .unwrap();

        let worker = spawn_live(
            LivePlayback::new(LiveConfig::default()),
            None,
            machines,
            EventSink::none(),
        )
        .unwrap();
        worker.request_stop();
        let mut outcome = worker.join().unwrap();

        assert!(outcome.machines.cleanup_all().is_empty());
        assert!(mock.pwm_state(21).unwrap().released);
    }

    struct RatelessSource(MemorySource);

    impl FrameSource for RatelessSource {
        fn fps(&self) -> f64 {
            0.0
        }

        fn frame_count_hint(&self) -> Option<usize> {
            self.0.frame_count_hint()
        }

        fn next_frame(&mut self) -> Result<Option<Frame>, VideoError> {
            self.0.next_frame()
        }

        fn rewind(&mut self) -> Result<(), VideoError> {
            self.0.rewind()
        }

        fn descriptor(&self) -> String {
            self.0.descriptor()
        }
    }

    #[test]
    fn test_analysis_worker_rejects_zero_fps_synchronously() {
        let source = RatelessSource(MemorySource::solid(4, 4, [0, 0, 0], 2, 30.0).unwrap());
        let (tx, rx) = mpsc::channel();

        let result = spawn_analysis(
            create_scheduler(),
            Box::new(source),
            None,
            None,
            EventSink::new(tx),
        );

        assert!(matches!(
            result,
            Err(SchedulerError::Initialization(VideoError::InvalidFrameRate(_)))
        ));
        assert!(rx.try_iter().next().is_none());
    }
}
