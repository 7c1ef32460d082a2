//! 环境分析器：分析视频并导出机器控制计划

use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver};

use log::{error, info, warn};

use crate::core::config::EnvironmentConfig;
use crate::core::devices::{DeviceError, Gpio, MachineSet};
use crate::core::export::{default_output_path, ControlSchedule, ScheduleExporter};
use crate::core::scheduler::{
    spawn_analysis, AnalysisOutcome, AnalysisScheduler, EventSink, SchedulerError, StatusEvent,
    StopFlag, WorkerHandle,
};
use crate::core::video::{FrameSource, ImageSequenceSource};

/// Frame rate assumed for an image sequence when the config gives none.
pub const DEFAULT_SEQUENCE_FPS: f64 = 30.0;

/// 视频分析器 - 在后台线程逐帧分析，完成后导出 JSON
///
/// ```ignore
/// let mut analyzer = EnvironmentAnalyzer::create(EnvironmentConfig::default());
/// let events = analyzer.start("frames/", None)?;
/// for event in events { println!("{:?}", event); }
/// let outcome = analyzer.wait()?;
/// ```
pub struct EnvironmentAnalyzer {
    config: EnvironmentConfig,
    machines: Option<MachineSet>,
    worker: Option<WorkerHandle<AnalysisOutcome>>,
}

impl EnvironmentAnalyzer {
    pub fn create(config: EnvironmentConfig) -> Self {
        info!("🔬 EnvironmentAnalyzer: created");
        Self {
            config,
            machines: None,
            worker: None,
        }
    }

    /// Machines that follow the analysis live. Without them the run only
    /// produces the schedule.
    pub fn with_machines(mut self, machines: MachineSet) -> Self {
        self.machines = Some(machines);
        self
    }

    pub fn config(&self) -> &EnvironmentConfig {
        &self.config
    }

    /// Opens the configured machines so later runs drive them.
    pub fn setup_machines(&mut self) -> Result<(), SchedulerError> {
        let gpio = Gpio::from_config(&self.config.gpio);
        self.setup_machines_on(&gpio)
    }

    pub fn setup_machines_on(&mut self, gpio: &Gpio) -> Result<(), SchedulerError> {
        if self.worker.is_some() {
            return Err(SchedulerError::InvalidState {
                action: "set up machines",
                state: "analysing".to_string(),
            });
        }
        if self.machines.is_some() {
            return Ok(());
        }
        let machines = MachineSet::from_config(&self.config.machines, gpio, &self.config.sensor)?;
        info!("🔧 Machines ready: {}", machines.ids().join(", "));
        self.machines = Some(machines);
        Ok(())
    }

    /// Releases every machine. A running analysis keeps its machines until `wait`.
    pub fn cleanup_machines(&mut self) -> Vec<(String, DeviceError)> {
        let Some(mut machines) = self.machines.take() else {
            return Vec::new();
        };
        let failures = machines.cleanup_all();
        for (id, e) in &failures {
            warn!("⚠️ Cleanup of {} failed: {}", id, e);
        }
        failures
    }

    /// Opens a frame directory. Failure here is the initialization error:
    /// nothing has been scheduled yet.
    pub fn open_source(&self, path: &Path) -> Result<Box<dyn FrameSource>, SchedulerError> {
        let fps = self.config.analysis.fps_override.unwrap_or(DEFAULT_SEQUENCE_FPS);
        match ImageSequenceSource::open(path, fps) {
            Ok(source) => Ok(Box::new(source)),
            Err(e) => {
                error!("❌ Could not open {:?}: {}", path, e);
                Err(SchedulerError::Initialization(e))
            }
        }
    }

    /// Starts analysing `source` on a worker thread. The schedule is written
    /// to `output`, or next to the source when `None`.
    pub fn start(
        &mut self,
        source: impl AsRef<Path>,
        output: Option<PathBuf>,
    ) -> Result<Receiver<StatusEvent>, SchedulerError> {
        let source_path = source.as_ref();
        let output = output.unwrap_or_else(|| default_output_path(source_path));
        let frames = self.open_source(source_path)?;
        self.start_with_source(frames, Some(output))
    }

    pub fn start_with_source(
        &mut self,
        source: Box<dyn FrameSource>,
        output: Option<PathBuf>,
    ) -> Result<Receiver<StatusEvent>, SchedulerError> {
        if self.is_running() {
            return Err(SchedulerError::AlreadyRunning);
        }

        let scheduler = AnalysisScheduler::new(self.config.analysis.clone())?;
        let (tx, rx) = mpsc::channel();
        let worker = spawn_analysis(
            scheduler,
            source,
            self.machines.take(),
            output,
            EventSink::new(tx),
        )?;
        self.worker = Some(worker);
        Ok(rx)
    }

    pub fn is_running(&self) -> bool {
        self.worker.as_ref().is_some_and(|w| !w.is_finished())
    }

    pub fn stop_flag(&self) -> Option<StopFlag> {
        self.worker.as_ref().map(|w| w.stop_flag().clone())
    }

    pub fn stop(&self) {
        if let Some(worker) = &self.worker {
            info!("⏹️ Stop requested");
            worker.request_stop();
        }
    }

    /// Joins the worker. Machines lent to the run are taken back.
    pub fn wait(&mut self) -> Result<AnalysisOutcome, SchedulerError> {
        let worker = self.worker.take().ok_or(SchedulerError::InvalidState {
            action: "wait",
            state: "idle".to_string(),
        })?;
        let mut outcome = worker.join()?;
        self.machines = outcome.machines.take();
        Ok(outcome)
    }

    /// Runs to completion on the calling thread and writes the schedule.
    pub fn analyze_to_file(
        &mut self,
        source: &Path,
        output: &Path,
    ) -> Result<ControlSchedule, SchedulerError> {
        let mut frames = self.open_source(source)?;
        let mut scheduler = AnalysisScheduler::new(self.config.analysis.clone())?;
        let report = scheduler.run(
            frames.as_mut(),
            self.machines.as_mut(),
            &StopFlag::new(),
            &EventSink::none(),
        )?;
        ScheduleExporter::default().write(&report.schedule, output)?;
        Ok(report.schedule)
    }

    pub fn machines_mut(&mut self) -> Option<&mut MachineSet> {
        self.machines.as_mut()
    }
}

impl Drop for EnvironmentAnalyzer {
    fn drop(&mut self) {
        self.stop();
        if let Some(worker) = self.worker.take() {
            if let Ok(outcome) = worker.join() {
                if outcome.machines.is_some() {
                    self.machines = outcome.machines;
                }
            }
        }
        self.cleanup_machines();
        info!("🗑️ EnvironmentAnalyzer: released");
    }
}
