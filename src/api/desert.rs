//! 沙漠环境：机器准备、启动预设、按时间线实时播放

use std::fmt;
use std::sync::mpsc::{self, Receiver};

use log::{info, warn};

use crate::core::config::EnvironmentConfig;
use crate::core::devices::{ApplyReport, DeviceError, Gpio, MachineSet};
use crate::core::scheduler::{
    spawn_live, EventSink, FramePresenter, LiveOutcome, LivePlayback, LiveReport, SchedulerError,
    StatusEvent, WorkerHandle,
};
use crate::core::video::FrameSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Ready,
    Active,
    Playing,
    Released,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Ready => "ready",
            SessionState::Active => "active",
            SessionState::Playing => "playing",
            SessionState::Released => "released",
        };
        f.write_str(name)
    }
}

/// 沙漠环境会话
///
/// ```ignore
/// let mut desert = DesertEnvironment::create(EnvironmentConfig::default());
/// desert.setup()?;
/// desert.activate()?;
/// let events = desert.play(Some(video), None)?;
/// // ...
/// desert.stop()?;
/// desert.cleanup();
/// ```
pub struct DesertEnvironment {
    config: EnvironmentConfig,
    state: SessionState,
    machines: Option<MachineSet>,
    worker: Option<WorkerHandle<LiveOutcome>>,
    last_report: Option<LiveReport>,
}

impl DesertEnvironment {
    pub fn create(config: EnvironmentConfig) -> Self {
        info!("🏜️ DesertEnvironment: created");
        Self {
            config,
            state: SessionState::Idle,
            machines: None,
            worker: None,
            last_report: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn last_report(&self) -> Option<LiveReport> {
        self.last_report
    }

    /// Opens every device on the configured GPIO and sensor backends.
    pub fn setup(&mut self) -> Result<(), SchedulerError> {
        self.expect_state("set up", &[SessionState::Idle])?;
        let gpio = Gpio::from_config(&self.config.gpio);
        let machines = MachineSet::from_config(&self.config.machines, &gpio, &self.config.sensor)?;
        self.setup_with(machines)
    }

    /// Uses an already assembled machine set.
    pub fn setup_with(&mut self, machines: MachineSet) -> Result<(), SchedulerError> {
        self.expect_state("set up", &[SessionState::Idle])?;
        self.machines = Some(machines);
        self.state = SessionState::Ready;
        Ok(())
    }

    /// Starts the machines at the configured activation profile.
    pub fn activate(&mut self) -> Result<ApplyReport, SchedulerError> {
        self.expect_state("activate", &[SessionState::Ready])?;
        let profile = self.config.activation.clone();
        let report = match self.machines.as_mut() {
            Some(machines) => machines.activate(&profile),
            None => ApplyReport::default(),
        };
        self.state = SessionState::Active;
        Ok(report)
    }

    /// Hands the machines to the live playback worker.
    pub fn play(
        &mut self,
        video: Option<Box<dyn FrameSource>>,
        presenter: Option<FramePresenter>,
    ) -> Result<Receiver<StatusEvent>, SchedulerError> {
        self.expect_state("play", &[SessionState::Active])?;
        let machines = self.machines.take().ok_or(SchedulerError::InvalidState {
            action: "play",
            state: "without machines".to_string(),
        })?;

        let mut playback = LivePlayback::new(self.config.live.clone());
        if let Some(presenter) = presenter {
            playback = playback.with_presenter(presenter);
        }

        let (tx, rx) = mpsc::channel();
        let worker = spawn_live(playback, video, machines, EventSink::new(tx))?;
        self.worker = Some(worker);
        self.state = SessionState::Playing;
        info!("▶️ Desert simulation playing");
        Ok(rx)
    }

    pub fn is_playing(&self) -> bool {
        self.worker.as_ref().is_some_and(|w| !w.is_finished())
    }

    /// Stops playback and takes the machines back. Machines stay active.
    pub fn stop(&mut self) -> Result<Option<LiveReport>, SchedulerError> {
        let Some(worker) = self.worker.take() else {
            return Ok(None);
        };
        worker.request_stop();
        let outcome = worker.join()?;
        self.machines = Some(outcome.machines);
        self.last_report = Some(outcome.report);
        self.state = SessionState::Active;
        info!("⏹️ Desert simulation stopped");
        Ok(Some(outcome.report))
    }

    pub fn machines(&self) -> Option<&MachineSet> {
        self.machines.as_ref()
    }

    pub fn machines_mut(&mut self) -> Option<&mut MachineSet> {
        self.machines.as_mut()
    }

    /// Stops playback if needed and releases every device.
    pub fn cleanup(&mut self) -> Vec<(String, DeviceError)> {
        if let Err(e) = self.stop() {
            warn!("⚠️ Playback did not stop cleanly: {}", e);
        }
        let failures = match self.machines.as_mut() {
            Some(machines) => machines.cleanup_all(),
            None => Vec::new(),
        };
        self.machines = None;
        self.state = SessionState::Released;
        failures
    }

    fn expect_state(
        &self,
        action: &'static str,
        allowed: &[SessionState],
    ) -> Result<(), SchedulerError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(SchedulerError::InvalidState {
                action,
                state: self.state.to_string(),
            })
        }
    }
}

impl Drop for DesertEnvironment {
    fn drop(&mut self) {
        if self.state != SessionState::Released {
            self.cleanup();
        }
        info!("🗑️ DesertEnvironment: released");
    }
}
