//! 实时同步播放：按播放时间驱动时间线状态机

use std::thread;
use std::time::{Duration, Instant};

use log::{info, warn};
use serde::Deserialize;

use super::events::{EventSink, StatusEvent, StopFlag};
use crate::core::control::{TimelineBand, TimelineMapper};
use crate::core::devices::MachineSet;
use crate::core::video::{Frame, FrameSource};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LiveConfig {
    pub tick_hz: f64,
    /// Rewind the video when it ends instead of finishing the session.
    pub loop_video: bool,
    /// Session length limit in wall-clock seconds.
    pub duration_secs: Option<f64>,
    /// Timeline seconds per wall-clock second.
    pub time_scale: f64,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            tick_hz: 30.0,
            loop_video: true,
            duration_secs: None,
            time_scale: 1.0,
        }
    }
}

/// Receives each video frame on the worker thread, e.g. to hand it to a display.
pub type FramePresenter = Box<dyn FnMut(&Frame) + Send>;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LiveReport {
    pub ticks: u64,
    pub frames_presented: u64,
    pub transitions: u32,
    pub final_band: Option<TimelineBand>,
    pub timeline_secs: f64,
}

pub struct LivePlayback {
    config: LiveConfig,
    timeline: TimelineMapper,
    presenter: Option<FramePresenter>,
}

impl LivePlayback {
    pub fn new(config: LiveConfig) -> Self {
        Self {
            config,
            timeline: TimelineMapper::new(),
            presenter: None,
        }
    }

    pub fn with_presenter(mut self, presenter: FramePresenter) -> Self {
        self.presenter = Some(presenter);
        self
    }

    pub fn timeline(&self) -> &TimelineMapper {
        &self.timeline
    }

    /// One control step at `elapsed_secs` of timeline time. Setpoints are
    /// written only when a new band is entered; the AC is regulated every step.
    pub fn tick(
        &mut self,
        elapsed_secs: f64,
        machines: &mut MachineSet,
        events: &EventSink,
    ) -> Option<TimelineBand> {
        let entered = self.timeline.advance(elapsed_secs).map(|(band, cue)| {
            info!("🏜️ {:.0}s: {}", elapsed_secs, band.description());
            machines.apply(&cue.setpoints());
            events.emit(StatusEvent::BandChanged {
                band,
                elapsed_secs,
            });
            band
        });
        machines.regulate_temperature();
        entered
    }

    /// Runs until `stop` is set, the duration limit passes, or a non-looping
    /// source ends.
    pub fn run(
        &mut self,
        mut source: Option<&mut dyn FrameSource>,
        machines: &mut MachineSet,
        stop: &StopFlag,
        events: &EventSink,
    ) -> LiveReport {
        let period = Duration::from_secs_f64(1.0 / self.config.tick_hz.max(1.0));
        let started_at = Instant::now();
        let mut next_tick = started_at;
        let mut ticks = 0u64;
        let mut frames_presented = 0u64;
        let mut timeline_secs = 0.0;

        self.timeline.reset();
        events.emit(StatusEvent::Started {
            source: source
                .as_ref()
                .map(|s| s.descriptor())
                .unwrap_or_else(|| "timeline".to_string()),
            total_frames: None,
        });
        info!("▶️ Live playback started at {:.0} Hz", self.config.tick_hz);

        loop {
            if stop.is_stop_requested() {
                break;
            }
            let wall = started_at.elapsed().as_secs_f64();
            if self.config.duration_secs.is_some_and(|limit| wall >= limit) {
                break;
            }

            timeline_secs = wall * self.config.time_scale;
            self.tick(timeline_secs, machines, events);
            ticks += 1;

            if let Some(src) = source.as_deref_mut() {
                match self.next_frame(src) {
                    Some(frame) => {
                        if let Some(presenter) = self.presenter.as_mut() {
                            presenter(&frame);
                        }
                        frames_presented += 1;
                    }
                    None => {
                        info!("🎬 Video finished after {} frames", frames_presented);
                        break;
                    }
                }
            }

            next_tick += period;
            if let Some(wait) = next_tick.checked_duration_since(Instant::now()) {
                thread::sleep(wait);
            }
        }

        let report = LiveReport {
            ticks,
            frames_presented,
            transitions: self.timeline.transition_count(),
            final_band: self.timeline.current_band(),
            timeline_secs,
        };
        events.emit(StatusEvent::Stopped {
            frames: frames_presented as usize,
        });
        info!("🛑 Live playback stopped: {:?}", report);
        report
    }

    /// Next frame, rewinding once at the end when looping. Decode failures
    /// count as the end of the stream.
    fn next_frame(&self, source: &mut dyn FrameSource) -> Option<Frame> {
        match source.next_frame() {
            Ok(Some(frame)) => return Some(frame),
            Ok(None) => {}
            Err(e) => warn!("⚠️ Decode failed during playback: {}", e),
        }
        if !self.config.loop_video {
            return None;
        }
        if let Err(e) = source.rewind() {
            warn!("⚠️ Rewind failed: {}", e);
            return None;
        }
        source.next_frame().ok().flatten()
    }
}
