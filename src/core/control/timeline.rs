use super::setpoint::{device_ids, ActuatorSetpoint, Channel};

/// 撒哈拉脚本时间线的五个阶段，按播放时间切换，最后一个阶段一直保持
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimelineBand {
    Breeze,
    Sandstorm,
    SunsetBegins,
    FullSunset,
    Evening,
}

impl TimelineBand {
    pub const ALL: [TimelineBand; 5] = [
        TimelineBand::Breeze,
        TimelineBand::Sandstorm,
        TimelineBand::SunsetBegins,
        TimelineBand::FullSunset,
        TimelineBand::Evening,
    ];

    pub fn for_elapsed(elapsed_secs: f64) -> Self {
        let t = if elapsed_secs.is_nan() { 0.0 } else { elapsed_secs };
        if t < 60.0 {
            TimelineBand::Breeze
        } else if t < 120.0 {
            TimelineBand::Sandstorm
        } else if t < 180.0 {
            TimelineBand::SunsetBegins
        } else if t < 240.0 {
            TimelineBand::FullSunset
        } else {
            TimelineBand::Evening
        }
    }

    pub fn start_secs(self) -> f64 {
        match self {
            TimelineBand::Breeze => 0.0,
            TimelineBand::Sandstorm => 60.0,
            TimelineBand::SunsetBegins => 120.0,
            TimelineBand::FullSunset => 180.0,
            TimelineBand::Evening => 240.0,
        }
    }

    pub fn cue(self) -> TimelineCue {
        match self {
            TimelineBand::Breeze => TimelineCue {
                fan_speed: Some(30.0),
                mist_intensity: None,
                red_light_intensity: Some(0.0),
            },
            TimelineBand::Sandstorm => TimelineCue {
                fan_speed: Some(80.0),
                mist_intensity: Some(40.0),
                red_light_intensity: None,
            },
            TimelineBand::SunsetBegins => TimelineCue {
                fan_speed: Some(50.0),
                mist_intensity: Some(20.0),
                red_light_intensity: Some(50.0),
            },
            TimelineBand::FullSunset => TimelineCue {
                fan_speed: Some(30.0),
                mist_intensity: None,
                red_light_intensity: Some(100.0),
            },
            TimelineBand::Evening => TimelineCue {
                fan_speed: Some(20.0),
                mist_intensity: None,
                red_light_intensity: Some(70.0),
            },
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            TimelineBand::Breeze => "Light desert breeze",
            TimelineBand::Sandstorm => "Sandstorm simulation",
            TimelineBand::SunsetBegins => "Sunset beginning",
            TimelineBand::FullSunset => "Full sunset simulation",
            TimelineBand::Evening => "Evening desert conditions",
        }
    }
}

/// 一个阶段的设定值；`None` 表示保持上一次的命令值
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TimelineCue {
    pub fan_speed: Option<f64>,
    pub mist_intensity: Option<f64>,
    pub red_light_intensity: Option<f64>,
}

impl TimelineCue {
    pub fn setpoints(&self) -> Vec<ActuatorSetpoint> {
        let mut setpoints = Vec::with_capacity(3);
        if let Some(v) = self.fan_speed {
            setpoints.push(ActuatorSetpoint::new(device_ids::FAN, Channel::Speed, v));
        }
        if let Some(v) = self.mist_intensity {
            setpoints.push(ActuatorSetpoint::new(device_ids::MIST, Channel::Intensity, v));
        }
        if let Some(v) = self.red_light_intensity {
            setpoints.push(ActuatorSetpoint::new(
                device_ids::RED_LIGHT,
                Channel::Intensity,
                v,
            ));
        }
        setpoints
    }

    /// Overlays this cue on previously commanded levels.
    pub fn merged_over(&self, previous: &TimelineCue) -> TimelineCue {
        TimelineCue {
            fan_speed: self.fan_speed.or(previous.fan_speed),
            mist_intensity: self.mist_intensity.or(previous.mist_intensity),
            red_light_intensity: self.red_light_intensity.or(previous.red_light_intensity),
        }
    }
}

/// 时间线状态机：只在进入新阶段时给出设定值
#[derive(Debug, Default)]
pub struct TimelineMapper {
    current: Option<TimelineBand>,
    commanded: TimelineCue,
    transitions: u32,
}

impl TimelineMapper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pure step function from elapsed playback time to the band's cue.
    pub fn map(elapsed_secs: f64) -> TimelineCue {
        TimelineBand::for_elapsed(elapsed_secs).cue()
    }

    /// Returns the new band and its cue when `elapsed_secs` crosses into a
    /// band other than the current one.
    pub fn advance(&mut self, elapsed_secs: f64) -> Option<(TimelineBand, TimelineCue)> {
        let band = TimelineBand::for_elapsed(elapsed_secs);
        if self.current == Some(band) {
            return None;
        }

        let cue = band.cue();
        self.current = Some(band);
        self.commanded = cue.merged_over(&self.commanded);
        self.transitions += 1;
        Some((band, cue))
    }

    pub fn current_band(&self) -> Option<TimelineBand> {
        self.current
    }

    /// Last commanded level per channel, including values carried over from
    /// earlier bands.
    pub fn commanded(&self) -> TimelineCue {
        self.commanded
    }

    pub fn transition_count(&self) -> u32 {
        self.transitions
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
