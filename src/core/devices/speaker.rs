use serde::Deserialize;

use super::error::DeviceError;
use super::port::ActuatorPort;
use crate::core::control::{device_ids, Channel};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SpeakerConfig {
    pub sample_rate: u32,
    pub channels: u16,
    /// 0-100
    pub volume: f64,
}

impl Default for SpeakerConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            channels: 2,
            volume: 100.0,
        }
    }
}

/// Volume channel of the I2S amplifier. Audio decoding and playback belong
/// to the host's audio sink; this port only carries the level.
pub struct Speaker {
    config: SpeakerConfig,
    volume: Option<f64>,
    released: bool,
}

impl Speaker {
    pub fn new(config: SpeakerConfig) -> Self {
        Self {
            config,
            volume: None,
            released: false,
        }
    }

    pub fn config(&self) -> &SpeakerConfig {
        &self.config
    }

    /// Gain in 0.0..=1.0 for the audio sink.
    pub fn gain(&self) -> f64 {
        self.volume.unwrap_or(0.0) / 100.0
    }
}

impl ActuatorPort for Speaker {
    fn id(&self) -> &str {
        device_ids::SPEAKER
    }

    fn channel(&self) -> Channel {
        Channel::Intensity
    }

    fn set_intensity(&mut self, value: f64) -> Result<(), DeviceError> {
        if self.released {
            return Err(DeviceError::Released(device_ids::SPEAKER.to_string()));
        }
        self.volume = Some(Channel::Intensity.clamp(value));
        Ok(())
    }

    fn start(&mut self, initial: Option<f64>) -> Result<(), DeviceError> {
        self.set_intensity(initial.unwrap_or(self.config.volume))
    }

    fn stop(&mut self) -> Result<(), DeviceError> {
        self.volume = Some(0.0);
        Ok(())
    }

    fn cleanup(&mut self) -> Result<(), DeviceError> {
        self.volume = None;
        self.released = true;
        Ok(())
    }

    fn level(&self) -> Option<f64> {
        self.volume
    }
}
