use image::GrayImage;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::smoother::{MotionHistory, SavitzkyGolay, TemporalSmoother};
use crate::core::video::Frame;

/// 单帧的视觉指标
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricsRecord {
    pub timestamp: f64,
    pub motion_intensity: f64,   // 0-100
    pub dust_level: f64,         // 0-100
    pub red_intensity: f64,      // 0-100
    pub brightness: f64,         // 0-1
    pub temperature_factor: f64, // nominally 0-1, not clamped
    pub wind_speed: f64,         // 0-100
}

/// Mean absolute luminance difference, scaled by 2.
pub fn motion_score(current: &GrayImage, previous: &GrayImage) -> f64 {
    if current.dimensions() != previous.dimensions() || current.as_raw().is_empty() {
        return 0.0;
    }

    let total: u64 = current
        .as_raw()
        .par_iter()
        .zip(previous.as_raw().par_iter())
        .map(|(&a, &b)| (a as i16 - b as i16).unsigned_abs() as u64)
        .sum();

    total as f64 / current.as_raw().len() as f64 * 2.0
}

/// Reflect-101 border: -1 -> 1, n -> n-2.
fn reflect(index: isize, len: usize) -> usize {
    let len = len as isize;
    if len == 1 {
        return 0;
    }
    let mut i = index;
    if i < 0 {
        i = -i;
    }
    if i >= len {
        i = 2 * (len - 1) - i;
    }
    i as usize
}

/// Population variance of the 4-neighbour Laplacian response.
pub fn laplacian_variance(gray: &GrayImage) -> f64 {
    let (w, h) = (gray.width() as usize, gray.height() as usize);
    if w == 0 || h == 0 {
        return 0.0;
    }
    let px = gray.as_raw();

    let (sum, sum_sq) = (0..h)
        .into_par_iter()
        .map(|y| {
            let up = reflect(y as isize - 1, h) * w;
            let down = reflect(y as isize + 1, h) * w;
            let row = y * w;
            let mut sum = 0.0f64;
            let mut sum_sq = 0.0f64;
            for x in 0..w {
                let left = reflect(x as isize - 1, w);
                let right = reflect(x as isize + 1, w);
                let lap = px[up + x] as f64 + px[down + x] as f64 + px[row + left] as f64
                    + px[row + right] as f64
                    - 4.0 * px[row + x] as f64;
                sum += lap;
                sum_sq += lap * lap;
            }
            (sum, sum_sq)
        })
        .reduce(|| (0.0, 0.0), |a, b| (a.0 + b.0, a.1 + b.1));

    let n = (w * h) as f64;
    let mean = sum / n;
    (sum_sq / n - mean * mean).max(0.0)
}

fn mean_luma(gray: &GrayImage) -> f64 {
    let raw = gray.as_raw();
    if raw.is_empty() {
        return 0.0;
    }
    raw.par_iter().map(|&v| v as u64).sum::<u64>() as f64 / raw.len() as f64
}

/// Analyzes one frame against the previous luminance image.
///
/// `motion` owns the motion history and is updated in place; callers pass the
/// same smoother across consecutive frames. Motion stays 0 until the history
/// has overflowed its capacity, then the smoothed newest sample is scaled by 2
/// and clamped. Returns the record and this frame's luminance image.
pub fn analyze_frame(
    frame: &Frame,
    previous_gray: Option<&GrayImage>,
    motion: &mut TemporalSmoother,
) -> (MetricsRecord, GrayImage) {
    let gray = frame.to_luma();

    let motion_intensity = previous_gray
        .and_then(|previous| motion.update(motion_score(&gray, previous)))
        .map(|smoothed| (smoothed * 2.0).clamp(0.0, 100.0))
        .unwrap_or(0.0);

    let dust_level = (laplacian_variance(&gray) / 100.0).clamp(0.0, 100.0);
    let brightness = mean_luma(&gray) / 255.0;
    let red_intensity = (frame.channel_mean(0) / 2.55).clamp(0.0, 100.0);
    let temperature_factor = 0.7 * brightness + 0.3 * (red_intensity / 100.0);
    let wind_speed = 0.8 * motion_intensity + 0.2 * dust_level;

    let record = MetricsRecord {
        timestamp: frame.timestamp_secs(),
        motion_intensity,
        dust_level,
        red_intensity,
        brightness,
        temperature_factor,
        wind_speed,
    };
    (record, gray)
}

/// 逐帧指标提取器，持有上一帧灰度图与运动历史
pub struct FrameMetricExtractor {
    previous_gray: Option<GrayImage>,
    motion: TemporalSmoother,
    frame_counter: u64,
}

impl FrameMetricExtractor {
    pub fn new() -> Self {
        Self::with_filter(MotionHistory::new(), SavitzkyGolay::default())
    }

    pub fn with_filter(motion_history: MotionHistory, filter: SavitzkyGolay) -> Self {
        Self {
            previous_gray: None,
            motion: TemporalSmoother::new(motion_history, filter),
            frame_counter: 0,
        }
    }

    pub fn extract(&mut self, frame: &Frame) -> MetricsRecord {
        let (record, gray) = analyze_frame(frame, self.previous_gray.as_ref(), &mut self.motion);
        self.previous_gray = Some(gray);
        self.frame_counter += 1;
        record
    }

    pub fn motion_history(&self) -> &MotionHistory {
        self.motion.history()
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_counter
    }

    /// Start of a new analysis run.
    pub fn reset(&mut self) {
        self.previous_gray = None;
        self.motion.reset();
        self.frame_counter = 0;
    }
}

impl Default for FrameMetricExtractor {
    fn default() -> Self {
        Self::new()
    }
}
