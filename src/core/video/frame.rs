use std::time::Duration;

use image::{GrayImage, RgbImage};

use super::error::VideoError;

/// 帧数据结构
#[derive(Debug, Clone)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>, // RGB 格式
    pub timestamp: Duration,
    pub frame_number: u64,
}

impl Frame {
    pub fn new(
        width: u32,
        height: u32,
        data: Vec<u8>,
        timestamp: Duration,
        frame_number: u64,
    ) -> Result<Self, VideoError> {
        let expected = width as usize * height as usize * 3;
        if width == 0 || height == 0 || data.len() != expected {
            return Err(VideoError::FrameShape {
                width,
                height,
                len: data.len(),
            });
        }

        Ok(Self {
            width,
            height,
            data,
            timestamp,
            frame_number,
        })
    }

    /// 单色帧，主要用于合成视频
    pub fn solid(width: u32, height: u32, rgb: [u8; 3], frame_number: u64) -> Self {
        let pixels = width as usize * height as usize;
        let data = rgb.iter().copied().cycle().take(pixels * 3).collect();
        Self {
            width,
            height,
            data,
            timestamp: Duration::ZERO,
            frame_number,
        }
    }

    pub fn from_rgb_image(image: RgbImage, timestamp: Duration, frame_number: u64) -> Self {
        Self {
            width: image.width(),
            height: image.height(),
            data: image.into_raw(),
            timestamp,
            frame_number,
        }
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// 亮度通道 (ITU-R BT.601)，四舍五入到 u8
    pub fn to_luma(&self) -> GrayImage {
        let gray: Vec<u8> = self
            .data
            .chunks_exact(3)
            .map(|rgb| {
                let val = (rgb[0] as u32 * 299 + rgb[1] as u32 * 587 + rgb[2] as u32 * 114 + 500)
                    / 1000;
                val as u8
            })
            .collect();

        // Length is width * height by construction.
        GrayImage::from_raw(self.width, self.height, gray)
            .unwrap_or_else(|| GrayImage::new(self.width, self.height))
    }

    /// Mean of one colour channel (0 = R, 1 = G, 2 = B) in 0..=255.
    pub fn channel_mean(&self, channel: usize) -> f64 {
        if self.pixel_count() == 0 {
            return 0.0;
        }
        let sum: u64 = self
            .data
            .chunks_exact(3)
            .map(|rgb| rgb[channel.min(2)] as u64)
            .sum();
        sum as f64 / self.pixel_count() as f64
    }

    pub fn timestamp_secs(&self) -> f64 {
        self.timestamp.as_secs_f64()
    }
}
