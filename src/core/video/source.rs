//! 帧来源：解码在外部完成，这里只按顺序交付帧

use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{debug, info};

use super::error::VideoError;
use super::frame::Frame;

const IMAGE_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "bmp"];

pub trait FrameSource: Send {
    /// Native frame rate of the source.
    fn fps(&self) -> f64;

    /// Total frames if known up front.
    fn frame_count_hint(&self) -> Option<usize>;

    /// Next decoded frame, `Ok(None)` at end of stream.
    fn next_frame(&mut self) -> Result<Option<Frame>, VideoError>;

    /// Seek back to the first frame.
    fn rewind(&mut self) -> Result<(), VideoError>;

    /// Human-readable origin, recorded in exported metadata.
    fn descriptor(&self) -> String;
}

fn timestamp_for(index: usize, fps: f64) -> Duration {
    Duration::from_secs_f64(index as f64 / fps)
}

pub(crate) fn validate_fps(fps: f64) -> Result<f64, VideoError> {
    if fps.is_finite() && fps > 0.0 {
        Ok(fps)
    } else {
        Err(VideoError::InvalidFrameRate(fps))
    }
}

/// 内存帧序列（合成视频、测试）
pub struct MemorySource {
    name: String,
    frames: Vec<Frame>,
    fps: f64,
    cursor: usize,
    fail_at: Option<usize>,
}

impl MemorySource {
    pub fn new(name: impl Into<String>, frames: Vec<Frame>, fps: f64) -> Result<Self, VideoError> {
        let fps = validate_fps(fps)?;
        Ok(Self {
            name: name.into(),
            frames,
            fps,
            cursor: 0,
            fail_at: None,
        })
    }

    /// `count` identical solid-colour frames.
    pub fn solid(
        width: u32,
        height: u32,
        rgb: [u8; 3],
        count: usize,
        fps: f64,
    ) -> Result<Self, VideoError> {
        let frames = (0..count)
            .map(|i| Frame::solid(width, height, rgb, i as u64))
            .collect();
        Self::new(format!("synthetic:{}x{}", width, height), frames, fps)
    }

    /// Reading the frame at `index` reports a decode failure.
    pub fn with_failure_at(mut self, index: usize) -> Self {
        self.fail_at = Some(index);
        self
    }
}

impl FrameSource for MemorySource {
    fn fps(&self) -> f64 {
        self.fps
    }

    fn frame_count_hint(&self) -> Option<usize> {
        Some(self.frames.len())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>, VideoError> {
        if self.fail_at == Some(self.cursor) {
            return Err(VideoError::Decode(image::ImageError::IoError(
                std::io::Error::new(std::io::ErrorKind::InvalidData, "corrupt frame"),
            )));
        }

        let Some(frame) = self.frames.get(self.cursor) else {
            return Ok(None);
        };

        let mut frame = frame.clone();
        frame.timestamp = timestamp_for(self.cursor, self.fps);
        frame.frame_number = self.cursor as u64;
        self.cursor += 1;
        Ok(Some(frame))
    }

    fn rewind(&mut self) -> Result<(), VideoError> {
        self.cursor = 0;
        Ok(())
    }

    fn descriptor(&self) -> String {
        self.name.clone()
    }
}

/// 目录中的静态帧序列（例如 `ffmpeg -i in.mp4 frames/%06d.png` 的输出），按文件名排序
pub struct ImageSequenceSource {
    dir: PathBuf,
    paths: Vec<PathBuf>,
    fps: f64,
    cursor: usize,
}

impl ImageSequenceSource {
    pub fn open(dir: impl AsRef<Path>, fps: f64) -> Result<Self, VideoError> {
        let dir = dir.as_ref().to_path_buf();
        let fps = validate_fps(fps)?;

        let mut paths: Vec<PathBuf> = std::fs::read_dir(&dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
                    .unwrap_or(false)
            })
            .collect();
        paths.sort();

        if paths.is_empty() {
            return Err(VideoError::EmptySource(dir.display().to_string()));
        }

        // 先解码首帧，确保来源可读
        image::open(&paths[0])?;

        info!(
            "🎬 ImageSequenceSource: {} frames at {:.2} fps from {:?}",
            paths.len(),
            fps,
            dir
        );
        Ok(Self {
            dir,
            paths,
            fps,
            cursor: 0,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl FrameSource for ImageSequenceSource {
    fn fps(&self) -> f64 {
        self.fps
    }

    fn frame_count_hint(&self) -> Option<usize> {
        Some(self.paths.len())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>, VideoError> {
        let Some(path) = self.paths.get(self.cursor) else {
            return Ok(None);
        };

        debug!("Decoding frame {} from {:?}", self.cursor, path);
        let image = image::open(path)?.to_rgb8();
        let frame = Frame::from_rgb_image(
            image,
            timestamp_for(self.cursor, self.fps),
            self.cursor as u64,
        );
        self.cursor += 1;
        Ok(Some(frame))
    }

    fn rewind(&mut self) -> Result<(), VideoError> {
        self.cursor = 0;
        Ok(())
    }

    fn descriptor(&self) -> String {
        self.dir.display().to_string()
    }
}
