use thiserror::Error;

#[derive(Debug, Error)]
pub enum VideoError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Frame decode error: {0}")]
    Decode(#[from] image::ImageError),
    #[error("No frames found in source: {0}")]
    EmptySource(String),
    #[error("Invalid frame rate: {0}")]
    InvalidFrameRate(f64),
    #[error("Frame buffer of {len} bytes does not match {width}x{height} RGB")]
    FrameShape { width: u32, height: u32, len: usize },
}
