pub mod error;
pub mod frame;
pub mod source;

pub use error::VideoError;
pub use frame::Frame;
pub use source::{FrameSource, ImageSequenceSource, MemorySource};
