use thiserror::Error;

use crate::core::devices::DeviceError;
use crate::core::export::ExportError;
use crate::core::video::VideoError;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Failed to open video source: {0}")]
    Initialization(#[from] VideoError),
    #[error("Device setup failed: {0}")]
    Devices(#[from] DeviceError),
    #[error("Export failed: {0}")]
    Export(#[from] ExportError),
    #[error("Failed to build analysis thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
    #[error("Failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("Worker thread panicked")]
    WorkerPanicked,
    #[error("A worker is already running")]
    AlreadyRunning,
    #[error("Cannot {action} while {state}")]
    InvalidState { action: &'static str, state: String },
}
