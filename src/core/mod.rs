pub mod analysis;
pub mod config;
pub mod control;
pub mod devices;
pub mod export;
pub mod scheduler;
pub mod video;
