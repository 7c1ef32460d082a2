//! 控制计划导出（JSON）

pub mod error;
pub mod exporter;
pub mod schedule;

pub use error::ExportError;
pub use exporter::{default_output_path, ScheduleExporter};
pub use schedule::{ControlSchedule, ScheduleMetadata};
