//! 调度：分析循环与实时播放，均在专用工作线程上运行

pub mod analysis;
pub mod error;
pub mod events;
pub mod live;
pub mod worker;

pub use analysis::{AnalysisConfig, AnalysisReport, AnalysisScheduler, RunOutcome};
pub use error::SchedulerError;
pub use events::{EventSink, StatusEvent, StopFlag};
pub use live::{FramePresenter, LiveConfig, LivePlayback, LiveReport};
pub use worker::{spawn_analysis, spawn_live, AnalysisOutcome, LiveOutcome, WorkerHandle};
