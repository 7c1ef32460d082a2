//! 帧分析：运动、纹理（沙尘）、亮度与红色强度

pub mod metrics;
pub mod smoother;

pub use metrics::{analyze_frame, laplacian_variance, motion_score, FrameMetricExtractor, MetricsRecord};
pub use smoother::{MotionHistory, SavitzkyGolay, TemporalSmoother, MOTION_HISTORY_CAPACITY};
