pub mod config;
pub mod error;
pub mod geometry;
pub mod monitor;
pub mod pipeline;
pub mod pose;
pub mod render;
pub mod tracker;

pub use config::Config;
pub use error::{ConfigError, TransformError};
pub use geometry::{compute_transform, CoordinateMapper, FitMode, MappedPose, TransformConfig, TransformMatrix};
pub use monitor::{PerformanceMonitor, PerformanceStats, Trend};
pub use pipeline::{FrameSnapshot, LatestSlot, OverlaySession, SuppressionSwitch};
pub use pose::{Landmark, LandmarkIndex, Pose};
pub use render::{Canvas, FrameBuffer, OverlayRenderer, RenderReport};
pub use tracker::{LandmarkSmoother, SubjectSmoothers};
