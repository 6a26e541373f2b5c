pub mod mapper;
pub mod transform;

pub use mapper::{CoordinateMapper, MappedPose, PixelLandmark};
pub use transform::{compute_transform, FitMode, TransformConfig, TransformMatrix};
