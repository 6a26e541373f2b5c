pub mod one_euro;
pub mod smoother;

pub use one_euro::{FilterState, OneEuroFilter, StepKind};
pub use smoother::{Axis, ChannelKey, LandmarkSmoother, SubjectSmoothers};
