pub mod landmark;

pub use landmark::{Landmark, LandmarkIndex, Pose, TrackId};
