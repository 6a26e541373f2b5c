pub mod latest;
pub mod session;

pub use latest::LatestSlot;
pub use session::{FrameSnapshot, OverlaySession, SuppressionSwitch};
