pub mod canvas;
pub mod overlay;
pub mod skeleton;
#[cfg(feature = "desktop")]
pub mod window;

pub use canvas::{Canvas, FrameBuffer};
pub use overlay::{OverlayRenderer, RenderReport};
pub use skeleton::{SkeletonEdge, SKELETON_EDGES};
#[cfg(feature = "desktop")]
pub use minifb::Key;
#[cfg(feature = "desktop")]
pub use window::MinifbWindow;
