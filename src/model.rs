pub mod stage;
pub mod window;

pub use stage::{ActorId, Stage};
pub use window::{Window, WindowId};
