pub mod geometry;
pub mod host;
pub mod timer;
