pub mod events;
pub mod geometry;
pub mod overlay;
pub mod session;
pub mod snapshot;
pub mod style;
pub mod surface;
pub mod viewer;
