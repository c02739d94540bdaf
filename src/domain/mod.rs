pub mod geometry;
pub mod network;

pub use geometry::*;
pub use network::*;
