pub mod geo;
pub mod macros;
pub mod mapping;
pub mod satellite;
pub mod tile;
pub mod tle;
pub mod visibility;

pub use geo::*;
pub use mapping::*;
pub use satellite::*;
pub use tile::*;
pub use tle::*;
pub use visibility::*;
