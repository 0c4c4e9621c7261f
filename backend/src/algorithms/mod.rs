//! Pure geometry: geodesy primitives, polygons and the global tile grid.

pub mod geodesy;
pub mod polygon;
pub mod tile_grid;

pub use geodesy::{
    elevation_angle_degrees, haversine_distance_3d_km, haversine_distance_km, intersects,
    to_cartesian,
};
pub use polygon::{point_in_polygon, point_in_polygon_wrapped, regular_polygon};
pub use tile_grid::{choose_zoom_level, TileGridGenerator, MAX_GRID_ZOOM, MAX_ZOOM_LEVEL};
