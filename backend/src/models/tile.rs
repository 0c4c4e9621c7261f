use serde::{Deserialize, Serialize};

use super::geo::LatLong;
use crate::define_key_type;

define_key_type!(TileId);

/// Builds the synthetic quadkey of a tile: `"{zoom}-{lat}-{lon}"` with six decimals.
///
/// This is not the bit-interleaved Bing quadkey, just a stable textual key
/// derived from the zoom level and the tile centre.
pub fn quadkey(zoom_level: u8, center_lat: f64, center_lon: f64) -> TileId {
    TileId(format!("{}-{:.6}-{:.6}", zoom_level, center_lat, center_lon))
}

/// A ground cell approximated by a regular polygon around its centre.
///
/// Tiles are produced once by the grid generator and never mutated; the
/// quadkey doubles as the tile identity in storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tile {
    pub quadkey: TileId,
    pub zoom_level: u8,
    pub center_lat: f64,
    pub center_lon: f64,
    pub nb_faces: usize,
    /// Radius of the approximated circle, in meters.
    pub radius_m: f64,
    pub vertices: Vec<LatLong>,
}

impl Tile {
    pub fn id(&self) -> &TileId {
        &self.quadkey
    }

    pub fn center(&self) -> LatLong {
        LatLong::new(self.center_lat, self.center_lon)
    }

    pub fn radius_km(&self) -> f64 {
        self.radius_m / 1000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quadkey_format() {
        assert_eq!(quadkey(3, 12.5, -45.0).as_str(), "3-12.500000--45.000000");
        assert_eq!(quadkey(0, 0.0, 0.0).as_str(), "0-0.000000-0.000000");
    }
}
