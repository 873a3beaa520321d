//! Slippy-map basemap tiles covering a viewport

use crate::{Viewport, utils};
use serde::{Deserialize, Serialize};

/// Highest zoom the public tile servers provide
pub const MAX_TILE_ZOOM: u8 = 18;

/// A `{z}/{x}/{y}` tile address
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TileKey {
    pub z: u8,
    pub x: u32,
    pub y: u32,
}

/// Available map tile providers
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TileProvider {
    #[default]
    OpenStreetMap,
    OpenTopoMap,
    CyclOSM,
}

impl TileProvider {
    /// URL template with `{z}`, `{x}` and `{y}` placeholders
    pub fn template(&self) -> &'static str {
        match self {
            Self::OpenStreetMap => "https://tile.openstreetmap.org/{z}/{x}/{y}.png",
            Self::OpenTopoMap => "https://tile.opentopomap.org/{z}/{x}/{y}.png",
            Self::CyclOSM => "https://tile.thunderforest.com/cycle/{z}/{x}/{y}.png",
        }
    }

    pub fn attribution(&self) -> &'static str {
        match self {
            Self::OpenStreetMap => "© OpenStreetMap contributors",
            Self::OpenTopoMap => "© OpenTopoMap (CC-BY-SA)",
            Self::CyclOSM => "© CyclOSM & Thunderforest",
        }
    }

    pub fn all() -> &'static [Self] {
        &[Self::OpenStreetMap, Self::OpenTopoMap, Self::CyclOSM]
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::OpenStreetMap => "OpenStreetMap",
            Self::OpenTopoMap => "OpenTopoMap",
            Self::CyclOSM => "CyclOSM",
        }
    }

    /// Look a provider up by [`TileProvider::name`], ignoring case
    pub fn from_name(name: &str) -> Option<Self> {
        Self::all()
            .iter()
            .copied()
            .find(|provider| provider.name().eq_ignore_ascii_case(name))
    }

    pub fn url(&self, key: TileKey) -> String {
        self.template()
            .replace("{z}", &key.z.to_string())
            .replace("{x}", &key.x.to_string())
            .replace("{y}", &key.y.to_string())
    }
}

/// Tiles needed to draw a viewport, row by row from the north-west corner
///
/// Uses `floor(zoom)` capped at [`MAX_TILE_ZOOM`]. Columns wrap around the
/// antimeridian and appear at most once.
pub fn covering_tiles(viewport: &Viewport, tile_size: f64) -> Vec<TileKey> {
    let z = viewport.level(0, MAX_TILE_ZOOM);
    let n = 1_i64 << z;
    let bounds = &viewport.bounds;

    let north_west = utils::project_to_pixels(bounds.max_lat, bounds.min_lon, z as f64, tile_size);
    let south_east = utils::project_to_pixels(bounds.min_lat, bounds.max_lon, z as f64, tile_size);

    let tile = |pixels: f64| (pixels / tile_size).floor() as i64;
    let (x0, x1) = (tile(north_west.x()), tile(south_east.x()));
    let y0 = tile(north_west.y()).clamp(0, n - 1);
    let y1 = tile(south_east.y()).clamp(0, n - 1);

    let columns: Vec<u32> = if x1 - x0 + 1 >= n {
        (0..n as u32).collect()
    } else {
        (x0..=x1).map(|x| x.rem_euclid(n) as u32).collect()
    };

    let mut keys = Vec::with_capacity(columns.len() * (y1 - y0 + 1).max(0) as usize);
    for y in y0..=y1 {
        for &x in &columns {
            keys.push(TileKey { z, x, y: y as u32 });
        }
    }
    keys
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BoundingBox;

    #[test]
    fn test_url_template() {
        let key = TileKey { z: 2, x: 1, y: 3 };
        let url = TileProvider::OpenStreetMap.url(key);
        assert_eq!(url, "https://tile.openstreetmap.org/2/1/3.png");
        let provider = TileProvider::from_name("opentopomap");
        assert_eq!(provider, Some(TileProvider::OpenTopoMap));
        assert_eq!(TileProvider::from_name("nope"), None);
    }

    #[test]
    fn test_world_at_zoom_zero() {
        let viewport = Viewport::new(BoundingBox::world(), 0.0);
        assert_eq!(
            covering_tiles(&viewport, utils::DEFAULT_TILE_SIZE),
            vec![TileKey { z: 0, x: 0, y: 0 }]
        );
    }

    #[test]
    fn test_wraps_antimeridian() {
        let viewport = Viewport::new(BoundingBox::new(1.0, 170.0, 2.0, 190.0), 3.0);
        let tiles = covering_tiles(&viewport, utils::DEFAULT_TILE_SIZE);
        let columns: Vec<u32> = tiles.iter().map(|key| key.x).collect();
        assert_eq!(columns, vec![7, 0]);
        assert!(tiles.iter().all(|key| key.y == 3));
    }

    #[test]
    fn test_zoom_is_capped() {
        let viewport = Viewport::centered(20.0, 0.0, 22.0);
        let tiles = covering_tiles(&viewport, utils::DEFAULT_TILE_SIZE);
        assert!(!tiles.is_empty());
        assert!(tiles.iter().all(|key| key.z == MAX_TILE_ZOOM));
    }
}
