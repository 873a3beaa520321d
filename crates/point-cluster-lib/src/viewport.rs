//! Bounding boxes and viewport state
//!
//! Longitudes inside a [`BoundingBox`] are "unwrapped": a box may extend past
//! ±180° (e.g. `170..190`) so that a view crossing the antimeridian stays one
//! contiguous range. [`BoundingBox::parts`] splits such a box into normalized
//! pieces for the index.

use crate::utils;
use geo::{Coord, Rect};
use serde::{Deserialize, Serialize};
use smallvec::{SmallVec, smallvec};

/// Reference screen size used by [`Viewport::centered`]
const REFERENCE_SCREEN: (f64, f64) = (1024.0, 768.0);

/// A latitude/longitude box, inclusive on every edge
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub min_lon: f64,
    pub max_lat: f64,
    pub max_lon: f64,
}

/// A normalized piece of a bounding box plus the longitude offset that maps
/// features found in it back into the box's unwrapped frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct BoxPart {
    pub rect: Rect<f64>,
    pub lon_offset: f64,
}

impl BoundingBox {
    /// Create a bounding box
    ///
    /// Latitudes are reordered if swapped. A west edge greater than the east
    /// edge (e.g. `170, -170`) is read as crossing the antimeridian and is
    /// stored unwrapped (`170, 190`).
    pub fn new(min_lat: f64, min_lon: f64, max_lat: f64, max_lon: f64) -> Self {
        let (min_lat, max_lat) = if min_lat <= max_lat {
            (min_lat, max_lat)
        } else {
            (max_lat, min_lat)
        };
        let max_lon = if min_lon > max_lon {
            max_lon + 360.0
        } else {
            max_lon
        };
        Self {
            min_lat,
            min_lon,
            max_lat,
            max_lon,
        }
    }

    /// The whole globe
    pub fn world() -> Self {
        Self::new(-90.0, -180.0, 90.0, 180.0)
    }

    #[inline]
    pub fn width_degrees(&self) -> f64 {
        self.max_lon - self.min_lon
    }

    #[inline]
    pub fn height_degrees(&self) -> f64 {
        self.max_lat - self.min_lat
    }

    /// Whether the box extends past ±180°
    pub fn crosses_antimeridian(&self) -> bool {
        self.parts().len() > 1
    }

    /// Center as `(lat, lon)`, longitude wrapped into `[-180, 180]`
    pub fn center(&self) -> (f64, f64) {
        (
            (self.min_lat + self.max_lat) / 2.0,
            utils::wrap_longitude((self.min_lon + self.max_lon) / 2.0),
        )
    }

    /// Inclusive containment test for a normalized coordinate
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        self.parts().iter().any(|part| {
            let min = part.rect.min();
            let max = part.rect.max();
            lat >= min.y && lat <= max.y && lon >= min.x && lon <= max.x
        })
    }

    /// Split into at most two normalized rectangles (x = lon, y = lat)
    pub(crate) fn parts(&self) -> SmallVec<[BoxPart; 2]> {
        let min_lat = self.min_lat.clamp(-90.0, 90.0);
        let max_lat = self.max_lat.clamp(-90.0, 90.0);
        let rect = |west: f64, east: f64| {
            Rect::new(
                Coord {
                    x: west,
                    y: min_lat,
                },
                Coord {
                    x: east,
                    y: max_lat,
                },
            )
        };

        if self.width_degrees() >= 360.0 {
            return smallvec![BoxPart {
                rect: rect(-180.0, 180.0),
                lon_offset: 0.0,
            }];
        }

        // Shift the west edge into [-180, 180)
        let shift = ((self.min_lon + 180.0) / 360.0).floor() * 360.0;
        let west = self.min_lon - shift;
        let east = self.max_lon - shift;

        if east <= 180.0 {
            smallvec![BoxPart {
                rect: rect(west, east),
                lon_offset: shift,
            }]
        } else {
            smallvec![
                BoxPart {
                    rect: rect(west, 180.0),
                    lon_offset: shift,
                },
                BoxPart {
                    rect: rect(-180.0, east - 360.0),
                    lon_offset: shift + 360.0,
                },
            ]
        }
    }

    /// Grow the box by `pixels` on every side at the given zoom
    ///
    /// Edges already at the Web Mercator latitude limit stay where they are.
    pub fn expand_by_pixels(&self, pixels: f64, zoom: f64, tile_size: f64) -> Self {
        if pixels <= 0.0 {
            return *self;
        }

        let north_west = utils::project_to_pixels(self.max_lat, self.min_lon, zoom, tile_size);
        let south_east = utils::project_to_pixels(self.min_lat, self.max_lon, zoom, tile_size);

        let (max_lat, min_lon) = utils::unproject_from_pixels(
            north_west.x() - pixels,
            north_west.y() - pixels,
            zoom,
            tile_size,
        );
        let (min_lat, max_lon) = utils::unproject_from_pixels(
            south_east.x() + pixels,
            south_east.y() + pixels,
            zoom,
            tile_size,
        );

        Self {
            min_lat: if self.min_lat <= -utils::MAX_LATITUDE {
                self.min_lat
            } else {
                min_lat
            },
            min_lon,
            max_lat: if self.max_lat >= utils::MAX_LATITUDE {
                self.max_lat
            } else {
                max_lat
            },
            max_lon,
        }
    }
}

/// The visible map region plus its zoom level
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub bounds: BoundingBox,
    /// Continuous zoom; clustering uses `floor(zoom)`
    pub zoom: f64,
}

impl Viewport {
    pub fn new(bounds: BoundingBox, zoom: f64) -> Self {
        Self { bounds, zoom }
    }

    /// Viewport of the given screen size (in pixels) centered on a coordinate
    pub fn around(lat: f64, lon: f64, zoom: f64, screen: (f64, f64), tile_size: f64) -> Self {
        let center = utils::project_to_pixels(lat, lon, zoom, tile_size);
        let (half_w, half_h) = (screen.0 / 2.0, screen.1 / 2.0);

        let (max_lat, min_lon) = utils::unproject_from_pixels(
            center.x() - half_w,
            center.y() - half_h,
            zoom,
            tile_size,
        );
        let (min_lat, max_lon) = utils::unproject_from_pixels(
            center.x() + half_w,
            center.y() + half_h,
            zoom,
            tile_size,
        );

        Self::new(BoundingBox::new(min_lat, min_lon, max_lat, max_lon), zoom)
    }

    /// Viewport of a 1024x768 screen centered on a coordinate
    pub fn centered(lat: f64, lon: f64, zoom: f64) -> Self {
        Self::around(lat, lon, zoom, REFERENCE_SCREEN, utils::DEFAULT_TILE_SIZE)
    }

    /// Integer zoom level used for clustering
    pub fn level(&self, min_zoom: u8, max_zoom: u8) -> u8 {
        if !self.zoom.is_finite() {
            return min_zoom;
        }
        self.zoom.floor().clamp(min_zoom as f64, max_zoom as f64) as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_swapped_latitudes_are_reordered() {
        let bbox = BoundingBox::new(10.0, 0.0, -10.0, 5.0);
        assert_eq!(bbox.min_lat, -10.0);
        assert_eq!(bbox.max_lat, 10.0);
    }

    #[test]
    fn test_west_greater_than_east_is_unwrapped() {
        let bbox = BoundingBox::new(-10.0, 170.0, 10.0, -170.0);
        assert_eq!(bbox.max_lon, 190.0);
        assert!(bbox.crosses_antimeridian());
        assert_eq!(bbox.width_degrees(), 20.0);
    }

    #[test]
    fn test_parts_single() {
        let parts = BoundingBox::new(-10.0, -20.0, 10.0, 20.0).parts();
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].lon_offset, 0.0);
        assert_eq!(parts[0].rect.min().x, -20.0);
        assert_eq!(parts[0].rect.max().x, 20.0);
    }

    #[test]
    fn test_parts_split_east() {
        let parts = BoundingBox::new(-10.0, 170.0, 10.0, 190.0).parts();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].rect.min().x, 170.0);
        assert_eq!(parts[0].rect.max().x, 180.0);
        assert_eq!(parts[0].lon_offset, 0.0);
        assert_eq!(parts[1].rect.min().x, -180.0);
        assert_eq!(parts[1].rect.max().x, -170.0);
        assert_eq!(parts[1].lon_offset, 360.0);
    }

    #[test]
    fn test_parts_split_west() {
        let parts = BoundingBox::new(-10.0, -190.0, 10.0, -170.0).parts();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].rect.min().x, 170.0);
        assert_eq!(parts[0].lon_offset, -360.0);
        assert_eq!(parts[1].rect.max().x, -170.0);
        assert_eq!(parts[1].lon_offset, 0.0);
    }

    #[test]
    fn test_parts_wider_than_world() {
        let parts = BoundingBox::new(-10.0, -300.0, 10.0, 300.0).parts();
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].rect.min().x, -180.0);
        assert_eq!(parts[0].rect.max().x, 180.0);
    }

    #[test]
    fn test_contains_inclusive_and_wrapped() {
        let bbox = BoundingBox::new(0.0, 170.0, 10.0, 190.0);
        assert!(bbox.contains(0.0, 170.0));
        assert!(bbox.contains(10.0, 180.0));
        assert!(bbox.contains(5.0, -175.0));
        assert!(bbox.contains(5.0, -170.0));
        assert!(!bbox.contains(5.0, -169.0));
        assert!(!bbox.contains(11.0, 175.0));
    }

    #[test]
    fn test_expand_by_pixels_grows_box() {
        let bbox = BoundingBox::new(-1.0, -1.0, 1.0, 1.0);
        let expanded = bbox.expand_by_pixels(80.0, 5.0, utils::DEFAULT_TILE_SIZE);
        assert!(expanded.min_lat < bbox.min_lat);
        assert!(expanded.max_lat > bbox.max_lat);
        assert!(expanded.min_lon < bbox.min_lon);
        assert!(expanded.max_lon > bbox.max_lon);

        // 80px at zoom 5 is 80 / 8192 of the world
        let expected = 80.0 * 360.0 / 8192.0;
        assert!((bbox.min_lon - expanded.min_lon - expected).abs() < 1e-9);
    }

    #[test]
    fn test_expand_keeps_polar_edges() {
        let bbox = BoundingBox::new(-90.0, -10.0, 90.0, 10.0);
        let expanded = bbox.expand_by_pixels(10.0, 2.0, utils::DEFAULT_TILE_SIZE);
        assert_eq!(expanded.min_lat, -90.0);
        assert_eq!(expanded.max_lat, 90.0);
    }

    #[test]
    fn test_viewport_centered_contains_center() {
        let viewport = Viewport::centered(20.0, 0.0, 2.0);
        assert!(viewport.bounds.contains(20.0, 0.0));
        let (lat, lon) = viewport.bounds.center();
        assert!(lon.abs() < 1e-9);
        // Mercator stretches the north half, so the box center drifts north
        assert!(lat > 0.0);
    }

    #[test]
    fn test_viewport_level_clamping() {
        let bounds = BoundingBox::world();
        assert_eq!(Viewport::new(bounds, 5.7).level(0, 18), 5);
        assert_eq!(Viewport::new(bounds, 25.0).level(0, 18), 18);
        assert_eq!(Viewport::new(bounds, -3.0).level(0, 18), 0);
        assert_eq!(Viewport::new(bounds, f64::NAN).level(2, 18), 2);
    }
}
