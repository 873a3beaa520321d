//! Utility functions for coordinate conversions and pixel-space projection

use geo::Point;

/// Web Mercator bounds in meters (EPSG:3857)
pub const EARTH_MERCATOR_MAX: f64 = 20037508.34;
pub const EARTH_MERCATOR_MIN: f64 = -20037508.34;
pub const EARTH_SIZE_METERS: f64 = EARTH_MERCATOR_MAX - EARTH_MERCATOR_MIN;

/// Maximum latitude that can be represented in Web Mercator
pub const MAX_LATITUDE: f64 = 85.05112878;

/// Default edge length of a square map tile in pixels
pub const DEFAULT_TILE_SIZE: f64 = 256.0;

/// Precomputed constant: EARTH_MERCATOR_MAX / 180.0
const LON_TO_X_FACTOR: f64 = EARTH_MERCATOR_MAX / 180.0;

/// Precomputed constant: EARTH_MERCATOR_MAX / PI
const Y_FACTOR: f64 = EARTH_MERCATOR_MAX / std::f64::consts::PI;

/// Precomputed constant: 180.0 / EARTH_MERCATOR_MAX
const X_TO_LON_FACTOR: f64 = 180.0 / EARTH_MERCATOR_MAX;

/// Precomputed constant: PI / EARTH_MERCATOR_MAX
const Y_TO_LAT_FACTOR: f64 = std::f64::consts::PI / EARTH_MERCATOR_MAX;

/// Convert WGS84 (lat, lon) to Web Mercator (x, y) in meters
///
/// Longitude is not wrapped, so `lon = 190.0` lands east of the antimeridian.
/// This keeps distances continuous for viewports that cross it.
///
/// # Arguments
/// * `lat` - Latitude in degrees (clamped to ±85.05)
/// * `lon` - Longitude in degrees
#[inline(always)]
pub fn wgs84_to_mercator(lat: f64, lon: f64) -> Point<f64> {
    let lat = lat.clamp(-MAX_LATITUDE, MAX_LATITUDE);

    let x = lon * LON_TO_X_FACTOR;

    let lat_rad = lat.to_radians();
    let y = (lat_rad.tan() + (1.0 / lat_rad.cos())).ln() * Y_FACTOR;

    Point::new(x, y)
}

/// Convert Web Mercator (x, y) in meters to WGS84 (lat, lon)
///
/// # Returns
/// A tuple of (latitude, longitude) in degrees
#[inline(always)]
pub fn mercator_to_wgs84(x: f64, y: f64) -> (f64, f64) {
    let lon = x * X_TO_LON_FACTOR;
    let lat =
        (std::f64::consts::PI / 2.0 - 2.0 * ((-y * Y_TO_LAT_FACTOR).exp()).atan()).to_degrees();
    (lat, lon)
}

/// Size of the whole world in pixels at the given zoom
#[inline(always)]
pub fn world_size_px(zoom: f64, tile_size: f64) -> f64 {
    tile_size * zoom.exp2()
}

/// Project WGS84 degrees to global pixel coordinates at the given zoom
///
/// The origin is the north-west corner of the world, x grows east, y grows south.
#[inline(always)]
pub fn project_to_pixels(lat: f64, lon: f64, zoom: f64, tile_size: f64) -> Point<f64> {
    let mercator = wgs84_to_mercator(lat, lon);
    let scale = world_size_px(zoom, tile_size) / EARTH_SIZE_METERS;
    Point::new(
        (mercator.x() - EARTH_MERCATOR_MIN) * scale,
        (EARTH_MERCATOR_MAX - mercator.y()) * scale,
    )
}

/// Inverse of [`project_to_pixels`]
///
/// # Returns
/// A tuple of (latitude, longitude) in degrees; longitude is not wrapped
#[inline(always)]
pub fn unproject_from_pixels(x: f64, y: f64, zoom: f64, tile_size: f64) -> (f64, f64) {
    let scale = EARTH_SIZE_METERS / world_size_px(zoom, tile_size);
    let (mx, my) = (x * scale + EARTH_MERCATOR_MIN, EARTH_MERCATOR_MAX - y * scale);
    mercator_to_wgs84(mx, my)
}

/// Wrap a longitude into `[-180, 180]`
///
/// Values already in range are returned unchanged, so both 180 and -180 survive.
#[inline(always)]
pub fn wrap_longitude(lon: f64) -> f64 {
    if (-180.0..=180.0).contains(&lon) {
        lon
    } else {
        (lon + 180.0).rem_euclid(360.0) - 180.0
    }
}
