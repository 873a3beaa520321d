//! Clustering radius as a function of zoom

use crate::{ClusterError, Result};

/// Maps an integer zoom level to a clustering radius in pixels
///
/// Implementations should be non-increasing in zoom and must never return a
/// negative radius. A radius of `0.0` disables clustering at that level.
///
/// Any `Fn(u8) -> f64` closure is a policy:
///
/// ```
/// use point_cluster_lib::RadiusPolicy;
///
/// let policy = |zoom: u8| if zoom < 10 { 60.0 } else { 0.0 };
/// assert_eq!(policy.radius(3), 60.0);
/// ```
pub trait RadiusPolicy: Send + Sync {
    fn radius(&self, zoom: u8) -> f64;
}

impl<F> RadiusPolicy for F
where
    F: Fn(u8) -> f64 + Send + Sync,
{
    fn radius(&self, zoom: u8) -> f64 {
        self(zoom)
    }
}

/// Constant radius below a zoom threshold, no clustering from it upwards
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoomThresholdPolicy {
    /// Radius in pixels below the threshold
    pub radius_px: f64,
    /// First zoom level at which every feature is shown on its own
    pub unclustered_zoom: u8,
}

impl Default for ZoomThresholdPolicy {
    fn default() -> Self {
        Self {
            radius_px: 80.0,
            unclustered_zoom: 18,
        }
    }
}

impl RadiusPolicy for ZoomThresholdPolicy {
    fn radius(&self, zoom: u8) -> f64 {
        if zoom >= self.unclustered_zoom {
            0.0
        } else {
            self.radius_px
        }
    }
}

/// Check a policy on every level of `[min_zoom, max_zoom]`
///
/// Negative or non-finite radii are configuration errors. A radius that grows
/// with zoom is allowed but logged, since groups may then merge on zoom-in.
pub(crate) fn validate(policy: &dyn RadiusPolicy, min_zoom: u8, max_zoom: u8) -> Result<()> {
    let mut previous: Option<f64> = None;
    for zoom in min_zoom..=max_zoom {
        let radius = policy.radius(zoom);
        if !radius.is_finite() || radius < 0.0 {
            return Err(ClusterError::InvalidPolicy(format!(
                "radius {radius} at zoom {zoom}"
            )));
        }
        if let Some(previous) = previous
            && radius > previous
        {
            tracing::warn!(
                "Radius policy increases from {} to {} at zoom {}",
                previous,
                radius,
                zoom
            );
        }
        previous = Some(radius);
    }
    Ok(())
}
