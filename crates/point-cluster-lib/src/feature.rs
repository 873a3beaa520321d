//! Feature storage module
//!
//! This module provides the immutable `Feature` type with its identifier and
//! opaque attribute map.

use crate::{ClusterError, Result};
use geo::Point;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Unique identifier of a feature
///
/// Integer ids order before string ids, which gives a total, stable
/// processing order for mixed collections.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeatureId {
    Int(i64),
    Str(String),
}

impl fmt::Display for FeatureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(value) => write!(f, "{value}"),
            Self::Str(value) => f.write_str(value),
        }
    }
}

impl From<i64> for FeatureId {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for FeatureId {
    fn from(value: i32) -> Self {
        Self::Int(value.into())
    }
}

impl From<&str> for FeatureId {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for FeatureId {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

/// A primitive attribute value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl AttributeValue {
    /// Text view of the value, `None` for null
    pub fn as_text(&self) -> Option<String> {
        match self {
            Self::Null => None,
            Self::Bool(value) => Some(value.to_string()),
            Self::Int(value) => Some(value.to_string()),
            Self::Float(value) => Some(value.to_string()),
            Self::Text(value) => Some(value.clone()),
        }
    }

    /// Null, `false`, zero, NaN or empty text
    pub fn is_blank(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Bool(value) => !value,
            Self::Int(value) => *value == 0,
            Self::Float(value) => *value == 0.0 || value.is_nan(),
            Self::Text(value) => value.is_empty(),
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// Attribute map of a feature, ordered by key
pub type Attributes = BTreeMap<String, AttributeValue>;

/// A single geolocated entity
///
/// Features are immutable once built; the index and cluster nodes share them
/// through `Arc<Feature>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    id: FeatureId,
    /// Longitude in `x`, latitude in `y`
    coordinate: Point<f64>,
    attributes: Attributes,
}

impl Feature {
    /// Create a feature without attributes
    ///
    /// Fails if the latitude is outside `[-90, 90]`, the longitude outside
    /// `[-180, 180]`, or either is not finite.
    pub fn new(id: impl Into<FeatureId>, lat: f64, lon: f64) -> Result<Self> {
        Self::with_attributes(id, lat, lon, Attributes::new())
    }

    /// Create a feature with attributes
    pub fn with_attributes(
        id: impl Into<FeatureId>,
        lat: f64,
        lon: f64,
        attributes: Attributes,
    ) -> Result<Self> {
        let id = id.into();
        if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
            return Err(ClusterError::InvalidCoordinate(format!(
                "feature {id}: latitude {lat} out of range"
            )));
        }
        if !lon.is_finite() || !(-180.0..=180.0).contains(&lon) {
            return Err(ClusterError::InvalidCoordinate(format!(
                "feature {id}: longitude {lon} out of range"
            )));
        }

        Ok(Self {
            id,
            coordinate: Point::new(lon, lat),
            attributes,
        })
    }

    #[inline]
    pub fn id(&self) -> &FeatureId {
        &self.id
    }

    #[inline]
    pub fn lat(&self) -> f64 {
        self.coordinate.y()
    }

    #[inline]
    pub fn lon(&self) -> f64 {
        self.coordinate.x()
    }

    /// Coordinate as a `geo::Point` (x = longitude, y = latitude)
    #[inline]
    pub fn coordinate(&self) -> Point<f64> {
        self.coordinate
    }

    #[inline]
    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    /// Look up a single attribute
    #[inline]
    pub fn attribute(&self, key: &str) -> Option<&AttributeValue> {
        self.attributes.get(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feature_creation() {
        let feature = Feature::new("paris", 48.8566, 2.3522).unwrap();
        assert_eq!(feature.id(), &FeatureId::from("paris"));
        assert_eq!(feature.lat(), 48.8566);
        assert_eq!(feature.lon(), 2.3522);
        assert!(feature.attributes().is_empty());
    }

    #[test]
    fn test_invalid_coordinates_rejected() {
        assert!(Feature::new(1, 91.0, 0.0).is_err());
        assert!(Feature::new(1, 0.0, -180.5).is_err());
        assert!(Feature::new(1, f64::NAN, 0.0).is_err());
        assert!(Feature::new(1, 0.0, f64::INFINITY).is_err());
        assert!(Feature::new(1, -90.0, 180.0).is_ok());
    }

    #[test]
    fn test_feature_id_ordering() {
        let mut ids = vec![
            FeatureId::from("b"),
            FeatureId::from(10),
            FeatureId::from("a"),
            FeatureId::from(-3),
        ];
        ids.sort();
        assert_eq!(
            ids,
            vec![
                FeatureId::from(-3),
                FeatureId::from(10),
                FeatureId::from("a"),
                FeatureId::from("b"),
            ]
        );
    }

    #[test]
    fn test_feature_id_serde_untagged() {
        let ids: Vec<FeatureId> = serde_json::from_str(r#"[1, "x"]"#).unwrap();
        assert_eq!(ids, vec![FeatureId::Int(1), FeatureId::from("x")]);
    }

    #[test]
    fn test_attribute_lookup() {
        let mut attributes = Attributes::new();
        attributes.insert("name".into(), "Konya".into());
        attributes.insert("founded".into(), 1071_i64.into());
        let feature = Feature::with_attributes(1, 37.8, 32.4, attributes).unwrap();

        assert_eq!(
            feature.attribute("name").and_then(AttributeValue::as_text),
            Some("Konya".to_string())
        );
        let founded = feature.attribute("founded");
        assert_eq!(
            founded.and_then(AttributeValue::as_text),
            Some("1071".to_string())
        );
        assert!(feature.attribute("missing").is_none());
    }
}
