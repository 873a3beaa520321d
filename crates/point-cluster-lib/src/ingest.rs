//! Asynchronous GeoJSON ingestion
//!
//! A [`FeatureSource`] produces the raw payload; [`FeatureIngestor`] parses a
//! GeoJSON `FeatureCollection` out of it and fills a [`SpatialIndex`].
//! Individual bad features are skipped and reported, a bad payload is reported
//! as a failure. Neither aborts the session.

use crate::{AttributeValue, Attributes, ClusterError, Feature, FeatureId, Result, SpatialIndex};
use geojson::feature::Id;
use rayon::prelude::*;
use serde_json::Value;
use std::future::Future;
use std::path::{Path, PathBuf};

/// Property consulted for an id when a feature has no top-level `id`
const DEFAULT_ID_PROPERTY: &str = "id";

/// Produces a feature collection payload
pub trait FeatureSource {
    fn fetch(&self) -> impl Future<Output = Result<Vec<u8>>> + Send;
}

/// Reads the payload from a file
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl FeatureSource for FileSource {
    fn fetch(&self) -> impl Future<Output = Result<Vec<u8>>> + Send {
        let path = self.path.clone();
        async move { Ok(tokio::fs::read(path).await?) }
    }
}

/// An in-memory payload
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    bytes: Vec<u8>,
}

impl StaticSource {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }
}

impl FeatureSource for StaticSource {
    fn fetch(&self) -> impl Future<Output = Result<Vec<u8>>> + Send {
        let bytes = self.bytes.clone();
        async move { Ok(bytes) }
    }
}

/// A feature that was left out, with the reason
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedFeature {
    /// Position in the collection's `features` array
    pub position: usize,
    pub id: Option<FeatureId>,
    pub reason: String,
}

/// Outcome of one ingestion
#[derive(Debug, Default)]
pub struct IngestReport {
    /// Features added to the index
    pub loaded: usize,
    pub skipped: Vec<SkippedFeature>,
    /// Set when the source could not be fetched or parsed; nothing was loaded then
    pub failure: Option<ClusterError>,
}

impl IngestReport {
    #[inline]
    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }

    fn failed(failure: ClusterError) -> Self {
        tracing::error!("Feature ingestion failed: {}", failure);
        Self {
            failure: Some(failure),
            ..Self::default()
        }
    }
}

/// Parses feature collections into a [`SpatialIndex`]
#[derive(Debug, Clone)]
pub struct FeatureIngestor {
    id_property: String,
}

impl Default for FeatureIngestor {
    fn default() -> Self {
        Self::new()
    }
}

impl FeatureIngestor {
    pub fn new() -> Self {
        Self {
            id_property: DEFAULT_ID_PROPERTY.to_string(),
        }
    }

    /// Use another property as the id fallback
    pub fn with_id_property(mut self, property: impl Into<String>) -> Self {
        self.id_property = property.into();
        self
    }

    /// Fetch a payload and insert its features into `index`
    ///
    /// Features whose id is already indexed (or repeated in the payload) are
    /// skipped. The report's `failure` is set when fetching or parsing fails.
    pub async fn ingest<F: FeatureSource>(
        &self,
        source: &F,
        index: &mut SpatialIndex,
    ) -> IngestReport {
        let bytes = match source.fetch().await {
            Ok(bytes) => bytes,
            Err(err) => {
                let failure = ClusterError::Ingestion(format!("fetch failed: {err}"));
                return IngestReport::failed(failure);
            }
        };

        let (features, mut skipped) = match self.parse(&bytes) {
            Ok(parsed) => parsed,
            Err(err) => {
                let failure = ClusterError::Ingestion(format!("malformed payload: {err}"));
                return IngestReport::failed(failure);
            }
        };

        #[cfg(feature = "profiling")]
        profiling::scope!("ingest::insert");

        let mut loaded = 0;
        for (position, feature) in features {
            let id = feature.id().clone();
            match index.insert(feature) {
                Ok(()) => loaded += 1,
                Err(err) => {
                    tracing::warn!("Skipping feature #{}: {}", position, err);
                    skipped.push(SkippedFeature {
                        position,
                        id: Some(id),
                        reason: err.to_string(),
                    });
                }
            }
        }
        skipped.sort_by_key(|skip| skip.position);

        tracing::info!("Loaded {} features ({} skipped)", loaded, skipped.len());
        IngestReport {
            loaded,
            skipped,
            failure: None,
        }
    }

    /// Parse a GeoJSON `FeatureCollection`
    ///
    /// Returns the valid features with their position in the collection, plus
    /// the features that had to be skipped. Conversion runs in parallel.
    pub fn parse(&self, bytes: &[u8]) -> Result<(Vec<(usize, Feature)>, Vec<SkippedFeature>)> {
        #[cfg(feature = "profiling")]
        profiling::scope!("ingest::parse");

        let mut root: Value = serde_json::from_slice(bytes)?;
        if root.get("type").and_then(Value::as_str) != Some("FeatureCollection") {
            let message = "expected a FeatureCollection".to_string();
            return Err(ClusterError::Ingestion(message));
        }
        let raw = match root.get_mut("features").map(Value::take) {
            Some(Value::Array(raw)) => raw,
            _ => {
                return Err(ClusterError::Ingestion(
                    "FeatureCollection without a features array".to_string(),
                ));
            }
        };

        let converted: Vec<std::result::Result<(usize, Feature), SkippedFeature>> = raw
            .into_par_iter()
            .enumerate()
            .map(|(position, value)| self.convert(position, value))
            .collect();

        let mut features = Vec::with_capacity(converted.len());
        let mut skipped = Vec::new();
        for result in converted {
            match result {
                Ok(feature) => features.push(feature),
                Err(skip) => {
                    tracing::warn!("Skipping feature #{}: {}", skip.position, skip.reason);
                    skipped.push(skip);
                }
            }
        }
        Ok((features, skipped))
    }

    fn convert(
        &self,
        position: usize,
        value: Value,
    ) -> std::result::Result<(usize, Feature), SkippedFeature> {
        let raw_id = geojson_id(value.get("id"));
        let mut feature: geojson::Feature = match serde_json::from_value(value) {
            Ok(feature) => feature,
            Err(err) => {
                let id = raw_id.map(feature_id);
                return Err(skip(position, id, &format!("not a GeoJSON feature: {err}")));
            }
        };

        let properties = feature.properties.take().unwrap_or_default();
        let id = feature
            .id
            .take()
            .or_else(|| geojson_id(properties.get(&self.id_property)))
            .map(feature_id)
            .unwrap_or(FeatureId::Int(position as i64));

        let (lon, lat) = match feature.geometry.map(|geometry| geometry.value) {
            Some(geojson::Value::Point(coordinates)) => match coordinates.as_slice() {
                [lon, lat, ..] => (*lon, *lat),
                _ => return Err(skip(position, Some(id), "fewer than two coordinates")),
            },
            Some(_) => return Err(skip(position, Some(id), "geometry is not a Point")),
            None => return Err(skip(position, Some(id), "missing geometry")),
        };

        let attributes: Attributes = properties
            .into_iter()
            .map(|(key, value)| (key, attribute_from_value(value)))
            .collect();

        Feature::with_attributes(id.clone(), lat, lon, attributes)
            .map(|feature| (position, feature))
            .map_err(|err| skip(position, Some(id), &err.to_string()))
    }
}

fn skip(position: usize, id: Option<FeatureId>, reason: &str) -> SkippedFeature {
    SkippedFeature {
        position,
        id,
        reason: reason.to_string(),
    }
}

/// A string or number usable as a feature id
fn geojson_id(value: Option<&Value>) -> Option<Id> {
    match value? {
        Value::String(id) => Some(Id::String(id.clone())),
        Value::Number(id) => Some(Id::Number(id.clone())),
        _ => None,
    }
}

fn feature_id(id: Id) -> FeatureId {
    match id {
        Id::String(id) => FeatureId::Str(id),
        Id::Number(number) => match number.as_i64() {
            Some(id) => FeatureId::Int(id),
            None => FeatureId::Str(number.to_string()),
        },
    }
}

/// Primitive values map directly; arrays and objects are kept as JSON text
fn attribute_from_value(value: Value) -> AttributeValue {
    match value {
        Value::Null => AttributeValue::Null,
        Value::Bool(value) => AttributeValue::Bool(value),
        Value::Number(number) => match number.as_i64() {
            Some(value) => AttributeValue::Int(value),
            None => AttributeValue::Float(number.as_f64().unwrap_or(f64::NAN)),
        },
        Value::String(value) => AttributeValue::Text(value),
        nested @ (Value::Array(_) | Value::Object(_)) => AttributeValue::Text(nested.to_string()),
    }
}
