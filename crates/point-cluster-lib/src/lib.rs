//! Point Cluster Library - Viewport clustering for large point collections
//!
//! This library keeps thousands of geolocated features legible on a pannable, zoomable map.
//! Features are stored in a quadtree, grouped per zoom level into cluster markers, and the
//! visible marker set is updated through minimal add/remove/update instructions instead of
//! being rebuilt on every pan or zoom.
//!
//! # Architecture
//!
//! - **[`SpatialIndex`]**: Globe-rooted point quadtree with antimeridian-aware range queries
//! - **[`ClusterEngine`]**: Grid-based greedy clustering in Web Mercator pixel space
//! - **[`diff`]**: Reconciles the previous visible node set with the new one
//! - **[`ViewportController`]**: Debounced viewport state with stale-result detection
//! - **[`FeatureIngestor`]**: Async GeoJSON ingestion with per-feature warnings
//! - **[`MapSession`]**: Owns all of the above plus the current visible set
//!
//! # Example
//!
//! ```
//! use point_cluster_lib::{Config, Feature, MapSession, MarkerLayer, Viewport};
//!
//! let mut session = MapSession::new(Config::default(), MarkerLayer::default())?;
//! session.insert_feature(Feature::new(1, 48.85, 2.35)?)?;
//! session.insert_feature(Feature::new(2, 48.86, 2.34)?)?;
//!
//! session.set_viewport_now(Viewport::centered(48.85, 2.35, 5.0))?;
//! assert_eq!(session.sink().len(), 1); // one cluster of two
//! # Ok::<(), point_cluster_lib::ClusterError>(())
//! ```

mod cluster;
mod controller;
mod diff;
mod feature;
mod index;
mod ingest;
mod policy;
mod render;
mod session;
pub mod tiles;
pub mod utils;
mod viewport;

// Public API exports
pub use cluster::{ClusterEngine, ClusterNode, GroupNode, LeafNode, NodeId};
pub use controller::{ClusterTicket, ViewportController};
pub use diff::{IdGeneration, RenderInstruction, StableIds, diff};
pub use feature::{AttributeValue, Attributes, Feature, FeatureId};
pub use index::{RangeQuery, SpatialIndex};
pub use ingest::{
    FeatureIngestor, FeatureSource, FileSource, IngestReport, SkippedFeature, StaticSource,
};
pub use policy::{RadiusPolicy, ZoomThresholdPolicy};
pub use render::{MarkerLayer, PopupContent, RenderSink, UNKNOWN_LABEL};
pub use session::{ClusterJob, ClusterResult, Config, IdentityMode, MapSession};
pub use viewport::{BoundingBox, Viewport};

/// Error types for the clustering engine
#[derive(Debug, thiserror::Error)]
pub enum ClusterError {
    #[error("Duplicate feature id: {0}")]
    DuplicateId(FeatureId),

    #[error("Feature not found: {0}")]
    NotFound(FeatureId),

    #[error("Invalid radius policy: {0}")]
    InvalidPolicy(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid coordinate: {0}")]
    InvalidCoordinate(String),

    #[error("Ingestion error: {0}")]
    Ingestion(String),

    #[error("Cannot apply render instructions: {0}")]
    Reconcile(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ClusterError>;
