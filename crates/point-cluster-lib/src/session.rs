//! Map session: the explicit context object tying index, engine, controller
//! and the visible marker set together

use crate::index::DEFAULT_MAX_POINTS_PER_NODE;
use crate::{
    ClusterEngine, ClusterError, ClusterNode, ClusterTicket, Feature, FeatureId, FeatureIngestor,
    FeatureSource, IngestReport, MarkerLayer, NodeId, PopupContent, RadiusPolicy, RenderSink,
    Result, SpatialIndex, StableIds, Viewport, ViewportController, ZoomThresholdPolicy, diff, utils,
};
use instant::Instant;
use std::sync::Arc;
use std::time::Duration;

/// Highest zoom level the pixel math is exercised with
const MAX_SUPPORTED_ZOOM: u8 = 30;

/// How group ids are assigned
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum IdentityMode {
    /// Hash of the sorted member ids; any membership change is a new group
    #[default]
    ContentHash,
    /// Synthetic ids kept while the Jaccard overlap stays at or above `min_overlap`
    Stable { min_overlap: f64 },
}

/// Session configuration
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Lowest zoom level (inclusive)
    pub min_zoom: u8,
    /// Highest zoom level (inclusive)
    pub max_zoom: u8,
    /// Tile edge in pixels; pixel space spans `tile_size * 2^zoom`
    pub tile_size: f64,
    /// Quadtree leaf capacity
    pub max_points_per_node: usize,
    /// Extra pixels queried around the viewport, `None` uses the clustering radius
    pub edge_buffer_px: Option<f64>,
    /// Trailing-edge debounce window for viewport changes
    pub debounce: Duration,
    pub identity: IdentityMode,
    /// Initial view center latitude
    pub initial_lat: f64,
    /// Initial view center longitude
    pub initial_lon: f64,
    pub initial_zoom: f64,
    /// Screen size in pixels used to derive the initial viewport
    pub screen_px: (f64, f64),
}

impl Default for Config {
    fn default() -> Self {
        Self {
            min_zoom: 0,
            max_zoom: 18,
            tile_size: utils::DEFAULT_TILE_SIZE,
            max_points_per_node: DEFAULT_MAX_POINTS_PER_NODE,
            edge_buffer_px: None,
            debounce: Duration::from_millis(16),
            identity: IdentityMode::ContentHash,
            initial_lat: 20.0,
            initial_lon: 0.0,
            initial_zoom: 2.0,
            screen_px: (1024.0, 768.0),
        }
    }
}

impl Config {
    /// Check every value for consistency
    pub fn validate(&self) -> Result<()> {
        let invalid = |message: String| Err(ClusterError::InvalidConfig(message));

        if self.min_zoom > self.max_zoom {
            return invalid(format!(
                "min_zoom {} above max_zoom {}",
                self.min_zoom, self.max_zoom
            ));
        }
        if self.max_zoom > MAX_SUPPORTED_ZOOM {
            let max_zoom = self.max_zoom;
            return invalid(format!("max_zoom {max_zoom} above {MAX_SUPPORTED_ZOOM}"));
        }
        if !self.tile_size.is_finite() || self.tile_size <= 0.0 {
            return invalid(format!("tile_size {}", self.tile_size));
        }
        if let Some(buffer) = self.edge_buffer_px
            && (!buffer.is_finite() || buffer < 0.0)
        {
            return invalid(format!("edge_buffer_px {buffer}"));
        }
        if let IdentityMode::Stable { min_overlap } = self.identity
            && !(min_overlap > 0.0 && min_overlap <= 1.0)
        {
            return invalid(format!("min_overlap {min_overlap}"));
        }
        if self.screen_px.0 <= 0.0 || self.screen_px.1 <= 0.0 {
            return invalid(format!("screen_px {:?}", self.screen_px));
        }
        Ok(())
    }

    /// Viewport the session starts from
    pub fn initial_viewport(&self) -> Viewport {
        let (min_zoom, max_zoom) = (self.min_zoom as f64, self.max_zoom as f64);
        let zoom = self.initial_zoom.clamp(min_zoom, max_zoom);
        Viewport::around(
            self.initial_lat,
            self.initial_lon,
            zoom,
            self.screen_px,
            self.tile_size,
        )
    }
}

/// A clustering pass detached from the session, runnable on any thread
#[derive(Debug, Clone)]
pub struct ClusterJob {
    ticket: ClusterTicket,
    index: Arc<SpatialIndex>,
    engine: ClusterEngine,
}

impl ClusterJob {
    #[inline]
    pub fn ticket(&self) -> &ClusterTicket {
        &self.ticket
    }

    pub fn run(self) -> ClusterResult {
        let nodes = self.engine.cluster(&self.index, self.ticket.viewport());
        ClusterResult {
            ticket: self.ticket,
            nodes,
        }
    }
}

/// Output of a [`ClusterJob`], handed back through [`MapSession::complete`]
#[derive(Debug, Clone)]
pub struct ClusterResult {
    ticket: ClusterTicket,
    nodes: Vec<ClusterNode>,
}

impl ClusterResult {
    #[inline]
    pub fn ticket(&self) -> &ClusterTicket {
        &self.ticket
    }

    #[inline]
    pub fn nodes(&self) -> &[ClusterNode] {
        &self.nodes
    }
}

/// One interactive map: features, viewport state and what is on screen
///
/// Nothing is global; sessions are independent and can be dropped at will.
/// Recomputes happen either synchronously ([`MapSession::tick`]) or as
/// [`ClusterJob`]s whose results are applied only if still current.
pub struct MapSession<S: RenderSink = MarkerLayer> {
    config: Config,
    index: Arc<SpatialIndex>,
    engine: ClusterEngine,
    controller: ViewportController,
    visible: Vec<ClusterNode>,
    stable_ids: Option<StableIds>,
    sink: S,
}

impl<S: RenderSink> MapSession<S> {
    /// Session with the default [`ZoomThresholdPolicy`]
    pub fn new(config: Config, sink: S) -> Result<Self> {
        Self::with_policy(config, ZoomThresholdPolicy::default(), sink)
    }

    pub fn with_policy(
        config: Config,
        policy: impl RadiusPolicy + 'static,
        sink: S,
    ) -> Result<Self> {
        let engine = ClusterEngine::new(policy, &config)?;
        let mut controller =
            ViewportController::new(config.debounce, config.min_zoom, config.max_zoom);
        controller.set_now(config.initial_viewport());

        let stable_ids = match config.identity {
            IdentityMode::ContentHash => None,
            IdentityMode::Stable { min_overlap } => Some(StableIds::new(min_overlap)),
        };

        Ok(Self {
            index: Arc::new(SpatialIndex::new(config.max_points_per_node)),
            engine,
            controller,
            visible: Vec::new(),
            stable_ids,
            sink,
            config,
        })
    }

    /// Record a pan/zoom event; the recompute runs once the viewport settles
    pub fn on_viewport_change(&mut self, viewport: Viewport, now: Instant) {
        self.controller.on_viewport_change(viewport, now);
    }

    /// Recompute synchronously if the debounce window has elapsed
    ///
    /// Returns whether a recompute ran.
    pub fn tick(&mut self, now: Instant) -> Result<bool> {
        match self.controller.poll(now) {
            Some(ticket) => self.run_now(ticket).map(|()| true),
            None => Ok(false),
        }
    }

    /// Recompute the pending viewport right away, ignoring the debounce
    pub fn flush(&mut self) -> Result<bool> {
        match self.controller.flush() {
            Some(ticket) => self.run_now(ticket).map(|()| true),
            None => Ok(false),
        }
    }

    /// Jump to a viewport and recompute immediately
    pub fn set_viewport_now(&mut self, viewport: Viewport) -> Result<()> {
        let ticket = self.controller.set_now(viewport);
        self.run_now(ticket)
    }

    /// Like [`MapSession::tick`], but hand the pass out as a job
    pub fn tick_deferred(&mut self, now: Instant) -> Option<ClusterJob> {
        let ticket = self.controller.poll(now)?;
        Some(self.job(ticket))
    }

    /// Like [`MapSession::flush`], but hand the pass out as a job
    pub fn flush_deferred(&mut self) -> Option<ClusterJob> {
        let ticket = self.controller.flush()?;
        Some(self.job(ticket))
    }

    /// Apply a finished job unless the viewport or data changed since it was issued
    ///
    /// Returns `false` for a discarded stale result.
    pub fn complete(&mut self, result: ClusterResult) -> Result<bool> {
        if !self.controller.is_current(&result.ticket) {
            tracing::warn!(
                "Discarding stale cluster result (generation {}, current {})",
                result.ticket.generation(),
                self.controller.generation()
            );
            return Ok(false);
        }
        self.apply(result.nodes)?;
        Ok(true)
    }

    /// Add a feature and schedule a refresh of the current viewport
    pub fn insert_feature(&mut self, feature: impl Into<Arc<Feature>>) -> Result<()> {
        Arc::make_mut(&mut self.index).insert(feature)?;
        self.controller.invalidate(Instant::now());
        Ok(())
    }

    /// Remove a feature and schedule a refresh of the current viewport
    pub fn remove_feature(&mut self, id: &FeatureId) -> Result<Arc<Feature>> {
        let removed = Arc::make_mut(&mut self.index).remove(id)?;
        self.controller.invalidate(Instant::now());
        Ok(removed)
    }

    /// Load features from a source into the index and schedule a refresh
    ///
    /// Failures are reported, never returned: the session keeps working with
    /// whatever the index held before.
    pub async fn ingest<F: FeatureSource>(&mut self, source: &F) -> IngestReport {
        let ingestor = FeatureIngestor::new();
        let index = Arc::make_mut(&mut self.index);
        let report = ingestor.ingest(source, index).await;
        if report.loaded > 0 {
            self.controller.invalidate(Instant::now());
        }
        report
    }

    /// Popup text of a visible node
    pub fn popup(&self, id: &NodeId) -> Option<PopupContent> {
        self.visible
            .iter()
            .find(|node| &node.id() == id)
            .map(PopupContent::for_node)
    }

    /// Nodes currently on screen, ordered by smallest member id
    #[inline]
    pub fn visible(&self) -> &[ClusterNode] {
        &self.visible
    }

    #[inline]
    pub fn index(&self) -> &SpatialIndex {
        &self.index
    }

    #[inline]
    pub fn controller(&self) -> &ViewportController {
        &self.controller
    }

    #[inline]
    pub fn engine(&self) -> &ClusterEngine {
        &self.engine
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[inline]
    pub fn sink(&self) -> &S {
        &self.sink
    }

    #[inline]
    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    fn job(&self, ticket: ClusterTicket) -> ClusterJob {
        ClusterJob {
            ticket,
            index: Arc::clone(&self.index),
            engine: self.engine.clone(),
        }
    }

    fn run_now(&mut self, ticket: ClusterTicket) -> Result<()> {
        #[cfg(feature = "profiling")]
        profiling::scope!("session::run_now");

        let nodes = self.engine.cluster(&self.index, ticket.viewport());
        self.apply(nodes)
    }

    /// Render the change to `nodes`, then make them the visible set
    ///
    /// When the sink fails the visible set and stable ids stay as they were,
    /// so the next recompute diffs against what the sink last accepted.
    fn apply(&mut self, mut nodes: Vec<ClusterNode>) -> Result<()> {
        let generation = self
            .stable_ids
            .as_ref()
            .map(|stable_ids| stable_ids.label(&mut nodes));

        let instructions = diff(&self.visible, &nodes);
        if !instructions.is_empty() {
            tracing::debug!(
                "Rendering {} instructions for {} visible nodes",
                instructions.len(),
                nodes.len()
            );
            self.sink.render(&instructions)?;
        }

        if let (Some(stable_ids), Some(generation)) = (&mut self.stable_ids, generation) {
            stable_ids.commit(generation);
        }
        self.visible = nodes;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BoundingBox, RenderInstruction};

    fn point(id: i64, lat: f64, lon: f64) -> Feature {
        Feature::new(id, lat, lon).unwrap()
    }

    fn session_with<S: RenderSink>(sink: S) -> MapSession<S> {
        MapSession::new(Config::default(), sink).unwrap()
    }

    fn session() -> MapSession {
        let mut session = session_with(MarkerLayer::default());
        session.insert_feature(point(1, 0.0, 0.0)).unwrap();
        session.insert_feature(point(2, 0.0, 0.0001)).unwrap();
        session.insert_feature(point(3, 40.0, 40.0)).unwrap();
        session
    }

    fn world(zoom: f64) -> Viewport {
        Viewport::new(BoundingBox::world(), zoom)
    }

    /// Records every batch it receives
    #[derive(Default)]
    struct Recorder {
        batches: Vec<Vec<RenderInstruction>>,
    }

    impl RenderSink for Recorder {
        fn render(&mut self, instructions: &[RenderInstruction]) -> Result<()> {
            self.batches.push(instructions.to_vec());
            Ok(())
        }
    }

    /// Rejects the next batch, then forwards to a marker layer
    #[derive(Default)]
    struct FlakySink {
        fail_next: bool,
        layer: MarkerLayer,
    }

    impl RenderSink for FlakySink {
        fn render(&mut self, instructions: &[RenderInstruction]) -> Result<()> {
            if std::mem::take(&mut self.fail_next) {
                return Err(ClusterError::Reconcile("sink unavailable".to_string()));
            }
            self.layer.render(instructions)
        }
    }

    #[test]
    fn test_config_defaults() {
        let config = Config::default();
        assert_eq!(config.max_zoom, 18);
        assert_eq!(config.debounce, Duration::from_millis(16));
        assert!(config.validate().is_ok());

        let viewport = config.initial_viewport();
        assert_eq!(viewport.zoom, 2.0);
        assert!(viewport.bounds.contains(20.0, 0.0));
    }

    #[test]
    fn test_config_validation() {
        let config = Config {
            min_zoom: 10,
            max_zoom: 5,
            ..Config::default()
        };
        let result = config.validate();
        assert!(matches!(result, Err(ClusterError::InvalidConfig(_))));

        let config = Config {
            identity: IdentityMode::Stable { min_overlap: 0.0 },
            ..Config::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            edge_buffer_px: Some(-1.0),
            ..Config::default()
        };
        assert!(MapSession::new(config, MarkerLayer::default()).is_err());
    }

    #[test]
    fn test_session_starts_at_initial_view() {
        let session = session_with(MarkerLayer::default());
        assert_eq!(session.controller().current().unwrap().zoom, 2.0);
        assert!(session.visible().is_empty());
    }

    #[test]
    fn test_set_viewport_now_renders() {
        let mut session = session();
        session.set_viewport_now(world(3.0)).unwrap();
        assert_eq!(session.visible().len(), 2);
        assert!(session.sink().matches(session.visible()));

        session.set_viewport_now(world(18.0)).unwrap();
        assert_eq!(session.visible().len(), 3);
        assert!(session.sink().matches(session.visible()));
    }

    #[test]
    fn test_debounced_tick() {
        let mut session = session_with(Recorder::default());
        session.insert_feature(point(1, 0.0, 0.0)).unwrap();
        let start = Instant::now();

        session.on_viewport_change(world(3.0), start);
        let later = start + Duration::from_millis(5);
        session.on_viewport_change(world(4.0), later);
        assert!(!session.tick(start + Duration::from_millis(10)).unwrap());
        assert!(session.tick(start + Duration::from_millis(30)).unwrap());
        assert_eq!(session.sink().batches.len(), 1);
        assert_eq!(session.controller().current().unwrap().zoom, 4.0);
    }

    #[test]
    fn test_stale_job_is_discarded() {
        let mut session = session();
        session.on_viewport_change(world(3.0), Instant::now());
        let job = session.flush_deferred().unwrap();

        // The viewport moves while the job runs elsewhere
        session.on_viewport_change(world(10.0), Instant::now());
        let result = std::thread::spawn(move || job.run()).join().unwrap();
        assert!(!session.complete(result).unwrap());
        assert!(session.visible().is_empty());

        let job = session.flush_deferred().unwrap();
        assert!(session.complete(job.run()).unwrap());
        assert_eq!(session.visible().len(), 2);
    }

    #[test]
    fn test_job_keeps_snapshot_across_writes() {
        let mut session = session();
        session.on_viewport_change(world(18.0), Instant::now());
        let job = session.flush_deferred().unwrap();

        session.insert_feature(point(4, -40.0, -40.0)).unwrap();
        assert_eq!(session.index().len(), 4);

        let result = job.run();
        assert_eq!(result.nodes().len(), 3);
        // The insert scheduled a newer generation
        assert!(!session.complete(result).unwrap());
    }

    #[test]
    fn test_remove_feature_refreshes() {
        let mut session = session();
        session.set_viewport_now(world(18.0)).unwrap();
        assert_eq!(session.visible().len(), 3);

        session.remove_feature(&FeatureId::Int(3)).unwrap();
        assert!(session.flush().unwrap());
        assert_eq!(session.visible().len(), 2);
        assert!(session.sink().matches(session.visible()));

        let err = session.remove_feature(&FeatureId::Int(3)).unwrap_err();
        assert!(matches!(err, ClusterError::NotFound(_)));
    }

    #[test]
    fn test_stable_identity_mode_updates_groups() {
        let config = Config {
            identity: IdentityMode::Stable { min_overlap: 0.5 },
            ..Config::default()
        };
        let mut session = MapSession::new(config, Recorder::default()).unwrap();
        session.insert_feature(point(1, 0.0, 0.0)).unwrap();
        session.insert_feature(point(2, 0.0, 0.0001)).unwrap();
        session.set_viewport_now(world(3.0)).unwrap();
        let id = session.visible()[0].id();

        session.insert_feature(point(3, 0.0, 0.0002)).unwrap();
        session.flush().unwrap();

        assert_eq!(session.visible()[0].id(), id);
        assert_eq!(session.visible()[0].count(), 3);
        let last = session.sink().batches.last().unwrap();
        assert_eq!(last.len(), 1);
        assert!(matches!(last[0], RenderInstruction::Update { .. }));
    }

    #[test]
    fn test_popup_for_visible_nodes() {
        let mut session = session();
        session.set_viewport_now(world(3.0)).unwrap();
        let group = session.visible()[0].id();
        assert_eq!(session.popup(&group).unwrap().title, "2 features");

        let leaf = NodeId::Feature(FeatureId::Int(3));
        let popup = session.popup(&leaf).unwrap();
        assert_eq!(popup.title, crate::render::UNKNOWN_LABEL);
        assert!(session.popup(&NodeId::Cluster(0)).is_none());
    }

    #[test]
    fn test_failed_render_keeps_previous_state() {
        let mut session = session_with(FlakySink::default());
        session.insert_feature(point(1, 0.0, 0.0)).unwrap();
        session.sink_mut().fail_next = true;

        let err = session.set_viewport_now(world(3.0)).unwrap_err();
        assert!(matches!(err, ClusterError::Reconcile(_)));
        assert!(session.visible().is_empty());
        assert!(session.sink().layer.is_empty());

        // Same viewport once the sink recovers: everything is sent again
        session.set_viewport_now(world(3.0)).unwrap();
        assert_eq!(session.visible().len(), 1);
        assert!(session.sink().layer.matches(session.visible()));
    }

    #[test]
    fn test_failed_render_does_not_consume_stable_ids() {
        let config = Config {
            identity: IdentityMode::Stable { min_overlap: 0.5 },
            ..Config::default()
        };
        let mut session = MapSession::new(config, FlakySink::default()).unwrap();
        session.insert_feature(point(1, 0.0, 0.0)).unwrap();
        session.insert_feature(point(2, 0.0, 0.0001)).unwrap();
        session.sink_mut().fail_next = true;

        assert!(session.set_viewport_now(world(3.0)).is_err());
        session.set_viewport_now(world(3.0)).unwrap();
        assert_eq!(session.visible()[0].id(), NodeId::Cluster(1));
        assert!(session.sink().layer.matches(session.visible()));
    }
}
