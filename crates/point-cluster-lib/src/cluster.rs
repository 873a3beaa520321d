//! Grid-based greedy clustering in Web Mercator pixel space
//!
//! Clustering runs on integer zoom levels. Starting at the deepest level that
//! still has a non-zero radius, every level groups the nodes produced by the
//! level above it:
//!
//! 1. Project each node's centroid to pixels at that level.
//! 2. Bucket the nodes in a uniform grid whose cell size is the radius.
//! 3. Walk the nodes in order; each unassigned node seeds a group and claims
//!    every unassigned node within the radius in the 3x3 neighbouring cells.
//!
//! Because a level only ever merges the level above, groups can only split
//! as zoom increases.

use crate::policy::{self, RadiusPolicy};
use crate::{BoundingBox, Config, Feature, FeatureId, SpatialIndex, Viewport, utils};
use geo::Point;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::Arc;

/// Tolerance (degrees) when comparing recomputed centroids
const CENTROID_EPSILON: f64 = 1e-9;

/// Identity of a visible node
///
/// Leaves are identified by their feature; groups by a 64-bit key that is
/// either a hash of the sorted member ids or a synthetic stable id.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum NodeId {
    Feature(FeatureId),
    Cluster(u64),
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Feature(id) => write!(f, "feature:{id}"),
            Self::Cluster(key) => write!(f, "cluster:{key:016x}"),
        }
    }
}

/// A single feature shown on its own
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeafNode {
    feature: Arc<Feature>,
}

impl LeafNode {
    pub fn new(feature: Arc<Feature>) -> Self {
        Self { feature }
    }

    #[inline]
    pub fn feature(&self) -> &Arc<Feature> {
        &self.feature
    }
}

/// Several features merged into one marker
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupNode {
    id: NodeId,
    /// Arithmetic mean of member coordinates (x = lon, y = lat)
    centroid: Point<f64>,
    /// Number of member features
    count: usize,
    /// Bounds of the members (longitudes may be unwrapped)
    bounds: BoundingBox,
    /// First zoom level at which this group is split apart
    expansion_zoom: u8,
    /// Child leaves and groups, ordered by their smallest feature id
    children: Vec<ClusterNode>,
}

impl GroupNode {
    #[inline]
    pub fn id(&self) -> &NodeId {
        &self.id
    }

    #[inline]
    pub fn centroid(&self) -> Point<f64> {
        self.centroid
    }

    #[inline]
    pub fn count(&self) -> usize {
        self.count
    }

    /// Bounds covering every member, for zoom-to-bounds on click
    #[inline]
    pub fn bounds(&self) -> BoundingBox {
        self.bounds
    }

    #[inline]
    pub fn expansion_zoom(&self) -> u8 {
        self.expansion_zoom
    }

    #[inline]
    pub fn children(&self) -> &[ClusterNode] {
        &self.children
    }

    /// Sorted ids of every member feature
    pub fn member_ids(&self) -> Vec<FeatureId> {
        let mut ids: Vec<FeatureId> = self
            .children
            .iter()
            .flat_map(ClusterNode::features)
            .map(|feature| feature.id().clone())
            .collect();
        ids.sort();
        ids
    }

    pub(crate) fn set_id(&mut self, id: NodeId) {
        self.id = id;
    }
}

/// A visible marker: one feature or a group of them
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClusterNode {
    Leaf(LeafNode),
    Group(GroupNode),
}

impl ClusterNode {
    pub fn id(&self) -> NodeId {
        match self {
            Self::Leaf(leaf) => NodeId::Feature(leaf.feature.id().clone()),
            Self::Group(group) => group.id.clone(),
        }
    }

    /// Number of features represented by this node
    pub fn count(&self) -> usize {
        match self {
            Self::Leaf(_) => 1,
            Self::Group(group) => group.count,
        }
    }

    /// Marker position (x = lon, y = lat)
    pub fn position(&self) -> Point<f64> {
        match self {
            Self::Leaf(leaf) => leaf.feature.coordinate(),
            Self::Group(group) => group.centroid,
        }
    }

    #[inline]
    pub fn is_group(&self) -> bool {
        matches!(self, Self::Group(_))
    }

    pub fn as_group(&self) -> Option<&GroupNode> {
        match self {
            Self::Group(group) => Some(group),
            Self::Leaf(_) => None,
        }
    }

    /// Every feature under this node, depth-first in child order
    pub fn features(&self) -> Vec<&Arc<Feature>> {
        let mut out = Vec::with_capacity(self.count());
        self.collect_features(&mut out);
        out
    }

    fn collect_features<'a>(&'a self, out: &mut Vec<&'a Arc<Feature>>) {
        match self {
            Self::Leaf(leaf) => out.push(&leaf.feature),
            Self::Group(group) => {
                for child in &group.children {
                    child.collect_features(out);
                }
            }
        }
    }

    /// Sorted ids of every member feature
    pub fn member_ids(&self) -> Vec<FeatureId> {
        match self {
            Self::Leaf(leaf) => vec![leaf.feature.id().clone()],
            Self::Group(group) => group.member_ids(),
        }
    }

    /// Whether two nodes would render identically
    ///
    /// Compares the feature for leaves; count, centroid, split zoom and child
    /// structure for groups. Ids of the nodes themselves are not compared.
    pub fn same_content(&self, other: &ClusterNode) -> bool {
        match (self, other) {
            (Self::Leaf(a), Self::Leaf(b)) => {
                Arc::ptr_eq(&a.feature, &b.feature) || a.feature == b.feature
            }
            (Self::Group(a), Self::Group(b)) => {
                a.count == b.count
                    && (a.centroid.x() - b.centroid.x()).abs() <= CENTROID_EPSILON
                    && (a.centroid.y() - b.centroid.y()).abs() <= CENTROID_EPSILON
                    && a.expansion_zoom == b.expansion_zoom
                    && a.children.len() == b.children.len()
                    && a
                        .children
                        .iter()
                        .zip(&b.children)
                        .all(|(x, y)| x.id() == y.id() && x.same_content(y))
            }
            _ => false,
        }
    }
}

/// Content-derived key of a group: hash of its sorted member ids
pub(crate) fn content_key(sorted_ids: &[FeatureId]) -> u64 {
    let mut hasher = DefaultHasher::new();
    sorted_ids.hash(&mut hasher);
    hasher.finish()
}

/// A node while levels are being merged
struct WorkNode {
    node: ClusterNode,
    count: usize,
    /// Coordinate sums in the query's unwrapped longitude frame
    lat_sum: f64,
    lon_sum: f64,
    min_lat: f64,
    min_lon: f64,
    max_lat: f64,
    max_lon: f64,
}

impl WorkNode {
    fn leaf(feature: Arc<Feature>, lon_offset: f64) -> Self {
        let lat = feature.lat();
        let lon = feature.lon() + lon_offset;
        Self {
            node: ClusterNode::Leaf(LeafNode::new(feature)),
            count: 1,
            lat_sum: lat,
            lon_sum: lon,
            min_lat: lat,
            min_lon: lon,
            max_lat: lat,
            max_lon: lon,
        }
    }

    #[inline]
    fn lat(&self) -> f64 {
        self.lat_sum / self.count as f64
    }

    #[inline]
    fn lon(&self) -> f64 {
        self.lon_sum / self.count as f64
    }

    /// Merge nodes (in seed order) into a group formed at `level`
    fn merge(members: Vec<WorkNode>, level: u8) -> Self {
        let mut count = 0;
        let (mut lat_sum, mut lon_sum) = (0.0, 0.0);
        let (mut min_lat, mut min_lon) = (f64::INFINITY, f64::INFINITY);
        let (mut max_lat, mut max_lon) = (f64::NEG_INFINITY, f64::NEG_INFINITY);

        let mut children = Vec::with_capacity(members.len());
        for member in members {
            count += member.count;
            lat_sum += member.lat_sum;
            lon_sum += member.lon_sum;
            min_lat = min_lat.min(member.min_lat);
            min_lon = min_lon.min(member.min_lon);
            max_lat = max_lat.max(member.max_lat);
            max_lon = max_lon.max(member.max_lon);
            children.push(member.node);
        }

        let group = GroupNode {
            // Assigned once the final membership is known
            id: NodeId::Cluster(0),
            centroid: Point::new(
                utils::wrap_longitude(lon_sum / count as f64),
                lat_sum / count as f64,
            ),
            count,
            bounds: BoundingBox {
                min_lat,
                min_lon,
                max_lat,
                max_lon,
            },
            expansion_zoom: level.saturating_add(1),
            children,
        };

        Self {
            node: ClusterNode::Group(group),
            count,
            lat_sum,
            lon_sum,
            min_lat,
            min_lon,
            max_lat,
            max_lon,
        }
    }
}

/// Assign content keys to every group
fn assign_content_ids(node: &mut ClusterNode) {
    if !node.is_group() {
        return;
    }
    let key = content_key(&node.member_ids());
    if let ClusterNode::Group(group) = node {
        group.id = NodeId::Cluster(key);
        group.children.iter_mut().for_each(assign_content_ids);
    }
}

/// Computes the visible nodes for a viewport
#[derive(Clone)]
pub struct ClusterEngine {
    policy: Arc<dyn RadiusPolicy>,
    min_zoom: u8,
    max_zoom: u8,
    tile_size: f64,
    edge_buffer_px: Option<f64>,
}

impl std::fmt::Debug for ClusterEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterEngine")
            .field("min_zoom", &self.min_zoom)
            .field("max_zoom", &self.max_zoom)
            .field("tile_size", &self.tile_size)
            .field("edge_buffer_px", &self.edge_buffer_px)
            .finish_non_exhaustive()
    }
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl ClusterEngine {
    /// Create an engine, validating the policy on every configured zoom level
    pub fn new(policy: impl RadiusPolicy + 'static, config: &Config) -> crate::Result<Self> {
        Self::with_shared_policy(Arc::new(policy), config)
    }

    /// Same as [`ClusterEngine::new`] for an already shared policy
    pub fn with_shared_policy(
        policy: Arc<dyn RadiusPolicy>,
        config: &Config,
    ) -> crate::Result<Self> {
        config.validate()?;
        policy::validate(policy.as_ref(), config.min_zoom, config.max_zoom)?;
        Ok(Self {
            policy,
            min_zoom: config.min_zoom,
            max_zoom: config.max_zoom,
            tile_size: config.tile_size,
            edge_buffer_px: config.edge_buffer_px,
        })
    }

    /// Clustering radius in pixels at a level
    #[inline]
    pub fn radius_at(&self, level: u8) -> f64 {
        self.policy.radius(level)
    }

    /// Integer level used for a viewport
    #[inline]
    pub fn level_for(&self, viewport: &Viewport) -> u8 {
        viewport.level(self.min_zoom, self.max_zoom)
    }

    /// Deepest level that still clusters, or `max_zoom` when none does
    ///
    /// The edge buffer is measured here so the candidate set for a given
    /// visible box does not depend on the zoom.
    pub fn buffer_level(&self) -> u8 {
        (self.min_zoom..=self.max_zoom)
            .rev()
            .find(|&level| self.radius_at(level) > 0.0)
            .unwrap_or(self.max_zoom)
    }

    /// Bounding box actually queried for a viewport (visible box plus edge buffer)
    pub fn query_bounds(&self, viewport: &Viewport) -> BoundingBox {
        let level = self.buffer_level();
        let buffer = self
            .edge_buffer_px
            .unwrap_or_else(|| self.radius_at(level))
            .max(0.0);
        viewport
            .bounds
            .expand_by_pixels(buffer, level as f64, self.tile_size)
    }

    /// Compute the visible nodes for a viewport
    ///
    /// Every feature inside [`ClusterEngine::query_bounds`] appears in exactly
    /// one returned node. Nodes are ordered by their smallest feature id.
    pub fn cluster(&self, index: &SpatialIndex, viewport: &Viewport) -> Vec<ClusterNode> {
        #[cfg(feature = "profiling")]
        profiling::scope!("engine::cluster");

        let level = self.level_for(viewport);
        let bounds = self.query_bounds(viewport);

        let mut query = index.query_range(&bounds);
        let mut candidates = Vec::new();
        while let Some((feature, lon_offset)) = query.next_with_offset() {
            candidates.push((Arc::clone(feature), lon_offset));
        }

        let nodes = self.cluster_candidates(candidates, level);
        tracing::debug!(
            "Clustered viewport at zoom {} (level {}) into {} nodes",
            viewport.zoom,
            level,
            nodes.len()
        );
        nodes
    }

    /// Cluster an explicit candidate list at a level
    ///
    /// Each candidate carries the longitude offset placing it in a common
    /// unwrapped frame (see [`crate::RangeQuery::next_with_offset`]).
    pub fn cluster_candidates(
        &self,
        mut candidates: Vec<(Arc<Feature>, f64)>,
        level: u8,
    ) -> Vec<ClusterNode> {
        candidates.sort_by(|a, b| a.0.id().cmp(b.0.id()));
        let level = level.clamp(self.min_zoom, self.max_zoom);

        let mut nodes: Vec<WorkNode> = candidates
            .into_iter()
            .map(|(feature, offset)| WorkNode::leaf(feature, offset))
            .collect();

        for current in (level..=self.max_zoom).rev() {
            if nodes.len() < 2 {
                break;
            }
            let radius = self.policy.radius(current);
            if radius <= 0.0 {
                continue;
            }
            nodes = self.merge_level(nodes, current, radius);
        }

        nodes
            .into_iter()
            .map(|work| {
                let mut node = work.node;
                assign_content_ids(&mut node);
                node
            })
            .collect()
    }

    /// One greedy pass over a level
    fn merge_level(&self, nodes: Vec<WorkNode>, level: u8, radius: f64) -> Vec<WorkNode> {
        let positions: Vec<Point<f64>> = nodes
            .iter()
            .map(|node| {
                utils::project_to_pixels(node.lat(), node.lon(), level as f64, self.tile_size)
            })
            .collect();

        let cell_of = |p: &Point<f64>| {
            (
                (p.x() / radius).floor() as i64,
                (p.y() / radius).floor() as i64,
            )
        };

        let mut grid: HashMap<(i64, i64), SmallVec<[usize; 8]>> = HashMap::new();
        for (i, position) in positions.iter().enumerate() {
            grid.entry(cell_of(position)).or_default().push(i);
        }

        let radius_sq = radius * radius;
        let mut assigned = vec![false; nodes.len()];
        let mut groups: Vec<SmallVec<[usize; 8]>> = Vec::new();

        for seed in 0..nodes.len() {
            if assigned[seed] {
                continue;
            }
            assigned[seed] = true;
            let mut members: SmallVec<[usize; 8]> = SmallVec::new();
            members.push(seed);

            let (cx, cy) = cell_of(&positions[seed]);
            for dy in -1..=1 {
                for dx in -1..=1 {
                    let Some(cell) = grid.get(&(cx + dx, cy + dy)) else {
                        continue;
                    };
                    for &other in cell {
                        if assigned[other] {
                            continue;
                        }
                        let ddx = positions[other].x() - positions[seed].x();
                        let ddy = positions[other].y() - positions[seed].y();
                        if ddx * ddx + ddy * ddy <= radius_sq {
                            assigned[other] = true;
                            members.push(other);
                        }
                    }
                }
            }

            // Children keep processing order
            members.sort_unstable();
            groups.push(members);
        }

        let mut slots: Vec<Option<WorkNode>> = nodes.into_iter().map(Some).collect();
        groups
            .into_iter()
            .map(|members| {
                let mut taken: Vec<WorkNode> =
                    members.iter().filter_map(|&i| slots[i].take()).collect();
                if taken.len() == 1 {
                    taken.remove(0)
                } else {
                    WorkNode::merge(taken, level)
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ZoomThresholdPolicy;

    fn index_of(points: &[(&str, f64, f64)]) -> SpatialIndex {
        let mut index = SpatialIndex::default();
        for (id, lat, lon) in points {
            let feature = Feature::new(*id, *lat, *lon).unwrap();
            index.insert(feature).unwrap();
        }
        index
    }

    fn world_viewport(zoom: f64) -> Viewport {
        Viewport::new(BoundingBox::world(), zoom)
    }

    fn default_engine() -> ClusterEngine {
        let policy = ZoomThresholdPolicy::default();
        ClusterEngine::new(policy, &Config::default()).unwrap()
    }

    fn unclustered_engine() -> ClusterEngine {
        let config = Config::default();
        ClusterEngine::new(|_zoom: u8| 0.0, &config).unwrap()
    }

    /// Pixel radius covering `degrees` of longitude at `zoom`
    fn radius_for_degrees(degrees: f64, zoom: u8) -> f64 {
        degrees / 360.0 * utils::world_size_px(zoom as f64, utils::DEFAULT_TILE_SIZE)
    }

    #[test]
    fn test_empty_index() {
        let engine = default_engine();
        let index = SpatialIndex::default();
        let nodes = engine.cluster(&index, &world_viewport(3.0));
        assert!(nodes.is_empty());
    }

    #[test]
    fn test_invalid_policy_fails_at_construction() {
        let result = ClusterEngine::new(|_zoom: u8| -1.0, &Config::default());
        assert!(matches!(result, Err(crate::ClusterError::InvalidPolicy(_))));
    }

    #[test]
    fn test_single_feature_is_leaf() {
        let index = index_of(&[("a", 1.0, 1.0)]);
        let engine = default_engine();
        let nodes = engine.cluster(&index, &world_viewport(0.0));
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].id(), NodeId::Feature(FeatureId::from("a")));
    }

    #[test]
    fn test_scenario_two_groups_then_leaves() {
        let index = index_of(&[
            ("a", 0.0, 0.0),
            ("b", 0.0, 0.001),
            ("c", 0.0, 0.002),
            ("d", 10.0, 10.0),
            ("e", 10.0, 10.001),
        ]);
        let radius = radius_for_degrees(0.005, 5);
        let policy = move |zoom: u8| if zoom >= 18 { 0.0 } else { radius };
        let engine = ClusterEngine::new(policy, &Config::default()).unwrap();

        let nodes = engine.cluster(&index, &world_viewport(5.0));
        assert_eq!(nodes.len(), 2);
        assert!(nodes.iter().all(ClusterNode::is_group));
        assert_eq!(nodes[0].count(), 3);
        assert_eq!(nodes[1].count(), 2);

        let first = nodes[0].as_group().unwrap();
        assert!((first.centroid().x() - 0.001).abs() < 1e-12);
        assert!(first.centroid().y().abs() < 1e-12);
        // "a" and "b" merge at level 7, "c" joins them at level 6
        assert_eq!(first.expansion_zoom(), 7);
        assert_eq!(first.children().len(), 2);

        let nodes = engine.cluster(&index, &world_viewport(18.0));
        assert_eq!(nodes.len(), 5);
        assert!(nodes.iter().all(|n| !n.is_group()));
    }

    #[test]
    fn test_tie_break_prefers_earlier_seed() {
        // "b" is within reach of both "a" and "c"; "a" seeds first
        let index = index_of(&[("a", 0.0, 0.0), ("b", 0.0, 1.0), ("c", 0.0, 2.0)]);
        let radius = radius_for_degrees(1.5, 4);
        let engine = ClusterEngine::new(
            move |zoom: u8| if zoom == 4 { radius } else { 0.0 },
            &Config::default(),
        )
        .unwrap();

        let nodes = engine.cluster(&index, &world_viewport(4.0));
        assert_eq!(nodes.len(), 2);
        let first: Vec<FeatureId> = vec!["a".into(), "b".into()];
        assert_eq!(nodes[0].member_ids(), first);
        assert_eq!(nodes[1].id(), NodeId::Feature(FeatureId::from("c")));
    }

    #[test]
    fn test_zero_radius_keeps_coincident_points_apart() {
        let index = index_of(&[("a", 5.0, 5.0), ("b", 5.0, 5.0)]);
        let engine = unclustered_engine();
        assert_eq!(engine.cluster(&index, &world_viewport(2.0)).len(), 2);
    }

    #[test]
    fn test_group_ids_are_content_keys() {
        let index = index_of(&[("a", 0.0, 0.0), ("b", 0.0, 0.0001)]);
        let engine = default_engine();
        let nodes = engine.cluster(&index, &world_viewport(3.0));
        assert_eq!(nodes.len(), 1);
        let expected = content_key(&[FeatureId::from("a"), FeatureId::from("b")]);
        assert_eq!(nodes[0].id(), NodeId::Cluster(expected));
    }

    #[test]
    fn test_nested_children_cover_members() {
        let mut points = Vec::new();
        for i in 0..30 {
            let (lat, lon) = ((i / 6) as f64 * 0.01, (i % 6) as f64 * 0.01);
            points.push((format!("p{i:02}"), lat, lon));
        }
        let mut index = SpatialIndex::default();
        for (id, lat, lon) in &points {
            let feature = Feature::new(id.as_str(), *lat, *lon).unwrap();
            index.insert(feature).unwrap();
        }
        let engine = default_engine();
        let nodes = engine.cluster(&index, &world_viewport(4.0));

        assert_eq!(nodes.len(), 1);
        let group = nodes[0].as_group().unwrap();
        assert_eq!(group.count(), 30);
        let child_total: usize = group.children().iter().map(ClusterNode::count).sum();
        assert_eq!(child_total, 30);
        assert_eq!(nodes[0].features().len(), 30);
    }

    #[test]
    fn test_antimeridian_group_centroid_wraps() {
        let index = index_of(&[("a", 0.0, 179.99), ("b", 0.0, -179.99)]);
        let engine = default_engine();
        let viewport = Viewport::new(BoundingBox::new(-5.0, 175.0, 5.0, 185.0), 6.0);

        let nodes = engine.cluster(&index, &viewport);
        assert_eq!(nodes.len(), 1);
        let group = nodes[0].as_group().unwrap();
        assert!((group.centroid().x().abs() - 180.0).abs() < 1e-9);
        assert!(group.bounds().max_lon > 180.0);
    }

    #[test]
    fn test_edge_buffer_includes_nearby_features() {
        let index = index_of(&[("inside", 0.0, 0.0), ("outside", 0.0, 10.5)]);
        let config = Config {
            edge_buffer_px: Some(0.0),
            ..Config::default()
        };
        let policy = |zoom: u8| if zoom >= 4 { 0.0 } else { 1.0 };
        let tight = ClusterEngine::new(policy, &config).unwrap();
        let viewport = Viewport::new(BoundingBox::new(-10.0, -10.0, 10.0, 10.0), 3.0);
        assert_eq!(tight.cluster(&index, &viewport).len(), 1);

        // Measured at level 3, the deepest clustered one: 80px is ~14 degrees
        let config = Config {
            edge_buffer_px: Some(80.0),
            ..Config::default()
        };
        let buffered = ClusterEngine::new(policy, &config).unwrap();
        assert_eq!(buffered.buffer_level(), 3);
        assert_eq!(buffered.cluster(&index, &viewport).len(), 2);
    }

    #[test]
    fn test_query_bounds_ignore_zoom() {
        let engine = default_engine();
        assert_eq!(engine.buffer_level(), 17);

        let bounds = BoundingBox::new(-10.0, -10.0, 10.0, 10.0);
        let reference = engine.query_bounds(&Viewport::new(bounds, 0.0));
        for zoom in 1..=18 {
            let viewport = Viewport::new(bounds, zoom as f64);
            assert_eq!(engine.query_bounds(&viewport), reference);
        }
        // 80px at level 17 is well under a thousandth of a degree
        assert!(reference.max_lon - 10.0 < 1e-3);

        let unclustered = unclustered_engine();
        assert_eq!(unclustered.buffer_level(), 18);
        let viewport = Viewport::new(bounds, 2.0);
        assert_eq!(unclustered.query_bounds(&viewport), bounds);
    }

    #[test]
    fn test_same_content() {
        let index = index_of(&[("a", 0.0, 0.0), ("b", 0.0, 0.0001), ("c", 40.0, 40.0)]);
        let engine = default_engine();
        let first = engine.cluster(&index, &world_viewport(3.0));
        let second = engine.cluster(&index, &world_viewport(3.0));
        assert_eq!(first, second);
        assert!(first[0].same_content(&second[0]));
        assert!(!first[0].same_content(&first[1]));
    }
}
