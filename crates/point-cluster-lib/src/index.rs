//! Quadtree spatial index for point features
//!
//! The tree is rooted at the whole globe in plain longitude/latitude degrees and
//! subdivides a node once it holds more than `max_points_per_node` features.
//! Range queries prune every subtree whose bounds miss the query box, so a
//! viewport-sized query only touches the nodes it overlaps.

use crate::viewport::BoxPart;
use crate::{BoundingBox, ClusterError, Feature, FeatureId, Result};
use geo::{Coord, Rect};
use smallvec::SmallVec;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BinaryHeap};
use std::sync::Arc;

/// Maximum depth of the quadtree to prevent infinite recursion on coincident points
const MAX_DEPTH: u32 = 24;

/// Default leaf capacity before a node subdivides
pub(crate) const DEFAULT_MAX_POINTS_PER_NODE: usize = 16;

/// Point index queryable by bounding box
#[derive(Debug, Clone)]
pub struct SpatialIndex {
    /// Root node covering the entire globe
    root: QuadtreeNode,
    /// Every indexed feature by id (ordered, so `all()` is deterministic)
    features: BTreeMap<FeatureId, Arc<Feature>>,
    /// Leaf capacity before subdivision
    max_points_per_node: usize,
}

/// A single node in the quadtree
#[derive(Debug, Clone)]
struct QuadtreeNode {
    /// Bounds in degrees (x = lon, y = lat)
    bounding_box: Rect<f64>,
    /// Depth level in the tree (0 = root)
    level: u32,
    /// Features stored at this node (only leaves hold features)
    features: Vec<Arc<Feature>>,
    /// Child nodes (NW, NE, SW, SE) if subdivided
    children: Option<Box<[QuadtreeNode; 4]>>,
}

impl Default for SpatialIndex {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_POINTS_PER_NODE)
    }
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl SpatialIndex {
    /// Create an empty index
    ///
    /// # Arguments
    /// * `max_points_per_node` - Leaf capacity before subdivision (at least 1)
    pub fn new(max_points_per_node: usize) -> Self {
        Self {
            root: QuadtreeNode::new_root(),
            features: BTreeMap::new(),
            max_points_per_node: max_points_per_node.max(1),
        }
    }

    /// Add a feature
    ///
    /// Fails with [`ClusterError::DuplicateId`] if the id is already indexed.
    pub fn insert(&mut self, feature: impl Into<Arc<Feature>>) -> Result<()> {
        let feature = feature.into();
        if self.features.contains_key(feature.id()) {
            return Err(ClusterError::DuplicateId(feature.id().clone()));
        }

        self.features
            .insert(feature.id().clone(), Arc::clone(&feature));
        self.root.insert(feature, self.max_points_per_node);
        Ok(())
    }

    /// Remove a feature by id and return it
    ///
    /// Fails with [`ClusterError::NotFound`] if the id is not indexed.
    pub fn remove(&mut self, id: &FeatureId) -> Result<Arc<Feature>> {
        let feature = self
            .features
            .remove(id)
            .ok_or_else(|| ClusterError::NotFound(id.clone()))?;

        let removed = self.root.remove(&feature, self.max_points_per_node);
        debug_assert!(removed, "feature {id} missing from quadtree");
        Ok(feature)
    }

    /// Lazily iterate every feature inside the box (inclusive)
    ///
    /// A box crossing the antimeridian is queried as two ranges whose results
    /// are chained. The returned iterator can be cloned to restart it.
    pub fn query_range(&self, bbox: &BoundingBox) -> RangeQuery<'_> {
        RangeQuery::new(&self.root, bbox.parts())
    }

    /// Every indexed feature, ordered by id
    pub fn all(&self) -> impl Iterator<Item = &Arc<Feature>> + '_ {
        self.features.values()
    }

    #[inline]
    pub fn get(&self, id: &FeatureId) -> Option<&Arc<Feature>> {
        self.features.get(id)
    }

    #[inline]
    pub fn contains(&self, id: &FeatureId) -> bool {
        self.features.contains_key(id)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.features.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Drop every feature
    pub fn clear(&mut self) {
        self.root = QuadtreeNode::new_root();
        self.features.clear();
    }

    /// Depth of the deepest node (0 for an unsplit root)
    pub fn depth(&self) -> u32 {
        self.root.depth()
    }

    #[inline]
    pub fn max_points_per_node(&self) -> usize {
        self.max_points_per_node
    }

    /// Up to `k` features closest to a coordinate, nearest first
    ///
    /// Distance is measured in degrees on the lon/lat plane, wrapping across
    /// the antimeridian. Ties are broken by feature id.
    pub fn nearest(&self, lat: f64, lon: f64, k: usize) -> Vec<&Arc<Feature>> {
        let mut found = Vec::with_capacity(k.min(self.len()));
        if k == 0 || self.is_empty() {
            return found;
        }

        let mut heap = BinaryHeap::new();
        heap.push(Candidate {
            distance: self.root.min_distance(lat, lon),
            entry: Entry::Node(&self.root),
        });

        while let Some(Candidate { entry, .. }) = heap.pop() {
            match entry {
                Entry::Feature(feature) => {
                    found.push(feature);
                    if found.len() == k {
                        break;
                    }
                }
                Entry::Node(node) => {
                    for feature in &node.features {
                        heap.push(Candidate {
                            distance: point_distance(lat, lon, feature),
                            entry: Entry::Feature(feature),
                        });
                    }
                    if let Some(children) = &node.children {
                        for child in children.iter() {
                            heap.push(Candidate {
                                distance: child.min_distance(lat, lon),
                                entry: Entry::Node(child),
                            });
                        }
                    }
                }
            }
        }
        found
    }
}

/// Nearest-neighbour search frontier entry, ordered as a min-heap
struct Candidate<'a> {
    distance: f64,
    entry: Entry<'a>,
}

enum Entry<'a> {
    Node(&'a QuadtreeNode),
    Feature(&'a Arc<Feature>),
}

impl Candidate<'_> {
    /// Nodes expand before features at equal distance, features then go by id
    fn key_cmp(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then_with(|| match (&self.entry, &other.entry) {
                (Entry::Node(_), Entry::Node(_)) => Ordering::Equal,
                (Entry::Node(_), Entry::Feature(_)) => Ordering::Less,
                (Entry::Feature(_), Entry::Node(_)) => Ordering::Greater,
                (Entry::Feature(a), Entry::Feature(b)) => a.id().cmp(b.id()),
            })
    }
}

impl PartialEq for Candidate<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.key_cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate<'_> {}

impl PartialOrd for Candidate<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        other.key_cmp(self)
    }
}

/// Longitude difference in degrees, across the antimeridian if shorter
#[inline]
fn lon_delta(a: f64, b: f64) -> f64 {
    let delta = (a - b).abs() % 360.0;
    delta.min(360.0 - delta)
}

#[inline]
fn point_distance(lat: f64, lon: f64, feature: &Feature) -> f64 {
    (feature.lat() - lat).hypot(lon_delta(feature.lon(), lon))
}

impl QuadtreeNode {
    /// Create a root node covering the entire globe
    fn new_root() -> Self {
        Self::new_child(
            Rect::new(Coord { x: -180.0, y: -90.0 }, Coord { x: 180.0, y: 90.0 }),
            0,
        )
    }

    fn new_child(bounding_box: Rect<f64>, level: u32) -> Self {
        Self {
            bounding_box,
            level,
            features: Vec::new(),
            children: None,
        }
    }

    /// Index of the child (NW, NE, SW, SE) that owns a coordinate
    ///
    /// Points on a split line belong to the north/east side.
    #[inline]
    fn child_index(&self, lon: f64, lat: f64) -> usize {
        let center = self.bounding_box.center();
        match (lat >= center.y, lon >= center.x) {
            (true, false) => 0,
            (true, true) => 1,
            (false, false) => 2,
            (false, true) => 3,
        }
    }

    /// Subdivide this node into 4 children and push its features down
    fn subdivide(&mut self, capacity: usize) {
        if self.children.is_some() {
            return;
        }

        let min = self.bounding_box.min();
        let max = self.bounding_box.max();
        let mid_x = (min.x + max.x) / 2.0;
        let mid_y = (min.y + max.y) / 2.0;
        let child_level = self.level + 1;

        // Create 4 children: NW, NE, SW, SE
        let nw = QuadtreeNode::new_child(
            Rect::new(Coord { x: min.x, y: mid_y }, Coord { x: mid_x, y: max.y }),
            child_level,
        );
        let ne = QuadtreeNode::new_child(
            Rect::new(Coord { x: mid_x, y: mid_y }, Coord { x: max.x, y: max.y }),
            child_level,
        );
        let sw = QuadtreeNode::new_child(
            Rect::new(Coord { x: min.x, y: min.y }, Coord { x: mid_x, y: mid_y }),
            child_level,
        );
        let se = QuadtreeNode::new_child(
            Rect::new(Coord { x: mid_x, y: min.y }, Coord { x: max.x, y: mid_y }),
            child_level,
        );
        self.children = Some(Box::new([nw, ne, sw, se]));

        for feature in std::mem::take(&mut self.features) {
            self.insert(feature, capacity);
        }
    }

    fn insert(&mut self, feature: Arc<Feature>, capacity: usize) {
        let index = self.child_index(feature.lon(), feature.lat());
        if let Some(children) = &mut self.children {
            children[index].insert(feature, capacity);
            return;
        }

        self.features.push(feature);
        if self.features.len() > capacity && self.level < MAX_DEPTH {
            self.subdivide(capacity);
        }
    }

    /// Remove a feature, collapsing children that fit back into one leaf
    fn remove(&mut self, feature: &Feature, capacity: usize) -> bool {
        let index = self.child_index(feature.lon(), feature.lat());
        let Some(children) = &mut self.children else {
            let position = self.features.iter().position(|f| f.id() == feature.id());
            return match position {
                Some(position) => {
                    self.features.remove(position);
                    true
                }
                None => false,
            };
        };

        let removed = children[index].remove(feature, capacity);
        let total: usize = children.iter().map(|child| child.features.len()).sum();
        if removed && children.iter().all(|child| child.children.is_none()) && total <= capacity {
            let mut merged = Vec::new();
            for child in children.iter_mut() {
                merged.append(&mut child.features);
            }
            self.features = merged;
            self.children = None;
        }
        removed
    }

    /// Lower bound of the distance from a coordinate to anything in this node
    fn min_distance(&self, lat: f64, lon: f64) -> f64 {
        let min = self.bounding_box.min();
        let max = self.bounding_box.max();
        let dy = (min.y - lat).max(lat - max.y).max(0.0);
        let dx = [lon - 360.0, lon, lon + 360.0]
            .into_iter()
            .map(|lon| (min.x - lon).max(lon - max.x).max(0.0))
            .fold(f64::INFINITY, f64::min);
        dx.hypot(dy)
    }

    fn depth(&self) -> u32 {
        match &self.children {
            Some(children) => children.iter().map(QuadtreeNode::depth).max().unwrap_or(0) + 1,
            None => 0,
        }
    }

    /// Check if this node intersects the query rectangle (edges inclusive)
    #[inline]
    fn intersects(&self, rect: &Rect<f64>) -> bool {
        let min = self.bounding_box.min();
        let max = self.bounding_box.max();
        let vmin = rect.min();
        let vmax = rect.max();

        !(max.x < vmin.x || min.x > vmax.x || max.y < vmin.y || min.y > vmax.y)
    }
}

#[inline]
fn rect_contains(rect: &Rect<f64>, feature: &Feature) -> bool {
    let min = rect.min();
    let max = rect.max();
    feature.lon() >= min.x
        && feature.lon() <= max.x
        && feature.lat() >= min.y
        && feature.lat() <= max.y
}

/// Lazy iterator over the features inside a bounding box
///
/// Clone it before consuming to iterate the same range again.
#[derive(Debug, Clone)]
pub struct RangeQuery<'a> {
    root: &'a QuadtreeNode,
    parts: SmallVec<[BoxPart; 2]>,
    part_index: usize,
    stack: Vec<&'a QuadtreeNode>,
    current: std::slice::Iter<'a, Arc<Feature>>,
}

impl<'a> RangeQuery<'a> {
    fn new(root: &'a QuadtreeNode, parts: SmallVec<[BoxPart; 2]>) -> Self {
        let stack = if parts.is_empty() { Vec::new() } else { vec![root] };
        Self {
            root,
            parts,
            part_index: 0,
            stack,
            current: Default::default(),
        }
    }

    /// Next feature together with the longitude offset that places it in the
    /// query box's unwrapped frame (`0.0` unless the box crosses ±180°)
    pub fn next_with_offset(&mut self) -> Option<(&'a Arc<Feature>, f64)> {
        loop {
            let part = self.parts.get(self.part_index)?;

            if let Some(feature) = self.current.next() {
                if rect_contains(&part.rect, feature) {
                    return Some((feature, part.lon_offset));
                }
                continue;
            }

            if let Some(node) = self.stack.pop() {
                if !node.intersects(&part.rect) {
                    continue;
                }
                self.current = node.features.iter();
                if let Some(children) = &node.children {
                    // Reverse so NW is visited first
                    self.stack.extend(children.iter().rev());
                }
                continue;
            }

            self.part_index += 1;
            if self.part_index < self.parts.len() {
                self.stack.push(self.root);
            }
        }
    }
}

impl<'a> Iterator for RangeQuery<'a> {
    type Item = &'a Arc<Feature>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_with_offset().map(|(feature, _)| feature)
    }
}

impl std::iter::FusedIterator for RangeQuery<'_> {}
