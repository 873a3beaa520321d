//! Rendering side of the map: sinks, the visible marker set, and popups

use crate::{
    AttributeValue, Attributes, ClusterError, ClusterNode, NodeId, RenderInstruction, Result,
};
use std::collections::BTreeMap;
use std::fmt::Write as _;

/// Placeholder for missing or blank popup attributes (see [`AttributeValue::is_blank`])
pub const UNKNOWN_LABEL: &str = "Unknown";

/// Receives the instruction batches produced by a session
pub trait RenderSink {
    fn render(&mut self, instructions: &[RenderInstruction]) -> Result<()>;
}

/// The set of markers currently on screen, keyed by node id
///
/// Applying the batch from [`crate::diff`] to the layer holding its `previous`
/// input leaves it holding exactly the `current` input.
#[derive(Debug, Clone, Default)]
pub struct MarkerLayer {
    markers: BTreeMap<NodeId, ClusterNode>,
}

impl MarkerLayer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one batch of instructions in order
    ///
    /// Adding an existing id or removing/updating a missing one is a
    /// reconciliation error; instructions before the failing one stay applied.
    pub fn apply(&mut self, instructions: &[RenderInstruction]) -> Result<()> {
        for instruction in instructions {
            match instruction {
                RenderInstruction::Add { node } => {
                    let id = node.id();
                    if self.markers.contains_key(&id) {
                        return Err(ClusterError::Reconcile(format!("add of visible node {id}")));
                    }
                    self.markers.insert(id, node.clone());
                }
                RenderInstruction::Remove { id } => {
                    if self.markers.remove(id).is_none() {
                        let message = format!("remove of unknown node {id}");
                        return Err(ClusterError::Reconcile(message));
                    }
                }
                RenderInstruction::Update { node } => {
                    let id = node.id();
                    match self.markers.get_mut(&id) {
                        Some(slot) => *slot = node.clone(),
                        None => {
                            let message = format!("update of unknown node {id}");
                            return Err(ClusterError::Reconcile(message));
                        }
                    }
                }
            }
        }
        Ok(())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.markers.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.markers.contains_key(id)
    }

    pub fn get(&self, id: &NodeId) -> Option<&ClusterNode> {
        self.markers.get(id)
    }

    /// Visible nodes ordered by id
    pub fn nodes(&self) -> impl Iterator<Item = &ClusterNode> + '_ {
        self.markers.values()
    }

    /// Total number of features represented on screen
    pub fn feature_count(&self) -> usize {
        self.markers.values().map(ClusterNode::count).sum()
    }

    /// Whether the layer shows exactly `nodes`
    pub fn matches(&self, nodes: &[ClusterNode]) -> bool {
        nodes.len() == self.markers.len()
            && nodes.iter().all(|node| {
                self.markers
                    .get(&node.id())
                    .is_some_and(|shown| shown.same_content(node))
            })
    }

    pub fn clear(&mut self) {
        self.markers.clear();
    }
}

impl RenderSink for MarkerLayer {
    fn render(&mut self, instructions: &[RenderInstruction]) -> Result<()> {
        self.apply(instructions)
    }
}

/// Text shown when a marker is clicked
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PopupContent {
    /// Marker label (`name`)
    pub name: String,
    /// Bold heading (`relation`, or the member count for groups)
    pub title: String,
    /// Italic line below the heading (`type`), absent for groups
    pub subtitle: Option<String>,
}

impl PopupContent {
    /// Popup of a single feature
    pub fn from_attributes(attributes: &Attributes) -> Self {
        let text = |key: &str| {
            attributes
                .get(key)
                .filter(|value| !value.is_blank())
                .and_then(AttributeValue::as_text)
                .unwrap_or_else(|| UNKNOWN_LABEL.to_string())
        };
        Self {
            name: text("name"),
            title: text("relation"),
            subtitle: Some(text("type")),
        }
    }

    /// Popup of any visible node
    pub fn for_node(node: &ClusterNode) -> Self {
        match node {
            ClusterNode::Leaf(leaf) => Self::from_attributes(leaf.feature().attributes()),
            ClusterNode::Group(group) => {
                let label = format!("{} features", group.count());
                Self {
                    name: label.clone(),
                    title: label,
                    subtitle: None,
                }
            }
        }
    }

    /// HTML fragment with every value escaped
    pub fn to_html(&self) -> String {
        let mut html = format!("<strong>{}</strong>", escape_html(&self.title));
        if let Some(subtitle) = &self.subtitle {
            let _ = write!(html, "<br><em>{}</em>", escape_html(subtitle));
        }
        html
    }
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}
