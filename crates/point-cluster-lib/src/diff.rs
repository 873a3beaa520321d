//! Minimal instruction sets between two cluster outputs

use crate::{ClusterNode, FeatureId, NodeId};
use serde::Serialize;
use std::collections::{HashMap, HashSet};

/// One change to apply to the visible set
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum RenderInstruction {
    Add { node: ClusterNode },
    Remove { id: NodeId },
    Update { node: ClusterNode },
}

impl RenderInstruction {
    /// Id of the node this instruction targets
    pub fn id(&self) -> NodeId {
        match self {
            Self::Add { node } | Self::Update { node } => node.id(),
            Self::Remove { id } => id.clone(),
        }
    }
}

/// Compute the instructions turning `previous` into `current`
///
/// Removes come first (in `previous` order), then adds and updates in
/// `current` order. A node present on both sides is updated only when its
/// rendering changed. Identical inputs produce no instructions.
#[cfg_attr(feature = "profiling", profiling::function)]
pub fn diff(previous: &[ClusterNode], current: &[ClusterNode]) -> Vec<RenderInstruction> {
    let before: HashMap<NodeId, &ClusterNode> =
        previous.iter().map(|node| (node.id(), node)).collect();
    let after: HashSet<NodeId> = current.iter().map(ClusterNode::id).collect();

    let mut instructions: Vec<RenderInstruction> = previous
        .iter()
        .map(ClusterNode::id)
        .filter(|id| !after.contains(id))
        .map(|id| RenderInstruction::Remove { id })
        .collect();

    for node in current {
        let instruction = match before.get(&node.id()) {
            Some(old) if old.same_content(node) => continue,
            Some(_) => RenderInstruction::Update { node: node.clone() },
            None => RenderInstruction::Add { node: node.clone() },
        };
        instructions.push(instruction);
    }

    tracing::trace!(
        "Diffed {} -> {} nodes into {} instructions",
        previous.len(),
        current.len(),
        instructions.len()
    );
    instructions
}

/// Keeps group ids stable across recomputations
///
/// A new group inherits the id of the previous group it overlaps most, as long
/// as the Jaccard overlap of their members reaches `min_overlap`. Groups claim
/// ids greedily in output order and every previous id is claimed at most once.
/// Other groups receive fresh ids from a counter.
#[derive(Debug, Clone)]
pub struct StableIds {
    min_overlap: f64,
    next_key: u64,
    previous: Vec<(u64, Vec<FeatureId>)>,
}

impl StableIds {
    pub fn new(min_overlap: f64) -> Self {
        Self {
            min_overlap: min_overlap.clamp(0.0, 1.0),
            next_key: 1,
            previous: Vec::new(),
        }
    }

    #[inline]
    pub fn min_overlap(&self) -> f64 {
        self.min_overlap
    }

    /// Forget the previous generation, so every group gets a fresh id next time
    pub fn reset(&mut self) {
        self.previous.clear();
    }

    /// Replace the ids of the top-level groups in `nodes` and remember them
    pub fn assign(&mut self, nodes: &mut [ClusterNode]) {
        let generation = self.label(nodes);
        self.commit(generation);
    }

    /// Replace the ids of the top-level groups in `nodes`
    ///
    /// Nothing is remembered until the returned generation is passed to
    /// [`StableIds::commit`]; dropping it leaves the previous ids in place.
    pub fn label(&self, nodes: &mut [ClusterNode]) -> IdGeneration {
        let owner: HashMap<&FeatureId, usize> = self
            .previous
            .iter()
            .enumerate()
            .flat_map(|(index, (_, members))| {
                members.iter().map(move |id| (id, index))
            })
            .collect();

        let mut claimed = vec![false; self.previous.len()];
        let mut next_key = self.next_key;
        let mut groups = Vec::new();

        for node in nodes.iter_mut() {
            let ClusterNode::Group(group) = node else {
                continue;
            };
            let members = group.member_ids();

            let mut shared: HashMap<usize, usize> = HashMap::new();
            for id in &members {
                if let Some(&index) = owner.get(id) {
                    *shared.entry(index).or_default() += 1;
                }
            }

            let mut best: Option<(usize, f64)> = None;
            for (&index, &common) in &shared {
                if claimed[index] {
                    continue;
                }
                let union = members.len() + self.previous[index].1.len() - common;
                let overlap = common as f64 / union as f64;
                let better = match best {
                    None => true,
                    Some((best_index, best_overlap)) => {
                        overlap > best_overlap || (overlap == best_overlap && index < best_index)
                    }
                };
                if overlap >= self.min_overlap && better {
                    best = Some((index, overlap));
                }
            }

            let key = match best {
                Some((index, _)) => {
                    claimed[index] = true;
                    self.previous[index].0
                }
                None => {
                    let key = next_key;
                    next_key += 1;
                    key
                }
            };
            group.set_id(NodeId::Cluster(key));
            groups.push((key, members));
        }

        IdGeneration { next_key, groups }
    }

    /// Make a labelled generation the reference for the next one
    pub fn commit(&mut self, generation: IdGeneration) {
        self.next_key = generation.next_key;
        self.previous = generation.groups;
    }
}

/// Group ids handed out by one [`StableIds::label`] call
#[derive(Debug, Clone)]
pub struct IdGeneration {
    next_key: u64,
    groups: Vec<(u64, Vec<FeatureId>)>,
}
