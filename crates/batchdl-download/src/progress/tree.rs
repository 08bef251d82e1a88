//! Weighted progress aggregation tree, stored as an arena.
//!
//! Nodes are addressed by [`NodeId`] and hold their parent and a list of
//! `(child, weight)` pairs; nothing holds a reference to another node. A
//! leaf's units are set directly. A composite derives its units from its
//! children: `total = Σ weight` and `completed = Σ child.fraction × weight`.
//!
//! Every mutation returns the nodes whose snapshot changed, bottom-up, so
//! the caller can notify observers without the tree knowing about them.
//!
//! This module is pure (no async, no IO, no tracing).

use thiserror::Error;

/// Arena index of a progress node.
///
/// The generation makes ids of removed nodes stale instead of aliasing a
/// node that later reuses the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId {
    index: usize,
    generation: u32,
}

/// Units of a node at one point in time.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ProgressSnapshot {
    /// Work done.
    pub completed_units: f64,
    /// Work expected; zero while unknown.
    pub total_units: f64,
}

impl ProgressSnapshot {
    /// Snapshot with the given units.
    pub const fn new(completed_units: f64, total_units: f64) -> Self {
        Self {
            completed_units,
            total_units,
        }
    }

    /// `completed / total`, or `None` while the total is zero.
    pub fn fraction(&self) -> Option<f64> {
        if self.total_units > 0.0 {
            Some((self.completed_units / self.total_units).clamp(0.0, 1.0))
        } else {
            None
        }
    }

    /// Whether all expected work is done.
    pub fn is_complete(&self) -> bool {
        self.total_units > 0.0 && self.completed_units >= self.total_units
    }
}

/// Errors from structural tree operations.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum TreeError {
    /// The id does not refer to a live node.
    #[error("unknown progress node")]
    UnknownNode,
    /// The child already has a parent.
    #[error("progress node already has a parent")]
    AlreadyAttached,
    /// Attaching would create a cycle.
    #[error("attaching progress node would create a cycle")]
    Cycle,
    /// Weights must be finite and positive.
    #[error("invalid progress weight")]
    InvalidWeight,
    /// Composite units are derived and cannot be set.
    #[error("progress node is a composite")]
    NotALeaf,
    /// The node is not a child of the given parent.
    #[error("progress node is not a child of this parent")]
    NotAChild,
}

#[derive(Debug)]
struct Node {
    snapshot: ProgressSnapshot,
    parent: Option<NodeId>,
    children: Vec<(NodeId, f64)>,
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    node: Option<Node>,
}

/// Arena of progress nodes.
#[derive(Debug, Default)]
pub struct ProgressTree {
    slots: Vec<Slot>,
    free: Vec<usize>,
    live: usize,
}

impl ProgressTree {
    /// Create an empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live nodes.
    pub const fn len(&self) -> usize {
        self.live
    }

    /// Whether the tree has no nodes.
    pub const fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Add a detached node with `total_units` of work and nothing done.
    ///
    /// A node becomes a composite once children are attached to it.
    pub fn add_node(&mut self, total_units: f64) -> NodeId {
        let node = Node {
            snapshot: ProgressSnapshot::new(0.0, total_units.max(0.0)),
            parent: None,
            children: Vec::new(),
        };
        self.live += 1;

        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index];
            slot.generation = slot.generation.wrapping_add(1);
            slot.node = Some(node);
            NodeId {
                index,
                generation: slot.generation,
            }
        } else {
            self.slots.push(Slot {
                generation: 0,
                node: Some(node),
            });
            NodeId {
                index: self.slots.len() - 1,
                generation: 0,
            }
        }
    }

    /// Current snapshot of a node.
    pub fn snapshot(&self, id: NodeId) -> Option<ProgressSnapshot> {
        self.node(id).map(|n| n.snapshot)
    }

    /// Current fraction of a node; `None` for unknown nodes or zero totals.
    pub fn fraction(&self, id: NodeId) -> Option<f64> {
        self.snapshot(id).and_then(|s| s.fraction())
    }

    /// Parent of a node.
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).and_then(|n| n.parent)
    }

    /// Children of a node with their weights.
    pub fn children(&self, id: NodeId) -> &[(NodeId, f64)] {
        self.node(id).map_or(&[], |n| n.children.as_slice())
    }

    /// Attach `child` under `parent` with `weight` units.
    ///
    /// Returns the nodes whose snapshot changed.
    pub fn add_child(
        &mut self,
        parent: NodeId,
        child: NodeId,
        weight: f64,
    ) -> Result<Vec<NodeId>, TreeError> {
        if !weight.is_finite() || weight <= 0.0 {
            return Err(TreeError::InvalidWeight);
        }
        if self.node(child).ok_or(TreeError::UnknownNode)?.parent.is_some() {
            return Err(TreeError::AlreadyAttached);
        }
        self.node(parent).ok_or(TreeError::UnknownNode)?;

        let mut cursor = Some(parent);
        while let Some(id) = cursor {
            if id == child {
                return Err(TreeError::Cycle);
            }
            cursor = self.parent(id);
        }

        self.node_mut(child).ok_or(TreeError::UnknownNode)?.parent = Some(parent);
        self.node_mut(parent)
            .ok_or(TreeError::UnknownNode)?
            .children
            .push((child, weight));

        Ok(self.propagate_from(parent))
    }

    /// Detach `child` from `parent`. The child stays alive as a root.
    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) -> Result<Vec<NodeId>, TreeError> {
        let node = self.node_mut(parent).ok_or(TreeError::UnknownNode)?;
        let position = node
            .children
            .iter()
            .position(|(c, _)| *c == child)
            .ok_or(TreeError::NotAChild)?;
        node.children.remove(position);

        if let Some(child) = self.node_mut(child) {
            child.parent = None;
        }

        Ok(self.propagate_from(parent))
    }

    /// Remove a node and its whole subtree, detaching it from its parent.
    ///
    /// Returns the removed ids.
    pub fn remove(&mut self, id: NodeId) -> Vec<NodeId> {
        let Some(parent) = self.node(id).map(|n| n.parent) else {
            return Vec::new();
        };
        if let Some(parent) = parent {
            let _ = self.remove_child(parent, id);
        }

        let mut removed = Vec::new();
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            if let Some(node) = self.take(next) {
                stack.extend(node.children.iter().map(|(c, _)| *c));
                removed.push(next);
            }
        }
        removed
    }

    /// Set the units of a leaf.
    ///
    /// Updates that would lower the leaf's fraction are ignored, so a
    /// leaf's fraction never decreases. `completed` is clamped to `total`.
    /// Returns the nodes whose snapshot changed, the leaf first.
    pub fn set_leaf(
        &mut self,
        id: NodeId,
        completed: f64,
        total: f64,
    ) -> Result<Vec<NodeId>, TreeError> {
        let node = self.node(id).ok_or(TreeError::UnknownNode)?;
        if !node.children.is_empty() {
            return Err(TreeError::NotALeaf);
        }

        let total = total.max(0.0);
        let next = ProgressSnapshot::new(completed.clamp(0.0, total), total);
        let current = node.snapshot;

        if next == current {
            return Ok(Vec::new());
        }
        if let Some(before) = current.fraction() {
            match next.fraction() {
                Some(after) if after >= before => {}
                _ => return Ok(Vec::new()),
            }
        }

        self.node_mut(id).ok_or(TreeError::UnknownNode)?.snapshot = next;

        let mut changed = vec![id];
        if let Some(parent) = self.parent(id) {
            changed.extend(self.propagate_from(parent));
        }
        Ok(changed)
    }

    /// Mark a leaf as fully done.
    ///
    /// A leaf with an unknown total becomes `1/1`.
    pub fn complete(&mut self, id: NodeId) -> Result<Vec<NodeId>, TreeError> {
        let total = self.snapshot(id).ok_or(TreeError::UnknownNode)?.total_units;
        let total = if total > 0.0 { total } else { 1.0 };
        self.set_leaf(id, total, total)
    }

    /// Recompute `start` and its ancestors, returning those that changed.
    fn propagate_from(&mut self, start: NodeId) -> Vec<NodeId> {
        let mut changed = Vec::new();
        let mut cursor = Some(start);

        while let Some(id) = cursor {
            let Some(node) = self.node(id) else { break };
            if node.children.is_empty() {
                // A composite that lost its last child keeps its last value.
                cursor = node.parent;
                continue;
            }

            let mut derived = ProgressSnapshot::default();
            for (child, weight) in &node.children {
                derived.total_units += weight;
                derived.completed_units += self.fraction(*child).unwrap_or(0.0) * weight;
            }
            let parent = node.parent;

            if let Some(node) = self.node_mut(id) {
                if node.snapshot != derived {
                    node.snapshot = derived;
                    changed.push(id);
                }
            }
            cursor = parent;
        }

        changed
    }

    fn node(&self, id: NodeId) -> Option<&Node> {
        self.slots
            .get(id.index)
            .filter(|s| s.generation == id.generation)
            .and_then(|s| s.node.as_ref())
    }

    fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.slots
            .get_mut(id.index)
            .filter(|s| s.generation == id.generation)
            .and_then(|s| s.node.as_mut())
    }

    fn take(&mut self, id: NodeId) -> Option<Node> {
        let slot = self
            .slots
            .get_mut(id.index)
            .filter(|s| s.generation == id.generation)?;
        let node = slot.node.take()?;
        self.free.push(id.index);
        self.live -= 1;
        Some(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: Option<f64>, b: f64) -> bool {
        a.is_some_and(|a| (a - b).abs() < 1e-9)
    }

    #[test]
    fn leaf_fraction_and_unknown_total() {
        let mut tree = ProgressTree::new();
        let unknown = tree.add_node(0.0);
        assert_eq!(tree.fraction(unknown), None);

        let leaf = tree.add_node(200.0);
        assert!(approx(tree.fraction(leaf), 0.0));
        let changed = tree.set_leaf(leaf, 50.0, 200.0).unwrap();
        assert_eq!(changed, vec![leaf]);
        assert!(approx(tree.fraction(leaf), 0.25));
    }

    #[test]
    fn composite_weights_children() {
        let mut tree = ProgressTree::new();
        let root = tree.add_node(0.0);
        let small = tree.add_node(10.0);
        let large = tree.add_node(30.0);
        tree.add_child(root, small, 1.0).unwrap();
        tree.add_child(root, large, 3.0).unwrap();
        assert!(approx(tree.fraction(root), 0.0));

        let changed = tree.set_leaf(small, 10.0, 10.0).unwrap();
        assert_eq!(changed, vec![small, root]);
        assert!(approx(tree.fraction(root), 0.25));

        tree.set_leaf(large, 15.0, 30.0).unwrap();
        assert!(approx(tree.fraction(root), 0.25 + 0.375));
    }

    #[test]
    fn propagation_reaches_every_ancestor() {
        let mut tree = ProgressTree::new();
        let root = tree.add_node(0.0);
        let middle = tree.add_node(0.0);
        let leaf = tree.add_node(4.0);
        tree.add_child(root, middle, 1.0).unwrap();
        tree.add_child(middle, leaf, 1.0).unwrap();

        let changed = tree.set_leaf(leaf, 2.0, 4.0).unwrap();
        assert_eq!(changed, vec![leaf, middle, root]);
        assert!(approx(tree.fraction(root), 0.5));
    }

    #[test]
    fn leaf_fraction_never_decreases() {
        let mut tree = ProgressTree::new();
        let leaf = tree.add_node(10.0);
        tree.set_leaf(leaf, 6.0, 10.0).unwrap();

        assert!(tree.set_leaf(leaf, 3.0, 10.0).unwrap().is_empty());
        assert!(tree.set_leaf(leaf, 6.0, 20.0).unwrap().is_empty());
        assert!(tree.set_leaf(leaf, 0.0, 0.0).unwrap().is_empty());
        assert!(approx(tree.fraction(leaf), 0.6));

        assert_eq!(tree.set_leaf(leaf, 12.0, 10.0).unwrap(), vec![leaf]);
        assert!(approx(tree.fraction(leaf), 1.0));
    }

    #[test]
    fn complete_handles_unknown_total() {
        let mut tree = ProgressTree::new();
        let leaf = tree.add_node(0.0);
        tree.complete(leaf).unwrap();
        assert_eq!(tree.snapshot(leaf), Some(ProgressSnapshot::new(1.0, 1.0)));
    }

    #[test]
    fn structural_errors() {
        let mut tree = ProgressTree::new();
        let a = tree.add_node(0.0);
        let b = tree.add_node(0.0);
        let c = tree.add_node(1.0);

        assert_eq!(tree.add_child(a, b, 0.0), Err(TreeError::InvalidWeight));
        assert_eq!(tree.add_child(a, b, f64::NAN), Err(TreeError::InvalidWeight));

        tree.add_child(a, b, 1.0).unwrap();
        assert_eq!(tree.add_child(c, b, 1.0), Err(TreeError::AlreadyAttached));
        assert_eq!(tree.add_child(b, a, 1.0), Err(TreeError::Cycle));
        assert_eq!(tree.add_child(a, a, 1.0), Err(TreeError::Cycle));
        assert_eq!(tree.set_leaf(a, 1.0, 1.0), Err(TreeError::NotALeaf));
        assert_eq!(tree.remove_child(a, c), Err(TreeError::NotAChild));
    }

    #[test]
    fn remove_child_detaches() {
        let mut tree = ProgressTree::new();
        let root = tree.add_node(0.0);
        let done = tree.add_node(1.0);
        let idle = tree.add_node(1.0);
        tree.add_child(root, done, 1.0).unwrap();
        tree.add_child(root, idle, 1.0).unwrap();
        tree.complete(done).unwrap();
        assert!(approx(tree.fraction(root), 0.5));

        tree.remove_child(root, idle).unwrap();
        assert!(approx(tree.fraction(root), 1.0));
        assert_eq!(tree.parent(idle), None);
        assert_eq!(tree.children(root).len(), 1);
    }

    #[test]
    fn remove_frees_subtree_and_stales_ids() {
        let mut tree = ProgressTree::new();
        let root = tree.add_node(0.0);
        let batch = tree.add_node(0.0);
        let leaf = tree.add_node(1.0);
        tree.add_child(root, batch, 1.0).unwrap();
        tree.add_child(batch, leaf, 1.0).unwrap();

        let removed = tree.remove(batch);
        assert_eq!(removed.len(), 2);
        assert_eq!(tree.len(), 1);
        assert!(tree.children(root).is_empty());
        assert_eq!(tree.snapshot(leaf), None);

        let reused = tree.add_node(5.0);
        assert_eq!(tree.snapshot(leaf), None);
        assert!(approx(tree.fraction(reused), 0.0));
        assert_eq!(tree.set_leaf(leaf, 1.0, 1.0), Err(TreeError::UnknownNode));
    }
}
