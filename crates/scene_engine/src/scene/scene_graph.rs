//! Arena-backed scene hierarchy
//!
//! Nodes live in a [`SlotMap`] keyed by [`NodeId`]. Every graph has a fixed
//! root; removing a node removes its whole subtree.
//!
//! ## World matrices
//!
//! `world = parent.world · local`, or `local` at the root. Each node records
//! the transform version and the parent world version it was computed from,
//! so [`SceneGraph::update_world_matrix`] recomputes a node only when forced,
//! when its transform changed, or when its parent's world matrix changed.
//! Updates always run parent-before-child.
//!
//! A node with `force_use_parent_world_matrix` takes its parent's world
//! matrix verbatim; its own transform changes do not make it stale. A node
//! with `auto_update_child_world_matrix == false` stops the downward
//! cascade even when the update was forced; its children are still brought
//! up to date lazily by [`SceneGraph::world_matrix`].

use std::collections::VecDeque;

use slotmap::SlotMap;

use super::node::{NodeId, SceneNode};
use crate::foundation::math::Mat4;

/// Scene graph errors
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SceneError {
    /// Id does not refer to a live node
    #[error("Node not found: {0:?}")]
    NodeNotFound(NodeId),

    /// Reparenting would make a node its own ancestor
    #[error("Cannot parent {child:?} under its own descendant {parent:?}")]
    CyclicParent {
        /// Node being moved
        child: NodeId,
        /// Requested parent
        parent: NodeId,
    },

    /// The root node cannot be removed or reparented
    #[error("The root node cannot be removed or reparented")]
    RootImmutable,
}

/// Callback result steering a traversal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraverseFlow {
    /// Visit this node's children next
    Continue,
    /// Skip this node's children, keep going elsewhere
    SkipChildren,
    /// Stop the whole traversal
    Stop,
}

/// Scene hierarchy
#[derive(Debug)]
pub struct SceneGraph {
    nodes: SlotMap<NodeId, SceneNode>,
    root: NodeId,
}

impl Default for SceneGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl SceneGraph {
    /// Create a graph containing only the root node
    pub fn new() -> Self {
        let mut nodes = SlotMap::with_key();
        let root = nodes.insert(SceneNode::new("root"));
        Self { nodes, root }
    }

    /// Root node id
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Number of live nodes, root included
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Always false; the root always exists
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Whether `id` refers to a live node
    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    /// Borrow a node
    pub fn node(&self, id: NodeId) -> Option<&SceneNode> {
        self.nodes.get(id)
    }

    /// Mutably borrow a node
    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut SceneNode> {
        self.nodes.get_mut(id)
    }

    fn get(&self, id: NodeId) -> Result<&SceneNode, SceneError> {
        self.nodes.get(id).ok_or(SceneError::NodeNotFound(id))
    }

    /// Add a node under the root
    pub fn add(&mut self, node: SceneNode) -> NodeId {
        let root = self.root;
        self.attach(root, node)
    }

    /// Add a node under `parent`
    pub fn add_child(&mut self, parent: NodeId, node: SceneNode) -> Result<NodeId, SceneError> {
        self.get(parent)?;
        Ok(self.attach(parent, node))
    }

    fn attach(&mut self, parent: NodeId, mut node: SceneNode) -> NodeId {
        node.parent = Some(parent);
        node.children.clear();
        let id = self.nodes.insert(node);
        if let Some(parent_node) = self.nodes.get_mut(parent) {
            parent_node.children.push(id);
        }
        log::trace!("Added node {:?} under {:?}", id, parent);
        id
    }

    /// Remove a node and its whole subtree, returning the removed ids
    pub fn remove(&mut self, id: NodeId) -> Result<Vec<NodeId>, SceneError> {
        if id == self.root {
            return Err(SceneError::RootImmutable);
        }
        let parent = self.get(id)?.parent;
        if let Some(parent_node) = parent.and_then(|p| self.nodes.get_mut(p)) {
            parent_node.children.retain(|&child| child != id);
        }

        let mut removed = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.nodes.remove(current) {
                stack.extend(node.children);
                removed.push(current);
            }
        }
        log::debug!("Removed {} node(s) rooted at {:?}", removed.len(), id);
        Ok(removed)
    }

    /// Move `id` under `new_parent`, keeping its local transform
    pub fn set_parent(&mut self, id: NodeId, new_parent: NodeId) -> Result<(), SceneError> {
        if id == self.root {
            return Err(SceneError::RootImmutable);
        }
        self.get(new_parent)?;
        let old_parent = self.get(id)?.parent;

        if self.path_to_root(new_parent)?.contains(&id) {
            return Err(SceneError::CyclicParent { child: id, parent: new_parent });
        }

        if let Some(old) = old_parent.and_then(|p| self.nodes.get_mut(p)) {
            old.children.retain(|&child| child != id);
        }
        if let Some(parent_node) = self.nodes.get_mut(new_parent) {
            parent_node.children.push(id);
        }
        if let Some(node) = self.nodes.get_mut(id) {
            node.parent = Some(new_parent);
        }
        Ok(())
    }

    /// Parent of a node
    pub fn parent(&self, id: NodeId) -> Result<Option<NodeId>, SceneError> {
        Ok(self.get(id)?.parent)
    }

    /// Children of a node
    pub fn children(&self, id: NodeId) -> Result<&[NodeId], SceneError> {
        Ok(&self.get(id)?.children)
    }

    /// Ids from `id` up to and including the root
    pub fn path_to_root(&self, id: NodeId) -> Result<Vec<NodeId>, SceneError> {
        let mut path = vec![id];
        let mut current = self.get(id)?.parent;
        while let Some(parent) = current {
            path.push(parent);
            current = self.get(parent)?.parent;
        }
        Ok(path)
    }

    /// First node with a matching name, in depth-first order
    pub fn find_by_name(&self, name: &str) -> Option<NodeId> {
        let mut found = None;
        self.traverse(self.root, |id, node| {
            if node.name == name {
                found = Some(id);
                TraverseFlow::Stop
            } else {
                TraverseFlow::Continue
            }
        });
        found
    }

    /// Depth-first pre-order walk starting at `start`
    ///
    /// Returns false if the callback stopped the walk.
    pub fn traverse<F>(&self, start: NodeId, mut callback: F) -> bool
    where
        F: FnMut(NodeId, &SceneNode) -> TraverseFlow,
    {
        let mut stack = vec![start];
        while let Some(id) = stack.pop() {
            let Some(node) = self.nodes.get(id) else { continue };
            match callback(id, node) {
                TraverseFlow::Stop => return false,
                TraverseFlow::SkipChildren => {}
                TraverseFlow::Continue => stack.extend(node.children.iter().rev()),
            }
        }
        true
    }

    /// Depth-first walk with mutable node access
    pub fn traverse_mut<F>(&mut self, start: NodeId, mut callback: F) -> bool
    where
        F: FnMut(NodeId, &mut SceneNode) -> TraverseFlow,
    {
        let mut stack = vec![start];
        while let Some(id) = stack.pop() {
            let Some(node) = self.nodes.get_mut(id) else { continue };
            match callback(id, node) {
                TraverseFlow::Stop => return false,
                TraverseFlow::SkipChildren => {}
                TraverseFlow::Continue => stack.extend(node.children.iter().rev()),
            }
        }
        true
    }

    /// Breadth-first walk starting at `start`
    ///
    /// Returns false if the callback stopped the walk.
    pub fn traverse_bfs<F>(&self, start: NodeId, mut callback: F) -> bool
    where
        F: FnMut(NodeId, &SceneNode) -> TraverseFlow,
    {
        let mut queue = VecDeque::from([start]);
        while let Some(id) = queue.pop_front() {
            let Some(node) = self.nodes.get(id) else { continue };
            match callback(id, node) {
                TraverseFlow::Stop => return false,
                TraverseFlow::SkipChildren => {}
                TraverseFlow::Continue => queue.extend(node.children.iter().copied()),
            }
        }
        true
    }

    /// Update the world matrix of `id` and, cascading, its descendants
    ///
    /// Without `force` a node whose transform and parent are unchanged is
    /// left alone. A recomputed node forces its children.
    pub fn update_world_matrix(&mut self, id: NodeId, force: bool) -> Result<(), SceneError> {
        let parent = self.get(id)?.parent;
        if let Some(parent) = parent {
            // bring the ancestor chain up to date without cascading
            self.resolve_world(parent)?;
        }

        let mut stack = vec![(id, force)];
        while let Some((current, force)) = stack.pop() {
            let recomputed = self.update_single(current, force);
            if let Some(node) = self.nodes.get(current) {
                if node.auto_update_child_world_matrix {
                    let cascade = force || recomputed;
                    stack.extend(node.children.iter().rev().map(|&child| (child, cascade)));
                }
            }
        }
        Ok(())
    }

    /// Update every node in the graph
    pub fn update_all(&mut self, force: bool) {
        let root = self.root;
        // the root always exists
        let _ = self.update_world_matrix(root, force);
    }

    /// Recompute every stale node, parents first; returns how many changed
    ///
    /// Reaches nodes a cascade skipped because an ancestor has
    /// `auto_update_child_world_matrix` off, the same way
    /// [`SceneGraph::world_matrix`] would resolve them one at a time.
    pub fn resolve_stale(&mut self) -> usize {
        let mut recomputed = 0;
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            if self.update_single(id, false) {
                recomputed += 1;
            }
            if let Some(node) = self.nodes.get(id) {
                stack.extend(node.children.iter().rev());
            }
        }
        recomputed
    }

    /// Up-to-date world matrix of a node
    ///
    /// Recomputes the node and any stale ancestors; does not touch siblings
    /// or descendants.
    pub fn world_matrix(&mut self, id: NodeId) -> Result<Mat4, SceneError> {
        self.resolve_world(id)?;
        Ok(self.get(id)?.world)
    }

    fn resolve_world(&mut self, id: NodeId) -> Result<(), SceneError> {
        let path = self.path_to_root(id)?;
        for &ancestor in path.iter().rev() {
            self.update_single(ancestor, false);
        }
        Ok(())
    }

    /// Recompute one node if needed; returns whether it was recomputed
    fn update_single(&mut self, id: NodeId, force: bool) -> bool {
        let Some(parent_id) = self.nodes.get(id).map(|node| node.parent) else {
            return false;
        };
        let (parent_key, parent_world) = match parent_id.and_then(|p| self.nodes.get(p).map(|n| (p, n))) {
            Some((p, parent)) => (Some((p, parent.world_version)), parent.world),
            None => (None, Mat4::identity()),
        };

        let Some(node) = self.nodes.get_mut(id) else { return false };
        if !force && !node.is_world_stale(parent_key) {
            return false;
        }
        node.recompute_world(parent_key, &parent_world);
        true
    }
}
