//! Scene nodes
//!
//! A [`SceneNode`] is one entry of the [`SceneGraph`](super::SceneGraph)
//! arena. Parent and children are [`NodeId`] indices into that arena; the
//! node owns its [`Transform`] and a cached world matrix.

use slotmap::new_key_type;

use super::transform::Transform;
use crate::foundation::math::Mat4;
use crate::render::camera::Camera;
use crate::render::geometry::GeometryId;
use crate::render::lighting::Light;
use crate::render::material::MaterialId;

new_key_type! {
    /// Handle of a node inside a scene graph
    pub struct NodeId;
}

/// Geometry and material drawn at a node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mesh {
    /// Vertex data
    pub geometry: GeometryId,
    /// Render state and surface inputs
    pub material: MaterialId,
}

/// What a node contributes to the frame besides its transform
#[derive(Debug, Clone, Default)]
pub enum NodeContent {
    /// Pure grouping node
    #[default]
    Group,
    /// Drawable mesh
    Mesh(Mesh),
    /// Light source
    Light(Light),
    /// Camera
    Camera(Camera),
}

/// One node of the scene hierarchy
#[derive(Debug, Clone)]
pub struct SceneNode {
    /// Display name, used by `SceneGraph::find_by_name`
    pub name: String,
    /// Local transform
    pub transform: Transform,
    /// Attached mesh, light or camera
    pub content: NodeContent,

    /// Invisible nodes and their subtrees are not collected for rendering
    pub visible: bool,
    /// Cull this node's mesh against the camera frustum
    pub frustum_test: bool,
    /// Explicit draw ordering; lower values draw first
    pub render_order: i32,
    /// Recurse into children when this node's world matrix is updated
    pub auto_update_child_world_matrix: bool,
    /// World matrix is the parent's world matrix verbatim, local transform ignored
    pub force_use_parent_world_matrix: bool,

    pub(super) parent: Option<NodeId>,
    pub(super) children: Vec<NodeId>,

    pub(super) world: Mat4,
    pub(super) world_version: u64,
    pub(super) seen_local_version: Option<u64>,
    pub(super) seen_parent: Option<(NodeId, u64)>,
    pub(super) seen_force_parent: bool,
    pub(super) world_updates: u64,
}

impl SceneNode {
    /// Create an empty group node
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            transform: Transform::identity(),
            content: NodeContent::Group,
            visible: true,
            frustum_test: true,
            render_order: 0,
            auto_update_child_world_matrix: true,
            force_use_parent_world_matrix: false,
            parent: None,
            children: Vec::new(),
            world: Mat4::identity(),
            world_version: 0,
            seen_local_version: None,
            seen_parent: None,
            seen_force_parent: false,
            world_updates: 0,
        }
    }

    /// Builder-style content setter
    pub fn with_content(mut self, content: NodeContent) -> Self {
        self.content = content;
        self
    }

    /// Builder-style transform setter
    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    /// Parent node, `None` only for the graph root
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Children in insertion order
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Last computed world matrix, possibly stale
    ///
    /// Use `SceneGraph::world_matrix` to get an up-to-date value.
    pub fn cached_world_matrix(&self) -> Mat4 {
        self.world
    }

    /// Counter bumped every time the world matrix is recomputed
    pub fn world_version(&self) -> u64 {
        self.world_version
    }

    /// Number of world matrix recomputations so far
    pub fn world_update_count(&self) -> u64 {
        self.world_updates
    }

    /// Mesh attached to this node, if any
    pub fn mesh(&self) -> Option<&Mesh> {
        match &self.content {
            NodeContent::Mesh(mesh) => Some(mesh),
            _ => None,
        }
    }

    /// Light attached to this node, if any
    pub fn light(&self) -> Option<&Light> {
        match &self.content {
            NodeContent::Light(light) => Some(light),
            _ => None,
        }
    }

    /// Camera attached to this node, if any
    pub fn camera(&self) -> Option<&Camera> {
        match &self.content {
            NodeContent::Camera(camera) => Some(camera),
            _ => None,
        }
    }

    /// Mutable camera attached to this node, if any
    pub fn camera_mut(&mut self) -> Option<&mut Camera> {
        match &mut self.content {
            NodeContent::Camera(camera) => Some(camera),
            _ => None,
        }
    }

    /// Whether the world matrix must be recomputed given the parent's state
    pub(super) fn is_world_stale(&self, parent: Option<(NodeId, u64)>) -> bool {
        let local_stale = !self.force_use_parent_world_matrix
            && self.seen_local_version != Some(self.transform.matrix_version());
        local_stale
            || self.seen_local_version.is_none()
            || self.seen_parent != parent
            || self.seen_force_parent != self.force_use_parent_world_matrix
    }

    /// Recompute the world matrix from the parent's world matrix
    pub(super) fn recompute_world(&mut self, parent: Option<(NodeId, u64)>, parent_world: &Mat4) {
        self.world = if self.force_use_parent_world_matrix {
            *parent_world
        } else {
            parent_world * self.transform.local_matrix()
        };
        self.world_version += 1;
        self.world_updates += 1;
        self.seen_local_version = Some(self.transform.matrix_version());
        self.seen_parent = parent;
        self.seen_force_parent = self.force_use_parent_world_matrix;
    }
}
