//! Scene management
//!
//! A [`Scene`] is the scene graph plus the asset tables its nodes refer to:
//! geometries, materials and textures are stored once and shared by id.

pub mod bounds;
pub mod node;
pub mod scene_graph;
pub mod transform;

pub use bounds::{Aabb, Frustum, Plane};
pub use node::{Mesh, NodeContent, NodeId, SceneNode};
pub use scene_graph::{SceneError, SceneGraph, TraverseFlow};
pub use transform::Transform;

use slotmap::SlotMap;

use crate::render::camera::Camera;
use crate::render::geometry::{Geometry, GeometryId};
use crate::render::lighting::Light;
use crate::render::material::{Material, MaterialId};
use crate::render::texture::{Color, Texture, TextureId};

/// Fog falloff
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FogMode {
    /// Linear ramp between two view distances
    Linear {
        /// Distance where fog starts
        start: f32,
        /// Distance where fog is opaque
        end: f32,
    },
    /// Exponential falloff
    Exp {
        /// Density factor
        density: f32,
    },
}

/// Scene-wide fog
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fog {
    /// Fog color
    pub color: Color,
    /// Falloff
    pub mode: FogMode,
}

impl Fog {
    /// `(start, end, density)` packed for the shader
    pub fn info(&self) -> [f32; 3] {
        match self.mode {
            FogMode::Linear { start, end } => [start, end, 0.0],
            FogMode::Exp { density } => [0.0, 0.0, density],
        }
    }
}

/// Scene graph and the assets its nodes reference
#[derive(Debug, Default)]
pub struct Scene {
    /// Node hierarchy
    pub graph: SceneGraph,
    /// Optional fog applied by lit materials
    pub fog: Option<Fog>,
    pub(crate) geometries: SlotMap<GeometryId, Geometry>,
    pub(crate) materials: SlotMap<MaterialId, Material>,
    pub(crate) textures: SlotMap<TextureId, Texture>,
}

impl Scene {
    /// Empty scene
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a geometry
    pub fn add_geometry(&mut self, geometry: Geometry) -> GeometryId {
        self.geometries.insert(geometry)
    }

    /// Borrow a geometry
    pub fn geometry(&self, id: GeometryId) -> Option<&Geometry> {
        self.geometries.get(id)
    }

    /// Mutably borrow a geometry
    pub fn geometry_mut(&mut self, id: GeometryId) -> Option<&mut Geometry> {
        self.geometries.get_mut(id)
    }

    /// Drop a geometry; unknown ids are reported and ignored
    pub fn remove_geometry(&mut self, id: GeometryId) -> Option<Geometry> {
        let removed = self.geometries.remove(id);
        if removed.is_none() {
            log::warn!("remove_geometry: {:?} is not registered", id);
        }
        removed
    }

    /// Register a material
    pub fn add_material(&mut self, material: Material) -> MaterialId {
        self.materials.insert(material)
    }

    /// Borrow a material
    pub fn material(&self, id: MaterialId) -> Option<&Material> {
        self.materials.get(id)
    }

    /// Mutably borrow a material
    pub fn material_mut(&mut self, id: MaterialId) -> Option<&mut Material> {
        self.materials.get_mut(id)
    }

    /// Drop a material
    ///
    /// Removing a material twice, or one never registered, only logs a
    /// warning so cleanup code can run more than once.
    pub fn remove_material(&mut self, id: MaterialId) -> Option<Material> {
        let removed = self.materials.remove(id);
        if removed.is_none() {
            log::warn!("remove_material: {:?} is not registered", id);
        }
        removed
    }

    /// Register a texture
    pub fn add_texture(&mut self, texture: Texture) -> TextureId {
        self.textures.insert(texture)
    }

    /// Borrow a texture
    pub fn texture(&self, id: TextureId) -> Option<&Texture> {
        self.textures.get(id)
    }

    /// Mutably borrow a texture
    pub fn texture_mut(&mut self, id: TextureId) -> Option<&mut Texture> {
        self.textures.get_mut(id)
    }

    /// Drop a texture; the renderer deletes its GPU copy on the next frame
    pub fn remove_texture(&mut self, id: TextureId) -> Option<Texture> {
        let removed = self.textures.remove(id);
        if removed.is_none() {
            log::warn!("remove_texture: {:?} is not registered", id);
        }
        removed
    }

    /// Add an empty group node under the root
    pub fn add_group(&mut self, name: &str) -> NodeId {
        self.graph.add(SceneNode::new(name))
    }

    /// Add a mesh node under the root
    pub fn add_mesh(&mut self, name: &str, geometry: GeometryId, material: MaterialId) -> NodeId {
        self.graph.add(SceneNode::new(name).with_content(NodeContent::Mesh(Mesh { geometry, material })))
    }

    /// Add a light node under the root
    pub fn add_light(&mut self, name: &str, light: Light) -> NodeId {
        self.graph.add(SceneNode::new(name).with_content(NodeContent::Light(light)))
    }

    /// Add a camera node under the root
    pub fn add_camera(&mut self, name: &str, camera: Camera) -> NodeId {
        self.graph.add(SceneNode::new(name).with_content(NodeContent::Camera(camera)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::material::Material;

    #[test]
    fn test_remove_material_twice_is_not_an_error() {
        let mut scene = Scene::new();
        let id = scene.add_material(Material::basic());
        assert!(scene.remove_material(id).is_some());
        assert!(scene.remove_material(id).is_none());
    }

    #[test]
    fn test_add_mesh_attaches_to_root() {
        let mut scene = Scene::new();
        let geometry = scene.add_geometry(Geometry::cuboid(1.0, 1.0, 1.0));
        let material = scene.add_material(Material::basic());
        let node = scene.add_mesh("cube", geometry, material);

        assert_eq!(scene.graph.parent(node).unwrap(), Some(scene.graph.root()));
        let mesh = scene.graph.node(node).unwrap().mesh().copied().unwrap();
        assert_eq!(mesh.geometry, geometry);
        assert_eq!(mesh.material, material);
    }

    #[test]
    fn test_fog_info() {
        let fog = Fog { color: Color::WHITE, mode: FogMode::Linear { start: 1.0, end: 10.0 } };
        assert_eq!(fog.info(), [1.0, 10.0, 0.0]);
    }
}
