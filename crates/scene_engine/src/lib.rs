//! # Scene Engine
//!
//! Core of a retained-mode 3D renderer.
//!
//! ## Features
//!
//! - **Scene graph**: arena-backed node hierarchy with lazily recomputed
//!   world matrices
//! - **Materials**: render state and surface inputs, turned into `#define`
//!   headers that select a shader variant
//! - **Shader cache**: programs shared between materials with identical
//!   variants and released by refcount
//! - **Semantic binding**: shader variables named by semantic and filled
//!   from the live frame
//! - **GPU state cache**: redundant state changes never reach the GPU
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use scene_engine::prelude::*;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut renderer = Renderer::new(Box::new(HeadlessGpu::new()), RendererConfig::default());
//!     renderer.set_viewport(800, 600);
//!
//!     let mut scene = Scene::new();
//!     let camera = scene.add_camera("camera", Camera::perspective(60.0, 800.0 / 600.0, 0.1, 100.0));
//!     let cube = scene.add_geometry(Geometry::cuboid(1.0, 1.0, 1.0));
//!     let material = scene.add_material(Material::basic());
//!     let mesh = scene.add_mesh("cube", cube, material);
//!     if let Some(node) = scene.graph.node_mut(mesh) {
//!         node.transform.set_position(Vec3::new(0.0, 0.0, -5.0));
//!     }
//!
//!     renderer.render(&mut scene, camera)?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod config;
pub mod foundation;
pub mod render;
pub mod scene;

/// Common imports for engine users
pub mod prelude {
    pub use crate::{
        config::{Config, ConfigError, RendererConfig},
        foundation::math::{Mat4, Quat, Vec3},
        render::{
            Camera, Color, Geometry, Gpu, HeadlessGpu, Light, Material, MaterialValue, RenderError, Renderer,
        },
        scene::{Fog, FogMode, NodeId, Scene, SceneError, SceneNode, Transform},
    };
}
