//! # Rendering
//!
//! Turns a [`Scene`](crate::scene::Scene) into GPU calls.
//!
//! ## Architecture
//!
//! - **Renderer**: frame state machine driving the passes
//! - **Gpu / GpuState**: the GPU seam and a redundant-call filter over it
//! - **Material / RenderOptions**: render state plus the flags that select
//!   a shader variant
//! - **ShaderCache**: one linked program per distinct variant, shared and
//!   refcounted
//! - **SemanticRegistry**: maps semantic names to live values for uniforms
//!   and attributes
//! - **BufferCache / TextureCache**: GPU copies of geometry and textures,
//!   refreshed when their version changes
//!
//! The GPU is reached only through the [`Gpu`] trait. [`HeadlessGpu`]
//! records every call and backs the tests.

pub mod buffer;
pub mod camera;
pub mod error;
pub mod geometry;
pub mod gpu;
pub mod lighting;
pub mod material;
pub mod render_list;
pub mod renderer;
pub mod semantic;
pub mod shader;
pub mod texture;
pub mod texture_cache;

pub use camera::{Camera, Projection};
pub use error::{RenderError, RenderResult};
pub use geometry::{AttributeKind, Geometry, GeometryId, VertexAttribute};
pub use gpu::{Gpu, GpuState, HeadlessGpu};
pub use lighting::{Light, LightKind, LightManager, ShadowOptions};
pub use material::{Material, MaterialId, MaterialKind, RenderFlags, RenderOptions};
pub use renderer::{RenderInfo, RenderPhase, Renderer};
pub use semantic::{RenderContext, SemanticEntry, SemanticRegistry, SemanticValue};
pub use shader::{Program, Shader, ShaderCache};
pub use texture::{Color, MaterialValue, Texture, TextureId};
