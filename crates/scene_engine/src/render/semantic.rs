//! Semantic registry
//!
//! Materials map shader variable names to semantic names (`MODEL`,
//! `DIRECTIONALLIGHTSCOLOR`, `DIFFUSE`, ...). The registry maps each
//! semantic name to an accessor that reads the live value from the
//! [`RenderContext`] and the [`DrawItem`] being drawn. Accessors hold no
//! state; a value returned for one draw is never reused for another.
//!
//! An accessor returning `None` means "leave this variable alone": the
//! renderer skips the upload instead of writing a zero.

use std::collections::HashMap;
use std::ops::{Deref, DerefMut};

use crate::config::RendererConfig;
use crate::foundation::math::{inverse_or_identity, normal_matrix, Mat3, Mat4};
use crate::render::camera::Camera;
use crate::render::geometry::{AttributeKind, Geometry};
use crate::render::gpu::{ActiveVariable, GpuState, GpuTexture, UniformValue};
use crate::render::lighting::LightManager;
use crate::render::material::Material;
use crate::render::texture::{Color, MaterialValue, TextureAssets, TextureTarget};
use crate::render::texture_cache::TextureCache;
use crate::scene::Fog;
use crate::warn_once;

/// Value produced by a semantic accessor
#[derive(Debug, Clone, PartialEq)]
pub enum SemanticValue {
    /// Upload this uniform value
    Uniform(UniformValue),
    /// Bind this geometry attribute
    Attribute(AttributeKind),
}

/// The mesh being drawn
#[derive(Debug, Clone, Copy)]
pub struct DrawItem<'a> {
    /// Node world matrix
    pub world: Mat4,
    /// Node local matrix
    pub local: Mat4,
    /// Geometry of the mesh
    pub geometry: &'a Geometry,
    /// Material of the mesh
    pub material: &'a Material,
}

/// Accessor signature
pub type SemanticGetter = fn(&mut RenderContext<'_>, &DrawItem<'_>, &ActiveVariable) -> Option<SemanticValue>;

/// One registry entry
#[derive(Debug, Clone, Copy)]
pub struct SemanticEntry {
    /// Reads the value
    pub get: SemanticGetter,
    /// The value changes from mesh to mesh
    pub depends_on_mesh: bool,
    /// The value cannot be shared across instances of one draw
    pub not_support_instanced: bool,
}

impl SemanticEntry {
    /// Entry that only reads frame-wide state
    pub const fn frame(get: SemanticGetter) -> Self {
        Self { get, depends_on_mesh: false, not_support_instanced: false }
    }

    /// Entry that reads the mesh's material or geometry
    pub const fn mesh(get: SemanticGetter) -> Self {
        Self { get, depends_on_mesh: true, not_support_instanced: false }
    }

    /// Entry derived from the mesh's own matrices
    pub const fn per_instance(get: SemanticGetter) -> Self {
        Self { get, depends_on_mesh: true, not_support_instanced: true }
    }

    /// Entry that never yields a value
    pub const fn blank() -> Self {
        Self::frame(|_, _, _| None)
    }
}

/// Live references the accessors read from
///
/// The active camera is owned so a shadow pass can swap it with
/// [`RenderContext::scoped_camera`] and get the main camera back when the
/// scope ends.
pub struct RenderContext<'a> {
    camera: Camera,
    lights: &'a LightManager,
    state: &'a mut GpuState,
    textures: &'a mut TextureCache,
    assets: &'a TextureAssets,
    config: &'a RendererConfig,
    fog: Option<Fog>,
    viewport: [u32; 2],
    next_unit: u32,
}

impl<'a> RenderContext<'a> {
    /// Context for one frame
    pub fn new(
        camera: Camera,
        lights: &'a LightManager,
        state: &'a mut GpuState,
        textures: &'a mut TextureCache,
        assets: &'a TextureAssets,
        config: &'a RendererConfig,
    ) -> Self {
        Self {
            camera,
            lights,
            state,
            textures,
            assets,
            config,
            fog: None,
            viewport: [1, 1],
            next_unit: 0,
        }
    }

    /// Builder-style fog setter
    pub fn with_fog(mut self, fog: Option<Fog>) -> Self {
        self.fog = fog;
        self
    }

    /// Builder-style viewport size setter
    pub fn with_viewport(mut self, width: u32, height: u32) -> Self {
        self.viewport = [width, height];
        self
    }

    /// Active camera
    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    /// Replace the active camera, returning the previous one
    pub fn set_camera(&mut self, camera: Camera) -> Camera {
        std::mem::replace(&mut self.camera, camera)
    }

    /// Use `camera` until the returned guard is dropped
    pub fn scoped_camera(&mut self, camera: Camera) -> CameraScope<'_, 'a> {
        let saved = self.set_camera(camera);
        CameraScope { context: self, saved: Some(saved) }
    }

    /// Frame lights
    pub fn lights(&self) -> &'a LightManager {
        self.lights
    }

    /// GPU state cache
    pub fn state(&mut self) -> &mut GpuState {
        self.state
    }

    /// Texture assets of the scene
    pub fn assets(&self) -> &'a TextureAssets {
        self.assets
    }

    /// Renderer settings
    pub fn config(&self) -> &'a RendererConfig {
        self.config
    }

    /// Scene fog
    pub fn fog(&self) -> Option<&Fog> {
        self.fog.as_ref()
    }

    /// Viewport size in pixels
    pub fn viewport(&self) -> [u32; 2] {
        self.viewport
    }

    /// Start a draw: texture units are handed out from 0 again
    pub fn begin_draw(&mut self) {
        self.next_unit = 0;
    }

    /// Texture units handed out since `begin_draw`
    pub fn texture_units_used(&self) -> u32 {
        self.next_unit
    }

    /// Bind a GPU texture to the next free unit
    ///
    /// `None` once every unit of the draw is taken.
    pub fn bind_texture(&mut self, target: TextureTarget, texture: GpuTexture) -> Option<u32> {
        let unit = self.free_unit()?;
        self.next_unit += 1;
        self.state.bind_texture_unit(unit, target, Some(texture));
        Some(unit)
    }

    /// Unit the next [`RenderContext::bind_texture`] will hand out
    fn free_unit(&self) -> Option<u32> {
        let unit = self.next_unit;
        if unit >= self.config.max_texture_units {
            warn_once!(
                format!("texture_units_exhausted_{unit}"),
                "All {} texture units are in use, skipping texture",
                self.config.max_texture_units
            );
            return None;
        }
        Some(unit)
    }

    /// 1x1 placeholder texture
    ///
    /// `None` once every unit of the draw is taken.
    pub fn placeholder_texture(&mut self, target: TextureTarget) -> Option<GpuTexture> {
        let unit = self.free_unit()?;
        Some(self.textures.placeholder(self.state, target, unit))
    }

    fn resolve_texture(&mut self, value: &MaterialValue) -> Option<(TextureTarget, GpuTexture)> {
        let id = value.texture()?;
        let unit = self.free_unit()?;
        self.textures.resolve(self.state, self.assets, id, unit)
    }
}

/// Camera swap undone on drop
pub struct CameraScope<'s, 'a> {
    context: &'s mut RenderContext<'a>,
    saved: Option<Camera>,
}

impl<'a> Deref for CameraScope<'_, 'a> {
    type Target = RenderContext<'a>;

    fn deref(&self) -> &Self::Target {
        &*self.context
    }
}

impl DerefMut for CameraScope<'_, '_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut *self.context
    }
}

impl Drop for CameraScope<'_, '_> {
    fn drop(&mut self) {
        if let Some(saved) = self.saved.take() {
            self.context.camera = saved;
        }
    }
}

/// Bind a texture-valued slot and return its unit
///
/// `None` when the slot holds no texture or no unit is left.
pub fn handler_texture(context: &mut RenderContext<'_>, value: &MaterialValue) -> Option<SemanticValue> {
    let (target, texture) = context.resolve_texture(value)?;
    let unit = context.bind_texture(target, texture)?;
    Some(int(unit))
}

/// Color-or-texture slot with a mid-gray default
pub fn handler_color_or_texture(
    context: &mut RenderContext<'_>,
    value: &MaterialValue,
    variable: &ActiveVariable,
) -> Option<SemanticValue> {
    color_or_texture(context, value, variable, Color::DEFAULT_GRAY)
}

fn color_or_texture(
    context: &mut RenderContext<'_>,
    value: &MaterialValue,
    variable: &ActiveVariable,
    default: Color,
) -> Option<SemanticValue> {
    if variable.kind.is_sampler() {
        return handler_texture(context, value);
    }
    let color = match value {
        MaterialValue::Color(color) => *color,
        MaterialValue::None | MaterialValue::Texture(_) | MaterialValue::CubeTexture(_) => default,
    };
    Some(SemanticValue::Uniform(UniformValue::Vec4(color.to_array())))
}

fn mat4(matrix: &Mat4) -> Option<SemanticValue> {
    let mut values = [0.0; 16];
    values.copy_from_slice(matrix.as_slice());
    Some(SemanticValue::Uniform(UniformValue::Mat4(values)))
}

fn mat3(matrix: &Mat3) -> Option<SemanticValue> {
    let mut values = [0.0; 9];
    values.copy_from_slice(matrix.as_slice());
    Some(SemanticValue::Uniform(UniformValue::Mat3(values)))
}

fn float(value: f32) -> Option<SemanticValue> {
    Some(SemanticValue::Uniform(UniformValue::Float(value)))
}

fn int(value: u32) -> SemanticValue {
    SemanticValue::Uniform(UniformValue::Int(i32::try_from(value).unwrap_or(i32::MAX)))
}

fn floats(values: &[f32]) -> Option<SemanticValue> {
    if values.is_empty() {
        return None;
    }
    Some(SemanticValue::Uniform(UniformValue::FloatArray(values.to_vec())))
}

fn shadow_maps(context: &mut RenderContext<'_>, maps: &[Option<GpuTexture>]) -> Option<SemanticValue> {
    if maps.is_empty() {
        return None;
    }
    let mut units = Vec::with_capacity(maps.len());
    for map in maps {
        let texture = match map {
            Some(texture) => *texture,
            None => context.placeholder_texture(TextureTarget::Texture2D)?,
        };
        let unit = context.bind_texture(TextureTarget::Texture2D, texture)?;
        units.push(i32::try_from(unit).unwrap_or(i32::MAX));
    }
    Some(SemanticValue::Uniform(UniformValue::IntArray(units)))
}

fn attribute(kind: AttributeKind) -> Option<SemanticValue> {
    Some(SemanticValue::Attribute(kind))
}

fn model_view(context: &RenderContext<'_>, item: &DrawItem<'_>) -> Mat4 {
    context.camera.view_matrix() * item.world
}

const STANDARD: &[(&str, SemanticEntry)] = &[
    // Attributes
    ("POSITION", SemanticEntry::mesh(|_, _, _| attribute(AttributeKind::Position))),
    ("NORMAL", SemanticEntry::mesh(|_, _, _| attribute(AttributeKind::Normal))),
    ("TANGENT", SemanticEntry::mesh(|_, _, _| attribute(AttributeKind::Tangent))),
    ("TEXCOORD_0", SemanticEntry::mesh(|_, _, _| attribute(AttributeKind::Uv0))),
    ("TEXCOORD_1", SemanticEntry::mesh(|_, _, _| attribute(AttributeKind::Uv1))),
    ("COLOR_0", SemanticEntry::mesh(|_, _, _| attribute(AttributeKind::Color))),
    // Matrices
    ("LOCAL", SemanticEntry::per_instance(|_, item, _| mat4(&item.local))),
    ("MODEL", SemanticEntry::per_instance(|_, item, _| mat4(&item.world))),
    ("VIEW", SemanticEntry::frame(|context, _, _| mat4(context.camera.view_matrix()))),
    ("PROJECTION", SemanticEntry::frame(|context, _, _| mat4(context.camera.projection_matrix()))),
    ("VIEWPROJECTION", SemanticEntry::frame(|context, _, _| mat4(context.camera.view_projection_matrix()))),
    ("MODELVIEW", SemanticEntry::per_instance(|context, item, _| mat4(&model_view(context, item)))),
    (
        "MODELVIEWPROJECTION",
        SemanticEntry::per_instance(|context, item, _| mat4(&(context.camera.view_projection_matrix() * item.world))),
    ),
    ("MODELINVERSE", SemanticEntry::per_instance(|_, item, _| mat4(&inverse_or_identity(&item.world)))),
    ("VIEWINVERSE", SemanticEntry::frame(|context, _, _| mat4(context.camera.world_matrix()))),
    (
        "PROJECTIONINVERSE",
        SemanticEntry::frame(|context, _, _| mat4(&inverse_or_identity(context.camera.projection_matrix()))),
    ),
    (
        "MODELVIEWINVERSE",
        SemanticEntry::per_instance(|context, item, _| mat4(&inverse_or_identity(&model_view(context, item)))),
    ),
    ("MODELINVERSETRANSPOSE", SemanticEntry::per_instance(|_, item, _| mat3(&normal_matrix(&item.world)))),
    (
        "MODELVIEWINVERSETRANSPOSE",
        SemanticEntry::per_instance(|context, item, _| mat3(&normal_matrix(&model_view(context, item)))),
    ),
    // Camera
    (
        "VIEWPORT",
        SemanticEntry::frame(|context, _, _| {
            let [width, height] = context.viewport;
            Some(SemanticValue::Uniform(UniformValue::Vec2([width as f32, height as f32])))
        }),
    ),
    ("CAMERANEAR", SemanticEntry::frame(|context, _, _| float(context.camera.near()))),
    ("CAMERAFAR", SemanticEntry::frame(|context, _, _| float(context.camera.far()))),
    (
        "CAMERAPOSITION",
        SemanticEntry::frame(|context, _, _| {
            let position = context.camera.world_position();
            Some(SemanticValue::Uniform(UniformValue::Vec3([position.x, position.y, position.z])))
        }),
    ),
    // Lights
    (
        "AMBIENTLIGHTSCOLOR",
        SemanticEntry::frame(|context, _, _| Some(SemanticValue::Uniform(UniformValue::Vec3(context.lights.ambient_color)))),
    ),
    ("DIRECTIONALLIGHTSCOLOR", SemanticEntry::frame(|context, _, _| floats(&context.lights.directional.colors))),
    ("DIRECTIONALLIGHTSINFO", SemanticEntry::frame(|context, _, _| floats(&context.lights.directional.infos))),
    (
        "DIRECTIONALLIGHTSSHADOWMAP",
        SemanticEntry::frame(|context, _, _| {
            let lights = context.lights;
            shadow_maps(context, &lights.directional.shadow_maps)
        }),
    ),
    (
        "DIRECTIONALLIGHTSSHADOWMAPSIZE",
        SemanticEntry::frame(|context, _, _| floats(&context.lights.directional.shadow_map_sizes)),
    ),
    (
        "DIRECTIONALLIGHTSSHADOWBIAS",
        SemanticEntry::frame(|context, _, _| floats(&context.lights.directional.shadow_bias)),
    ),
    (
        "DIRECTIONALLIGHTSPACEMATRIX",
        SemanticEntry::frame(|context, _, _| floats(&context.lights.directional.space_matrices)),
    ),
    ("POINTLIGHTSPOS", SemanticEntry::frame(|context, _, _| floats(&context.lights.point.positions))),
    ("POINTLIGHTSCOLOR", SemanticEntry::frame(|context, _, _| floats(&context.lights.point.colors))),
    ("POINTLIGHTSINFO", SemanticEntry::frame(|context, _, _| floats(&context.lights.point.infos))),
    ("SPOTLIGHTSPOS", SemanticEntry::frame(|context, _, _| floats(&context.lights.spot.positions))),
    ("SPOTLIGHTSDIR", SemanticEntry::frame(|context, _, _| floats(&context.lights.spot.directions))),
    ("SPOTLIGHTSCOLOR", SemanticEntry::frame(|context, _, _| floats(&context.lights.spot.colors))),
    ("SPOTLIGHTSCUTOFFS", SemanticEntry::frame(|context, _, _| floats(&context.lights.spot.cutoffs))),
    ("SPOTLIGHTSINFO", SemanticEntry::frame(|context, _, _| floats(&context.lights.spot.infos))),
    (
        "SPOTLIGHTSSHADOWMAP",
        SemanticEntry::frame(|context, _, _| {
            let lights = context.lights;
            shadow_maps(context, &lights.spot.shadow_maps)
        }),
    ),
    ("SPOTLIGHTSSHADOWMAPSIZE", SemanticEntry::frame(|context, _, _| floats(&context.lights.spot.shadow_map_sizes))),
    ("SPOTLIGHTSSHADOWBIAS", SemanticEntry::frame(|context, _, _| floats(&context.lights.spot.shadow_bias))),
    ("SPOTLIGHTSPACEMATRIX", SemanticEntry::frame(|context, _, _| floats(&context.lights.spot.space_matrices))),
    // Material
    (
        "DIFFUSE",
        SemanticEntry::mesh(|context, item, variable| handler_color_or_texture(context, &item.material.diffuse, variable)),
    ),
    (
        "AMBIENT",
        SemanticEntry::mesh(|context, item, variable| handler_color_or_texture(context, &item.material.ambient, variable)),
    ),
    (
        "SPECULAR",
        SemanticEntry::mesh(|context, item, variable| handler_color_or_texture(context, &item.material.specular, variable)),
    ),
    (
        "EMISSION",
        SemanticEntry::mesh(|context, item, variable| {
            color_or_texture(context, &item.material.emission, variable, Color::BLACK)
        }),
    ),
    ("SHININESS", SemanticEntry::mesh(|_, item, _| float(item.material.shininess))),
    ("NORMALMAP", SemanticEntry::mesh(|context, item, _| handler_texture(context, &item.material.normal_map))),
    ("NORMALMAPSCALE", SemanticEntry::mesh(|_, item, _| float(item.material.normal_map_scale))),
    ("TRANSPARENCY", SemanticEntry::mesh(|_, item, _| float(item.material.transparency))),
    (
        "TRANSPARENCYMAP",
        SemanticEntry::mesh(|context, item, _| handler_texture(context, &item.material.transparency_map)),
    ),
    (
        "SPECULARENVMAP",
        SemanticEntry::mesh(|context, item, _| handler_texture(context, &item.material.specular_env_map)),
    ),
    ("REFLECTIVITY", SemanticEntry::mesh(|_, item, _| float(item.material.reflectivity))),
    ("ALPHACUTOFF", SemanticEntry::mesh(|_, item, _| float(item.material.alpha_cutoff))),
    // Output
    ("EXPOSURE", SemanticEntry::frame(|context, _, _| float(context.config.exposure))),
    ("GAMMAFACTOR", SemanticEntry::frame(|context, _, _| float(context.config.gamma_factor))),
    (
        "FOGCOLOR",
        SemanticEntry::frame(|context, _, _| {
            let fog = context.fog?;
            Some(SemanticValue::Uniform(UniformValue::Vec4(fog.color.to_array())))
        }),
    ),
    (
        "FOGINFO",
        SemanticEntry::frame(|context, _, _| {
            let fog = context.fog?;
            Some(SemanticValue::Uniform(UniformValue::Vec3(fog.info())))
        }),
    ),
];

/// Semantic name to accessor table
#[derive(Debug, Clone)]
pub struct SemanticRegistry {
    entries: HashMap<String, SemanticEntry>,
}

impl Default for SemanticRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

impl SemanticRegistry {
    /// Registry with every built-in semantic
    pub fn standard() -> Self {
        let entries = STANDARD.iter().map(|(name, entry)| ((*name).to_string(), *entry)).collect();
        Self { entries }
    }

    /// Add or replace a semantic
    pub fn register(&mut self, name: impl Into<String>, entry: SemanticEntry) {
        self.entries.insert(name.into(), entry);
    }

    /// Whether `name` is registered
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Entry for `name`
    ///
    /// Unknown names log once and yield a blank entry.
    pub fn get(&self, name: &str) -> SemanticEntry {
        match self.entries.get(name) {
            Some(entry) => *entry,
            None => {
                warn_once!(format!("semantic_{name}"), "Semantic {} is not defined", name);
                SemanticEntry::blank()
            }
        }
    }

    /// Look up `name` and run its accessor
    pub fn resolve(
        &self,
        name: &str,
        context: &mut RenderContext<'_>,
        item: &DrawItem<'_>,
        variable: &ActiveVariable,
    ) -> Option<SemanticValue> {
        (self.get(name).get)(context, item, variable)
    }
}
