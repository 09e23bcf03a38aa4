//! Materials
//!
//! A [`Material`] is a render-state record (depth, culling, blending) plus
//! surface inputs and two name maps: `uniforms` and `attributes` bind the
//! variable names a shader declares to semantic names resolved by the
//! [`SemanticRegistry`](crate::render::semantic::SemanticRegistry).
//!
//! Derived state is kept consistent by the setters:
//! - `set_cull_face`, `set_cull_face_type` and `set_side` recompute each other
//! - `set_transparent` installs or removes the blending preset and depth mask
//!
//! The material kind is a plain enum; [`Material::render_options`] applies
//! the shared flags first and then the kind-specific ones.

mod render_options;

pub use render_options::{RenderFlags, RenderOptions, TextureOptions};

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use slotmap::new_key_type;

use crate::render::gpu::{BlendEquation, BlendFactor, CullFace, DepthFunc};
use crate::render::texture::{Color, MaterialValue, TextureAssets};

new_key_type! {
    /// Handle of a material registered with a scene
    pub struct MaterialId;
}

/// Faces a material renders
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Side {
    /// Front faces only
    #[default]
    Front,
    /// Back faces only
    Back,
    /// Both faces
    Double,
}

/// Lighting model of basic materials
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LightModel {
    /// Unlit
    None,
    /// Diffuse only
    Lambert,
    /// Phong specular
    Phong,
    /// Blinn-Phong specular
    BlinnPhong,
}

impl LightModel {
    fn define_suffix(self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::Lambert => "LAMBERT",
            Self::Phong => "PHONG",
            Self::BlinnPhong => "BLINN_PHONG",
        }
    }
}

/// What a geometry material writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GeometryVertexType {
    /// View-space position
    Position,
    /// View-space normal
    Normal,
    /// Packed depth
    Depth,
    /// Distance to the camera
    Distance,
}

impl GeometryVertexType {
    fn define_suffix(self) -> &'static str {
        match self {
            Self::Position => "POSITION",
            Self::Normal => "NORMAL",
            Self::Depth => "DEPTH",
            Self::Distance => "DISTANCE",
        }
    }
}

/// Material variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MaterialKind {
    /// Classic diffuse/specular surface
    Basic {
        /// Lighting model
        light_model: LightModel,
    },
    /// Writes a geometric quantity as color
    Geometry {
        /// Quantity written
        vertex_type: GeometryVertexType,
    },
    /// Depth only, used for shadow maps
    Depth,
}

/// User-authored shader sources
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomShader {
    /// Vertex stage source, without header
    pub vertex: String,
    /// Fragment stage source, without header
    pub fragment: String,
    /// Cache key; `None` compiles a fresh shader for every request
    pub cache_key: Option<String>,
    /// Append the options header to the cache key
    pub use_header_cache: bool,
}

const DEFAULT_ATTRIBUTES: [(&str, &str); 6] = [
    ("a_position", "POSITION"),
    ("a_normal", "NORMAL"),
    ("a_tangent", "TANGENT"),
    ("a_texcoord0", "TEXCOORD_0"),
    ("a_texcoord1", "TEXCOORD_1"),
    ("a_color", "COLOR_0"),
];

const DEFAULT_UNIFORMS: [(&str, &str); 47] = [
    ("u_localMatrix", "LOCAL"),
    ("u_modelMatrix", "MODEL"),
    ("u_viewMatrix", "VIEW"),
    ("u_projectionMatrix", "PROJECTION"),
    ("u_viewProjectionMatrix", "VIEWPROJECTION"),
    ("u_modelViewMatrix", "MODELVIEW"),
    ("u_modelViewProjectionMatrix", "MODELVIEWPROJECTION"),
    ("u_modelInverseMatrix", "MODELINVERSE"),
    ("u_viewInverseMatrix", "VIEWINVERSE"),
    ("u_projectionInverseMatrix", "PROJECTIONINVERSE"),
    ("u_modelViewInverseMatrix", "MODELVIEWINVERSE"),
    ("u_modelInverseTransposeMatrix", "MODELINVERSETRANSPOSE"),
    ("u_normalMatrix", "MODELVIEWINVERSETRANSPOSE"),
    ("u_viewport", "VIEWPORT"),
    ("u_cameraNear", "CAMERANEAR"),
    ("u_cameraFar", "CAMERAFAR"),
    ("u_cameraPosition", "CAMERAPOSITION"),
    ("u_ambientLightsColor", "AMBIENTLIGHTSCOLOR"),
    ("u_directionalLightsColor", "DIRECTIONALLIGHTSCOLOR"),
    ("u_directionalLightsInfo", "DIRECTIONALLIGHTSINFO"),
    ("u_directionalLightsShadowMap", "DIRECTIONALLIGHTSSHADOWMAP"),
    ("u_directionalLightsShadowMapSize", "DIRECTIONALLIGHTSSHADOWMAPSIZE"),
    ("u_directionalLightsShadowBias", "DIRECTIONALLIGHTSSHADOWBIAS"),
    ("u_directionalLightSpaceMatrix", "DIRECTIONALLIGHTSPACEMATRIX"),
    ("u_pointLightsPos", "POINTLIGHTSPOS"),
    ("u_pointLightsColor", "POINTLIGHTSCOLOR"),
    ("u_pointLightsInfo", "POINTLIGHTSINFO"),
    ("u_spotLightsPos", "SPOTLIGHTSPOS"),
    ("u_spotLightsDir", "SPOTLIGHTSDIR"),
    ("u_spotLightsColor", "SPOTLIGHTSCOLOR"),
    ("u_spotLightsCutoffs", "SPOTLIGHTSCUTOFFS"),
    ("u_spotLightsInfo", "SPOTLIGHTSINFO"),
    ("u_spotLightsShadowMap", "SPOTLIGHTSSHADOWMAP"),
    ("u_spotLightsShadowMapSize", "SPOTLIGHTSSHADOWMAPSIZE"),
    ("u_spotLightsShadowBias", "SPOTLIGHTSSHADOWBIAS"),
    ("u_spotLightSpaceMatrix", "SPOTLIGHTSPACEMATRIX"),
    ("u_diffuse", "DIFFUSE"),
    ("u_ambient", "AMBIENT"),
    ("u_specular", "SPECULAR"),
    ("u_emission", "EMISSION"),
    ("u_shininess", "SHININESS"),
    ("u_normalMap", "NORMALMAP"),
    ("u_normalMapScale", "NORMALMAPSCALE"),
    ("u_transparency", "TRANSPARENCY"),
    ("u_alphaCutoff", "ALPHACUTOFF"),
    ("u_exposure", "EXPOSURE"),
    ("u_gammaFactor", "GAMMAFACTOR"),
];

const EXTRA_UNIFORMS: [(&str, &str); 5] = [
    ("u_specularEnvMap", "SPECULARENVMAP"),
    ("u_reflectivity", "REFLECTIVITY"),
    ("u_transparencyMap", "TRANSPARENCYMAP"),
    ("u_fogColor", "FOGCOLOR"),
    ("u_fogInfo", "FOGINFO"),
];

/// Render state and surface inputs of a mesh
#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    /// Display name
    pub name: String,
    /// Variant
    pub kind: MaterialKind,

    /// Depth testing
    pub depth_test: bool,
    depth_mask: bool,
    /// Depth comparison
    pub depth_func: DepthFunc,
    /// Depth range mapping
    pub depth_range: [f32; 2],

    cull_face: bool,
    cull_face_type: CullFace,
    side: Side,

    /// Blending
    pub blend: bool,
    /// Source RGB factor
    pub blend_src: BlendFactor,
    /// Destination RGB factor
    pub blend_dst: BlendFactor,
    /// Source alpha factor
    pub blend_src_alpha: BlendFactor,
    /// Destination alpha factor
    pub blend_dst_alpha: BlendFactor,
    /// RGB blend equation
    pub blend_equation: BlendEquation,
    /// Alpha blend equation
    pub blend_equation_alpha: BlendEquation,
    transparent: bool,
    premultiply_alpha: bool,

    /// Discard fragments with alpha below this value, 0 disables
    pub alpha_cutoff: f32,
    /// Request HDR output
    pub use_hdr: bool,
    /// Request gamma-corrected output
    pub gamma_correction: bool,
    /// Render into shadow maps
    pub cast_shadows: bool,
    /// Sample shadow maps
    pub receive_shadows: bool,
    /// Explicit draw ordering; added to the node's order
    pub render_order: i32,

    /// Base color
    pub diffuse: MaterialValue,
    /// Ambient reflectance
    pub ambient: MaterialValue,
    /// Specular color
    pub specular: MaterialValue,
    /// Emitted color
    pub emission: MaterialValue,
    /// Tangent-space normal map
    pub normal_map: MaterialValue,
    /// Opacity map
    pub transparency_map: MaterialValue,
    /// Environment cube map for reflections
    pub specular_env_map: MaterialValue,
    /// Specular exponent
    pub shininess: f32,
    /// Environment reflection strength
    pub reflectivity: f32,
    /// Normal map strength
    pub normal_map_scale: f32,
    /// Opacity multiplier
    pub transparency: f32,

    /// Shader variable name to semantic name, for uniforms
    pub uniforms: HashMap<String, String>,
    /// Shader variable name to semantic name, for attributes
    pub attributes: HashMap<String, String>,
    /// Sources replacing the built-in shader chunks
    pub shader: Option<CustomShader>,
}

impl Material {
    /// Material of the given kind with default state
    pub fn new(kind: MaterialKind) -> Self {
        let to_map = |pairs: &[(&str, &str)]| -> HashMap<String, String> {
            pairs.iter().map(|(name, semantic)| ((*name).to_string(), (*semantic).to_string())).collect()
        };
        let mut uniforms = to_map(&DEFAULT_UNIFORMS);
        uniforms.extend(to_map(&EXTRA_UNIFORMS));

        Self {
            name: String::new(),
            kind,
            depth_test: true,
            depth_mask: true,
            depth_func: DepthFunc::Less,
            depth_range: [0.0, 1.0],
            cull_face: true,
            cull_face_type: CullFace::Back,
            side: Side::Front,
            blend: false,
            blend_src: BlendFactor::One,
            blend_dst: BlendFactor::Zero,
            blend_src_alpha: BlendFactor::One,
            blend_dst_alpha: BlendFactor::Zero,
            blend_equation: BlendEquation::Add,
            blend_equation_alpha: BlendEquation::Add,
            transparent: false,
            premultiply_alpha: true,
            alpha_cutoff: 0.0,
            use_hdr: false,
            gamma_correction: false,
            cast_shadows: true,
            receive_shadows: true,
            render_order: 0,
            diffuse: MaterialValue::Color(Color::DEFAULT_GRAY),
            ambient: MaterialValue::None,
            specular: MaterialValue::Color(Color::rgb(1.0, 1.0, 1.0)),
            emission: MaterialValue::None,
            normal_map: MaterialValue::None,
            transparency_map: MaterialValue::None,
            specular_env_map: MaterialValue::None,
            shininess: 32.0,
            reflectivity: 0.0,
            normal_map_scale: 1.0,
            transparency: 1.0,
            uniforms,
            attributes: to_map(&DEFAULT_ATTRIBUTES),
            shader: None,
        }
    }

    /// Blinn-Phong basic material
    pub fn basic() -> Self {
        Self::new(MaterialKind::Basic { light_model: LightModel::BlinnPhong })
    }

    /// Basic material with a given lighting model
    pub fn with_light_model(light_model: LightModel) -> Self {
        Self::new(MaterialKind::Basic { light_model })
    }

    /// Geometry material writing `vertex_type`
    pub fn geometry(vertex_type: GeometryVertexType) -> Self {
        Self::new(MaterialKind::Geometry { vertex_type })
    }

    /// Depth-only material used by shadow passes
    pub fn depth() -> Self {
        let mut material = Self::new(MaterialKind::Depth);
        material.cast_shadows = false;
        material.receive_shadows = false;
        material
    }

    /// Whether faces are culled
    pub fn cull_face(&self) -> bool {
        self.cull_face
    }

    /// Which faces are culled when culling is on
    pub fn cull_face_type(&self) -> CullFace {
        self.cull_face_type
    }

    /// Rendered faces
    pub fn side(&self) -> Side {
        self.side
    }

    /// Turn culling on or off; recomputes `side`
    pub fn set_cull_face(&mut self, enabled: bool) {
        self.cull_face = enabled;
        self.side = self.side_from_cull();
    }

    /// Choose culled faces; recomputes `side`
    ///
    /// Culling both faces draws nothing and is rejected; use `visible`.
    pub fn set_cull_face_type(&mut self, face: CullFace) {
        if face == CullFace::FrontAndBack {
            log::warn!("Material {:?}: culling front and back faces is not supported", self.name);
            return;
        }
        self.cull_face_type = face;
        self.side = self.side_from_cull();
    }

    /// Choose rendered faces; recomputes the culling state
    pub fn set_side(&mut self, side: Side) {
        self.side = side;
        match side {
            Side::Front => {
                self.cull_face = true;
                self.cull_face_type = CullFace::Back;
            }
            Side::Back => {
                self.cull_face = true;
                self.cull_face_type = CullFace::Front;
            }
            Side::Double => self.cull_face = false,
        }
    }

    fn side_from_cull(&self) -> Side {
        match (self.cull_face, self.cull_face_type) {
            (false, _) => Side::Double,
            (true, CullFace::Front) => Side::Back,
            (true, _) => Side::Front,
        }
    }

    /// Whether depth writes are on
    pub fn depth_mask(&self) -> bool {
        self.depth_mask
    }

    /// Override depth writes
    pub fn set_depth_mask(&mut self, enabled: bool) {
        self.depth_mask = enabled;
    }

    /// Whether the material is transparent
    pub fn transparent(&self) -> bool {
        self.transparent
    }

    /// Toggle transparency
    ///
    /// `true` enables blending with `(ONE or SRC_ALPHA, ONE_MINUS_SRC_ALPHA)`
    /// for color, `(ONE, ONE_MINUS_SRC_ALPHA)` for alpha, additive equations
    /// and no depth writes. `false` disables blending and restores depth
    /// writes.
    pub fn set_transparent(&mut self, transparent: bool) {
        self.transparent = transparent;
        if transparent {
            self.blend = true;
            self.blend_src = self.transparent_src_factor();
            self.blend_dst = BlendFactor::OneMinusSrcAlpha;
            self.blend_src_alpha = BlendFactor::One;
            self.blend_dst_alpha = BlendFactor::OneMinusSrcAlpha;
            self.blend_equation = BlendEquation::Add;
            self.blend_equation_alpha = BlendEquation::Add;
            self.depth_mask = false;
        } else {
            self.blend = false;
            self.depth_mask = true;
        }
    }

    /// Whether colors are premultiplied by alpha
    pub fn premultiply_alpha(&self) -> bool {
        self.premultiply_alpha
    }

    /// Toggle premultiplied alpha; updates the blend preset when transparent
    pub fn set_premultiply_alpha(&mut self, premultiply: bool) {
        self.premultiply_alpha = premultiply;
        if self.transparent {
            self.blend_src = self.transparent_src_factor();
        }
    }

    fn transparent_src_factor(&self) -> BlendFactor {
        if self.premultiply_alpha {
            BlendFactor::One
        } else {
            BlendFactor::SrcAlpha
        }
    }

    /// Key grouping draws that share render state
    ///
    /// Opaque draws are sorted by this key so equal states are adjacent.
    pub fn render_key(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.kind.hash(&mut hasher);
        self.side.hash(&mut hasher);
        (self.depth_test, self.depth_mask, self.depth_func).hash(&mut hasher);
        (self.blend, self.blend_src, self.blend_dst, self.blend_src_alpha, self.blend_dst_alpha).hash(&mut hasher);
        self.shader.as_ref().map(|shader| (&shader.vertex, &shader.fragment)).hash(&mut hasher);
        hasher.finish()
    }

    /// Fill `options` with this material's flags
    ///
    /// Shared flags are applied first, then the kind's own.
    pub fn render_options<'o>(&self, options: &'o mut RenderOptions, textures: &TextureAssets) -> &'o mut RenderOptions {
        let mut texture_options = TextureOptions::new();
        self.base_render_options(options, &mut texture_options, textures);

        match self.kind {
            MaterialKind::Basic { light_model } => {
                options.light_model = Some(light_model);
                let slots = [
                    (&self.diffuse, RenderFlags::DIFFUSE_MAP, "DIFFUSE_MAP"),
                    (&self.ambient, RenderFlags::AMBIENT_MAP, "AMBIENT_MAP"),
                    (&self.specular, RenderFlags::SPECULAR_MAP, "SPECULAR_MAP"),
                    (&self.emission, RenderFlags::EMISSION_MAP, "EMISSION_MAP"),
                    (&self.transparency_map, RenderFlags::TRANSPARENCY_MAP, "TRANSPARENCY_MAP"),
                ];
                for (value, flag, name) in slots {
                    if let MaterialValue::Texture(id) = value {
                        texture_options.add_with(textures.get(*id), name, |_| {
                            options.flags.insert(flag);
                        });
                    }
                }
                if let MaterialValue::CubeTexture(id) = self.specular_env_map {
                    if textures.contains_key(id) {
                        options.flags.insert(RenderFlags::SPECULAR_ENV_MAP);
                    }
                }
            }
            MaterialKind::Geometry { vertex_type } => {
                options.vertex_type = Some(vertex_type);
            }
            MaterialKind::Depth => {
                options.flags.insert(RenderFlags::DEPTH_ONLY);
            }
        }

        texture_options.update(options);
        options
    }

    fn base_render_options(&self, options: &mut RenderOptions, texture_options: &mut TextureOptions, textures: &TextureAssets) {
        options.side = self.side;
        options.set(RenderFlags::PREMULTIPLY_ALPHA, self.premultiply_alpha);
        options.set(RenderFlags::ALPHA_CUTOFF, self.alpha_cutoff > 0.0);
        options.set(RenderFlags::HDR, self.use_hdr);
        options.set(RenderFlags::GAMMA_CORRECTION, self.gamma_correction);
        options.set(RenderFlags::CAST_SHADOWS, self.cast_shadows);
        options.set(RenderFlags::RECEIVE_SHADOWS, self.receive_shadows);
        options.set(RenderFlags::TRANSPARENT, self.transparent);
        if let MaterialValue::Texture(id) = self.normal_map {
            texture_options.add_with(textures.get(id), "NORMAL_MAP", |_| {
                options.flags.insert(RenderFlags::NORMAL_MAP);
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::texture::Texture;

    #[test]
    fn test_cull_face_and_side_stay_paired() {
        let mut material = Material::basic();
        assert_eq!(material.side(), Side::Front);

        material.set_cull_face(false);
        assert_eq!(material.side(), Side::Double);

        material.set_cull_face(true);
        material.set_cull_face_type(CullFace::Front);
        assert_eq!(material.side(), Side::Back);

        material.set_side(Side::Front);
        assert!(material.cull_face());
        assert_eq!(material.cull_face_type(), CullFace::Back);

        material.set_side(Side::Double);
        assert!(!material.cull_face());

        material.set_cull_face_type(CullFace::FrontAndBack);
        assert_eq!(material.cull_face_type(), CullFace::Back);
    }

    #[test]
    fn test_transparent_premultiplied_preset() {
        let mut material = Material::basic();
        material.set_premultiply_alpha(true);
        material.set_transparent(true);

        assert!(material.blend);
        assert_eq!(material.blend_src, BlendFactor::One);
        assert_eq!(material.blend_dst, BlendFactor::OneMinusSrcAlpha);
        assert_eq!(material.blend_src_alpha, BlendFactor::One);
        assert_eq!(material.blend_dst_alpha, BlendFactor::OneMinusSrcAlpha);
        assert_eq!(material.blend_equation, BlendEquation::Add);
        assert_eq!(material.blend_equation_alpha, BlendEquation::Add);
        assert!(!material.depth_mask());

        material.set_transparent(false);
        assert!(material.depth_mask());
        assert!(!material.blend);
    }

    #[test]
    fn test_transparent_straight_alpha() {
        let mut material = Material::basic();
        material.set_premultiply_alpha(false);
        material.set_transparent(true);
        assert_eq!(material.blend_src, BlendFactor::SrcAlpha);

        material.set_premultiply_alpha(true);
        assert_eq!(material.blend_src, BlendFactor::One);
    }

    #[test]
    fn test_render_options_repeatable() {
        let mut textures = TextureAssets::with_key();
        let diffuse = textures.insert(Texture::new_2d());
        let mut material = Material::basic();
        material.diffuse = MaterialValue::Texture(diffuse);
        material.set_transparent(true);

        let mut first = RenderOptions::new();
        material.render_options(&mut first, &textures);
        let mut second = RenderOptions::new();
        material.render_options(&mut second, &textures);

        assert_eq!(first, second);
        assert!(first.has(RenderFlags::DIFFUSE_MAP | RenderFlags::TRANSPARENT));
        assert_eq!(first.texture_uv.get("DIFFUSE_MAP"), Some(&0));
    }

    #[test]
    fn test_kind_specific_options() {
        let textures = TextureAssets::with_key();
        let mut options = RenderOptions::new();
        Material::geometry(GeometryVertexType::Normal).render_options(&mut options, &textures);
        assert_eq!(options.vertex_type, Some(GeometryVertexType::Normal));
        assert_eq!(options.light_model, None);

        let mut options = RenderOptions::new();
        Material::depth().render_options(&mut options, &textures);
        assert!(options.has(RenderFlags::DEPTH_ONLY));
        assert!(!options.has(RenderFlags::CAST_SHADOWS));
    }

    #[test]
    fn test_unregistered_texture_sets_no_flag() {
        let mut textures = TextureAssets::with_key();
        let stale = textures.insert(Texture::new_2d());
        textures.remove(stale);

        let mut material = Material::basic();
        material.normal_map = MaterialValue::Texture(stale);
        let mut options = RenderOptions::new();
        material.render_options(&mut options, &textures);
        assert!(!options.has(RenderFlags::NORMAL_MAP));
    }

    #[test]
    fn test_render_key_groups_equal_state() {
        let a = Material::basic();
        let mut b = Material::basic();
        b.name = "other".to_string();
        assert_eq!(a.render_key(), b.render_key());

        b.set_side(Side::Double);
        assert_ne!(a.render_key(), b.render_key());
    }

    #[test]
    fn test_default_maps_cover_standard_names() {
        let material = Material::basic();
        assert_eq!(material.attributes.get("a_position").map(String::as_str), Some("POSITION"));
        assert_eq!(material.uniforms.get("u_normalMatrix").map(String::as_str), Some("MODELVIEWINVERSETRANSPOSE"));
        assert_eq!(material.uniforms.get("u_fogInfo").map(String::as_str), Some("FOGINFO"));
    }
}
