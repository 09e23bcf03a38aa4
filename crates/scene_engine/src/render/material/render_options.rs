//! Shader variant keys
//!
//! A [`RenderOptions`] value is rebuilt for every draw from the mesh's
//! geometry, its material, the frame's lights and the scene fog. It is a
//! plain value: equal inputs give equal options, and the options' header
//! text is the shader cache key.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use bitflags::bitflags;

use super::{GeometryVertexType, LightModel, Side};
use crate::render::lighting::LightCounts;
use crate::render::texture::Texture;
use crate::warn_once;

bitflags! {
    /// Boolean shader features
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct RenderFlags: u32 {
        /// Lit material with at least one light
        const LIGHT = 1 << 0;
        /// Normals available
        const NORMAL = 1 << 1;
        /// Tangents available
        const TANGENT = 1 << 2;
        /// First UV set available
        const TEXCOORD0 = 1 << 3;
        /// Second UV set available
        const TEXCOORD1 = 1 << 4;
        /// Vertex colors available
        const VERTEX_COLOR = 1 << 5;
        /// Diffuse slot is a texture
        const DIFFUSE_MAP = 1 << 6;
        /// Ambient slot is a texture
        const AMBIENT_MAP = 1 << 7;
        /// Specular slot is a texture
        const SPECULAR_MAP = 1 << 8;
        /// Emission slot is a texture
        const EMISSION_MAP = 1 << 9;
        /// Normal map bound
        const NORMAL_MAP = 1 << 10;
        /// Transparency map bound
        const TRANSPARENCY_MAP = 1 << 11;
        /// Specular environment cube map bound
        const SPECULAR_ENV_MAP = 1 << 12;
        /// Colors are premultiplied by alpha
        const PREMULTIPLY_ALPHA = 1 << 13;
        /// Fragments below the alpha cutoff are discarded
        const ALPHA_CUTOFF = 1 << 14;
        /// HDR output with exposure
        const HDR = 1 << 15;
        /// Gamma correction of the output
        const GAMMA_CORRECTION = 1 << 16;
        /// Mesh casts shadows
        const CAST_SHADOWS = 1 << 17;
        /// Mesh samples shadow maps
        const RECEIVE_SHADOWS = 1 << 18;
        /// Blending enabled
        const TRANSPARENT = 1 << 19;
        /// Depth-only output for shadow maps
        const DEPTH_ONLY = 1 << 20;
        /// Linear fog
        const FOG_LINEAR = 1 << 21;
        /// Exponential fog
        const FOG_EXP = 1 << 22;
    }
}

const FLAG_DEFINES: [(RenderFlags, &str); 23] = [
    (RenderFlags::LIGHT, "HAS_LIGHT"),
    (RenderFlags::NORMAL, "HAS_NORMAL"),
    (RenderFlags::TANGENT, "HAS_TANGENT"),
    (RenderFlags::TEXCOORD0, "HAS_TEXCOORD0"),
    (RenderFlags::TEXCOORD1, "HAS_TEXCOORD1"),
    (RenderFlags::VERTEX_COLOR, "HAS_COLOR"),
    (RenderFlags::DIFFUSE_MAP, "DIFFUSE_MAP"),
    (RenderFlags::AMBIENT_MAP, "AMBIENT_MAP"),
    (RenderFlags::SPECULAR_MAP, "SPECULAR_MAP"),
    (RenderFlags::EMISSION_MAP, "EMISSION_MAP"),
    (RenderFlags::NORMAL_MAP, "NORMAL_MAP"),
    (RenderFlags::TRANSPARENCY_MAP, "TRANSPARENCY_MAP"),
    (RenderFlags::SPECULAR_ENV_MAP, "SPECULAR_ENV_MAP"),
    (RenderFlags::PREMULTIPLY_ALPHA, "PREMULTIPLY_ALPHA"),
    (RenderFlags::ALPHA_CUTOFF, "ALPHA_CUTOFF"),
    (RenderFlags::HDR, "USE_HDR"),
    (RenderFlags::GAMMA_CORRECTION, "GAMMA_CORRECTION"),
    (RenderFlags::CAST_SHADOWS, "CAST_SHADOWS"),
    (RenderFlags::RECEIVE_SHADOWS, "RECEIVE_SHADOWS"),
    (RenderFlags::TRANSPARENT, "TRANSPARENT"),
    (RenderFlags::DEPTH_ONLY, "DEPTH_ONLY"),
    (RenderFlags::FOG_LINEAR, "FOG_LINEAR"),
    (RenderFlags::FOG_EXP, "FOG_EXP"),
];

/// Everything that selects a shader variant
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct RenderOptions {
    /// Boolean features
    pub flags: RenderFlags,
    /// Lighting model of basic materials
    pub light_model: Option<LightModel>,
    /// Output of geometry materials
    pub vertex_type: Option<GeometryVertexType>,
    /// Rendered faces
    pub side: Side,
    /// UV channel per texture define, filled by `TextureOptions::update`
    pub texture_uv: BTreeMap<&'static str, u32>,
    /// Lights in the frame
    pub lights: LightCounts,
}

impl RenderOptions {
    /// Empty options
    pub fn new() -> Self {
        Self::default()
    }

    /// Set or clear flags
    pub fn set(&mut self, flags: RenderFlags, enabled: bool) -> &mut Self {
        self.flags.set(flags, enabled);
        self
    }

    /// Whether all of `flags` are set
    pub fn has(&self, flags: RenderFlags) -> bool {
        self.flags.contains(flags)
    }

    /// `#define` lines describing these options
    ///
    /// The text is deterministic, so it doubles as the cache key.
    pub fn header(&self) -> String {
        let mut header = String::new();
        for (flag, name) in FLAG_DEFINES {
            if self.flags.contains(flag) {
                let _ = writeln!(header, "#define {name}");
            }
        }
        if let Some(model) = self.light_model {
            let _ = writeln!(header, "#define LIGHT_TYPE_{}", model.define_suffix());
        }
        if let Some(vertex_type) = self.vertex_type {
            let _ = writeln!(header, "#define VERTEX_TYPE_{}", vertex_type.define_suffix());
        }
        match self.side {
            Side::Front => {}
            Side::Back => header.push_str("#define SIDE_BACK\n"),
            Side::Double => header.push_str("#define SIDE_DOUBLE\n"),
        }
        for (name, channel) in &self.texture_uv {
            let _ = writeln!(header, "#define {name}_UV {channel}");
        }

        let lights = &self.lights;
        if self.has(RenderFlags::LIGHT) {
            if lights.ambient {
                header.push_str("#define AMBIENT_LIGHTS\n");
            }
            for (name, count) in [
                ("DIRECTIONAL_LIGHTS", lights.directional),
                ("DIRECTIONAL_SHADOWS", lights.directional_shadows),
                ("POINT_LIGHTS", lights.point),
                ("SPOT_LIGHTS", lights.spot),
                ("SPOT_SHADOWS", lights.spot_shadows),
            ] {
                if count > 0 {
                    let _ = writeln!(header, "#define {name} {count}");
                }
            }
        }
        header
    }
}

/// Texture slots a material binds and the UV channel each one samples
#[derive(Debug, Default)]
pub struct TextureOptions {
    slots: Vec<(&'static str, u32)>,
}

impl TextureOptions {
    /// Empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a texture under a define name; absent textures are ignored
    pub fn add(&mut self, texture: Option<&Texture>, name: &'static str) -> bool {
        self.add_with(texture, name, |_| {})
    }

    /// Like `add`, running `on_added` with the texture when present
    pub fn add_with(&mut self, texture: Option<&Texture>, name: &'static str, on_added: impl FnOnce(&Texture)) -> bool {
        let Some(texture) = texture else { return false };
        self.slots.push((name, texture.uv_channel));
        on_added(texture);
        true
    }

    /// Write the UV channel of every slot into `options`
    ///
    /// Channels other than 0 and 1 fall back to 0.
    pub fn update(&self, options: &mut RenderOptions) {
        for &(name, channel) in &self.slots {
            let channel = if channel > 1 {
                warn_once!(
                    format!("uv_channel_{name}_{channel}"),
                    "Texture {} uses unsupported uv channel {}, falling back to 0",
                    name,
                    channel
                );
                0
            } else {
                channel
            };
            options.texture_uv.insert(name, channel);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::texture::Texture;

    #[test]
    fn test_header_is_deterministic() {
        let mut a = RenderOptions::new();
        a.set(RenderFlags::NORMAL | RenderFlags::LIGHT, true);
        a.light_model = Some(LightModel::Phong);
        a.lights.directional = 2;

        let mut b = RenderOptions::new();
        b.lights.directional = 2;
        b.light_model = Some(LightModel::Phong);
        b.set(RenderFlags::LIGHT, true).set(RenderFlags::NORMAL, true);

        assert_eq!(a, b);
        assert_eq!(a.header(), b.header());
        assert!(a.header().contains("#define DIRECTIONAL_LIGHTS 2\n"));
        assert!(a.header().contains("#define LIGHT_TYPE_PHONG\n"));
    }

    #[test]
    fn test_light_counts_only_when_lit() {
        let mut options = RenderOptions::new();
        options.lights.point = 1;
        assert!(!options.header().contains("POINT_LIGHTS"));
        options.set(RenderFlags::LIGHT, true);
        assert!(options.header().contains("#define POINT_LIGHTS 1\n"));
    }

    #[test]
    fn test_texture_uv_channels() {
        let diffuse = Texture::new_2d().with_uv_channel(1);
        let normal = Texture::new_2d().with_uv_channel(3);
        let mut textures = TextureOptions::new();
        let mut seen = false;
        assert!(textures.add_with(Some(&diffuse), "DIFFUSE_MAP", |_| seen = true));
        assert!(textures.add(Some(&normal), "NORMAL_MAP"));
        assert!(!textures.add(None, "EMISSION_MAP"));
        assert!(seen);

        let mut options = RenderOptions::new();
        textures.update(&mut options);
        assert_eq!(options.texture_uv.get("DIFFUSE_MAP"), Some(&1));
        assert_eq!(options.texture_uv.get("NORMAL_MAP"), Some(&0));
        assert!(!crate::foundation::logging::first_time("uv_channel_NORMAL_MAP_3"));
        assert!(options.header().contains("#define DIFFUSE_MAP_UV 1\n"));
    }

    #[test]
    fn test_side_in_header() {
        let mut options = RenderOptions::new();
        assert!(!options.header().contains("SIDE_"));
        options.side = Side::Double;
        assert!(options.header().contains("#define SIDE_DOUBLE\n"));
    }
}
