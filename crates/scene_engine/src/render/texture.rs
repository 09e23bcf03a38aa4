//! Colors, textures and the material value union
//!
//! Texture pixel data is produced by an external loader. Until
//! [`Texture::set_image`] is called a texture is "not loaded" and the
//! renderer binds a 1x1 placeholder in its place.

use serde::{Deserialize, Serialize};
use slotmap::{new_key_type, SlotMap};

new_key_type! {
    /// Handle of a texture registered with a scene
    pub struct TextureId;
}

/// Texture table of a scene
pub type TextureAssets = SlotMap<TextureId, Texture>;

/// Linear RGBA color
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Color {
    /// Red
    pub r: f32,
    /// Green
    pub g: f32,
    /// Blue
    pub b: f32,
    /// Alpha
    pub a: f32,
}

impl Color {
    /// Opaque white
    pub const WHITE: Self = Self::rgb(1.0, 1.0, 1.0);
    /// Opaque black
    pub const BLACK: Self = Self::rgb(0.0, 0.0, 0.0);
    /// Mid gray used when a material slot has neither color nor texture
    pub const DEFAULT_GRAY: Self = Self::rgb(0.5, 0.5, 0.5);

    /// Color from components
    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    /// Opaque color
    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self::new(r, g, b, 1.0)
    }

    /// Components as an array
    pub const fn to_array(self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a]
    }

    /// Scale the RGB channels, keeping alpha
    pub fn scaled(self, amount: f32) -> Self {
        Self::new(self.r * amount, self.g * amount, self.b * amount, self.a)
    }
}

impl From<[f32; 4]> for Color {
    fn from(c: [f32; 4]) -> Self {
        Self::new(c[0], c[1], c[2], c[3])
    }
}

/// Texture binding target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureTarget {
    /// 2D texture
    Texture2D,
    /// Cube map
    CubeMap,
}

/// Texel format of uploaded image data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    /// 8-bit RGBA
    Rgba8,
    /// 32-bit float depth, used by shadow maps
    Depth32F,
}

/// Decoded pixel data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Tightly packed texels, one face after another for cube maps
    pub data: Vec<u8>,
}

/// Texture asset
#[derive(Debug, Clone, PartialEq)]
pub struct Texture {
    /// Binding target
    pub target: TextureTarget,
    /// Texel format
    pub format: TextureFormat,
    /// UV channel the texture samples with
    pub uv_channel: u32,
    /// Flip rows on upload
    pub flip_y: bool,
    /// Build mipmaps after upload
    pub mipmaps: bool,
    image: Option<Image>,
    version: u64,
}

impl Texture {
    /// 2D texture waiting for its image
    pub fn new_2d() -> Self {
        Self::with_target(TextureTarget::Texture2D)
    }

    /// Cube map waiting for its faces
    pub fn new_cube() -> Self {
        Self::with_target(TextureTarget::CubeMap)
    }

    fn with_target(target: TextureTarget) -> Self {
        Self {
            target,
            format: TextureFormat::Rgba8,
            uv_channel: 0,
            flip_y: false,
            mipmaps: true,
            image: None,
            version: 0,
        }
    }

    /// 2D texture with its image already available
    pub fn from_image(image: Image) -> Self {
        let mut texture = Self::new_2d();
        texture.set_image(image);
        texture
    }

    /// Builder-style UV channel setter
    pub fn with_uv_channel(mut self, channel: u32) -> Self {
        self.uv_channel = channel;
        self
    }

    /// Provide pixel data; the GPU copy is refreshed on next use
    pub fn set_image(&mut self, image: Image) {
        self.image = Some(image);
        self.version += 1;
    }

    /// Pixel data, if loaded
    pub fn image(&self) -> Option<&Image> {
        self.image.as_ref()
    }

    /// Whether pixel data has arrived
    pub fn is_loaded(&self) -> bool {
        self.image.is_some()
    }

    /// Bumped by every `set_image`
    pub fn version(&self) -> u64 {
        self.version
    }
}

/// Value of a color-or-texture material slot
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum MaterialValue {
    /// Slot unused
    #[default]
    None,
    /// Constant color
    Color(Color),
    /// 2D texture
    Texture(TextureId),
    /// Cube map
    CubeTexture(TextureId),
}

impl MaterialValue {
    /// Texture id for texture-valued slots
    pub fn texture(&self) -> Option<TextureId> {
        match self {
            Self::Texture(id) | Self::CubeTexture(id) => Some(*id),
            Self::None | Self::Color(_) => None,
        }
    }

    /// Whether the slot holds anything
    pub fn is_some(&self) -> bool {
        !matches!(self, Self::None)
    }
}

impl From<Color> for MaterialValue {
    fn from(color: Color) -> Self {
        Self::Color(color)
    }
}
