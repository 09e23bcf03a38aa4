//! GPU abstraction
//!
//! The [`Gpu`] trait is the immediate-mode API the renderer drives. Every
//! stateful call is meant to go through [`GpuState`], which remembers the
//! last value of each piece of state and drops redundant calls. Uploads,
//! uniforms and draws are not cached and go through [`GpuState::gpu_mut`].
//!
//! [`HeadlessGpu`] implements the trait without a graphics context; it
//! records every call and reflects shader declarations, which makes the
//! renderer testable and usable for offline validation.

mod headless;
mod state;

pub use headless::{CallLog, GpuCall, HeadlessGpu};
pub use state::GpuState;

use bitflags::bitflags;

use crate::render::geometry::{DataType, DrawMode};
use crate::render::texture::{TextureFormat, TextureTarget};

macro_rules! gpu_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u32);
    };
}

gpu_handle!(
    /// Buffer object
    GpuBuffer
);
gpu_handle!(
    /// Compiled shader stage
    GpuShader
);
gpu_handle!(
    /// Linked program
    GpuProgram
);
gpu_handle!(
    /// Texture object
    GpuTexture
);
gpu_handle!(
    /// Framebuffer object
    GpuFramebuffer
);

/// Toggleable pipeline capabilities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Depth testing
    DepthTest,
    /// Blending
    Blend,
    /// Face culling
    CullFace,
    /// Scissor test
    ScissorTest,
    /// Polygon offset for filled primitives
    PolygonOffsetFill,
}

/// Buffer binding points
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferTarget {
    /// Vertex attribute data
    Array,
    /// Index data
    ElementArray,
}

/// Comparison function for depth testing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DepthFunc {
    /// Never passes
    Never,
    /// Passes if less
    #[default]
    Less,
    /// Passes if equal
    Equal,
    /// Passes if less or equal
    LessEqual,
    /// Passes if greater
    Greater,
    /// Passes if not equal
    NotEqual,
    /// Passes if greater or equal
    GreaterEqual,
    /// Always passes
    Always,
}

/// Blend factors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendFactor {
    /// 0
    Zero,
    /// 1
    One,
    /// Source color
    SrcColor,
    /// 1 - source color
    OneMinusSrcColor,
    /// Source alpha
    SrcAlpha,
    /// 1 - source alpha
    OneMinusSrcAlpha,
    /// Destination alpha
    DstAlpha,
    /// 1 - destination alpha
    OneMinusDstAlpha,
    /// Destination color
    DstColor,
    /// 1 - destination color
    OneMinusDstColor,
}

/// Blend equations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BlendEquation {
    /// src + dst
    #[default]
    Add,
    /// src - dst
    Subtract,
    /// dst - src
    ReverseSubtract,
}

/// Which faces are culled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CullFace {
    /// Cull front faces
    Front,
    /// Cull back faces
    #[default]
    Back,
    /// Cull everything
    FrontAndBack,
}

/// Winding of front faces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FrontFace {
    /// Counter-clockwise
    #[default]
    Ccw,
    /// Clockwise
    Cw,
}

/// Shader stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    /// Vertex shader
    Vertex,
    /// Fragment shader
    Fragment,
}

impl std::fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Vertex => write!(f, "vertex"),
            Self::Fragment => write!(f, "fragment"),
        }
    }
}

bitflags! {
    /// Buffers cleared by `Gpu::clear`
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ClearMask: u32 {
        /// Color buffer
        const COLOR = 1 << 0;
        /// Depth buffer
        const DEPTH = 1 << 1;
        /// Stencil buffer
        const STENCIL = 1 << 2;
    }
}

/// GLSL type of an active attribute or uniform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VariableType {
    /// float
    Float,
    /// vec2
    Vec2,
    /// vec3
    Vec3,
    /// vec4
    Vec4,
    /// int
    Int,
    /// bool
    Bool,
    /// mat3
    Mat3,
    /// mat4
    Mat4,
    /// sampler2D
    Sampler2D,
    /// samplerCube
    SamplerCube,
}

impl VariableType {
    /// Parse a GLSL type name
    pub fn from_glsl(name: &str) -> Option<Self> {
        Some(match name {
            "float" => Self::Float,
            "vec2" => Self::Vec2,
            "vec3" => Self::Vec3,
            "vec4" => Self::Vec4,
            "int" => Self::Int,
            "bool" => Self::Bool,
            "mat3" => Self::Mat3,
            "mat4" => Self::Mat4,
            "sampler2D" => Self::Sampler2D,
            "samplerCube" => Self::SamplerCube,
            _ => return None,
        })
    }

    /// Whether values of this type are texture units
    pub fn is_sampler(self) -> bool {
        matches!(self, Self::Sampler2D | Self::SamplerCube)
    }
}

/// An attribute or uniform reported by a linked program
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveVariable {
    /// Name without any `[0]` suffix
    pub name: String,
    /// Location used to address it
    pub location: u32,
    /// Array length, 1 for scalars
    pub size: u32,
    /// GLSL type
    pub kind: VariableType,
}

/// Value passed to `Gpu::set_uniform`
#[derive(Debug, Clone, PartialEq)]
pub enum UniformValue {
    /// float
    Float(f32),
    /// vec2
    Vec2([f32; 2]),
    /// vec3
    Vec3([f32; 3]),
    /// vec4
    Vec4([f32; 4]),
    /// int, bool or sampler unit
    Int(i32),
    /// mat3, column-major
    Mat3([f32; 9]),
    /// mat4, column-major
    Mat4([f32; 16]),
    /// Float arrays of any vector or matrix type
    FloatArray(Vec<f32>),
    /// Int or sampler arrays
    IntArray(Vec<i32>),
}

/// Immediate-mode graphics API
///
/// Compilation and linking return the driver's info log on failure.
pub trait Gpu {
    /// Whether the context was lost and every object is invalid
    fn is_context_lost(&self) -> bool {
        false
    }

    /// Create a buffer object
    fn create_buffer(&mut self) -> GpuBuffer;
    /// Delete a buffer object
    fn delete_buffer(&mut self, buffer: GpuBuffer);
    /// Bind a buffer to a target
    fn bind_buffer(&mut self, target: BufferTarget, buffer: Option<GpuBuffer>);
    /// Replace the bound buffer's whole contents
    fn buffer_data(&mut self, target: BufferTarget, data: &[u8]);
    /// Overwrite part of the bound buffer
    fn buffer_sub_data(&mut self, target: BufferTarget, byte_offset: usize, data: &[u8]);

    /// Compile one shader stage
    fn compile_shader(&mut self, stage: ShaderStage, source: &str) -> Result<GpuShader, String>;
    /// Delete a shader stage
    fn delete_shader(&mut self, shader: GpuShader);
    /// Link two stages into a program
    fn link_program(&mut self, vertex: GpuShader, fragment: GpuShader) -> Result<GpuProgram, String>;
    /// Delete a program
    fn delete_program(&mut self, program: GpuProgram);
    /// Active attributes of a linked program
    fn active_attributes(&self, program: GpuProgram) -> Vec<ActiveVariable>;
    /// Active uniforms of a linked program
    fn active_uniforms(&self, program: GpuProgram) -> Vec<ActiveVariable>;
    /// Make a program current
    fn use_program(&mut self, program: Option<GpuProgram>);
    /// Set a uniform of the current program
    fn set_uniform(&mut self, location: u32, value: &UniformValue);

    /// Enable a vertex attribute array
    fn enable_vertex_attrib_array(&mut self, location: u32);
    /// Disable a vertex attribute array
    fn disable_vertex_attrib_array(&mut self, location: u32);
    /// Describe the layout of an attribute in the bound array buffer
    fn vertex_attrib_pointer(
        &mut self,
        location: u32,
        size: u8,
        data_type: DataType,
        normalized: bool,
        stride: usize,
        offset: usize,
    );

    /// Create a texture object
    fn create_texture(&mut self) -> GpuTexture;
    /// Delete a texture object
    fn delete_texture(&mut self, texture: GpuTexture);
    /// Select the texture unit subsequent binds affect
    fn active_texture(&mut self, unit: u32);
    /// Bind a texture on the active unit
    fn bind_texture(&mut self, target: TextureTarget, texture: Option<GpuTexture>);
    /// Allocate and optionally fill the bound texture
    fn tex_image(&mut self, target: TextureTarget, format: TextureFormat, width: u32, height: u32, data: Option<&[u8]>);
    /// Build mipmaps for the bound texture
    fn generate_mipmap(&mut self, target: TextureTarget);

    /// Create a framebuffer object
    fn create_framebuffer(&mut self) -> GpuFramebuffer;
    /// Delete a framebuffer object
    fn delete_framebuffer(&mut self, framebuffer: GpuFramebuffer);
    /// Bind a framebuffer, `None` for the default one
    fn bind_framebuffer(&mut self, framebuffer: Option<GpuFramebuffer>);
    /// Attach a texture as the depth attachment of the bound framebuffer
    fn framebuffer_depth_texture(&mut self, texture: GpuTexture);

    /// Enable a capability
    fn enable(&mut self, capability: Capability);
    /// Disable a capability
    fn disable(&mut self, capability: Capability);
    /// Depth comparison
    fn depth_func(&mut self, func: DepthFunc);
    /// Depth writes
    fn depth_mask(&mut self, enabled: bool);
    /// Depth range mapping
    fn depth_range(&mut self, near: f32, far: f32);
    /// Separate RGB and alpha blend factors
    fn blend_func_separate(&mut self, src: BlendFactor, dst: BlendFactor, src_alpha: BlendFactor, dst_alpha: BlendFactor);
    /// Separate RGB and alpha blend equations
    fn blend_equation_separate(&mut self, rgb: BlendEquation, alpha: BlendEquation);
    /// Culled faces
    fn cull_face(&mut self, face: CullFace);
    /// Front face winding
    fn front_face(&mut self, face: FrontFace);
    /// Viewport rectangle
    fn viewport(&mut self, x: i32, y: i32, width: u32, height: u32);
    /// Clear color
    fn clear_color(&mut self, color: [f32; 4]);
    /// Color write mask
    fn color_mask(&mut self, mask: [bool; 4]);
    /// Clear buffers
    fn clear(&mut self, mask: ClearMask);

    /// Indexed draw from the bound element buffer
    fn draw_elements(&mut self, mode: DrawMode, count: usize, index_type: DataType, byte_offset: usize);
    /// Non-indexed draw
    fn draw_arrays(&mut self, mode: DrawMode, first: usize, count: usize);
}
