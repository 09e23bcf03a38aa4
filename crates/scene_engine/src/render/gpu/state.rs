//! GPU state cache
//!
//! [`GpuState`] owns the [`Gpu`] and records the last value passed to every
//! stateful call. A setter compares the requested arguments element-wise
//! with the recorded ones and issues the real call only when one differs;
//! multi-argument calls are always issued whole.
//!
//! Texture bindings are tracked per texture unit and target. Framebuffer
//! binds remember the previous framebuffer so a render-to-texture pass can
//! put it back with [`GpuState::restore_framebuffer`].
//!
//! The cache is only correct while nothing else talks to the GPU. Code that
//! needs uncached calls (uploads, uniforms, draws) borrows the GPU through
//! [`GpuState::gpu_mut`]. After a context loss call [`GpuState::reset`] or
//! [`GpuState::replace_gpu`].

use std::collections::{HashMap, HashSet};

use super::{
    BlendEquation, BlendFactor, BufferTarget, Capability, CullFace, DepthFunc, FrontFace, Gpu, GpuBuffer,
    GpuFramebuffer, GpuProgram, GpuTexture,
};
use crate::render::texture::TextureTarget;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum StateKey {
    DepthFunc,
    DepthMask,
    DepthRange,
    BlendFunc,
    BlendEquation,
    CullFace,
    FrontFace,
    Viewport,
    ClearColor,
    ColorMask,
}

/// One recorded argument
#[derive(Debug, Clone, Copy, PartialEq)]
enum Arg {
    Bool(bool),
    Int(i64),
    Float(f32),
    Tag(u32),
}

/// Cached GPU state
pub struct GpuState {
    gpu: Box<dyn Gpu>,
    values: HashMap<StateKey, Vec<Arg>>,
    capabilities: HashMap<Capability, bool>,
    program: Option<Option<GpuProgram>>,
    buffers: HashMap<BufferTarget, Option<GpuBuffer>>,
    active_unit: Option<u32>,
    textures: HashMap<(u32, TextureTarget), Option<GpuTexture>>,
    framebuffer: Option<Option<GpuFramebuffer>>,
    previous_framebuffer: Option<GpuFramebuffer>,
    enabled_attributes: HashSet<u32>,
}

impl std::fmt::Debug for GpuState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuState")
            .field("capabilities", &self.capabilities)
            .field("program", &self.program)
            .field("active_unit", &self.active_unit)
            .field("framebuffer", &self.framebuffer)
            .finish_non_exhaustive()
    }
}

impl GpuState {
    /// Wrap a GPU with an empty cache
    pub fn new(gpu: Box<dyn Gpu>) -> Self {
        Self {
            gpu,
            values: HashMap::new(),
            capabilities: HashMap::new(),
            program: None,
            buffers: HashMap::new(),
            active_unit: None,
            textures: HashMap::new(),
            framebuffer: None,
            previous_framebuffer: None,
            enabled_attributes: HashSet::new(),
        }
    }

    /// The wrapped GPU
    pub fn gpu(&self) -> &dyn Gpu {
        self.gpu.as_ref()
    }

    /// The wrapped GPU, for uncached calls only
    pub fn gpu_mut(&mut self) -> &mut dyn Gpu {
        self.gpu.as_mut()
    }

    /// Forget every recorded value
    pub fn reset(&mut self) {
        self.values.clear();
        self.capabilities.clear();
        self.program = None;
        self.buffers.clear();
        self.active_unit = None;
        self.textures.clear();
        self.framebuffer = None;
        self.previous_framebuffer = None;
        self.enabled_attributes.clear();
        log::debug!("GPU state cache reset");
    }

    /// Swap in a new GPU context and reset the cache
    pub fn replace_gpu(&mut self, gpu: Box<dyn Gpu>) {
        self.gpu = gpu;
        self.reset();
    }

    /// Record `args` under `key`; true when the real call must be issued
    fn changed<const N: usize>(&mut self, key: StateKey, args: [Arg; N]) -> bool {
        match self.values.get_mut(&key) {
            Some(last) if last.len() == N && last.iter().zip(args.iter()).all(|(a, b)| a == b) => false,
            Some(last) => {
                last.clear();
                last.extend_from_slice(&args);
                true
            }
            None => {
                self.values.insert(key, args.to_vec());
                true
            }
        }
    }

    /// Enable a capability
    pub fn enable(&mut self, capability: Capability) {
        self.set_capability(capability, true);
    }

    /// Disable a capability
    pub fn disable(&mut self, capability: Capability) {
        self.set_capability(capability, false);
    }

    /// Enable or disable a capability
    pub fn set_capability(&mut self, capability: Capability, enabled: bool) {
        if self.capabilities.get(&capability) == Some(&enabled) {
            return;
        }
        self.capabilities.insert(capability, enabled);
        if enabled {
            self.gpu.enable(capability);
        } else {
            self.gpu.disable(capability);
        }
    }

    /// Last recorded value of a capability
    pub fn is_enabled(&self, capability: Capability) -> Option<bool> {
        self.capabilities.get(&capability).copied()
    }

    /// Make a program current
    pub fn use_program(&mut self, program: Option<GpuProgram>) {
        if self.program == Some(program) {
            return;
        }
        self.program = Some(program);
        self.gpu.use_program(program);
    }

    /// Current program as recorded
    pub fn current_program(&self) -> Option<GpuProgram> {
        self.program.flatten()
    }

    /// Depth comparison
    pub fn depth_func(&mut self, func: DepthFunc) {
        if self.changed(StateKey::DepthFunc, [Arg::Tag(func as u32)]) {
            self.gpu.depth_func(func);
        }
    }

    /// Depth writes
    pub fn depth_mask(&mut self, enabled: bool) {
        if self.changed(StateKey::DepthMask, [Arg::Bool(enabled)]) {
            self.gpu.depth_mask(enabled);
        }
    }

    /// Depth range mapping
    pub fn depth_range(&mut self, near: f32, far: f32) {
        if self.changed(StateKey::DepthRange, [Arg::Float(near), Arg::Float(far)]) {
            self.gpu.depth_range(near, far);
        }
    }

    /// Separate RGB and alpha blend factors
    pub fn blend_func_separate(&mut self, src: BlendFactor, dst: BlendFactor, src_alpha: BlendFactor, dst_alpha: BlendFactor) {
        let args = [Arg::Tag(src as u32), Arg::Tag(dst as u32), Arg::Tag(src_alpha as u32), Arg::Tag(dst_alpha as u32)];
        if self.changed(StateKey::BlendFunc, args) {
            self.gpu.blend_func_separate(src, dst, src_alpha, dst_alpha);
        }
    }

    /// Separate RGB and alpha blend equations
    pub fn blend_equation_separate(&mut self, rgb: BlendEquation, alpha: BlendEquation) {
        if self.changed(StateKey::BlendEquation, [Arg::Tag(rgb as u32), Arg::Tag(alpha as u32)]) {
            self.gpu.blend_equation_separate(rgb, alpha);
        }
    }

    /// Culled faces
    pub fn cull_face(&mut self, face: CullFace) {
        if self.changed(StateKey::CullFace, [Arg::Tag(face as u32)]) {
            self.gpu.cull_face(face);
        }
    }

    /// Front face winding
    pub fn front_face(&mut self, face: FrontFace) {
        if self.changed(StateKey::FrontFace, [Arg::Tag(face as u32)]) {
            self.gpu.front_face(face);
        }
    }

    /// Viewport rectangle
    pub fn viewport(&mut self, x: i32, y: i32, width: u32, height: u32) {
        let args = [Arg::Int(i64::from(x)), Arg::Int(i64::from(y)), Arg::Int(i64::from(width)), Arg::Int(i64::from(height))];
        if self.changed(StateKey::Viewport, args) {
            self.gpu.viewport(x, y, width, height);
        }
    }

    /// Clear color
    pub fn clear_color(&mut self, color: [f32; 4]) {
        if self.changed(StateKey::ClearColor, color.map(Arg::Float)) {
            self.gpu.clear_color(color);
        }
    }

    /// Color write mask
    pub fn color_mask(&mut self, mask: [bool; 4]) {
        if self.changed(StateKey::ColorMask, mask.map(Arg::Bool)) {
            self.gpu.color_mask(mask);
        }
    }

    /// Bind a buffer to a target
    pub fn bind_buffer(&mut self, target: BufferTarget, buffer: Option<GpuBuffer>) {
        if self.buffers.get(&target) == Some(&buffer) {
            return;
        }
        self.buffers.insert(target, buffer);
        self.gpu.bind_buffer(target, buffer);
    }

    /// Select the texture unit subsequent binds affect
    pub fn active_texture(&mut self, unit: u32) {
        if self.active_unit == Some(unit) {
            return;
        }
        self.active_unit = Some(unit);
        self.gpu.active_texture(unit);
    }

    /// Bind a texture on the active unit
    pub fn bind_texture(&mut self, target: TextureTarget, texture: Option<GpuTexture>) {
        let unit = self.active_unit.unwrap_or(0);
        if self.textures.get(&(unit, target)) == Some(&texture) {
            return;
        }
        self.textures.insert((unit, target), texture);
        self.gpu.bind_texture(target, texture);
    }

    /// Select `unit` and bind a texture on it
    pub fn bind_texture_unit(&mut self, unit: u32, target: TextureTarget, texture: Option<GpuTexture>) {
        self.active_texture(unit);
        self.bind_texture(target, texture);
    }

    /// Texture recorded on a unit
    pub fn bound_texture(&self, unit: u32, target: TextureTarget) -> Option<GpuTexture> {
        self.textures.get(&(unit, target)).copied().flatten()
    }

    /// Bind a framebuffer, remembering the one it replaces
    pub fn bind_framebuffer(&mut self, framebuffer: Option<GpuFramebuffer>) {
        if self.framebuffer == Some(framebuffer) {
            return;
        }
        self.previous_framebuffer = self.framebuffer.flatten();
        self.framebuffer = Some(framebuffer);
        self.gpu.bind_framebuffer(framebuffer);
    }

    /// Bind the default framebuffer
    pub fn bind_system_framebuffer(&mut self) {
        self.bind_framebuffer(None);
    }

    /// Re-bind the framebuffer that was current before the last bind
    pub fn restore_framebuffer(&mut self) {
        let previous = self.previous_framebuffer;
        self.bind_framebuffer(previous);
    }

    /// Framebuffer recorded as current
    pub fn current_framebuffer(&self) -> Option<GpuFramebuffer> {
        self.framebuffer.flatten()
    }

    /// Enable a vertex attribute array
    pub fn enable_vertex_attrib_array(&mut self, location: u32) {
        if self.enabled_attributes.insert(location) {
            self.gpu.enable_vertex_attrib_array(location);
        }
    }

    /// Disable a vertex attribute array
    pub fn disable_vertex_attrib_array(&mut self, location: u32) {
        if self.enabled_attributes.remove(&location) {
            self.gpu.disable_vertex_attrib_array(location);
        }
    }

    /// Disable every enabled attribute array not in `used`
    pub fn disable_unused_attributes(&mut self, used: &HashSet<u32>) {
        let unused: Vec<u32> = self.enabled_attributes.difference(used).copied().collect();
        for location in unused {
            self.disable_vertex_attrib_array(location);
        }
    }

    /// Delete a program, forgetting it if current
    pub fn delete_program(&mut self, program: GpuProgram) {
        if self.program == Some(Some(program)) {
            self.program = None;
        }
        self.gpu.delete_program(program);
    }

    /// Delete a buffer, forgetting any binding of it
    pub fn delete_buffer(&mut self, buffer: GpuBuffer) {
        self.buffers.retain(|_, bound| *bound != Some(buffer));
        self.gpu.delete_buffer(buffer);
    }

    /// Delete a texture, forgetting any binding of it
    pub fn delete_texture(&mut self, texture: GpuTexture) {
        self.textures.retain(|_, bound| *bound != Some(texture));
        self.gpu.delete_texture(texture);
    }

    /// Delete a framebuffer, forgetting it if current or previous
    pub fn delete_framebuffer(&mut self, framebuffer: GpuFramebuffer) {
        if self.framebuffer == Some(Some(framebuffer)) {
            self.framebuffer = None;
        }
        if self.previous_framebuffer == Some(framebuffer) {
            self.previous_framebuffer = None;
        }
        self.gpu.delete_framebuffer(framebuffer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::gpu::{CallLog, GpuCall, HeadlessGpu};

    fn state() -> (GpuState, CallLog) {
        let gpu = HeadlessGpu::new();
        let log = gpu.call_log();
        (GpuState::new(Box::new(gpu)), log)
    }

    #[test]
    fn test_enable_same_capability_once() {
        let (mut state, log) = state();
        state.enable(Capability::DepthTest);
        state.enable(Capability::DepthTest);
        assert_eq!(log.count(|c| matches!(c, GpuCall::Enable(_))), 1);
    }

    #[test]
    fn test_enable_different_capabilities() {
        let (mut state, log) = state();
        state.enable(Capability::DepthTest);
        state.enable(Capability::Blend);
        assert_eq!(log.count(|c| matches!(c, GpuCall::Enable(_))), 2);

        state.disable(Capability::Blend);
        state.enable(Capability::Blend);
        assert_eq!(log.count(|c| matches!(c, GpuCall::Enable(Capability::Blend))), 2);
        assert_eq!(state.is_enabled(Capability::Blend), Some(true));
    }

    #[test]
    fn test_multi_argument_compare_is_element_wise() {
        let (mut state, log) = state();
        use BlendFactor::*;
        state.blend_func_separate(One, OneMinusSrcAlpha, One, OneMinusSrcAlpha);
        state.blend_func_separate(One, OneMinusSrcAlpha, One, OneMinusSrcAlpha);
        state.blend_func_separate(One, OneMinusSrcAlpha, One, Zero);
        assert_eq!(log.count(|c| matches!(c, GpuCall::BlendFuncSeparate(..))), 2);

        state.viewport(0, 0, 800, 600);
        state.viewport(0, 0, 800, 600);
        state.viewport(0, 0, 800, 601);
        assert_eq!(log.count(|c| matches!(c, GpuCall::Viewport(..))), 2);
    }

    #[test]
    fn test_texture_units_tracked_separately() {
        let (mut state, log) = state();
        let texture = Some(GpuTexture(7));
        state.bind_texture_unit(0, TextureTarget::Texture2D, texture);
        state.bind_texture_unit(1, TextureTarget::Texture2D, texture);
        state.bind_texture_unit(0, TextureTarget::Texture2D, texture);

        assert_eq!(log.count(|c| matches!(c, GpuCall::BindTexture(..))), 2);
        assert_eq!(log.count(|c| matches!(c, GpuCall::ActiveTexture(_))), 3);
        assert_eq!(state.bound_texture(1, TextureTarget::Texture2D), texture);
    }

    #[test]
    fn test_same_unit_different_target() {
        let (mut state, log) = state();
        state.bind_texture_unit(0, TextureTarget::Texture2D, Some(GpuTexture(1)));
        state.bind_texture_unit(0, TextureTarget::CubeMap, Some(GpuTexture(1)));
        assert_eq!(log.count(|c| matches!(c, GpuCall::BindTexture(..))), 2);
    }

    #[test]
    fn test_framebuffer_restore() {
        let (mut state, log) = state();
        state.bind_system_framebuffer();
        state.bind_framebuffer(Some(GpuFramebuffer(3)));
        assert_eq!(state.current_framebuffer(), Some(GpuFramebuffer(3)));

        state.restore_framebuffer();
        assert_eq!(state.current_framebuffer(), None);
        assert_eq!(
            log.calls().into_iter().filter(|c| matches!(c, GpuCall::BindFramebuffer(_))).collect::<Vec<_>>(),
            vec![
                GpuCall::BindFramebuffer(None),
                GpuCall::BindFramebuffer(Some(GpuFramebuffer(3))),
                GpuCall::BindFramebuffer(None),
            ]
        );
    }

    #[test]
    fn test_use_program_dedup() {
        let (mut state, log) = state();
        state.use_program(Some(GpuProgram(1)));
        state.use_program(Some(GpuProgram(1)));
        state.use_program(None);
        assert_eq!(log.count(|c| matches!(c, GpuCall::UseProgram(_))), 2);
    }

    #[test]
    fn test_reset_forgets_values() {
        let (mut state, log) = state();
        state.depth_mask(false);
        state.reset();
        state.depth_mask(false);
        assert_eq!(log.count(|c| matches!(c, GpuCall::DepthMask(false))), 2);
    }

    #[test]
    fn test_delete_texture_forgets_binding() {
        let (mut state, log) = state();
        state.bind_texture_unit(0, TextureTarget::Texture2D, Some(GpuTexture(5)));
        state.delete_texture(GpuTexture(5));
        assert_eq!(state.bound_texture(0, TextureTarget::Texture2D), None);
        state.bind_texture_unit(0, TextureTarget::Texture2D, Some(GpuTexture(5)));
        assert_eq!(log.count(|c| matches!(c, GpuCall::BindTexture(..))), 2);
    }

    #[test]
    fn test_vertex_attrib_arrays() {
        let (mut state, log) = state();
        state.enable_vertex_attrib_array(0);
        state.enable_vertex_attrib_array(0);
        state.enable_vertex_attrib_array(1);
        state.disable_unused_attributes(&HashSet::from([0]));
        assert_eq!(log.count(|c| matches!(c, GpuCall::EnableVertexAttribArray(_))), 2);
        assert_eq!(log.count(|c| matches!(c, GpuCall::DisableVertexAttribArray(1))), 1);
    }
}
