//! Shader variant cache
//!
//! Shaders are keyed by their header text, programs by their final
//! sources. Equal `RenderOptions` give equal headers and therefore the same
//! `Rc<Shader>`; different headers can still share one program when a
//! custom shader ignores the defines that differ.

use std::collections::HashMap;
use std::rc::Rc;

use super::chunks;
use super::program::Program;
use crate::render::error::RenderResult;
use crate::render::gpu::GpuState;
use crate::render::material::RenderOptions;

/// A cached shader variant
#[derive(Debug)]
pub struct Shader {
    header: String,
    program: Rc<Program>,
}

impl Shader {
    /// `#define` block the sources were built with
    pub fn header(&self) -> &str {
        &self.header
    }

    /// Linked program
    pub fn program(&self) -> &Rc<Program> {
        &self.program
    }
}

/// Header- and source-keyed cache of shaders and programs
#[derive(Debug, Default)]
pub struct ShaderCache {
    shaders: HashMap<String, Rc<Shader>>,
    programs: HashMap<(String, String), Rc<Program>>,
}

impl ShaderCache {
    /// Empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Built-in shader for these options, compiled on first request
    pub fn get_shader(&mut self, state: &mut GpuState, options: &RenderOptions) -> RenderResult<Rc<Shader>> {
        let header = options.header();
        if let Some(shader) = self.shaders.get(&header) {
            return Ok(Rc::clone(shader));
        }

        log::debug!("Shader cache miss, building variant:\n{}", header);
        let shader = self.build(state, header.clone(), chunks::VERTEX, chunks::FRAGMENT)?;
        self.shaders.insert(header, Rc::clone(&shader));
        Ok(shader)
    }

    /// User-authored shader
    ///
    /// With a `cache_key` the shader is cached under that key, extended
    /// with the header when `use_header_cache` is set. Without one a new
    /// shader is built for every request; its program is still shared with
    /// any earlier shader built from the same final sources.
    pub fn get_custom_shader(
        &mut self,
        state: &mut GpuState,
        vertex: &str,
        fragment: &str,
        header: &str,
        cache_key: Option<&str>,
        use_header_cache: bool,
    ) -> RenderResult<Rc<Shader>> {
        let key = cache_key.map(|key| {
            if use_header_cache {
                format!("custom:{key}\n{header}")
            } else {
                format!("custom:{key}")
            }
        });
        if let Some(shader) = key.as_ref().and_then(|key| self.shaders.get(key)) {
            return Ok(Rc::clone(shader));
        }

        let shader = self.build(state, header.to_string(), vertex, fragment)?;
        if let Some(key) = key {
            self.shaders.insert(key, Rc::clone(&shader));
        }
        Ok(shader)
    }

    fn build(&mut self, state: &mut GpuState, header: String, vertex: &str, fragment: &str) -> RenderResult<Rc<Shader>> {
        let sources = (format!("{header}{vertex}"), format!("{header}{fragment}"));
        let program = match self.programs.get(&sources) {
            Some(program) if !program.is_destroyed() => Rc::clone(program),
            _ => {
                let program = Rc::new(Program::link(state, &sources.0, &sources.1)?);
                self.programs.insert(sources, Rc::clone(&program));
                program
            }
        };
        Ok(Rc::new(Shader { header, program }))
    }

    /// Number of cached shader variants
    pub fn shader_count(&self) -> usize {
        self.shaders.len()
    }

    /// Number of live programs
    pub fn program_count(&self) -> usize {
        self.programs.len()
    }

    /// Destroy programs nobody retains and drop the shaders using them
    ///
    /// Returns the number of programs destroyed.
    pub fn reclaim(&mut self, state: &mut GpuState) -> usize {
        let before = self.programs.len();
        self.programs.retain(|_, program| !program.destroy_if_no_ref(state) && !program.is_destroyed());
        self.shaders.retain(|_, shader| !shader.program.is_destroyed());
        let destroyed = before - self.programs.len();
        if destroyed > 0 {
            log::debug!("Reclaimed {} unused programs", destroyed);
        }
        destroyed
    }

    /// Forget every shader and program without deleting them
    ///
    /// The GPU objects died with the old context.
    pub fn reset(&mut self) {
        for program in self.programs.values() {
            program.forget();
        }
        self.programs.clear();
        self.shaders.clear();
    }

    /// Delete every program
    pub fn destroy_all(&mut self, state: &mut GpuState) {
        for program in self.programs.values() {
            if !program.is_destroyed() {
                program.destroy(state);
            }
        }
        self.programs.clear();
        self.shaders.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::gpu::{CallLog, GpuCall, HeadlessGpu};
    use crate::render::material::{LightModel, RenderFlags};

    fn state() -> (GpuState, CallLog) {
        let gpu = HeadlessGpu::new();
        let log = gpu.call_log();
        (GpuState::new(Box::new(gpu)), log)
    }

    fn links(log: &CallLog) -> usize {
        log.count(|call| matches!(call, GpuCall::LinkProgram(_)))
    }

    fn lit_options() -> RenderOptions {
        let mut options = RenderOptions::new();
        options.set(RenderFlags::LIGHT | RenderFlags::NORMAL, true);
        options.light_model = Some(LightModel::BlinnPhong);
        options.lights.directional = 1;
        options
    }

    #[test]
    fn test_equal_options_share_shader() {
        let (mut state, log) = state();
        let mut cache = ShaderCache::new();
        let a = cache.get_shader(&mut state, &lit_options()).unwrap();
        let b = cache.get_shader(&mut state, &lit_options()).unwrap();
        assert!(Rc::ptr_eq(&a, &b));
        assert_eq!(links(&log), 1);
    }

    #[test]
    fn test_different_options_never_collide() {
        let (mut state, log) = state();
        let mut cache = ShaderCache::new();
        let lit = cache.get_shader(&mut state, &lit_options()).unwrap();
        let mut two_lights = lit_options();
        two_lights.lights.directional = 2;
        let other = cache.get_shader(&mut state, &two_lights).unwrap();

        assert!(!Rc::ptr_eq(&lit, &other));
        assert_ne!(lit.header(), other.header());
        assert_eq!(links(&log), 2);
        assert_eq!(cache.shader_count(), 2);
    }

    #[test]
    fn test_builtin_variant_declares_light_uniforms() {
        let (mut state, _) = state();
        let mut cache = ShaderCache::new();
        let shader = cache.get_shader(&mut state, &lit_options()).unwrap();
        let program = shader.program();
        assert!(program.attribute_location("a_position").is_ok());
        assert!(program.attribute_location("a_normal").is_ok());
        assert!(program.uniform_location("u_directionalLightsColor").is_ok());
        assert!(program.uniform_location("u_pointLightsColor").is_err());
        assert!(program.uniform_location("u_shininess").is_ok());
    }

    #[test]
    fn test_depth_variant_is_minimal() {
        let (mut state, _) = state();
        let mut cache = ShaderCache::new();
        let mut options = RenderOptions::new();
        options.set(RenderFlags::DEPTH_ONLY | RenderFlags::NORMAL, true);
        let shader = cache.get_shader(&mut state, &options).unwrap();
        let program = shader.program();
        assert_eq!(program.attributes().count(), 1);
        assert_eq!(program.uniforms().count(), 1);
        assert!(program.uniform_location("u_modelViewProjectionMatrix").is_ok());
    }

    #[test]
    fn test_link_failure_carries_info_log() {
        let mut gpu = HeadlessGpu::new();
        gpu.fail_next_link("varying mismatch");
        let mut state = GpuState::new(Box::new(gpu));
        let mut cache = ShaderCache::new();
        let error = cache.get_shader(&mut state, &RenderOptions::new()).unwrap_err();
        assert_eq!(error, crate::render::error::RenderError::ProgramLink { log: "varying mismatch".to_string() });
        assert_eq!(cache.shader_count(), 0);
    }

    #[test]
    fn test_custom_shader_cache_keys() {
        let (mut state, log) = state();
        let mut cache = ShaderCache::new();
        let vs = "attribute vec3 a_position;\nvoid main() {}\n";
        let fs = "void main() {}\n";

        let a = cache.get_custom_shader(&mut state, vs, fs, "", Some("outline"), false).unwrap();
        let b = cache.get_custom_shader(&mut state, vs, fs, "", Some("outline"), false).unwrap();
        assert!(Rc::ptr_eq(&a, &b));

        let c = cache.get_custom_shader(&mut state, vs, fs, "", None, false).unwrap();
        assert!(!Rc::ptr_eq(&a, &c));
        assert!(Rc::ptr_eq(a.program(), c.program()));

        let d = cache.get_custom_shader(&mut state, vs, fs, "#define X\n", Some("outline"), true).unwrap();
        assert!(!Rc::ptr_eq(&a, &d));
        assert_eq!(links(&log), 2);
    }

    #[test]
    fn test_reclaim_destroys_unreferenced_programs() {
        let (mut state, log) = state();
        let mut cache = ShaderCache::new();
        let kept = cache.get_shader(&mut state, &lit_options()).unwrap();
        kept.program().retain();
        let dropped = cache.get_shader(&mut state, &RenderOptions::new()).unwrap();

        assert_eq!(cache.reclaim(&mut state), 1);
        assert!(dropped.program().is_destroyed());
        assert!(!kept.program().is_destroyed());
        assert_eq!(cache.shader_count(), 1);
        assert_eq!(log.count(|call| matches!(call, GpuCall::DeleteProgram(_))), 1);

        let rebuilt = cache.get_shader(&mut state, &RenderOptions::new()).unwrap();
        assert!(!rebuilt.program().is_destroyed());
        assert_eq!(links(&log), 3);
    }

    #[test]
    fn test_reset_forgets_everything() {
        let (mut state, log) = state();
        let mut cache = ShaderCache::new();
        let shader = cache.get_shader(&mut state, &lit_options()).unwrap();
        cache.reset();
        assert!(shader.program().is_destroyed());
        assert_eq!(cache.program_count(), 0);
        assert_eq!(log.count(|call| matches!(call, GpuCall::DeleteProgram(_))), 0);
    }
}
