//! Linked GPU programs
//!
//! Attribute and uniform locations are read once at link time. Looking up a
//! name the program does not declare is an error: the caller is wired
//! wrong, and silently skipping the variable would hide it.

use std::cell::Cell;
use std::collections::HashMap;

use crate::render::error::{RenderError, RenderResult};
use crate::render::gpu::{ActiveVariable, GpuProgram, GpuState, ShaderStage};
use crate::warn_once;

/// A linked program and its active variables
#[derive(Debug)]
pub struct Program {
    id: GpuProgram,
    attributes: HashMap<String, ActiveVariable>,
    uniforms: HashMap<String, ActiveVariable>,
    ref_count: Cell<u32>,
    destroyed: Cell<bool>,
}

impl Program {
    /// Compile both stages and link them
    ///
    /// Compile and link failures carry the driver's info log.
    pub fn link(state: &mut GpuState, vertex: &str, fragment: &str) -> RenderResult<Self> {
        let gpu = state.gpu_mut();
        let vs = gpu
            .compile_shader(ShaderStage::Vertex, vertex)
            .map_err(|log| RenderError::ShaderCompile { stage: ShaderStage::Vertex, log })?;
        let fs = match gpu.compile_shader(ShaderStage::Fragment, fragment) {
            Ok(fs) => fs,
            Err(log) => {
                gpu.delete_shader(vs);
                return Err(RenderError::ShaderCompile { stage: ShaderStage::Fragment, log });
            }
        };

        let linked = gpu.link_program(vs, fs);
        gpu.delete_shader(vs);
        gpu.delete_shader(fs);
        let id = linked.map_err(|log| RenderError::ProgramLink { log })?;

        let by_name = |variables: Vec<ActiveVariable>| {
            variables.into_iter().map(|variable| (variable.name.clone(), variable)).collect::<HashMap<_, _>>()
        };
        let attributes = by_name(gpu.active_attributes(id));
        let uniforms = by_name(gpu.active_uniforms(id));
        log::debug!(
            "Linked program {:?} with {} attributes and {} uniforms",
            id,
            attributes.len(),
            uniforms.len()
        );

        Ok(Self {
            id,
            attributes,
            uniforms,
            ref_count: Cell::new(0),
            destroyed: Cell::new(false),
        })
    }

    /// GPU handle
    pub fn id(&self) -> GpuProgram {
        self.id
    }

    /// Active attribute by name
    pub fn attribute(&self, name: &str) -> RenderResult<&ActiveVariable> {
        self.attributes
            .get(name)
            .ok_or_else(|| RenderError::MissingAttribute { name: name.to_string() })
    }

    /// Active uniform by name
    pub fn uniform(&self, name: &str) -> RenderResult<&ActiveVariable> {
        self.uniforms
            .get(name)
            .ok_or_else(|| RenderError::MissingUniform { name: name.to_string() })
    }

    /// Location of an active attribute
    pub fn attribute_location(&self, name: &str) -> RenderResult<u32> {
        self.attribute(name).map(|variable| variable.location)
    }

    /// Location of an active uniform
    pub fn uniform_location(&self, name: &str) -> RenderResult<u32> {
        self.uniform(name).map(|variable| variable.location)
    }

    /// Every active attribute
    pub fn attributes(&self) -> impl Iterator<Item = &ActiveVariable> {
        self.attributes.values()
    }

    /// Every active uniform
    pub fn uniforms(&self) -> impl Iterator<Item = &ActiveVariable> {
        self.uniforms.values()
    }

    /// Record one more user
    pub fn retain(&self) {
        self.ref_count.set(self.ref_count.get() + 1);
    }

    /// Drop one user
    pub fn release(&self) {
        self.ref_count.set(self.ref_count.get().saturating_sub(1));
    }

    /// Current number of users
    pub fn ref_count(&self) -> u32 {
        self.ref_count.get()
    }

    /// Whether the GPU program has been deleted
    pub fn is_destroyed(&self) -> bool {
        self.destroyed.get()
    }

    /// Delete the GPU program
    ///
    /// Destroying twice only logs a warning.
    pub fn destroy(&self, state: &mut GpuState) {
        if self.destroyed.replace(true) {
            warn_once!(format!("program_double_destroy_{}", self.id.0), "Program {:?} destroyed twice", self.id);
            return;
        }
        state.delete_program(self.id);
    }

    /// Destroy when nobody uses the program; true when it was destroyed now
    pub fn destroy_if_no_ref(&self, state: &mut GpuState) -> bool {
        if self.destroyed.get() || self.ref_count.get() > 0 {
            return false;
        }
        self.destroy(state);
        true
    }

    /// Mark destroyed without touching the GPU, after a context loss
    pub(crate) fn forget(&self) {
        self.destroyed.set(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::gpu::{GpuCall, HeadlessGpu};

    const VS: &str = "attribute vec3 a_position;\nuniform mat4 u_mvp;\nvoid main() {}\n";
    const FS: &str = "uniform vec4 u_color;\nvoid main() {}\n";

    fn state() -> (GpuState, crate::render::gpu::CallLog) {
        let gpu = HeadlessGpu::new();
        let log = gpu.call_log();
        (GpuState::new(Box::new(gpu)), log)
    }

    #[test]
    fn test_locations_detected_at_link() {
        let (mut state, _) = state();
        let program = Program::link(&mut state, VS, FS).unwrap();
        assert_eq!(program.attribute_location("a_position").unwrap(), 0);
        assert!(program.uniform_location("u_mvp").is_ok());
        assert!(program.uniform_location("u_color").is_ok());
        assert_eq!(program.uniforms().count(), 2);
    }

    #[test]
    fn test_missing_names_are_errors() {
        let (mut state, _) = state();
        let program = Program::link(&mut state, VS, FS).unwrap();
        assert_eq!(
            program.attribute_location("a_normal"),
            Err(RenderError::MissingAttribute { name: "a_normal".to_string() })
        );
        assert_eq!(
            program.uniform_location("u_missing"),
            Err(RenderError::MissingUniform { name: "u_missing".to_string() })
        );
    }

    #[test]
    fn test_compile_failure_carries_log() {
        let (mut state, _) = state();
        let error = Program::link(&mut state, VS, "#error broken\nvoid main() {}\n").unwrap_err();
        match error {
            RenderError::ShaderCompile { stage, log } => {
                assert_eq!(stage, ShaderStage::Fragment);
                assert!(log.contains("broken"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_destroy_if_no_ref_is_idempotent() {
        let (mut state, log) = state();
        let program = Program::link(&mut state, VS, FS).unwrap();
        program.retain();
        assert!(!program.destroy_if_no_ref(&mut state));
        program.release();
        assert!(program.destroy_if_no_ref(&mut state));
        assert!(!program.destroy_if_no_ref(&mut state));
        program.destroy(&mut state);

        assert!(program.is_destroyed());
        assert_eq!(log.count(|call| matches!(call, GpuCall::DeleteProgram(_))), 1);
    }

    #[test]
    fn test_release_saturates() {
        let (mut state, _) = state();
        let program = Program::link(&mut state, VS, FS).unwrap();
        program.release();
        assert_eq!(program.ref_count(), 0);
    }
}
