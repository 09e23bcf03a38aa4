//! Renderer errors

use crate::render::gpu::ShaderStage;
use crate::scene::{NodeId, SceneError};

/// Errors raised while preparing or drawing a frame
///
/// Only structural problems end up here. Data problems a scene can
/// legitimately hit every frame (a semantic a material does not provide, a
/// texture that has not loaded yet) are logged once and skipped.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    /// A shader stage failed to compile
    #[error("Failed to compile {stage} shader: {log}")]
    ShaderCompile {
        /// Stage that failed
        stage: ShaderStage,
        /// Driver info log
        log: String,
    },

    /// Program linking failed
    #[error("Failed to link program: {log}")]
    ProgramLink {
        /// Driver info log
        log: String,
    },

    /// Attribute name was not found in the linked program
    #[error("Attribute not found in program: {name}")]
    MissingAttribute {
        /// Requested name
        name: String,
    },

    /// Uniform name was not found in the linked program
    #[error("Uniform not found in program: {name}")]
    MissingUniform {
        /// Requested name
        name: String,
    },

    /// Program was used after being destroyed
    #[error("Program has been destroyed")]
    ProgramDestroyed,

    /// The node passed as camera has no camera
    #[error("Node {0:?} is not a camera")]
    NotACamera(NodeId),

    /// The GPU context is lost; call `on_context_restored`
    #[error("GPU context lost")]
    ContextLost,

    /// Scene graph error
    #[error("Scene error: {0}")]
    Scene(#[from] SceneError),
}

/// Result alias for renderer operations
pub type RenderResult<T> = Result<T, RenderError>;
