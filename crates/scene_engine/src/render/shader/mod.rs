//! Shader sources, linked programs and the variant cache

mod cache;
pub mod chunks;
mod program;

pub use cache::{Shader, ShaderCache};
pub use program::Program;
