//! Foundation module - Core utilities and types
//!
//! This module provides fundamental utilities used throughout the engine:
//! - Math type aliases over nalgebra
//! - Logging setup and one-shot warning helpers

pub mod math;
pub mod logging;
