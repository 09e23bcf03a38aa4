//! Lighting
//!
//! Lights are plain data attached to scene nodes. Each frame the renderer
//! hands every visible light and its world matrix to the [`LightManager`],
//! which packs them into per-type arrays for the shader uniforms.
//!
//! Supported light types:
//! - **Ambient**: constant term added to every lit surface
//! - **Directional**: parallel rays along the node's -Z axis rotated by `direction`
//! - **Point**: omnidirectional with range-based attenuation
//! - **Spot**: cone with inner and outer cutoff angles
//!
//! Directional and spot lights with [`ShadowOptions`] render a depth map
//! before the main pass.

mod light_manager;

pub use light_manager::{LightCounts, LightManager, ShadowCaster};

use crate::foundation::math::Vec3;
use crate::render::texture::Color;

/// Light type and its type-specific parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LightKind {
    /// Constant fill light
    Ambient,
    /// Light from an infinitely distant source
    Directional {
        /// Direction the light travels, in the node's local space
        direction: Vec3,
    },
    /// Omnidirectional light
    Point {
        /// Distance at which the contribution fades out
        range: f32,
    },
    /// Cone light
    Spot {
        /// Direction the cone points, in the node's local space
        direction: Vec3,
        /// Distance at which the contribution fades out
        range: f32,
        /// Inner cone half-angle in degrees
        cutoff: f32,
        /// Outer cone half-angle in degrees
        outer_cutoff: f32,
    },
}

/// Shadow map settings for a light
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShadowOptions {
    /// Square shadow map size in texels, 0 for the renderer default
    pub map_size: u32,
    /// Depth bias applied when sampling
    pub bias: f32,
    /// Half-size of the orthographic shadow volume of directional lights
    pub extent: f32,
    /// Far plane of the shadow camera
    pub far: f32,
}

impl Default for ShadowOptions {
    fn default() -> Self {
        Self {
            map_size: 0,
            bias: 0.005,
            extent: 10.0,
            far: 100.0,
        }
    }
}

/// A light source
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Light {
    /// Light color
    pub color: Color,
    /// Intensity multiplier
    pub amount: f32,
    /// Type and parameters
    pub kind: LightKind,
    /// Render a shadow map for this light
    pub shadow: Option<ShadowOptions>,
}

impl Light {
    /// Ambient light
    pub fn ambient(color: Color, amount: f32) -> Self {
        Self { color, amount, kind: LightKind::Ambient, shadow: None }
    }

    /// Directional light
    pub fn directional(direction: Vec3, color: Color, amount: f32) -> Self {
        Self {
            color,
            amount,
            kind: LightKind::Directional { direction: direction.normalize() },
            shadow: None,
        }
    }

    /// Point light
    pub fn point(color: Color, amount: f32, range: f32) -> Self {
        Self { color, amount, kind: LightKind::Point { range }, shadow: None }
    }

    /// Spot light; angles in degrees
    pub fn spot(direction: Vec3, color: Color, amount: f32, range: f32, cutoff: f32, outer_cutoff: f32) -> Self {
        Self {
            color,
            amount,
            kind: LightKind::Spot {
                direction: direction.normalize(),
                range,
                cutoff,
                outer_cutoff: outer_cutoff.max(cutoff),
            },
            shadow: None,
        }
    }

    /// Builder-style shadow setter; ignored for ambient and point lights
    pub fn with_shadow(mut self, options: ShadowOptions) -> Self {
        if self.supports_shadow() {
            self.shadow = Some(options);
        } else {
            log::warn!("Shadows are only supported for directional and spot lights");
        }
        self
    }

    /// Whether this light type can cast shadows
    pub fn supports_shadow(&self) -> bool {
        matches!(self.kind, LightKind::Directional { .. } | LightKind::Spot { .. })
    }

    /// Color premultiplied by the amount
    pub fn radiance(&self) -> Color {
        self.color.scaled(self.amount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_directional_direction_normalized() {
        let light = Light::directional(Vec3::new(0.0, -2.0, 0.0), Color::WHITE, 1.0);
        match light.kind {
            LightKind::Directional { direction } => assert_relative_eq!(direction, Vec3::new(0.0, -1.0, 0.0)),
            _ => panic!("wrong kind"),
        }
    }

    #[test]
    fn test_point_light_rejects_shadow() {
        let light = Light::point(Color::WHITE, 1.0, 10.0).with_shadow(ShadowOptions::default());
        assert!(light.shadow.is_none());

        let light = Light::directional(Vec3::z(), Color::WHITE, 1.0).with_shadow(ShadowOptions::default());
        assert!(light.shadow.is_some());
    }

    #[test]
    fn test_spot_outer_never_smaller() {
        let light = Light::spot(Vec3::z(), Color::WHITE, 1.0, 5.0, 30.0, 10.0);
        match light.kind {
            LightKind::Spot { cutoff, outer_cutoff, .. } => assert!(outer_cutoff >= cutoff),
            _ => panic!("wrong kind"),
        }
    }

    #[test]
    fn test_radiance() {
        let light = Light::ambient(Color::rgb(0.5, 1.0, 0.0), 2.0);
        assert_eq!(light.radiance(), Color::rgb(1.0, 2.0, 0.0));
    }
}
