//! # 3D Camera
//!
//! Cameras hang off scene nodes; their world matrix is the node's world
//! matrix. The renderer calls [`Camera::update_view_projection_matrix`]
//! before any camera-derived uniform of a pass is resolved, and every
//! accessor afterwards returns the cached result.
//!
//! ## Conventions
//! Right-handed, Y-up view space looking down -Z, clip space depth in
//! `[-w, w]`.

use crate::foundation::math::{inverse_or_identity, translation_of, utils, Mat4, Vec3};
use crate::scene::Frustum;

/// Projection parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Projection {
    /// Perspective projection
    Perspective {
        /// Vertical field of view in radians
        fov_y: f32,
        /// Width over height
        aspect: f32,
        /// Near plane distance
        near: f32,
        /// Far plane distance
        far: f32,
    },
    /// Orthographic projection
    Orthographic {
        /// Left plane
        left: f32,
        /// Right plane
        right: f32,
        /// Bottom plane
        bottom: f32,
        /// Top plane
        top: f32,
        /// Near plane distance
        near: f32,
        /// Far plane distance
        far: f32,
    },
}

impl Projection {
    /// Projection matrix
    pub fn matrix(&self) -> Mat4 {
        match *self {
            Self::Perspective { fov_y, aspect, near, far } => Mat4::new_perspective(aspect, fov_y, near, far),
            Self::Orthographic { left, right, bottom, top, near, far } => {
                Mat4::new_orthographic(left, right, bottom, top, near, far)
            }
        }
    }

    /// Near plane distance
    pub fn near(&self) -> f32 {
        match *self {
            Self::Perspective { near, .. } | Self::Orthographic { near, .. } => near,
        }
    }

    /// Far plane distance
    pub fn far(&self) -> f32 {
        match *self {
            Self::Perspective { far, .. } | Self::Orthographic { far, .. } => far,
        }
    }
}

/// Camera with cached matrices
#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    projection: Projection,
    world: Mat4,
    view: Mat4,
    projection_matrix: Mat4,
    view_projection: Mat4,
}

impl Camera {
    /// Camera with the given projection
    pub fn new(projection: Projection) -> Self {
        let projection_matrix = projection.matrix();
        Self {
            projection,
            world: Mat4::identity(),
            view: Mat4::identity(),
            projection_matrix,
            view_projection: projection_matrix,
        }
    }

    /// Perspective camera
    ///
    /// # Arguments
    /// * `fov_degrees` - Vertical field of view in degrees
    /// * `aspect` - Width over height
    /// * `near` - Near plane distance (must be > 0)
    /// * `far` - Far plane distance (must be > near)
    pub fn perspective(fov_degrees: f32, aspect: f32, near: f32, far: f32) -> Self {
        Self::new(Projection::Perspective {
            fov_y: utils::deg_to_rad(fov_degrees),
            aspect,
            near,
            far,
        })
    }

    /// Orthographic camera
    pub fn orthographic(left: f32, right: f32, bottom: f32, top: f32, near: f32, far: f32) -> Self {
        Self::new(Projection::Orthographic { left, right, bottom, top, near, far })
    }

    /// Projection parameters
    pub fn projection(&self) -> &Projection {
        &self.projection
    }

    /// Replace the projection parameters
    pub fn set_projection(&mut self, projection: Projection) {
        self.projection = projection;
        self.projection_matrix = projection.matrix();
        self.view_projection = self.projection_matrix * self.view;
    }

    /// Update the aspect ratio of a perspective camera
    pub fn set_aspect(&mut self, new_aspect: f32) {
        if let Projection::Perspective { fov_y, near, far, .. } = self.projection {
            if (self.aspect() - new_aspect).abs() > 0.01 {
                log::info!("Camera aspect ratio changed: {:.3} -> {:.3}", self.aspect(), new_aspect);
            }
            self.set_projection(Projection::Perspective { fov_y, aspect: new_aspect, near, far });
        }
    }

    fn aspect(&self) -> f32 {
        match self.projection {
            Projection::Perspective { aspect, .. } => aspect,
            Projection::Orthographic { left, right, bottom, top, .. } => (right - left) / (top - bottom),
        }
    }

    /// Refresh view and view-projection from the camera's world matrix
    pub fn update_view_projection_matrix(&mut self, world: &Mat4) {
        self.world = *world;
        self.view = inverse_or_identity(world);
        self.projection_matrix = self.projection.matrix();
        self.view_projection = self.projection_matrix * self.view;
    }

    /// World matrix as of the last update
    pub fn world_matrix(&self) -> &Mat4 {
        &self.world
    }

    /// World-to-view matrix
    pub fn view_matrix(&self) -> &Mat4 {
        &self.view
    }

    /// View-to-clip matrix
    pub fn projection_matrix(&self) -> &Mat4 {
        &self.projection_matrix
    }

    /// World-to-clip matrix
    pub fn view_projection_matrix(&self) -> &Mat4 {
        &self.view_projection
    }

    /// Camera position in world space
    pub fn world_position(&self) -> Vec3 {
        translation_of(&self.world)
    }

    /// Near plane distance
    pub fn near(&self) -> f32 {
        self.projection.near()
    }

    /// Far plane distance
    pub fn far(&self) -> f32 {
        self.projection.far()
    }

    /// Frustum of the current view-projection
    pub fn frustum(&self) -> Frustum {
        Frustum::from_matrix(&self.view_projection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::transform_point;
    use crate::scene::Aabb;
    use approx::assert_relative_eq;

    #[test]
    fn test_view_is_inverse_world() {
        let mut camera = Camera::perspective(60.0, 1.0, 0.1, 100.0);
        let world = Mat4::new_translation(&Vec3::new(0.0, 0.0, 10.0));
        camera.update_view_projection_matrix(&world);

        assert_relative_eq!(camera.world_position(), Vec3::new(0.0, 0.0, 10.0));
        assert_relative_eq!(camera.view_matrix() * world, Mat4::identity(), epsilon = 1e-6);
        assert_relative_eq!(
            *camera.view_projection_matrix(),
            camera.projection_matrix() * camera.view_matrix(),
            epsilon = 1e-6
        );
    }

    #[test]
    fn test_point_in_front_maps_inside_clip() {
        let mut camera = Camera::perspective(90.0, 1.0, 0.1, 100.0);
        camera.update_view_projection_matrix(&Mat4::identity());
        let clip = transform_point(camera.view_projection_matrix(), &Vec3::new(0.0, 0.0, -5.0));
        assert!(clip.z > -1.0 && clip.z < 1.0);
    }

    #[test]
    fn test_frustum_follows_camera() {
        let mut camera = Camera::perspective(60.0, 1.0, 0.1, 100.0);
        let target = Aabb::from_center_extents(Vec3::new(0.0, 0.0, -5.0), Vec3::new(0.5, 0.5, 0.5));
        camera.update_view_projection_matrix(&Mat4::identity());
        assert!(camera.frustum().intersects_aabb(&target));

        // turned around
        let world = Mat4::from_euler_angles(0.0, std::f32::consts::PI, 0.0);
        camera.update_view_projection_matrix(&world);
        assert!(!camera.frustum().intersects_aabb(&target));
    }

    #[test]
    fn test_set_aspect_keeps_perspective() {
        let mut camera = Camera::perspective(60.0, 1.0, 0.5, 50.0);
        camera.set_aspect(2.0);
        match camera.projection() {
            Projection::Perspective { aspect, near, far, .. } => {
                assert_relative_eq!(*aspect, 2.0);
                assert_relative_eq!(*near, 0.5);
                assert_relative_eq!(*far, 50.0);
            }
            Projection::Orthographic { .. } => panic!("projection changed kind"),
        }
    }
}
