//! Local transform with a lazily composed matrix
//!
//! Setters only record the new component values and bump the matrix version;
//! the local matrix is composed on the first read after a change. The
//! composition is `T(position) · T(pivot) · R · S · T(-pivot)`.

use std::cell::Cell;

use crate::foundation::math::{Mat4, Quat, Vec3};

/// Position, rotation, scale and pivot of one scene node
#[derive(Debug, Clone)]
pub struct Transform {
    position: Vec3,
    rotation: Quat,
    scale: Vec3,
    pivot: Vec3,

    local: Cell<Mat4>,
    dirty: Cell<bool>,
    version: u64,
    compose_count: Cell<u64>,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::zeros(),
            rotation: Quat::identity(),
            scale: Vec3::new(1.0, 1.0, 1.0),
            pivot: Vec3::zeros(),
            local: Cell::new(Mat4::identity()),
            dirty: Cell::new(false),
            version: 0,
            compose_count: Cell::new(0),
        }
    }
}

impl Transform {
    /// Create a new identity transform
    pub fn identity() -> Self {
        Self::default()
    }

    /// Create a transform with only position
    pub fn from_position(position: Vec3) -> Self {
        let mut transform = Self::default();
        transform.set_position(position);
        transform
    }

    /// Current position
    pub fn position(&self) -> Vec3 {
        self.position
    }

    /// Set position
    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
        self.mark_dirty();
    }

    /// Move by an offset
    pub fn translate(&mut self, offset: Vec3) {
        self.set_position(self.position + offset);
    }

    /// Current rotation
    pub fn rotation(&self) -> Quat {
        self.rotation
    }

    /// Set rotation from a quaternion
    pub fn set_rotation(&mut self, rotation: Quat) {
        self.rotation = rotation;
        self.mark_dirty();
    }

    /// Set rotation from XYZ Euler angles in radians
    pub fn set_euler(&mut self, euler: Vec3) {
        self.set_rotation(Quat::from_euler_angles(euler.x, euler.y, euler.z));
    }

    /// Rotation as XYZ Euler angles in radians
    pub fn euler(&self) -> Vec3 {
        let (x, y, z) = self.rotation.euler_angles();
        Vec3::new(x, y, z)
    }

    /// Current scale
    pub fn scale(&self) -> Vec3 {
        self.scale
    }

    /// Set per-axis scale
    pub fn set_scale(&mut self, scale: Vec3) {
        self.scale = scale;
        self.mark_dirty();
    }

    /// Current pivot
    pub fn pivot(&self) -> Vec3 {
        self.pivot
    }

    /// Set the point rotation and scale happen around, in local space
    pub fn set_pivot(&mut self, pivot: Vec3) {
        self.pivot = pivot;
        self.mark_dirty();
    }

    /// Orient so the local -Z axis points at `target`
    pub fn look_at(&mut self, target: Vec3, up: Vec3) {
        let back = self.position - target;
        if back.norm_squared() <= f32::EPSILON {
            return;
        }
        self.set_rotation(Quat::face_towards(&back, &up));
    }

    /// Local matrix, composed now if any component changed since the last read
    pub fn local_matrix(&self) -> Mat4 {
        if self.dirty.get() {
            self.update_matrix();
        }
        self.local.get()
    }

    /// Recompose the local matrix unconditionally
    pub fn update_matrix(&self) {
        let pivot = Mat4::new_translation(&self.pivot);
        let unpivot = Mat4::new_translation(&-self.pivot);
        let matrix = Mat4::new_translation(&self.position)
            * pivot
            * self.rotation.to_homogeneous()
            * Mat4::new_nonuniform_scaling(&self.scale)
            * unpivot;
        self.local.set(matrix);
        self.dirty.set(false);
        self.compose_count.set(self.compose_count.get() + 1);
    }

    /// Counter bumped by every mutation
    pub fn matrix_version(&self) -> u64 {
        self.version
    }

    /// Whether the local matrix will be recomposed on next read
    pub fn is_dirty(&self) -> bool {
        self.dirty.get()
    }

    /// Number of times the local matrix has been composed
    pub fn compose_count(&self) -> u64 {
        self.compose_count.get()
    }

    fn mark_dirty(&mut self) {
        self.version += 1;
        self.dirty.set(true);
    }
}
