//! Math utilities and types
//!
//! Provides fundamental math types for 3D graphics. Arithmetic itself is
//! nalgebra's; this module only fixes the scalar type and adds the few
//! helpers the scene and renderer share.

pub use nalgebra::{
    Vector2, Vector3, Vector4,
    Matrix3, Matrix4,
    Quaternion,
    Unit,
};

/// 2D vector type
pub type Vec2 = Vector2<f32>;

/// 3D vector type
pub type Vec3 = Vector3<f32>;

/// 4D vector type
pub type Vec4 = Vector4<f32>;

/// 3x3 matrix type
pub type Mat3 = Matrix3<f32>;

/// 4x4 matrix type
pub type Mat4 = Matrix4<f32>;

/// 3D point type
pub type Point3 = nalgebra::Point3<f32>;

/// Quaternion type for rotations
pub type Quat = Unit<Quaternion<f32>>;

/// Transform a point by an affine matrix.
pub fn transform_point(matrix: &Mat4, point: &Vec3) -> Vec3 {
    matrix.transform_point(&Point3::from(*point)).coords
}

/// Transform a direction by the upper 3x3 of a matrix.
pub fn transform_vector(matrix: &Mat4, vector: &Vec3) -> Vec3 {
    matrix.transform_vector(vector)
}

/// Translation part of an affine matrix.
pub fn translation_of(matrix: &Mat4) -> Vec3 {
    Vec3::new(matrix[(0, 3)], matrix[(1, 3)], matrix[(2, 3)])
}

/// Inverse that falls back to identity for singular matrices.
pub fn inverse_or_identity(matrix: &Mat4) -> Mat4 {
    matrix.try_inverse().unwrap_or_else(Mat4::identity)
}

/// Inverse-transpose of the upper 3x3, used for normal matrices.
pub fn normal_matrix(matrix: &Mat4) -> Mat3 {
    let upper: Mat3 = matrix.fixed_view::<3, 3>(0, 0).into_owned();
    upper.try_inverse().map_or_else(Mat3::identity, |inv| inv.transpose())
}

/// Degree/radian conversion helpers
pub mod utils {
    /// Convert degrees to radians
    pub fn deg_to_rad(degrees: f32) -> f32 {
        degrees.to_radians()
    }

    /// Convert radians to degrees
    pub fn rad_to_deg(radians: f32) -> f32 {
        radians.to_degrees()
    }
}
