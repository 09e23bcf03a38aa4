//! Vertex attributes and geometry
//!
//! A [`VertexAttribute`] owns typed data and remembers which byte ranges
//! changed since the last upload. [`VertexAttribute::set`] records a
//! `(byte_offset, bytes)` range; the buffer cache flushes those ranges once
//! and clears them with [`VertexAttribute::take_sub_data`]. Replacing the
//! whole array gives it a new version instead, which forces a full upload.
//! Versions come from one process-wide counter, so an attribute swapped in
//! through [`Geometry::set_attribute`] never matches the one it replaced.

use std::cell::Cell;
use std::sync::atomic::{AtomicU64, Ordering};

use slotmap::new_key_type;

use crate::foundation::math::Vec3;
use crate::scene::Aabb;

new_key_type! {
    /// Handle of a geometry registered with a scene
    pub struct GeometryId;
}

/// Component type of attribute data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    /// 32-bit float
    Float,
    /// 8-bit unsigned
    UnsignedByte,
    /// 16-bit unsigned
    UnsignedShort,
    /// 32-bit unsigned
    UnsignedInt,
}

impl DataType {
    /// Size of one component in bytes
    pub const fn byte_size(self) -> usize {
        match self {
            Self::Float | Self::UnsignedInt => 4,
            Self::UnsignedShort => 2,
            Self::UnsignedByte => 1,
        }
    }
}

/// Typed attribute storage
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeData {
    /// Float components
    F32(Vec<f32>),
    /// Byte components
    U8(Vec<u8>),
    /// Short components
    U16(Vec<u16>),
    /// Int components
    U32(Vec<u32>),
}

impl AttributeData {
    /// Number of components
    pub fn len(&self) -> usize {
        match self {
            Self::F32(v) => v.len(),
            Self::U8(v) => v.len(),
            Self::U16(v) => v.len(),
            Self::U32(v) => v.len(),
        }
    }

    /// Whether there are no components
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Component type
    pub const fn data_type(&self) -> DataType {
        match self {
            Self::F32(_) => DataType::Float,
            Self::U8(_) => DataType::UnsignedByte,
            Self::U16(_) => DataType::UnsignedShort,
            Self::U32(_) => DataType::UnsignedInt,
        }
    }

    /// Raw bytes
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::F32(v) => bytemuck::cast_slice(v),
            Self::U8(v) => v,
            Self::U16(v) => bytemuck::cast_slice(v),
            Self::U32(v) => bytemuck::cast_slice(v),
        }
    }

    /// Bytes of components `start..end`
    fn bytes_of(&self, start: usize, end: usize) -> &[u8] {
        let size = self.data_type().byte_size();
        &self.as_bytes()[start * size..end * size]
    }

    fn component(&self, index: usize) -> Option<f32> {
        match self {
            Self::F32(v) => v.get(index).copied(),
            Self::U8(v) => v.get(index).map(|&x| f32::from(x)),
            Self::U16(v) => v.get(index).map(|&x| f32::from(x)),
            #[allow(clippy::cast_precision_loss)]
            Self::U32(v) => v.get(index).map(|&x| x as f32),
        }
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn set_component(&mut self, index: usize, value: f32) -> bool {
        match self {
            Self::F32(v) => v.get_mut(index).map(|slot| *slot = value).is_some(),
            Self::U8(v) => v.get_mut(index).map(|slot| *slot = value as u8).is_some(),
            Self::U16(v) => v.get_mut(index).map(|slot| *slot = value as u16).is_some(),
            Self::U32(v) => v.get_mut(index).map(|slot| *slot = value as u32).is_some(),
        }
    }
}

/// One pending partial upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubData {
    /// Destination offset in the GPU buffer
    pub byte_offset: usize,
    /// Bytes to write
    pub data: Vec<u8>,
}

fn next_version() -> u64 {
    static VERSION: AtomicU64 = AtomicU64::new(1);
    VERSION.fetch_add(1, Ordering::Relaxed)
}

/// A vertex or index attribute
#[derive(Debug, Clone, PartialEq)]
pub struct VertexAttribute {
    data: AttributeData,
    /// Components per element, 1 to 4
    pub size: u8,
    /// Normalize integer data to `[0, 1]` when read by the shader
    pub normalized: bool,
    /// Bytes between consecutive elements, 0 for tightly packed
    pub stride: usize,
    /// Bytes from the start of the buffer to the first element
    pub offset: usize,
    sub_data: Vec<SubData>,
    version: u64,
    changes: u64,
}

impl VertexAttribute {
    /// Tightly packed attribute
    pub fn new(data: AttributeData, size: u8) -> Self {
        Self {
            data,
            size: size.clamp(1, 4),
            normalized: false,
            stride: 0,
            offset: 0,
            sub_data: Vec::new(),
            version: next_version(),
            changes: 0,
        }
    }

    /// Float attribute
    pub fn floats(data: Vec<f32>, size: u8) -> Self {
        Self::new(AttributeData::F32(data), size)
    }

    /// 16-bit index attribute
    pub fn indices_u16(data: Vec<u16>) -> Self {
        Self::new(AttributeData::U16(data), 1)
    }

    /// 32-bit index attribute
    pub fn indices_u32(data: Vec<u32>) -> Self {
        Self::new(AttributeData::U32(data), 1)
    }

    /// Builder-style interleaving layout
    pub fn with_layout(mut self, stride: usize, offset: usize) -> Self {
        self.stride = stride;
        self.offset = offset;
        self
    }

    /// Builder-style normalization flag
    pub fn with_normalized(mut self, normalized: bool) -> Self {
        self.normalized = normalized;
        self
    }

    /// Underlying data
    pub fn data(&self) -> &AttributeData {
        &self.data
    }

    /// Component type
    pub fn data_type(&self) -> DataType {
        self.data.data_type()
    }

    /// Logical element count, independent of interleaving
    pub fn real_length(&self) -> usize {
        if self.stride > 0 {
            self.data.as_bytes().len() / self.stride
        } else {
            self.data.len() / usize::from(self.size)
        }
    }

    fn component_index(&self, element: usize) -> usize {
        if self.stride > 0 {
            (element * self.stride + self.offset) / self.data_type().byte_size()
        } else {
            element * usize::from(self.size)
        }
    }

    /// Components of element `index`, zero padded to four
    pub fn get(&self, index: usize) -> Option<[f32; 4]> {
        if index >= self.real_length() {
            return None;
        }
        let start = self.component_index(index);
        let mut out = [0.0; 4];
        for (i, slot) in out.iter_mut().take(usize::from(self.size)).enumerate() {
            *slot = self.data.component(start + i)?;
        }
        Some(out)
    }

    /// Element `index` as a 3D vector
    pub fn get_vec3(&self, index: usize) -> Option<Vec3> {
        self.get(index).map(|v| Vec3::new(v[0], v[1], v[2]))
    }

    /// Overwrite element `index` and record the changed byte range
    ///
    /// Returns false when the index is out of range.
    pub fn set(&mut self, index: usize, values: &[f32]) -> bool {
        if index >= self.real_length() {
            return false;
        }
        let start = self.component_index(index);
        let count = values.len().min(usize::from(self.size));
        for (i, &value) in values.iter().take(count).enumerate() {
            if !self.data.set_component(start + i, value) {
                return false;
            }
        }
        let byte_offset = start * self.data_type().byte_size();
        let data = self.data.bytes_of(start, start + count).to_vec();
        self.sub_data.push(SubData { byte_offset, data });
        self.changes += 1;
        true
    }

    /// Replace all data, forcing a full upload
    pub fn replace(&mut self, data: AttributeData) {
        self.data = data;
        self.sub_data.clear();
        self.version = next_version();
        self.changes += 1;
    }

    /// Pending partial uploads
    pub fn sub_data(&self) -> &[SubData] {
        &self.sub_data
    }

    /// Drain pending partial uploads
    pub fn take_sub_data(&mut self) -> Vec<SubData> {
        std::mem::take(&mut self.sub_data)
    }

    /// Unique per data array; renewed by `replace`
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Bumped by any data change
    pub fn change_count(&self) -> u64 {
        self.changes
    }
}

/// Primitive assembly mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DrawMode {
    /// Independent triangles
    #[default]
    Triangles,
    /// Independent line segments
    Lines,
    /// Points
    Points,
}

/// Vertex attribute slots a geometry can fill
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AttributeKind {
    /// Object-space positions
    Position,
    /// Normals
    Normal,
    /// Tangents
    Tangent,
    /// First UV set
    Uv0,
    /// Second UV set
    Uv1,
    /// Vertex colors
    Color,
}

impl AttributeKind {
    /// Every slot, in declaration order
    pub const ALL: [Self; 6] = [Self::Position, Self::Normal, Self::Tangent, Self::Uv0, Self::Uv1, Self::Color];
}

/// Vertex and index data of a mesh
#[derive(Debug, Clone)]
pub struct Geometry {
    /// Primitive mode
    pub mode: DrawMode,
    position: VertexAttribute,
    normal: Option<VertexAttribute>,
    tangent: Option<VertexAttribute>,
    uv0: Option<VertexAttribute>,
    uv1: Option<VertexAttribute>,
    color: Option<VertexAttribute>,
    indices: Option<VertexAttribute>,
    bounds: Cell<Option<(u64, Aabb)>>,
}

impl Geometry {
    /// Geometry from positions only
    pub fn new(positions: VertexAttribute) -> Self {
        Self {
            mode: DrawMode::Triangles,
            position: positions,
            normal: None,
            tangent: None,
            uv0: None,
            uv1: None,
            color: None,
            indices: None,
            bounds: Cell::new(None),
        }
    }

    /// Attribute in a slot
    pub fn attribute(&self, kind: AttributeKind) -> Option<&VertexAttribute> {
        match kind {
            AttributeKind::Position => Some(&self.position),
            AttributeKind::Normal => self.normal.as_ref(),
            AttributeKind::Tangent => self.tangent.as_ref(),
            AttributeKind::Uv0 => self.uv0.as_ref(),
            AttributeKind::Uv1 => self.uv1.as_ref(),
            AttributeKind::Color => self.color.as_ref(),
        }
    }

    /// Mutable attribute in a slot
    pub fn attribute_mut(&mut self, kind: AttributeKind) -> Option<&mut VertexAttribute> {
        match kind {
            AttributeKind::Position => Some(&mut self.position),
            AttributeKind::Normal => self.normal.as_mut(),
            AttributeKind::Tangent => self.tangent.as_mut(),
            AttributeKind::Uv0 => self.uv0.as_mut(),
            AttributeKind::Uv1 => self.uv1.as_mut(),
            AttributeKind::Color => self.color.as_mut(),
        }
    }

    /// Fill a slot; position can be replaced but never removed
    pub fn set_attribute(&mut self, kind: AttributeKind, attribute: VertexAttribute) {
        match kind {
            AttributeKind::Position => {
                self.position = attribute;
                self.bounds.set(None);
            }
            AttributeKind::Normal => self.normal = Some(attribute),
            AttributeKind::Tangent => self.tangent = Some(attribute),
            AttributeKind::Uv0 => self.uv0 = Some(attribute),
            AttributeKind::Uv1 => self.uv1 = Some(attribute),
            AttributeKind::Color => self.color = Some(attribute),
        }
    }

    /// Builder-style slot setter
    pub fn with_attribute(mut self, kind: AttributeKind, attribute: VertexAttribute) -> Self {
        self.set_attribute(kind, attribute);
        self
    }

    /// Index data, if indexed
    pub fn indices(&self) -> Option<&VertexAttribute> {
        self.indices.as_ref()
    }

    /// Mutable index data
    pub fn indices_mut(&mut self) -> Option<&mut VertexAttribute> {
        self.indices.as_mut()
    }

    /// Set index data
    pub fn set_indices(&mut self, indices: VertexAttribute) {
        self.indices = Some(indices);
    }

    /// Builder-style index setter
    pub fn with_indices(mut self, indices: VertexAttribute) -> Self {
        self.set_indices(indices);
        self
    }

    /// Number of vertices
    pub fn vertex_count(&self) -> usize {
        self.position.real_length()
    }

    /// Number of elements submitted per draw
    pub fn draw_count(&self) -> usize {
        self.indices.as_ref().map_or_else(|| self.vertex_count(), VertexAttribute::real_length)
    }

    /// Primitives drawn per draw call
    pub fn face_count(&self) -> usize {
        let count = self.draw_count();
        match self.mode {
            DrawMode::Triangles => count / 3,
            DrawMode::Lines => count / 2,
            DrawMode::Points => count,
        }
    }

    /// Object-space bounds, recomputed when positions changed
    pub fn bounds(&self) -> Option<Aabb> {
        let stamp = self.position.change_count();
        if let Some((cached_stamp, aabb)) = self.bounds.get() {
            if cached_stamp == stamp {
                return Some(aabb);
            }
        }
        let aabb = Aabb::from_points((0..self.vertex_count()).filter_map(|i| self.position.get_vec3(i)))?;
        self.bounds.set(Some((stamp, aabb)));
        Some(aabb)
    }

    /// Box centered on the origin, 24 vertices and 12 triangles
    pub fn cuboid(width: f32, height: f32, depth: f32) -> Self {
        let (x, y, z) = (width * 0.5, height * 0.5, depth * 0.5);
        // (normal, u axis, v axis) per face
        let faces: [([f32; 3], [f32; 3], [f32; 3]); 6] = [
            ([0.0, 0.0, 1.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
            ([0.0, 0.0, -1.0], [-1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
            ([1.0, 0.0, 0.0], [0.0, 0.0, -1.0], [0.0, 1.0, 0.0]),
            ([-1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0, 0.0]),
            ([0.0, 1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, -1.0]),
            ([0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]),
        ];

        let mut positions = Vec::with_capacity(72);
        let mut normals = Vec::with_capacity(72);
        let mut uvs = Vec::with_capacity(48);
        let mut indices = Vec::with_capacity(36);
        for (face, (n, u, v)) in faces.iter().enumerate() {
            let base = u16::try_from(face * 4).unwrap_or(u16::MAX);
            for (su, sv) in [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)] {
                let corner = |axis: usize| n[axis] + su * u[axis] + sv * v[axis];
                positions.extend([corner(0) * x, corner(1) * y, corner(2) * z]);
                normals.extend(n);
                uvs.extend([(su + 1.0) * 0.5, (sv + 1.0) * 0.5]);
            }
            indices.extend([base, base + 1, base + 2, base, base + 2, base + 3]);
        }

        Self::new(VertexAttribute::floats(positions, 3))
            .with_attribute(AttributeKind::Normal, VertexAttribute::floats(normals, 3))
            .with_attribute(AttributeKind::Uv0, VertexAttribute::floats(uvs, 2))
            .with_indices(VertexAttribute::indices_u16(indices))
    }

    /// Rectangle in the XY plane facing +Z
    pub fn plane(width: f32, height: f32) -> Self {
        let (x, y) = (width * 0.5, height * 0.5);
        let positions = vec![-x, -y, 0.0, x, -y, 0.0, x, y, 0.0, -x, y, 0.0];
        let normals = [0.0_f32, 0.0, 1.0].repeat(4);
        let uvs = vec![0.0, 0.0, 1.0, 0.0, 1.0, 1.0, 0.0, 1.0];
        Self::new(VertexAttribute::floats(positions, 3))
            .with_attribute(AttributeKind::Normal, VertexAttribute::floats(normals, 3))
            .with_attribute(AttributeKind::Uv0, VertexAttribute::floats(uvs, 2))
            .with_indices(VertexAttribute::indices_u16(vec![0, 1, 2, 0, 2, 3]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_real_length_packed_and_interleaved() {
        let packed = VertexAttribute::floats(vec![0.0; 9], 3);
        assert_eq!(packed.real_length(), 3);

        // position(3) + uv(2) interleaved, 4 vertices
        let interleaved = VertexAttribute::floats(vec![0.0; 20], 2).with_layout(20, 12);
        assert_eq!(interleaved.real_length(), 4);
    }

    #[test]
    fn test_interleaved_get_and_set() {
        let data: Vec<f32> = (0..10).map(|i| i as f32).collect();
        // [x y z u v] x 2, reading the uv pair
        let mut uv = VertexAttribute::floats(data, 2).with_layout(20, 12);
        assert_eq!(uv.get(1), Some([8.0, 9.0, 0.0, 0.0]));

        assert!(uv.set(1, &[0.5, 0.25]));
        assert_eq!(uv.get(1), Some([0.5, 0.25, 0.0, 0.0]));
        assert_eq!(uv.sub_data().len(), 1);
        assert_eq!(uv.sub_data()[0].byte_offset, 32);
        assert_eq!(uv.sub_data()[0].data.len(), 8);
        assert!(!uv.set(2, &[0.0, 0.0]));
    }

    #[test]
    fn test_sub_data_accumulates_and_clears_once() {
        let mut attribute = VertexAttribute::floats(vec![0.0; 6], 3);
        let version = attribute.version();
        attribute.set(0, &[1.0, 2.0, 3.0]);
        attribute.set(1, &[4.0, 5.0, 6.0]);

        let pending = attribute.take_sub_data();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[1].byte_offset, 12);
        assert_eq!(pending[0].data, bytemuck::cast_slice::<f32, u8>(&[1.0, 2.0, 3.0]));
        assert!(attribute.take_sub_data().is_empty());
        assert_eq!(attribute.version(), version);
    }

    #[test]
    fn test_replace_forces_full_upload() {
        let mut attribute = VertexAttribute::floats(vec![0.0; 3], 3);
        let version = attribute.version();
        attribute.set(0, &[1.0, 1.0, 1.0]);
        attribute.replace(AttributeData::F32(vec![2.0; 6]));
        assert_ne!(attribute.version(), version);
        assert_ne!(attribute.version(), VertexAttribute::floats(vec![0.0; 3], 3).version());
        assert!(attribute.sub_data().is_empty());
        assert_eq!(attribute.real_length(), 2);
    }

    #[test]
    fn test_integer_attribute() {
        let color = VertexAttribute::new(AttributeData::U8(vec![255, 0, 0, 255]), 4).with_normalized(true);
        assert_eq!(color.data_type(), DataType::UnsignedByte);
        assert_eq!(color.get(0), Some([255.0, 0.0, 0.0, 255.0]));
        assert_eq!(color.data().as_bytes().len(), 4);
    }

    #[test]
    fn test_cuboid_counts() {
        let cube = Geometry::cuboid(1.0, 1.0, 1.0);
        assert_eq!(cube.vertex_count(), 24);
        assert_eq!(cube.draw_count(), 36);
        assert_eq!(cube.face_count(), 12);
        assert!(cube.attribute(AttributeKind::Normal).is_some());
        assert!(cube.attribute(AttributeKind::Uv1).is_none());
    }

    #[test]
    fn test_cuboid_bounds() {
        let cube = Geometry::cuboid(2.0, 4.0, 6.0);
        let bounds = cube.bounds().unwrap();
        assert_relative_eq!(bounds.min, Vec3::new(-1.0, -2.0, -3.0));
        assert_relative_eq!(bounds.max, Vec3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn test_bounds_follow_position_edits() {
        let mut plane = Geometry::plane(2.0, 2.0);
        assert_relative_eq!(plane.bounds().unwrap().max, Vec3::new(1.0, 1.0, 0.0));

        plane.attribute_mut(AttributeKind::Position).unwrap().set(2, &[5.0, 1.0, 0.0]);
        assert_relative_eq!(plane.bounds().unwrap().max, Vec3::new(5.0, 1.0, 0.0));
    }

    #[test]
    fn test_face_count_modes() {
        let mut lines = Geometry::new(VertexAttribute::floats(vec![0.0; 12], 3));
        lines.mode = DrawMode::Lines;
        assert_eq!(lines.face_count(), 2);
        lines.mode = DrawMode::Points;
        assert_eq!(lines.face_count(), 4);
    }
}
