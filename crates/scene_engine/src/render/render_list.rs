//! Per-frame render list
//!
//! Collected meshes are split into an opaque and a transparent list.
//! Opaque items are sorted by render order, then by material key so draws
//! sharing state end up adjacent, then front-to-back. Transparent items are
//! sorted by render order, then back-to-front so blending composes
//! correctly.

use crate::foundation::math::Mat4;
use crate::render::geometry::GeometryId;
use crate::render::material::MaterialId;
use crate::scene::NodeId;

/// One mesh to draw this frame
#[derive(Debug, Clone)]
pub struct RenderItem {
    /// Node carrying the mesh
    pub node: NodeId,
    /// Geometry drawn
    pub geometry: GeometryId,
    /// Material used
    pub material: MaterialId,
    /// Node world matrix
    pub world: Mat4,
    /// Node local matrix
    pub local: Mat4,
    /// Node and material render order combined
    pub render_order: i32,
    /// `Material::render_key`
    pub material_key: u64,
    /// Distance along the camera's view direction
    pub depth: f32,
    /// Blended material
    pub transparent: bool,
    /// Drawn into shadow maps
    pub cast_shadows: bool,
}

/// Opaque and transparent items of a frame
#[derive(Debug, Default)]
pub struct RenderList {
    opaque: Vec<RenderItem>,
    transparent: Vec<RenderItem>,
}

impl RenderList {
    /// Empty list
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every item, keeping allocations
    pub fn clear(&mut self) {
        self.opaque.clear();
        self.transparent.clear();
    }

    /// Add an item to the list matching its material
    pub fn push(&mut self, item: RenderItem) {
        if item.transparent {
            self.transparent.push(item);
        } else {
            self.opaque.push(item);
        }
    }

    /// Sort both lists; transparent depth sorting can be turned off
    pub fn sort(&mut self, sort_transparent: bool) {
        self.opaque.sort_by(|a, b| {
            a.render_order
                .cmp(&b.render_order)
                .then(a.material_key.cmp(&b.material_key))
                .then(a.depth.total_cmp(&b.depth))
        });
        if sort_transparent {
            self.transparent
                .sort_by(|a, b| a.render_order.cmp(&b.render_order).then(b.depth.total_cmp(&a.depth)));
        } else {
            self.transparent.sort_by_key(|item| item.render_order);
        }
    }

    /// Opaque items in draw order
    pub fn opaque(&self) -> &[RenderItem] {
        &self.opaque
    }

    /// Transparent items in draw order
    pub fn transparent(&self) -> &[RenderItem] {
        &self.transparent
    }

    /// Opaque then transparent items
    pub fn iter(&self) -> impl Iterator<Item = &RenderItem> {
        self.opaque.iter().chain(self.transparent.iter())
    }

    /// Items drawn into shadow maps
    pub fn shadow_casters(&self) -> impl Iterator<Item = &RenderItem> {
        self.iter().filter(|item| item.cast_shadows)
    }

    /// Total number of items
    pub fn len(&self) -> usize {
        self.opaque.len() + self.transparent.len()
    }

    /// Whether the frame has nothing to draw
    pub fn is_empty(&self) -> bool {
        self.opaque.is_empty() && self.transparent.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::{Key, KeyData};

    fn item(index: u64, depth: f32, transparent: bool) -> RenderItem {
        RenderItem {
            node: NodeId::from(KeyData::from_ffi(index)),
            geometry: GeometryId::null(),
            material: MaterialId::null(),
            world: Mat4::identity(),
            local: Mat4::identity(),
            render_order: 0,
            material_key: 0,
            depth,
            transparent,
            cast_shadows: true,
        }
    }

    fn depths(items: &[RenderItem]) -> Vec<f32> {
        items.iter().map(|item| item.depth).collect()
    }

    #[test]
    fn test_partition() {
        let mut list = RenderList::new();
        list.push(item(1, 1.0, false));
        list.push(item(2, 2.0, true));
        assert_eq!(list.opaque().len(), 1);
        assert_eq!(list.transparent().len(), 1);
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn test_transparent_back_to_front() {
        let mut list = RenderList::new();
        for (i, depth) in [3.0, 9.0, 1.0, 5.0].into_iter().enumerate() {
            list.push(item(i as u64 + 1, depth, true));
        }
        list.sort(true);
        assert_eq!(depths(list.transparent()), vec![9.0, 5.0, 3.0, 1.0]);
    }

    #[test]
    fn test_opaque_by_order_then_material() {
        let mut list = RenderList::new();
        let mut late = item(1, 1.0, false);
        late.render_order = 10;
        let mut material_b = item(2, 1.0, false);
        material_b.material_key = 2;
        let mut material_a = item(3, 5.0, false);
        material_a.material_key = 1;
        let mut material_a_near = item(4, 2.0, false);
        material_a_near.material_key = 1;
        for entry in [late, material_b, material_a, material_a_near] {
            list.push(entry);
        }

        list.sort(true);
        let keys: Vec<(i32, u64, f32)> =
            list.opaque().iter().map(|item| (item.render_order, item.material_key, item.depth)).collect();
        assert_eq!(keys, vec![(0, 1, 2.0), (0, 1, 5.0), (0, 2, 1.0), (10, 0, 1.0)]);
    }

    #[test]
    fn test_shadow_casters_filter() {
        let mut list = RenderList::new();
        let mut hidden = item(1, 1.0, false);
        hidden.cast_shadows = false;
        list.push(hidden);
        list.push(item(2, 1.0, true));
        assert_eq!(list.shadow_casters().count(), 1);
    }
}
