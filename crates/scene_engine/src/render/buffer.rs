//! GPU buffers of geometry attributes
//!
//! [`BufferCache::sync`] runs once per geometry per frame before drawing. A
//! new or replaced attribute is uploaded whole; otherwise its pending
//! sub-data ranges are written and drained, so each range reaches the GPU
//! exactly once.

use std::collections::HashMap;

use crate::render::geometry::{AttributeKind, Geometry, GeometryId, VertexAttribute};
use crate::render::gpu::{BufferTarget, GpuBuffer, GpuState};

/// Buffer slot of a geometry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferSlot {
    /// A vertex attribute
    Attribute(AttributeKind),
    /// The index buffer
    Indices,
}

impl BufferSlot {
    fn target(self) -> BufferTarget {
        match self {
            Self::Attribute(_) => BufferTarget::Array,
            Self::Indices => BufferTarget::ElementArray,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct BufferEntry {
    buffer: GpuBuffer,
    version: u64,
}

/// Uploaded attribute buffers keyed by geometry and slot
#[derive(Debug, Default)]
pub struct BufferCache {
    entries: HashMap<(GeometryId, BufferSlot), BufferEntry>,
}

impl BufferCache {
    /// Empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Bring every buffer of a geometry up to date
    pub fn sync(&mut self, state: &mut GpuState, id: GeometryId, geometry: &mut Geometry) {
        for kind in AttributeKind::ALL {
            if let Some(attribute) = geometry.attribute_mut(kind) {
                self.sync_slot(state, (id, BufferSlot::Attribute(kind)), attribute);
            }
        }
        if let Some(indices) = geometry.indices_mut() {
            self.sync_slot(state, (id, BufferSlot::Indices), indices);
        }
    }

    fn sync_slot(&mut self, state: &mut GpuState, key: (GeometryId, BufferSlot), attribute: &mut VertexAttribute) {
        let target = key.1.target();
        let version = attribute.version();
        match self.entries.get(&key).copied() {
            Some(entry) if entry.version == version => {
                let ranges = attribute.take_sub_data();
                if ranges.is_empty() {
                    return;
                }
                state.bind_buffer(target, Some(entry.buffer));
                for range in &ranges {
                    state.gpu_mut().buffer_sub_data(target, range.byte_offset, &range.data);
                }
                log::trace!("Flushed {} sub-data range(s) of {:?}", ranges.len(), key);
            }
            existing => {
                let buffer = existing.map_or_else(|| state.gpu_mut().create_buffer(), |entry| entry.buffer);
                state.bind_buffer(target, Some(buffer));
                state.gpu_mut().buffer_data(target, attribute.data().as_bytes());
                attribute.take_sub_data();
                self.entries.insert(key, BufferEntry { buffer, version });
            }
        }
    }

    /// Buffer of a slot, if uploaded
    pub fn buffer(&self, id: GeometryId, slot: BufferSlot) -> Option<GpuBuffer> {
        self.entries.get(&(id, slot)).map(|entry| entry.buffer)
    }

    /// Number of uploaded buffers
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is uploaded
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Delete every buffer of a geometry
    pub fn release(&mut self, state: &mut GpuState, id: GeometryId) {
        let slots: Vec<_> = self.entries.keys().filter(|(geometry, _)| *geometry == id).copied().collect();
        for key in slots {
            if let Some(entry) = self.entries.remove(&key) {
                state.delete_buffer(entry.buffer);
            }
        }
    }

    /// Forget every buffer; the GPU objects died with the context
    pub fn reset(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::geometry::AttributeData;
    use crate::render::gpu::{CallLog, GpuCall, HeadlessGpu};
    use slotmap::SlotMap;

    fn state() -> (GpuState, CallLog) {
        let gpu = HeadlessGpu::new();
        let log = gpu.call_log();
        (GpuState::new(Box::new(gpu)), log)
    }

    fn full_uploads(log: &CallLog) -> usize {
        log.count(|call| matches!(call, GpuCall::BufferData { .. }))
    }

    fn partial_uploads(log: &CallLog) -> Vec<(usize, usize)> {
        log.calls()
            .into_iter()
            .filter_map(|call| match call {
                GpuCall::BufferSubData { byte_offset, len, .. } => Some((byte_offset, len)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_first_sync_uploads_everything() {
        let (mut state, log) = state();
        let mut geometries = SlotMap::with_key();
        let id: GeometryId = geometries.insert(Geometry::cuboid(1.0, 1.0, 1.0));
        let mut cache = BufferCache::new();

        cache.sync(&mut state, id, &mut geometries[id]);
        // position, normal, uv0 and indices
        assert_eq!(full_uploads(&log), 4);
        assert_eq!(cache.len(), 4);
        assert!(cache.buffer(id, BufferSlot::Indices).is_some());

        cache.sync(&mut state, id, &mut geometries[id]);
        assert_eq!(full_uploads(&log), 4);
    }

    #[test]
    fn test_sub_data_flushed_once() {
        let (mut state, log) = state();
        let mut geometries = SlotMap::with_key();
        let id: GeometryId = geometries.insert(Geometry::cuboid(1.0, 1.0, 1.0));
        let mut cache = BufferCache::new();
        cache.sync(&mut state, id, &mut geometries[id]);

        let position = geometries[id].attribute_mut(AttributeKind::Position).unwrap();
        assert!(position.set(2, &[0.0, 1.0, 2.0]));
        assert!(position.set(5, &[3.0, 4.0, 5.0]));

        cache.sync(&mut state, id, &mut geometries[id]);
        assert_eq!(partial_uploads(&log), vec![(24, 12), (60, 12)]);
        assert!(geometries[id].attribute(AttributeKind::Position).unwrap().sub_data().is_empty());

        cache.sync(&mut state, id, &mut geometries[id]);
        assert_eq!(partial_uploads(&log).len(), 2);
        assert_eq!(full_uploads(&log), 4);
    }

    #[test]
    fn test_replace_forces_full_upload() {
        let (mut state, log) = state();
        let mut geometries = SlotMap::with_key();
        let id: GeometryId = geometries.insert(Geometry::plane(1.0, 1.0));
        let mut cache = BufferCache::new();
        cache.sync(&mut state, id, &mut geometries[id]);
        let buffer = cache.buffer(id, BufferSlot::Attribute(AttributeKind::Position));

        geometries[id]
            .attribute_mut(AttributeKind::Position)
            .unwrap()
            .replace(AttributeData::F32(vec![0.0; 12]));
        cache.sync(&mut state, id, &mut geometries[id]);

        assert_eq!(full_uploads(&log), 4 + 1);
        assert_eq!(cache.buffer(id, BufferSlot::Attribute(AttributeKind::Position)), buffer);
        assert!(partial_uploads(&log).is_empty());
    }

    #[test]
    fn test_swapped_attribute_is_uploaded() {
        let (mut state, log) = state();
        let mut geometries = SlotMap::with_key();
        let id: GeometryId = geometries.insert(Geometry::cuboid(1.0, 1.0, 1.0));
        let mut cache = BufferCache::new();
        cache.sync(&mut state, id, &mut geometries[id]);

        geometries[id].set_attribute(AttributeKind::Normal, VertexAttribute::floats(vec![0.0; 72], 3));
        cache.sync(&mut state, id, &mut geometries[id]);
        assert_eq!(full_uploads(&log), 5);

        geometries[id].set_indices(VertexAttribute::indices_u16(vec![0, 1, 2]));
        cache.sync(&mut state, id, &mut geometries[id]);
        assert_eq!(full_uploads(&log), 6);
        assert_eq!(cache.len(), 4);
    }

    #[test]
    fn test_release_deletes_buffers() {
        let (mut state, log) = state();
        let mut geometries = SlotMap::with_key();
        let id: GeometryId = geometries.insert(Geometry::plane(1.0, 1.0));
        let mut cache = BufferCache::new();
        cache.sync(&mut state, id, &mut geometries[id]);
        cache.release(&mut state, id);
        assert!(cache.is_empty());
        assert_eq!(log.count(|call| matches!(call, GpuCall::DeleteBuffer(_))), 4);
    }
}
