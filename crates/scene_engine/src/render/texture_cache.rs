//! GPU copies of texture assets
//!
//! A texture whose image has not arrived yet resolves to a 1x1 white
//! placeholder of the same target, so materials referencing it still draw.
//! Once `Texture::set_image` bumps the version the real texels are uploaded
//! on next use.
//!
//! Uploads bind the texture on a caller-chosen unit, normally the one the
//! texture is about to be handed out on, so samplers already bound for the
//! current draw keep their textures.

use std::collections::HashMap;

use crate::render::gpu::{GpuState, GpuTexture};
use crate::render::texture::{TextureAssets, TextureFormat, TextureId, TextureTarget};

const PLACEHOLDER_TEXEL: [u8; 4] = [255, 255, 255, 255];

#[derive(Debug, Clone, Copy)]
struct Uploaded {
    texture: GpuTexture,
    version: u64,
}

/// Uploads textures on demand and remembers their GPU handles
#[derive(Debug, Default)]
pub struct TextureCache {
    uploaded: HashMap<TextureId, Uploaded>,
    placeholders: HashMap<TextureTarget, GpuTexture>,
}

impl TextureCache {
    /// Empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// GPU texture for an asset, uploading or refreshing it when needed
    ///
    /// `None` when the id is not registered. Uploads go through `unit`.
    pub fn resolve(
        &mut self,
        state: &mut GpuState,
        assets: &TextureAssets,
        id: TextureId,
        unit: u32,
    ) -> Option<(TextureTarget, GpuTexture)> {
        let texture = assets.get(id)?;
        let Some(image) = texture.image() else {
            return Some((texture.target, self.placeholder(state, texture.target, unit)));
        };

        let version = texture.version();
        let entry = match self.uploaded.get(&id) {
            Some(entry) if entry.version == version => return Some((texture.target, entry.texture)),
            Some(entry) => entry.texture,
            None => state.gpu_mut().create_texture(),
        };

        state.bind_texture_unit(unit, texture.target, Some(entry));
        state
            .gpu_mut()
            .tex_image(texture.target, texture.format, image.width, image.height, Some(&image.data));
        if texture.mipmaps {
            state.gpu_mut().generate_mipmap(texture.target);
        }
        log::debug!("Uploaded texture {:?} version {} ({}x{})", id, version, image.width, image.height);
        self.uploaded.insert(id, Uploaded { texture: entry, version });
        Some((texture.target, entry))
    }

    /// 1x1 white texture for `target`, created through `unit` on first use
    pub fn placeholder(&mut self, state: &mut GpuState, target: TextureTarget, unit: u32) -> GpuTexture {
        if let Some(texture) = self.placeholders.get(&target) {
            return *texture;
        }
        let texture = state.gpu_mut().create_texture();
        state.bind_texture_unit(unit, target, Some(texture));
        state
            .gpu_mut()
            .tex_image(target, TextureFormat::Rgba8, 1, 1, Some(&PLACEHOLDER_TEXEL));
        self.placeholders.insert(target, texture);
        texture
    }

    /// Number of uploaded assets, placeholders excluded
    pub fn len(&self) -> usize {
        self.uploaded.len()
    }

    /// Whether no asset has been uploaded
    pub fn is_empty(&self) -> bool {
        self.uploaded.is_empty()
    }

    /// Delete the GPU copy of one asset
    pub fn release(&mut self, state: &mut GpuState, id: TextureId) {
        if let Some(entry) = self.uploaded.remove(&id) {
            state.delete_texture(entry.texture);
        }
    }

    /// Delete GPU copies whose asset no longer exists
    pub fn prune(&mut self, state: &mut GpuState, assets: &TextureAssets) {
        let stale: Vec<TextureId> = self.uploaded.keys().filter(|id| !assets.contains_key(**id)).copied().collect();
        for id in stale {
            self.release(state, id);
        }
    }

    /// Forget every handle; the GPU objects died with the context
    pub fn reset(&mut self) {
        self.uploaded.clear();
        self.placeholders.clear();
    }
}
