use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::Context as _;

use crate::{compose::composite::premultiply_in_place, foundation::error::ForgeResult};

#[derive(Clone, Debug)]
/// Decoded layer source in premultiplied RGBA8 form.
pub struct LayerImage {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Pixel bytes in row-major premultiplied RGBA8.
    pub rgba8_premul: Arc<Vec<u8>>,
}

/// Decode an image file and convert it to premultiplied RGBA8.
pub fn decode_layer(path: &Path) -> ForgeResult<LayerImage> {
    let bytes =
        std::fs::read(path).with_context(|| format!("read layer '{}'", path.display()))?;
    let dyn_img = image::load_from_memory(&bytes)
        .with_context(|| format!("decode layer '{}'", path.display()))?;
    let rgba = dyn_img.to_rgba8();
    let (width, height) = rgba.dimensions();

    let mut rgba8_premul = rgba.into_raw();
    premultiply_in_place(&mut rgba8_premul);

    Ok(LayerImage {
        width,
        height,
        rgba8_premul: Arc::new(rgba8_premul),
    })
}

#[derive(Debug, Default)]
/// Per-worker cache of decoded layers keyed by source path.
///
/// A collection reuses each layer variant across many items, so decoding once per worker turns
/// most lookups into a hash hit.
pub struct LayerCache {
    images: HashMap<PathBuf, LayerImage>,
    hits: u64,
}

impl LayerCache {
    /// Empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the decoded layer for `path`, decoding it on first use.
    pub fn get_or_load(&mut self, path: &Path) -> ForgeResult<LayerImage> {
        if let Some(img) = self.images.get(path) {
            self.hits += 1;
            return Ok(img.clone());
        }
        let img = decode_layer(path)?;
        self.images.insert(path.to_path_buf(), img.clone());
        Ok(img)
    }

    /// Number of distinct decoded layers.
    pub fn len(&self) -> usize {
        self.images.len()
    }

    /// Whether nothing has been decoded yet.
    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    /// Lookups served without decoding.
    pub fn hits(&self) -> u64 {
        self.hits
    }
}

#[cfg(test)]
#[path = "../../tests/unit/compose/layers.rs"]
mod tests;
