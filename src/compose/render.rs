use std::path::{Path, PathBuf};

use anyhow::Context as _;

use crate::{
    compose::{
        composite::over_in_place,
        encode::{EncodeSettings, encode_image},
        layers::LayerCache,
    },
    foundation::error::{ForgeError, ForgeResult},
    items::item::Item,
    plan::batch::BatchLayout,
};

#[derive(Clone, Debug, PartialEq, Eq)]
/// Result of rendering a single item.
pub struct RenderedItem {
    /// 1-based item index.
    pub index: u64,
    /// Where the encoded image was written.
    pub path: PathBuf,
    /// Layers composited, bottom to top.
    pub layers_used: Vec<String>,
    /// Layers whose source file did not exist.
    pub layers_missing: Vec<String>,
}

/// Composite `item` bottom-to-top and write it to its batch image path.
///
/// Missing layer files are skipped with a warning. Any other failure (undecodable layer, size
/// mismatch, encode or write error, nothing to draw) becomes [`ForgeError::ItemRender`].
pub fn render_item(
    item: &Item,
    layer_order: &[String],
    layout: &BatchLayout,
    settings: &EncodeSettings,
    cache: &mut LayerCache,
) -> ForgeResult<RenderedItem> {
    let index = item.index;
    let fail = |e: ForgeError| match e {
        ForgeError::ItemRender { .. } => e,
        other => ForgeError::item_render(index, format!("{other:#}")),
    };

    let mut canvas: Option<(u32, u32, Vec<u8>)> = None;
    let mut layers_used = Vec::new();
    let mut layers_missing = Vec::new();

    for (name, source) in item.ordered_sources(layer_order) {
        if !source.is_file() {
            tracing::warn!(index, layer = name, source = %source.display(), "layer source missing, skipping");
            layers_missing.push(name.to_string());
            continue;
        }

        let layer = cache.get_or_load(source).map_err(fail)?;
        match canvas.as_mut() {
            None => {
                canvas = Some((layer.width, layer.height, layer.rgba8_premul.as_ref().clone()));
            }
            Some((w, h, px)) => {
                if (*w, *h) != (layer.width, layer.height) {
                    return Err(ForgeError::item_render(
                        index,
                        format!(
                            "layer '{name}' is {}x{}, expected {w}x{h}",
                            layer.width, layer.height
                        ),
                    ));
                }
                over_in_place(px, &layer.rgba8_premul, 1.0).map_err(fail)?;
            }
        }
        layers_used.push(name.to_string());
    }

    let Some((width, height, px)) = canvas else {
        return Err(ForgeError::item_render(index, "no layer source resolved"));
    };

    let bytes = encode_image(width, height, &px, settings).map_err(fail)?;
    let path = layout.image_path(index, settings.format);
    write_atomic(&path, &bytes).map_err(fail)?;

    Ok(RenderedItem {
        index,
        path,
        layers_used,
        layers_missing,
    })
}

fn write_atomic(path: &Path, bytes: &[u8]) -> ForgeResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".part");
    let tmp = PathBuf::from(tmp);
    std::fs::write(&tmp, bytes).with_context(|| format!("write '{}'", tmp.display()))?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("move '{}' to '{}'", tmp.display(), path.display()))?;
    Ok(())
}

#[cfg(test)]
#[path = "../../tests/unit/compose/render.rs"]
mod tests;
