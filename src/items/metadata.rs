use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};

use anyhow::Context as _;

use crate::{
    foundation::error::{ForgeError, ForgeResult},
    items::item::{Item, ItemPlan, LayerChoice},
    plan::batch::{BatchKey, BatchLayout},
};

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
/// One attribute of a metadata entry.
pub struct AttributeEntry {
    /// Layer name.
    #[serde(alias = "trait_type")]
    pub layer: String,
    /// Chosen variant within the layer.
    pub value: String,
    /// Explicit source file; relative paths resolve against the layers directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
/// One record of a batch `metadata.json` array.
pub struct MetadataEntry {
    /// 1-based item index.
    #[serde(alias = "edition")]
    pub index: u64,
    /// Attribute assignment, bottom layer first.
    pub attributes: Vec<AttributeEntry>,
}

impl MetadataEntry {
    /// Resolve attributes to concrete layer source paths under `layers_dir`.
    pub fn to_item(&self, layers_dir: &Path) -> Item {
        let layers = self
            .attributes
            .iter()
            .map(|a| LayerChoice {
                layer: a.layer.clone(),
                source: match &a.file {
                    Some(f) if f.is_absolute() => f.clone(),
                    Some(f) => layers_dir.join(f),
                    None => layers_dir.join(&a.layer).join(format!("{}.png", a.value)),
                },
            })
            .collect();
        Item {
            index: self.index,
            layers,
        }
    }
}

/// Load the items of one batch from `<root>/<key>/metadata/metadata.json`.
///
/// Returns [`ForgeError::MetadataMissing`] when the file does not exist. Entries whose index falls
/// outside the batch are dropped with a warning.
pub fn load_batch_items(
    layout: &BatchLayout,
    key: BatchKey,
    layers_dir: &Path,
) -> ForgeResult<Vec<Item>> {
    let path = layout.metadata_path(key);
    if !path.is_file() {
        return Err(ForgeError::MetadataMissing(path));
    }

    let f = File::open(&path).with_context(|| format!("open metadata '{}'", path.display()))?;
    let entries: Vec<MetadataEntry> = serde_json::from_reader(BufReader::new(f))
        .with_context(|| format!("parse metadata '{}'", path.display()))?;

    let mut out = Vec::with_capacity(entries.len());
    for entry in &entries {
        if !key.contains(entry.index) {
            tracing::warn!(batch = %key, index = entry.index, "metadata entry outside its batch, ignoring");
            continue;
        }
        out.push(entry.to_item(layers_dir));
    }
    Ok(out)
}

/// Build an [`ItemPlan`] from every batch directory under the layout root.
///
/// Batches with missing or unreadable metadata are skipped and recorded in
/// [`ItemPlan::skipped_batches`]; the rest of the plan still loads.
pub fn load_item_plan(layout: &BatchLayout, layers_dir: &Path) -> ForgeResult<ItemPlan> {
    let mut plan = ItemPlan::new();
    for key in layout.list_batches()? {
        match load_batch_items(layout, key, layers_dir) {
            Ok(items) => {
                for item in items {
                    plan.insert(item)?;
                }
            }
            Err(ForgeError::MetadataMissing(path)) => {
                tracing::warn!(batch = %key, path = %path.display(), "batch has no metadata, skipping");
                plan.mark_skipped(key);
            }
            Err(e) => {
                tracing::error!(batch = %key, error = %e, "batch metadata unreadable, skipping");
                plan.mark_skipped(key);
            }
        }
    }
    Ok(plan)
}

#[cfg(test)]
#[path = "../../tests/unit/items/metadata.rs"]
mod tests;
