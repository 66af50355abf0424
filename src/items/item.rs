use std::{collections::BTreeMap, ops::RangeInclusive, path::PathBuf};

use crate::{
    foundation::error::{ForgeError, ForgeResult},
    plan::batch::BatchKey,
};

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
/// One chosen source image for a named layer.
pub struct LayerChoice {
    /// Layer name, e.g. `"Background"`.
    pub layer: String,
    /// Source image file for this layer.
    pub source: PathBuf,
}

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
/// A single artifact to render: its 1-based index and resolved layer sources.
pub struct Item {
    /// 1-based item index.
    pub index: u64,
    /// Layer choices in the sampler's order.
    pub layers: Vec<LayerChoice>,
}

impl Item {
    /// Source file chosen for `layer`, if the item has one.
    pub fn source_for(&self, layer: &str) -> Option<&PathBuf> {
        self.layers
            .iter()
            .find(|c| c.layer == layer)
            .map(|c| &c.source)
    }

    /// Layer sources ordered bottom-to-top according to `layer_order`.
    ///
    /// An empty `layer_order` keeps the item's own order. Layers the item does not choose are
    /// skipped; layers the order does not mention are dropped.
    pub fn ordered_sources<'a>(&'a self, layer_order: &'a [String]) -> Vec<(&'a str, &'a PathBuf)> {
        if layer_order.is_empty() {
            return self
                .layers
                .iter()
                .map(|c| (c.layer.as_str(), &c.source))
                .collect();
        }
        layer_order
            .iter()
            .filter_map(|name| self.source_for(name).map(|src| (name.as_str(), src)))
            .collect()
    }
}

#[derive(Clone, Debug, Default)]
/// All known items keyed by index, plus batches whose metadata could not be read.
pub struct ItemPlan {
    items: BTreeMap<u64, Item>,
    skipped_batches: Vec<BatchKey>,
}

impl ItemPlan {
    /// Empty plan.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a plan from items, rejecting duplicate or zero indices.
    pub fn from_items(items: impl IntoIterator<Item = Item>) -> ForgeResult<Self> {
        let mut plan = Self::new();
        for item in items {
            plan.insert(item)?;
        }
        Ok(plan)
    }

    /// Add one item.
    pub fn insert(&mut self, item: Item) -> ForgeResult<()> {
        if item.index == 0 {
            return Err(ForgeError::validation("item indices are 1-based"));
        }
        if self.items.contains_key(&item.index) {
            return Err(ForgeError::validation(format!(
                "duplicate item index {}",
                item.index
            )));
        }
        self.items.insert(item.index, item);
        Ok(())
    }

    /// Record a batch that contributed no items.
    pub fn mark_skipped(&mut self, key: BatchKey) {
        self.skipped_batches.push(key);
    }

    /// Batches skipped while loading.
    pub fn skipped_batches(&self) -> &[BatchKey] {
        &self.skipped_batches
    }

    /// Item at `index`.
    pub fn get(&self, index: u64) -> Option<&Item> {
        self.items.get(&index)
    }

    /// Highest index in the plan.
    pub fn max_index(&self) -> Option<u64> {
        self.items.keys().next_back().copied()
    }

    /// Number of items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the plan has no items.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Number of items whose index falls in `range`.
    pub fn count_in(&self, range: RangeInclusive<u64>) -> u64 {
        self.items.range(range).count() as u64
    }

    /// Iterate items in ascending index order.
    pub fn iter(&self) -> impl Iterator<Item = &Item> {
        self.items.values()
    }
}

#[cfg(test)]
#[path = "../../tests/unit/items/item.rs"]
mod tests;
