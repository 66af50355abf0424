//! Item assignments consumed by the composition stage.

pub(crate) mod item;
pub(crate) mod metadata;
