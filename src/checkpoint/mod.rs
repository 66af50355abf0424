//! Durable progress snapshots for both pipeline stages.

pub(crate) mod generation;
pub(crate) mod store;
pub(crate) mod upload;
