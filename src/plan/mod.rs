//! Deterministic index -> batch layout shared by the generation and transfer stages.

pub(crate) mod batch;
