//! Layer compositing, output encoding, and the parallel worker pool.

pub(crate) mod composite;
pub(crate) mod encode;
pub(crate) mod layers;
pub(crate) mod pool;
pub(crate) mod render;
