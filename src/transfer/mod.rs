//! Resumable, retrying transfer of rendered batches to a remote store.

pub(crate) mod drive;
pub(crate) mod engine;
pub(crate) mod memory;
pub(crate) mod remote;
pub(crate) mod retry;
pub(crate) mod session;
pub(crate) mod token;
