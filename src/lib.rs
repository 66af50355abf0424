//! layerforge renders large batches of layered raster images and ships them to remote storage.
//!
//! The crate is organised as two independently resumable stages that share one deterministic
//! batch layout:
//!
//! 1. **Generate**: items (index + per-layer source files) are composited bottom-to-top by a pool of
//!    workers, each owning a contiguous index range. Progress flows over a bounded channel into a
//!    single aggregator that persists [`GenerationProgress`] every few items.
//! 2. **Transfer**: every `<root>/<batch>/img/` directory is walked in ascending batch order and
//!    each file not yet recorded in [`UploadProgress`] is sent through a resumable, chunked upload
//!    session under a bounded concurrency window.
//!
//! Both checkpoints are plain JSON files under the output root, written with
//! write-temp-then-rename so an interrupted write never destroys the previous snapshot.
//!
//! The remote side is abstracted behind [`RemoteStore`]; [`DriveStore`] talks to Google Drive and
//! [`InMemoryStore`] keeps everything in process for tests and dry runs.
#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod checkpoint;
mod compose;
mod foundation;
mod items;
mod pipeline;
mod plan;
mod transfer;

pub use checkpoint::generation::{
    GenerationCheckpoint, GenerationProgress, ItemError, ResumePoint, resume_point,
};
pub use checkpoint::store::Checkpoint;
pub use checkpoint::upload::{FailedUpload, UploadProgress, UploadedFile};
pub use compose::composite::{over, over_in_place};
pub use compose::encode::{EncodeSettings, encode_image};
pub use compose::layers::{LayerCache, LayerImage, decode_layer};
pub use compose::pool::{
    CompositionWorkerPool, PoolOpts, PoolStats, WorkerEvent, resolve_worker_count,
};
pub use compose::render::{RenderedItem, render_item};
pub use foundation::config::{ImageFormat, PipelineConfig, RemoteConfig};
pub use foundation::error::{ForgeError, ForgeResult};
pub use items::item::{Item, ItemPlan, LayerChoice};
pub use items::metadata::{AttributeEntry, MetadataEntry, load_batch_items, load_item_plan};
pub use pipeline::{
    GenerationSummary, StatusReport, TransferSummary, generate, generate_items, status, transfer,
    transfer_dry_run,
};
pub use plan::batch::{
    BatchKey, BatchLayout, DRY_RUN_CHECKPOINT_FILE, GENERATION_CHECKPOINT_FILE,
    UPLOAD_CHECKPOINT_FILE, batches_for, compute_batch, partition_ranges,
};
pub use transfer::drive::{DriveEndpoints, DriveStore};
pub use transfer::engine::{EngineOpts, TransferEngine};
pub use transfer::memory::{InMemoryStore, PutRecord, StoredFile};
pub use transfer::remote::{
    ChunkRange, ChunkResponse, RemoteError, RemoteErrorKind, RemoteStore, SessionHandle,
    SessionRequest, ensure_container,
};
pub use transfer::retry::RetryPolicy;
pub use transfer::session::{ChunkedUploadSession, UploadReport};
pub use transfer::token::{AccessToken, OAuthRefreshExchange, TokenManager, TokenSource};
