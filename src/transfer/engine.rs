use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::Context as _;
use chrono::Utc;

use crate::{
    checkpoint::{
        store::Checkpoint,
        upload::{UploadProgress, UploadedFile},
    },
    foundation::{
        config::{ImageFormat, PipelineConfig},
        error::{ForgeError, ForgeResult},
    },
    plan::batch::{BatchKey, BatchLayout},
    transfer::{
        remote::{RemoteStore, ensure_container},
        retry::RetryPolicy,
        session::{ChunkedUploadSession, UploadReport},
    },
};

const DEFAULT_ROOT_FOLDER: &str = "layerforge";

#[derive(Clone, Debug, PartialEq)]
/// Transfer stage settings.
pub struct EngineOpts {
    /// Files uploaded concurrently per window.
    pub concurrent_uploads: usize,
    /// Chunk size for each upload session.
    pub chunk_size: u64,
    /// Remove local files once recorded as uploaded.
    pub delete_local_after_upload: bool,
    /// Name of the remote root container.
    pub root_folder_name: String,
    /// Optional parent of the root container.
    pub parent_folder_id: Option<String>,
    /// Backoff shared by every remote call.
    pub retry: RetryPolicy,
    /// Upload checkpoint to read and write instead of the one under the output root.
    pub checkpoint_path: Option<PathBuf>,
}

impl EngineOpts {
    /// Options from a normalized pipeline config.
    pub fn from_config(cfg: &PipelineConfig) -> Self {
        let remote = cfg.remote.as_ref();
        let root_folder_name = remote
            .map(|r| r.root_folder_name.trim())
            .filter(|n| !n.is_empty())
            .unwrap_or(DEFAULT_ROOT_FOLDER)
            .to_string();
        Self {
            concurrent_uploads: cfg.concurrent_uploads.max(1),
            chunk_size: cfg.chunk_size,
            delete_local_after_upload: cfg.delete_local_after_upload,
            root_folder_name,
            parent_folder_id: remote.and_then(|r| r.parent_folder_id.clone()),
            retry: RetryPolicy::with_max_retries(cfg.max_retries),
            checkpoint_path: None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
/// Counts reported at the end of a transfer run.
pub struct TransferSummary {
    /// Batch directories found.
    pub batches_seen: usize,
    /// Batches skipped because they were the last one fully uploaded.
    pub batches_skipped: usize,
    /// Batches marked complete during this run.
    pub batches_completed: usize,
    /// Files uploaded during this run.
    pub uploaded: u64,
    /// Files already recorded as uploaded.
    pub already_uploaded: u64,
    /// Files that failed terminally this run.
    pub failed: u64,
    /// Bytes sent for successful uploads.
    pub bytes_uploaded: u64,
    /// Local files removed after upload.
    pub deleted_local: u64,
}

impl std::fmt::Display for TransferSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "uploaded {} file(s) ({} bytes), {} failed, {} already uploaded; \
             {} batch(es) seen, {} skipped, {} completed",
            self.uploaded,
            self.bytes_uploaded,
            self.failed,
            self.already_uploaded,
            self.batches_seen,
            self.batches_skipped,
            self.batches_completed
        )?;
        if self.deleted_local > 0 {
            write!(f, "; {} local file(s) removed", self.deleted_local)?;
        }
        Ok(())
    }
}

struct PendingFile {
    name: String,
    path: PathBuf,
}

/// Walks batch directories in ascending order and uploads every file not yet in the upload
/// checkpoint.
pub struct TransferEngine<S: RemoteStore + ?Sized> {
    store: Arc<S>,
    layout: BatchLayout,
    opts: EngineOpts,
}

impl<S: RemoteStore + ?Sized> TransferEngine<S> {
    /// Engine uploading everything under `layout` to `store`.
    pub fn new(store: Arc<S>, layout: BatchLayout, opts: EngineOpts) -> Self {
        Self {
            store,
            layout,
            opts,
        }
    }

    /// Run one transfer pass.
    ///
    /// Only an unreadable output root or an unresolvable root container abort the run; every
    /// other failure is recorded per file and retried next run.
    #[tracing::instrument(skip_all, fields(root = %self.layout.root().display()))]
    pub async fn run(&self) -> ForgeResult<TransferSummary> {
        let ckpt_path = self.checkpoint_path();
        let mut progress = UploadProgress::load_lenient(&ckpt_path).unwrap_or_default();
        let batches = self.layout.list_batches()?;

        let mut summary = TransferSummary {
            batches_seen: batches.len(),
            ..TransferSummary::default()
        };
        let mut root_id: Option<String> = None;

        for key in batches {
            if progress.last_batch_uploaded == Some(key) {
                tracing::info!(batch = %key, "batch already uploaded, skipping");
                summary.batches_skipped += 1;
                continue;
            }

            let img_dir = self.layout.img_dir(key);
            let on_disk = match list_image_files(&img_dir) {
                Ok(files) => files,
                Err(e) => {
                    tracing::error!(batch = %key, error = %e, "cannot list batch images, skipping");
                    continue;
                }
            };
            let (done, pending): (Vec<PendingFile>, Vec<PendingFile>) = on_disk
                .into_iter()
                .partition(|f| progress.is_uploaded(&f.name));
            summary.already_uploaded += done.len() as u64;

            if !pending.is_empty() {
                let root = match &root_id {
                    Some(id) => id.clone(),
                    None => {
                        let id = self.resolve_root().await?;
                        root_id = Some(id.clone());
                        id
                    }
                };
                self.upload_batch(key, &root, &pending, &mut progress, &mut summary)
                    .await;
            }

            match list_image_files(&img_dir) {
                Ok(present) => {
                    let names: Vec<String> = present.into_iter().map(|f| f.name).collect();
                    if progress.batch_complete(key, &names) {
                        tracing::info!(batch = %key, files = names.len(), "batch complete");
                        summary.batches_completed += 1;
                    }
                }
                Err(e) => {
                    tracing::warn!(batch = %key, error = %e, "cannot re-list batch images");
                }
            }
            persist(&progress, &ckpt_path);
        }

        tracing::info!(
            uploaded = summary.uploaded,
            failed = summary.failed,
            batches = summary.batches_seen,
            "transfer finished"
        );
        Ok(summary)
    }

    fn checkpoint_path(&self) -> PathBuf {
        self.opts
            .checkpoint_path
            .clone()
            .unwrap_or_else(|| self.layout.upload_checkpoint())
    }

    async fn resolve_root(&self) -> ForgeResult<String> {
        ensure_container(
            self.store.as_ref(),
            &self.opts.retry,
            &self.opts.root_folder_name,
            self.opts.parent_folder_id.as_deref(),
        )
        .await
        .map_err(|e| {
            ForgeError::setup(format!(
                "cannot resolve root container '{}': {e}",
                self.opts.root_folder_name
            ))
        })
    }

    async fn upload_batch(
        &self,
        key: BatchKey,
        root: &str,
        pending: &[PendingFile],
        progress: &mut UploadProgress,
        summary: &mut TransferSummary,
    ) {
        let ckpt_path = self.checkpoint_path();
        let batch_name = key.to_string();
        let folder =
            match ensure_container(self.store.as_ref(), &self.opts.retry, &batch_name, Some(root))
                .await
            {
                Ok(id) => id,
                Err(e) => {
                    tracing::error!(batch = %key, error = %e, "cannot resolve batch container");
                    let mut delta = UploadProgress::default();
                    for f in pending {
                        let msg = format!("batch container: {e}");
                        delta.record_failure(&f.name, f.path.clone(), msg);
                        summary.failed += 1;
                    }
                    progress.merge(delta);
                    persist(progress, &ckpt_path);
                    return;
                }
            };

        tracing::info!(batch = %key, files = pending.len(), "uploading batch");
        for window in pending.chunks(self.opts.concurrent_uploads.max(1)) {
            let results =
                futures::future::join_all(window.iter().map(|f| self.upload_one(&folder, f))).await;

            let mut delta = UploadProgress::default();
            for (f, res) in window.iter().zip(results) {
                match res {
                    Ok(report) => {
                        summary.uploaded += 1;
                        summary.bytes_uploaded += report.size;
                        delta.record_success(
                            &f.name,
                            UploadedFile {
                                remote_id: report.remote_id,
                                path: f.path.clone(),
                                size: report.size,
                                uploaded_at: Utc::now(),
                            },
                        );
                    }
                    Err(e) => {
                        tracing::warn!(file = %f.name, error = %e, "upload failed");
                        summary.failed += 1;
                        delta.record_failure(&f.name, f.path.clone(), e.to_string());
                    }
                }
            }
            progress.merge(delta);
            persist(progress, &ckpt_path);

            if self.opts.delete_local_after_upload {
                for f in window.iter().filter(|f| progress.is_uploaded(&f.name)) {
                    match std::fs::remove_file(&f.path) {
                        Ok(()) => summary.deleted_local += 1,
                        Err(e) => {
                            tracing::warn!(file = %f.path.display(), error = %e, "failed to delete local file");
                        }
                    }
                }
            }
        }
    }

    async fn upload_one(&self, folder: &str, file: &PendingFile) -> ForgeResult<UploadReport> {
        let content_type = Path::new(&file.name)
            .extension()
            .and_then(|e| e.to_str())
            .and_then(ImageFormat::from_extension)
            .map_or("application/octet-stream", ImageFormat::content_type);
        ChunkedUploadSession::new(self.store.as_ref(), &self.opts.retry, self.opts.chunk_size)
            .upload(&file.path, &file.name, content_type, folder)
            .await
    }
}

fn persist(progress: &UploadProgress, path: &Path) {
    if let Err(e) = progress.persist(path) {
        tracing::error!(error = %e, "failed to persist upload progress");
    }
}

/// Raster files directly inside `dir`, sorted by name. A missing directory has no files.
fn list_image_files(dir: &Path) -> ForgeResult<Vec<PendingFile>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(anyhow::Error::new(e)
                .context(format!("list '{}'", dir.display()))
                .into());
        }
    };

    let mut out = Vec::new();
    for entry in entries {
        let entry = entry.with_context(|| format!("list '{}'", dir.display()))?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let is_raster = path
            .extension()
            .and_then(|e| e.to_str())
            .and_then(ImageFormat::from_extension)
            .is_some();
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        if is_raster {
            out.push(PendingFile { name, path });
        }
    }
    out.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(out)
}

#[cfg(test)]
#[path = "../../tests/unit/transfer/engine.rs"]
mod tests;
