use std::sync::Arc;

use crate::{
    checkpoint::{
        generation::{GenerationCheckpoint, GenerationProgress, ResumePoint, resume_point},
        store::Checkpoint,
        upload::UploadProgress,
    },
    compose::{
        encode::EncodeSettings,
        pool::{CompositionWorkerPool, PoolOpts},
    },
    foundation::{
        config::PipelineConfig,
        error::{ForgeError, ForgeResult},
    },
    items::{item::ItemPlan, metadata::load_item_plan},
    plan::batch::{BatchKey, BatchLayout},
    transfer::{
        engine::{EngineOpts, TransferEngine},
        remote::RemoteStore,
    },
};

pub use crate::transfer::engine::TransferSummary;

#[derive(Clone, Debug, PartialEq)]
/// Outcome of one composition run.
pub struct GenerationSummary {
    /// How the start index was chosen.
    pub resume: ResumePoint,
    /// First index rendered this run.
    pub start_index: u64,
    /// Last planned index.
    pub end_index: u64,
    /// Workers used.
    pub workers: usize,
    /// Items written this run.
    pub rendered: u64,
    /// Items that failed this run.
    pub failed: u64,
    /// Items written across this run and the runs it resumed.
    pub generated_total: u64,
    /// Batches whose metadata could not be loaded.
    pub skipped_batches: Vec<BatchKey>,
}

impl std::fmt::Display for GenerationSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let how = match self.resume {
            ResumePoint::Fresh => "fresh",
            ResumePoint::Forced => "forced",
            ResumePoint::RestartAfterCompletion => "restarted",
            ResumePoint::Resume { .. } => "resumed",
        };
        write!(
            f,
            "rendered {} item(s), {} failed ({how} at index {}, through {}, {} worker(s))",
            self.rendered, self.failed, self.start_index, self.end_index, self.workers
        )?;
        if !self.skipped_batches.is_empty() {
            let keys: Vec<String> = self.skipped_batches.iter().map(|k| k.to_string()).collect();
            write!(f, "; skipped batches without metadata: {}", keys.join(", "))?;
        }
        Ok(())
    }
}

/// Load items from every batch's metadata and run the composition stage.
#[tracing::instrument(skip_all, fields(root = %config.output_root.display()))]
pub fn generate(config: &PipelineConfig) -> ForgeResult<GenerationSummary> {
    let cfg = config.normalized();
    let layout = BatchLayout::new(&cfg.output_root, cfg.batch_size);
    let plan = load_item_plan(&layout, &cfg.layers_dir)?;
    generate_items(&cfg, &plan)
}

/// Run the composition stage over an already loaded plan.
///
/// The start index comes from the generation checkpoint (see [`resume_point`]); every index from
/// there to the plan's highest index is rendered and the checkpoint is marked completed at the end.
pub fn generate_items(config: &PipelineConfig, plan: &ItemPlan) -> ForgeResult<GenerationSummary> {
    let cfg = config.normalized();
    let layout = BatchLayout::new(&cfg.output_root, cfg.batch_size);
    std::fs::create_dir_all(layout.root()).map_err(|e| {
        ForgeError::setup(format!(
            "cannot create output root '{}': {e}",
            layout.root().display()
        ))
    })?;

    let ckpt_path = layout.generation_checkpoint();
    let prior = if cfg.force_regenerate {
        None
    } else {
        GenerationProgress::load_lenient(&ckpt_path)
    };
    let resume = resume_point(prior.as_ref(), cfg.force_regenerate);
    let start = resume.start_index();
    let end = plan.max_index().unwrap_or(0);

    let fresh = GenerationProgress::fresh(
        start,
        end,
        plan.len() as u64,
        cfg.image_format,
        cfg.batch_size,
    );
    let progress = match (resume, prior) {
        (ResumePoint::Resume { .. }, Some(mut p)) => {
            p.merge(fresh);
            p
        }
        _ => fresh,
    };

    if plan.is_empty() {
        tracing::warn!("no items to render");
    }
    tracing::info!(?resume, start, end, items = plan.len(), "composition starting");

    let settings = EncodeSettings::from_config(&cfg);
    let pool = CompositionWorkerPool::new(
        plan,
        &cfg.layer_order,
        &layout,
        &settings,
        PoolOpts {
            workers: cfg.num_workers,
            channel_capacity: cfg.channel_capacity,
        },
    );
    let mut checkpoint = GenerationCheckpoint::new(ckpt_path, progress, cfg.checkpoint_interval);
    let stats = pool.run(start, end, |ev| checkpoint.record(ev))?;
    let done = checkpoint.finish();

    tracing::info!(
        rendered = stats.rendered,
        failed = stats.failed,
        "composition finished"
    );
    Ok(GenerationSummary {
        resume,
        start_index: start,
        end_index: end,
        workers: stats.workers,
        rendered: stats.rendered,
        failed: stats.failed,
        generated_total: done.generated,
        skipped_batches: plan.skipped_batches().to_vec(),
    })
}

/// Run the transfer stage against `store`.
#[tracing::instrument(skip_all, fields(root = %config.output_root.display()))]
pub async fn transfer<S: RemoteStore + ?Sized>(
    config: &PipelineConfig,
    store: Arc<S>,
) -> ForgeResult<TransferSummary> {
    let cfg = config.normalized();
    let layout = BatchLayout::new(&cfg.output_root, cfg.batch_size);
    TransferEngine::new(store, layout, EngineOpts::from_config(&cfg))
        .run()
        .await
}

/// Run the transfer stage against `store` without touching the real upload checkpoint.
///
/// The engine works on a scratch copy of the checkpoint, so the summary shows what a real run
/// would send. Local files are never deleted and the scratch copy is removed afterwards.
#[tracing::instrument(skip_all, fields(root = %config.output_root.display()))]
pub async fn transfer_dry_run<S: RemoteStore + ?Sized>(
    config: &PipelineConfig,
    store: Arc<S>,
) -> ForgeResult<TransferSummary> {
    let cfg = config.normalized();
    let layout = BatchLayout::new(&cfg.output_root, cfg.batch_size);
    // Same setup failure as a real run when the output root is unreadable.
    layout.list_batches()?;
    let scratch = layout.dry_run_checkpoint();

    let seed = UploadProgress::load_lenient(&layout.upload_checkpoint()).unwrap_or_default();
    seed.persist(&scratch)?;

    let mut opts = EngineOpts::from_config(&cfg);
    opts.delete_local_after_upload = false;
    opts.checkpoint_path = Some(scratch.clone());
    let result = TransferEngine::new(store, layout, opts).run().await;

    if let Err(e) = std::fs::remove_file(&scratch) {
        tracing::warn!(path = %scratch.display(), error = %e, "failed to remove dry-run checkpoint");
    }
    result
}

#[derive(Clone, Debug, Default, PartialEq)]
/// Read-only view of both checkpoints.
pub struct StatusReport {
    /// Batch directories under the output root.
    pub batches: Vec<BatchKey>,
    /// Generation snapshot, if any.
    pub generation: Option<GenerationProgress>,
    /// Upload snapshot, if any.
    pub upload: Option<UploadProgress>,
}

impl std::fmt::Display for StatusReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "batches: {}", self.batches.len())?;
        match &self.generation {
            None => writeln!(f, "generation: no checkpoint")?,
            Some(g) => {
                writeln!(
                    f,
                    "generation: {}/{} generated, up to index {} of {}, {} error(s){}",
                    g.generated,
                    g.total_to_generate,
                    g.current_index,
                    g.end_index,
                    g.errors.len(),
                    if g.completed { ", completed" } else { "" }
                )?;
                for e in &g.errors {
                    writeln!(f, "  item {}: {}", e.index, e.error)?;
                }
            }
        }
        match &self.upload {
            None => write!(f, "upload: no checkpoint")?,
            Some(u) => {
                write!(
                    f,
                    "upload: {} uploaded, {} failed, last complete batch {}",
                    u.uploaded_files.len(),
                    u.failed_uploads.len(),
                    u.last_batch_uploaded
                        .map_or_else(|| "none".to_string(), |k| k.to_string())
                )?;
                for (name, fail) in &u.failed_uploads {
                    write!(
                        f,
                        "\n  {name}: {} attempt(s), {}",
                        fail.attempts, fail.last_error
                    )?;
                }
            }
        }
        Ok(())
    }
}

/// Read both checkpoints without changing anything on disk.
pub fn status(config: &PipelineConfig) -> ForgeResult<StatusReport> {
    let cfg = config.normalized();
    let layout = BatchLayout::new(&cfg.output_root, cfg.batch_size);
    let batches = match layout.list_batches() {
        Ok(b) => b,
        Err(ForgeError::Setup(msg)) => {
            tracing::debug!(%msg, "output root not readable");
            Vec::new()
        }
        Err(e) => return Err(e),
    };
    Ok(StatusReport {
        batches,
        generation: GenerationProgress::load(&layout.generation_checkpoint())?,
        upload: UploadProgress::load(&layout.upload_checkpoint())?,
    })
}

#[cfg(test)]
#[path = "../tests/unit/pipeline.rs"]
mod tests;
