use std::{ops::RangeInclusive, path::PathBuf, sync::mpsc};

use crate::{
    compose::{encode::EncodeSettings, layers::LayerCache, render::render_item},
    foundation::{
        config::DEFAULT_CHANNEL_CAPACITY,
        error::{ForgeError, ForgeResult},
    },
    items::item::ItemPlan,
    plan::batch::{BatchLayout, partition_ranges},
};

#[derive(Clone, Debug, PartialEq, Eq)]
/// Message sent from a worker to the aggregator.
pub enum WorkerEvent {
    /// An item was composited and written.
    Rendered {
        /// Worker slot (0-based).
        worker: usize,
        /// 1-based item index.
        index: u64,
        /// Written output file.
        path: PathBuf,
    },
    /// An item could not be rendered; the worker moved on.
    Failed {
        /// Worker slot (0-based).
        worker: usize,
        /// 1-based item index.
        index: u64,
        /// Rendered error message.
        error: String,
    },
    /// The worker exhausted its range.
    Finished {
        /// Worker slot (0-based).
        worker: usize,
        /// Items attempted (rendered + failed).
        processed: u64,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
/// Worker pool sizing.
pub struct PoolOpts {
    /// Worker count; `0` resolves to host concurrency minus one.
    pub workers: usize,
    /// Bounded channel slots per worker.
    pub channel_capacity: usize,
}

impl Default for PoolOpts {
    fn default() -> Self {
        Self {
            workers: 0,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
/// Totals observed by the aggregator for one pool run.
pub struct PoolStats {
    /// Workers that ran (after resolving and clamping to the range length).
    pub workers: usize,
    /// Items written.
    pub rendered: u64,
    /// Items that produced an error event.
    pub failed: u64,
}

/// Resolve a configured worker count: `0` means available parallelism minus one, at least one.
pub fn resolve_worker_count(requested: usize) -> usize {
    if requested > 0 {
        return requested;
    }
    std::thread::available_parallelism()
        .map(|n| n.get().saturating_sub(1))
        .unwrap_or(1)
        .max(1)
}

/// Renders every planned item in an index range across a fixed set of workers.
///
/// Each worker owns one contiguous sub-range from [`partition_ranges`] and a private
/// [`LayerCache`]. Workers report through a bounded channel; the caller's `on_event` closure runs
/// on the calling thread and is the only consumer.
pub struct CompositionWorkerPool<'a> {
    plan: &'a ItemPlan,
    layer_order: &'a [String],
    layout: &'a BatchLayout,
    settings: &'a EncodeSettings,
    opts: PoolOpts,
}

impl<'a> CompositionWorkerPool<'a> {
    /// Pool over `plan`, writing into `layout`.
    pub fn new(
        plan: &'a ItemPlan,
        layer_order: &'a [String],
        layout: &'a BatchLayout,
        settings: &'a EncodeSettings,
        opts: PoolOpts,
    ) -> Self {
        Self {
            plan,
            layer_order,
            layout,
            settings,
            opts,
        }
    }

    /// Render `start..=end`, forwarding every worker event to `on_event`.
    ///
    /// Returns only after every worker has sent [`WorkerEvent::Finished`].
    pub fn run(
        &self,
        start: u64,
        end: u64,
        mut on_event: impl FnMut(&WorkerEvent),
    ) -> ForgeResult<PoolStats> {
        let ranges = partition_ranges(start, end, resolve_worker_count(self.opts.workers));
        let mut stats = PoolStats {
            workers: ranges.len(),
            ..PoolStats::default()
        };
        if ranges.is_empty() {
            return Ok(stats);
        }

        let tally = |ev: &WorkerEvent, stats: &mut PoolStats| match ev {
            WorkerEvent::Rendered { .. } => stats.rendered += 1,
            WorkerEvent::Failed { .. } => stats.failed += 1,
            WorkerEvent::Finished { .. } => {}
        };

        if ranges.len() == 1 {
            let mut emit = |ev: WorkerEvent| {
                tally(&ev, &mut stats);
                on_event(&ev);
                true
            };
            for (worker, range) in ranges.into_iter().enumerate() {
                self.run_range(worker, range, &mut emit);
            }
            return Ok(stats);
        }

        let expected = ranges.len();
        let pool = build_thread_pool(expected)?;
        let cap = self.opts.channel_capacity.max(1).saturating_mul(expected);

        let finished = std::thread::scope(|scope| -> ForgeResult<usize> {
            let (tx, rx) = mpsc::sync_channel::<WorkerEvent>(cap);

            let producer = scope.spawn(move || {
                pool.scope(|s| {
                    for (worker, range) in ranges.into_iter().enumerate() {
                        let tx = tx.clone();
                        s.spawn(move |_| {
                            let mut emit = |ev: WorkerEvent| tx.send(ev).is_ok();
                            self.run_range(worker, range, &mut emit);
                        });
                    }
                });
            });

            let mut finished = 0usize;
            for ev in rx {
                if matches!(ev, WorkerEvent::Finished { .. }) {
                    finished += 1;
                }
                tally(&ev, &mut stats);
                on_event(&ev);
            }

            producer
                .join()
                .map_err(|_| ForgeError::setup("composition worker panicked"))?;
            Ok(finished)
        })?;

        if finished != expected {
            return Err(ForgeError::setup(format!(
                "only {finished} of {expected} composition workers finished"
            )));
        }
        Ok(stats)
    }

    fn run_range(
        &self,
        worker: usize,
        range: RangeInclusive<u64>,
        emit: &mut dyn FnMut(WorkerEvent) -> bool,
    ) {
        tracing::debug!(worker, start = *range.start(), end = *range.end(), "worker started");
        let mut cache = LayerCache::new();
        let mut processed = 0u64;

        for index in range {
            let Some(item) = self.plan.get(index) else {
                continue;
            };
            processed += 1;
            let rendered =
                render_item(item, self.layer_order, self.layout, self.settings, &mut cache);
            let ev = match rendered {
                Ok(out) => WorkerEvent::Rendered {
                    worker,
                    index,
                    path: out.path,
                },
                Err(e) => {
                    tracing::warn!(worker, index, error = %e, "item failed");
                    WorkerEvent::Failed {
                        worker,
                        index,
                        error: e.to_string(),
                    }
                }
            };
            if !emit(ev) {
                return;
            }
        }

        tracing::debug!(worker, processed, cached_layers = cache.len(), "worker finished");
        emit(WorkerEvent::Finished { worker, processed });
    }
}

fn build_thread_pool(threads: usize) -> ForgeResult<rayon::ThreadPool> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .thread_name(|i| format!("layerforge-compose-{i}"))
        .build()
        .map_err(|e| ForgeError::setup(format!("failed to build worker thread pool: {e}")))
}

#[cfg(test)]
#[path = "../../tests/unit/compose/pool.rs"]
mod tests;
