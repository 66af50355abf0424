use std::path::PathBuf;

use chrono::{DateTime, Utc};

use crate::{
    checkpoint::store::Checkpoint, compose::pool::WorkerEvent, foundation::config::ImageFormat,
};

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
/// An item that failed to render.
pub struct ItemError {
    /// 1-based item index.
    pub index: u64,
    /// Error message.
    pub error: String,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
/// Snapshot of the composition stage, stored in `generation_progress.json`.
pub struct GenerationProgress {
    /// First index of the run.
    pub start_index: u64,
    /// Highest index rendered so far.
    pub current_index: u64,
    /// Last index of the run.
    pub end_index: u64,
    /// Planned items in `start_index..=end_index`.
    pub total_to_generate: u64,
    /// Items written successfully.
    pub generated: u64,
    /// Items that failed, ordered by index.
    #[serde(default)]
    pub errors: Vec<ItemError>,
    /// When the run (or the run it resumes) began.
    pub start_time: DateTime<Utc>,
    /// Last event applied.
    pub last_update_time: DateTime<Utc>,
    /// Output encoding.
    pub format: ImageFormat,
    /// Items per batch directory.
    pub batch_size: u64,
    /// Set once every worker finished.
    #[serde(default)]
    pub completed: bool,
}

impl Default for GenerationProgress {
    fn default() -> Self {
        Self::fresh(1, 0, 0, ImageFormat::default(), 0)
    }
}

impl GenerationProgress {
    /// Progress for a run over `start..=end` with nothing rendered yet.
    pub fn fresh(start: u64, end: u64, total: u64, format: ImageFormat, batch_size: u64) -> Self {
        let now = Utc::now();
        Self {
            start_index: start,
            current_index: start.saturating_sub(1),
            end_index: end,
            total_to_generate: total,
            generated: 0,
            errors: Vec::new(),
            start_time: now,
            last_update_time: now,
            format,
            batch_size,
            completed: false,
        }
    }

    fn touch(&mut self) {
        self.last_update_time = Utc::now();
    }

    /// Record (or replace) the error for `index`, keeping `errors` sorted.
    fn merge_error(&mut self, index: u64, error: &str) {
        let e = ItemError {
            index,
            error: error.to_string(),
        };
        match self.errors.iter_mut().find(|x| x.index == index) {
            Some(slot) => *slot = e,
            None => {
                let at = self.errors.partition_point(|x| x.index < index);
                self.errors.insert(at, e);
            }
        }
    }
}

impl Checkpoint for GenerationProgress {
    const KIND: &'static str = "generation";

    /// Monotonic join: counters and the high-water mark only grow, errors are unioned by index,
    /// and the run bounds follow `newer`.
    fn merge(&mut self, newer: Self) {
        self.start_index = self.start_index.min(newer.start_index);
        self.current_index = self.current_index.max(newer.current_index);
        self.end_index = newer.end_index;
        self.total_to_generate = newer.total_to_generate;
        self.generated = self.generated.max(newer.generated);
        for e in newer.errors {
            self.merge_error(e.index, &e.error);
        }
        self.start_time = self.start_time.min(newer.start_time);
        self.last_update_time = self.last_update_time.max(newer.last_update_time);
        self.format = newer.format;
        self.batch_size = newer.batch_size;
        self.completed = newer.completed;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
/// Where the next composition run starts, and why.
pub enum ResumePoint {
    /// No snapshot on disk.
    Fresh,
    /// The caller asked to discard any snapshot.
    Forced,
    /// The previous run completed; start over.
    RestartAfterCompletion,
    /// The previous run stopped early.
    Resume {
        /// `currentIndex + 1` of the snapshot.
        next_index: u64,
    },
}

impl ResumePoint {
    /// First index to render.
    pub fn start_index(self) -> u64 {
        match self {
            Self::Resume { next_index } => next_index,
            _ => 1,
        }
    }
}

/// Decide where composition resumes given the snapshot found on disk.
pub fn resume_point(prior: Option<&GenerationProgress>, force: bool) -> ResumePoint {
    match prior {
        _ if force => ResumePoint::Forced,
        None => ResumePoint::Fresh,
        Some(p) if p.completed => ResumePoint::RestartAfterCompletion,
        Some(p) => ResumePoint::Resume {
            next_index: p.current_index.saturating_add(1),
        },
    }
}

/// Aggregator that owns [`GenerationProgress`] for the duration of a run.
///
/// Feed it every [`WorkerEvent`]; it persists every `interval` rendered items and once more on
/// [`GenerationCheckpoint::finish`]. Persist failures are logged and the run carries on.
pub struct GenerationCheckpoint {
    path: PathBuf,
    progress: GenerationProgress,
    interval: u64,
    since_persist: u64,
}

impl GenerationCheckpoint {
    /// Aggregator writing to `path`, starting from `progress`.
    pub fn new(path: impl Into<PathBuf>, progress: GenerationProgress, interval: u64) -> Self {
        Self {
            path: path.into(),
            progress,
            interval: interval.max(1),
            since_persist: 0,
        }
    }

    /// Current snapshot.
    pub fn progress(&self) -> &GenerationProgress {
        &self.progress
    }

    /// Apply one worker event.
    pub fn record(&mut self, event: &WorkerEvent) {
        match event {
            WorkerEvent::Rendered { index, .. } => {
                self.progress.errors.retain(|e| e.index != *index);
                self.progress.generated += 1;
                self.progress.current_index = self.progress.current_index.max(*index);
                self.progress.touch();
                self.since_persist += 1;
                if self.since_persist >= self.interval {
                    self.persist();
                }
            }
            WorkerEvent::Failed { index, error, .. } => {
                self.progress.merge_error(*index, error);
                self.progress.touch();
            }
            WorkerEvent::Finished { worker, processed } => {
                tracing::debug!(worker, processed, "worker range exhausted");
            }
        }
    }

    /// Mark the run completed, write the final snapshot and return it.
    pub fn finish(mut self) -> GenerationProgress {
        self.progress.completed = true;
        self.progress.touch();
        self.persist();
        self.progress
    }

    fn persist(&mut self) {
        self.since_persist = 0;
        if let Err(e) = self.progress.persist(&self.path) {
            tracing::error!(error = %e, "failed to persist generation progress");
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/checkpoint/generation.rs"]
mod tests;
