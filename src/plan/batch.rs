use std::{
    ops::RangeInclusive,
    path::{Path, PathBuf},
};

use anyhow::Context as _;

use crate::foundation::{
    config::ImageFormat,
    error::{ForgeError, ForgeResult},
};

/// File name of the generation checkpoint under the output root.
pub const GENERATION_CHECKPOINT_FILE: &str = "generation_progress.json";
/// File name of the upload checkpoint under the output root.
pub const UPLOAD_CHECKPOINT_FILE: &str = "drive_upload_progress.json";
/// Scratch upload checkpoint used by dry runs, removed when the run ends.
pub const DRY_RUN_CHECKPOINT_FILE: &str = "drive_upload_progress.dry-run.json";

const IMG_DIR: &str = "img";
const METADATA_DIR: &str = "metadata";
const METADATA_FILE: &str = "metadata.json";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
/// Inclusive, 1-based index range owned by one batch directory.
///
/// Ordering is numeric by `start`, so `"2-2" < "10-10"` even though the strings sort the other
/// way.
pub struct BatchKey {
    /// First index in the batch.
    pub start: u64,
    /// Last index in the batch (inclusive).
    pub end: u64,
}

impl BatchKey {
    /// The single batch used when `batch_size == 0`.
    pub fn unbounded() -> Self {
        Self {
            start: 1,
            end: u64::MAX,
        }
    }

    /// Recognise a batch directory name of the form `<start>-<end>`.
    pub fn parse(name: &str) -> Option<Self> {
        let (a, b) = name.split_once('-')?;
        let digits = |s: &str| !s.is_empty() && s.bytes().all(|c| c.is_ascii_digit());
        if !digits(a) || !digits(b) {
            return None;
        }
        let start = a.parse().ok()?;
        let end = b.parse().ok()?;
        if start == 0 || start > end {
            return None;
        }
        Some(Self { start, end })
    }

    /// Whether `index` falls inside this batch.
    pub fn contains(&self, index: u64) -> bool {
        (self.start..=self.end).contains(&index)
    }
}

impl std::fmt::Display for BatchKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

impl serde::Serialize for BatchKey {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(self)
    }
}

impl<'de> serde::Deserialize<'de> for BatchKey {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(d)?;
        Self::parse(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid batch key '{raw}'")))
    }
}

/// Map a 1-based item index to its batch.
///
/// `start = floor((index - 1) / batch_size) * batch_size + 1`, `end = start + batch_size - 1`.
/// `batch_size == 0` puts everything into [`BatchKey::unbounded`]. Index 0 is treated as index 1.
pub fn compute_batch(index: u64, batch_size: u64) -> BatchKey {
    if batch_size == 0 {
        return BatchKey::unbounded();
    }
    let start = (index.saturating_sub(1) / batch_size) * batch_size + 1;
    BatchKey {
        start,
        end: start.saturating_add(batch_size - 1),
    }
}

/// Batches covering `start..=end`, in ascending order.
pub fn batches_for(start: u64, end: u64, batch_size: u64) -> Vec<BatchKey> {
    let mut out = Vec::new();
    if start > end {
        return out;
    }
    let mut key = compute_batch(start, batch_size);
    loop {
        out.push(key);
        if key.end >= end {
            break;
        }
        key = compute_batch(key.end + 1, batch_size);
    }
    out
}

/// Split `start..=end` into at most `workers` contiguous, non-overlapping ranges of
/// `ceil(len / workers)` indices each. Trailing workers get fewer (or no) indices.
pub fn partition_ranges(start: u64, end: u64, workers: usize) -> Vec<RangeInclusive<u64>> {
    if start > end {
        return Vec::new();
    }
    let workers = workers.max(1) as u64;
    let len = end - start + 1;
    let per = len.div_ceil(workers);

    let mut out = Vec::with_capacity(workers as usize);
    let mut s = start;
    for _ in 0..workers {
        let e = s.saturating_add(per - 1).min(end);
        out.push(s..=e);
        if e == end {
            break;
        }
        s = e + 1;
    }
    out
}

#[derive(Clone, Debug)]
/// On-disk layout rooted at the configured output directory.
pub struct BatchLayout {
    root: PathBuf,
    batch_size: u64,
}

impl BatchLayout {
    /// Layout for `root` with `batch_size` items per batch directory.
    pub fn new(root: impl Into<PathBuf>, batch_size: u64) -> Self {
        Self {
            root: root.into(),
            batch_size,
        }
    }

    /// Output root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Items per batch.
    pub fn batch_size(&self) -> u64 {
        self.batch_size
    }

    /// Batch owning `index`.
    pub fn batch_of(&self, index: u64) -> BatchKey {
        compute_batch(index, self.batch_size)
    }

    /// `<root>/<key>`.
    pub fn batch_dir(&self, key: BatchKey) -> PathBuf {
        self.root.join(key.to_string())
    }

    /// `<root>/<key>/img`.
    pub fn img_dir(&self, key: BatchKey) -> PathBuf {
        self.batch_dir(key).join(IMG_DIR)
    }

    /// `<root>/<key>/metadata/metadata.json`.
    pub fn metadata_path(&self, key: BatchKey) -> PathBuf {
        self.batch_dir(key).join(METADATA_DIR).join(METADATA_FILE)
    }

    /// `<root>/<batch(index)>/img/<index>.<ext>`.
    pub fn image_path(&self, index: u64, format: ImageFormat) -> PathBuf {
        self.img_dir(self.batch_of(index))
            .join(format!("{index}.{}", format.extension()))
    }

    /// `<root>/generation_progress.json`.
    pub fn generation_checkpoint(&self) -> PathBuf {
        self.root.join(GENERATION_CHECKPOINT_FILE)
    }

    /// `<root>/drive_upload_progress.json`.
    pub fn upload_checkpoint(&self) -> PathBuf {
        self.root.join(UPLOAD_CHECKPOINT_FILE)
    }

    /// `<root>/drive_upload_progress.dry-run.json`.
    pub fn dry_run_checkpoint(&self) -> PathBuf {
        self.root.join(DRY_RUN_CHECKPOINT_FILE)
    }

    /// Batch directories present under the root, sorted ascending.
    ///
    /// Entries whose names do not look like batch keys are ignored. An unreadable root is a setup
    /// error.
    pub fn list_batches(&self) -> ForgeResult<Vec<BatchKey>> {
        let entries = std::fs::read_dir(&self.root).map_err(|e| {
            ForgeError::setup(format!(
                "output root '{}' is not readable: {e}",
                self.root.display()
            ))
        })?;

        let mut out = Vec::new();
        for entry in entries {
            let entry =
                entry.with_context(|| format!("list output root '{}'", self.root.display()))?;
            if !entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
                continue;
            }
            if let Some(key) = entry.file_name().to_str().and_then(BatchKey::parse) {
                out.push(key);
            }
        }
        out.sort();
        Ok(out)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/plan/batch.rs"]
mod tests;
