use std::{collections::BTreeMap, path::PathBuf};

use chrono::{DateTime, Utc};

use crate::{checkpoint::store::Checkpoint, plan::batch::BatchKey};

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
/// A file the remote store has acknowledged.
pub struct UploadedFile {
    /// Id assigned by the remote store.
    pub remote_id: String,
    /// Local path at upload time.
    pub path: PathBuf,
    /// Bytes sent.
    pub size: u64,
    /// When the final chunk was confirmed.
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
/// A file whose last upload attempt ended in a terminal error.
pub struct FailedUpload {
    /// Local path.
    pub path: PathBuf,
    /// Runs in which the file failed.
    pub attempts: u32,
    /// Message of the most recent failure.
    pub last_error: String,
    /// When the most recent failure happened.
    pub last_attempt: DateTime<Utc>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase", default)]
/// Snapshot of the transfer stage, stored in `drive_upload_progress.json`.
///
/// Keys of both maps are bare file names (`"23.png"`); names are unique across batches because
/// they embed the item index.
pub struct UploadProgress {
    /// Last batch whose every on-disk file was uploaded.
    pub last_batch_uploaded: Option<BatchKey>,
    /// Uploaded files by name.
    pub uploaded_files: BTreeMap<String, UploadedFile>,
    /// Files that failed and will be retried next run.
    pub failed_uploads: BTreeMap<String, FailedUpload>,
}

impl UploadProgress {
    /// Whether `name` already has a remote copy.
    pub fn is_uploaded(&self, name: &str) -> bool {
        self.uploaded_files.contains_key(name)
    }

    /// Record a confirmed upload and clear any earlier failure for the same file.
    pub fn record_success(&mut self, name: impl Into<String>, file: UploadedFile) {
        let name = name.into();
        self.failed_uploads.remove(&name);
        self.uploaded_files.insert(name, file);
    }

    /// Record a terminal failure, incrementing the attempt count.
    pub fn record_failure(
        &mut self,
        name: impl Into<String>,
        path: PathBuf,
        error: impl Into<String>,
    ) {
        let entry = self
            .failed_uploads
            .entry(name.into())
            .or_insert_with(|| FailedUpload {
                path: path.clone(),
                attempts: 0,
                last_error: String::new(),
                last_attempt: Utc::now(),
            });
        entry.path = path;
        entry.attempts += 1;
        entry.last_error = error.into();
        entry.last_attempt = Utc::now();
    }

    /// Mark `key` finished when every name in `present` (the files currently on disk) is uploaded.
    ///
    /// Returns whether the batch was marked.
    pub fn batch_complete(&mut self, key: BatchKey, present: &[String]) -> bool {
        if present.iter().all(|n| self.is_uploaded(n)) {
            if self.last_batch_uploaded.is_none_or(|k| key > k) {
                self.last_batch_uploaded = Some(key);
            }
            true
        } else {
            false
        }
    }
}

impl Checkpoint for UploadProgress {
    const KIND: &'static str = "upload";

    /// Fold a delta in: newer entries win, failure attempts add up, and any failure whose file is
    /// now uploaded is dropped.
    fn merge(&mut self, newer: Self) {
        self.last_batch_uploaded = self.last_batch_uploaded.max(newer.last_batch_uploaded);
        self.uploaded_files.extend(newer.uploaded_files);
        for (name, f) in newer.failed_uploads {
            match self.failed_uploads.get_mut(&name) {
                Some(prev) => {
                    prev.attempts += f.attempts;
                    prev.path = f.path;
                    prev.last_error = f.last_error;
                    prev.last_attempt = f.last_attempt;
                }
                None => {
                    self.failed_uploads.insert(name, f);
                }
            }
        }
        let uploaded = &self.uploaded_files;
        self.failed_uploads.retain(|name, _| !uploaded.contains_key(name));
    }
}

#[cfg(test)]
#[path = "../../tests/unit/checkpoint/upload.rs"]
mod tests;
