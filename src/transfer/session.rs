use std::{io::SeekFrom, path::Path, time::Duration};

use anyhow::Context as _;
use tokio::io::{AsyncReadExt as _, AsyncSeekExt as _};

use crate::{
    foundation::error::ForgeResult,
    transfer::{
        remote::{ChunkRange, ChunkResponse, RemoteError, RemoteStore, SessionRequest},
        retry::RetryPolicy,
    },
};

#[derive(Clone, Debug, PartialEq, Eq)]
/// Outcome of a finished upload.
pub struct UploadReport {
    /// Id assigned by the remote store.
    pub remote_id: String,
    /// File size in bytes.
    pub size: u64,
    /// Chunk requests issued, retries included.
    pub chunks_sent: u32,
    /// Waits taken before each chunk retry.
    pub retry_delays: Vec<Duration>,
}

/// Resumable upload of a single file in fixed-size chunks.
///
/// The byte offset only moves when the server confirms bytes, and always to the offset the server
/// reports. Retryable chunk failures are retried under the [`RetryPolicy`]; the failure counter
/// resets after every confirmed chunk.
pub struct ChunkedUploadSession<'a, S: RemoteStore + ?Sized> {
    store: &'a S,
    policy: &'a RetryPolicy,
    chunk_size: u64,
}

impl<'a, S: RemoteStore + ?Sized> ChunkedUploadSession<'a, S> {
    /// Session sending `chunk_size`-byte chunks through `store`.
    pub fn new(store: &'a S, policy: &'a RetryPolicy, chunk_size: u64) -> Self {
        Self {
            store,
            policy,
            chunk_size: chunk_size.max(1),
        }
    }

    /// Upload the file at `path` as `name` into container `parent`.
    pub async fn upload(
        &self,
        path: &Path,
        name: &str,
        content_type: &str,
        parent: &str,
    ) -> ForgeResult<UploadReport> {
        let mut file = tokio::fs::File::open(path)
            .await
            .with_context(|| format!("open '{}'", path.display()))?;
        let size = file
            .metadata()
            .await
            .with_context(|| format!("stat '{}'", path.display()))?
            .len();

        let req = SessionRequest {
            name: name.to_string(),
            size,
            content_type: content_type.to_string(),
            parent: parent.to_string(),
        };
        let handle = self
            .policy
            .run("open session", || self.store.open_session(&req))
            .await?;
        tracing::debug!(name, size, "upload session opened");

        let mut report = UploadReport {
            remote_id: String::new(),
            size,
            chunks_sent: 0,
            retry_delays: Vec::new(),
        };
        let mut offset = 0u64;
        let mut failures = 0u32;

        loop {
            let range = if size == 0 {
                ChunkRange {
                    start: 0,
                    end: 0,
                    total: 0,
                }
            } else {
                let len = self.chunk_size.min(size - offset);
                ChunkRange {
                    start: offset,
                    end: offset + len - 1,
                    total: size,
                }
            };
            let bytes = read_range(&mut file, range)
                .await
                .with_context(|| format!("read '{}' at {offset}", path.display()))?;

            report.chunks_sent += 1;
            let failure = match self.store.put_chunk(&handle, range, bytes).await {
                Ok(ChunkResponse::Complete { remote_id }) => {
                    report.remote_id = remote_id;
                    return Ok(report);
                }
                Ok(ChunkResponse::Partial { next_offset }) if next_offset > size => {
                    return Err(RemoteError::protocol(format!(
                        "server confirmed {next_offset} bytes of a {size}-byte file"
                    ))
                    .into());
                }
                Ok(ChunkResponse::Partial { next_offset }) if size > 0 && next_offset == size => {
                    // Every byte is held but the file was not finalized; resend the last chunk.
                    RemoteError::protocol(format!(
                        "server holds all {size} bytes but did not finalize the upload"
                    ))
                }
                Ok(ChunkResponse::Partial { next_offset }) if next_offset > offset => {
                    tracing::trace!(name, next_offset, "chunk confirmed");
                    offset = next_offset;
                    failures = 0;
                    continue;
                }
                Ok(ChunkResponse::Partial { next_offset }) => {
                    // No forward progress; follow the server but spend a retry.
                    offset = next_offset;
                    RemoteError::protocol(format!("server did not advance past offset {next_offset}"))
                }
                Err(e) if e.is_retryable() => e,
                Err(e) => return Err(e.into()),
            };

            failures += 1;
            let Some(wait) = self.policy.next_delay(failures) else {
                tracing::warn!(name, offset, failures, error = %failure, "chunk retries exhausted");
                return Err(failure.into());
            };
            tracing::debug!(name, offset, failures, wait_ms = wait.as_millis() as u64, error = %failure, "retrying chunk");
            report.retry_delays.push(wait);
            tokio::time::sleep(wait).await;
        }
    }
}

async fn read_range(file: &mut tokio::fs::File, range: ChunkRange) -> std::io::Result<Vec<u8>> {
    let mut buf = vec![0u8; range.len() as usize];
    if buf.is_empty() {
        return Ok(buf);
    }
    file.seek(SeekFrom::Start(range.start)).await?;
    file.read_exact(&mut buf).await?;
    Ok(buf)
}

#[cfg(test)]
#[path = "../../tests/unit/transfer/session.rs"]
mod tests;
