use crate::transfer::retry::RetryPolicy;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
/// Classification of a failed remote call.
pub enum RemoteErrorKind {
    /// HTTP 429 or an equivalent quota signal.
    RateLimited,
    /// HTTP 5xx.
    Server(u16),
    /// The request never produced a response (connect, reset, timeout).
    Network,
    /// HTTP 401; the cached access token is stale.
    Unauthorized,
    /// Any other HTTP 4xx.
    Client(u16),
    /// The response did not match the protocol (missing header, bad JSON, ...).
    Protocol,
}

impl RemoteErrorKind {
    /// Classify an HTTP status code that is not a success.
    pub fn from_status(status: u16) -> Self {
        match status {
            429 => Self::RateLimited,
            401 => Self::Unauthorized,
            500..=599 => Self::Server(status),
            400..=499 => Self::Client(status),
            _ => Self::Protocol,
        }
    }

    /// Whether the same call may succeed if repeated.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            Self::RateLimited | Self::Server(_) | Self::Network | Self::Unauthorized
        )
    }
}

impl std::fmt::Display for RemoteErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RateLimited => f.write_str("rate limited"),
            Self::Server(s) => write!(f, "server error {s}"),
            Self::Network => f.write_str("network error"),
            Self::Unauthorized => f.write_str("unauthorized"),
            Self::Client(s) => write!(f, "client error {s}"),
            Self::Protocol => f.write_str("protocol error"),
        }
    }
}

#[derive(thiserror::Error, Clone, Debug, PartialEq, Eq)]
#[error("{kind}: {message}")]
/// A failed remote call.
pub struct RemoteError {
    /// Failure class; decides retry vs. give up.
    pub kind: RemoteErrorKind,
    /// Detail from the response body or transport.
    pub message: String,
}

impl RemoteError {
    /// Build an error of `kind`.
    pub fn new(kind: RemoteErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Shorthand for [`RemoteErrorKind::Protocol`].
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::Protocol, message)
    }

    /// Whether the call may be retried.
    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
/// Parameters of a resumable upload session.
pub struct SessionRequest {
    /// Remote file name.
    pub name: String,
    /// Declared total size in bytes.
    pub size: u64,
    /// MIME type.
    pub content_type: String,
    /// Container receiving the file.
    pub parent: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
/// Opaque handle to an open upload session (for Drive, the session URI).
pub struct SessionHandle(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
/// Inclusive byte range of one chunk, plus the declared total.
pub struct ChunkRange {
    /// First byte offset.
    pub start: u64,
    /// Last byte offset (inclusive). Ignored when `total == 0`.
    pub end: u64,
    /// Declared file size.
    pub total: u64,
}

impl ChunkRange {
    /// Bytes covered. An inverted range covers nothing.
    pub fn len(&self) -> u64 {
        if self.total == 0 || self.end < self.start {
            0
        } else {
            (self.end - self.start).saturating_add(1)
        }
    }

    /// Whether the chunk carries no bytes (only for zero-byte files).
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `Content-Range` header value.
    pub fn content_range(&self) -> String {
        if self.total == 0 {
            "bytes */0".to_string()
        } else {
            format!("bytes {}-{}/{}", self.start, self.end, self.total)
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
/// Server reply to a chunk.
pub enum ChunkResponse {
    /// The file is complete.
    Complete {
        /// Id of the stored file.
        remote_id: String,
    },
    /// More bytes are expected starting at `next_offset`.
    Partial {
        /// First byte the server has not persisted.
        next_offset: u64,
    },
}

/// A remote object store that accepts resumable chunked uploads into named containers.
#[async_trait::async_trait]
pub trait RemoteStore: Send + Sync {
    /// Start a resumable upload.
    async fn open_session(&self, req: &SessionRequest) -> Result<SessionHandle, RemoteError>;

    /// Send one chunk of an open session.
    async fn put_chunk(
        &self,
        session: &SessionHandle,
        range: ChunkRange,
        bytes: Vec<u8>,
    ) -> Result<ChunkResponse, RemoteError>;

    /// Id of the container called `name` under `parent` (or at top level), if it exists.
    async fn find_container(
        &self,
        name: &str,
        parent: Option<&str>,
    ) -> Result<Option<String>, RemoteError>;

    /// Create a container and return its id.
    async fn create_container(
        &self,
        name: &str,
        parent: Option<&str>,
    ) -> Result<String, RemoteError>;
}

/// Find the container `name` under `parent`, creating it if absent. Both calls retry under
/// `policy`.
///
/// Two concurrent pipelines may both miss and both create; a single writer per root is assumed.
pub async fn ensure_container<S: RemoteStore + ?Sized>(
    store: &S,
    policy: &RetryPolicy,
    name: &str,
    parent: Option<&str>,
) -> Result<String, RemoteError> {
    let found = policy
        .run("find container", || store.find_container(name, parent))
        .await?;
    if let Some(id) = found {
        tracing::debug!(name, id = %id, "container found");
        return Ok(id);
    }
    let id = policy
        .run("create container", || store.create_container(name, parent))
        .await?;
    tracing::info!(name, id = %id, "container created");
    Ok(id)
}

#[cfg(test)]
#[path = "../../tests/unit/transfer/remote.rs"]
mod tests;
