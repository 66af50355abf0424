use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;

use crate::transfer::remote::{
    ChunkRange, ChunkResponse, RemoteError, RemoteErrorKind, RemoteStore, SessionHandle,
    SessionRequest,
};

#[derive(Clone, Debug, PartialEq, Eq)]
/// One chunk request seen by [`InMemoryStore`].
pub struct PutRecord {
    /// File name of the session.
    pub name: String,
    /// First byte offset of the chunk.
    pub start: u64,
    /// Bytes carried.
    pub len: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
/// A completed upload held by [`InMemoryStore`].
pub struct StoredFile {
    /// Assigned id.
    pub id: String,
    /// File name.
    pub name: String,
    /// Container id.
    pub parent: String,
    /// Content.
    pub bytes: Vec<u8>,
}

#[derive(Debug)]
struct OpenSession {
    req: SessionRequest,
    received: Vec<u8>,
}

#[derive(Debug, Default)]
struct State {
    next_id: u64,
    sessions: HashMap<String, OpenSession>,
    files: Vec<StoredFile>,
    containers: Vec<(String, String, Option<String>)>,
    puts: Vec<PutRecord>,
    opened: Vec<String>,
    chunk_faults: HashMap<String, VecDeque<RemoteError>>,
    rejected: HashMap<String, RemoteError>,
    short_acks: HashMap<String, u64>,
    container_faults: VecDeque<RemoteError>,
}

impl State {
    fn id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}-{}", self.next_id)
    }
}

#[derive(Debug, Default)]
/// Deterministic in-process [`RemoteStore`].
///
/// Everything is kept behind one lock. Faults can be scripted per file name so tests can drive
/// the retry and resume paths without a network.
pub struct InMemoryStore {
    state: Mutex<State>,
}

impl InMemoryStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next chunk requests for `name` with `errors`, in order.
    pub fn fail_next_chunks(&self, name: &str, errors: Vec<RemoteError>) {
        self.state
            .lock()
            .chunk_faults
            .entry(name.to_string())
            .or_default()
            .extend(errors);
    }

    /// Fail every session open for `name` with `error`.
    pub fn reject_file(&self, name: &str, error: RemoteError) {
        self.state.lock().rejected.insert(name.to_string(), error);
    }

    /// Make the next chunk for `name` persist only up to `offset`.
    pub fn short_ack_once(&self, name: &str, offset: u64) {
        self.state.lock().short_acks.insert(name.to_string(), offset);
    }

    /// Fail the next container lookups or creations with `errors`, in order.
    pub fn fail_next_container_calls(&self, errors: Vec<RemoteError>) {
        self.state.lock().container_faults.extend(errors);
    }

    /// Every chunk request received, in arrival order.
    pub fn puts(&self) -> Vec<PutRecord> {
        self.state.lock().puts.clone()
    }

    /// Chunk requests received for `name`.
    pub fn puts_for(&self, name: &str) -> Vec<PutRecord> {
        self.state
            .lock()
            .puts
            .iter()
            .filter(|p| p.name == name)
            .cloned()
            .collect()
    }

    /// File names of every session opened, in order.
    pub fn opened_sessions(&self) -> Vec<String> {
        self.state.lock().opened.clone()
    }

    /// Completed uploads.
    pub fn files(&self) -> Vec<StoredFile> {
        self.state.lock().files.clone()
    }

    /// Completed upload called `name`, if any.
    pub fn file(&self, name: &str) -> Option<StoredFile> {
        self.state
            .lock()
            .files
            .iter()
            .find(|f| f.name == name)
            .cloned()
    }

    /// Id of the container `name` under `parent`.
    pub fn container_id(&self, name: &str, parent: Option<&str>) -> Option<String> {
        self.state
            .lock()
            .containers
            .iter()
            .find(|(_, n, p)| n == name && p.as_deref() == parent)
            .map(|(id, _, _)| id.clone())
    }

    /// Number of containers created.
    pub fn container_count(&self) -> usize {
        self.state.lock().containers.len()
    }
}

#[async_trait::async_trait]
impl RemoteStore for InMemoryStore {
    async fn open_session(&self, req: &SessionRequest) -> Result<SessionHandle, RemoteError> {
        let mut st = self.state.lock();
        st.opened.push(req.name.clone());
        if let Some(err) = st.rejected.get(&req.name) {
            return Err(err.clone());
        }
        let handle = st.id("session");
        st.sessions.insert(
            handle.clone(),
            OpenSession {
                req: req.clone(),
                received: Vec::new(),
            },
        );
        Ok(SessionHandle(handle))
    }

    async fn put_chunk(
        &self,
        session: &SessionHandle,
        range: ChunkRange,
        bytes: Vec<u8>,
    ) -> Result<ChunkResponse, RemoteError> {
        let mut st = self.state.lock();
        let name = st
            .sessions
            .get(&session.0)
            .map(|s| s.req.name.clone())
            .ok_or_else(|| RemoteError::new(RemoteErrorKind::Client(404), "unknown session"))?;
        st.puts.push(PutRecord {
            name: name.clone(),
            start: range.start,
            len: bytes.len() as u64,
        });

        if let Some(err) = st.chunk_faults.get_mut(&name).and_then(VecDeque::pop_front) {
            return Err(err);
        }
        let short = st.short_acks.remove(&name);

        let Some(open) = st.sessions.get_mut(&session.0) else {
            return Err(RemoteError::new(RemoteErrorKind::Client(404), "unknown session"));
        };
        if range.total != open.req.size {
            return Err(RemoteError::new(
                RemoteErrorKind::Client(400),
                format!("declared size {} != {}", range.total, open.req.size),
            ));
        }
        let have = open.received.len() as u64;
        if range.start > have {
            return Err(RemoteError::new(
                RemoteErrorKind::Client(400),
                format!("chunk starts at {} but only {have} bytes persisted", range.start),
            ));
        }
        open.received.truncate(range.start as usize);
        open.received.extend_from_slice(&bytes);
        if let Some(offset) = short {
            open.received.truncate(offset as usize);
        }

        let have = open.received.len() as u64;
        if have < open.req.size {
            return Ok(ChunkResponse::Partial { next_offset: have });
        }

        let Some(done) = st.sessions.remove(&session.0) else {
            return Err(RemoteError::protocol("session vanished"));
        };
        let id = st.id("file");
        st.files.push(StoredFile {
            id: id.clone(),
            name: done.req.name,
            parent: done.req.parent,
            bytes: done.received,
        });
        Ok(ChunkResponse::Complete { remote_id: id })
    }

    async fn find_container(
        &self,
        name: &str,
        parent: Option<&str>,
    ) -> Result<Option<String>, RemoteError> {
        let mut st = self.state.lock();
        if let Some(err) = st.container_faults.pop_front() {
            return Err(err);
        }
        Ok(st
            .containers
            .iter()
            .find(|(_, n, p)| n == name && p.as_deref() == parent)
            .map(|(id, _, _)| id.clone()))
    }

    async fn create_container(
        &self,
        name: &str,
        parent: Option<&str>,
    ) -> Result<String, RemoteError> {
        let mut st = self.state.lock();
        if let Some(err) = st.container_faults.pop_front() {
            return Err(err);
        }
        let id = st.id("folder");
        st.containers
            .push((id.clone(), name.to_string(), parent.map(str::to_string)));
        Ok(id)
    }
}
