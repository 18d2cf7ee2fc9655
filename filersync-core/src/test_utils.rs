//! Test doubles shared by the unit tests: an in-memory [RemoteStore], an in-memory
//! [ChunkResolver], and fake HTTP servers standing in for the cluster and the blob service.
use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use axum::Router;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::IntoResponse;
use axum::routing::get;
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use serde_json::json;

use crate::entry::{Entry, FileChunk};
use crate::source::{ByteStream, ChunkResolver};
use crate::store::{DeleteOptions, Metadata, ObjectHeaders, RemoteStore};
use crate::{Error, Result};

#[derive(Default)]
struct MemoryState {
    objects: HashMap<String, Vec<u8>>,
    content_types: HashMap<String, Option<String>>,
    created: Vec<String>,
    appends: Vec<(String, usize)>,
    deleted: Vec<(String, bool)>,
}

/// In-memory store with failure injection.
#[derive(Clone, Default)]
pub(crate) struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
    append_attempts: Arc<AtomicUsize>,
    fail_append_at: Option<usize>,
    fail_create: bool,
    fail_delete: bool,
}

pub(crate) struct MemoryObject {
    key: String,
}

impl MemoryStore {
    /// The append with this index (counted over all objects, from 0) fails.
    pub(crate) fn fail_append_at(mut self, n: usize) -> Self {
        self.fail_append_at = Some(n);
        self
    }

    pub(crate) fn fail_create(mut self) -> Self {
        self.fail_create = true;
        self
    }

    pub(crate) fn fail_delete(mut self) -> Self {
        self.fail_delete = true;
        self
    }

    pub(crate) fn object(&self, key: &str) -> Option<Vec<u8>> {
        self.state.lock().objects.get(key).cloned()
    }

    pub(crate) fn content_type(&self, key: &str) -> Option<String> {
        self.state.lock().content_types.get(key).cloned().flatten()
    }

    pub(crate) fn created(&self) -> Vec<String> {
        self.state.lock().created.clone()
    }

    /// Successful appends as (key, length).
    pub(crate) fn appends(&self) -> Vec<(String, usize)> {
        self.state.lock().appends.clone()
    }

    /// Deletes as (key, include_snapshots).
    pub(crate) fn deleted(&self) -> Vec<(String, bool)> {
        self.state.lock().deleted.clone()
    }

    pub(crate) fn append_attempts(&self) -> usize {
        self.append_attempts.load(Ordering::SeqCst)
    }
}

impl RemoteStore for MemoryStore {
    type Handle = MemoryObject;

    fn container(&self) -> &str {
        "memory"
    }

    async fn create_append_object(
        &self,
        key: &str,
        headers: &ObjectHeaders,
        _metadata: &Metadata,
    ) -> Result<MemoryObject> {
        if self.fail_create {
            return Err(Error::Store("injected create failure".to_string()));
        }
        let mut state = self.state.lock();
        state.objects.insert(key.to_string(), Vec::new());
        state
            .content_types
            .insert(key.to_string(), headers.content_type.clone());
        state.created.push(key.to_string());
        Ok(MemoryObject {
            key: key.to_string(),
        })
    }

    async fn append_block(&self, handle: &mut MemoryObject, data: Bytes) -> Result<()> {
        // let concurrent uploads interleave
        tokio::task::yield_now().await;
        let attempt = self.append_attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail_append_at == Some(attempt) {
            return Err(Error::Store("injected append failure".to_string()));
        }
        let mut state = self.state.lock();
        state
            .objects
            .entry(handle.key.clone())
            .or_default()
            .extend_from_slice(&data);
        state.appends.push((handle.key.clone(), data.len()));
        Ok(())
    }

    async fn delete_object(&self, key: &str, options: DeleteOptions) -> Result<()> {
        if self.fail_delete {
            return Err(Error::Store("injected delete failure".to_string()));
        }
        let mut state = self.state.lock();
        state.objects.remove(key);
        state
            .deleted
            .push((key.to_string(), options.include_snapshots));
        Ok(())
    }
}

/// Serves chunk content from memory, `mem://{file_id}` URLs.
#[derive(Clone)]
pub(crate) struct StaticResolver {
    chunks: HashMap<String, Bytes>,
    buffer_size: usize,
    fail_lookup: HashSet<String>,
    fail_read: HashSet<String>,
    stall_read: HashSet<String>,
}

impl Default for StaticResolver {
    fn default() -> Self {
        Self {
            chunks: HashMap::new(),
            buffer_size: 1024,
            fail_lookup: HashSet::new(),
            fail_read: HashSet::new(),
            stall_read: HashSet::new(),
        }
    }
}

impl StaticResolver {
    pub(crate) fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    pub(crate) fn fail_lookup(mut self, file_id: &str) -> Self {
        self.fail_lookup.insert(file_id.to_string());
        self
    }

    /// Reads of this chunk yield one buffer and then fail.
    pub(crate) fn fail_read(mut self, file_id: &str) -> Self {
        self.fail_read.insert(file_id.to_string());
        self
    }

    /// Reads of this chunk never produce anything.
    pub(crate) fn stall_read(mut self, file_id: &str) -> Self {
        self.stall_read.insert(file_id.to_string());
        self
    }

    pub(crate) fn merge(mut self, other: StaticResolver) -> Self {
        self.chunks.extend(other.chunks);
        self
    }
}

impl ChunkResolver for StaticResolver {
    fn read_buffer_size(&self) -> usize {
        self.buffer_size
    }

    async fn lookup_file_id(&self, file_id: &str) -> Result<String> {
        if self.fail_lookup.contains(file_id) {
            return Err(Error::Resolve(format!("failed to locate {file_id}")));
        }
        Ok(format!("mem://{file_id}"))
    }

    async fn read_stream(&self, url: &str, offset: u64, size: u64) -> Result<ByteStream> {
        let file_id = url.trim_start_matches("mem://");
        if self.stall_read.contains(file_id) {
            return Ok(stream::pending::<Result<Bytes>>().boxed());
        }
        let data = self
            .chunks
            .get(file_id)
            .ok_or_else(|| Error::Read(format!("{url}: not found")))?
            .slice(offset as usize..(offset + size) as usize);

        let mut buffers: Vec<Result<Bytes>> = data
            .chunks(self.buffer_size)
            .map(|b| Ok(Bytes::copy_from_slice(b)))
            .collect();
        if self.fail_read.contains(file_id) {
            buffers.truncate(1);
            buffers.push(Err(Error::Read(format!("{url}: connection reset"))));
        }
        Ok(stream::iter(buffers).boxed())
    }
}

/// Content for a chunk, derived from its file id so distinct chunks differ.
fn chunk_content(file_id: &str, size: u64) -> Bytes {
    let seed = file_id
        .bytes()
        .fold(0u8, |acc, b| acc.wrapping_mul(31).wrapping_add(b));
    (0..size)
        .map(|i| (i as u8).wrapping_mul(7).wrapping_add(seed))
        .collect::<Vec<u8>>()
        .into()
}

/// A file entry made of `(file_id, offset, size, mtime)` chunks, a resolver serving them, and
/// the file content they add up to.
pub(crate) fn file_entry(specs: &[(&str, u64, u64, i64)]) -> (Entry, StaticResolver, Vec<u8>) {
    let chunks: Vec<FileChunk> = specs
        .iter()
        .map(|(file_id, offset, size, mtime)| FileChunk {
            file_id: file_id.to_string(),
            offset: *offset,
            size: *size,
            mtime: *mtime,
        })
        .collect();
    let contents: HashMap<String, Bytes> = chunks
        .iter()
        .map(|c| (c.file_id.clone(), chunk_content(&c.file_id, c.size)))
        .collect();

    let entry = Entry {
        name: "file".to_string(),
        chunks,
        ..Default::default()
    };

    let mut expected = vec![0u8; entry.total_size() as usize];
    let mut ordered: Vec<&FileChunk> = entry.chunks.iter().collect();
    ordered.sort_by_key(|c| c.mtime);
    for c in ordered {
        let start = c.offset as usize;
        expected[start..start + c.size as usize].copy_from_slice(&contents[&c.file_id]);
    }

    let resolver = StaticResolver {
        chunks: contents,
        ..Default::default()
    };
    (entry, resolver, expected)
}

#[derive(Clone)]
struct FakeCluster {
    addr: SocketAddr,
    chunks: Arc<HashMap<String, Bytes>>,
}

async fn cluster_lookup(
    State(cluster): State<FakeCluster>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let vid = params.get("volumeId").cloned().unwrap_or_default();
    let known = cluster
        .chunks
        .keys()
        .any(|fid| fid.split_once(',').map(|(v, _)| v) == Some(vid.as_str()));
    if known {
        (
            StatusCode::OK,
            axum::Json(json!({
                "volumeId": vid,
                "locations": [{"url": cluster.addr.to_string()}],
            })),
        )
    } else {
        (
            StatusCode::NOT_FOUND,
            axum::Json(json!({"volumeId": vid, "error": "volume id not found"})),
        )
    }
}

async fn cluster_read(
    State(cluster): State<FakeCluster>,
    Path(fid): Path<String>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let Some(data) = cluster.chunks.get(&fid) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let range = headers
        .get("range")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("bytes="))
        .and_then(|v| v.split_once('-'))
        .and_then(|(start, end)| {
            Some((start.parse::<usize>().ok()?, end.parse::<usize>().ok()?))
        });
    match range {
        Some((start, end)) => {
            let end = end.min(data.len() - 1);
            (StatusCode::PARTIAL_CONTENT, data.slice(start..=end)).into_response()
        }
        None => (StatusCode::OK, data.clone()).into_response(),
    }
}

/// Master and volume server in one: every known volume is located on this server.
pub(crate) async fn start_fake_cluster(chunks: HashMap<String, Bytes>) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let state = FakeCluster {
        addr,
        chunks: Arc::new(chunks),
    };
    let router = Router::new()
        .route("/dir/lookup", get(cluster_lookup))
        .route("/{fid}", get(cluster_read))
        .with_state(state);
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

#[derive(Debug, Clone)]
pub(crate) struct RecordedRequest {
    pub(crate) method: String,
    pub(crate) path: String,
    pub(crate) query: String,
    pub(crate) headers: HeaderMap,
    pub(crate) body: Bytes,
}

impl RecordedRequest {
    pub(crate) fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

pub(crate) struct FakeBlobService {
    pub(crate) addr: SocketAddr,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl FakeBlobService {
    pub(crate) fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().clone()
    }
}

/// Response headers the blob SDK parses out of successful write and delete responses.
const BLOB_RESPONSE_HEADERS: [(&str, &str); 10] = [
    ("etag", "\"0x8DC0000000000000\""),
    ("last-modified", "Mon, 01 Jan 2024 00:00:00 GMT"),
    ("date", "Mon, 01 Jan 2024 00:00:00 GMT"),
    ("x-ms-request-id", "00000000-0000-0000-0000-000000000001"),
    ("x-ms-version", "2020-10-02"),
    ("x-ms-request-server-encrypted", "true"),
    ("x-ms-blob-append-offset", "0"),
    ("x-ms-blob-committed-block-count", "1"),
    ("x-ms-delete-type-permanent", "true"),
    ("content-md5", "1B2M2Y8AsgTpgAmY7PhCfg=="),
];

async fn record_blob_request(
    State(requests): State<Arc<Mutex<Vec<RecordedRequest>>>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let status = if method == Method::DELETE {
        StatusCode::ACCEPTED
    } else {
        StatusCode::CREATED
    };
    requests.lock().push(RecordedRequest {
        method: method.to_string(),
        path: uri.path().to_string(),
        query: uri.query().unwrap_or_default().to_string(),
        headers,
        body,
    });
    (status, BLOB_RESPONSE_HEADERS)
}

/// Accepts every blob request and records it.
pub(crate) async fn start_fake_blob_service() -> FakeBlobService {
    let requests = Arc::new(Mutex::new(Vec::new()));
    let router = Router::new()
        .fallback(record_blob_request)
        .with_state(Arc::clone(&requests));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    FakeBlobService { addr, requests }
}
