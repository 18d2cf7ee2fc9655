//! Streams the planned [ChunkView]s of an entry into an append-only object.
//!
//! Views are processed one at a time in file order, each buffer read from the source is
//! appended before the next one is requested, so at most one buffer per upload is held in
//! memory and the object content is always a prefix of the file. The first failure stops the
//! upload, nothing is appended after it. Ranges of the file no chunk covers are written as
//! zeros.
use std::future::Future;

use bytes::Bytes;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::filechunks::ChunkView;
use crate::source::ChunkResolver;
use crate::store::RemoteStore;
use crate::{Error, Result};

const ZERO_BLOCK_SIZE: usize = 64 * 1024;
static ZEROS: [u8; ZERO_BLOCK_SIZE] = [0; ZERO_BLOCK_SIZE];

/// Runs `fut` unless `cancel` fires first.
pub(crate) async fn cancellable<T>(
    cancel: &CancellationToken,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Cancelled),
        result = fut => result,
    }
}

/// Writes `views` into `handle` and pads the object up to `total_size`. Returns the number of
/// bytes written.
pub(crate) async fn upload_chunk_views<S, R>(
    store: &S,
    resolver: &R,
    handle: &mut S::Handle,
    key: &str,
    views: &[ChunkView],
    total_size: u64,
    cancel: &CancellationToken,
) -> Result<u64>
where
    S: RemoteStore,
    R: ChunkResolver,
{
    let mut written = 0u64;

    for view in views {
        if view.logic_offset > written {
            written += append_zeros(store, handle, key, view.logic_offset - written, cancel).await?;
        }
        debug!(
            key,
            file_id = view.file_id,
            logic_offset = view.logic_offset,
            size = view.size,
            "Uploading chunk view"
        );

        let url = cancellable(cancel, resolver.lookup_file_id(&view.file_id)).await?;
        let mut buffers =
            cancellable(cancel, resolver.read_stream(&url, view.offset, view.size)).await?;
        while let Some(buffer) =
            cancellable(cancel, async { buffers.next().await.transpose() }).await?
        {
            written += append(store, handle, key, buffer, cancel).await?;
        }
    }

    if total_size > written {
        written += append_zeros(store, handle, key, total_size - written, cancel).await?;
    }
    Ok(written)
}

async fn append<S: RemoteStore>(
    store: &S,
    handle: &mut S::Handle,
    key: &str,
    buffer: Bytes,
    cancel: &CancellationToken,
) -> Result<u64> {
    let len = buffer.len() as u64;
    cancellable(cancel, async {
        store
            .append_block(handle, buffer)
            .await
            .map_err(|e| Error::Append(format!("{key}: {e}")))
    })
    .await?;
    Ok(len)
}

async fn append_zeros<S: RemoteStore>(
    store: &S,
    handle: &mut S::Handle,
    key: &str,
    len: u64,
    cancel: &CancellationToken,
) -> Result<u64> {
    debug!(key, len, "Filling hole with zeros");
    let mut remaining = len;
    while remaining > 0 {
        let n = remaining.min(ZERO_BLOCK_SIZE as u64) as usize;
        let zeros = Bytes::from_static(&ZEROS).slice(..n);
        remaining -= append(store, handle, key, zeros, cancel).await?;
    }
    Ok(len)
}
