//! The source side: resolving chunk file ids to volume server URLs and streaming byte ranges
//! out of them.
//!
//! [FilerSource] resolves through the master's `/dir/lookup` API and reads with HTTP range
//! requests. Network frames are coalesced into buffers of at most `read_buffer_size` bytes so
//! that the consumer sees a bounded number of reasonably sized buffers per chunk.
use std::fmt::Display;

use bytes::{Bytes, BytesMut};
use futures::stream::{self, BoxStream, Stream, StreamExt};
use reqwest::StatusCode;
use reqwest::header::RANGE;
use serde::Deserialize;
use tracing::{debug, trace};

use crate::config::FilerSourceConfig;
use crate::{Error, Result};

/// Buffers of one ranged read, in file order.
pub type ByteStream = BoxStream<'static, Result<Bytes>>;

/// Where chunk data is fetched from.
#[trait_variant::make(Send)]
pub trait ChunkResolver: Send + Sync {
    /// Upper bound for a single buffer yielded by [ChunkResolver::read_stream].
    fn read_buffer_size(&self) -> usize;

    /// Maps a chunk file id to a URL it can be read from.
    async fn lookup_file_id(&self, file_id: &str) -> Result<String>;

    /// Streams `size` bytes of `url` starting at `offset`. The stream is finite and yields
    /// exactly `size` bytes in order, or ends with an error.
    async fn read_stream(&self, url: &str, offset: u64, size: u64) -> Result<ByteStream>;
}

#[derive(Debug, Deserialize)]
struct LookupResult {
    #[serde(default)]
    locations: Vec<Location>,
    #[serde(default)]
    error: String,
}

#[derive(Debug, Deserialize)]
struct Location {
    url: String,
}

/// HTTP based [ChunkResolver] backed by the cluster master and the volume servers.
#[derive(Clone, Debug)]
pub struct FilerSource {
    client: reqwest::Client,
    master: String,
    directory: String,
    read_buffer_size: usize,
}

impl FilerSource {
    pub fn new(config: FilerSourceConfig) -> Result<Self> {
        if config.master.is_empty() {
            return Err(Error::Config("source master address is empty".to_string()));
        }
        if config.read_buffer_size == 0 {
            return Err(Error::Config("read_buffer_size must be positive".to_string()));
        }
        let master = if config.master.contains("://") {
            config.master.trim_end_matches('/').to_string()
        } else {
            format!("http://{}", config.master.trim_end_matches('/'))
        };

        Ok(Self {
            client: reqwest::Client::new(),
            master,
            directory: config.directory,
            read_buffer_size: config.read_buffer_size,
        })
    }

    /// Directory of the source filer being replicated.
    pub fn directory(&self) -> &str {
        &self.directory
    }
}

/// Volume id part of a file id, `3` for `3,01637037d6`.
fn volume_id(file_id: &str) -> Result<&str> {
    match file_id.split_once(',') {
        Some((vid, _)) if !vid.is_empty() => Ok(vid),
        _ => Err(Error::Resolve(format!("invalid file id {file_id:?}"))),
    }
}

impl ChunkResolver for FilerSource {
    fn read_buffer_size(&self) -> usize {
        self.read_buffer_size
    }

    async fn lookup_file_id(&self, file_id: &str) -> Result<String> {
        let vid = volume_id(file_id)?;

        let response = self
            .client
            .get(format!("{}/dir/lookup", self.master))
            .query(&[("volumeId", vid)])
            .send()
            .await
            .map_err(|e| Error::Resolve(format!("looking up volume {vid}: {e}")))?;
        let status = response.status();
        let result: LookupResult = response
            .json()
            .await
            .map_err(|e| Error::Resolve(format!("looking up volume {vid} ({status}): {e}")))?;

        if !result.error.is_empty() {
            return Err(Error::Resolve(format!(
                "looking up volume {vid}: {}",
                result.error
            )));
        }
        let location = result
            .locations
            .first()
            .ok_or_else(|| Error::Resolve(format!("failed to locate {file_id}")))?;

        let url = format!("http://{}/{}", location.url, file_id);
        trace!(file_id, url, "Resolved file id");
        Ok(url)
    }

    async fn read_stream(&self, url: &str, offset: u64, size: u64) -> Result<ByteStream> {
        if size == 0 {
            return Ok(stream::empty().boxed());
        }

        let response = self
            .client
            .get(url)
            .header(RANGE, format!("bytes={}-{}", offset, offset + size - 1))
            .send()
            .await
            .map_err(|e| Error::Read(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Read(format!("{url}: {status}")));
        }
        if status != StatusCode::PARTIAL_CONTENT && offset > 0 {
            return Err(Error::Read(format!("{url}: range request was not honored")));
        }

        debug!(url, offset, size, "Streaming chunk range");
        Ok(coalesce(
            Box::pin(response.bytes_stream()),
            size,
            self.read_buffer_size,
            url,
        ))
    }
}

/// Re-chunks `inner` into buffers of at most `buffer_size` bytes, stopping after `size` bytes.
/// A stream that ends early yields a read error.
pub(crate) fn coalesce<S, E>(inner: S, size: u64, buffer_size: usize, url: &str) -> ByteStream
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Send + Unpin + 'static,
    E: Display,
{
    let reader = RangeReader {
        inner,
        url: url.to_string(),
        remaining: size,
        buffer: BytesMut::with_capacity(buffer_size.min(size as usize)),
        buffer_size,
        done: false,
    };
    stream::unfold(reader, |mut reader| async move {
        reader.next_buffer().await.map(|item| (item, reader))
    })
    .boxed()
}

struct RangeReader<S> {
    inner: S,
    url: String,
    /// Bytes still expected from `inner`.
    remaining: u64,
    buffer: BytesMut,
    buffer_size: usize,
    done: bool,
}

impl<S, E> RangeReader<S>
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Unpin,
    E: Display,
{
    async fn next_buffer(&mut self) -> Option<Result<Bytes>> {
        loop {
            if self.done {
                return None;
            }
            if self.buffer.len() >= self.buffer_size {
                return Some(Ok(self.buffer.split_to(self.buffer_size).freeze()));
            }
            if self.remaining == 0 {
                self.done = true;
                return (!self.buffer.is_empty()).then(|| Ok(self.buffer.split().freeze()));
            }

            match self.inner.next().await {
                Some(Ok(bytes)) => {
                    let take = self.remaining.min(bytes.len() as u64) as usize;
                    self.buffer.extend_from_slice(&bytes.slice(..take));
                    self.remaining -= take as u64;
                }
                Some(Err(e)) => {
                    self.done = true;
                    return Some(Err(Error::Read(format!("{}: {e}", self.url))));
                }
                None => {
                    self.done = true;
                    return Some(Err(Error::Read(format!(
                        "{}: short read, {} bytes missing",
                        self.url, self.remaining
                    ))));
                }
            }
        }
    }
}
