//! Replication sinks. A [Sink] applies entry lifecycle events (create, update, delete) of the
//! source filer to a remote store.
//!
//! [ChunkedSink] is the sink for stores with append-only objects: a created file is planned
//! into chunk views and streamed into a fresh object in file order. Updates are not applied in
//! place, the caller falls back to delete and create. [Sinker] is the closed set of sinks the
//! binary can be configured with, see [registry].
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use filersync_azure::AppendBlobClient;

use crate::entry::Entry;
use crate::filechunks;
use crate::source::ChunkResolver;
use crate::store::{DeleteOptions, LocalStore, Metadata, ObjectHeaders, RemoteStore};
use crate::uploader::{self, cancellable};
use crate::{Error, Result};

pub mod registry;

/// Set of operations a replication sink supports. Keys are paths relative to the replicated
/// source directory, the sink places them under its own directory.
#[trait_variant::make(Send)]
pub trait Sink: Send + Sync {
    fn name(&self) -> &str;

    /// Directory every key is placed under.
    fn sink_to_directory(&self) -> &str;

    /// Replicates a new entry. Directories are not materialized.
    async fn create_entry(&self, key: &str, entry: &Entry, cancel: &CancellationToken)
    -> Result<()>;

    /// Returns whether the update was applied. `false` asks the caller to delete the old entry
    /// and create the new one instead.
    async fn update_entry(
        &self,
        key: &str,
        old_entry: &Entry,
        new_entry: &Entry,
        delete_include_chunks: bool,
        cancel: &CancellationToken,
    ) -> Result<bool>;

    async fn delete_entry(
        &self,
        key: &str,
        is_directory: bool,
        delete_include_chunks: bool,
        cancel: &CancellationToken,
    ) -> Result<()>;
}

/// A [Sink] writing files as append-only objects of a [RemoteStore], reading content through a
/// [ChunkResolver].
#[derive(Clone, Debug)]
pub struct ChunkedSink<S, R> {
    name: &'static str,
    directory: String,
    store: S,
    resolver: R,
}

impl<S: RemoteStore, R: ChunkResolver> ChunkedSink<S, R> {
    pub fn new(name: &'static str, directory: impl Into<String>, store: S, resolver: R) -> Self {
        Self {
            name,
            directory: directory.into(),
            store,
            resolver,
        }
    }

    fn remote_key(&self, key: &str) -> String {
        format!("{}{}", self.directory, key)
    }
}

impl<S: RemoteStore, R: ChunkResolver> Sink for ChunkedSink<S, R> {
    fn name(&self) -> &str {
        self.name
    }

    fn sink_to_directory(&self) -> &str {
        &self.directory
    }

    async fn create_entry(
        &self,
        key: &str,
        entry: &Entry,
        cancel: &CancellationToken,
    ) -> Result<()> {
        if entry.is_directory {
            return Ok(());
        }

        let key = self.remote_key(key);
        let total_size = entry.total_size();
        let views = filechunks::view_from_chunks(&entry.chunks, 0, total_size);
        let headers = ObjectHeaders {
            content_type: entry.mime().map(str::to_string),
        };

        let mut handle = cancellable(cancel, async {
            self.store
                .create_append_object(&key, &headers, &Metadata::new())
                .await
                .map_err(|e| {
                    Error::Create(format!(
                        "{} create {}/{}: {e}",
                        self.name,
                        self.store.container(),
                        key
                    ))
                })
        })
        .await?;

        let written = uploader::upload_chunk_views(
            &self.store,
            &self.resolver,
            &mut handle,
            &key,
            &views,
            total_size,
            cancel,
        )
        .await?;

        info!(
            sink = self.name,
            container = self.store.container(),
            key,
            size = written,
            views = views.len(),
            "Created entry"
        );
        Ok(())
    }

    async fn update_entry(
        &self,
        key: &str,
        _old_entry: &Entry,
        _new_entry: &Entry,
        _delete_include_chunks: bool,
        _cancel: &CancellationToken,
    ) -> Result<bool> {
        debug!(sink = self.name, key, "In-place update not supported");
        Ok(false)
    }

    async fn delete_entry(
        &self,
        key: &str,
        is_directory: bool,
        _delete_include_chunks: bool,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let mut key = self.remote_key(key);
        if is_directory {
            key.push('/');
        }
        let options = DeleteOptions {
            include_snapshots: true,
        };

        cancellable(cancel, async {
            self.store.delete_object(&key, options).await.map_err(|e| {
                Error::Delete(format!(
                    "{} delete {}/{}: {e}",
                    self.name,
                    self.store.container(),
                    key
                ))
            })
        })
        .await?;

        info!(sink = self.name, container = self.store.container(), key, "Deleted entry");
        Ok(())
    }
}

/// The built-in sinks.
#[derive(Clone, Debug)]
pub enum Sinker<R> {
    Azure(ChunkedSink<AppendBlobClient, R>),
    Local(ChunkedSink<LocalStore, R>),
}

impl<R: ChunkResolver> Sink for Sinker<R> {
    fn name(&self) -> &str {
        match self {
            Sinker::Azure(sink) => sink.name(),
            Sinker::Local(sink) => sink.name(),
        }
    }

    fn sink_to_directory(&self) -> &str {
        match self {
            Sinker::Azure(sink) => sink.sink_to_directory(),
            Sinker::Local(sink) => sink.sink_to_directory(),
        }
    }

    async fn create_entry(
        &self,
        key: &str,
        entry: &Entry,
        cancel: &CancellationToken,
    ) -> Result<()> {
        match self {
            Sinker::Azure(sink) => sink.create_entry(key, entry, cancel).await,
            Sinker::Local(sink) => sink.create_entry(key, entry, cancel).await,
        }
    }

    async fn update_entry(
        &self,
        key: &str,
        old_entry: &Entry,
        new_entry: &Entry,
        delete_include_chunks: bool,
        cancel: &CancellationToken,
    ) -> Result<bool> {
        match self {
            Sinker::Azure(sink) => {
                sink.update_entry(key, old_entry, new_entry, delete_include_chunks, cancel)
                    .await
            }
            Sinker::Local(sink) => {
                sink.update_entry(key, old_entry, new_entry, delete_include_chunks, cancel)
                    .await
            }
        }
    }

    async fn delete_entry(
        &self,
        key: &str,
        is_directory: bool,
        delete_include_chunks: bool,
        cancel: &CancellationToken,
    ) -> Result<()> {
        match self {
            Sinker::Azure(sink) => {
                sink.delete_entry(key, is_directory, delete_include_chunks, cancel)
                    .await
            }
            Sinker::Local(sink) => {
                sink.delete_entry(key, is_directory, delete_include_chunks, cancel)
                    .await
            }
        }
    }
}
