//! Replicates a filer's entries into object storage.
//!
//! A file on the source filer is a list of chunks stored on volume servers. To replicate a
//! created file the [sinker] plans the chunks into ordered read windows ([filechunks]), fetches
//! each window through a [source::ChunkResolver] and appends the bytes, in order, to a fresh
//! append-only object of a [store::RemoteStore]. Deletes remove the object, updates are
//! replicated as a delete followed by a create. The [replicator] routes source events to the
//! configured sink.
pub use crate::error::{Error, Result};

mod error;

pub mod config;
pub mod entry;
pub mod filechunks;
pub mod replicator;
pub mod sinker;
pub mod source;
pub mod store;

mod uploader;

#[cfg(test)]
mod test_utils;
