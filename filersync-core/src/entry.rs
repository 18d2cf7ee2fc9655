//! Entries as they are published by the source filer. The sink only ever reads them.
use serde::{Deserialize, Serialize};

use crate::filechunks;

/// A file or directory node of the source filer.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Entry {
    pub name: String,
    pub is_directory: bool,
    /// Chunks making up the file content, in no particular order.
    pub chunks: Vec<FileChunk>,
    pub attributes: Option<Attributes>,
}

impl Entry {
    /// Logical size of the file, the end of its furthest chunk.
    pub fn total_size(&self) -> u64 {
        filechunks::total_size(&self.chunks)
    }

    pub fn mime(&self) -> Option<&str> {
        self.attributes
            .as_ref()
            .map(|attr| attr.mime.as_str())
            .filter(|mime| !mime.is_empty())
    }
}

/// A contiguous byte range of a file, stored under `file_id` on some volume server.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileChunk {
    pub file_id: String,
    /// Offset of the chunk within the file.
    pub offset: u64,
    pub size: u64,
    /// Write time in nanoseconds; a newer chunk shadows older ones where they overlap.
    pub mtime: i64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Attributes {
    pub file_size: u64,
    pub mtime: i64,
    pub mime: String,
}

/// One change on the source filer. A missing old entry is a create, a missing new entry is a
/// delete, both present is an update (possibly a rename when `new_parent_path` is set).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventNotification {
    pub old_entry: Option<Entry>,
    pub new_entry: Option<Entry>,
    pub delete_chunks: bool,
    pub new_parent_path: Option<String>,
}
