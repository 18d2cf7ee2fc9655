//! Mirrors objects into the local filesystem. Keys are used as paths as they are, the sink's
//! directory decides where they land.
use std::io::ErrorKind;
use std::path::PathBuf;

use bytes::Bytes;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::store::{DeleteOptions, Metadata, ObjectHeaders, RemoteStore};
use crate::{Error, Result};

#[derive(Clone, Debug, Default)]
pub struct LocalStore;

/// An open local file being appended to.
#[derive(Debug)]
pub struct LocalFile {
    path: PathBuf,
    file: File,
}

impl RemoteStore for LocalStore {
    type Handle = LocalFile;

    fn container(&self) -> &str {
        "local"
    }

    async fn create_append_object(
        &self,
        key: &str,
        _headers: &ObjectHeaders,
        _metadata: &Metadata,
    ) -> Result<LocalFile> {
        let path = PathBuf::from(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::Store(format!("creating {}: {e}", parent.display())))?;
        }
        let file = File::create(&path)
            .await
            .map_err(|e| Error::Store(format!("creating {}: {e}", path.display())))?;
        debug!(path = %path.display(), "Created local file");
        Ok(LocalFile { path, file })
    }

    async fn append_block(&self, handle: &mut LocalFile, data: Bytes) -> Result<()> {
        handle
            .file
            .write_all(&data)
            .await
            .map_err(|e| Error::Store(format!("writing {}: {e}", handle.path.display())))?;
        // tokio files write in the background, flushing surfaces the write error here
        handle
            .file
            .flush()
            .await
            .map_err(|e| Error::Store(format!("writing {}: {e}", handle.path.display())))
    }

    async fn delete_object(&self, key: &str, _options: DeleteOptions) -> Result<()> {
        let result = if key.ends_with('/') {
            fs::remove_dir_all(key).await
        } else {
            fs::remove_file(key).await
        };
        match result {
            Ok(()) => {
                debug!(path = key, "Deleted local path");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Store(format!("deleting {key}: {e}"))),
        }
    }
}
