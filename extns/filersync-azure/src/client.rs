//! Append blob operations against one container, on top of the SDK's [BlobClient].
use std::collections::HashMap;
use std::fmt;

use azure_core::RetryOptions;
use azure_core::request_options::Metadata;
use azure_storage::{CloudLocation, StorageCredentials};
use azure_storage_blobs::prelude::{
    BlobClient, ClientBuilder, ConditionAppendPosition, ContainerClient, DeleteSnapshotsMethod,
};
use base64::Engine;
use base64::prelude::BASE64_STANDARD;
use bytes::Bytes;
use tracing::{debug, trace};

use crate::{AzureConfig, Error, Result};

/// A freshly created append blob. Every append is conditioned on the current append position,
/// so a concurrent writer to the same blob makes the next append fail instead of interleaving.
pub struct AppendBlob {
    client: BlobClient,
    key: String,
    append_position: u64,
}

impl fmt::Debug for AppendBlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppendBlob")
            .field("key", &self.key)
            .field("append_position", &self.append_position)
            .finish()
    }
}

/// Client for append blobs in a single container. Cloning is cheap and clones share the
/// underlying HTTP pipeline.
#[derive(Clone)]
pub struct AppendBlobClient {
    container_client: ContainerClient,
    container: String,
}

impl fmt::Debug for AppendBlobClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppendBlobClient")
            .field("container", &self.container)
            .finish()
    }
}

impl AppendBlobClient {
    /// Requests are never retried, a failed call surfaces to the caller as is.
    pub fn new(config: AzureConfig) -> Result<Self> {
        if config.account_name.is_empty() {
            return Err(Error::InvalidConfig("account name is empty".to_string()));
        }
        if config.container.is_empty() {
            return Err(Error::InvalidConfig("container is empty".to_string()));
        }
        // the SDK only decodes the key when signing the first request
        BASE64_STANDARD
            .decode(&config.account_key)
            .map_err(|e| Error::InvalidConfig(format!("account key is not base64: {e}")))?;

        let credentials =
            StorageCredentials::access_key(config.account_name.clone(), config.account_key);
        let builder = match config.endpoint.filter(|e| !e.is_empty()) {
            Some(uri) => {
                debug!(uri, "Using custom blob endpoint");
                let location = CloudLocation::Custom {
                    account: config.account_name,
                    uri,
                };
                ClientBuilder::with_location(location, credentials)
            }
            None => ClientBuilder::new(config.account_name, credentials),
        };
        let container_client = builder
            .retry(RetryOptions::none())
            .container_client(config.container.clone());

        Ok(Self {
            container_client,
            container: config.container,
        })
    }

    pub fn container(&self) -> &str {
        &self.container
    }

    /// Creates an empty append blob, replacing any blob already stored under `key`.
    pub async fn create(
        &self,
        key: &str,
        content_type: Option<&str>,
        metadata: &HashMap<String, String>,
    ) -> Result<AppendBlob> {
        let client = self.container_client.blob_client(key);

        let mut blob_metadata = Metadata::new();
        for (name, value) in metadata {
            blob_metadata.insert(name.clone(), value.clone());
        }
        let mut request = client.put_append_blob().metadata(blob_metadata);
        if let Some(content_type) = content_type {
            request = request.content_type(content_type.to_string());
        }
        request.await?;

        debug!(key, "Created append blob");
        Ok(AppendBlob {
            client,
            key: key.to_string(),
            append_position: 0,
        })
    }

    /// Appends `data` as one block at the blob's current append position. Empty buffers are
    /// not sent.
    pub async fn append_block(&self, blob: &mut AppendBlob, data: Bytes) -> Result<()> {
        if data.is_empty() {
            return Ok(());
        }
        let len = data.len() as u64;

        blob.client
            .append_block(data)
            .condition_append_position(ConditionAppendPosition::new(blob.append_position))
            .await?;

        blob.append_position += len;
        trace!(
            key = blob.key,
            len,
            position = blob.append_position,
            "Appended block"
        );
        Ok(())
    }

    /// Deletes the blob named `key`, optionally with all of its snapshots.
    pub async fn delete(&self, key: &str, include_snapshots: bool) -> Result<()> {
        let mut request = self.container_client.blob_client(key).delete();
        if include_snapshots {
            request = request.delete_snapshots_method(DeleteSnapshotsMethod::Include);
        }
        request.await?;
        debug!(key, "Deleted blob");
        Ok(())
    }
}
