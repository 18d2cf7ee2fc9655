use bytes::Bytes;
use filersync_azure::{AppendBlob, AppendBlobClient};

use crate::Result;
use crate::store::{DeleteOptions, Metadata, ObjectHeaders, RemoteStore};

impl RemoteStore for AppendBlobClient {
    type Handle = AppendBlob;

    fn container(&self) -> &str {
        AppendBlobClient::container(self)
    }

    async fn create_append_object(
        &self,
        key: &str,
        headers: &ObjectHeaders,
        metadata: &Metadata,
    ) -> Result<AppendBlob> {
        Ok(self
            .create(key, headers.content_type.as_deref(), metadata)
            .await?)
    }

    async fn append_block(&self, handle: &mut AppendBlob, data: Bytes) -> Result<()> {
        Ok(AppendBlobClient::append_block(self, handle, data).await?)
    }

    async fn delete_object(&self, key: &str, options: DeleteOptions) -> Result<()> {
        Ok(self.delete(key, options.include_snapshots).await?)
    }
}
