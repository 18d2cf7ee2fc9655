//! Remote stores the sink writes into. A store only needs append-only objects: create an empty
//! object, append blocks to it in order, and delete it.
//!
//! [AppendBlobClient] writes Azure append blobs, [LocalStore] mirrors into a local directory.
//!
//! [AppendBlobClient]: filersync_azure::AppendBlobClient
use std::collections::HashMap;

use bytes::Bytes;

use crate::Result;

mod azure;

pub mod local;
pub use local::LocalStore;

/// User metadata attached to a created object.
pub type Metadata = HashMap<String, String>;

/// Standard headers stored with a created object.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ObjectHeaders {
    pub content_type: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeleteOptions {
    /// Also remove snapshots of the object, stores without snapshots ignore this.
    pub include_snapshots: bool,
}

/// An object store supporting append-only objects.
#[trait_variant::make(Send)]
pub trait RemoteStore: Send + Sync {
    /// Open object, appends go through it.
    type Handle: Send;

    /// Name of the container (or root) objects are written to, used for error context.
    fn container(&self) -> &str;

    /// Creates an empty object at `key`, replacing whatever was there.
    async fn create_append_object(
        &self,
        key: &str,
        headers: &ObjectHeaders,
        metadata: &Metadata,
    ) -> Result<Self::Handle>;

    /// Appends `data` to the end of the object. Appends to one handle are strictly ordered.
    async fn append_block(&self, handle: &mut Self::Handle, data: Bytes) -> Result<()>;

    async fn delete_object(&self, key: &str, options: DeleteOptions) -> Result<()>;
}
