//! Append blob access for the Azure replication sink, built on the Azure Storage SDK.
//!
//! Only the three operations a replication sink needs are exposed:
//! - creating an (empty) append blob
//! - appending a block at a known append position
//! - deleting a blob together with its snapshots
pub mod client;

pub use client::{AppendBlob, AppendBlobClient};

/// Largest block a single append may carry.
pub const MAX_APPEND_BLOCK_SIZE: usize = 4 * 1024 * 1024;

/// Errors returned by the Azure client.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed with Azure error - {0}")]
    Azure(#[from] azure_core::Error),
}

pub type Result<T> = core::result::Result<T, Error>;

/// Connection settings for one storage container.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AzureConfig {
    pub account_name: String,
    pub account_key: String,
    pub container: String,
    /// Overrides `https://{account_name}.blob.core.windows.net`, e.g. for a local emulator.
    pub endpoint: Option<String>,
}
