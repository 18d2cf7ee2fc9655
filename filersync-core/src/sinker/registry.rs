//! The set of sink kinds a process can replicate to, looked up by name when the configuration
//! is read. The registry is assembled once at startup and installed process-wide; after that it
//! is read-only.
use std::sync::OnceLock;

use tracing::info;

use filersync_azure::{AppendBlobClient, AzureConfig, MAX_APPEND_BLOCK_SIZE};

use crate::config::Configuration;
use crate::sinker::{ChunkedSink, Sinker};
use crate::source::ChunkResolver;
use crate::store::LocalStore;
use crate::{Error, Result};

static REGISTRY: OnceLock<SinkRegistry> = OnceLock::new();

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SinkKind {
    Azure,
    Local,
}

impl SinkKind {
    /// Name of the `[sink.<name>]` configuration section.
    pub fn name(&self) -> &'static str {
        match self {
            SinkKind::Azure => "azure",
            SinkKind::Local => "local",
        }
    }

    /// Builds the sink from its configuration section.
    pub fn initialize<R: ChunkResolver>(
        &self,
        configuration: &Configuration,
        resolver: R,
    ) -> Result<Sinker<R>> {
        let directory = configuration.get_string("directory");
        match self {
            SinkKind::Azure => {
                // every buffer read from the source becomes one append block
                if resolver.read_buffer_size() > MAX_APPEND_BLOCK_SIZE {
                    return Err(Error::Config(format!(
                        "read_buffer_size {} exceeds the azure append block limit of {}",
                        resolver.read_buffer_size(),
                        MAX_APPEND_BLOCK_SIZE
                    )));
                }
                let endpoint = configuration.get_string("endpoint");
                let config = AzureConfig {
                    account_name: configuration.get_string("account_name"),
                    account_key: configuration.get_string("account_key"),
                    container: configuration.get_string("container"),
                    endpoint: (!endpoint.is_empty()).then_some(endpoint),
                };
                let client = AppendBlobClient::new(config)?;
                info!(
                    container = client.container(),
                    directory, "Initialized azure sink"
                );
                Ok(Sinker::Azure(ChunkedSink::new(
                    self.name(),
                    directory,
                    client,
                    resolver,
                )))
            }
            SinkKind::Local => {
                if directory.is_empty() {
                    return Err(Error::Config(
                        "local sink needs a target directory".to_string(),
                    ));
                }
                info!(directory, "Initialized local sink");
                Ok(Sinker::Local(ChunkedSink::new(
                    self.name(),
                    directory,
                    LocalStore,
                    resolver,
                )))
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct SinkRegistryBuilder {
    kinds: Vec<SinkKind>,
}

impl SinkRegistryBuilder {
    /// Adds a sink kind, names are unique.
    pub fn register(mut self, kind: SinkKind) -> Result<Self> {
        if self.kinds.iter().any(|k| k.name() == kind.name()) {
            return Err(Error::Registry(format!(
                "sink {} is already registered",
                kind.name()
            )));
        }
        self.kinds.push(kind);
        Ok(self)
    }

    pub fn build(self) -> SinkRegistry {
        SinkRegistry { kinds: self.kinds }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SinkRegistry {
    kinds: Vec<SinkKind>,
}

impl SinkRegistry {
    pub fn builder() -> SinkRegistryBuilder {
        SinkRegistryBuilder::default()
    }

    /// Registry with every sink this crate ships.
    pub fn builtin() -> Result<Self> {
        Ok(Self::builder()
            .register(SinkKind::Azure)?
            .register(SinkKind::Local)?
            .build())
    }

    pub fn get(&self, name: &str) -> Option<SinkKind> {
        self.kinds.iter().copied().find(|k| k.name() == name)
    }

    /// Registered kinds, in registration order.
    pub fn kinds(&self) -> &[SinkKind] {
        &self.kinds
    }

    /// The first registered sink whose `[sink.<name>]` section has `enabled = true`.
    pub fn enabled(&self, configuration: &Configuration) -> Option<SinkKind> {
        self.kinds.iter().copied().find(|kind| {
            configuration
                .section("sink")
                .section(kind.name())
                .get_bool("enabled")
        })
    }

    /// Makes this registry the process-wide one. Fails when one is installed already.
    pub fn install(self) -> Result<&'static SinkRegistry> {
        REGISTRY
            .set(self)
            .map_err(|_| Error::Registry("a sink registry is already installed".to_string()))?;
        installed().ok_or_else(|| Error::Registry("sink registry is not installed".to_string()))
    }
}

/// The process-wide registry, once installed.
pub fn installed() -> Option<&'static SinkRegistry> {
    REGISTRY.get()
}
