//! Replication configuration.
//!
//! Settings come from `replication.toml` in the configuration directory, overridden by
//! `FILERSYNC_` prefixed environment variables where `__` separates nesting levels, e.g.
//! `FILERSYNC_SINK__AZURE__ACCOUNT_KEY` overrides `account_key` of `[sink.azure]`.
//!
//! ```toml
//! [source.filer]
//! master = "localhost:9333"
//! directory = "/buckets"
//!
//! [sink.azure]
//! enabled = true
//! account_name = "replica"
//! account_key = "..."
//! container = "backup"
//! directory = "/buckets"
//! ```
use std::path::Path;

use config::{Config, ConfigError, Environment, File, FileFormat, Source};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::info;

use crate::{Error, Result};

pub const CONFIG_FILE_NAME: &str = "replication.toml";
pub const ENV_CONFIG_PATH: &str = "CONFIG_PATH";
const ENV_PREFIX: &str = "FILERSYNC";
const DEFAULT_READ_BUFFER_SIZE: usize = 1024 * 1024;

/// A view of the loaded configuration rooted at one section (`sink.azure`, `source.filer`,
/// ...). Options are read once at initialization; missing string options read as empty.
#[derive(Clone, Debug)]
pub struct Configuration {
    inner: Config,
    prefix: String,
}

impl Configuration {
    /// Loads `replication.toml` from `config_dir` plus environment overrides.
    pub fn load<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let config_dir = config_dir.as_ref();
        if !config_dir.is_dir() {
            return Err(Error::Config(format!(
                "Path {} is not a directory",
                config_dir.to_string_lossy()
            )));
        }
        let file = config_dir.join(CONFIG_FILE_NAME);
        info!(file = %file.display(), "Loading replication configuration");

        Self::build(File::from(file).required(false), env_source())
    }

    /// Parses TOML text, environment overrides still apply.
    pub fn from_toml(toml: &str) -> Result<Self> {
        Self::build(File::from_str(toml, FileFormat::Toml), env_source())
    }

    fn build<S>(file: S, environment: Environment) -> Result<Self>
    where
        S: Source + Send + Sync + 'static,
    {
        let inner = Config::builder()
            .add_source(file)
            .add_source(environment)
            .build()?;
        Ok(Self {
            inner,
            prefix: String::new(),
        })
    }

    /// The nested section at `path`, relative to this one.
    pub fn section(&self, path: &str) -> Configuration {
        Configuration {
            inner: self.inner.clone(),
            prefix: self.key(path),
        }
    }

    fn key(&self, key: &str) -> String {
        if self.prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}.{}", self.prefix, key)
        }
    }

    pub fn get_string(&self, key: &str) -> String {
        self.inner.get_string(&self.key(key)).unwrap_or_default()
    }

    pub fn get_bool(&self, key: &str) -> bool {
        self.inner.get_bool(&self.key(key)).unwrap_or_default()
    }

    /// Deserializes the whole section, falling back to the default when it is absent.
    pub fn deserialize<T: DeserializeOwned + Default>(&self) -> Result<T> {
        match self.inner.get::<T>(&self.prefix) {
            Ok(value) => Ok(value),
            Err(ConfigError::NotFound(_)) => Ok(T::default()),
            Err(e) => Err(Error::Config(format!("parsing {}: {e}", self.prefix))),
        }
    }
}

fn env_source() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

/// `[source.filer]` section.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct FilerSourceConfig {
    /// Master server used to resolve volume locations, `host:port` or a URL.
    pub master: String,
    /// Only entries under this directory are replicated.
    pub directory: String,
    /// Upper bound for a single buffer handed to the sink.
    pub read_buffer_size: usize,
}

impl Default for FilerSourceConfig {
    fn default() -> Self {
        Self {
            master: "localhost:9333".to_string(),
            directory: "/".to_string(),
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
        }
    }
}
