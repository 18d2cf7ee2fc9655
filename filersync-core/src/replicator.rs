//! Dispatches source filer events to a [Sink].
//!
//! Only entries below the source directory are replicated, their keys are made relative to it
//! before they reach the sink. An update the sink cannot apply in place becomes a delete of the
//! old entry followed by a create of the new one.
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::SplitStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::entry::EventNotification;
use crate::sinker::Sink;
use crate::{Error, Result};

/// An event together with the full path of the entry it is about.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicationEvent {
    pub key: String,
    pub event: EventNotification,
}

impl ReplicationEvent {
    pub fn from_json(line: &str) -> Result<Self> {
        Ok(serde_json::from_str(line)?)
    }

    /// Parses one raw input line, invalid UTF-8 is an [Error::Event] like any other bad line.
    pub fn from_slice(line: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(line)?)
    }
}

pub struct Replicator<S> {
    source_directory: String,
    sink: S,
}

impl<S: Sink> Replicator<S> {
    pub fn new(source_directory: impl Into<String>, sink: S) -> Self {
        Self {
            source_directory: source_directory.into(),
            sink,
        }
    }

    /// `key` relative to the source directory, `None` when it lies outside of it.
    fn relative_key(&self, key: &str) -> Option<String> {
        let directory = self.source_directory.trim_end_matches('/');
        let rest = key.strip_prefix(directory)?;
        if !rest.is_empty() && !rest.starts_with('/') {
            return None;
        }
        Some(rest.to_string())
    }

    pub async fn replicate(
        &self,
        key: &str,
        event: &EventNotification,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let Some(relative) = self.relative_key(key) else {
            debug!(key, "Skipping entry outside of the source directory");
            return Ok(());
        };

        match (&event.old_entry, &event.new_entry) {
            (None, None) => Ok(()),
            (Some(old), None) => {
                debug!(key = relative, "Replicating delete");
                self.sink
                    .delete_entry(&relative, old.is_directory, event.delete_chunks, cancel)
                    .await
            }
            (None, Some(new)) => {
                debug!(key = relative, "Replicating create");
                self.sink.create_entry(&relative, new, cancel).await
            }
            (Some(old), Some(new)) => {
                let new_key = match &event.new_parent_path {
                    Some(parent) => self.relative_key(&format!(
                        "{}/{}",
                        parent.trim_end_matches('/'),
                        new.name
                    )),
                    None => Some(relative.clone()),
                };

                if new_key.as_deref() == Some(relative.as_str())
                    && self
                        .sink
                        .update_entry(&relative, old, new, event.delete_chunks, cancel)
                        .await?
                {
                    return Ok(());
                }

                debug!(key = relative, ?new_key, "Replicating update as delete and create");
                self.sink
                    .delete_entry(&relative, old.is_directory, false, cancel)
                    .await?;
                match new_key {
                    Some(new_key) => self.sink.create_entry(&new_key, new, cancel).await,
                    None => {
                        info!(key, "Entry moved out of the source directory");
                        Ok(())
                    }
                }
            }
        }
    }

    /// Replicates newline delimited JSON events from `reader` until it is exhausted or `cancel`
    /// fires, returning how many were replicated. Lines that do not parse are logged and
    /// skipped, as are events the sink fails on. Only a failing reader stops the loop early.
    pub async fn replicate_events<B>(&self, reader: B, cancel: &CancellationToken) -> Result<u64>
    where
        B: AsyncBufRead + Unpin,
    {
        let mut lines = SplitStream::new(reader.split(b'\n'));
        let mut replicated = 0;
        loop {
            let line = tokio::select! {
                _ = cancel.cancelled() => break,
                line = lines.next() => match line {
                    Some(line) => {
                        line.map_err(|e| Error::Event(format!("reading events: {e}")))?
                    }
                    None => break,
                },
            };
            if line.trim_ascii().is_empty() {
                continue;
            }

            let event = match ReplicationEvent::from_slice(&line) {
                Ok(event) => event,
                Err(e) => {
                    warn!(error = %e, "Skipping malformed event");
                    continue;
                }
            };
            match self.replicate(&event.key, &event.event, cancel).await {
                Ok(()) => replicated += 1,
                Err(Error::Cancelled) => break,
                Err(e) => error!(key = event.key, error = %e, "Replication failed"),
            }
        }
        Ok(replicated)
    }
}
