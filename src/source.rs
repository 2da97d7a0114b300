//! Where the text comes from
//!
//! The engine only ever sees text that is already in memory. A source that fails
//! means there is no input at all and the pipeline is not run.

use std::path::PathBuf;

use futures::future::{BoxFuture, FutureExt};
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tracing::{debug, error};

use crate::mr::error::MapReduceError;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{0} is not valid UTF-8")]
    NotUtf8(String),
}

/// Anything that can hand over a body of text
pub trait TextSource: Send + Sync {
    /// Human readable name used in logs and errors
    fn describe(&self) -> String;

    fn fetch(&self) -> BoxFuture<'_, Result<String, SourceError>>;
}

fn decode(name: String, bytes: Vec<u8>) -> Result<String, SourceError> {
    String::from_utf8(bytes).map_err(|_| SourceError::NotUtf8(name))
}

/// Reads a whole file
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl TextSource for FileSource {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn fetch(&self) -> BoxFuture<'_, Result<String, SourceError>> {
        async move {
            let bytes = tokio::fs::read(&self.path)
                .await
                .map_err(|source| SourceError::Io {
                    path: self.describe(),
                    source,
                })?;
            decode(self.describe(), bytes)
        }
        .boxed()
    }
}

/// Reads standard input to the end
#[derive(Debug, Clone, Copy, Default)]
pub struct StdinSource;

impl TextSource for StdinSource {
    fn describe(&self) -> String {
        "<stdin>".to_string()
    }

    fn fetch(&self) -> BoxFuture<'_, Result<String, SourceError>> {
        async move {
            let mut bytes = Vec::new();
            tokio::io::stdin()
                .read_to_end(&mut bytes)
                .await
                .map_err(|source| SourceError::Io {
                    path: self.describe(),
                    source,
                })?;
            decode(self.describe(), bytes)
        }
        .boxed()
    }
}

/// Text that is already in memory
#[derive(Debug, Clone, Default)]
pub struct StaticSource(pub String);

impl TextSource for StaticSource {
    fn describe(&self) -> String {
        format!("<{} byte(s) in memory>", self.0.len())
    }

    fn fetch(&self) -> BoxFuture<'_, Result<String, SourceError>> {
        futures::future::ready(Ok(self.0.clone())).boxed()
    }
}

/// Fetches the text, turning any failure into [`MapReduceError::InputUnavailable`]
pub async fn load_text(source: &dyn TextSource) -> Result<String, MapReduceError> {
    match source.fetch().await {
        Ok(text) => {
            debug!("[Source] Loaded {} byte(s) from {}", text.len(), source.describe());
            Ok(text)
        }
        Err(e) => {
            error!("[Source] {}", e);
            Err(MapReduceError::InputUnavailable(e.to_string()))
        }
    }
}
