//! FileSink - writes the byte stream to a file on disk

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use contracts::{ByteSink, ContractError};
use tracing::{debug, instrument};

/// Configuration for FileSink
#[derive(Debug, Clone)]
pub struct FileSinkConfig {
    /// Output file
    pub path: PathBuf,
    /// Append to an existing file instead of truncating it
    pub append: bool,
}

impl FileSinkConfig {
    /// Create config from params map
    pub fn from_params(params: &HashMap<String, String>) -> Result<Self, ContractError> {
        let path = params
            .get("path")
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from)
            .ok_or_else(|| ContractError::config_validation("params.path", "missing path"))?;
        let append = match params.get("append").map(String::as_str) {
            None => false,
            Some("true") => true,
            Some("false") => false,
            Some(other) => {
                return Err(ContractError::config_validation(
                    "params.append",
                    format!("expected true or false, got '{other}'"),
                ))
            }
        };

        Ok(Self { path, append })
    }
}

type SharedWriter = Arc<Mutex<Option<BufWriter<File>>>>;

/// Sink that writes every chunk to one file
pub struct FileSink {
    name: String,
    path: PathBuf,
    writer: SharedWriter,
}

impl FileSink {
    /// Create a new FileSink, creating parent directories as needed
    pub fn new(name: impl Into<String>, config: FileSinkConfig) -> std::io::Result<Self> {
        if let Some(parent) = config.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .append(config.append)
            .truncate(!config.append)
            .open(&config.path)?;

        Ok(Self {
            name: name.into(),
            path: config.path,
            writer: Arc::new(Mutex::new(Some(BufWriter::new(file)))),
        })
    }

    /// Create from params map (for factory)
    pub fn from_params(
        name: impl Into<String>,
        params: &HashMap<String, String>,
    ) -> Result<Self, ContractError> {
        let config = FileSinkConfig::from_params(params)?;
        Ok(Self::new(name, config)?)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn with_writer<T>(
        name: &str,
        writer: &SharedWriter,
        op: impl FnOnce(&mut BufWriter<File>) -> std::io::Result<T>,
        on_error: fn(&str, String) -> ContractError,
    ) -> Result<T, ContractError> {
        let mut guard = writer.lock().unwrap_or_else(PoisonError::into_inner);
        let writer = guard
            .as_mut()
            .ok_or_else(|| on_error(name, "file is closed".to_string()))?;
        op(writer).map_err(|e| on_error(name, e.to_string()))
    }

    fn write_all(name: &str, writer: &SharedWriter, buf: &[u8]) -> Result<(), ContractError> {
        Self::with_writer(name, writer, |w| w.write_all(buf), |n, m| {
            ContractError::sink_write(n, m)
        })
    }

    fn flush_writer(name: &str, writer: &SharedWriter) -> Result<(), ContractError> {
        Self::with_writer(name, writer, |w| w.flush(), |n, m| {
            ContractError::sink_flush(n, m)
        })
    }

    /// Run a blocking file operation on the blocking pool
    async fn offload<T, F>(&self, op: F) -> Result<T, ContractError>
    where
        T: Send + 'static,
        F: FnOnce(&str, &SharedWriter) -> Result<T, ContractError> + Send + 'static,
    {
        let name = self.name.clone();
        let writer = Arc::clone(&self.writer);
        tokio::task::spawn_blocking(move || op(&name, &writer))
            .await
            .map_err(|e| ContractError::Other(format!("file task failed: {e}")))?
    }
}

impl ByteSink for FileSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn write_blocking(&self, buf: &[u8]) -> Result<(), ContractError> {
        Self::write_all(&self.name, &self.writer, buf)
    }

    #[instrument(name = "file_sink_write", skip(self, buf), fields(sink = %self.name, len = buf.len()))]
    async fn write(&self, buf: &[u8]) -> Result<(), ContractError> {
        let data = buf.to_vec();
        self.offload(move |name, writer| Self::write_all(name, writer, &data))
            .await
    }

    fn flush_blocking(&self) -> Result<(), ContractError> {
        Self::flush_writer(&self.name, &self.writer)
    }

    #[instrument(name = "file_sink_flush", skip(self))]
    async fn flush(&self) -> Result<(), ContractError> {
        self.offload(Self::flush_writer).await
    }

    #[instrument(name = "file_sink_close", skip(self))]
    async fn close(&self) -> Result<(), ContractError> {
        let closed = self
            .offload(|name, writer| {
                let taken = writer.lock().unwrap_or_else(PoisonError::into_inner).take();
                match taken {
                    Some(mut w) => w.flush().map_err(|e| ContractError::sink_close(name, e.to_string())),
                    None => Ok(()),
                }
            })
            .await;
        debug!(sink = %self.name, path = %self.path.display(), "FileSink closed");
        closed
    }
}
