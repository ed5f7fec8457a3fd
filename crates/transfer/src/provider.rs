// Copyright 2025 Crrow
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Collaborator contracts consumed by the engine, plus local-file
//! implementations of them.
//!
//! The engine never speaks a wire protocol. A [`StreamProvider`] hands it an
//! already-open byte stream and a [`Sink`] receives the bytes.

use std::{
    collections::HashMap,
    fmt, io,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use tokio::{
    fs::{self, File},
    io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufWriter},
};
use tracing::debug;

use crate::error::BoxedError;

/// Provider-specific parameters (credentials, hints, ...). The engine passes
/// them through untouched.
pub type TransferOptions = HashMap<String, serde_json::Value>;

/// Readable side of a transfer. Dropping it closes the remote stream.
pub type RemoteStream = Box<dyn AsyncRead + Send + Unpin>;

/// Stream handed over by a [`StreamProvider`].
pub struct OpenedStream {
    pub reader:           RemoteStream,
    /// Content length, `None` when the provider cannot tell.
    pub length:           Option<u64>,
    /// Final locator of the resource if it differs from the requested one.
    pub resolved_locator: Option<String>,
}

impl OpenedStream {
    pub fn new(reader: impl AsyncRead + Send + Unpin + 'static, length: Option<u64>) -> Self {
        Self {
            reader: Box::new(reader),
            length,
            resolved_locator: None,
        }
    }

    #[must_use]
    pub fn with_resolved_locator(mut self, locator: impl Into<String>) -> Self {
        self.resolved_locator = Some(locator.into());
        self
    }
}

impl fmt::Debug for OpenedStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenedStream")
            .field("length", &self.length)
            .field("resolved_locator", &self.resolved_locator)
            .finish_non_exhaustive()
    }
}

/// Opens the remote side of a transfer.
#[async_trait]
pub trait StreamProvider: Send + Sync {
    /// Any error is reported to the caller of `start` as a connect error.
    async fn open(
        &self,
        locator: &str,
        options: &TransferOptions,
    ) -> Result<OpenedStream, BoxedError>;
}

/// Writable destination of a transfer.
#[async_trait]
pub trait Sink: Send {
    /// Writes the whole chunk or fails.
    async fn write(&mut self, bytes: &[u8]) -> io::Result<()>;

    async fn flush(&mut self) -> io::Result<()> { Ok(()) }

    /// Flushes and releases the destination. Called at most once.
    async fn close(&mut self) -> io::Result<()>;
}

/// Where the received bytes go.
pub enum Destination {
    /// Local file, created (with its parent directories) when the transfer
    /// starts. The transfer owns and closes it.
    Path(PathBuf),
    /// Already opened sink; the transfer closes it when it finishes.
    Owned(Box<dyn Sink>),
    /// Already opened sink that stays open; the transfer only flushes it.
    Shared(Box<dyn Sink>),
}

impl Destination {
    pub fn path(path: impl Into<PathBuf>) -> Self { Self::Path(path.into()) }

    pub fn owned(sink: impl Sink + 'static) -> Self { Self::Owned(Box::new(sink)) }

    pub fn shared(sink: impl Sink + 'static) -> Self { Self::Shared(Box::new(sink)) }

    /// Returns the sink and whether the transfer owns it.
    pub(crate) async fn open(self) -> io::Result<(Box<dyn Sink>, bool)> {
        match self {
            Self::Path(path) => Ok((Box::new(FileSink::create(path).await?), true)),
            Self::Owned(sink) => Ok((sink, true)),
            Self::Shared(sink) => Ok((sink, false)),
        }
    }
}

impl fmt::Debug for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(path) => f.debug_tuple("Path").field(path).finish(),
            Self::Owned(_) => f.write_str("Owned(..)"),
            Self::Shared(_) => f.write_str("Shared(..)"),
        }
    }
}

/// Adapts any tokio writer into a [`Sink`]. Closing shuts the writer down.
#[derive(Debug)]
pub struct WriterSink<W> {
    writer: W,
}

impl<W> WriterSink<W> {
    pub const fn new(writer: W) -> Self { Self { writer } }

    pub fn into_inner(self) -> W { self.writer }
}

#[async_trait]
impl<W> Sink for WriterSink<W>
where
    W: AsyncWrite + Send + Unpin,
{
    async fn write(&mut self, bytes: &[u8]) -> io::Result<()> { self.writer.write_all(bytes).await }

    async fn flush(&mut self) -> io::Result<()> { self.writer.flush().await }

    async fn close(&mut self) -> io::Result<()> { self.writer.shutdown().await }
}

/// Buffered local file sink.
#[derive(Debug)]
pub struct FileSink {
    path: PathBuf,
    file: BufWriter<File>,
}

impl FileSink {
    /// Creates (or truncates) the file, creating parent directories first.
    pub async fn create(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        let file = File::create(&path).await?;
        debug!(path = %path.display(), "Opened file sink");
        Ok(Self {
            path,
            file: BufWriter::new(file),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path { &self.path }
}

#[async_trait]
impl Sink for FileSink {
    async fn write(&mut self, bytes: &[u8]) -> io::Result<()> { self.file.write_all(bytes).await }

    async fn flush(&mut self) -> io::Result<()> { self.file.flush().await }

    async fn close(&mut self) -> io::Result<()> {
        self.file.flush().await?;
        self.file.get_mut().sync_all().await
    }
}

/// Option key understood by [`FileStreamProvider`]: `false` hides the file
/// length, so the transfer runs with an unknown total.
pub const LENGTH_HINT_OPTION: &str = "length_hint";

const FILE_SCHEME: &str = "file://";

/// Serves `file://` locators and bare paths from the local file system.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileStreamProvider;

impl FileStreamProvider {
    fn path_of(locator: &str) -> PathBuf {
        PathBuf::from(locator.strip_prefix(FILE_SCHEME).unwrap_or(locator))
    }
}

#[async_trait]
impl StreamProvider for FileStreamProvider {
    async fn open(
        &self,
        locator: &str,
        options: &TransferOptions,
    ) -> Result<OpenedStream, BoxedError> {
        let path = Self::path_of(locator);
        let file = File::open(&path).await?;
        let metadata = file.metadata().await?;
        if !metadata.is_file() {
            return Err(format!("{} is not a regular file", path.display()).into());
        }

        let length_hint = options
            .get(LENGTH_HINT_OPTION)
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(true);
        let length = length_hint.then_some(metadata.len());

        let resolved = fs::canonicalize(&path).await?;
        Ok(OpenedStream::new(file, length)
            .with_resolved_locator(format!("{FILE_SCHEME}{}", resolved.display())))
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::AsyncReadExt;

    use super::*;

    #[tokio::test]
    async fn test_file_provider_reports_length() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("source.bin");
        fs::write(&path, vec![7u8; 1234]).await.unwrap();

        let locator = format!("file://{}", path.display());
        let mut opened = FileStreamProvider
            .open(&locator, &TransferOptions::new())
            .await
            .unwrap();
        assert_eq!(opened.length, Some(1234));
        assert!(
            opened
                .resolved_locator
                .as_deref()
                .is_some_and(|l| l.starts_with("file://"))
        );

        let mut contents = Vec::new();
        opened.reader.read_to_end(&mut contents).await.unwrap();
        assert_eq!(contents.len(), 1234);
    }

    #[tokio::test]
    async fn test_file_provider_length_hint_option() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("source.bin");
        fs::write(&path, b"hello").await.unwrap();

        let mut options = TransferOptions::new();
        options.insert(LENGTH_HINT_OPTION.to_string(), serde_json::Value::Bool(false));
        let opened = FileStreamProvider
            .open(path.to_str().unwrap(), &options)
            .await
            .unwrap();
        assert_eq!(opened.length, None);
    }

    #[tokio::test]
    async fn test_file_provider_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.bin");
        let result = FileStreamProvider
            .open(missing.to_str().unwrap(), &TransferOptions::new())
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_file_provider_rejects_directory() {
        let dir = tempfile::tempdir().unwrap();
        let result = FileStreamProvider
            .open(dir.path().to_str().unwrap(), &TransferOptions::new())
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_file_sink_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/deeper/out.bin");

        let mut sink = FileSink::create(&path).await.unwrap();
        sink.write(b"abc").await.unwrap();
        sink.write(b"def").await.unwrap();
        sink.close().await.unwrap();

        assert_eq!(fs::read(&path).await.unwrap(), b"abcdef");
    }

    #[tokio::test]
    async fn test_writer_sink() {
        let mut sink = WriterSink::new(Vec::new());
        sink.write(b"chunk-1").await.unwrap();
        sink.flush().await.unwrap();
        sink.close().await.unwrap();
        assert_eq!(sink.into_inner(), b"chunk-1");
    }
}
