//! File attachments.
//!
//! A [`FileValue`] is the content of a file tag. Before upload it is backed by
//! memory, a local path or a caller's reader; after a round trip through the
//! service it is backed by the server-assigned file id and read lazily through
//! the client. Every variant reads through the same [`FileReader`].

use std::fmt;
use std::io::{self, Cursor, SeekFrom};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use reqwest::multipart::Part;
use tokio::fs::File;
use tempfile::NamedTempFile;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio::sync::Mutex;
use tokio_util::io::ReaderStream;
use tracing::debug;

use crate::{Error, WaspClient};

/// Default buffer size for streaming file content.
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Strings at least this long are never probed as paths.
const PATH_MAX: usize = 4096;

const OCTET_STREAM: &str = "application/octet-stream";

type BoxedReader = Pin<Box<dyn AsyncRead + Send + Sync>>;

pub(crate) type SendReader = Pin<Box<dyn AsyncRead + Send>>;

/// Content of a file tag.
#[derive(Clone)]
pub struct FileValue {
    name: Option<String>,
    source: Source,
}

#[derive(Clone)]
enum Source {
    Memory(Bytes),
    Disk(PathBuf),
    Reader(Arc<Mutex<Spool>>),
    Stored {
        file_id: String,
        client: Option<WaspClient>,
    },
}

impl FileValue {
    /// File read from `path` when opened or uploaded. Named after the path's base name.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self {
            name: None,
            source: Source::Disk(path.into()),
        }
    }

    /// In-memory content.
    pub fn from_bytes(name: impl Into<String>, content: impl Into<Bytes>) -> Self {
        Self {
            name: Some(name.into()),
            source: Source::Memory(content.into()),
        }
    }

    /// A literal string written as the file content. Unnamed unless [`with_name`](Self::with_name) is used.
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            name: None,
            source: Source::Memory(Bytes::from(text.into())),
        }
    }

    /// A path if `value` names an existing regular file, literal content otherwise.
    pub fn from_path_or_text(value: impl Into<String>) -> Self {
        let value = value.into();
        if value.len() < PATH_MAX && Path::new(&value).is_file() {
            Self::from_path(value)
        } else {
            Self::from_text(value)
        }
    }

    /// Content produced by `reader`.
    ///
    /// Opening the value before any upload hands out the reader itself, once.
    /// The first upload copies the content to a temporary file instead, so
    /// retried requests and later opens read it again from disk.
    pub fn from_reader<R>(name: impl Into<String>, reader: R) -> Self
    where
        R: AsyncRead + Send + Sync + 'static,
    {
        Self {
            name: Some(name.into()),
            source: Source::Reader(Arc::new(Mutex::new(Spool::Pending(Box::pin(reader))))),
        }
    }

    /// A file stored by the service, read through `client` when opened.
    pub fn stored(
        file_id: impl Into<String>,
        name: Option<String>,
        client: Option<WaspClient>,
    ) -> Self {
        Self {
            name,
            source: Source::Stored {
                file_id: file_id.into(),
                client,
            },
        }
    }

    /// Override the logical file name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Logical file name.
    pub fn name(&self) -> Option<&str> {
        match (&self.name, &self.source) {
            (Some(name), _) => Some(name),
            (None, Source::Disk(path)) => path.file_name().and_then(|name| name.to_str()),
            _ => None,
        }
    }

    /// Server file id, `None` until the file has been stored.
    pub fn file_id(&self) -> Option<&str> {
        match &self.source {
            Source::Stored { file_id, .. } => Some(file_id),
            _ => None,
        }
    }

    /// Download URL, `None` until stored or when no client is bound.
    pub fn file_url(&self) -> Option<String> {
        match &self.source {
            Source::Stored {
                file_id,
                client: Some(client),
            } => client.file_url(file_id),
            _ => None,
        }
    }

    /// Open the content for reading.
    pub async fn open(&self) -> Result<FileReader, Error> {
        let name = self.name().map(str::to_string);
        match &self.source {
            Source::Memory(bytes) => Ok(FileReader::memory(name, bytes.clone())),
            Source::Disk(path) => Ok(FileReader::disk(name, File::open(path).await?)),
            Source::Reader(spool) => {
                let mut spool = spool.lock().await;
                if let Spool::Spooled(file) = &*spool {
                    return Ok(FileReader::disk(name, File::open(file.path()).await?));
                }
                match std::mem::replace(&mut *spool, Spool::Consumed) {
                    Spool::Pending(reader) => Ok(FileReader::stream(name, reader)),
                    _ => Err(consumed()),
                }
            }
            Source::Stored { file_id, client } => {
                let mut reader = bound(client.as_ref(), file_id)?.open(file_id).await?;
                if name.is_some() {
                    reader.name = name;
                }
                Ok(reader)
            }
        }
    }

    /// Read the whole content into memory. Prefer [`to_file`](Self::to_file) for large files.
    pub async fn bytes(&self) -> Result<Bytes, Error> {
        if let Source::Memory(bytes) = &self.source {
            return Ok(bytes.clone());
        }
        let mut reader = self.open().await?;
        let mut content = Vec::new();
        reader.read_to_end(&mut content).await?;
        Ok(content.into())
    }

    /// Write the content into `dir`, returning the created path.
    ///
    /// The file is named after [`name`](Self::name), or gets a generated name.
    /// Content is streamed in fixed-size chunks so memory use does not grow
    /// with the file size.
    pub async fn to_file(&self, dir: impl AsRef<Path>) -> Result<PathBuf, Error> {
        let dir = dir.as_ref();
        if let Source::Stored { file_id, client } = &self.source {
            return bound(client.as_ref(), file_id)?
                .download(file_id, dir, self.name.as_deref())
                .await;
        }

        ensure_writable_dir(dir).await?;
        let path = dir.join(self.name().map_or_else(generated_name, sanitize_name));
        let mut reader = self.open().await?;
        write_file(&path, &mut reader, DEFAULT_CHUNK_SIZE).await?;
        Ok(path)
    }

    /// Multipart part carrying the content. `fallback_name` names unnamed files.
    pub(crate) async fn to_part(&self, fallback_name: &str, chunk_size: usize) -> Result<Part, Error> {
        let file_name = self.name().unwrap_or(fallback_name).to_string();
        let part = match &self.source {
            Source::Memory(bytes) => Part::stream_with_length(bytes.clone(), bytes.len() as u64),
            Source::Disk(path) => disk_part(path, chunk_size).await?,
            Source::Reader(spool) => {
                let mut spool = spool.lock().await;
                if let Spool::Pending(reader) = &mut *spool {
                    let file = spool_to_disk(reader, chunk_size).await?;
                    *spool = Spool::Spooled(file);
                }
                match &*spool {
                    Spool::Spooled(file) => disk_part(file.path(), chunk_size).await?,
                    _ => return Err(consumed()),
                }
            }
            Source::Stored { file_id, client } => {
                let response = bound(client.as_ref(), file_id)?.fetch_file(file_id).await?;
                Part::stream(reqwest::Body::wrap_stream(response.bytes_stream()))
            }
        };
        part.file_name(file_name)
            .mime_str(OCTET_STREAM)
            .map_err(|e| Error::Configuration(e.to_string()))
    }
}

fn bound<'a>(client: Option<&'a WaspClient>, file_id: &str) -> Result<&'a WaspClient, Error> {
    client.ok_or_else(|| {
        Error::Configuration(format!("file {file_id} has no client to fetch its content"))
    })
}

/// Content of a reader-backed file.
enum Spool {
    /// Untouched caller reader.
    Pending(BoxedReader),
    /// Copied to disk by an upload; removed with the last clone of the value.
    Spooled(NamedTempFile),
    /// Handed out by `open` before any upload.
    Consumed,
}

fn consumed() -> Error {
    Error::Configuration("file reader has already been consumed".into())
}

async fn spool_to_disk(reader: &mut BoxedReader, chunk_size: usize) -> Result<NamedTempFile, Error> {
    let spool = NamedTempFile::new()?;
    let mut file = File::from_std(spool.reopen()?);
    let written = copy_chunked(reader, &mut file, chunk_size).await?;
    debug!(bytes = written, path = %spool.path().display(), "reader spooled for upload");
    Ok(spool)
}

async fn disk_part(path: &Path, chunk_size: usize) -> Result<Part, Error> {
    let file = File::open(path).await?;
    let length = file.metadata().await?.len();
    let body = reqwest::Body::wrap_stream(ReaderStream::with_capacity(file, chunk_size));
    Ok(Part::stream_with_length(body, length))
}

impl PartialEq for FileValue {
    fn eq(&self, other: &Self) -> bool {
        let same_source = match (&self.source, &other.source) {
            (Source::Memory(a), Source::Memory(b)) => a == b,
            (Source::Disk(a), Source::Disk(b)) => a == b,
            (Source::Reader(a), Source::Reader(b)) => Arc::ptr_eq(a, b),
            (Source::Stored { file_id: a, .. }, Source::Stored { file_id: b, .. }) => a == b,
            _ => false,
        };
        same_source && self.name() == other.name()
    }
}

impl fmt::Debug for FileValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("FileValue");
        debug.field("name", &self.name());
        match &self.source {
            Source::Memory(bytes) => debug.field("len", &bytes.len()),
            Source::Disk(path) => debug.field("path", path),
            Source::Reader(_) => debug.field("reader", &".."),
            Source::Stored { file_id, .. } => debug.field("id", file_id),
        };
        debug.finish()
    }
}

/// Readable handle on file content.
///
/// Memory- and disk-backed readers can seek; readers over a network or a
/// caller-supplied stream fail to seek with [`io::ErrorKind::Unsupported`].
/// Dropping the reader releases the file or connection.
pub struct FileReader {
    name: Option<String>,
    inner: ReaderInner,
}

enum ReaderInner {
    Memory(Cursor<Bytes>),
    Disk(File),
    Stream(SendReader),
}

impl FileReader {
    pub(crate) fn memory(name: Option<String>, bytes: Bytes) -> Self {
        Self {
            name,
            inner: ReaderInner::Memory(Cursor::new(bytes)),
        }
    }

    pub(crate) fn disk(name: Option<String>, file: File) -> Self {
        Self {
            name,
            inner: ReaderInner::Disk(file),
        }
    }

    pub(crate) fn stream(name: Option<String>, reader: SendReader) -> Self {
        Self {
            name,
            inner: ReaderInner::Stream(reader),
        }
    }

    /// File name reported by the source, if any.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn is_seekable(&self) -> bool {
        !matches!(self.inner, ReaderInner::Stream(_))
    }
}

impl fmt::Debug for FileReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileReader")
            .field("name", &self.name)
            .field("seekable", &self.is_seekable())
            .finish()
    }
}

impl AsyncRead for FileReader {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match &mut self.get_mut().inner {
            ReaderInner::Memory(cursor) => Pin::new(cursor).poll_read(cx, buf),
            ReaderInner::Disk(file) => Pin::new(file).poll_read(cx, buf),
            ReaderInner::Stream(reader) => reader.as_mut().poll_read(cx, buf),
        }
    }
}

impl AsyncSeek for FileReader {
    fn start_seek(self: Pin<&mut Self>, position: SeekFrom) -> io::Result<()> {
        match &mut self.get_mut().inner {
            ReaderInner::Memory(cursor) => Pin::new(cursor).start_seek(position),
            ReaderInner::Disk(file) => Pin::new(file).start_seek(position),
            ReaderInner::Stream(_) => Err(unseekable()),
        }
    }

    fn poll_complete(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<u64>> {
        match &mut self.get_mut().inner {
            ReaderInner::Memory(cursor) => Pin::new(cursor).poll_complete(cx),
            ReaderInner::Disk(file) => Pin::new(file).poll_complete(cx),
            ReaderInner::Stream(_) => Poll::Ready(Err(unseekable())),
        }
    }
}

fn unseekable() -> io::Error {
    io::Error::new(io::ErrorKind::Unsupported, "stream-backed file cannot seek")
}

/// Copy `reader` into `writer` through one `chunk_size` buffer.
pub(crate) async fn copy_chunked<R, W>(reader: &mut R, writer: &mut W, chunk_size: usize) -> io::Result<u64>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut buffer = vec![0u8; chunk_size.max(1)];
    let mut total = 0u64;
    loop {
        let read = reader.read(&mut buffer).await?;
        if read == 0 {
            break;
        }
        writer.write_all(&buffer[..read]).await?;
        total += read as u64;
    }
    writer.flush().await?;
    Ok(total)
}

/// Stream `reader` into a new file at `path`, removing the partial file on failure.
pub(crate) async fn write_file<R>(path: &Path, reader: &mut R, chunk_size: usize) -> Result<u64, Error>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut file = File::create(path).await?;
    match copy_chunked(reader, &mut file, chunk_size).await {
        Ok(written) => Ok(written),
        Err(e) => {
            drop(file);
            let _ = tokio::fs::remove_file(path).await;
            Err(e.into())
        }
    }
}

pub(crate) async fn ensure_writable_dir(dir: &Path) -> Result<(), Error> {
    let metadata = tokio::fs::metadata(dir).await?;
    if !metadata.is_dir() {
        return Err(io::Error::new(
            io::ErrorKind::NotADirectory,
            format!("{} is not a directory", dir.display()),
        )
        .into());
    }
    if metadata.permissions().readonly() {
        return Err(io::Error::new(
            io::ErrorKind::PermissionDenied,
            format!("no write permission to {}", dir.display()),
        )
        .into());
    }
    Ok(())
}

/// Keep only the final path component of a name chosen by a remote party.
pub(crate) fn sanitize_name(name: &str) -> String {
    let name = name.trim().trim_matches('"');
    Path::new(name)
        .file_name()
        .and_then(|base| base.to_str())
        .filter(|base| !base.is_empty())
        .map_or_else(generated_name, str::to_string)
}

pub(crate) fn generated_name() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncSeekExt;

    /// Writer that remembers the largest single write it was handed.
    #[derive(Default)]
    struct RecordingWriter {
        data: Vec<u8>,
        largest_write: usize,
    }

    impl AsyncWrite for RecordingWriter {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            let this = self.get_mut();
            this.largest_write = this.largest_write.max(buf.len());
            this.data.extend_from_slice(buf);
            Poll::Ready(Ok(buf.len()))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    #[tokio::test]
    async fn copy_is_bounded_by_chunk_size() {
        let source = pattern(100_000);
        let mut reader = Cursor::new(source.clone());
        let mut writer = RecordingWriter::default();

        let copied = copy_chunked(&mut reader, &mut writer, 1024).await.unwrap();

        assert_eq!(copied, 100_000);
        assert!(writer.largest_write <= 1024);
        assert_eq!(writer.data, source);
    }

    #[tokio::test]
    async fn text_value_reads_back() {
        let value = FileValue::from_text("hello wasp");
        assert_eq!(value.name(), None);
        assert_eq!(value.file_id(), None);
        assert_eq!(value.file_url(), None);
        assert_eq!(value.bytes().await.unwrap(), Bytes::from("hello wasp"));
    }

    #[tokio::test]
    async fn path_value_is_named_after_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        tokio::fs::write(&path, b"{\"a\": 1}").await.unwrap();

        let value = FileValue::from_path(&path);
        assert_eq!(value.name(), Some("config.json"));
        assert_eq!(value.bytes().await.unwrap(), Bytes::from_static(b"{\"a\": 1}"));
        assert_eq!(value.with_name("other.json").name(), Some("other.json"));
    }

    #[test]
    fn path_or_text_heuristic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("exists.txt");
        std::fs::write(&path, b"x").unwrap();

        let from_path = FileValue::from_path_or_text(path.to_string_lossy().to_string());
        assert_eq!(from_path.name(), Some("exists.txt"));

        let from_text = FileValue::from_path_or_text("/definitely/not/here.txt");
        assert_eq!(from_text.name(), None);

        let long = "x".repeat(PATH_MAX + 1);
        assert_eq!(FileValue::from_path_or_text(long.clone()), FileValue::from_text(long));
    }

    #[tokio::test]
    async fn reader_value_is_single_use() {
        let value = FileValue::from_reader("stream.bin", Cursor::new(b"abc".to_vec()));
        let clone = value.clone();

        assert_eq!(value.bytes().await.unwrap(), Bytes::from_static(b"abc"));
        let err = clone.open().await.unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[tokio::test]
    async fn reader_value_is_spooled_for_repeated_uploads() {
        let value = FileValue::from_reader("stream.bin", Cursor::new(pattern(5000)));
        let clone = value.clone();

        value.to_part("file-0", 1024).await.unwrap();
        clone.to_part("file-0", 1024).await.unwrap();

        let mut reader = value.open().await.unwrap();
        assert!(reader.is_seekable());
        let mut content = Vec::new();
        reader.read_to_end(&mut content).await.unwrap();
        assert_eq!(content, pattern(5000));
        assert_eq!(clone.bytes().await.unwrap(), Bytes::from(pattern(5000)));
    }

    #[tokio::test]
    async fn stored_value_without_client_fails() {
        let value = FileValue::stored("f-1", Some("log.txt".into()), None);
        assert_eq!(value.file_id(), Some("f-1"));
        assert!(matches!(value.open().await.unwrap_err(), Error::Configuration(_)));

        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            value.to_file(dir.path()).await.unwrap_err(),
            Error::Configuration(_)
        ));
    }

    #[tokio::test]
    async fn to_file_writes_large_content() {
        let source = pattern(3 * DEFAULT_CHUNK_SIZE + 17);
        let value = FileValue::from_bytes("big.bin", source.clone());
        let dir = tempfile::tempdir().unwrap();

        let path = value.to_file(dir.path()).await.unwrap();

        assert_eq!(path, dir.path().join("big.bin"));
        assert_eq!(tokio::fs::read(&path).await.unwrap(), source);
    }

    #[tokio::test]
    async fn to_file_generates_a_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = FileValue::from_text("anon").to_file(dir.path()).await.unwrap();
        assert_eq!(path.parent(), Some(dir.path()));
        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"anon");
    }

    #[tokio::test]
    async fn to_file_rejects_non_directory() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("plain");
        tokio::fs::write(&file, b"").await.unwrap();

        let err = FileValue::from_text("x").to_file(&file).await.unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[tokio::test]
    async fn memory_and_disk_readers_seek() {
        let mut reader = FileValue::from_bytes("a", "0123456789").open().await.unwrap();
        assert!(reader.is_seekable());
        reader.seek(SeekFrom::Start(6)).await.unwrap();
        let mut rest = String::new();
        reader.read_to_string(&mut rest).await.unwrap();
        assert_eq!(rest, "6789");

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("d.txt");
        tokio::fs::write(&path, b"abcdef").await.unwrap();
        let mut reader = FileValue::from_path(&path).open().await.unwrap();
        reader.seek(SeekFrom::End(-2)).await.unwrap();
        let mut tail = String::new();
        reader.read_to_string(&mut tail).await.unwrap();
        assert_eq!(tail, "ef");
    }

    #[tokio::test]
    async fn stream_reader_refuses_to_seek() {
        let value = FileValue::from_reader("s", Cursor::new(b"abc".to_vec()));
        let mut reader = value.open().await.unwrap();
        assert!(!reader.is_seekable());
        let err = reader.seek(SeekFrom::Start(1)).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::Unsupported);
    }

    #[test]
    fn sanitize_strips_directories() {
        assert_eq!(sanitize_name("\"report.txt\""), "report.txt");
        assert_eq!(sanitize_name("../../etc/passwd"), "passwd");
        assert!(!sanitize_name("..").is_empty());
    }
}
