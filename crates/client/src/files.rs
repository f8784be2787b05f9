use std::io;
use std::path::{Path, PathBuf};

use futures::TryStreamExt;
use reqwest::Response;
use reqwest::header::{CONTENT_DISPOSITION, HeaderMap};
use tokio_util::io::StreamReader;
use tracing::{debug, instrument};

use crate::error::ErrorContext;
use crate::file::{self, FileReader, SendReader};
use crate::{Error, Target, WaspClient, expect_success, ready};

impl WaspClient {
    // =========================================================================
    // Files
    // =========================================================================

    /// Browser URL of a stored file, under the first server URL.
    pub fn file_url(&self, file_id: &str) -> Option<String> {
        let base = self.server_urls.first()?;
        crate::endpoint(base, &["file", file_id])
            .ok()
            .map(String::from)
    }

    /// Start downloading a stored file; the body has not been read yet.
    pub(crate) async fn fetch_file(&self, file_id: &str) -> Result<Response, Error> {
        let response = self
            .send(Target::Read, &["file", file_id], self.retry.rounds(), |url| {
                ready(self.client.get(url))
            })
            .await?;
        expect_success(response, ErrorContext::File).await
    }

    /// Open a stored file for streaming reads.
    ///
    /// The reader is named after the server's `Content-Disposition` header
    /// when it sends one. It cannot seek.
    #[instrument(skip(self))]
    pub async fn open(&self, file_id: &str) -> Result<FileReader, Error> {
        let response = self.fetch_file(file_id).await?;
        let name = disposition_filename(response.headers());
        Ok(FileReader::stream(name, body_reader(response)))
    }

    /// Download a stored file into `dir`, returning the created path.
    ///
    /// The file is named `file_name`, else after the server's
    /// `Content-Disposition` header, else after its identifier. Content is
    /// written in chunks of the configured chunk size; a failed download
    /// leaves no partial file behind.
    #[instrument(skip(self, dir))]
    pub async fn download(
        &self,
        file_id: &str,
        dir: impl AsRef<Path>,
        file_name: Option<&str>,
    ) -> Result<PathBuf, Error> {
        let dir = dir.as_ref();
        file::ensure_writable_dir(dir).await?;

        let response = self.fetch_file(file_id).await?;
        let name = file_name
            .map(str::to_string)
            .or_else(|| disposition_filename(response.headers()))
            .unwrap_or_else(|| file_id.to_string());
        let path = dir.join(file::sanitize_name(&name));

        let mut reader = body_reader(response);
        let written = file::write_file(&path, &mut reader, self.chunk_size).await?;
        debug!(path = %path.display(), bytes = written, "file downloaded");
        Ok(path)
    }
}

fn body_reader(response: Response) -> SendReader {
    Box::pin(StreamReader::new(
        response.bytes_stream().map_err(io::Error::other),
    ))
}

/// `filename=` parameter of the `Content-Disposition` header.
fn disposition_filename(headers: &HeaderMap) -> Option<String> {
    let header = headers.get(CONTENT_DISPOSITION)?.to_str().ok()?;
    let (_, rest) = header.split_once("filename=")?;
    let name = rest.split(';').next()?.trim().trim_matches('"');
    (!name.is_empty()).then(|| name.to_string())
}
